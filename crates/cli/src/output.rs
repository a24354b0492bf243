// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Render a value in the given format
pub fn render<T: Serialize + fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

/// Render a list of items, one per line in text form
pub fn render_list<T: Serialize + fmt::Display>(
    items: &[T],
    format: OutputFormat,
) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(items)?,
    })
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", render(value, format)?);
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize + fmt::Display>(
    items: &[T],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rendered = render_list(items, format)?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
