//! Work-list loading for `outdial run`

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parses a numbers file: one number per line, blank lines and `#` comments ignored
pub fn parse_numbers(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Combines numbers given on the command line with those read from `file`
///
/// Command-line numbers come first, file numbers follow in file order.
pub fn collect_numbers(inline: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut numbers = inline.to_vec();

    if let Some(path) = file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read numbers file {}", path.display()))?;
        numbers.extend(parse_numbers(&content));
    }

    Ok(numbers)
}
