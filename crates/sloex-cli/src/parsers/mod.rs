//! Parsers for the MAD-X / PTC files that feed the diagnostics.
//!
//! Supported formats:
//! - [`.tfs`](tfs): Twiss tables (lattice optics and multipole strengths)
//! - [`.txtone`](ptc): PTC `ptc_track` one-table output

pub mod ptc;
pub mod tfs;

use std::collections::HashMap;

use thiserror::Error;

/// Errors during input file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Invalid lattice: {0}")]
    InvalidLattice(#[from] sloex_core::CoreError),
}

/// Strip one pair of surrounding double quotes.
fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

/// Split a table line on whitespace, keeping double-quoted strings whole.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let end = if rest.starts_with('"') {
            rest[1..].find('"').map(|i| i + 2).unwrap_or(rest.len())
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };
        fields.push(unquote(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    fields
}

fn parse_f64(token: &str, line: usize, column: &str) -> Result<f64, ParseError> {
    token.parse().map_err(|_| ParseError::FormatError {
        line,
        message: format!("Invalid value for {column}: '{token}'"),
    })
}

/// Look up a named column in a split data row.
fn field<'a>(
    fields: &[&'a str],
    columns: &HashMap<String, usize>,
    name: &str,
    line: usize,
) -> Result<&'a str, ParseError> {
    let &i = columns
        .get(name)
        .ok_or_else(|| ParseError::MissingColumn(name.into()))?;
    fields.get(i).copied().ok_or_else(|| ParseError::FormatError {
        line,
        message: format!("Row has {} fields, column {name} is #{}", fields.len(), i + 1),
    })
}
