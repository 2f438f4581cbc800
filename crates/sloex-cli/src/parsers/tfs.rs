//! Parser for MAD-X TFS Twiss tables.
//!
//! ```text
//! @ NAME             %05s "TWISS"
//! @ Q1               %le   1.67
//! * NAME     S      BETX   ALFX   MUX    K2L    K3L
//! $ %s       %le    %le    %le    %le    %le    %le
//!  "XR"      40.0   11.0   0.2    0.92   1.1    0.0
//! ```
//!
//! Only the columns the diagnostics consume are read; `K2L` and `K3L`
//! default to zero when the table does not carry them. Column names are
//! matched case-insensitively.

use std::collections::HashMap;
use std::path::Path;

use sloex_core::types::{LatticeRow, LatticeTable};

use super::{field, parse_f64, split_fields, unquote, ParseError};

/// A parsed Twiss file: `@` header entries and the lattice rows.
#[derive(Debug, Clone)]
pub struct TwissFile {
    pub header: HashMap<String, String>,
    pub lattice: LatticeTable,
}

/// Read and parse a TFS file from disk.
pub fn read_tfs(path: &Path) -> Result<TwissFile, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_tfs(&content)
}

/// Parse a TFS table from a string.
pub fn parse_tfs(content: &str) -> Result<TwissFile, ParseError> {
    let mut header = HashMap::new();
    let mut columns: Option<HashMap<String, usize>> = None;
    let mut rows = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('$') || line.starts_with('#') {
            continue;
        }

        if let Some(entry) = line.strip_prefix('@') {
            let parts: Vec<&str> = entry.split_whitespace().collect();
            if let Some(key) = parts.first() {
                let value = parts.get(2..).map(|v| v.join(" ")).unwrap_or_default();
                header.insert(key.to_string(), unquote(&value).to_string());
            }
            continue;
        }

        if let Some(names) = line.strip_prefix('*') {
            columns = Some(
                names
                    .split_whitespace()
                    .enumerate()
                    .map(|(i, name)| (name.to_ascii_uppercase(), i))
                    .collect(),
            );
            continue;
        }

        let Some(columns) = &columns else {
            return Err(ParseError::FormatError {
                line: line_no,
                message: "Data row before the '*' column line".into(),
            });
        };
        rows.push(parse_row(&split_fields(line), columns, line_no)?);
    }

    if columns.is_none() {
        return Err(ParseError::FormatError {
            line: content.lines().count(),
            message: "No '*' column header line found".into(),
        });
    }

    Ok(TwissFile {
        header,
        lattice: LatticeTable::new(rows)?,
    })
}

fn parse_row(
    fields: &[&str],
    columns: &HashMap<String, usize>,
    line: usize,
) -> Result<LatticeRow, ParseError> {
    let number = |name: &str| parse_f64(field(fields, columns, name, line)?, line, name);
    let optional = |name: &str| {
        if columns.contains_key(name) {
            number(name)
        } else {
            Ok(0.0)
        }
    };

    Ok(LatticeRow {
        name: field(fields, columns, "NAME", line)?.to_string(),
        s: number("S")?,
        betx: number("BETX")?,
        alfx: number("ALFX")?,
        mux: number("MUX")?,
        k2l: optional("K2L")?,
        k3l: optional("K3L")?,
    })
}
