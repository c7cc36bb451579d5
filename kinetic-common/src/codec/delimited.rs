//! Delimited text (tab or comma, RFC4180 quoting)

use crate::{Error, Result};
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field separator of the exchange format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Delimiter::Tab => "tab",
            Delimiter::Comma => "comma",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tab" | "\t" | "tsv" => Some(Delimiter::Tab),
            "comma" | "," | "csv" => Some(Delimiter::Comma),
            _ => None,
        }
    }

    /// Delimiter of a document, judged by its header line
    ///
    /// A tab anywhere in the header wins over commas.
    pub fn detect(text: &str) -> Self {
        let header = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
        if header.contains('\t') {
            Delimiter::Tab
        } else if header.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Tab
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data record with its 1-based starting line
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedRow {
    pub line: u64,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelimitedDocument {
    /// Header names, trimmed
    pub headers: Vec<String>,
    pub rows: Vec<DelimitedRow>,
    /// Records the reader could not parse
    pub errors: Vec<String>,
}

/// Parse a document into its header and data records
///
/// Blank lines are skipped; rows may be shorter or longer than the header.
pub fn read_records(text: &str, delimiter: Delimiter) -> Result<DelimitedDocument> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("unreadable header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                rows.push(DelimitedRow {
                    line: record.position().map(|p| line_at(text, p.byte())).unwrap_or(0),
                    fields: record.iter().map(str::to_string).collect(),
                });
            }
            Err(e) => {
                let line = e.position().map(|p| line_at(text, p.byte())).unwrap_or(0);
                errors.push(format!("line {}: {}", line, e));
            }
        }
    }

    Ok(DelimitedDocument { headers, rows, errors })
}

/// 1-based line of the record starting at `offset`
///
/// Counted from the text itself so LF and CRLF documents agree; line breaks
/// at the offset belong to skipped blank lines.
fn line_at(text: &str, offset: u64) -> u64 {
    let bytes = text.as_bytes();
    let mut start = usize::try_from(offset).unwrap_or(bytes.len()).min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\r' | b'\n') {
        start += 1;
    }
    1 + bytes[..start].iter().filter(|&&b| b == b'\n').count() as u64
}

/// Serialize rows, quoting only fields that need it
pub fn write_records(rows: &[Vec<String>], delimiter: Delimiter) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter.as_byte())
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| Error::Internal(format!("delimited write failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("delimited flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("non UTF-8 output: {}", e)))
}
