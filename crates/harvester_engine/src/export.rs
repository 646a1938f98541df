//! Output sink: renders a finished harvest as CSV or JSON and persists it
//! atomically under a deterministic file name.
use std::io::{self, Write};
use std::path::PathBuf;

use harvester_core::{HarvestResult, TerminalReason};
use serde_json::json;

use crate::filename::deterministic_filename;
use crate::persist::{AtomicFileWriter, PersistError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: char,
    /// Prefix a UTF-8 BOM so spreadsheet tools pick the right encoding.
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ';',
            bom: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn needs_quotes(field: &str, delimiter: char) -> bool {
    field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one delimited row; fields are quoted only when they need it.
pub fn write_row<W: Write, S: AsRef<str>>(
    mut w: W,
    row: &[S],
    delimiter: char,
) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{delimiter}")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell, delimiter) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

/// Reads delimited text back into rows, undoing the quoting of [`write_row`].
/// A leading BOM and blank lines are skipped.
pub fn parse_csv(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter && !in_quotes => row.push(std::mem::take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                push_line(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }
    row.push(field);
    push_line(&mut rows, row);
    rows
}

fn push_line(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if !(row.len() == 1 && row[0].is_empty()) {
        rows.push(row);
    }
}

/// Header line followed by one line per row. Empty cells render as nothing.
pub fn render_csv(result: &HarvestResult, options: &CsvOptions) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    if options.bom {
        out.extend_from_slice(UTF8_BOM);
    }
    let header: Vec<&str> = result.schema.names().collect();
    write_row(&mut out, &header, options.delimiter)?;
    for row in &result.rows {
        let cells: Vec<String> = row.values().map(ToString::to_string).collect();
        write_row(&mut out, &cells, options.delimiter)?;
    }
    Ok(out)
}

pub fn render_json(result: &HarvestResult) -> Result<Vec<u8>, ExportError> {
    let error = match &result.reason {
        TerminalReason::FetchError(err) => Some(err.to_string()),
        _ => None,
    };
    let document = json!({
        "source": result.source,
        "pages": result.pages,
        "terminal_reason": result.reason.label(),
        "complete": result.reason.is_complete(),
        "error": error,
        "duplicates_skipped": result.duplicates_skipped,
        "soft_failures": result.soft_failures,
        "declared_total": result.declared_total,
        "columns": result.schema.names().collect::<Vec<_>>(),
        "rows": result.rows.iter().map(|row| row.to_raw()).collect::<Vec<_>>(),
    });
    Ok(serde_json::to_vec_pretty(&document)?)
}

pub fn write_csv(
    result: &HarvestResult,
    writer: &AtomicFileWriter,
    endpoint: &str,
    options: &CsvOptions,
) -> Result<ExportSummary, ExportError> {
    let content = render_csv(result, options)?;
    let filename = deterministic_filename(&result.source, endpoint, "csv");
    let path = writer.write(&filename, &content)?;
    Ok(ExportSummary {
        rows: result.rows.len(),
        path,
    })
}

pub fn write_json(
    result: &HarvestResult,
    writer: &AtomicFileWriter,
    endpoint: &str,
) -> Result<ExportSummary, ExportError> {
    let content = render_json(result)?;
    let filename = deterministic_filename(&result.source, endpoint, "json");
    let path = writer.write(&filename, &content)?;
    Ok(ExportSummary {
        rows: result.rows.len(),
        path,
    })
}
