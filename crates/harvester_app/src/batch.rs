//! Batch runs: one harvest of a source per row of an earlier export, e.g. the
//! rooms of every hotel a hotels harvest found.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use harvester_core::SourceConfig;
use harvester_engine::parse_csv;
use serde_json::Value;
use url::Url;

/// Reads the non-empty values of `column` from a CSV or JSON export, in file
/// order and without repeats.
pub fn read_keys(path: &Path, column: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read batch input {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let values = if is_json {
        json_column(&text, column)
    } else {
        csv_column(&text, column)
    }
    .with_context(|| format!("failed to read keys from {}", path.display()))?;

    let mut seen = HashSet::new();
    Ok(values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && seen.insert(value.clone()))
        .collect())
}

fn csv_column(text: &str, column: &str) -> Result<Vec<String>> {
    let header_line = text.lines().next().unwrap_or_default();
    let delimiter = if header_line.contains(';') { ';' } else { ',' };
    let mut rows = parse_csv(text, delimiter).into_iter();
    let Some(header) = rows.next() else {
        bail!("file is empty");
    };
    let Some(index) = header.iter().position(|name| name == column) else {
        bail!("no column {column:?} among {header:?}");
    };
    Ok(rows.filter_map(|mut row| (index < row.len()).then(|| row.swap_remove(index))).collect())
}

fn json_column(text: &str, column: &str) -> Result<Vec<String>> {
    let document: Value = serde_json::from_str(text)?;
    let Some(rows) = document["rows"].as_array() else {
        bail!("document has no rows list");
    };
    Ok(rows
        .iter()
        .filter_map(|row| match &row[column] {
            Value::String(text) => Some(text.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// Value bound into the source for one key: the last path segment of a URL
/// (`/hotel/russia/irkutsk/mid8845720/baikal_hotel/?q=1` gives `baikal_hotel`),
/// or the key itself when it has no path.
pub fn bound_value(key: &str) -> Option<String> {
    let base = Url::parse("https://localhost/").ok()?;
    let url = base.join(key.trim()).ok()?;
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Copy of `config` with `var` set to `value`.
pub fn bind(config: &SourceConfig, var: &str, value: &str) -> SourceConfig {
    let mut bound = config.clone();
    bound.vars.insert(var.to_string(), value.to_string());
    bound
}
