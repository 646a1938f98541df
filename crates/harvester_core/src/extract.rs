use serde_json::Value;

use crate::config::{ConfigError, RecordLayout, SourceConfig};
use crate::path::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no record list under any of {tried:?}")]
    NoRecordList { tried: Vec<String> },
}

/// Locates the record list of a page by trying candidate paths in order.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    candidates: Vec<FieldPath>,
    layout: RecordLayout,
}

impl Default for PageExtractor {
    fn default() -> Self {
        Self::new(vec![
            FieldPath::key("data"),
            FieldPath::key("entities"),
            FieldPath::root(),
        ])
    }
}

impl PageExtractor {
    pub fn new(candidates: Vec<FieldPath>) -> Self {
        Self {
            candidates,
            layout: RecordLayout::List,
        }
    }

    pub fn with_layout(mut self, layout: RecordLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigError> {
        let candidates = config
            .record_paths
            .iter()
            .map(|raw| FieldPath::parse(raw).map_err(ConfigError::RecordPath))
            .collect::<Result<Vec<_>, _>>()?;
        let extractor = if candidates.is_empty() {
            Self::default()
        } else {
            Self::new(candidates)
        };
        Ok(extractor.with_layout(config.records))
    }

    /// Returns the first candidate that resolves to a list. A candidate holding
    /// anything else (e.g. an object under `data`) is skipped. With the
    /// `Single` layout the first non-empty object is the only record.
    pub fn try_extract<'p>(&self, body: &'p Value) -> Result<&'p [Value], ExtractionError> {
        let found = match self.layout {
            RecordLayout::List => self
                .candidates
                .iter()
                .find_map(|candidate| candidate.resolve(body).and_then(Value::as_array))
                .map(Vec::as_slice),
            RecordLayout::Single => self.candidates.iter().find_map(|candidate| {
                candidate
                    .lookup(body)
                    .filter(|value| value.is_object())
                    .map(std::slice::from_ref)
            }),
        };
        found.ok_or_else(|| ExtractionError::NoRecordList {
            tried: self
                .candidates
                .iter()
                .map(|candidate| candidate.as_str().to_string())
                .collect(),
        })
    }

    /// Soft variant: a page without a record list has no records.
    pub fn extract<'p>(&self, body: &'p Value) -> &'p [Value] {
        self.try_extract(body).unwrap_or_default()
    }
}
