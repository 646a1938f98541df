//! Raw page archive: every page a harvest loads is kept on disk as it was
//! handed to the controller, so the run can be normalized again offline.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use harvester_core::{Cursor, RawPage, SourceConfig};
use serde_json::{json, Value};

use crate::filename::file_stem;
use crate::persist::{AtomicFileWriter, PersistError};

const PAGE_SUFFIX: &str = ".page.json";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path:?} is not an archived page")]
    NotAPage { path: PathBuf },
}

/// Writes one file per cursor, `{stem}--{ordinal:04}.page.json`. A retried
/// cursor overwrites its earlier file.
#[derive(Debug, Clone)]
pub struct RawPageArchive {
    writer: AtomicFileWriter,
    source: String,
    run: String,
}

impl RawPageArchive {
    /// The run is keyed by the endpoint and vars, so each hotel of a batch
    /// gets its own page sequence.
    pub fn new(dir: impl Into<PathBuf>, config: &SourceConfig) -> Self {
        let key = config
            .vars
            .iter()
            .fold(config.endpoint.clone(), |key, (name, value)| {
                format!("{key}&{name}={value}")
            });
        Self {
            writer: AtomicFileWriter::new(dir.into()),
            source: config.name.clone(),
            run: file_stem(&config.name, &key),
        }
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    pub fn store(&self, cursor: &Cursor, page: &RawPage) -> Result<PathBuf, ArchiveError> {
        let document = json!({
            "source": self.source,
            "run": self.run,
            "ordinal": cursor.ordinal(),
            "cursor": cursor.to_string(),
            "has_next_link": page.meta.has_next_link,
            "declared_total": page.meta.declared_total,
            "body": page.body,
        });
        let filename = format!("{}--{:04}{PAGE_SUFFIX}", self.run, cursor.ordinal());
        let content = serde_json::to_vec(&document).map_err(|source| ArchiveError::Json {
            path: self.writer.dir().join(&filename),
            source,
        })?;
        Ok(self.writer.write(&filename, &content)?)
    }
}

/// Pages of one archived run, in fetch order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedRun {
    pub run: String,
    pub pages: Vec<RawPage>,
}

/// Loads every archived run of `source` under `dir`, ordered by run name.
pub fn load_archive(dir: &Path, source: &str) -> Result<Vec<ArchivedRun>, ArchiveError> {
    let io_error = |source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut runs: BTreeMap<String, BTreeMap<u64, RawPage>> = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_page = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(PAGE_SUFFIX));
        if !is_page {
            continue;
        }
        let (page_source, run, ordinal, page) = read_page(&path)?;
        if page_source == source {
            runs.entry(run).or_default().insert(ordinal, page);
        }
    }
    Ok(runs
        .into_iter()
        .map(|(run, pages)| ArchivedRun {
            run,
            pages: pages.into_values().collect(),
        })
        .collect())
}

fn read_page(path: &Path) -> Result<(String, String, u64, RawPage), ArchiveError> {
    let bytes = fs::read(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut document: Value =
        serde_json::from_slice(&bytes).map_err(|source| ArchiveError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let not_a_page = || ArchiveError::NotAPage {
        path: path.to_path_buf(),
    };
    let text = |document: &Value, key: &str| document[key].as_str().map(str::to_string);
    let source = text(&document, "source").ok_or_else(not_a_page)?;
    let run = text(&document, "run").ok_or_else(not_a_page)?;
    let ordinal = document["ordinal"].as_u64().ok_or_else(not_a_page)?;

    let mut page = RawPage::new(document["body"].take());
    if let Some(present) = document["has_next_link"].as_bool() {
        page = page.with_next_link(present);
    }
    if let Some(total) = document["declared_total"].as_u64() {
        page = page.with_declared_total(total);
    }
    Ok((source, run, ordinal, page))
}
