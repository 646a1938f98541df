//! Ledger of finished harvests, kept next to the exports as RON.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::HarvestResult;
use harvester_engine::{ensure_output_dir, AtomicFileWriter};
use serde::{Deserialize, Serialize};

const LEDGER_FILENAME: &str = ".harvest_runs.ron";
const MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub source: String,
    pub endpoint: String,
    pub started_utc: String,
    pub finished_utc: String,
    pub terminal_reason: String,
    pub complete: bool,
    pub pages: u32,
    pub rows: usize,
    pub duplicates_skipped: usize,
    #[serde(default)]
    pub declared_total: Option<u64>,
    pub outputs: Vec<PathBuf>,
}

impl RunRecord {
    pub fn new(
        result: &HarvestResult,
        endpoint: &str,
        started: DateTime<Utc>,
        outputs: Vec<PathBuf>,
    ) -> Self {
        Self {
            source: result.source.clone(),
            endpoint: endpoint.to_string(),
            started_utc: started.to_rfc3339(),
            finished_utc: Utc::now().to_rfc3339(),
            terminal_reason: result.reason.label().to_string(),
            complete: result.reason.is_complete(),
            pages: result.pages,
            rows: result.rows.len(),
            duplicates_skipped: result.duplicates_skipped,
            declared_total: result.declared_total,
            outputs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLedger {
    runs: Vec<RunRecord>,
}

impl RunLedger {
    /// Appends a run, dropping the oldest entries past the ledger size.
    pub fn record(&mut self, run: RunRecord) {
        self.runs.push(run);
        if self.runs.len() > MAX_ENTRIES {
            let excess = self.runs.len() - MAX_ENTRIES;
            self.runs.drain(..excess);
        }
    }

    pub fn last_for(&self, source: &str) -> Option<&RunRecord> {
        self.runs.iter().rev().find(|run| run.source == source)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }
}

/// Reads the ledger; a missing or unreadable file yields an empty one.
pub fn load(output_dir: &Path) -> RunLedger {
    let path = output_dir.join(LEDGER_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return RunLedger::default();
        }
        Err(err) => {
            engine_warn!("Failed to read run ledger from {:?}: {}", path, err);
            return RunLedger::default();
        }
    };

    match ron::from_str::<RunLedger>(&content) {
        Ok(ledger) => {
            engine_info!("Loaded {} recorded runs from {:?}", ledger.len(), path);
            ledger
        }
        Err(err) => {
            engine_warn!("Failed to parse run ledger from {:?}: {}", path, err);
            RunLedger::default()
        }
    }
}

pub fn save(output_dir: &Path, ledger: &RunLedger) {
    if let Err(err) = ensure_output_dir(output_dir) {
        engine_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let content = match ron::ser::to_string_pretty(ledger, ron::ser::PrettyConfig::new()) {
        Ok(text) => text,
        Err(err) => {
            engine_error!("Failed to serialize run ledger: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    if let Err(err) = writer.write(LEDGER_FILENAME, content.as_bytes()) {
        engine_error!("Failed to write run ledger to {:?}: {}", output_dir, err);
    }
}
