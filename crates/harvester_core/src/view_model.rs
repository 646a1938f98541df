use crate::{Cursor, TerminalReason};

/// Progress snapshot for logs and progress sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestView {
    pub source: String,
    pub pages: u32,
    pub rows: usize,
    pub duplicates_skipped: usize,
    pub declared_total: Option<u64>,
    pub cursor: Option<Cursor>,
    pub attempt: u32,
    pub finished: Option<TerminalReason>,
}
