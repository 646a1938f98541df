use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::config::{ChildPolicyConfig, ConfigError, RetryPolicy, SourceConfig};
use crate::cursor::{Cursor, Pagination};
use crate::extract::PageExtractor;
use crate::normalize::{canonical_number, Normalizer};
use crate::page::RawPage;
use crate::path::FieldPath;
use crate::row::{NormalizedRow, RowSchema};
use crate::view_model::HarvestView;
use crate::FetchError;

/// Why a harvest stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// A page yielded no records.
    Empty,
    /// A page yielded fewer records than the page size.
    ShortPage,
    /// The continuation link or token was absent.
    NoMoreLink,
    PageLimitReached,
    /// Retries exhausted; rows from earlier pages are kept.
    FetchError(FetchError),
    Cancelled,
}

impl TerminalReason {
    pub fn label(&self) -> &'static str {
        match self {
            TerminalReason::Empty => "EMPTY",
            TerminalReason::ShortPage => "SHORT_PAGE",
            TerminalReason::NoMoreLink => "NO_MORE_LINK",
            TerminalReason::PageLimitReached => "PAGE_LIMIT_REACHED",
            TerminalReason::FetchError(_) => "FETCH_ERROR",
            TerminalReason::Cancelled => "CANCELLED",
        }
    }

    /// True when the result set was walked to its natural end.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            TerminalReason::Empty | TerminalReason::ShortPage | TerminalReason::NoMoreLink
        )
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::FetchError(err) => write!(f, "{} ({err})", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching { cursor: Cursor, attempt: u32 },
    Sleeping { cursor: Cursor, attempt: u32 },
    Finished(TerminalReason),
}

/// Immutable snapshot handed to the caller when a harvest ends.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestResult {
    pub source: String,
    pub schema: RowSchema,
    pub rows: Vec<NormalizedRow>,
    pub pages: u32,
    pub duplicates_skipped: usize,
    pub soft_failures: usize,
    /// Result count the source reported, when it reports one.
    pub declared_total: Option<u64>,
    pub reason: TerminalReason,
}

impl HarvestResult {
    /// Folds a later harvest of the same source into this one.
    ///
    /// Counters add up; the first incomplete terminal reason wins so a batch
    /// with one failed part is reported as partial.
    pub fn append(&mut self, other: HarvestResult) {
        self.rows.extend(other.rows);
        self.pages += other.pages;
        self.duplicates_skipped += other.duplicates_skipped;
        self.soft_failures += other.soft_failures;
        self.declared_total = match (self.declared_total, other.declared_total) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        if self.reason.is_complete() && !other.reason.is_complete() {
            self.reason = other.reason;
        }
    }
}

/// Pagination controller state for one harvest.
#[derive(Debug, Clone)]
pub struct HarvestState {
    source: String,
    pagination: Pagination,
    extractor: PageExtractor,
    normalizer: Normalizer,
    retry: RetryPolicy,
    politeness: Duration,
    max_pages: Option<u32>,
    identity_column: Option<usize>,
    seen_identities: HashSet<String>,
    total_path: Option<FieldPath>,
    declared_total: Option<u64>,
    phase: Phase,
    rows: Vec<NormalizedRow>,
    pages: u32,
    duplicates_skipped: usize,
    soft_failures: usize,
    cancel_requested: bool,
}

impl HarvestState {
    pub fn new(config: &SourceConfig) -> Result<Self, ConfigError> {
        let normalizer = Normalizer::from_config(config)?;
        let identity_column = config
            .identity_field
            .as_deref()
            .map(|name| {
                normalizer
                    .schema()
                    .position(name)
                    .ok_or_else(|| ConfigError::UnknownIdentity(name.to_string()))
            })
            .transpose()?;
        if let (Some(name), ChildPolicyConfig::Explode(_)) =
            (&config.identity_field, &config.children)
        {
            return Err(ConfigError::IdentityWithExplosion(name.clone()));
        }
        let total_path = config
            .total_path
            .as_deref()
            .map(FieldPath::parse)
            .transpose()
            .map_err(ConfigError::TotalPath)?;
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::Pagination(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            source: config.name.clone(),
            pagination: Pagination::from_config(&config.pagination)?,
            extractor: PageExtractor::from_config(config)?,
            normalizer,
            retry: config.retry,
            politeness: config.politeness_delay(),
            max_pages: config.max_pages,
            identity_column,
            seen_identities: HashSet::new(),
            total_path,
            declared_total: None,
            phase: Phase::Idle,
            rows: Vec::new(),
            pages: 0,
            duplicates_skipped: 0,
            soft_failures: 0,
            cancel_requested: false,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    pub fn schema(&self) -> &RowSchema {
        self.normalizer.schema()
    }

    pub fn declared_total(&self) -> Option<u64> {
        self.declared_total
    }

    pub fn terminal_reason(&self) -> Option<&TerminalReason> {
        match &self.phase {
            Phase::Finished(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn view(&self) -> HarvestView {
        let (cursor, attempt) = match &self.phase {
            Phase::Fetching { cursor, attempt } | Phase::Sleeping { cursor, attempt } => {
                (Some(cursor.clone()), *attempt)
            }
            Phase::Idle | Phase::Finished(_) => (None, 0),
        };
        HarvestView {
            source: self.source.clone(),
            pages: self.pages,
            rows: self.rows.len(),
            duplicates_skipped: self.duplicates_skipped,
            declared_total: self.declared_total,
            cursor,
            attempt,
            finished: self.terminal_reason().cloned(),
        }
    }

    /// Hands the accumulated rows over. Returns `None` until the harvest has
    /// reached a terminal state.
    pub fn into_result(self) -> Option<HarvestResult> {
        let Phase::Finished(reason) = self.phase else {
            return None;
        };
        Some(HarvestResult {
            schema: self.normalizer.schema().clone(),
            source: self.source,
            rows: self.rows,
            pages: self.pages,
            duplicates_skipped: self.duplicates_skipped,
            soft_failures: self.soft_failures,
            declared_total: self.declared_total,
            reason,
        })
    }

    pub(crate) fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub(crate) fn extractor(&self) -> &PageExtractor {
        &self.extractor
    }

    pub(crate) fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub(crate) fn politeness(&self) -> Duration {
        self.politeness
    }

    pub(crate) fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn take_phase(&mut self) -> Phase {
        std::mem::replace(&mut self.phase, Phase::Idle)
    }

    /// Takes the total from the transport's page metadata, else from the
    /// configured body path. Returns the total when it changed.
    pub(crate) fn note_declared_total(&mut self, page: &RawPage) -> Option<u64> {
        let total = page.meta.declared_total.or_else(|| {
            self.total_path
                .as_ref()
                .and_then(|path| path.lookup(&page.body))
                .and_then(count_value)
        })?;
        if self.declared_total == Some(total) {
            return None;
        }
        self.declared_total = Some(total);
        Some(total)
    }

    pub(crate) fn record_page(&mut self) {
        self.pages += 1;
    }

    pub(crate) fn record_soft_failure(&mut self) {
        self.soft_failures += 1;
    }

    /// Appends a row unless its identity was already harvested this run.
    pub(crate) fn accept_row(&mut self, row: NormalizedRow) {
        if let Some(column) = self.identity_column {
            let identity = row
                .fields()
                .get(column)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
            if !identity.is_empty() && !self.seen_identities.insert(identity) {
                self.duplicates_skipped += 1;
                return;
            }
        }
        self.rows.push(row);
    }
}

fn count_value(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(text) => canonical_number(text)?,
        _ => return None,
    };
    (number >= 0.0).then(|| number as u64)
}
