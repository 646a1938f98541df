use std::collections::BTreeMap;

use harvester_core::{Cursor, FetchError, HarvestView, TerminalReason};

/// Credentials obtained once per session and sent with every page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialBag {
    cookies: BTreeMap<String, String>,
}

impl CredentialBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(cookies: BTreeMap<String, String>) -> Self {
        Self { cookies }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value, `None` for an empty bag.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Session setup failed; no page was fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid landing page url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("landing page request failed: {0}")]
    Request(String),
    #[error("landing page answered with status {0}")]
    HttpStatus(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    BootstrapCompleted {
        source: String,
        credentials: usize,
    },
    /// A page was loaded and its rows accepted.
    PageCompleted(HarvestView),
    /// A fetch failed; the controller decides whether it is retried.
    FetchFailed {
        cursor: Cursor,
        attempt: u32,
        error: FetchError,
    },
    HarvestFinished {
        source: String,
        reason: TerminalReason,
        pages: u32,
        rows: usize,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink for callers that only want the final result.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: EngineEvent) {}
}
