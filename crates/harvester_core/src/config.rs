//! Per-source harvest configuration.
//!
//! Everything site-specific (endpoint, selectors, field paths) is data here;
//! the controller, extractor and normalizer are compiled from it once per run.
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::path::PathError;
use crate::row::FieldKind;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// URL template; `{page}`, `{offset}`, `{limit}` and `{token}` are filled per cursor.
    pub endpoint: String,
    /// Base query parameters appended to every request.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body template; when set, pages are requested with POST.
    #[serde(default)]
    pub request_body: Option<String>,
    /// Values for `{name}` placeholders in the endpoint, query and body, such
    /// as the hotel and dates of a rates request.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub format: PageFormat,
    /// Candidate locations of the record list, tried in order.
    #[serde(default = "default_record_paths")]
    pub record_paths: Vec<String>,
    #[serde(default)]
    pub records: RecordLayout,
    /// Location of the total result count the source declares, e.g. `meta.total`.
    #[serde(default)]
    pub total_path: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub children: ChildPolicyConfig,
    /// Column whose value identifies a listing; repeated values are dropped.
    #[serde(default)]
    pub identity_field: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Hard ceiling on pages fetched, for sampling runs.
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl SourceConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum PaginationConfig {
    /// 1-based page numbers; a known page size enables short-page detection.
    PageNumber {
        #[serde(default = "default_first_page")]
        first: u32,
        #[serde(default)]
        page_size: Option<usize>,
    },
    OffsetLimit {
        limit: usize,
    },
    /// Continue only while a link to the next page number is present.
    LinkPresence {
        #[serde(default)]
        link_path: Option<String>,
    },
    /// Continue while the body carries a fresh continuation token.
    NextToken {
        token_path: String,
        #[serde(default)]
        initial: String,
    },
}

/// What a located record path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum RecordLayout {
    #[default]
    List,
    /// A single record object, e.g. the rates response of one hotel.
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub enum PageFormat {
    #[default]
    Json,
    Html(HtmlCatalog),
}

/// Selector catalog turning rendered result cards into raw records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HtmlCatalog {
    pub card: String,
    pub fields: Vec<HtmlField>,
    /// Anchors scanned for the next page number.
    #[serde(default = "default_link_selector")]
    pub page_links: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HtmlField {
    pub name: String,
    pub selector: String,
    /// Attribute to read instead of the element text.
    #[serde(default)]
    pub attr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Fallback paths, tried after `path`.
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub transform: Option<Transform>,
    /// Also pass over `0` and `false` when picking the first value, so a
    /// `[*]` step lands on the first item carrying a real amount.
    #[serde(default)]
    pub skip_falsy: bool,
}

impl FieldConfig {
    pub fn new(name: &str, kind: FieldKind, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.to_string()),
            paths: Vec::new(),
            kind,
            transform: None,
            skip_falsy: false,
        }
    }

    pub fn text(name: &str, path: &str) -> Self {
        Self::new(name, FieldKind::Text, path)
    }

    pub fn number(name: &str, path: &str) -> Self {
        Self::new(name, FieldKind::Number, path)
    }

    pub fn with_fallback(mut self, path: &str) -> Self {
        self.paths.push(path.to_string());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn skipping_falsy(mut self) -> Self {
        self.skip_falsy = true;
        self
    }

    pub(crate) fn all_paths(&self) -> impl Iterator<Item = &str> {
        self.path
            .iter()
            .map(String::as_str)
            .chain(self.paths.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum Transform {
    /// Keep the date of an ISO timestamp (`2026-01-25T12:00:00` -> `2026-01-25`).
    DatePart,
    /// Substitute the value for `{}`.
    Template(String),
    /// Render each list item as its `keys` joined by `/`, items joined by `separator`.
    Join { separator: String, keys: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub enum ChildPolicyConfig {
    #[default]
    None,
    /// One row per nested child, e.g. `rates[*].rooms[*]`.
    Explode(String),
    /// One row with the nested list serialized into the extra column `into`.
    Flatten { path: String, into: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub enum BootstrapConfig {
    #[default]
    None,
    /// Credentials supplied up front.
    Static(BTreeMap<String, String>),
    /// Visit a landing page once and keep the cookies it sets.
    LandingPage {
        url: String,
        #[serde(default)]
        user_agent: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("field {field:?}: {source}")]
    FieldPath {
        field: String,
        #[source]
        source: PathError,
    },
    #[error("field {0:?} declares no path")]
    MissingPath(String),
    #[error("duplicate column {0:?}")]
    DuplicateColumn(String),
    #[error("record path: {0}")]
    RecordPath(#[source] PathError),
    #[error("children path {0:?} must end in [*]")]
    ExplodePath(String),
    #[error("children path: {0}")]
    ChildPath(#[source] PathError),
    #[error("identity field {0:?} is not a declared column")]
    UnknownIdentity(String),
    /// Exploded child rows share the parent identity, so all but one would be dropped.
    #[error("identity field {0:?} cannot be combined with exploded children")]
    IdentityWithExplosion(String),
    #[error("total path: {0}")]
    TotalPath(#[source] PathError),
    #[error("pagination: {0}")]
    Pagination(String),
}

fn default_record_paths() -> Vec<String> {
    vec!["data".to_string(), "entities".to_string(), "$".to_string()]
}

fn default_first_page() -> u32 {
    1
}

fn default_link_selector() -> String {
    "a".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_politeness_delay_ms() -> u64 {
    500
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}
