use std::fmt;

use serde_json::Value;

use crate::config::{ConfigError, PaginationConfig};
use crate::page::RawPage;
use crate::path::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// 1-based page number.
    Page(u32),
    Offset { offset: usize, limit: usize },
    Token(String),
}

/// Position in a result set. `ordinal` counts successful advances and only
/// ever grows; retries reuse the same cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    ordinal: u32,
    position: Position,
}

impl Cursor {
    pub fn new(position: Position) -> Self {
        Self {
            ordinal: 0,
            position,
        }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// 1-based page count, for logs.
    pub fn page(&self) -> u32 {
        self.ordinal + 1
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    fn advance(&self, position: Position) -> Self {
        Self {
            ordinal: self.ordinal + 1,
            position,
        }
    }

    /// Template substitutions for `{page}`, `{offset}`, `{limit}` and `{token}`.
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        match &self.position {
            Position::Page(page) => vec![("page", page.to_string())],
            Position::Offset { offset, limit } => vec![
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("page", (offset / (*limit).max(1) + 1).to_string()),
            ],
            Position::Token(token) => vec![("token", token.clone()), ("page", self.page().to_string())],
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Position::Page(page) => write!(f, "page={page}"),
            Position::Offset { offset, limit } => write!(f, "offset={offset} limit={limit}"),
            Position::Token(token) => write!(f, "token={token:?}"),
        }
    }
}

/// What the addressing scheme says after a full page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Next(Cursor),
    NoMoreLink,
}

#[derive(Debug, Clone)]
pub enum Pagination {
    PageNumber { first: u32, page_size: Option<usize> },
    OffsetLimit { limit: usize },
    LinkPresence { link: Option<FieldPath> },
    NextToken { token: FieldPath, initial: String },
}

impl Pagination {
    pub fn from_config(config: &PaginationConfig) -> Result<Self, ConfigError> {
        Ok(match config {
            PaginationConfig::PageNumber { first, page_size } => {
                if *page_size == Some(0) {
                    return Err(ConfigError::Pagination("page_size must be positive".into()));
                }
                Pagination::PageNumber {
                    first: *first,
                    page_size: *page_size,
                }
            }
            PaginationConfig::OffsetLimit { limit } => {
                if *limit == 0 {
                    return Err(ConfigError::Pagination("limit must be positive".into()));
                }
                Pagination::OffsetLimit { limit: *limit }
            }
            PaginationConfig::LinkPresence { link_path } => Pagination::LinkPresence {
                link: link_path
                    .as_deref()
                    .map(FieldPath::parse)
                    .transpose()
                    .map_err(|err| ConfigError::Pagination(err.to_string()))?,
            },
            PaginationConfig::NextToken { token_path, initial } => Pagination::NextToken {
                token: FieldPath::parse(token_path)
                    .map_err(|err| ConfigError::Pagination(err.to_string()))?,
                initial: initial.clone(),
            },
        })
    }

    pub fn first_cursor(&self) -> Cursor {
        Cursor::new(match self {
            Pagination::PageNumber { first, .. } => Position::Page(*first),
            Pagination::OffsetLimit { limit } => Position::Offset {
                offset: 0,
                limit: *limit,
            },
            Pagination::LinkPresence { .. } => Position::Page(1),
            Pagination::NextToken { initial, .. } => Position::Token(initial.clone()),
        })
    }

    /// Expected records per full page, when the scheme knows it.
    pub fn page_size(&self) -> Option<usize> {
        match self {
            Pagination::PageNumber { page_size, .. } => *page_size,
            Pagination::OffsetLimit { limit } => Some(*limit),
            Pagination::LinkPresence { .. } | Pagination::NextToken { .. } => None,
        }
    }

    /// Decides where to go after `page` was loaded at `cursor`.
    pub fn next(&self, cursor: &Cursor, page: &RawPage) -> Continuation {
        match (self, cursor.position()) {
            (Pagination::PageNumber { .. }, Position::Page(n)) => {
                Continuation::Next(cursor.advance(Position::Page(n + 1)))
            }
            (Pagination::OffsetLimit { .. }, Position::Offset { offset, limit }) => {
                Continuation::Next(cursor.advance(Position::Offset {
                    offset: offset + limit,
                    limit: *limit,
                }))
            }
            (Pagination::LinkPresence { link }, Position::Page(n)) => {
                let present = page.meta.has_next_link.unwrap_or_else(|| {
                    link.as_ref()
                        .is_some_and(|path| path.lookup(&page.body).is_some())
                });
                if present {
                    Continuation::Next(cursor.advance(Position::Page(n + 1)))
                } else {
                    Continuation::NoMoreLink
                }
            }
            (Pagination::NextToken { token, .. }, Position::Token(current)) => {
                match token.lookup(&page.body).and_then(token_text) {
                    Some(next) if next != *current => {
                        Continuation::Next(cursor.advance(Position::Token(next)))
                    }
                    _ => Continuation::NoMoreLink,
                }
            }
            // A cursor from another scheme cannot be advanced.
            _ => Continuation::NoMoreLink,
        }
    }
}

fn token_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
