//! Declarative paths into schema-less JSON records.
//!
//! Grammar: dot-separated keys, each optionally followed by `[n]` (list index)
//! or `[*]` (first non-empty match among list items). A leading `$` anchors the
//! path at the record root instead of the innermost exploded child.
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Each,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
    #[error("unbalanced brackets in path {0:?}")]
    Unbalanced(String),
    #[error("invalid index {index:?} in path {path:?}")]
    BadIndex { path: String, index: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    anchored: bool,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let (anchored, body) = if trimmed == "$" {
            (true, "")
        } else if let Some(rest) = trimmed.strip_prefix("$.") {
            (true, rest)
        } else if let Some(rest) = trimmed.strip_prefix('$') {
            (true, rest)
        } else {
            (false, trimmed)
        };
        let segments = if body.is_empty() {
            Vec::new()
        } else {
            parse_segments(body, trimmed)?
        };
        Ok(Self {
            raw: trimmed.to_string(),
            anchored,
            segments,
        })
    }

    /// Path addressing the value itself (`$`).
    pub fn root() -> Self {
        Self {
            raw: "$".to_string(),
            anchored: true,
            segments: Vec::new(),
        }
    }

    /// Single-key path, used by identity schemas.
    pub fn key(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            anchored: false,
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the first non-empty value the path reaches, or `None` when any
    /// step along the way is missing, of the wrong type, or empty.
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        walk(value, &self.segments, Skip::Blank)
    }

    /// Like [`FieldPath::lookup`], but `0` and `false` are passed over too.
    pub fn lookup_truthy<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        walk(value, &self.segments, Skip::Falsy)
    }

    /// Like [`FieldPath::lookup`] but returns the leaf even when it is empty.
    /// Used where an empty list is a meaningful answer.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        walk(value, &self.segments, Skip::Nothing)
    }

    /// Splits a path ending in `[*]` into the list path of every level,
    /// e.g. `rates[*].rooms[*]` into `rates` and `rooms`.
    pub fn list_levels(&self) -> Option<Vec<FieldPath>> {
        if self.segments.last() != Some(&Segment::Each) {
            return None;
        }
        let levels = self
            .segments
            .split(|segment| *segment == Segment::Each)
            .filter(|level| !level.is_empty())
            .map(|level| FieldPath {
                raw: render(level),
                anchored: false,
                segments: level.to_vec(),
            })
            .collect::<Vec<_>>();
        let each_count = self
            .segments
            .iter()
            .filter(|segment| **segment == Segment::Each)
            .count();
        // `a[*][*]` has no key between the two levels.
        (levels.len() == each_count).then_some(levels)
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// `null`, blank strings and empty collections all count as "no data".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// `0`, `false` and blanks.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        other => is_blank(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Nothing,
    Blank,
    Falsy,
}

impl Skip {
    fn rejects(self, value: &Value) -> bool {
        match self {
            Skip::Nothing => false,
            Skip::Blank => is_blank(value),
            Skip::Falsy => is_falsy(value),
        }
    }
}

fn walk<'a>(value: &'a Value, segments: &[Segment], skip: Skip) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        return (!skip.rejects(value)).then_some(value);
    };
    // Items of a `[*]` step are always filtered, at least for blanks.
    let item_skip = if skip == Skip::Nothing { Skip::Blank } else { skip };
    match head {
        Segment::Key(key) => walk(value.as_object()?.get(key)?, rest, skip),
        Segment::Index(index) => walk(value.as_array()?.get(*index)?, rest, skip),
        Segment::Each => value
            .as_array()?
            .iter()
            .find_map(|item| walk(item, rest, item_skip)),
    }
}

fn parse_segments(body: &str, full: &str) -> Result<Vec<Segment>, PathError> {
    let mut segments = Vec::new();
    for (position, part) in body.split('.').enumerate() {
        let (name, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if part.contains(']') && rest.is_empty() {
            return Err(PathError::Unbalanced(full.to_string()));
        }
        // Only the very first segment may start with a bracket (`$[0]`).
        if name.is_empty() && (rest.is_empty() || position > 0) {
            return Err(PathError::EmptySegment(full.to_string()));
        }
        if !name.is_empty() {
            segments.push(Segment::Key(name.to_string()));
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .filter(|_| rest.starts_with('['))
                .ok_or_else(|| PathError::Unbalanced(full.to_string()))?;
            let inner = &rest[1..close];
            if inner.contains('[') {
                return Err(PathError::Unbalanced(full.to_string()));
            }
            segments.push(match inner {
                "*" => Segment::Each,
                index => Segment::Index(index.parse().map_err(|_| PathError::BadIndex {
                    path: full.to_string(),
                    index: index.to_string(),
                })?),
            });
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(index) => out.push_str(&format!("[{index}]")),
            Segment::Each => out.push_str("[*]"),
        }
    }
    out
}
