//! Record normalizer: raw nested records into fixed-shape rows.
//!
//! Missing or mistyped data becomes `Empty`; normalization never fails. Field paths
//! without a `$` anchor resolve against the innermost exploded child first and
//! fall back to its parents, which is how parent fields repeat on child rows.
use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::Value;

use crate::config::{ChildPolicyConfig, ConfigError, FieldConfig, SourceConfig, Transform};
use crate::path::{is_blank, FieldPath};
use crate::row::{FieldKind, FieldValue, NormalizedRow, RowSchema};

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    paths: Vec<FieldPath>,
    kind: FieldKind,
    transform: Option<Transform>,
    skip_falsy: bool,
}

#[derive(Debug, Clone)]
enum Children {
    None,
    Explode(Vec<FieldPath>),
    Flatten(FieldPath),
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<FieldRule>,
    children: Children,
    schema: RowSchema,
}

impl Normalizer {
    pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigError> {
        Self::new(&config.fields, &config.children)
    }

    pub fn new(fields: &[FieldConfig], children: &ChildPolicyConfig) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(fields.len());
        let mut names = HashSet::new();
        for field in fields {
            if !names.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateColumn(field.name.clone()));
            }
            let paths = field
                .all_paths()
                .map(|raw| {
                    FieldPath::parse(raw).map_err(|source| ConfigError::FieldPath {
                        field: field.name.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if paths.is_empty() {
                return Err(ConfigError::MissingPath(field.name.clone()));
            }
            rules.push(FieldRule {
                name: field.name.clone(),
                paths,
                kind: field.kind,
                transform: field.transform.clone(),
                skip_falsy: field.skip_falsy,
            });
        }

        let mut columns: Vec<(String, FieldKind)> = rules
            .iter()
            .map(|rule| (rule.name.clone(), rule.kind))
            .collect();

        let children = match children {
            ChildPolicyConfig::None => Children::None,
            ChildPolicyConfig::Explode(raw) => {
                let path = FieldPath::parse(raw).map_err(ConfigError::ChildPath)?;
                let levels = path
                    .list_levels()
                    .ok_or_else(|| ConfigError::ExplodePath(raw.clone()))?;
                Children::Explode(levels)
            }
            ChildPolicyConfig::Flatten { path, into } => {
                if names.contains(into.as_str()) {
                    return Err(ConfigError::DuplicateColumn(into.clone()));
                }
                let parsed = FieldPath::parse(path).map_err(ConfigError::ChildPath)?;
                // Flatten serializes the outermost list of an explosion key.
                let list = match parsed.list_levels() {
                    Some(mut levels) => levels.remove(0),
                    None => parsed,
                };
                columns.push((into.clone(), FieldKind::Json));
                Children::Flatten(list)
            }
        };

        Ok(Self {
            rules,
            children,
            schema: RowSchema::new(columns),
        })
    }

    /// Normalizer reading each column back from a row rendered by
    /// [`NormalizedRow::to_raw`].
    pub fn identity(schema: &RowSchema) -> Self {
        let rules = schema
            .columns()
            .iter()
            .map(|(name, kind)| FieldRule {
                name: name.clone(),
                paths: vec![FieldPath::key(name)],
                kind: *kind,
                transform: None,
                skip_falsy: false,
            })
            .collect();
        Self {
            rules,
            children: Children::None,
            schema: schema.clone(),
        }
    }

    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    /// Maps one raw record to its rows. Always returns at least one row.
    pub fn normalize(&self, record: &Value) -> Vec<NormalizedRow> {
        match &self.children {
            Children::None => vec![self.build_row(&[record], None)],
            Children::Explode(levels) => {
                let mut rows = Vec::new();
                let mut chain = vec![record];
                self.explode(levels, &mut chain, &mut rows);
                rows
            }
            Children::Flatten(list) => {
                let nested = list
                    .lookup(record)
                    .map(|value| FieldValue::Json(compact_json(value)))
                    .unwrap_or_default();
                vec![self.build_row(&[record], Some(nested))]
            }
        }
    }

    fn explode<'a>(
        &self,
        levels: &[FieldPath],
        chain: &mut Vec<&'a Value>,
        rows: &mut Vec<NormalizedRow>,
    ) {
        let Some(current) = chain.last().copied() else {
            return;
        };
        let children = levels
            .first()
            .and_then(|level| level.resolve(current))
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty());
        match children {
            Some(items) => {
                for item in items {
                    chain.push(item);
                    self.explode(&levels[1..], chain, rows);
                    chain.pop();
                }
            }
            // Missing or empty list: the deepest context reached still yields a row.
            None => rows.push(self.build_row(chain, None)),
        }
    }

    fn build_row(&self, chain: &[&Value], extra: Option<FieldValue>) -> NormalizedRow {
        let mut fields: Vec<(String, FieldValue)> = self
            .rules
            .iter()
            .map(|rule| (rule.name.clone(), rule.evaluate(chain)))
            .collect();
        if let Some(value) = extra {
            if let Some((name, _)) = self.schema.columns().last() {
                fields.push((name.clone(), value));
            }
        }
        NormalizedRow::from_fields(fields)
    }
}

impl FieldRule {
    fn evaluate(&self, chain: &[&Value]) -> FieldValue {
        self.paths
            .iter()
            .filter_map(|path| resolve_scoped(path, chain, self.skip_falsy))
            .map(|raw| match &self.transform {
                Some(transform) => apply_transform(transform, raw),
                None => Cow::Borrowed(raw),
            })
            .map(|value| coerce(&value, self.kind))
            .find(|cell| !cell.is_empty())
            .unwrap_or_default()
    }
}

fn resolve_scoped<'a>(
    path: &FieldPath,
    chain: &[&'a Value],
    skip_falsy: bool,
) -> Option<&'a Value> {
    let lookup = |context: &'a Value| {
        if skip_falsy {
            path.lookup_truthy(context)
        } else {
            path.lookup(context)
        }
    };
    if path.is_anchored() {
        return chain.first().and_then(|root| lookup(*root));
    }
    chain.iter().rev().find_map(|context| lookup(*context))
}

fn apply_transform<'a>(transform: &Transform, value: &'a Value) -> Cow<'a, Value> {
    match transform {
        Transform::DatePart => match value.as_str() {
            Some(text) => Cow::Owned(Value::String(
                text.split('T').next().unwrap_or_default().to_string(),
            )),
            None => Cow::Borrowed(value),
        },
        Transform::Template(template) => match scalar_text(value) {
            Some(text) if !text.is_empty() => {
                Cow::Owned(Value::String(template.replace("{}", &text)))
            }
            _ => Cow::Owned(Value::Null),
        },
        Transform::Join { separator, keys } => {
            let Some(items) = value.as_array() else {
                return Cow::Borrowed(value);
            };
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => keys
                        .iter()
                        .map(|key| map.get(key).and_then(scalar_text).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join("/"),
                    other => scalar_text(other).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
                .join(separator);
            Cow::Owned(Value::String(joined))
        }
    }
}

fn coerce(value: &Value, kind: FieldKind) -> FieldValue {
    if is_blank(value) {
        return FieldValue::Empty;
    }
    match kind {
        FieldKind::Text => match value {
            Value::Array(items) if items.iter().all(is_scalar) => {
                let joined = items
                    .iter()
                    .filter_map(scalar_text)
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                text_cell(joined)
            }
            Value::Array(_) | Value::Object(_) => FieldValue::Text(compact_json(value)),
            scalar => scalar_text(scalar).map(text_cell).unwrap_or_default(),
        },
        FieldKind::Number => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or_default(),
            Value::String(text) => canonical_number(text)
                .map(FieldValue::Number)
                .unwrap_or_default(),
            _ => FieldValue::Empty,
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(x) if x == 0.0 => FieldValue::Bool(false),
                Some(x) if x == 1.0 => FieldValue::Bool(true),
                _ => FieldValue::Empty,
            },
            Value::String(text) => parse_flag(text).map(FieldValue::Bool).unwrap_or_default(),
            _ => FieldValue::Empty,
        },
        FieldKind::Json => match value {
            // Already serialized; keeping it verbatim makes re-normalization stable.
            Value::String(text) => FieldValue::Json(text.trim().to_string()),
            other => FieldValue::Json(compact_json(other)),
        },
    }
}

fn text_cell(text: String) -> FieldValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        FieldValue::Empty
    } else {
        FieldValue::Text(trimmed.to_string())
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compact_json(value: &Value) -> String {
    // serde_json keeps non-ASCII text as-is.
    value.to_string()
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "да" => Some(true),
        "false" | "no" | "0" | "нет" => Some(false),
        _ => None,
    }
}

/// Parses a number formatted with locale punctuation.
///
/// Thin, regular and no-break spaces and apostrophes are thousands separators.
/// When both `.` and `,` occur, the last one is the decimal separator; a single
/// `,` alone is a decimal comma. Text around the first numeric token is ignored,
/// so `"от 1 234,50 ₽"` parses as `1234.5`. A minus sign counts only when it
/// touches the first digit; `"Завтрак - 500 ₽"` is `500`.
pub fn canonical_number(raw: &str) -> Option<f64> {
    let mut previous = None;
    let mut negative = false;
    for c in raw.chars() {
        if c.is_ascii_digit() {
            negative = matches!(previous, Some('-' | '\u{2212}'));
            break;
        }
        previous = Some(c);
    }
    let compact: Vec<char> = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\u{2009}' | '\''))
        .collect();
    let start = compact.iter().position(char::is_ascii_digit)?;
    let token: String = compact[start..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == '.' || **c == ',')
        .collect();
    let token = token.trim_end_matches(['.', ',']);

    let commas = token.matches(',').count();
    let dots = token.matches('.').count();
    let canonical = match (token.rfind('.'), token.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(_)) if commas == 1 => token.replace(',', "."),
        (None, Some(_)) => token.replace(',', ""),
        (Some(_), None) if dots > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };
    let value: f64 = canonical.parse().ok()?;
    value
        .is_finite()
        .then_some(if negative { -value } else { value })
}
