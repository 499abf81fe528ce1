//! Field-level decoding: typed extraction from an untyped document.
//!
//! Every helper reports problems into a shared [`ValidationReport`] instead of
//! returning early, so one pass over a record surfaces all of its field errors.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use sluice_types::{
    ConfigError, FieldPath, Result, ValidationReport, Violation, ViolationKind,
};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("identifier pattern compiles"));

// One cron field: atoms joined by `,` `-` `/` `#`. Letters are only allowed as
// three-letter month or weekday names.
static CRON_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    let atom = r"(?:\*|\?|[0-9]+|JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC|SUN|MON|TUE|WED|THU|FRI|SAT)";
    Regex::new(&format!(r"(?i)^{atom}(?:[-/,#]{atom})*$")).expect("cron pattern compiles")
});

const CRON_MACROS: &[&str] = &[
    "@yearly", "@annually", "@monthly", "@weekly", "@daily", "@midnight", "@hourly",
];

// ---------------------------------------------------------------------------
// FromDocument: the seam every record type decodes through
// ---------------------------------------------------------------------------

/// A configuration record that can be decoded from an untyped document value.
pub trait FromDocument: Sized {
    /// Decode `value` found at `path`, pushing every problem into `report`.
    ///
    /// Returns `None` when the record is unusable; in that case at least one
    /// violation has been reported.
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self>;

    /// Decode a standalone record rooted at the document root.
    fn from_value(value: &Value) -> Result<Self> {
        let mut report = ValidationReport::new();
        let decoded = Self::decode(value, FieldPath::root(), &mut report);
        match decoded {
            Some(record) if report.is_empty() => Ok(record),
            None if report.is_empty() => Err(ConfigError::Other(
                "record decoder produced no value and no violations".into(),
            )),
            _ => Err(ConfigError::Invalid(report)),
        }
    }
}

/// Decode an optional child record stored under `key`.
pub(crate) fn optional_child<T: FromDocument>(
    record: &Record<'_>,
    key: &str,
    report: &mut ValidationReport,
) -> Option<T> {
    record
        .get(key)
        .and_then(|value| T::decode(value, record.field_path(key), report))
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Canonical form of an identifier-like value: trimmed and lowercased.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize `raw` and check it against `^[a-z0-9_]+$`.
pub(crate) fn identifier(
    raw: &str,
    path: &FieldPath,
    report: &mut ValidationReport,
) -> Option<String> {
    let name = normalize_name(raw);
    if name.is_empty() {
        report.push(Violation::new(
            ViolationKind::Format,
            path.clone(),
            "name cannot be empty",
        ));
        return None;
    }
    if !IDENTIFIER.is_match(&name) {
        report.push(Violation::new(
            ViolationKind::Format,
            path.clone(),
            format!("name '{name}' must contain only lowercase letters, digits, and underscores"),
        ));
        return None;
    }
    Some(name)
}

/// Accepts five-field cron expressions and the `@daily`-style macros.
pub(crate) fn is_valid_cron(expr: &str) -> bool {
    let expr = expr.trim();
    if expr.starts_with('@') {
        return CRON_MACROS.contains(&expr.to_lowercase().as_str());
    }
    let fields: Vec<_> = expr.split_whitespace().collect();
    fields.len() == 5 && fields.iter().all(|f| CRON_FIELD.is_match(f))
}

/// Integer coercion: whole numbers, integral floats, and numeric strings.
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Record: a mapping under decode
// ---------------------------------------------------------------------------

/// A mapping being decoded, paired with its location in the document.
pub(crate) struct Record<'a> {
    path: FieldPath,
    map: &'a Map<String, Value>,
}

impl<'a> Record<'a> {
    /// Open `value` as a mapping, reporting a type violation otherwise.
    pub fn open(value: &'a Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self { path, map }),
            other => {
                report.push(Violation::type_mismatch(path, "mapping", type_name(other)));
                None
            }
        }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn field_path(&self, key: &str) -> FieldPath {
        self.path.key(key)
    }

    /// Raw value under `key`. An explicit `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    /// `true` when `key` holds something other than null or a blank string.
    pub fn is_set(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// Log keys this record does not understand. Unknown keys are not errors.
    pub fn ignore_unknown(&self, known: &[&str]) {
        for key in self.map.keys() {
            if !known.contains(&key.as_str()) {
                tracing::debug!(path = %self.path, key = %key, "Ignoring unknown field");
            }
        }
    }

    /// A string field that must be present and non-blank.
    pub fn required_str(&self, key: &str, report: &mut ValidationReport) -> Option<String> {
        match self.get(key) {
            None => {
                report.push(Violation::missing(self.field_path(key), key));
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                report.push(Violation::new(
                    ViolationKind::Format,
                    self.field_path(key),
                    format!("field '{key}' must not be blank"),
                ));
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                report.push(Violation::type_mismatch(
                    self.field_path(key),
                    "string",
                    type_name(other),
                ));
                None
            }
        }
    }

    /// An optional string field; blank strings count as absent.
    pub fn optional_str(&self, key: &str, report: &mut ValidationReport) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => {
                report.push(Violation::type_mismatch(
                    self.field_path(key),
                    "string",
                    type_name(other),
                ));
                None
            }
        }
    }

    /// A string field that must be present and a valid identifier.
    pub fn required_identifier(&self, key: &str, report: &mut ValidationReport) -> Option<String> {
        let raw = self.required_str(key, report)?;
        identifier(&raw, &self.field_path(key), report)
    }

    /// An optional integer constrained to `min..=max`.
    ///
    /// `Err(())` signals a reported violation; `Ok(None)` means absent.
    pub fn integer_in(
        &self,
        key: &str,
        min: Option<i64>,
        max: Option<i64>,
        report: &mut ValidationReport,
    ) -> std::result::Result<Option<i64>, ()> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let Some(n) = coerce_integer(value) else {
            report.push(Violation::type_mismatch(
                self.field_path(key),
                "integer",
                type_name(value),
            ));
            return Err(());
        };
        let below = min.is_some_and(|lo| n < lo);
        let above = max.is_some_and(|hi| n > hi);
        if below || above {
            let bound = match (min, max) {
                (Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                (Some(lo), None) => format!("at least {lo}"),
                (None, Some(hi)) => format!("at most {hi}"),
                (None, None) => unreachable!("no bound can be violated"),
            };
            report.push(Violation::new(
                ViolationKind::Range,
                self.field_path(key),
                format!("'{key}' must be {bound}, got {n}"),
            ));
            return Err(());
        }
        Ok(Some(n))
    }

    /// A boolean field with a default.
    pub fn bool_or(&self, key: &str, default: bool, report: &mut ValidationReport) -> bool {
        let Some(value) = self.get(key) else {
            return default;
        };
        coerce_bool(value).unwrap_or_else(|| {
            report.push(Violation::type_mismatch(
                self.field_path(key),
                "boolean",
                type_name(value),
            ));
            default
        })
    }

    /// A sequence of strings, each paired with its position in the source
    /// sequence. Non-string entries are reported and skipped. Absent means empty.
    pub fn string_list(&self, key: &str, report: &mut ValidationReport) -> Vec<(usize, String)> {
        let Some(value) = self.get(key) else {
            return Vec::new();
        };
        let Value::Array(items) = value else {
            report.push(Violation::type_mismatch(
                self.field_path(key),
                "sequence",
                type_name(value),
            ));
            return Vec::new();
        };
        let path = self.field_path(key);
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::String(s) => Some((i, s.clone())),
                other => {
                    report.push(Violation::type_mismatch(path.index(i), "string", type_name(other)));
                    None
                }
            })
            .collect()
    }

    /// A free-form mapping (options, params, metadata). Absent means empty.
    pub fn mapping(&self, key: &str, report: &mut ValidationReport) -> Map<String, Value> {
        match self.get(key) {
            None => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                report.push(Violation::type_mismatch(
                    self.field_path(key),
                    "mapping",
                    type_name(other),
                ));
                Map::new()
            }
        }
    }
}

/// Report repeated entries in `items`, one violation per repeat. Each entry
/// carries its index in the source sequence, which the violation path uses.
pub(crate) fn report_duplicates(
    items: &[(usize, String)],
    path: &FieldPath,
    what: &str,
    report: &mut ValidationReport,
) {
    for (seen, (index, item)) in items.iter().enumerate() {
        if items[..seen].iter().any(|(_, earlier)| earlier == item) {
            report.push(Violation::new(
                ViolationKind::DuplicateName,
                path.index(*index),
                format!("duplicate {what} '{item}'"),
            ));
        }
    }
}
