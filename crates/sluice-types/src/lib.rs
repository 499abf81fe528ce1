//! Shared types for validating Sluice pipeline configuration.
//!
//! This crate provides the vocabulary used by every other Sluice crate:
//! - `ViolationKind`: the taxonomy of rules a document can break
//! - `FieldPath`: location of a value inside the source document
//! - `Violation` / `ValidationReport`: structured `(path, rule, message)` findings
//! - `ConfigError`: unified error type and the `Result` alias

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ViolationKind: which rule a document broke
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required field is absent.
    MissingField,
    /// A value is present but cannot be coerced to the declared type.
    TypeCoercion,
    /// A numeric value or collection length is out of bounds.
    Range,
    /// A string does not match its required pattern.
    Format,
    /// Zero or several fields set where exactly one is required.
    MutualExclusion,
    /// A job name or dependency entry is repeated.
    DuplicateName,
    /// `depends_on` names a job that is not declared.
    DanglingReference,
    /// The dependency graph contains a cycle.
    Cycle,
}

impl ViolationKind {
    /// Stable snake_case rule name, used in reports and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MissingField => "missing_field",
            ViolationKind::TypeCoercion => "type_coercion",
            ViolationKind::Range => "range",
            ViolationKind::Format => "format",
            ViolationKind::MutualExclusion => "mutual_exclusion",
            ViolationKind::DuplicateName => "duplicate_name",
            ViolationKind::DanglingReference => "dangling_reference",
            ViolationKind::Cycle => "cycle",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldPath: dotted/indexed location inside the document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a value inside the source document, e.g. `jobs[2].read.path`.
///
/// Paths are cheap to extend: [`key`](FieldPath::key) and
/// [`index`](FieldPath::index) return a new path and leave `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Path to a mapping key below `self`.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self { segments }
    }

    /// Path to a sequence element below `self`.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Violation: one (path, rule, message) finding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: FieldPath,
    #[serde(rename = "rule")]
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// A required field is absent at `path`; the message names the last key.
    pub fn missing(path: FieldPath, field: &str) -> Self {
        Self::new(
            ViolationKind::MissingField,
            path,
            format!("field '{field}' is required"),
        )
    }

    /// A value at `path` has the wrong type.
    pub fn type_mismatch(path: FieldPath, expected: &str, actual: &str) -> Self {
        Self::new(
            ViolationKind::TypeCoercion,
            path,
            format!("expected {expected}, got {actual}"),
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
    }
}

// ---------------------------------------------------------------------------
// ValidationReport: every violation found for one document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.violations.iter()
    }

    /// Violations of a single kind, in discovery order.
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    /// `Ok(value)` when nothing was reported, otherwise [`ConfigError::Invalid`].
    pub fn into_result<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(ConfigError::Invalid(self))
        }
    }
}

impl Extend<Violation> for ValidationReport {
    fn extend<I: IntoIterator<Item = Violation>>(&mut self, iter: I) {
        self.violations.extend(iter);
    }
}

impl FromIterator<Violation> for ValidationReport {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self {
            violations: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ValidationReport {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationReport {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{v}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigError: unified error type
// ---------------------------------------------------------------------------

/// Unified error type for all Sluice crates.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration invalid: {0}")]
    Invalid(ValidationReport),

    #[error("{format} parse error: {message}")]
    Parse { format: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ConfigError {
    /// The validation report, when the error came from validation.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ConfigError::Invalid(report) => Some(report),
            _ => None,
        }
    }

    /// Returns `true` if resubmitting the same input can never succeed.
    ///
    /// Validation and parsing are deterministic; only I/O may be transient.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfigError::Io(_))
    }
}

/// A convenience alias for `Result<T, ConfigError>`.
pub type Result<T> = std::result::Result<T, ConfigError>;
