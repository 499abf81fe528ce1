//! Typed configuration records below the pipeline level.
//!
//! Each record implements [`FromDocument`] and deserializes through it, so a
//! value of any of these types has passed its field-level rules. Serializing a
//! record emits its canonical document form: normalized names, defaults
//! written out, absent optionals omitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sluice_types::{ConfigError, FieldPath, ValidationReport, Violation, ViolationKind};

use crate::decode::{
    identifier, is_valid_cron, normalize_name, optional_child, report_duplicates, FromDocument,
    Record,
};
use crate::exclusive::{at_least_one, exactly_one};

/// Implements `TryFrom<Value>` through [`FromDocument`] so that
/// `#[serde(try_from = "Value")]` routes deserialization through the decoder.
macro_rules! deserialize_via_decoder {
    ($($ty:ty),* $(,)?) => {$(
        impl TryFrom<Value> for $ty {
            type Error = ConfigError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                <$ty as FromDocument>::from_value(&value)
            }
        }
    )*};
}

fn enum_violation(path: FieldPath, allowed: &[&str], got: &str) -> Violation {
    let allowed = allowed
        .iter()
        .map(|a| format!("'{a}'"))
        .collect::<Vec<_>>()
        .join(", ");
    Violation::new(
        ViolationKind::Format,
        path,
        format!("must be one of {allowed}, got '{got}'"),
    )
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Storage backend, discriminated by the `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", try_from = "Value")]
pub enum StorageConfig {
    #[serde(rename = "local")]
    Local { base_path: String },
    #[serde(rename = "s3")]
    S3 {
        bucket: String,
        region: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    #[serde(rename = "azure")]
    AzureBlob { account: String, container: String },
}

impl StorageConfig {
    const TAGS: &'static [&'static str] = &["local", "s3", "azure"];

    /// The `type` tag this variant serializes with.
    pub fn tag(&self) -> &'static str {
        match self {
            StorageConfig::Local { .. } => "local",
            StorageConfig::S3 { .. } => "s3",
            StorageConfig::AzureBlob { .. } => "azure",
        }
    }
}

impl FromDocument for StorageConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        let tag = normalize_name(&rec.required_str("type", report)?);
        let before = report.len();
        match tag.as_str() {
            "local" => {
                rec.ignore_unknown(&["type", "base_path"]);
                let base_path = rec.required_str("base_path", report)?;
                Some(StorageConfig::Local { base_path })
            }
            "s3" => {
                rec.ignore_unknown(&["type", "bucket", "region", "prefix"]);
                let bucket = rec.required_str("bucket", report);
                let region = rec.required_str("region", report);
                let prefix = rec.optional_str("prefix", report);
                if report.len() > before {
                    return None;
                }
                Some(StorageConfig::S3 {
                    bucket: bucket?,
                    region: region?,
                    prefix,
                })
            }
            "azure" | "azure_blob" => {
                rec.ignore_unknown(&["type", "account", "container"]);
                let account = rec.required_str("account", report);
                let container = rec.required_str("container", report);
                Some(StorageConfig::AzureBlob {
                    account: account?,
                    container: container?,
                })
            }
            other => {
                report.push(enum_violation(rec.field_path("type"), Self::TAGS, other));
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Where a read or write points: a file path or a table, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLocation {
    Path(String),
    Table(String),
}

impl DataLocation {
    fn decode(rec: &Record<'_>, report: &mut ValidationReport) -> Option<Self> {
        let path = rec.optional_str("path", report);
        let table = rec.optional_str("table", report);
        let candidates = [("path", rec.is_set("path")), ("table", rec.is_set("table"))];
        if !exactly_one(rec.path(), &candidates, report) {
            return None;
        }
        path.map(DataLocation::Path)
            .or_else(|| table.map(DataLocation::Table))
    }
}

impl DataLocation {
    fn describe(&self) -> String {
        match self {
            DataLocation::Path(path) => format!("path '{path}'"),
            DataLocation::Table(table) => format!("table '{table}'"),
        }
    }
}

/// Delta data is addressed by table; a delta read or write with a file path
/// is rejected.
fn check_delta_location(
    rec: &Record<'_>,
    format: Option<&str>,
    location: Option<&DataLocation>,
    report: &mut ValidationReport,
) {
    let is_delta = format.is_some_and(|f| normalize_name(f) == "delta");
    if is_delta && matches!(location, Some(DataLocation::Path(_))) {
        report.push(Violation::new(
            ViolationKind::Format,
            rec.field_path("path"),
            "format 'delta' requires 'table', not 'path'",
        ));
    }
}

const READ_FIELDS: &[&str] = &["connection", "format", "path", "table", "options"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ReadConfig {
    /// Name of a connection resolved elsewhere; only its presence is checked.
    pub connection: String,
    pub format: String,
    #[serde(flatten)]
    pub location: DataLocation,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl FromDocument for ReadConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(READ_FIELDS);
        let before = report.len();
        let connection = rec.required_str("connection", report);
        let format = rec.required_str("format", report);
        let location = DataLocation::decode(&rec, report);
        check_delta_location(&rec, format.as_deref(), location.as_ref(), report);
        let options = rec.mapping("options", report);
        if report.len() > before {
            return None;
        }
        Some(ReadConfig {
            connection: connection?,
            format: format?,
            location: location?,
            options,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

const WRITE_FIELDS: &[&str] = &["connection", "format", "path", "table", "mode", "options"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct WriteConfig {
    pub connection: String,
    pub format: String,
    #[serde(flatten)]
    pub location: DataLocation,
    pub mode: WriteMode,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl FromDocument for WriteConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(WRITE_FIELDS);
        let before = report.len();
        let connection = rec.required_str("connection", report);
        let format = rec.required_str("format", report);
        let location = DataLocation::decode(&rec, report);
        check_delta_location(&rec, format.as_deref(), location.as_ref(), report);
        let mode = match rec.optional_str("mode", report) {
            None => WriteMode::default(),
            Some(raw) => match normalize_name(&raw).as_str() {
                "overwrite" => WriteMode::Overwrite,
                "append" => WriteMode::Append,
                other => {
                    report.push(enum_violation(
                        rec.field_path("mode"),
                        &["overwrite", "append"],
                        other,
                    ));
                    WriteMode::default()
                }
            },
        };
        let options = rec.mapping("options", report);
        if report.len() > before {
            return None;
        }
        Some(WriteConfig {
            connection: connection?,
            format: format?,
            location: location?,
            mode,
            options,
        })
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// What a transform step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Sql(String),
    Function(String),
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct TransformStep {
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl FromDocument for TransformStep {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(&["sql", "function", "operation", "params"]);
        let before = report.len();
        let sql = rec.optional_str("sql", report);
        let function = rec.optional_str("function", report);
        let operation = rec.optional_str("operation", report);
        let params = rec.mapping("params", report);
        let candidates = [
            ("sql", rec.is_set("sql")),
            ("function", rec.is_set("function")),
            ("operation", rec.is_set("operation")),
        ];
        exactly_one(rec.path(), &candidates, report);
        if report.len() > before {
            return None;
        }
        let kind = sql
            .map(StepKind::Sql)
            .or_else(|| function.map(StepKind::Function))
            .or_else(|| operation.map(StepKind::Operation))?;
        Some(TransformStep { kind, params })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct TransformConfig {
    pub steps: Vec<TransformStep>,
}

impl FromDocument for TransformConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(&["steps"]);
        let steps_path = rec.field_path("steps");
        let Some(raw) = rec.get("steps") else {
            report.push(Violation::missing(steps_path, "steps"));
            return None;
        };
        let Value::Array(items) = raw else {
            report.push(Violation::type_mismatch(
                steps_path,
                "sequence",
                crate::decode::type_name(raw),
            ));
            return None;
        };
        if items.is_empty() {
            report.push(Violation::new(
                ViolationKind::Range,
                steps_path,
                "transform must have at least one step",
            ));
            return None;
        }
        let before = report.len();
        let steps: Vec<_> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| TransformStep::decode(item, steps_path.index(i), report))
            .collect();
        if report.len() > before {
            return None;
        }
        Some(TransformConfig { steps })
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Minimum accepted `interval_seconds`.
pub const MIN_INTERVAL_SECONDS: i64 = 60;

/// When a job runs: a cron expression or a fixed interval, never both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum ScheduleConfig {
    Cron(String),
    IntervalSeconds(u64),
}

// Written as a one-key mapping rather than an externally tagged enum, which
// YAML serializers would render as a `!tag`.
impl Serialize for ScheduleConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            ScheduleConfig::Cron(expr) => map.serialize_entry("cron", expr)?,
            ScheduleConfig::IntervalSeconds(secs) => map.serialize_entry("interval_seconds", secs)?,
        }
        map.end()
    }
}

impl FromDocument for ScheduleConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(&["cron", "interval_seconds"]);
        let before = report.len();
        let cron = rec.optional_str("cron", report);
        let interval = rec
            .integer_in("interval_seconds", Some(MIN_INTERVAL_SECONDS), None, report)
            .ok()
            .flatten();
        let candidates = [
            ("cron", rec.is_set("cron")),
            ("interval_seconds", rec.get("interval_seconds").is_some()),
        ];
        exactly_one(rec.path(), &candidates, report);
        if let Some(expr) = &cron {
            if !is_valid_cron(expr) {
                report.push(Violation::new(
                    ViolationKind::Format,
                    rec.field_path("cron"),
                    format!("'{expr}' is not a valid cron expression"),
                ));
            }
        }
        if report.len() > before {
            return None;
        }
        match (cron, interval) {
            (Some(expr), _) => Some(ScheduleConfig::Cron(expr.trim().to_string())),
            (None, Some(secs)) => Some(ScheduleConfig::IntervalSeconds(secs as u64)),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output validation
// ---------------------------------------------------------------------------

/// Checks a job asks the executor to apply to its result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ValidationConfig {
    pub not_empty: bool,
    pub no_nulls: Vec<String>,
}

impl FromDocument for ValidationConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(&["not_empty", "no_nulls"]);
        let before = report.len();
        let not_empty = rec.bool_or("not_empty", false, report);
        let no_nulls = rec.string_list("no_nulls", report);
        report_duplicates(&no_nulls, &rec.field_path("no_nulls"), "column", report);
        if report.len() > before {
            return None;
        }
        Some(ValidationConfig {
            not_empty,
            no_nulls: no_nulls.into_iter().map(|(_, column)| column).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

const JOB_FIELDS: &[&str] = &[
    "name",
    "description",
    "depends_on",
    "read",
    "transform",
    "write",
    "enabled",
    "cache",
    "schedule",
    "validation",
];

/// A named unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct JobConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteConfig>,
    pub enabled: bool,
    pub cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
}

/// Jobs are called nodes in some documents; both names refer to one type.
pub type NodeConfig = JobConfig;

impl JobConfig {
    /// Normalized `depends_on` entries, with a violation for each bad name,
    /// repeated entry, or self-reference.
    fn decode_depends_on(
        rec: &Record<'_>,
        own_name: Option<&str>,
        report: &mut ValidationReport,
    ) -> Vec<String> {
        let path = rec.field_path("depends_on");
        let names: Vec<(usize, String)> = rec
            .string_list("depends_on", report)
            .into_iter()
            .filter_map(|(i, dep)| identifier(&dep, &path.index(i), report).map(|n| (i, n)))
            .collect();
        report_duplicates(&names, &path, "dependency", report);
        if let Some(own) = own_name {
            if let Some((i, _)) = names.iter().find(|(_, n)| n == own) {
                report.push(Violation::new(
                    ViolationKind::Cycle,
                    path.index(*i),
                    format!("job '{own}' cannot depend on itself"),
                ));
            }
        }
        names.into_iter().map(|(_, n)| n).collect()
    }
}

impl FromDocument for JobConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(JOB_FIELDS);
        let before = report.len();

        let name = rec.required_identifier("name", report);
        let description = rec.optional_str("description", report);
        let depends_on = Self::decode_depends_on(&rec, name.as_deref(), report);

        let read = optional_child::<ReadConfig>(&rec, "read", report);
        let transform = optional_child::<TransformConfig>(&rec, "transform", report);
        let write = optional_child::<WriteConfig>(&rec, "write", report);
        let operations = [
            ("read", rec.get("read").is_some()),
            ("transform", rec.get("transform").is_some()),
            ("write", rec.get("write").is_some()),
        ];
        at_least_one(rec.path(), &operations, report);
        if let (Some(source), Some(target)) = (&read, &write) {
            if source.connection == target.connection && source.location == target.location {
                report.push(Violation::new(
                    ViolationKind::DuplicateName,
                    rec.field_path("write"),
                    format!(
                        "write target {} on connection '{}' is the same as the read source",
                        target.location.describe(),
                        target.connection
                    ),
                ));
            }
        }

        let enabled = rec.bool_or("enabled", true, report);
        let cache = rec.bool_or("cache", false, report);
        let schedule = optional_child::<ScheduleConfig>(&rec, "schedule", report);
        let validation = optional_child::<ValidationConfig>(&rec, "validation", report);

        if report.len() > before {
            return None;
        }
        Some(JobConfig {
            name: name?,
            description,
            depends_on,
            read,
            transform,
            write,
            enabled,
            cache,
            schedule,
            validation,
        })
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The equivalent `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging settings the pipeline runtime should apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub structured: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl FromDocument for LoggingConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(&["level", "structured", "metadata"]);
        let before = report.len();
        let level = match rec.optional_str("level", report) {
            None => LogLevel::default(),
            Some(raw) => match raw.trim().to_uppercase().as_str() {
                "DEBUG" => LogLevel::Debug,
                "INFO" => LogLevel::Info,
                "WARNING" | "WARN" => LogLevel::Warning,
                "ERROR" => LogLevel::Error,
                _ => {
                    report.push(enum_violation(
                        rec.field_path("level"),
                        &["DEBUG", "INFO", "WARNING", "ERROR"],
                        raw.trim(),
                    ));
                    LogLevel::default()
                }
            },
        };
        let structured = rec.bool_or("structured", false, report);
        let metadata = rec.mapping("metadata", report);
        if report.len() > before {
            return None;
        }
        Some(LoggingConfig {
            level,
            structured,
            metadata,
        })
    }
}

deserialize_via_decoder!(
    StorageConfig,
    ReadConfig,
    WriteConfig,
    TransformStep,
    TransformConfig,
    ScheduleConfig,
    ValidationConfig,
    JobConfig,
    LoggingConfig,
);
