//! The top-level pipeline record and the two-pass validator entry points.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sluice_types::{ConfigError, FieldPath, Result, ValidationReport, Violation, ViolationKind};

use crate::decode::{optional_child, type_name, FromDocument, Record};
use crate::graph::DependencyGraph;
use crate::loader::{self, DocumentFormat};
use crate::model::{JobConfig, LoggingConfig, StorageConfig};
use crate::validation::validate_jobs;

pub const DEFAULT_MAX_PARALLEL: u32 = 5;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

const PIPELINE_FIELDS: &[&str] = &[
    "pipeline",
    "name",
    "description",
    "storage",
    "jobs",
    "max_parallel",
    "retry_attempts",
    "logging",
];

/// A fully validated pipeline configuration.
///
/// The only ways to obtain one are [`PipelineConfig::from_value`], the
/// document helpers built on it, and `Deserialize`, which routes through the
/// same validator. Fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct PipelineConfig {
    pipeline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    storage: StorageConfig,
    jobs: Vec<JobConfig>,
    max_parallel: u32,
    retry_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<LoggingConfig>,
}

impl PipelineConfig {
    /// Validate an untyped document. Every violation is reported at once for
    /// the pass that found them; cross-record rules only run on a tree whose
    /// fields are all valid.
    pub fn from_value(value: &Value) -> Result<Self> {
        let config = <Self as FromDocument>::from_value(value)?;
        tracing::info!(
            pipeline = %config.pipeline,
            jobs = config.jobs.len(),
            "Pipeline configuration validated"
        );
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_value(&loader::parse_str(text, DocumentFormat::Yaml)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_value(&loader::parse_str(text, DocumentFormat::Json)?)
    }

    /// Load a YAML or JSON file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_value(&loader::load_file(path)?)
    }

    /// The canonical document form of this configuration.
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    // -- Accessors --

    /// Normalized pipeline name.
    pub fn name(&self) -> &str {
        &self.pipeline
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn jobs(&self) -> &[JobConfig] {
        &self.jobs
    }

    pub fn max_parallel(&self) -> u32 {
        self.max_parallel
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn logging(&self) -> Option<&LoggingConfig> {
        self.logging.as_ref()
    }

    /// Look up a job by name. The name is normalized first.
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        let name = crate::decode::normalize_name(name);
        self.jobs.iter().find(|job| job.name == name)
    }

    // -- Dependency views --

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_jobs(&self.jobs)
    }

    /// Job name to the names of the jobs that depend on it, in declaration
    /// order. Every job has an entry.
    pub fn build_dependency_graph(&self) -> BTreeMap<String, Vec<String>> {
        self.dependency_graph().reverse_mapping()
    }

    /// Job names ordered so every job follows its dependencies.
    pub fn execution_order(&self) -> Vec<String> {
        self.dependency_graph()
            .topological_order()
            .map(|order| order.into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Job names grouped into layers that can run side by side.
    pub fn execution_layers(&self) -> Vec<Vec<String>> {
        self.dependency_graph()
            .execution_layers()
            .map(|layers| {
                layers
                    .into_iter()
                    .map(|layer| layer.into_iter().map(str::to_string).collect())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn decode_jobs(rec: &Record<'_>, report: &mut ValidationReport) -> Option<Vec<JobConfig>> {
        let path = rec.field_path("jobs");
        let Some(raw) = rec.get("jobs") else {
            report.push(Violation::missing(path, "jobs"));
            return None;
        };
        let Value::Array(items) = raw else {
            report.push(Violation::type_mismatch(path, "sequence", type_name(raw)));
            return None;
        };
        if items.is_empty() {
            report.push(Violation::new(
                ViolationKind::Range,
                path,
                "pipeline must declare at least one job",
            ));
            return None;
        }
        let before = report.len();
        let jobs: Vec<_> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| JobConfig::decode(item, path.index(i), report))
            .collect();
        (report.len() == before).then_some(jobs)
    }
}

impl FromDocument for PipelineConfig {
    fn decode(value: &Value, path: FieldPath, report: &mut ValidationReport) -> Option<Self> {
        let rec = Record::open(value, path, report)?;
        rec.ignore_unknown(PIPELINE_FIELDS);
        let before = report.len();

        let name_key = if rec.get("pipeline").is_none() && rec.get("name").is_some() {
            "name"
        } else {
            "pipeline"
        };
        let pipeline = rec.required_identifier(name_key, report);
        let description = rec.optional_str("description", report);
        let storage = match rec.get("storage") {
            Some(raw) => StorageConfig::decode(raw, rec.field_path("storage"), report),
            None => {
                report.push(Violation::missing(rec.field_path("storage"), "storage"));
                None
            }
        };
        let jobs = Self::decode_jobs(&rec, report);
        let max_parallel = rec
            .integer_in("max_parallel", Some(1), Some(i64::from(u32::MAX)), report)
            .ok()
            .flatten()
            .map_or(DEFAULT_MAX_PARALLEL, |n| n as u32);
        let retry_attempts = rec
            .integer_in("retry_attempts", Some(0), Some(i64::from(MAX_RETRY_ATTEMPTS)), report)
            .ok()
            .flatten()
            .map_or(DEFAULT_RETRY_ATTEMPTS, |n| n as u32);
        let logging = optional_child::<LoggingConfig>(&rec, "logging", report);

        if report.len() > before {
            tracing::debug!(
                violations = report.len() - before,
                "Field pass failed; skipping cross-record rules"
            );
            return None;
        }
        let jobs = jobs?;

        let cross = validate_jobs(&jobs);
        if !cross.is_empty() {
            report.extend(cross);
            return None;
        }

        Some(PipelineConfig {
            pipeline: pipeline?,
            description,
            storage: storage?,
            jobs,
            max_parallel,
            retry_attempts,
            logging,
        })
    }
}

impl TryFrom<Value> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self> {
        PipelineConfig::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataLocation, StepKind};
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "pipeline": "daily_etl",
            "storage": {"type": "local", "base_path": "./data"},
            "jobs": [
                {
                    "name": "extract",
                    "read": {"connection": "warehouse", "format": "csv", "path": "/in/users.csv"}
                }
            ]
        })
    }

    fn job(name: &str, deps: &[&str]) -> Value {
        json!({
            "name": name,
            "depends_on": deps,
            "transform": {"steps": [{"sql": "SELECT 1"}]}
        })
    }

    fn with_jobs(jobs: Vec<Value>) -> Value {
        let mut doc = minimal();
        doc["jobs"] = Value::Array(jobs);
        doc
    }

    fn violations(doc: &Value) -> Vec<(String, ViolationKind)> {
        PipelineConfig::from_value(doc)
            .unwrap_err()
            .report()
            .expect("validation error")
            .iter()
            .map(|v| (v.path.to_string(), v.kind))
            .collect()
    }

    #[test]
    fn minimal_pipeline_with_defaults() {
        let config = PipelineConfig::from_value(&minimal()).unwrap();
        assert_eq!(config.name(), "daily_etl");
        assert_eq!(config.max_parallel(), DEFAULT_MAX_PARALLEL);
        assert_eq!(config.retry_attempts(), DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(config.jobs().len(), 1);
        assert!(config.logging().is_none());
        let read = config.job("Extract").unwrap().read.as_ref().unwrap();
        assert_eq!(read.location, DataLocation::Path("/in/users.csv".into()));
    }

    #[test]
    fn name_alias_accepted() {
        let mut doc = minimal();
        let name = doc.as_object_mut().unwrap().remove("pipeline").unwrap();
        doc["name"] = name;
        assert_eq!(PipelineConfig::from_value(&doc).unwrap().name(), "daily_etl");
    }

    #[test]
    fn pipeline_name_normalized() {
        let mut doc = minimal();
        doc["pipeline"] = json!("  Daily_ETL ");
        assert_eq!(PipelineConfig::from_value(&doc).unwrap().name(), "daily_etl");
    }

    #[test]
    fn numeric_limits() {
        let mut doc = minimal();
        doc["max_parallel"] = json!(0);
        doc["retry_attempts"] = json!(11);
        assert_eq!(
            violations(&doc),
            vec![
                ("max_parallel".to_string(), ViolationKind::Range),
                ("retry_attempts".to_string(), ViolationKind::Range),
            ]
        );

        doc["max_parallel"] = json!("8");
        doc["retry_attempts"] = json!(0);
        let config = PipelineConfig::from_value(&doc).unwrap();
        assert_eq!(config.max_parallel(), 8);
        assert_eq!(config.retry_attempts(), 0);
    }

    #[test]
    fn max_parallel_beyond_u32_is_range_error() {
        let mut doc = minimal();
        doc["max_parallel"] = json!(5_000_000_000u64);
        assert_eq!(
            violations(&doc),
            vec![("max_parallel".to_string(), ViolationKind::Range)]
        );

        doc["max_parallel"] = json!(u32::MAX);
        let config = PipelineConfig::from_value(&doc).unwrap();
        assert_eq!(config.max_parallel(), u32::MAX);
        assert_eq!(config.to_document().unwrap()["max_parallel"], json!(u32::MAX));
    }

    #[test]
    fn missing_top_level_fields_batched() {
        assert_eq!(
            violations(&json!({})),
            vec![
                ("pipeline".to_string(), ViolationKind::MissingField),
                ("storage".to_string(), ViolationKind::MissingField),
                ("jobs".to_string(), ViolationKind::MissingField),
            ]
        );
    }

    #[test]
    fn empty_jobs_rejected() {
        assert_eq!(
            violations(&with_jobs(vec![])),
            vec![("jobs".to_string(), ViolationKind::Range)]
        );
    }

    #[test]
    fn non_mapping_document_rejected() {
        assert_eq!(
            violations(&json!(["not", "a", "mapping"])),
            vec![("<root>".to_string(), ViolationKind::TypeCoercion)]
        );
    }

    #[test]
    fn field_errors_skip_cross_record_pass() {
        // jobs[1] is malformed and jobs[0] depends on a job that does not exist:
        // only the field-level violation is reported.
        let doc = with_jobs(vec![job("a", &["ghost"]), json!({"name": "b"})]);
        assert_eq!(
            violations(&doc),
            vec![("jobs[1]".to_string(), ViolationKind::MissingField)]
        );
    }

    #[test]
    fn duplicate_job_names_rejected() {
        let doc = with_jobs(vec![job("extract", &[]), job("Extract", &[])]);
        assert_eq!(
            violations(&doc),
            vec![("jobs[1].name".to_string(), ViolationKind::DuplicateName)]
        );
    }

    #[test]
    fn dangling_dependency_rejected() {
        let doc = with_jobs(vec![job("a", &[]), job("b", &["c"])]);
        let err = PipelineConfig::from_value(&doc).unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.violations()[0].kind, ViolationKind::DanglingReference);
        assert!(report.violations()[0].message.contains("'c'"));
    }

    #[test]
    fn cycle_rejected_with_both_names() {
        let doc = with_jobs(vec![job("a", &["b"]), job("b", &["a"])]);
        let err = PipelineConfig::from_value(&doc).unwrap_err();
        let report = err.report().unwrap();
        let cycle: Vec<_> = report.of_kind(ViolationKind::Cycle).collect();
        assert_eq!(cycle.len(), 1);
        assert!(cycle[0].message.contains("a -> b -> a"));
    }

    #[test]
    fn reverse_mapping_and_order() {
        let doc = with_jobs(vec![job("a", &[]), job("b", &["a"]), job("c", &["a", "b"])]);
        let config = PipelineConfig::from_value(&doc).unwrap();
        let reverse = config.build_dependency_graph();
        assert_eq!(reverse["a"], vec!["b", "c"]);
        assert_eq!(reverse["b"], vec!["c"]);
        assert!(reverse["c"].is_empty());
        assert_eq!(config.execution_order(), vec!["a", "b", "c"]);
        assert_eq!(
            config.execution_layers(),
            vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]
        );
    }

    #[test]
    fn canonical_form_round_trips() {
        let doc = json!({
            "name": " Nightly ",
            "storage": {"type": "azure_blob", "account": "acct", "container": "raw"},
            "max_parallel": "2",
            "logging": {"level": "debug"},
            "jobs": [
                {"name": "Load_Users", "read": {"connection": "pg", "format": "jdbc", "table": "users", "path": ""}},
                {
                    "name": "clean",
                    "depends_on": ["LOAD_USERS"],
                    "transform": {"steps": [{"function": "dedupe", "params": {"keys": ["id"]}}]},
                    "cache": "yes",
                    "schedule": {"cron": "0 3 * * *"}
                }
            ]
        });
        let config = PipelineConfig::from_value(&doc).unwrap();
        let canonical = config.to_document().unwrap();
        assert_eq!(canonical["pipeline"], json!("nightly"));
        assert_eq!(canonical["storage"]["type"], json!("azure"));
        assert_eq!(canonical["max_parallel"], json!(2));
        assert_eq!(canonical["jobs"][1]["depends_on"], json!(["load_users"]));
        assert_eq!(canonical["jobs"][1]["cache"], json!(true));
        assert_eq!(canonical["logging"]["level"], json!("DEBUG"));

        let again = PipelineConfig::from_value(&canonical).unwrap();
        assert_eq!(again, config);
        assert_eq!(again.to_document().unwrap(), canonical);
    }

    #[test]
    fn deserialize_routes_through_validator() {
        let config: PipelineConfig = serde_json::from_value(minimal()).unwrap();
        assert_eq!(config.name(), "daily_etl");

        let err = serde_json::from_value::<PipelineConfig>(with_jobs(vec![])).unwrap_err();
        assert!(err.to_string().contains("at least one job"));
    }

    #[test]
    fn yaml_document() {
        let yaml = r#"
pipeline: reporting
storage:
  type: s3
  bucket: lake
  region: us-east-1
jobs:
  - name: aggregate
    transform:
      steps:
        - sql: SELECT count(*) FROM events
    write:
      connection: lake
      format: parquet
      path: s3://lake/agg/
      mode: append
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        let job = config.job("aggregate").unwrap();
        assert_eq!(
            job.transform.as_ref().unwrap().steps[0].kind,
            StepKind::Sql("SELECT count(*) FROM events".into())
        );
        assert_eq!(config.storage().tag(), "s3");
    }

    #[test]
    fn json_parse_error_is_not_invalid() {
        let err = PipelineConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.report().is_none());
    }

    #[test]
    fn config_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineConfig>();
    }
}
