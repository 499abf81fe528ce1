//! End-to-end integration tests for Sluice configuration validation.
//!
//! Each test exercises the full path: load document -> field pass -> cross-record
//! rules -> typed config or violation report.

use std::io::Write;

use sluice_config::{
    DataLocation, PipelineConfig, ScheduleConfig, StepKind, StorageConfig, WriteMode,
};
use sluice_types::{ConfigError, ViolationKind};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SALES_PIPELINE: &str = r#"
pipeline: Sales_Daily
description: Nightly sales rollup
storage:
  type: s3
  bucket: company-lake
  region: eu-west-1
  prefix: sales/
max_parallel: 3
retry_attempts: 2
logging:
  level: warning
  structured: true
  metadata:
    team: analytics
jobs:
  - name: extract_orders
    read:
      connection: orders_db
      format: jdbc
      table: public.orders
  - name: extract_customers
    read:
      connection: crm
      format: csv
      path: /exports/customers.csv
      options:
        header: true
  - name: join_sales
    depends_on: [extract_orders, Extract_Customers]
    transform:
      steps:
        - sql: SELECT * FROM orders JOIN customers USING (customer_id)
        - operation: dedupe
          params:
            keys: [order_id]
    cache: true
  - name: publish
    depends_on: [join_sales]
    write:
      connection: lake
      format: parquet
      path: s3://company-lake/sales/daily/
      mode: append
    schedule:
      cron: "0 4 * * *"
    validation:
      not_empty: true
      no_nulls: [order_id]
"#;

/// Parse YAML, panicking with the report on failure.
fn parse(yaml: &str) -> PipelineConfig {
    match PipelineConfig::from_yaml_str(yaml) {
        Ok(config) => config,
        Err(e) => panic!("expected a valid pipeline, got: {e}"),
    }
}

/// Parse YAML that must fail validation; return `(path, kind)` pairs.
fn violations(yaml: &str) -> Vec<(String, ViolationKind)> {
    let err = PipelineConfig::from_yaml_str(yaml).expect_err("expected validation to fail");
    err.report()
        .unwrap_or_else(|| panic!("expected a validation report, got: {err}"))
        .iter()
        .map(|v| (v.path.to_string(), v.kind))
        .collect()
}

fn pipeline_with_jobs(jobs_yaml: &str) -> String {
    format!(
        "pipeline: p\nstorage:\n  type: local\n  base_path: ./data\njobs:\n{jobs_yaml}"
    )
}

// ---------------------------------------------------------------------------
// Test 1: Full pipeline parses into typed records
// ---------------------------------------------------------------------------

#[test]
fn full_pipeline_parses_into_typed_records() {
    let config = parse(SALES_PIPELINE);

    assert_eq!(config.name(), "sales_daily");
    assert_eq!(config.description(), Some("Nightly sales rollup"));
    assert_eq!(config.max_parallel(), 3);
    assert_eq!(config.retry_attempts(), 2);
    assert_eq!(
        config.storage(),
        &StorageConfig::S3 {
            bucket: "company-lake".into(),
            region: "eu-west-1".into(),
            prefix: Some("sales/".into()),
        }
    );
    assert!(config.logging().unwrap().structured);

    let customers = config.job("extract_customers").unwrap();
    let read = customers.read.as_ref().unwrap();
    assert_eq!(read.location, DataLocation::Path("/exports/customers.csv".into()));
    assert_eq!(read.options["header"], serde_json::json!(true));

    let join = config.job("join_sales").unwrap();
    assert_eq!(join.depends_on, vec!["extract_orders", "extract_customers"]);
    assert!(join.cache);
    let steps = &join.transform.as_ref().unwrap().steps;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].kind, StepKind::Operation("dedupe".into()));

    let publish = config.job("publish").unwrap();
    assert_eq!(publish.write.as_ref().unwrap().mode, WriteMode::Append);
    assert_eq!(publish.schedule, Some(ScheduleConfig::Cron("0 4 * * *".into())));
    assert_eq!(publish.validation.as_ref().unwrap().no_nulls, vec!["order_id"]);
}

// ---------------------------------------------------------------------------
// Test 2: Dependency views for the scheduler
// ---------------------------------------------------------------------------

#[test]
fn dependency_views_for_scheduler() {
    let config = parse(SALES_PIPELINE);

    let reverse = config.build_dependency_graph();
    assert_eq!(reverse["extract_orders"], vec!["join_sales"]);
    assert_eq!(reverse["extract_customers"], vec!["join_sales"]);
    assert_eq!(reverse["join_sales"], vec!["publish"]);
    assert!(reverse["publish"].is_empty());

    assert_eq!(
        config.execution_order(),
        vec!["extract_orders", "extract_customers", "join_sales", "publish"]
    );
    let layers = config.execution_layers();
    assert_eq!(layers.len(), 3);
    assert_eq!(layers[0], vec!["extract_orders", "extract_customers"]);
}

// ---------------------------------------------------------------------------
// Test 3: Field errors across the whole tree are batched
// ---------------------------------------------------------------------------

#[test]
fn field_errors_across_tree_are_batched() {
    let yaml = r#"
pipeline: bad-name
storage:
  type: gcs
max_parallel: 0
jobs:
  - name: load
    read:
      connection: db
      format: csv
  - name: shape
    transform:
      steps:
        - sql: SELECT 1
          function: tidy
    schedule:
      interval_seconds: 30
"#;
    assert_eq!(
        violations(yaml),
        vec![
            ("pipeline".to_string(), ViolationKind::Format),
            ("storage.type".to_string(), ViolationKind::Format),
            ("jobs[0].read".to_string(), ViolationKind::MutualExclusion),
            ("jobs[1].transform.steps[0]".to_string(), ViolationKind::MutualExclusion),
            ("jobs[1].schedule.interval_seconds".to_string(), ViolationKind::Range),
            ("max_parallel".to_string(), ViolationKind::Range),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 4: Cross-record violations are reported together
// ---------------------------------------------------------------------------

#[test]
fn cross_record_violations_reported_together() {
    let yaml = pipeline_with_jobs(
        r#"  - name: a
    depends_on: [b, missing]
    transform: {steps: [{sql: SELECT 1}]}
  - name: b
    depends_on: [a]
    transform: {steps: [{sql: SELECT 2}]}
"#,
    );
    let found = violations(&yaml);
    assert_eq!(
        found,
        vec![
            ("jobs[0].depends_on[1]".to_string(), ViolationKind::DanglingReference),
            ("jobs[0].depends_on".to_string(), ViolationKind::Cycle),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 5: Three-node cycle names every member
// ---------------------------------------------------------------------------

#[test]
fn three_node_cycle_names_every_member() {
    let yaml = pipeline_with_jobs(
        r#"  - {name: a, depends_on: [c], transform: {steps: [{function: f}]}}
  - {name: b, depends_on: [a], transform: {steps: [{function: f}]}}
  - {name: c, depends_on: [b], transform: {steps: [{function: f}]}}
"#,
    );
    let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
    let report = err.report().unwrap();
    let cycle: Vec<_> = report.of_kind(ViolationKind::Cycle).collect();
    assert_eq!(cycle.len(), 1, "Expected one cycle, got: {report}");
    assert_eq!(cycle[0].message, "circular dependency: a -> c -> b -> a");
}

// ---------------------------------------------------------------------------
// Test 6: Self-dependency is caught in the field pass
// ---------------------------------------------------------------------------

#[test]
fn self_dependency_caught_in_field_pass() {
    let yaml = pipeline_with_jobs(
        r#"  - {name: loop, depends_on: [Loop], transform: {steps: [{function: f}]}}
"#,
    );
    assert_eq!(
        violations(&yaml),
        vec![("jobs[0].depends_on[0]".to_string(), ViolationKind::Cycle)]
    );
}

// ---------------------------------------------------------------------------
// Test 7: Canonical YAML round-trips to an equal config
// ---------------------------------------------------------------------------

#[test]
fn canonical_yaml_round_trips() {
    let config = parse(SALES_PIPELINE);
    let canonical = serde_yaml::to_string(&config).unwrap();

    assert!(canonical.contains("pipeline: sales_daily"));
    assert!(canonical.contains("- extract_customers"));

    let again = parse(&canonical);
    assert_eq!(again, config);
    assert_eq!(serde_yaml::to_string(&again).unwrap(), canonical);
}

// ---------------------------------------------------------------------------
// Test 8: JSON documents validate the same way
// ---------------------------------------------------------------------------

#[test]
fn json_document_matches_yaml() {
    let config = parse(SALES_PIPELINE);
    let json = serde_json::to_string(&config).unwrap();
    let from_json = PipelineConfig::from_json_str(&json).unwrap();
    assert_eq!(from_json, config);
}

// ---------------------------------------------------------------------------
// Test 9: Loading from disk
// ---------------------------------------------------------------------------

#[test]
fn load_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    file.write_all(SALES_PIPELINE.as_bytes()).unwrap();

    let config = PipelineConfig::from_path(file.path()).unwrap();
    assert_eq!(config.jobs().len(), 4);
}

#[test]
fn load_malformed_file_is_parse_error() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(b"{\"pipeline\": ").unwrap();

    let err = PipelineConfig::from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.is_terminal());
}

// ---------------------------------------------------------------------------
// Test 10: Unknown keys and nulls are tolerated
// ---------------------------------------------------------------------------

#[test]
fn unknown_keys_and_nulls_tolerated() {
    let yaml = pipeline_with_jobs(
        r#"  - name: a
    owner: data-eng
    description: null
    read: {connection: db, format: csv, path: /in.csv, table: null}
"#,
    );
    let config = parse(&yaml);
    let job = &config.jobs()[0];
    assert!(job.description.is_none());
    assert_eq!(
        job.read.as_ref().unwrap().location,
        DataLocation::Path("/in.csv".into())
    );
}
