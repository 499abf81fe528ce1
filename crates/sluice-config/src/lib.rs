//! Typed, validated pipeline configuration.
//!
//! An untyped YAML or JSON document becomes a [`PipelineConfig`] in two passes:
//! field-level decoding of every record, then cross-record rules (unique job
//! names, declared dependencies, an acyclic dependency graph). Failures come
//! back as a [`ValidationReport`](sluice_types::ValidationReport) listing every
//! violation with its field path.

pub mod decode;
pub mod exclusive;
pub mod graph;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod validation;

pub use decode::{normalize_name, FromDocument};
pub use exclusive::{at_least_one, exactly_one};
pub use graph::{DanglingDependency, DependencyGraph};
pub use loader::{load_file, parse_str, DocumentFormat};
pub use model::{
    DataLocation, JobConfig, LogLevel, LoggingConfig, NodeConfig, ReadConfig, ScheduleConfig,
    StepKind, StorageConfig, TransformConfig, TransformStep, ValidationConfig, WriteConfig,
    WriteMode, MIN_INTERVAL_SECONDS,
};
pub use pipeline::{PipelineConfig, DEFAULT_MAX_PARALLEL, DEFAULT_RETRY_ATTEMPTS, MAX_RETRY_ATTEMPTS};
pub use validation::{default_rules, validate_jobs, validate_jobs_or_raise, CrossRecordRule};
