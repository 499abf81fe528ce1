//! Cross-record validation: rules that span sibling jobs.
//!
//! These run only after every record has passed its field-level rules. Call
//! [`validate_jobs`] for the collected violations or [`validate_jobs_or_raise`]
//! to turn them into a [`ConfigError`].

use std::collections::HashMap;

use sluice_types::{ConfigError, FieldPath, ValidationReport, Violation, ViolationKind};

use crate::graph::DependencyGraph;
use crate::model::JobConfig;

fn job_path(index: usize) -> FieldPath {
    FieldPath::root().key("jobs").index(index)
}

// ---------------------------------------------------------------------------
// CrossRecordRule trait
// ---------------------------------------------------------------------------

pub trait CrossRecordRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, jobs: &[JobConfig], graph: &DependencyGraph) -> Vec<Violation>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Indices of jobs whose name was already declared, paired with the first index.
fn repeated_names(jobs: &[JobConfig]) -> Vec<(usize, usize)> {
    let mut first: HashMap<&str, usize> = HashMap::new();
    jobs.iter()
        .enumerate()
        .filter_map(|(i, job)| match first.get(job.name.as_str()) {
            Some(&original) => Some((i, original)),
            None => {
                first.insert(job.name.as_str(), i);
                None
            }
        })
        .collect()
}

struct UniqueJobNamesRule;
impl CrossRecordRule for UniqueJobNamesRule {
    fn name(&self) -> &str { "unique_job_names" }
    fn apply(&self, jobs: &[JobConfig], _graph: &DependencyGraph) -> Vec<Violation> {
        repeated_names(jobs)
            .into_iter()
            .map(|(i, original)| {
                Violation::new(
                    ViolationKind::DuplicateName,
                    job_path(i).key("name"),
                    format!(
                        "job name '{}' is already declared by jobs[{original}]",
                        jobs[i].name
                    ),
                )
            })
            .collect()
    }
}

struct DependencyTargetsExistRule;
impl CrossRecordRule for DependencyTargetsExistRule {
    fn name(&self) -> &str { "dependency_targets_exist" }
    fn apply(&self, jobs: &[JobConfig], graph: &DependencyGraph) -> Vec<Violation> {
        graph
            .dangling()
            .iter()
            .map(|d| {
                Violation::new(
                    ViolationKind::DanglingReference,
                    job_path(d.job).key("depends_on").index(d.position),
                    format!(
                        "job '{}' depends on '{}', which is not a declared job",
                        jobs[d.job].name, d.name
                    ),
                )
            })
            .collect()
    }
}

struct AcyclicDependenciesRule;
impl CrossRecordRule for AcyclicDependenciesRule {
    fn name(&self) -> &str { "acyclic_dependencies" }
    fn apply(&self, jobs: &[JobConfig], graph: &DependencyGraph) -> Vec<Violation> {
        // With repeated names the edges are ambiguous; UniqueJobNamesRule reports those.
        if !repeated_names(jobs).is_empty() {
            return vec![];
        }
        let Some(cycle) = graph.find_cycle_names() else {
            return vec![];
        };
        let start = cycle
            .first()
            .and_then(|name| graph.index_of(name))
            .unwrap_or_default();
        vec![Violation::new(
            ViolationKind::Cycle,
            job_path(start).key("depends_on"),
            format!("circular dependency: {}", cycle.join(" -> ")),
        )]
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// The built-in cross-record rules, in the order they run.
pub fn default_rules() -> Vec<Box<dyn CrossRecordRule>> {
    vec![
        Box::new(UniqueJobNamesRule),
        Box::new(DependencyTargetsExistRule),
        Box::new(AcyclicDependenciesRule),
    ]
}

/// Run all cross-record rules over `jobs` and return collected violations.
pub fn validate_jobs(jobs: &[JobConfig]) -> Vec<Violation> {
    let graph = DependencyGraph::from_jobs(jobs);
    let mut violations = Vec::new();
    for rule in default_rules() {
        let found = rule.apply(jobs, &graph);
        if !found.is_empty() {
            tracing::debug!(rule = rule.name(), count = found.len(), "Cross-record rule failed");
        }
        violations.extend(found);
    }
    violations
}

/// Run all cross-record rules; return `Err` if any violation was found.
pub fn validate_jobs_or_raise(jobs: &[JobConfig]) -> Result<DependencyGraph, ConfigError> {
    let violations = validate_jobs(jobs);
    if !violations.is_empty() {
        return Err(ConfigError::Invalid(violations.into_iter().collect::<ValidationReport>()));
    }
    Ok(DependencyGraph::from_jobs(jobs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
