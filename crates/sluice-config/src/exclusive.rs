//! "Exactly one of" / "at least one of" field-set rules.

use sluice_types::{FieldPath, ValidationReport, Violation, ViolationKind};

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Require exactly one of `candidates` to be present.
///
/// Each candidate is a `(field name, is present)` pair. On failure a
/// `MutualExclusion` violation naming every candidate is reported at `path`
/// and `false` is returned.
pub fn exactly_one(
    path: &FieldPath,
    candidates: &[(&str, bool)],
    report: &mut ValidationReport,
) -> bool {
    let all: Vec<_> = candidates.iter().map(|(name, _)| *name).collect();
    let set: Vec<_> = candidates
        .iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| *name)
        .collect();
    if set.len() == 1 {
        return true;
    }
    let detail = if set.is_empty() {
        "none was provided".to_string()
    } else {
        format!("got {}", quoted(&set))
    };
    report.push(Violation::new(
        ViolationKind::MutualExclusion,
        path.clone(),
        format!("exactly one of {} must be provided; {detail}", quoted(&all)),
    ));
    false
}

/// Require at least one of `candidates` to be present.
pub fn at_least_one(
    path: &FieldPath,
    candidates: &[(&str, bool)],
    report: &mut ValidationReport,
) -> bool {
    if candidates.iter().any(|(_, present)| *present) {
        return true;
    }
    let all: Vec<_> = candidates.iter().map(|(name, _)| *name).collect();
    report.push(Violation::new(
        ViolationKind::MissingField,
        path.clone(),
        format!("at least one of {} is required", quoted(&all)),
    ));
    false
}
