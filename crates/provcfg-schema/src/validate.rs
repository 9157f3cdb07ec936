//! Configuration document validation
//!
//! Validation interprets the composite schema's tagged rules against a
//! candidate document and returns every violation it finds, paired with the
//! offending property path. It never stops at the first problem, never
//! mutates the document, and never panics on malformed input - a bad
//! document is a report, not an error.
//!
//! Numeric properties accept native integers and hex/decimal strings; both
//! normalize through `provcfg_core::value_to_u64` once, at entry.

use crate::compose::CompositeSchema;
use crate::fragment::{Condition, Consequence, PropertyKind};
use provcfg_core::{value_to_bool, value_to_u64};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MissingRequiredProperty,
    TypeMismatch,
    EnumViolation,
    ConflictingRule,
}

/// One validation problem at one property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

/// The complete diagnostic report for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations of one kind, for callers rendering grouped reports.
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// Validate a configuration document against a composite schema.
pub fn validate(schema: &CompositeSchema, document: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let doc = match document.as_object() {
        Some(doc) => doc,
        None => {
            report.violations.push(Violation {
                path: "$".to_string(),
                kind: ViolationKind::TypeMismatch,
                message: "configuration document is not a mapping".to_string(),
            });
            return report;
        }
    };

    // Expand the active constraint set. One pass reaches the fixed point:
    // conditions only test literal equality on top-level properties already
    // present in the document, never on properties other rules introduce.
    let mut required = schema.required.clone();
    let mut forbidden: Vec<String> = Vec::new();
    let mut one_of_groups: Vec<&Vec<Vec<String>>> = Vec::new();
    let mut any_of_groups: Vec<&Vec<Vec<String>>> = Vec::new();

    for rule in &schema.rules {
        if !condition_holds(&rule.condition, doc) {
            continue;
        }
        match &rule.consequence {
            Consequence::Require(names) => required.extend(names.iter().cloned()),
            Consequence::Forbid(names) => forbidden.extend(names.iter().cloned()),
            Consequence::OneOf(groups) => one_of_groups.push(groups),
            Consequence::AnyOf(groups) => any_of_groups.push(groups),
        }
    }

    // Required properties: report every missing one.
    let mut seen = HashSet::new();
    for name in &required {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if !doc.contains_key(name) {
            report.violations.push(Violation {
                path: name.clone(),
                kind: ViolationKind::MissingRequiredProperty,
                message: format!("required property '{name}' is missing"),
            });
        }
    }

    // A property both required and forbidden under the held conditions is a
    // rule conflict, surfaced now that the contradictory condition holds.
    let required_set: HashSet<&str> = required.iter().map(|s| s.as_str()).collect();
    let mut conflict_seen = HashSet::new();
    for name in &forbidden {
        if required_set.contains(name.as_str()) && conflict_seen.insert(name.as_str()) {
            report.violations.push(Violation {
                path: name.clone(),
                kind: ViolationKind::ConflictingRule,
                message: format!(
                    "property '{name}' is both required and forbidden by active rules"
                ),
            });
        }
    }

    for groups in one_of_groups {
        let satisfied = groups
            .iter()
            .filter(|alt| alt.iter().all(|n| doc.contains_key(n)))
            .count();
        let path = group_path(groups);
        if satisfied == 0 {
            report.violations.push(Violation {
                path: path.clone(),
                kind: ViolationKind::MissingRequiredProperty,
                message: format!("exactly one of {path} must be provided"),
            });
        } else if satisfied > 1 {
            report.violations.push(Violation {
                path: path.clone(),
                kind: ViolationKind::ConflictingRule,
                message: format!("alternatives {path} are mutually exclusive"),
            });
        }
    }

    for groups in any_of_groups {
        let satisfied = groups
            .iter()
            .any(|alt| alt.iter().all(|n| doc.contains_key(n)));
        if !satisfied {
            let path = group_path(groups);
            report.violations.push(Violation {
                path: path.clone(),
                kind: ViolationKind::MissingRequiredProperty,
                message: format!("at least one of {path} must be provided"),
            });
        }
    }

    // Type and enumeration checks for every present, declared property.
    // Unknown properties pass through untouched (the catalogs rely on this
    // for backward-compatible property aliasing).
    for (name, value) in doc {
        let spec = match schema.properties.get(name) {
            Some(spec) => spec,
            None => continue,
        };

        if let Err(message) = check_type(spec.kind, value) {
            report.violations.push(Violation {
                path: name.clone(),
                kind: ViolationKind::TypeMismatch,
                message,
            });
            continue;
        }

        if let Some(allowed) = &spec.enum_values {
            if !allowed.iter().any(|a| values_equal(a, value)) {
                report.violations.push(Violation {
                    path: name.clone(),
                    kind: ViolationKind::EnumViolation,
                    message: format!("value {value} is not one of the allowed values"),
                });
            }
        }
    }

    report
}

/// Whether a rule condition holds against a document.
pub(crate) fn condition_holds(condition: &Condition, doc: &Map<String, Value>) -> bool {
    match condition {
        Condition::Always => true,
        Condition::Equals { property, value } => doc
            .get(property)
            .map(|present| values_equal(present, value))
            .unwrap_or(false),
    }
}

/// Literal equality with numeric and boolean normalization, so that
/// `"0x30000000"` equals `805306368` and `"true"` equals `true`.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if let (Ok(a), Ok(b)) = (value_to_u64(a), value_to_u64(b)) {
        return a == b;
    }
    if let (Ok(a), Ok(b)) = (value_to_bool(a), value_to_bool(b)) {
        return a == b;
    }
    false
}

fn check_type(kind: PropertyKind, value: &Value) -> Result<(), String> {
    let ok = match kind {
        PropertyKind::Number => value_to_u64(value).is_ok(),
        PropertyKind::Boolean => value_to_bool(value).is_ok(),
        PropertyKind::String => value.is_string(),
        PropertyKind::Array => value.is_array(),
        PropertyKind::Object => value.is_object(),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("expected {}, got {value}", kind.as_str()))
    }
}

fn group_path(groups: &[Vec<String>]) -> String {
    let mut names = Vec::new();
    for alt in groups {
        for name in alt {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
    }
    names.join("|")
}
