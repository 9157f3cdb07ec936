//! Template document generation
//!
//! A template is a scaffolding document built from the schema's declared
//! `template_value`s (falling back to `default`s). Required properties are
//! always emitted; optional properties only when asked for; properties
//! marked `skip_in_template` only when validation would otherwise reject the
//! document without them. Generated documents must pass
//! [`validate`](crate::validate::validate) against the same schema - that is
//! a correctness invariant of the generator, so after the first fill the
//! conditional rules are settled to a fixed point.

use crate::compose::CompositeSchema;
use crate::fragment::{Consequence, PropertyKind, PropertySpec};
use crate::validate::condition_holds;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Generate a template document for a composite schema.
pub fn generate_template(schema: &CompositeSchema, include_optional: bool) -> Map<String, Value> {
    let required: HashSet<&str> = schema.required.iter().map(|s| s.as_str()).collect();
    let mut doc = Map::new();

    for (name, spec) in &schema.properties {
        let is_required = required.contains(name.as_str());
        if spec.skip_in_template && !is_required {
            continue;
        }
        if !is_required && !include_optional {
            continue;
        }
        if let Some(value) = template_value(spec, is_required) {
            doc.insert(name.clone(), value);
        }
    }

    // Settle conditional consequences to a fixed point: a fill can trigger
    // further rules, and the oneOf trim must not drop a name some other
    // active rule still demands. Protected names never leave the document,
    // so every pass either changes nothing or makes net progress; the bound
    // is a backstop.
    for _ in 0..=schema.rules.len() {
        let mut changed = false;
        let protected = protected_names(schema, &doc, &required);

        for rule in &schema.rules {
            if !condition_holds(&rule.condition, &doc) {
                continue;
            }
            match &rule.consequence {
                Consequence::Require(names) => {
                    for name in names {
                        changed |= fill_missing(schema, &mut doc, name);
                    }
                }
                Consequence::Forbid(_) => {}
                Consequence::OneOf(groups) => {
                    let satisfied: Vec<usize> = (0..groups.len())
                        .filter(|&i| groups[i].iter().all(|n| doc.contains_key(n)))
                        .collect();
                    if satisfied.is_empty() {
                        if let Some(first) = groups.first() {
                            for name in first {
                                changed |= fill_missing(schema, &mut doc, name);
                            }
                        }
                    } else if satisfied.len() > 1 {
                        // Keep one satisfied alternative, preferring one the
                        // other rules already pin in place.
                        let keep = satisfied
                            .iter()
                            .copied()
                            .find(|&i| {
                                groups[i].iter().all(|n| protected.contains(n.as_str()))
                            })
                            .unwrap_or(satisfied[0]);
                        let kept: HashSet<&str> =
                            groups[keep].iter().map(|s| s.as_str()).collect();
                        for (i, alt) in groups.iter().enumerate() {
                            if i == keep {
                                continue;
                            }
                            for name in alt {
                                if !kept.contains(name.as_str())
                                    && !protected.contains(name.as_str())
                                {
                                    changed |= doc.remove(name).is_some();
                                }
                            }
                        }
                    }
                }
                Consequence::AnyOf(groups) => {
                    let satisfied = groups
                        .iter()
                        .any(|alt| alt.iter().all(|n| doc.contains_key(n)));
                    if !satisfied {
                        if let Some(first) = groups.first() {
                            for name in first {
                                changed |= fill_missing(schema, &mut doc, name);
                            }
                        }
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    doc
}

/// Names the finished document must keep: base-required properties plus
/// everything an active `Require` rule demands.
fn protected_names<'a>(
    schema: &'a CompositeSchema,
    doc: &Map<String, Value>,
    required: &HashSet<&'a str>,
) -> HashSet<&'a str> {
    let mut protected = required.clone();
    for rule in &schema.rules {
        if !condition_holds(&rule.condition, doc) {
            continue;
        }
        if let Consequence::Require(names) = &rule.consequence {
            protected.extend(names.iter().map(|s| s.as_str()));
        }
    }
    protected
}

/// Insert a rule-demanded property if absent. Demanded names are emitted
/// even when marked `skip_in_template`; leaving them out would make the
/// generated document fail its own schema.
fn fill_missing(schema: &CompositeSchema, doc: &mut Map<String, Value>, name: &str) -> bool {
    if doc.contains_key(name) {
        return false;
    }
    if let Some(spec) = schema.properties.get(name) {
        if let Some(value) = template_value(spec, true) {
            doc.insert(name.to_string(), value);
            return true;
        }
    }
    false
}

/// Pick the emitted value for one property: `template_value`, then
/// `default`, then (for required properties only) a type-appropriate
/// neutral value; optional properties with neither are omitted.
fn template_value(spec: &PropertySpec, is_required: bool) -> Option<Value> {
    if let Some(value) = &spec.template_value {
        return Some(value.clone());
    }
    if let Some(value) = &spec.default {
        return Some(value.clone());
    }
    if !is_required {
        return None;
    }
    Some(match spec.kind {
        PropertyKind::String => Value::String(String::new()),
        PropertyKind::Number => Value::from(0u64),
        PropertyKind::Boolean => Value::Bool(false),
        PropertyKind::Array => Value::Array(Vec::new()),
        PropertyKind::Object => Value::Object(Map::new()),
    })
}
