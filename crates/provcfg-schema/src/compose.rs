//! Schema composition - merging ordered fragment lists into one schema
//!
//! Merge is left-to-right over the fragment names: properties union with
//! last-fragment-wins on collision (the whole property definition replaces
//! as a unit), `required` lists union with duplicates collapsed, and
//! conditional rules accumulate in fragment order. Every property collision
//! is recorded as a non-fatal [`CompositionNote`] for diagnostics.
//!
//! Composition is pure and deterministic: the same name sequence always
//! yields a structurally identical schema, which is what makes the
//! composition cache safe.

use crate::fragment::{ConditionalRule, FragmentCatalog, PropertySpec};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ComposeError {
    #[error("unknown schema fragment '{0}'")]
    UnknownFragment(String),
}

/// Diagnostic record of a property collision during composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionNote {
    pub property: String,
    /// Fragment whose definition was replaced.
    pub replaced_fragment: String,
    /// Fragment whose definition won.
    pub fragment: String,
    /// Whether the semantic type tag changed with the replacement.
    pub type_changed: bool,
}

/// The merged validation schema for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSchema {
    /// The ordered fragment names this schema was composed from.
    pub fragment_names: Vec<String>,
    pub properties: BTreeMap<String, PropertySpec>,
    /// Union of fragment `required` lists, first-seen order.
    pub required: Vec<String>,
    /// Accumulated conditional rules, fragment order.
    pub rules: Vec<ConditionalRule>,
    pub notes: Vec<CompositionNote>,
}

/// Compose the named fragments, left to right, into one schema.
pub fn compose<'a, I>(catalog: &FragmentCatalog, names: I) -> Result<CompositeSchema, ComposeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut fragment_names = Vec::new();
    let mut properties: BTreeMap<String, PropertySpec> = BTreeMap::new();
    let mut property_origin: HashMap<String, String> = HashMap::new();
    let mut required = Vec::new();
    let mut required_seen = HashSet::new();
    let mut rules = Vec::new();
    let mut notes = Vec::new();

    for name in names {
        let fragment = catalog
            .get(name)
            .ok_or_else(|| ComposeError::UnknownFragment(name.to_string()))?;
        fragment_names.push(name.to_string());

        for (property, spec) in &fragment.properties {
            if let Some(previous) = properties.get(property) {
                let replaced_fragment = property_origin
                    .get(property)
                    .cloned()
                    .unwrap_or_default();
                let note = CompositionNote {
                    property: property.clone(),
                    replaced_fragment,
                    fragment: name.to_string(),
                    type_changed: previous.kind != spec.kind,
                };
                warn!(
                    property = %note.property,
                    from = %note.replaced_fragment,
                    to = %note.fragment,
                    type_changed = note.type_changed,
                    "Fragment overrides property definition"
                );
                notes.push(note);
            }
            properties.insert(property.clone(), spec.clone());
            property_origin.insert(property.clone(), name.to_string());
        }

        for property in &fragment.required {
            if required_seen.insert(property.clone()) {
                required.push(property.clone());
            }
        }

        rules.extend(fragment.rules.iter().cloned());
    }

    Ok(CompositeSchema {
        fragment_names,
        properties,
        required,
        rules,
        notes,
    })
}
