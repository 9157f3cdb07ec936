//! Feature index - mapping device features to schema fragments
//!
//! A resolved device profile names its enabled features; each feature maps
//! to an ordered list of schema fragments. This index is the glue between
//! the device registry and the composition engine: profile -> feature names
//! -> fragment names -> `compose`.

use crate::compose::{compose, ComposeError, CompositeSchema};
use crate::fragment::FragmentCatalog;
use provcfg_devices::DeviceProfile;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("unknown feature '{0}'")]
    UnknownFeature(String),
    #[error("invalid feature index: {0}")]
    BadIndex(String),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Immutable feature-name to fragment-list index.
#[derive(Debug, Clone, Default)]
pub struct FeatureIndex {
    map: BTreeMap<String, Vec<String>>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature and the fragments it enables, in order.
    pub fn insert(&mut self, feature: impl Into<String>, fragments: Vec<String>) {
        self.map.insert(feature.into(), fragments);
    }

    /// Build an index from a catalog document mapping feature name to a
    /// fragment name or a list of fragment names.
    pub fn from_document(document: &Value) -> Result<Self, FeatureError> {
        let map = document
            .as_object()
            .ok_or_else(|| FeatureError::BadIndex("document is not a mapping".to_string()))?;

        let mut index = Self::new();
        for (feature, value) in map {
            let fragments = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => {
                    let mut names = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => names.push(s.clone()),
                            other => {
                                return Err(FeatureError::BadIndex(format!(
                                    "feature '{feature}' lists non-string fragment {other}"
                                )))
                            }
                        }
                    }
                    names
                }
                other => {
                    return Err(FeatureError::BadIndex(format!(
                        "feature '{feature}' must map to a fragment name or list, got {other}"
                    )))
                }
            };
            index.insert(feature.clone(), fragments);
        }
        Ok(index)
    }

    /// Fragment names enabled by one feature.
    pub fn fragments_for(&self, feature: &str) -> Result<&[String], FeatureError> {
        self.map
            .get(feature)
            .map(|v| v.as_slice())
            .ok_or_else(|| FeatureError::UnknownFeature(feature.to_string()))
    }

    /// Flatten a profile's enabled features into one ordered fragment-name
    /// sequence (profile feature order, index expansion order), duplicates
    /// collapsed to their first occurrence.
    pub fn fragments_for_profile(
        &self,
        profile: &DeviceProfile,
    ) -> Result<Vec<String>, FeatureError> {
        let mut names = Vec::new();
        for feature in profile.feature_names() {
            for fragment in self.fragments_for(feature)? {
                if !names.contains(fragment) {
                    names.push(fragment.clone());
                }
            }
        }
        Ok(names)
    }
}

/// Compose the validation schema for everything a device profile enables.
pub fn compose_for_profile(
    catalog: &FragmentCatalog,
    index: &FeatureIndex,
    profile: &DeviceProfile,
) -> Result<CompositeSchema, FeatureError> {
    let names = index.fragments_for_profile(profile)?;
    Ok(compose(catalog, names.iter().map(|n| n.as_str()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provcfg_core::parse_document;
    use provcfg_devices::DeviceRegistry;

    fn fixtures() -> (DeviceProfile, FragmentCatalog, FeatureIndex) {
        let device = parse_document(
            r#"
info:
  memory_map:
    flash: {start: 0, size: "0x80000"}
features:
  iee:
    reg_spec: iee_regs.json
  sb31: {}
"#,
        )
        .unwrap();
        let registry = DeviceRegistry::from_documents(vec![("mcxn947".to_string(), device)]);
        let profile = registry.resolve("mcxn947", None).unwrap();

        let fragments = parse_document(
            r#"
keyblob_base:
  properties:
    startAddress: {type: number}
  required: [startAddress]
iee_keyblob:
  properties:
    aesMode: {type: string, enum: [xts, ctr]}
  required: [aesMode]
sb31_commands:
  properties:
    commands: {type: array}
  required: [commands]
"#,
        )
        .unwrap();
        let catalog = FragmentCatalog::from_document(&fragments).unwrap();

        let index = FeatureIndex::from_document(
            &parse_document(
                "iee: [keyblob_base, iee_keyblob]\nsb31: [keyblob_base, sb31_commands]\n",
            )
            .unwrap(),
        )
        .unwrap();

        (profile, catalog, index)
    }

    #[test]
    fn test_fragments_for_profile_flattens_in_order() {
        let (profile, _, index) = fixtures();
        let names = index.fragments_for_profile(&profile).unwrap();
        assert_eq!(names, vec!["keyblob_base", "iee_keyblob", "sb31_commands"]);
    }

    #[test]
    fn test_compose_for_profile() {
        let (profile, catalog, index) = fixtures();
        let schema = compose_for_profile(&catalog, &index, &profile).unwrap();
        assert_eq!(
            schema.required,
            vec!["startAddress", "aesMode", "commands"]
        );
    }

    #[test]
    fn test_unknown_feature() {
        let (profile, _, mut index) = fixtures();
        index.map.remove("sb31");
        assert!(matches!(
            index.fragments_for_profile(&profile),
            Err(FeatureError::UnknownFeature(f)) if f == "sb31"
        ));
    }

    #[test]
    fn test_bad_index_shapes_rejected() {
        assert!(FeatureIndex::from_document(&parse_document("iee: 5\n").unwrap()).is_err());
        assert!(
            FeatureIndex::from_document(&parse_document("iee: [1, 2]\n").unwrap()).is_err()
        );
    }
}
