//! Resolved device profile types

use crate::memmap::{MemoryMap, RawRegion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A fully-resolved device profile: the configuration for one microcontroller
/// family member at one revision.
///
/// Profiles are produced by [`DeviceRegistry::resolve`](crate::DeviceRegistry::resolve)
/// and are plain immutable data from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    /// Canonical device name (alias redirects already applied).
    pub name: String,
    /// Resolved revision name (`latest` translated to its real name).
    pub revision: String,
    pub memory_map: MemoryMap,
    /// Enabled features with their feature-specific parameters
    /// (register-spec file references, image-builder mixin lists, ...).
    pub features: BTreeMap<String, Value>,
}

impl DeviceProfile {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Feature parameters for `name`, if the feature is enabled.
    pub fn feature(&self, name: &str) -> Option<&Value> {
        self.features.get(name)
    }

    /// Enabled feature names in deterministic order.
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(|k| k.as_str())
    }
}

/// The non-control portion of a profile document after revision overlay:
/// everything except `revisions`/`latest`/`alias`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfileBody {
    #[serde(default)]
    pub info: RawProfileInfo,
    #[serde(default)]
    pub features: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfileInfo {
    #[serde(default)]
    pub memory_map: BTreeMap<String, RawRegion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_body_deserializes() {
        let body: RawProfileBody = serde_json::from_value(json!({
            "info": {
                "memory_map": {
                    "flash": {"start": "0x0", "size": "0x100000"},
                }
            },
            "features": {
                "iee": {"reg_spec": "iee_regs.json"},
                "sbx": {"mixins": ["load", "execute"]},
            }
        }))
        .unwrap();

        assert_eq!(body.info.memory_map.len(), 1);
        assert_eq!(body.features.len(), 2);
        assert_eq!(body.features["iee"]["reg_spec"], "iee_regs.json");
    }

    #[test]
    fn test_raw_body_tolerates_missing_sections() {
        let body: RawProfileBody = serde_json::from_value(json!({})).unwrap();
        assert!(body.info.memory_map.is_empty());
        assert!(body.features.is_empty());
    }
}
