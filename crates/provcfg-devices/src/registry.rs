//! Device profile registry
//!
//! The registry loads raw device documents once, validates each profile's
//! structure eagerly, and answers `resolve(device, revision)` calls against
//! the immutable catalog from then on. A structurally broken profile is
//! dropped with a recorded [`LoadFailure`]; it never aborts loading the rest
//! of the catalog.

use crate::memmap::{resolve_memory_map, MemoryMapError};
use crate::profile::{DeviceProfile, RawProfileBody};
use provcfg_core::{catalog_files, load_document, CatalogError};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
    #[error("unknown revision '{revision}' for device '{device}'")]
    UnknownRevision { device: String, revision: String },
    #[error("alias cycle while resolving device '{0}'")]
    AliasCycle(String),
    #[error("invalid profile for device '{device}': {reason}")]
    BadProfile { device: String, reason: String },
    #[error(transparent)]
    MemoryMap(#[from] MemoryMapError),
}

/// A per-profile load failure. The rest of the catalog stays usable.
#[derive(Debug)]
pub struct LoadFailure {
    pub device: String,
    pub error: DeviceError,
}

/// One loaded (not yet revision-resolved) catalog entry.
#[derive(Debug, Clone)]
struct ProfileEntry {
    alias: Option<String>,
    latest: Option<String>,
    revisions: BTreeMap<String, Map<String, Value>>,
    /// The document minus the `revisions`/`latest`/`alias` control keys.
    baseline: Map<String, Value>,
}

/// Process-wide read-only device catalog. Loaded once, shared by reference
/// (or `Arc`) afterwards.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: BTreeMap<String, ProfileEntry>,
    failures: Vec<LoadFailure>,
}

impl DeviceRegistry {
    /// Build a registry from `(device name, document)` pairs.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entries = BTreeMap::new();
        let mut failures = Vec::new();

        for (name, document) in documents {
            match parse_entry(&name, document) {
                Ok(entry) => match validate_entry(&name, &entry) {
                    Ok(()) => {
                        entries.insert(name, entry);
                    }
                    Err(error) => {
                        warn!(device = %name, %error, "Dropping device profile");
                        failures.push(LoadFailure { device: name, error });
                    }
                },
                Err(error) => {
                    warn!(device = %name, %error, "Dropping device profile");
                    failures.push(LoadFailure { device: name, error });
                }
            }
        }

        info!(
            devices = entries.len(),
            failures = failures.len(),
            "Loaded device catalog"
        );
        Self { entries, failures }
    }

    /// Load every catalog file in a directory; the file stem names the device.
    ///
    /// Files sharing a stem name the same device; the first (in sorted file
    /// order) wins and the rest are recorded as failures.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut documents = Vec::new();
        let mut failures = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for path in catalog_files(dir)? {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if !seen.insert(name.clone()) {
                warn!(device = %name, path = %path.display(), "Duplicate device catalog file");
                failures.push(LoadFailure {
                    device: name.clone(),
                    error: DeviceError::BadProfile {
                        device: name,
                        reason: format!("duplicate catalog file {}", path.display()),
                    },
                });
                continue;
            }
            match load_document(&path) {
                Ok(doc) => documents.push((name, doc)),
                Err(e) => failures.push(LoadFailure {
                    device: name.clone(),
                    error: DeviceError::BadProfile {
                        device: name,
                        reason: e.to_string(),
                    },
                }),
            }
        }

        let mut registry = Self::from_documents(documents);
        registry.failures.extend(failures);
        Ok(registry)
    }

    /// Per-profile failures collected during load.
    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Names of all successfully loaded devices, aliases included.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Resolve a device (and optional revision) into a concrete profile.
    ///
    /// Aliases substitute their target wholesale and resolution repeats; an
    /// omitted revision selects the profile's declared `latest`.
    pub fn resolve(
        &self,
        device_id: &str,
        revision: Option<&str>,
    ) -> Result<DeviceProfile, DeviceError> {
        let (canonical, entry) = self.chase_alias(device_id)?;

        let (revision_name, overlay) = match revision {
            Some(name) => {
                let doc = entry.revisions.get(name).ok_or_else(|| {
                    DeviceError::UnknownRevision {
                        device: canonical.to_string(),
                        revision: name.to_string(),
                    }
                })?;
                (name.to_string(), Some(doc))
            }
            None => match &entry.latest {
                Some(latest) => {
                    let doc = entry.revisions.get(latest).ok_or_else(|| {
                        DeviceError::UnknownRevision {
                            device: canonical.to_string(),
                            revision: latest.clone(),
                        }
                    })?;
                    (latest.clone(), Some(doc))
                }
                None => ("base".to_string(), None),
            },
        };

        debug!(device = %canonical, revision = %revision_name, "Resolving device profile");

        let merged = match overlay {
            Some(rev) => overlay_profile(&entry.baseline, rev),
            None => entry.baseline.clone(),
        };

        let body: RawProfileBody =
            serde_json::from_value(Value::Object(merged)).map_err(|e| DeviceError::BadProfile {
                device: canonical.to_string(),
                reason: e.to_string(),
            })?;

        let memory_map = resolve_memory_map(&body.info.memory_map)?;

        Ok(DeviceProfile {
            name: canonical.to_string(),
            revision: revision_name,
            memory_map,
            features: body.features,
        })
    }

    /// Follow alias redirects to the canonical entry.
    fn chase_alias(&self, device_id: &str) -> Result<(&str, &ProfileEntry), DeviceError> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = device_id;

        loop {
            if !visited.insert(current) {
                return Err(DeviceError::AliasCycle(device_id.to_string()));
            }
            let (name, entry) = self
                .entries
                .get_key_value(current)
                .ok_or_else(|| DeviceError::UnknownDevice(current.to_string()))?;
            match &entry.alias {
                Some(target) => {
                    debug!(from = %current, to = %target, "Following device alias");
                    current = target;
                }
                None => return Ok((name.as_str(), entry)),
            }
        }
    }
}

/// Split a raw document into control keys and baseline body.
fn parse_entry(device: &str, document: Value) -> Result<ProfileEntry, DeviceError> {
    let bad = |reason: &str| DeviceError::BadProfile {
        device: device.to_string(),
        reason: reason.to_string(),
    };

    let mut map = match document {
        Value::Object(map) => map,
        _ => return Err(bad("profile document is not a mapping")),
    };

    let alias = match map.remove("alias") {
        None => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(bad("'alias' must be a string")),
    };
    let latest = match map.remove("latest") {
        None => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(bad("'latest' must be a string")),
    };
    let mut revisions = BTreeMap::new();
    match map.remove("revisions") {
        None => {}
        Some(Value::Object(revs)) => {
            for (name, doc) in revs {
                match doc {
                    Value::Object(doc) => {
                        revisions.insert(name, doc);
                    }
                    _ => return Err(bad(&format!("revision '{name}' is not a mapping"))),
                }
            }
        }
        Some(_) => return Err(bad("'revisions' must be a mapping")),
    }

    Ok(ProfileEntry {
        alias,
        latest,
        revisions,
        baseline: map,
    })
}

/// Eager structural validation: every revision (and the baseline) must yield
/// a well-formed body with a resolvable memory map.
fn validate_entry(device: &str, entry: &ProfileEntry) -> Result<(), DeviceError> {
    if entry.alias.is_some() {
        return Ok(());
    }

    if let Some(latest) = &entry.latest {
        if !entry.revisions.contains_key(latest) {
            return Err(DeviceError::BadProfile {
                device: device.to_string(),
                reason: format!("'latest' names unknown revision '{latest}'"),
            });
        }
    }

    let mut candidates: Vec<Map<String, Value>> = vec![entry.baseline.clone()];
    for rev in entry.revisions.values() {
        candidates.push(overlay_profile(&entry.baseline, rev));
    }

    for merged in candidates {
        let body: RawProfileBody =
            serde_json::from_value(Value::Object(merged)).map_err(|e| DeviceError::BadProfile {
                device: device.to_string(),
                reason: e.to_string(),
            })?;
        resolve_memory_map(&body.info.memory_map)?;
    }
    Ok(())
}

/// Shallow revision overlay: top-level keys replace wholesale, except
/// `info`, which merges one level deep, and `info.memory_map`, which merges
/// at region granularity (a region in the revision replaces that whole
/// region). No deeper recursion, so override semantics stay predictable.
fn overlay_profile(base: &Map<String, Value>, revision: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();

    for (key, value) in revision {
        match (key.as_str(), merged.get_mut(key), value) {
            ("info", Some(Value::Object(base_info)), Value::Object(rev_info)) => {
                for (info_key, info_value) in rev_info {
                    match (info_key.as_str(), base_info.get_mut(info_key), info_value) {
                        ("memory_map", Some(Value::Object(base_map)), Value::Object(rev_map)) => {
                            for (region, region_value) in rev_map {
                                base_map.insert(region.clone(), region_value.clone());
                            }
                        }
                        _ => {
                            base_info.insert(info_key.clone(), info_value.clone());
                        }
                    }
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use provcfg_core::parse_document;

    fn catalog() -> DeviceRegistry {
        let mcxn = parse_document(
            r#"
latest: b1
revisions:
  a0: {}
  b1:
    info:
      memory_map:
        flash:
          start: "0x0"
          size: "0x100000"
info:
  memory_map:
    flash:
      start: "0x0"
      size: "0x80000"
    flash_mirror:
      mirror_of: flash
    sram:
      start: "0x20000000"
      size: "0x40000"
features:
  iee:
    reg_spec: iee_regs.json
  sb31:
    mixins: [load, execute]
"#,
        )
        .unwrap();

        let alias = parse_document("alias: mcxn947\n").unwrap();

        DeviceRegistry::from_documents(vec![
            ("mcxn947".to_string(), mcxn),
            ("mcxn94x".to_string(), alias),
        ])
    }

    #[test]
    fn test_resolve_latest_by_default() {
        let registry = catalog();
        let profile = registry.resolve("mcxn947", None).unwrap();
        assert_eq!(profile.revision, "b1");
        // b1 overrides the flash region wholesale.
        assert_eq!(profile.memory_map.region("flash").unwrap().size, 0x100000);
        // Untouched regions are inherited from the baseline.
        assert_eq!(profile.memory_map.region("sram").unwrap().size, 0x40000);
    }

    #[test]
    fn test_resolve_explicit_revision() {
        let registry = catalog();
        let profile = registry.resolve("mcxn947", Some("a0")).unwrap();
        assert_eq!(profile.revision, "a0");
        assert_eq!(profile.memory_map.region("flash").unwrap().size, 0x80000);
    }

    #[test]
    fn test_mirror_tracks_overridden_source() {
        let registry = catalog();
        let latest = registry.resolve("mcxn947", None).unwrap();
        assert_eq!(
            latest.memory_map.region("flash_mirror").unwrap().size,
            0x100000
        );
        let a0 = registry.resolve("mcxn947", Some("a0")).unwrap();
        assert_eq!(a0.memory_map.region("flash_mirror").unwrap().size, 0x80000);
    }

    #[test]
    fn test_alias_substitutes_target() {
        let registry = catalog();
        let profile = registry.resolve("mcxn94x", None).unwrap();
        assert_eq!(profile.name, "mcxn947");
        assert_eq!(profile.revision, "b1");
    }

    #[test]
    fn test_alias_cycle_detected() {
        let a = parse_document("alias: b\n").unwrap();
        let b = parse_document("alias: a\n").unwrap();
        let registry =
            DeviceRegistry::from_documents(vec![("a".to_string(), a), ("b".to_string(), b)]);
        assert!(matches!(
            registry.resolve("a", None),
            Err(DeviceError::AliasCycle(_))
        ));
    }

    #[test]
    fn test_unknown_device_and_revision() {
        let registry = catalog();
        assert!(matches!(
            registry.resolve("rt1060", None),
            Err(DeviceError::UnknownDevice(_))
        ));
        assert!(matches!(
            registry.resolve("mcxn947", Some("z9")),
            Err(DeviceError::UnknownRevision { .. })
        ));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = catalog();
        let first = registry.resolve("mcxn947", Some("b1")).unwrap();
        let second = registry.resolve("mcxn947", Some("b1")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_broken_profile_does_not_poison_catalog() {
        let good = parse_document("info:\n  memory_map:\n    flash: {start: 0, size: 16}\n")
            .unwrap();
        let overlapping = parse_document(
            r#"
info:
  memory_map:
    a: {start: 0, size: "0x100"}
    b: {start: "0x80", size: "0x100"}
"#,
        )
        .unwrap();

        let registry = DeviceRegistry::from_documents(vec![
            ("good".to_string(), good),
            ("broken".to_string(), overlapping),
        ]);

        assert_eq!(registry.failures().len(), 1);
        assert_eq!(registry.failures()[0].device, "broken");
        assert!(registry.resolve("good", None).is_ok());
        assert!(matches!(
            registry.resolve("broken", None),
            Err(DeviceError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_latest_must_name_known_revision() {
        let doc = parse_document("latest: b1\nrevisions:\n  a0: {}\n").unwrap();
        let registry = DeviceRegistry::from_documents(vec![("dev".to_string(), doc)]);
        assert_eq!(registry.failures().len(), 1);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("mcxn947.yaml"),
            "info:\n  memory_map:\n    flash: {start: 0, size: 16}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("garbage.yaml"), "{ not: valid: [").unwrap();

        let registry = DeviceRegistry::load_dir(dir.path()).unwrap();
        assert!(registry.resolve("mcxn947", None).is_ok());
        assert_eq!(registry.failures().len(), 1);
        assert_eq!(registry.failures()[0].device, "garbage");
    }

    #[test]
    fn test_load_dir_rejects_duplicate_stems() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("mcxn947.json"),
            r#"{"info": {"memory_map": {"flash": {"start": 0, "size": 16}}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("mcxn947.yaml"),
            "info:\n  memory_map:\n    flash: {start: 0, size: 32}\n",
        )
        .unwrap();

        let registry = DeviceRegistry::load_dir(dir.path()).unwrap();

        // Sorted file order: the .json wins, the .yaml is recorded.
        let profile = registry.resolve("mcxn947", None).unwrap();
        assert_eq!(profile.memory_map.region("flash").unwrap().size, 16);
        assert_eq!(registry.failures().len(), 1);
        assert_eq!(registry.failures()[0].device, "mcxn947");
        assert!(registry.failures()[0].error.to_string().contains("duplicate"));
    }
}
