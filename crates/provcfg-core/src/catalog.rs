//! Catalog document loading
//!
//! Device profiles and schema fragments are authored as JSON or YAML
//! mappings. Parsing tries JSON first and falls back to YAML, so a catalog
//! directory may mix both freely. Directory listings are sorted by file name
//! to keep load order deterministic.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("cannot parse catalog document {path}: {reason}")]
    Unparseable { path: String, reason: String },
    #[error("catalog document {0} is not a mapping")]
    NotAMapping(String),
}

/// Parse a catalog document from a string, trying JSON first, then YAML.
///
/// The result must be a mapping at the top level.
pub fn parse_document(content: &str) -> Result<Value, CatalogError> {
    let value: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(json_err) => {
            serde_yaml::from_str(content).map_err(|yaml_err| CatalogError::Unparseable {
                path: "<inline>".to_string(),
                reason: format!("not JSON ({json_err}) nor YAML ({yaml_err})"),
            })?
        }
    };

    if !value.is_object() {
        return Err(CatalogError::NotAMapping("<inline>".to_string()));
    }
    Ok(value)
}

/// Load and parse a catalog document from a file.
pub fn load_document(path: &Path) -> Result<Value, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "Loading catalog document");
    parse_document(&content).map_err(|e| match e {
        CatalogError::Unparseable { reason, .. } => CatalogError::Unparseable {
            path: path.display().to_string(),
            reason,
        },
        CatalogError::NotAMapping(_) => CatalogError::NotAMapping(path.display().to_string()),
        other => other,
    })
}

/// List catalog files (`*.json`, `*.yaml`, `*.yml`) in a directory,
/// sorted by name.
pub fn catalog_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") | Some("yaml") | Some("yml") => files.push(path),
            _ => {}
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let doc = parse_document(r#"{"latest": "a1", "features": {}}"#).unwrap();
        assert_eq!(doc["latest"], "a1");
    }

    #[test]
    fn test_parse_yaml_fallback() {
        let doc = parse_document("latest: a1\nfeatures:\n  iee: {}\n").unwrap();
        assert_eq!(doc["latest"], "a1");
        assert!(doc["features"]["iee"].is_object());
    }

    #[test]
    fn test_rejects_non_mapping() {
        assert!(matches!(
            parse_document("- just\n- a\n- list\n"),
            Err(CatalogError::NotAMapping(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_document("{ not: valid: anything ["),
            Err(CatalogError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_catalog_files_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "x: 1").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "").unwrap();

        let files = catalog_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.yaml"]);
    }

    #[test]
    fn test_load_document_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "{ not: valid: [").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }
}
