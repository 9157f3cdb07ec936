//! Schema fragments - named, reusable blocks of validation rules
//!
//! A fragment declares object properties, a `required` list, and conditional
//! blocks. Conditional branches in the catalogs are restricted to equality
//! tests on literal top-level properties; that restriction is enforced here
//! at load time, not assumed downstream. The loose `if/then`/`oneOf`/`anyOf`
//! input shapes are lowered into the explicit [`ConditionalRule`]
//! representation the validator interprets.

use provcfg_core::{catalog_files, load_document, CatalogError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("failed to load fragment catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to parse fragment '{fragment}': {reason}")]
    Parse { fragment: String, reason: String },
    #[error("unsupported condition in fragment '{fragment}': {reason}")]
    UnsupportedCondition { fragment: String, reason: String },
}

/// Semantic type tag of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    #[serde(alias = "integer")]
    Number,
    Boolean,
    Array,
    Object,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Number => "number",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Array => "array",
            PropertyKind::Object => "object",
        }
    }
}

/// One property declaration inside a fragment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Enumerated allowed values, if the property is restricted.
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    /// Free-form numeric/string format hint (e.g. "number", "file-path").
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Example value used only for template generation.
    #[serde(default)]
    pub template_value: Option<Value>,
    /// Never emit this property into generated templates.
    #[serde(default)]
    pub skip_in_template: bool,
}

/// Condition of a [`ConditionalRule`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Fragment-level `oneOf`/`anyOf` blocks apply unconditionally.
    Always,
    /// `if: {properties: {<property>: {const: <value>}}}`
    Equals { property: String, value: Value },
}

/// Consequence applied when a rule's condition holds against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Consequence {
    /// Additional required properties.
    Require(Vec<String>),
    /// Properties that must not be required under this condition
    /// (`then: {not: {required: [...]}}`); contradictions with a
    /// simultaneous `Require` surface as `ConflictingRule` at validation.
    Forbid(Vec<String>),
    /// Exactly one alternative (a `required` name list) must be satisfied.
    OneOf(Vec<Vec<String>>),
    /// At least one alternative must be satisfied.
    AnyOf(Vec<Vec<String>>),
}

/// A lowered conditional branch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    pub condition: Condition,
    pub consequence: Consequence,
}

/// A named, reusable schema block.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFragment {
    pub name: String,
    pub title: Option<String>,
    pub properties: BTreeMap<String, PropertySpec>,
    pub required: Vec<String>,
    pub rules: Vec<ConditionalRule>,
}

// Raw serde shapes for the catalog input format.

#[derive(Debug, Deserialize)]
struct RawFragment {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default, rename = "allOf")]
    all_of: Vec<RawConditional>,
    #[serde(default, rename = "oneOf")]
    one_of: Vec<RawRequireGroup>,
    #[serde(default, rename = "anyOf")]
    any_of: Vec<RawRequireGroup>,
}

#[derive(Debug, Deserialize)]
struct RawConditional {
    #[serde(rename = "if")]
    condition: RawIf,
    #[serde(rename = "then")]
    then: RawThen,
}

#[derive(Debug, Deserialize)]
struct RawIf {
    properties: BTreeMap<String, RawConst>,
}

#[derive(Debug, Deserialize)]
struct RawConst {
    #[serde(rename = "const")]
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawThen {
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    not: Option<RawRequireGroup>,
    #[serde(default, rename = "oneOf")]
    one_of: Vec<RawRequireGroup>,
    #[serde(default, rename = "anyOf")]
    any_of: Vec<RawRequireGroup>,
    /// Nested `allOf` flattens into more rules under the same condition.
    #[serde(default, rename = "allOf")]
    all_of: Vec<RawThen>,
}

#[derive(Debug, Deserialize)]
struct RawRequireGroup {
    required: Vec<String>,
}

impl SchemaFragment {
    /// Lower one raw fragment body into the tagged-rule representation.
    fn from_raw(name: &str, body: &Value) -> Result<Self, FragmentError> {
        let raw: RawFragment =
            serde_json::from_value(body.clone()).map_err(|e| FragmentError::Parse {
                fragment: name.to_string(),
                reason: e.to_string(),
            })?;

        let mut rules = Vec::new();
        if !raw.one_of.is_empty() {
            rules.push(ConditionalRule {
                condition: Condition::Always,
                consequence: Consequence::OneOf(
                    raw.one_of.iter().map(|g| g.required.clone()).collect(),
                ),
            });
        }
        if !raw.any_of.is_empty() {
            rules.push(ConditionalRule {
                condition: Condition::Always,
                consequence: Consequence::AnyOf(
                    raw.any_of.iter().map(|g| g.required.clone()).collect(),
                ),
            });
        }

        for conditional in &raw.all_of {
            let condition = lower_condition(name, &conditional.condition)?;
            lower_then(&condition, &conditional.then, &mut rules);
        }

        Ok(SchemaFragment {
            name: name.to_string(),
            title: raw.title,
            properties: raw.properties,
            required: raw.required,
            rules,
        })
    }
}

fn lower_condition(fragment: &str, raw: &RawIf) -> Result<Condition, FragmentError> {
    if raw.properties.len() != 1 {
        return Err(FragmentError::UnsupportedCondition {
            fragment: fragment.to_string(),
            reason: "condition must test exactly one property".to_string(),
        });
    }
    let (property, constant) = raw.properties.iter().next().unwrap_or_else(|| unreachable!());
    match &constant.value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(Condition::Equals {
            property: property.clone(),
            value: constant.value.clone(),
        }),
        other => Err(FragmentError::UnsupportedCondition {
            fragment: fragment.to_string(),
            reason: format!("condition on '{property}' must compare a literal, got {other}"),
        }),
    }
}

fn lower_then(condition: &Condition, then: &RawThen, rules: &mut Vec<ConditionalRule>) {
    if !then.required.is_empty() {
        rules.push(ConditionalRule {
            condition: condition.clone(),
            consequence: Consequence::Require(then.required.clone()),
        });
    }
    if let Some(not) = &then.not {
        rules.push(ConditionalRule {
            condition: condition.clone(),
            consequence: Consequence::Forbid(not.required.clone()),
        });
    }
    if !then.one_of.is_empty() {
        rules.push(ConditionalRule {
            condition: condition.clone(),
            consequence: Consequence::OneOf(
                then.one_of.iter().map(|g| g.required.clone()).collect(),
            ),
        });
    }
    if !then.any_of.is_empty() {
        rules.push(ConditionalRule {
            condition: condition.clone(),
            consequence: Consequence::AnyOf(
                then.any_of.iter().map(|g| g.required.clone()).collect(),
            ),
        });
    }
    for nested in &then.all_of {
        lower_then(condition, nested, rules);
    }
}

/// Process-wide read-only catalog of schema fragments.
#[derive(Debug, Clone, Default)]
pub struct FragmentCatalog {
    fragments: BTreeMap<String, SchemaFragment>,
}

impl FragmentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fragments from one catalog document (fragment name -> body).
    pub fn from_document(document: &Value) -> Result<Self, FragmentError> {
        let mut catalog = Self::new();
        catalog.add_document(document)?;
        Ok(catalog)
    }

    /// Merge one more catalog document into this catalog.
    pub fn add_document(&mut self, document: &Value) -> Result<(), FragmentError> {
        let map = document.as_object().ok_or_else(|| FragmentError::Parse {
            fragment: "<catalog>".to_string(),
            reason: "fragment catalog document is not a mapping".to_string(),
        })?;
        for (name, body) in map {
            let fragment = SchemaFragment::from_raw(name, body)?;
            self.fragments.insert(name.clone(), fragment);
        }
        Ok(())
    }

    /// Load every catalog file in a directory.
    pub fn load_dir(dir: &Path) -> Result<Self, FragmentError> {
        let mut catalog = Self::new();
        for path in catalog_files(dir)? {
            let document = load_document(&path)?;
            catalog.add_document(&document)?;
        }
        info!(fragments = catalog.fragments.len(), "Loaded fragment catalog");
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaFragment> {
        self.fragments.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provcfg_core::parse_document;

    #[test]
    fn test_lower_certificate_fragment() {
        let doc = parse_document(
            r#"
certificate_v21:
  type: object
  title: Certificate block v2.1
  properties:
    useIsk:
      type: boolean
      title: Use ISK
      default: false
      template_value: false
    signer:
      type: string
      title: Signer
      template_value: my_signer.pem
    signingCertificateFile:
      type: string
      title: Signing certificate
    iskPublicKey:
      type: string
      title: ISK public key
  required: [useIsk]
  allOf:
    - if:
        properties:
          useIsk:
            const: true
      then:
        required: [signer]
        oneOf:
          - required: [signingCertificateFile]
          - required: [iskPublicKey]
"#,
        )
        .unwrap();

        let catalog = FragmentCatalog::from_document(&doc).unwrap();
        let fragment = catalog.get("certificate_v21").unwrap();

        assert_eq!(fragment.required, vec!["useIsk"]);
        assert_eq!(fragment.properties.len(), 4);
        assert_eq!(fragment.rules.len(), 2);

        let condition = Condition::Equals {
            property: "useIsk".to_string(),
            value: Value::Bool(true),
        };
        assert_eq!(fragment.rules[0].condition, condition);
        assert_eq!(
            fragment.rules[0].consequence,
            Consequence::Require(vec!["signer".to_string()])
        );
        assert_eq!(
            fragment.rules[1].consequence,
            Consequence::OneOf(vec![
                vec!["signingCertificateFile".to_string()],
                vec!["iskPublicKey".to_string()],
            ])
        );
    }

    #[test]
    fn test_fragment_level_one_of() {
        let doc = parse_document(
            r#"
keysource:
  type: object
  properties:
    keyFile: {type: string}
    keyBlob: {type: string}
  oneOf:
    - required: [keyFile]
    - required: [keyBlob]
"#,
        )
        .unwrap();
        let catalog = FragmentCatalog::from_document(&doc).unwrap();
        let fragment = catalog.get("keysource").unwrap();
        assert_eq!(fragment.rules.len(), 1);
        assert!(matches!(fragment.rules[0].condition, Condition::Always));
        assert_eq!(
            fragment.rules[0].consequence,
            Consequence::OneOf(vec![
                vec!["keyFile".to_string()],
                vec!["keyBlob".to_string()],
            ])
        );
    }

    #[test]
    fn test_integer_is_number_alias() {
        let doc = parse_document(
            "blob:\n  properties:\n    offset:\n      type: integer\n",
        )
        .unwrap();
        let catalog = FragmentCatalog::from_document(&doc).unwrap();
        let spec = &catalog.get("blob").unwrap().properties["offset"];
        assert_eq!(spec.kind, PropertyKind::Number);
    }

    #[test]
    fn test_non_literal_condition_rejected_at_load() {
        let doc = parse_document(
            r#"
bad:
  properties:
    mode: {type: string}
  allOf:
    - if:
        properties:
          mode:
            const: [list, is, not, literal]
      then:
        required: [extra]
"#,
        )
        .unwrap();
        assert!(matches!(
            FragmentCatalog::from_document(&doc),
            Err(FragmentError::UnsupportedCondition { .. })
        ));
    }

    #[test]
    fn test_multi_property_condition_rejected_at_load() {
        let doc = parse_document(
            r#"
bad:
  allOf:
    - if:
        properties:
          a: {const: 1}
          b: {const: 2}
      then:
        required: [c]
"#,
        )
        .unwrap();
        assert!(matches!(
            FragmentCatalog::from_document(&doc),
            Err(FragmentError::UnsupportedCondition { .. })
        ));
    }

    #[test]
    fn test_nested_all_of_flattens() {
        let doc = parse_document(
            r#"
nested:
  allOf:
    - if:
        properties:
          mode: {const: encrypted}
      then:
        allOf:
          - required: [keyFile]
          - required: [nonce]
"#,
        )
        .unwrap();
        let catalog = FragmentCatalog::from_document(&doc).unwrap();
        let fragment = catalog.get("nested").unwrap();
        assert_eq!(fragment.rules.len(), 2);
        assert_eq!(
            fragment.rules[1].consequence,
            Consequence::Require(vec!["nonce".to_string()])
        );
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("certs.yaml"),
            "cert:\n  properties:\n    signer: {type: string}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("keys.json"),
            r#"{"keyblob": {"properties": {"key": {"type": "string"}}}}"#,
        )
        .unwrap();

        let catalog = FragmentCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("cert").is_some());
        assert!(catalog.get("keyblob").is_some());
    }
}
