//! Provcfg Schema - Fragment composition, validation, and templates
//!
//! This crate turns independently-authored schema fragments into composite
//! validation schemas and operates on configuration documents against them:
//! - Fragment catalog with explicit tagged conditional rules
//! - Left-to-right composition with last-fragment-wins merge semantics
//! - Concurrent composition cache keyed by the fragment-name tuple
//! - Multi-violation document validation (no fail-fast)
//! - Template document generation from declared template values
//! - Feature index gluing resolved device profiles to fragment lists

pub mod cache;
pub mod compose;
pub mod features;
pub mod fragment;
pub mod template;
pub mod validate;

pub use cache::CompositionCache;
pub use compose::{compose, ComposeError, CompositeSchema, CompositionNote};
pub use features::{compose_for_profile, FeatureError, FeatureIndex};
pub use fragment::{
    Condition, ConditionalRule, Consequence, FragmentCatalog, FragmentError, PropertyKind,
    PropertySpec, SchemaFragment,
};
pub use template::generate_template;
pub use validate::{validate, ValidationReport, Violation, ViolationKind};
