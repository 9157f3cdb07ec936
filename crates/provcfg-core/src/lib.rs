//! Provcfg Core - Value normalization and catalog document loading
//!
//! This crate provides the shared foundation for the provcfg workspace:
//! - Normalization of numeric/boolean values supplied as native literals or
//!   as decimal/hex/binary/octal strings
//! - Catalog document loading (JSON with YAML fallback) and deterministic
//!   directory listing

pub mod catalog;
pub mod value;

pub use catalog::{catalog_files, load_document, parse_document, CatalogError};
pub use value::{str_to_u64, value_to_bool, value_to_u64, ValueError};
