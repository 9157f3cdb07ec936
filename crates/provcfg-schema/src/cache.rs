//! Composition cache keyed by the ordered fragment-name tuple
//!
//! Composition is deterministic, so redundant concurrent computation is
//! harmless: lookups run under a short read lock, composition runs outside
//! any lock, and insertion is insert-if-absent - the first writer wins and a
//! loser's duplicate work is discarded.

use crate::compose::{compose, ComposeError, CompositeSchema};
use crate::fragment::FragmentCatalog;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct CompositionCache {
    inner: RwLock<HashMap<Vec<String>, Arc<CompositeSchema>>>,
}

impl CompositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the composite schema for `names`, composing and caching it on
    /// first use.
    pub fn get_or_compose(
        &self,
        catalog: &FragmentCatalog,
        names: &[&str],
    ) -> Result<Arc<CompositeSchema>, ComposeError> {
        let key: Vec<String> = names.iter().map(|n| n.to_string()).collect();

        if let Some(schema) = self.inner.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(compose(catalog, names.iter().copied())?);

        let mut map = self.inner.write();
        let entry = map.entry(key).or_insert(schema);
        Ok(Arc::clone(entry))
    }

    /// Number of cached compositions.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
