// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_types::state_store::{StateViewResult, TStateView};
use parking_lot::RwLock;
use std::{collections::HashMap, hash::Hash, ops::Bound};

/// Point-read cache in front of the base state of a block, shared by all execution views of
/// the block. Range scans are not cached and go to the base view directly.
pub struct CachedStateView<'a, S: TStateView> {
    base_view: &'a S,
    cache: RwLock<HashMap<S::Key, Option<S::Value>>>,
}

impl<'a, S> CachedStateView<'a, S>
where
    S: TStateView,
    S::Key: Hash + Eq + Clone,
    S::Value: Clone,
{
    pub fn new(base_view: &'a S) -> Self {
        Self {
            base_view,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn num_cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl<S> TStateView for CachedStateView<'_, S>
where
    S: TStateView,
    S::Key: Hash + Eq + Clone + Send + Sync,
    S::Value: Clone + Send + Sync,
{
    type Key = S::Key;
    type Value = S::Value;

    fn get_state_value(&self, key: &S::Key) -> StateViewResult<Option<S::Value>> {
        if let Some(value) = self.cache.read().get(key) {
            return Ok(value.clone());
        }

        // Errors are not cached; the read is retried by the next caller.
        let value = self.base_view.get_state_value(key)?;
        // Another reader may have filled the entry since the miss; the first fill wins so
        // that every reader of the block observes the same value.
        Ok(self
            .cache
            .write()
            .entry(key.clone())
            .or_insert(value)
            .clone())
    }

    fn scan(
        &self,
        start: Bound<&S::Key>,
        end: Bound<&S::Key>,
    ) -> StateViewResult<Vec<(S::Key, S::Value)>> {
        self.base_view.scan(start, end)
    }
}
