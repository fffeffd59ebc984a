// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    state_store::{is_valid_range, StateViewResult, TStateStore, TStateView},
    write_set::{WriteOp, WriteSetMut},
};
use std::{collections::BTreeMap, fmt::Debug, ops::Bound};

/// A `BTreeMap` backed state store, used by tests, benchmarks and embedders that keep the whole
/// state in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryStateStore<K: Ord, V> {
    data: BTreeMap<K, V>,
}

impl<K: Ord, V> InMemoryStateStore<K, V> {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.data.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<K, V> {
        &self.data
    }

    pub fn into_inner(self) -> BTreeMap<K, V> {
        self.data
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for InMemoryStateStore<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<K, V> TStateView for InMemoryStateStore<K, V>
where
    K: Ord + Clone + Debug + Send + Sync,
    V: Clone + Debug + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn get_state_value(&self, state_key: &K) -> StateViewResult<Option<V>> {
        Ok(self.data.get(state_key).cloned())
    }

    fn scan(&self, start: Bound<&K>, end: Bound<&K>) -> StateViewResult<Vec<(K, V)>> {
        if !is_valid_range(start, end) {
            return Ok(vec![]);
        }
        Ok(self
            .data
            .range((start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl<K, V> TStateStore for InMemoryStateStore<K, V>
where
    K: Ord + Clone + Debug + Send + Sync,
    V: Clone + Debug + Send + Sync,
{
    fn apply_write_set(&mut self, write_set: WriteSetMut<K, V>) -> StateViewResult<()> {
        for (key, op) in write_set {
            match op {
                WriteOp::Modification(value) => {
                    self.data.insert(key, value);
                },
                WriteOp::Deletion => {
                    self.data.remove(&key);
                },
            }
        }
        Ok(())
    }
}
