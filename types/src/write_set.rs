// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! For each transaction the executor runs, the output is a `WriteSetMut` that contains each key
//! it updates. For each key, the transaction can either give its new value or delete it.

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum WriteOp<V> {
    Modification(V),
    Deletion,
}

impl<V> WriteOp<V> {
    #[inline]
    pub fn is_deletion(&self) -> bool {
        match self {
            WriteOp::Deletion => true,
            WriteOp::Modification(_) => false,
        }
    }

    /// The written value, or None for a deletion.
    pub fn as_value(&self) -> Option<&V> {
        match self {
            WriteOp::Modification(v) => Some(v),
            WriteOp::Deletion => None,
        }
    }
}

impl<V: Clone> WriteOp<V> {
    pub fn to_value(&self) -> Option<V> {
        self.as_value().cloned()
    }
}

/// Ordered collection of writes, at most one per key. Later inserts for the same key replace
/// earlier ones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteSetMut<K, V> {
    write_set: BTreeMap<K, WriteOp<V>>,
}

impl<K, V> Default for WriteSetMut<K, V> {
    fn default() -> Self {
        Self {
            write_set: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> WriteSetMut<K, V> {
    pub fn new(write_ops: impl IntoIterator<Item = (K, WriteOp<V>)>) -> Self {
        Self {
            write_set: write_ops.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, item: (K, WriteOp<V>)) {
        self.write_set.insert(item.0, item.1);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.write_set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.write_set.len()
    }

    pub fn get(&self, key: &K) -> Option<&WriteOp<V>> {
        self.write_set.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, WriteOp<V>> {
        self.write_set.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, K, WriteOp<V>> {
        self.write_set.keys()
    }

    pub fn as_inner(&self) -> &BTreeMap<K, WriteOp<V>> {
        &self.write_set
    }
}

impl<K: Ord, V> FromIterator<(K, WriteOp<V>)> for WriteSetMut<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, WriteOp<V>)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<K: Ord, V> IntoIterator for WriteSetMut<K, V> {
    type IntoIter = btree_map::IntoIter<K, WriteOp<V>>;
    type Item = (K, WriteOp<V>);

    fn into_iter(self) -> Self::IntoIter {
        self.write_set.into_iter()
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a WriteSetMut<K, V> {
    type IntoIter = btree_map::Iter<'a, K, WriteOp<V>>;
    type Item = (&'a K, &'a WriteOp<V>);

    fn into_iter(self) -> Self::IntoIter {
        self.write_set.iter()
    }
}
