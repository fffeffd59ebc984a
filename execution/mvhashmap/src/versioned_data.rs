// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::types::{
    EntryCell, FlushError, Incarnation, MVDataError, TxnIndex, VersionedEntry, VersionedRead,
};
use crossbeam::utils::CachePadded;
use dashmap::DashMap;
use occ_types::{
    state_store::{is_valid_range, TStateStore},
    write_set::{WriteOp, WriteSetMut},
};
use parking_lot::RwLock;
use std::{
    collections::{btree_map::BTreeMap, BTreeSet},
    fmt::Debug,
    hash::Hash,
    ops::Bound,
    sync::Arc,
};
use tracing::error;

/// Maps a transaction index to the entry it wrote. The index order gives the serialization
/// order of the block, so "latest before txn_idx" is a range query on the map.
struct VersionedValue<V> {
    versioned_map: BTreeMap<TxnIndex, CachePadded<VersionedEntry<V>>>,
}

impl<V> Default for VersionedValue<V> {
    fn default() -> Self {
        Self {
            versioned_map: BTreeMap::new(),
        }
    }
}

impl<V> VersionedValue<V> {
    fn read(&self, txn_idx: TxnIndex) -> Result<VersionedRead<V>, MVDataError> {
        match self.versioned_map.range(0..txn_idx).next_back() {
            Some((idx, entry)) => match &entry.cell {
                EntryCell::Write(op) => Ok(((*idx, entry.incarnation), op.clone())),
                EntryCell::Estimate => Err(MVDataError::Dependency(*idx)),
            },
            None => Err(MVDataError::NotFound),
        }
    }
}

/// Versioned data of the block, keyed by state key.
///
/// Concurrency is managed by DashMap: a method accessing the BTreeMap of a key holds exclusive
/// access to the shard containing it, so mutations of unrelated keys do not serialize against
/// each other. `key_index` orders the keys for range queries. It only grows, and a key is added
/// under the exclusive lock before its first entry is installed.
pub struct VersionedData<K, V> {
    values: DashMap<K, VersionedValue<V>>,
    key_index: RwLock<BTreeSet<K>>,
}

impl<K, V> VersionedData<K, V>
where
    K: Hash + Ord + Clone + Debug,
{
    pub(crate) fn empty() -> Self {
        Self {
            values: DashMap::new(),
            key_index: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn num_keys(&self) -> usize {
        self.values.len()
    }

    /// Returns (number of entries, number of estimates) across all keys.
    pub(crate) fn entry_counts(&self) -> (usize, usize) {
        self.values.iter().fold((0, 0), |(entries, estimates), value| {
            let map = &value.versioned_map;
            (
                entries + map.len(),
                estimates + map.values().filter(|e| e.is_estimate()).count(),
            )
        })
    }

    fn register_key(&self, key: &K) {
        if self.key_index.read().contains(key) {
            return;
        }
        // Fill on miss is a mutation and always takes the exclusive lock.
        self.key_index.write().insert(key.clone());
    }

    /// Installs the write of transaction `txn_idx`, replacing any entry previously written at
    /// the same index (by an earlier incarnation).
    pub fn set(&self, key: K, txn_idx: TxnIndex, incarnation: Incarnation, op: WriteOp<V>) {
        self.register_key(&key);
        let mut value = self.values.entry(key).or_default();
        value.versioned_map.insert(
            txn_idx,
            CachePadded::new(VersionedEntry::new_write(incarnation, Arc::new(op))),
        );
    }

    /// Installs an estimate at `txn_idx`: the transaction may write the key, but the value is
    /// not known yet. Replaces a write of the same index if there is one.
    pub fn set_estimate(&self, key: K, txn_idx: TxnIndex, incarnation: Incarnation) {
        self.register_key(&key);
        let mut value = self.values.entry(key).or_default();
        value.versioned_map.insert(
            txn_idx,
            CachePadded::new(VersionedEntry::new_estimate(incarnation)),
        );
    }

    /// Removes the entry written by `txn_idx`, if any. Used when a new incarnation no longer
    /// writes a key written by a previous incarnation.
    pub fn remove(&self, key: &K, txn_idx: TxnIndex) {
        if let Some(mut value) = self.values.get_mut(key) {
            value.versioned_map.remove(&txn_idx);
        }
    }

    /// Returns the entry with the greatest index strictly below `txn_idx`. Err(NotFound) means
    /// no transaction in the block wrote the key before `txn_idx` and the caller must read
    /// storage. Err(Dependency(idx)) means the latest such entry is an estimate by `idx`.
    pub fn get_latest_before(
        &self,
        key: &K,
        txn_idx: TxnIndex,
    ) -> Result<VersionedRead<V>, MVDataError> {
        self.values
            .get(key)
            .map_or(Err(MVDataError::NotFound), |value| value.read(txn_idx))
    }

    /// Returns the entry written exactly at `txn_idx`.
    pub fn get_at(&self, key: &K, txn_idx: TxnIndex) -> Option<VersionedEntry<V>> {
        self.values.get(key).and_then(|value| {
            value
                .versioned_map
                .get(&txn_idx)
                .map(|entry| VersionedEntry::clone(entry))
        })
    }

    /// For every key in the given range that has an entry visible to `txn_idx` (i.e. written at
    /// a smaller index), returns the key with the latest such entry, in ascending key order.
    /// Keys without a visible entry are omitted (storage decides for them). Fails with the
    /// first estimate encountered.
    pub fn range_before(
        &self,
        start: Bound<&K>,
        end: Bound<&K>,
        txn_idx: TxnIndex,
    ) -> Result<Vec<(K, VersionedRead<V>)>, MVDataError> {
        if !is_valid_range(start, end) {
            return Ok(vec![]);
        }
        let keys: Vec<K> = self
            .key_index
            .read()
            .range::<K, _>((start, end))
            .cloned()
            .collect();

        let mut ret = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get_latest_before(&key, txn_idx) {
                Ok(read) => ret.push((key, read)),
                Err(MVDataError::NotFound) => {},
                Err(dependency) => return Err(dependency),
            }
        }
        Ok(ret)
    }

    /// Computes the final write of every key: the entry at the highest index, in ascending key
    /// order. Fails without returning anything if that entry is an estimate.
    pub fn committed_write_set(&self) -> Result<WriteSetMut<K, V>, FlushError>
    where
        V: Clone,
    {
        let keys = self.key_index.read();
        let mut write_set = WriteSetMut::default();
        for key in keys.iter() {
            let value = match self.values.get(key) {
                Some(value) => value,
                None => continue,
            };
            if let Some((idx, entry)) = value.versioned_map.iter().next_back() {
                match &entry.cell {
                    EntryCell::Write(op) => write_set.insert((key.clone(), op.as_ref().clone())),
                    EntryCell::Estimate => {
                        error!(
                            txn_idx = *idx,
                            incarnation = entry.incarnation,
                            "[OCC]: Estimate at final position of key {:?}",
                            key
                        );
                        return Err(FlushError::EstimateLeakedToCommit {
                            key: format!("{:?}", key),
                            txn_idx: *idx,
                        });
                    },
                }
            }
        }
        Ok(write_set)
    }

    /// Writes the final value (or tombstone) of every key to `store`, in deterministic key
    /// order, as a single write-set. Nothing is written if any key ends in an estimate.
    pub fn flush_committed<S>(&self, store: &mut S) -> Result<WriteSetMut<K, V>, FlushError>
    where
        S: TStateStore<Key = K, Value = V>,
        V: Clone,
    {
        let write_set = self.committed_write_set()?;
        store
            .apply_write_set(write_set.clone())
            .map_err(|err| FlushError::Storage(err.to_string()))?;
        Ok(write_set)
    }
}
