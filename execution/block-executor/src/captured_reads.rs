// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_mvhashmap::{
    types::{MVDataError, Version},
    versioned_data::VersionedData,
};
use occ_types::{write_set::WriteOp, TxnIndex};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Debug,
    hash::Hash,
    ops::Bound,
    sync::Arc,
};

/// What a point read observed, used to decide later whether the read is still valid.
#[derive(Debug)]
pub enum DataRead<V> {
    /// The latest entry below the reader was written by the given version.
    Versioned(Version, Arc<WriteOp<V>>),
    /// No transaction below the reader wrote the key, the value came from storage.
    Storage(Option<V>),
}

impl<V: Clone> DataRead<V> {
    pub fn value(&self) -> Option<V> {
        match self {
            DataRead::Versioned(_, op) => op.to_value(),
            DataRead::Storage(value) => value.clone(),
        }
    }
}

/// A range scan, with the keys that were visible to the reader from outside its own
/// write-set.
#[derive(Debug)]
pub struct IterationRecord<K> {
    pub start: Bound<K>,
    pub end: Bound<K>,
    /// Keys present in storage within the range.
    pub base_keys: BTreeSet<K>,
    /// Keys observed: storage keys merged with the entries of lower transactions.
    pub observed_keys: BTreeSet<K>,
}

/// Merges the keys of the storage range with entries of the multi-version table visible to
/// the reader. Deletions hide storage keys.
pub(crate) fn merge_visible_keys<K: Ord + Clone, V>(
    base_keys: &BTreeSet<K>,
    versioned: &[(K, (Version, Arc<WriteOp<V>>))],
) -> BTreeSet<K> {
    let mut keys = base_keys.clone();
    for (key, (_, op)) in versioned {
        if op.is_deletion() {
            keys.remove(key);
        } else {
            keys.insert(key.clone());
        }
    }
    keys
}

/// Read-set and iteration-set of a single incarnation.
#[derive(Debug)]
pub struct CapturedReads<K, V> {
    data_reads: BTreeMap<K, DataRead<V>>,
    iterations: Vec<IterationRecord<K>>,
}

impl<K, V> Default for CapturedReads<K, V> {
    fn default() -> Self {
        Self {
            data_reads: BTreeMap::new(),
            iterations: Vec::new(),
        }
    }
}

impl<K, V> CapturedReads<K, V>
where
    K: Hash + Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&DataRead<V>> {
        self.data_reads.get(key)
    }

    /// Records the first read of `key`. Later reads of the same key are served from the
    /// recorded one, so an incarnation always observes a single value per key.
    pub fn capture_read(&mut self, key: K, read: DataRead<V>) {
        self.data_reads.entry(key).or_insert(read);
    }

    /// Point reads of keys within the range, in key order.
    pub fn reads_in_range<'a>(
        &'a self,
        start: Bound<&'a K>,
        end: Bound<&'a K>,
    ) -> impl Iterator<Item = (&'a K, &'a DataRead<V>)> + 'a {
        self.data_reads.range::<K, _>((start, end))
    }

    pub fn capture_iteration(&mut self, record: IterationRecord<K>) {
        self.iterations.push(record);
    }

    pub fn num_reads(&self) -> usize {
        self.data_reads.len()
    }

    pub fn iterations(&self) -> &[IterationRecord<K>] {
        &self.iterations
    }

    /// Every point read must resolve to the same version. A storage read stays valid only
    /// while no lower transaction writes the key. Observing an estimate is a failure.
    pub fn validate_data_reads(&self, data: &VersionedData<K, V>, txn_idx: TxnIndex) -> bool {
        self.data_reads
            .iter()
            .all(|(key, read)| match (read, data.get_latest_before(key, txn_idx)) {
                (DataRead::Versioned(version, _), Ok((latest, _))) => *version == latest,
                (DataRead::Storage(_), Err(MVDataError::NotFound)) => true,
                _ => false,
            })
    }

    /// Every scanned range must contain the same set of keys as when it was scanned.
    pub fn validate_iterations(&self, data: &VersionedData<K, V>, txn_idx: TxnIndex) -> bool {
        self.iterations.iter().all(|record| {
            match data.range_before(record.start.as_ref(), record.end.as_ref(), txn_idx) {
                Ok(versioned) => {
                    merge_visible_keys(&record.base_keys, &versioned) == record.observed_keys
                },
                Err(_) => false,
            }
        })
    }

    pub fn validate(&self, data: &VersionedData<K, V>, txn_idx: TxnIndex) -> bool {
        self.validate_data_reads(data, txn_idx) && self.validate_iterations(data, txn_idx)
    }
}
