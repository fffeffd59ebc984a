// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::versioned_data::VersionedData;
use std::{fmt::Debug, hash::Hash};

pub mod types;
pub mod versioned_data;


/// Main multi-version data-structure used by threads to read/write during parallel
/// execution.
///
/// Concurrency is managed by DashMap, i.e. when a method accesses a BTreeMap at a
/// given key, it holds exclusive access and doesn't need to explicitly synchronize
/// with other reader/writers. The table lives for a single block; a new one is created
/// for every block.
pub struct MVHashMap<K, V> {
    data: VersionedData<K, V>,
}

impl<K, V> MVHashMap<K, V>
where
    K: Hash + Ord + Clone + Debug,
{
    pub fn new() -> MVHashMap<K, V> {
        MVHashMap {
            data: VersionedData::empty(),
        }
    }

    /// Statistics recomputed from the table contents.
    pub fn stats(&self) -> BlockStateStats {
        let (num_entries, num_estimates) = self.data.entry_counts();
        BlockStateStats {
            num_keys: self.data.num_keys(),
            num_entries,
            num_estimates,
        }
    }

    pub fn data(&self) -> &VersionedData<K, V> {
        &self.data
    }
}

impl<K, V> Default for MVHashMap<K, V>
where
    K: Hash + Ord + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockStateStats {
    pub num_keys: usize,
    pub num_entries: usize,
    pub num_estimates: usize,
}
