// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Traits for the durable state beneath the multi-version store. A `TStateView` is a read-only
//! snapshot of the state before the block, passed to every transaction execution; a
//! `TStateStore` additionally accepts the final write-set of the block.

use crate::write_set::WriteSetMut;
use std::ops::Bound;

mod in_memory;

pub use in_memory::InMemoryStateStore;

pub type StateViewResult<T> = anyhow::Result<T>;

/// Whether the bounds describe a non-empty ordered range, i.e. one that `BTreeMap::range`
/// accepts: start not above end, and not both excluded at the same key.
pub fn is_valid_range<K: Ord>(start: Bound<&K>, end: Bound<&K>) -> bool {
    match (start, end) {
        (Bound::Excluded(s), Bound::Excluded(e)) => s < e,
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            s <= e
        },
        _ => true,
    }
}

pub trait TStateView: Sync {
    type Key;
    type Value;

    /// Gets the state value for a given key, or None if it does not exist.
    fn get_state_value(&self, state_key: &Self::Key) -> StateViewResult<Option<Self::Value>>;

    /// Returns all existing (key, value) pairs with keys in the given range, in ascending key
    /// order.
    fn scan(
        &self,
        start: Bound<&Self::Key>,
        end: Bound<&Self::Key>,
    ) -> StateViewResult<Vec<(Self::Key, Self::Value)>>;
}

pub trait TStateStore: TStateView {
    /// Applies all writes of the write-set. Implementations must apply it atomically: either
    /// every write becomes durable or none does.
    fn apply_write_set(
        &mut self,
        write_set: WriteSetMut<Self::Key, Self::Value>,
    ) -> StateViewResult<()>;
}
