// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_types::write_set::WriteOp;
pub use occ_types::{Incarnation, TxnIndex, Version};
use std::sync::Arc;
use thiserror::Error;

/// Payload of a single entry in the multi-version table.
#[derive(Debug, PartialEq, Eq)]
pub enum EntryCell<V> {
    /// A value or a tombstone written by a finished incarnation.
    Write(Arc<WriteOp<V>>),
    /// The writer intends to touch the key, but its final value is not known yet. Readers
    /// that observe an estimate must not proceed with any prior value.
    Estimate,
}

impl<V> Clone for EntryCell<V> {
    fn clone(&self) -> Self {
        match self {
            EntryCell::Write(op) => EntryCell::Write(op.clone()),
            EntryCell::Estimate => EntryCell::Estimate,
        }
    }
}

/// The effect of one transaction (at a given incarnation) on one key.
#[derive(Debug, PartialEq, Eq)]
pub struct VersionedEntry<V> {
    pub incarnation: Incarnation,
    pub cell: EntryCell<V>,
}

impl<V> Clone for VersionedEntry<V> {
    fn clone(&self) -> Self {
        Self {
            incarnation: self.incarnation,
            cell: self.cell.clone(),
        }
    }
}

impl<V> VersionedEntry<V> {
    pub(crate) fn new_write(incarnation: Incarnation, op: Arc<WriteOp<V>>) -> Self {
        Self {
            incarnation,
            cell: EntryCell::Write(op),
        }
    }

    pub(crate) fn new_estimate(incarnation: Incarnation) -> Self {
        Self {
            incarnation,
            cell: EntryCell::Estimate,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self.cell, EntryCell::Estimate)
    }
}

/// Information from the latest versioned write. The version is returned alongside the data so
/// that validation can compare versions instead of (potentially large) values.
pub type VersionedRead<V> = (Version, Arc<WriteOp<V>>);

/// Returned as Err(..) when failed to read from the multi-version data-structure.
#[derive(Debug, PartialEq, Eq)]
pub enum MVDataError {
    /// No prior entry is found, the reader must fall back to storage.
    NotFound,
    /// A dependency on other transaction has been found during the read.
    Dependency(TxnIndex),
}

/// Errors raised while writing the final contents of the table to storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlushError {
    /// The highest entry of a key is an estimate. Nothing was written to storage.
    #[error("estimate by txn {txn_idx} leaked to commit for key {key}")]
    EstimateLeakedToCommit { key: String, txn_idx: TxnIndex },
    #[error("failed to apply committed writes to storage: {0}")]
    Storage(String),
}
