// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    captured_reads::{merge_visible_keys, CapturedReads, DataRead, IterationRecord},
    errors::ViewError,
};
use occ_mvhashmap::{types::MVDataError, versioned_data::VersionedData};
use occ_types::{
    state_store::{is_valid_range, TStateView},
    write_set::{WriteOp, WriteSetMut},
    Incarnation, TxnIndex,
};
use std::{collections::BTreeMap, fmt::Debug, hash::Hash, ops::Bound};
use tracing::debug;

/// State as seen by one incarnation of one transaction: every write of lower transactions in
/// the block, over the base state.
pub trait TransactionView {
    type Key;
    type Value;

    /// Reads the value of `key`, or None if it does not exist. The transaction's own writes
    /// are visible.
    fn get(&mut self, key: &Self::Key) -> Result<Option<Self::Value>, ViewError>;

    /// Returns the existing (key, value) pairs in the range, in ascending key order.
    fn iterate(
        &mut self,
        start: Bound<&Self::Key>,
        end: Bound<&Self::Key>,
    ) -> Result<Vec<(Self::Key, Self::Value)>, ViewError>;

    fn set(&mut self, key: Self::Key, value: Self::Value);

    fn delete(&mut self, key: Self::Key);

    /// Writes made so far are kept even if the transaction then fails for an application
    /// reason (e.g. fee payment before the main body).
    fn checkpoint(&mut self);
}

/// What an incarnation leaves behind once the application logic returns.
pub(crate) struct ViewOutput<K, V> {
    pub reads: CapturedReads<K, V>,
    pub write_set: WriteSetMut<K, V>,
    pub checkpointed: WriteSetMut<K, V>,
    pub speculative_abort: Option<TxnIndex>,
    pub storage_error: Option<String>,
}

/// [`TransactionView`] over the multi-version table of a block and its base state. Records
/// the reads and range scans of the incarnation for validation. Writes stay local until the
/// executor applies them to the table.
pub struct ExecutionView<'a, K, V, S> {
    txn_idx: TxnIndex,
    incarnation: Incarnation,
    versioned_data: &'a VersionedData<K, V>,
    base_view: &'a S,
    captured_reads: CapturedReads<K, V>,
    write_set: WriteSetMut<K, V>,
    checkpointed: WriteSetMut<K, V>,
    // Both are kept even if the transaction ignores the returned error.
    speculative_abort: Option<TxnIndex>,
    storage_error: Option<String>,
}

impl<'a, K, V, S> ExecutionView<'a, K, V, S>
where
    K: Hash + Ord + Clone + Debug,
    V: Clone,
    S: TStateView<Key = K, Value = V>,
{
    pub fn new(
        txn_idx: TxnIndex,
        incarnation: Incarnation,
        versioned_data: &'a VersionedData<K, V>,
        base_view: &'a S,
    ) -> Self {
        Self {
            txn_idx,
            incarnation,
            versioned_data,
            base_view,
            captured_reads: CapturedReads::new(),
            write_set: WriteSetMut::default(),
            checkpointed: WriteSetMut::default(),
            speculative_abort: None,
            storage_error: None,
        }
    }

    pub fn txn_idx(&self) -> TxnIndex {
        self.txn_idx
    }

    /// The lower transaction whose estimate this incarnation observed, if any. Once set, the
    /// incarnation is discarded whatever the transaction returns.
    pub fn speculative_abort(&self) -> Option<TxnIndex> {
        self.speculative_abort
    }

    pub fn captured_reads(&self) -> &CapturedReads<K, V> {
        &self.captured_reads
    }

    pub fn write_set(&self) -> &WriteSetMut<K, V> {
        &self.write_set
    }

    pub(crate) fn into_output(self) -> ViewOutput<K, V> {
        ViewOutput {
            reads: self.captured_reads,
            write_set: self.write_set,
            checkpointed: self.checkpointed,
            speculative_abort: self.speculative_abort,
            storage_error: self.storage_error,
        }
    }

    fn abort_on(&mut self, depends_on: TxnIndex) -> ViewError {
        debug!(
            txn_idx = self.txn_idx,
            incarnation = self.incarnation,
            depends_on = depends_on,
            "[OCC]: Read observed an estimate"
        );
        // The first dependency is the one reported to the scheduler.
        self.speculative_abort.get_or_insert(depends_on);
        ViewError::Aborted { depends_on }
    }

    fn storage_failure(&mut self, err: anyhow::Error) -> ViewError {
        let msg = format!("{:#}", err);
        self.storage_error.get_or_insert_with(|| msg.clone());
        ViewError::Storage(msg)
    }
}

impl<K, V, S> TransactionView for ExecutionView<'_, K, V, S>
where
    K: Hash + Ord + Clone + Debug,
    V: Clone,
    S: TStateView<Key = K, Value = V>,
{
    type Key = K;
    type Value = V;

    fn get(&mut self, key: &K) -> Result<Option<V>, ViewError> {
        if let Some(op) = self.write_set.get(key) {
            return Ok(op.to_value());
        }
        if let Some(read) = self.captured_reads.get(key) {
            return Ok(read.value());
        }

        match self.versioned_data.get_latest_before(key, self.txn_idx) {
            Ok((version, op)) => {
                let value = op.to_value();
                self.captured_reads
                    .capture_read(key.clone(), DataRead::Versioned(version, op));
                Ok(value)
            },
            Err(MVDataError::Dependency(depends_on)) => Err(self.abort_on(depends_on)),
            Err(MVDataError::NotFound) => {
                let value = self
                    .base_view
                    .get_state_value(key)
                    .map_err(|err| self.storage_failure(err))?;
                self.captured_reads
                    .capture_read(key.clone(), DataRead::Storage(value.clone()));
                Ok(value)
            },
        }
    }

    fn iterate(&mut self, start: Bound<&K>, end: Bound<&K>) -> Result<Vec<(K, V)>, ViewError> {
        if !is_valid_range(start, end) {
            return Ok(vec![]);
        }

        let versioned = match self.versioned_data.range_before(start, end, self.txn_idx) {
            Ok(versioned) => versioned,
            Err(MVDataError::Dependency(depends_on)) => return Err(self.abort_on(depends_on)),
            Err(MVDataError::NotFound) => vec![],
        };
        let base = self
            .base_view
            .scan(start, end)
            .map_err(|err| self.storage_failure(err))?;

        let base_keys = base.iter().map(|(key, _)| key.clone()).collect();
        let observed_keys = merge_visible_keys(&base_keys, &versioned);

        let mut visible: BTreeMap<K, V> = base.into_iter().collect();
        for (key, (version, op)) in versioned {
            match op.as_ref() {
                WriteOp::Modification(value) => {
                    visible.insert(key.clone(), value.clone());
                },
                WriteOp::Deletion => {
                    visible.remove(&key);
                },
            }
            self.captured_reads
                .capture_read(key, DataRead::Versioned(version, op));
        }
        // Storage keys not overwritten in the block are point reads of storage as well, so
        // that a lower transaction writing one of them invalidates the scan.
        for key in observed_keys.iter() {
            if self.captured_reads.get(key).is_none() {
                let value = visible.get(key).cloned();
                self.captured_reads
                    .capture_read(key.clone(), DataRead::Storage(value));
            }
        }
        // Earlier reads of keys in the range win, including keys the scan no longer sees, so
        // that the incarnation observes one value per key.
        for (key, read) in self.captured_reads.reads_in_range(start, end) {
            match read.value() {
                Some(value) => visible.insert(key.clone(), value),
                None => visible.remove(key),
            };
        }

        self.captured_reads.capture_iteration(IterationRecord {
            start: start.cloned(),
            end: end.cloned(),
            base_keys,
            observed_keys,
        });

        for (key, op) in self.write_set.as_inner().range::<K, _>((start, end)) {
            match op {
                WriteOp::Modification(value) => {
                    visible.insert(key.clone(), value.clone());
                },
                WriteOp::Deletion => {
                    visible.remove(key);
                },
            }
        }
        Ok(visible.into_iter().collect())
    }

    fn set(&mut self, key: K, value: V) {
        self.write_set.insert((key, WriteOp::Modification(value)));
    }

    fn delete(&mut self, key: K) {
        self.write_set.insert((key, WriteOp::Deletion));
    }

    fn checkpoint(&mut self) {
        self.checkpointed = self.write_set.clone();
    }
}
