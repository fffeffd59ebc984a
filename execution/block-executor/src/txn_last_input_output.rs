// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{captured_reads::CapturedReads, task::ExecutionStatus};
use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use occ_types::{
    error::{code_invariant_error, PanicError},
    TxnIndex,
};
use std::{collections::BTreeSet, sync::Arc};

/// Inputs and outputs of the latest incarnation of every transaction. Written by the worker
/// that executed the incarnation, read by validation and by the final commit.
pub struct TxnLastInputOutput<K, V, O, E> {
    inputs: Vec<CachePadded<ArcSwapOption<CapturedReads<K, V>>>>, // txn_idx -> input.

    outputs: Vec<CachePadded<ArcSwapOption<ExecutionStatus<O, E>>>>, // txn_idx -> output.

    // Keys the latest incarnation has an entry for in the multi-version table.
    modified_keys: Vec<CachePadded<ArcSwapOption<BTreeSet<K>>>>,
}

impl<K, V, O, E> TxnLastInputOutput<K, V, O, E> {
    pub fn new(num_txns: TxnIndex) -> Self {
        Self {
            inputs: (0..num_txns)
                .map(|_| CachePadded::new(ArcSwapOption::empty()))
                .collect(),
            outputs: (0..num_txns)
                .map(|_| CachePadded::new(ArcSwapOption::empty()))
                .collect(),
            modified_keys: (0..num_txns)
                .map(|_| CachePadded::new(ArcSwapOption::empty()))
                .collect(),
        }
    }

    /// Output None means the incarnation was discarded before producing a status.
    pub fn record(
        &self,
        txn_idx: TxnIndex,
        input: CapturedReads<K, V>,
        output: Option<ExecutionStatus<O, E>>,
        modified_keys: BTreeSet<K>,
    ) {
        self.inputs[txn_idx as usize].store(Some(Arc::new(input)));
        self.outputs[txn_idx as usize].store(output.map(Arc::new));
        self.modified_keys[txn_idx as usize].store(Some(Arc::new(modified_keys)));
    }

    pub fn read_set(&self, txn_idx: TxnIndex) -> Option<Arc<CapturedReads<K, V>>> {
        self.inputs[txn_idx as usize].load_full()
    }

    pub fn modified_keys(&self, txn_idx: TxnIndex) -> Option<Arc<BTreeSet<K>>> {
        self.modified_keys[txn_idx as usize].load_full()
    }

    /// Must be called once per txn, after every incarnation finished.
    pub fn take_output(&self, txn_idx: TxnIndex) -> Result<ExecutionStatus<O, E>, PanicError> {
        let output = self.outputs[txn_idx as usize].swap(None).ok_or_else(|| {
            code_invariant_error(format!("[OCC]: Output must be recorded for txn {}", txn_idx))
        })?;
        Arc::try_unwrap(output).map_err(|_| {
            code_invariant_error(format!(
                "[OCC]: Output of txn {} must not be shared at commit",
                txn_idx
            ))
        })
    }
}
