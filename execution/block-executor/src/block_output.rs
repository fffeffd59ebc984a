// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_types::{write_set::WriteSetMut, Incarnation, TxnIndex};
use std::collections::BTreeSet;

/// Final result of a transaction, reported in block order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionResult<O> {
    Success(O),
    /// The transaction failed for an application reason. Only its checkpointed writes were
    /// committed.
    Failure(O),
}

impl<O> TransactionResult<O> {
    pub fn output(&self) -> &O {
        match self {
            TransactionResult::Success(output) | TransactionResult::Failure(output) => output,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransactionResult::Success(_))
    }
}

/// How a transaction went through the scheduler, for diagnosing excessive serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxnTelemetry {
    /// Number of incarnations started, including the final one.
    pub incarnations: Incarnation,
    /// Incarnations discarded because a read observed an estimate.
    pub aborts: u32,
    /// Incarnations discarded by a validation sweep.
    pub validation_failures: u32,
    /// Lower transactions the scheduler held this one back for: declared dependencies that
    /// were not validated yet, and the writers of estimates it observed.
    pub waited_on: BTreeSet<TxnIndex>,
    /// Round in which the first incarnation was dispatched.
    pub first_executed_round: Option<usize>,
    /// Round in which the final incarnation was first validated.
    pub validated_round: Option<usize>,
}

/// Everything a block execution produced. Returned only if the whole block was committed.
#[derive(Debug)]
pub struct BlockOutput<K, V, O> {
    results: Vec<TransactionResult<O>>,
    telemetry: Vec<TxnTelemetry>,
    num_rounds: usize,
    fell_back_to_sequential: bool,
    write_set: WriteSetMut<K, V>,
}

impl<K, V, O> BlockOutput<K, V, O> {
    pub fn new(
        results: Vec<TransactionResult<O>>,
        telemetry: Vec<TxnTelemetry>,
        num_rounds: usize,
        fell_back_to_sequential: bool,
        write_set: WriteSetMut<K, V>,
    ) -> Self {
        Self {
            results,
            telemetry,
            num_rounds,
            fell_back_to_sequential,
            write_set,
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![], vec![], 0, false, WriteSetMut::default())
    }

    pub fn results(&self) -> &[TransactionResult<O>] {
        &self.results
    }

    pub fn telemetry(&self) -> &[TxnTelemetry] {
        &self.telemetry
    }

    /// Number of validation sweeps it took to validate every transaction.
    pub fn num_rounds(&self) -> usize {
        self.num_rounds
    }

    pub fn fell_back_to_sequential(&self) -> bool {
        self.fell_back_to_sequential
    }

    /// The state mutations flushed to the store, in key order.
    pub fn write_set(&self) -> &WriteSetMut<K, V> {
        &self.write_set
    }

    pub fn total_aborts(&self) -> u32 {
        self.telemetry.iter().map(|t| t.aborts).sum()
    }
}
