// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{errors::ViewError, view::TransactionView};
use occ_types::TxnIndex;
use std::{fmt::Debug, hash::Hash};

/// The execution result of a transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus<O, E> {
    /// Transaction was executed successfully. All of its writes are committed.
    Success(O),
    /// Transaction failed for an application reason (e.g. insufficient balance). Only the
    /// writes made before the last [`TransactionView::checkpoint`] are committed.
    Failure(O),
    /// Transaction hit a none recoverable error during execution. If this is the status of
    /// the final incarnation, the block is rejected and the error is propagated to the caller.
    Abort(E),
}

/// Trait that defines a transaction that could be parallel executed by the scheduler. Each
/// transaction will write to a key value storage as their side effect.
pub trait Transaction: Sync + Send + 'static {
    type Key: Ord + Send + Sync + Clone + Hash + Eq + Debug;
    type Value: Send + Sync + Clone + Debug + PartialEq;
}

/// Trait for single threaded transaction executor.
pub trait ExecutorTask: Sync {
    /// Type of transaction and its associated key and value.
    type Txn: Transaction;

    /// The output of a transaction, reported to the caller for every transaction of the
    /// block in order.
    type Output: Send + Sync + Debug + 'static;

    /// Type of error when the executor failed to process a transaction and needs to abort.
    type Error: Clone + Send + Sync + Debug + 'static;

    /// Type to intialize the transaction executor. A single instance is created per block
    /// and shared by all workers.
    type Argument: Sync + Copy;

    fn init(args: Self::Argument) -> Self;

    /// Execute a single transaction given a view of the state as of `txn_idx`. Reads that
    /// return [`ViewError`] must be propagated: the incarnation is then discarded.
    ///
    /// Must not keep state across calls: every incarnation of a transaction is executed with
    /// a fresh view and must depend only on what it reads from it.
    fn execute_transaction(
        &self,
        view: &mut impl TransactionView<
            Key = <Self::Txn as Transaction>::Key,
            Value = <Self::Txn as Transaction>::Value,
        >,
        txn: &Self::Txn,
        txn_idx: TxnIndex,
    ) -> Result<ExecutionStatus<Self::Output, Self::Error>, ViewError>;
}
