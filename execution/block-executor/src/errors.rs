// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use occ_access_dag::DagError;
use occ_mvhashmap::types::FlushError;
use occ_types::{error::PanicError, TxnIndex};
use std::fmt;
use thiserror::Error;

/// Returned by reads of a [`TransactionView`](crate::view::TransactionView). The transaction
/// must stop and return the error: its incarnation is discarded either way.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// The read observed an estimate written by `depends_on`. The incarnation will be
    /// re-executed once `depends_on` finishes.
    #[error("speculative read depends on txn {depends_on}")]
    Aborted { depends_on: TxnIndex },
    /// The backing store failed. Fatal for the block.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors that reject the whole block. No state is committed when one is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockExecutionError<E> {
    /// The declared accesses of the block could not be ordered.
    CyclicDependency(String),
    /// An estimate was found at the position the final flush reads.
    EstimateLeakedToCommit { key: String, txn_idx: TxnIndex },
    /// unrecoverable block executor error
    FatalBlockExecutorError(PanicError),
    /// unrecoverable VM error
    FatalVMError(E),
    StorageError(String),
}

pub type BlockExecutionResult<T, E> = Result<T, BlockExecutionError<E>>;

impl<E: fmt::Debug> fmt::Display for BlockExecutionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockExecutionError::CyclicDependency(msg) => {
                write!(f, "block rejected, cyclic dependency: {}", msg)
            },
            BlockExecutionError::EstimateLeakedToCommit { key, txn_idx } => write!(
                f,
                "estimate by txn {} leaked to commit for key {}",
                txn_idx, key
            ),
            BlockExecutionError::FatalBlockExecutorError(err) => {
                write!(f, "fatal block executor error: {}", err)
            },
            BlockExecutionError::FatalVMError(err) => write!(f, "fatal VM error: {:?}", err),
            BlockExecutionError::StorageError(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for BlockExecutionError<E> {}

impl<E> From<PanicError> for BlockExecutionError<E> {
    fn from(err: PanicError) -> Self {
        BlockExecutionError::FatalBlockExecutorError(err)
    }
}

impl<E> From<DagError> for BlockExecutionError<E> {
    fn from(err: DagError) -> Self {
        match err {
            DagError::CyclicDependency(msg) => BlockExecutionError::CyclicDependency(msg),
            DagError::InvalidResourceTree(msg) => BlockExecutionError::CyclicDependency(format!(
                "invalid resource tree: {}",
                msg
            )),
        }
    }
}

impl<E> From<FlushError> for BlockExecutionError<E> {
    fn from(err: FlushError) -> Self {
        match err {
            FlushError::EstimateLeakedToCommit { key, txn_idx } => {
                BlockExecutionError::EstimateLeakedToCommit { key, txn_idx }
            },
            FlushError::Storage(msg) => BlockExecutionError::StorageError(msg),
        }
    }
}
