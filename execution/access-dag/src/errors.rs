// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_types::TxnIndex;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DagError {
    /// The block must be rejected as a whole, before any transaction executes.
    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),
    #[error("invalid resource tree: {0}")]
    InvalidResourceTree(String),
}

/// Reasons a transaction's declaration is replaced by the conservative one.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("txn {txn_idx}: message {message} declares itself while being declared")]
    Circular { txn_idx: TxnIndex, message: String },
    #[error("txn {txn_idx}: nested declarations exceed depth {max_depth}")]
    TooDeep { txn_idx: TxnIndex, max_depth: usize },
    #[error("txn {txn_idx}: {reason}")]
    Invalid { txn_idx: TxnIndex, reason: String },
}
