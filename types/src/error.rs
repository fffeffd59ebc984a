// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use tracing::error;

/// An error that should never happen if the code is correct. Instead of panicking, such errors
/// are propagated to the caller, which can halt the block and report it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PanicError {
    #[error("code invariant error: {0}")]
    CodeInvariantError(String),
}

pub fn code_invariant_error<M: std::fmt::Debug>(message: M) -> PanicError {
    let msg = format!("Code invariant broken: {:?}", message);
    error!("{}", msg);
    PanicError::CodeInvariantError(msg)
}
