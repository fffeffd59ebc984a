// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Primitive types shared by the multi-version store, the dependency graph builder and the
//! block executor.

pub mod error;
pub mod state_store;
pub mod transaction;
pub mod write_set;

pub use transaction::{Incarnation, TxnIndex, Version};
