// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

/// Position of a transaction in the block. The only order that execution must respect.
pub type TxnIndex = u32;

/// Re-execution counter of a transaction, starting at 0 and increasing on every abort.
pub type Incarnation = u32;

/// Identifies a single (re-)execution of a transaction.
pub type Version = (TxnIndex, Incarnation);
