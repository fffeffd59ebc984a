// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Optimistic parallel execution of an ordered block. The block fixes the
serialization order tx_0 < tx_1 < ... < tx_n-1, and the outcome must be the
one of executing the transactions one after the other in that order.

A transaction may run several times: every run is an incarnation, and a
version is the pair (transaction index, incarnation). Running incarnations
write into a multi-version table that keeps, per key, the latest write of each
transaction tagged with its version (see `occ_mvhashmap`). A read by tx_j
returns the write of the highest tx_i < tx_j, together with its version, and
falls back to the state before the block through a shared point-read cache
when no lower transaction wrote the key.

Before the block runs, every transaction declares the resources it accesses
(see `occ_access_dag`). The declarations are turned into a dependency graph:
a cycle rejects the block before anything executes, and the per-transaction
dependency sets hold a transaction back until the transactions it is expected
to conflict with are validated. The hints only save wasted work; correctness
comes from validation.

A single controller thread owns the scheduler. It dispatches incarnations to
the executor thread pool and waits for their completions on a channel. When
nothing is in flight and nothing can be dispatched, it runs a validation
sweep: the read-set of every executed incarnation (and of every validated one
above the lowest transaction that re-executed since the previous sweep) is
compared against the multi-version data-structure, together with the key sets
of its range scans. An incarnation that fails validation has its writes marked
as estimates and is re-executed. A read that observes an estimate returns
`ViewError::Aborted` and the incarnation is re-executed once the writer of the
estimate has finished. The sweeps divide the execution into rounds.

If a transaction reaches the maximum incarnation, the rest of the block is
executed sequentially through the same machinery. Once every transaction is
validated, the output of the final incarnations is reported in block order
and the final write of every key is flushed to the store as a single
write-set.
*/

pub mod block_output;
pub mod cached_state_view;
pub mod captured_reads;
pub mod config;
pub mod counters;
pub mod errors;
pub mod executor;
pub mod scheduler;
pub mod task;
pub mod txn_last_input_output;
#[cfg(test)]
mod unit_tests;
pub mod view;

pub use block_output::{BlockOutput, TransactionResult, TxnTelemetry};
pub use config::{BlockExecutorConfig, ConfigError};
pub use errors::{BlockExecutionError, BlockExecutionResult, ViewError};
pub use executor::BlockExecutor;
pub use task::{ExecutionStatus, ExecutorTask, Transaction};
pub use view::{ExecutionView, TransactionView};
