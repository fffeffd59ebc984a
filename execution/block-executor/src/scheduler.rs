// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{block_output::TxnTelemetry, counters};
use occ_types::{
    error::{code_invariant_error, PanicError},
    Incarnation, TxnIndex,
};
use std::collections::BTreeSet;
use tracing::warn;

/// All possible statuses for each transaction. Each status contains the latest incarnation
/// number.
///
/// 'Pending' means that the incarnation should be executed once the declared dependencies of
/// the transaction are validated. Dispatching it to a worker changes the status to
/// 'Executing'. A finished execution is either 'Executed', or 'Aborted' if a read observed an
/// estimate: the next incarnation is then dispatched once the writer of the estimate has
/// finished executing. 'Executed' incarnations are picked up by the next validation sweep,
/// which turns them into 'Validated', or back into 'Pending' with the next incarnation.
/// 'Validated' is final unless a lower transaction re-executes, in which case the next sweep
/// validates the incarnation again.
///
/// Status transition diagram:
/// Pending(i)
///    |  next_executions (dependencies validated)
///    ↓                  finish_execution (estimate observed)
/// Executing(i) ------------------------------------------------> Aborted(i)
///    |                                                               |
///    |  finish_execution                           next_executions  |
///    ↓                                                               ↓
/// Executed(i)                                                   Executing(i+1)
///    |
///    |  start_validation
///    ↓               finish_validation (invalid)
/// Validating(i) --------------------------------------------------> Pending(i+1)
///    |     ↑
///    |     | start_validation (lower txn re-executed)
///    ↓     |
/// Validated(i)
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    Pending(Incarnation),
    Executing(Incarnation),
    Executed(Incarnation),
    Aborted(Incarnation),
    Validating(Incarnation),
    Validated(Incarnation),
}

/// How an execution dispatched by the scheduler ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionOutcome {
    Executed,
    /// A read observed an estimate written by the given txn.
    SpeculativeAbort(TxnIndex),
    /// The execution hit an error that halts the block.
    Halted,
}

/// Single-threaded control state of a block execution. Owned by the thread that drives the
/// block; workers report back to that thread, which updates the scheduler.
pub struct Scheduler {
    /// Number of txns to execute, immutable.
    num_txns: TxnIndex,
    status: Vec<TaskStatus>,
    /// Declared dependencies, immutable. A txn is not dispatched before they are validated.
    dependencies: Vec<BTreeSet<TxnIndex>>,
    /// Writer of the estimate observed by the last aborted incarnation.
    abort_deps: Vec<Option<TxnIndex>>,
    telemetry: Vec<TxnTelemetry>,

    concurrency_level: usize,
    max_incarnation: Incarnation,
    num_in_flight: usize,
    /// Rounds are separated by validation sweeps, starting at 1.
    round: usize,
    /// Lowest txn that finished an execution since the last validation sweep.
    min_reexecuted_idx: Option<TxnIndex>,
    sequential: bool,
    fell_back_to_sequential: bool,
    halted: bool,
}

impl Scheduler {
    pub fn new(
        num_txns: TxnIndex,
        mut dependencies: Vec<BTreeSet<TxnIndex>>,
        concurrency_level: usize,
        max_incarnation: Incarnation,
    ) -> Self {
        dependencies.resize_with(num_txns as usize, BTreeSet::new);
        Self {
            num_txns,
            status: vec![TaskStatus::Pending(0); num_txns as usize],
            dependencies,
            abort_deps: vec![None; num_txns as usize],
            telemetry: vec![TxnTelemetry::default(); num_txns as usize],
            concurrency_level: concurrency_level.max(1),
            max_incarnation,
            num_in_flight: 0,
            round: 1,
            min_reexecuted_idx: None,
            sequential: concurrency_level <= 1,
            fell_back_to_sequential: false,
            halted: false,
        }
    }

    pub fn num_txns(&self) -> TxnIndex {
        self.num_txns
    }

    pub fn status(&self, txn_idx: TxnIndex) -> TaskStatus {
        self.status[txn_idx as usize]
    }

    pub fn round(&self) -> usize {
        self.round
    }

    /// Number of validation sweeps performed so far.
    pub fn num_rounds(&self) -> usize {
        self.round - 1
    }

    pub fn num_in_flight(&self) -> usize {
        self.num_in_flight
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    pub fn fell_back_to_sequential(&self) -> bool {
        self.fell_back_to_sequential
    }

    /// Stops dispatching. Executions in flight still have to be reported.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Every txn is validated and nothing is in flight.
    pub fn done(&self) -> bool {
        self.num_in_flight == 0
            && self
                .status
                .iter()
                .all(|status| matches!(status, TaskStatus::Validated(_)))
    }

    pub fn telemetry(&self, txn_idx: TxnIndex) -> &TxnTelemetry {
        &self.telemetry[txn_idx as usize]
    }

    pub fn into_telemetry(self) -> Vec<TxnTelemetry> {
        self.telemetry
    }

    /// Returns the incarnations that can be executed now and marks them executing.
    pub fn next_executions(&mut self) -> Vec<(TxnIndex, Incarnation)> {
        let mut ret = Vec::new();
        if self.halted {
            return ret;
        }

        if self.sequential {
            // One at a time, in order: only the lowest txn that is not validated yet.
            if self.num_in_flight == 0 {
                if let Some(idx) = self
                    .status
                    .iter()
                    .position(|status| !matches!(status, TaskStatus::Validated(_)))
                {
                    if let Some(incarnation) = self.incarnation_to_execute(idx as TxnIndex) {
                        self.dispatch(idx as TxnIndex, incarnation);
                        ret.push((idx as TxnIndex, incarnation));
                    }
                }
            }
            return ret;
        }

        for txn_idx in 0..self.num_txns {
            if self.num_in_flight >= self.concurrency_level {
                break;
            }
            if let Some(incarnation) = self.incarnation_to_execute(txn_idx) {
                if self.dependencies_resolved(txn_idx) {
                    self.dispatch(txn_idx, incarnation);
                    ret.push((txn_idx, incarnation));
                }
            }
        }
        ret
    }

    fn incarnation_to_execute(&self, txn_idx: TxnIndex) -> Option<Incarnation> {
        match self.status[txn_idx as usize] {
            TaskStatus::Pending(incarnation) => Some(incarnation),
            TaskStatus::Aborted(incarnation) => Some(incarnation + 1),
            _ => None,
        }
    }

    fn dependencies_resolved(&mut self, txn_idx: TxnIndex) -> bool {
        let idx = txn_idx as usize;
        let status = &self.status;
        let telemetry = &mut self.telemetry[idx];

        let mut resolved = true;
        for dep in &self.dependencies[idx] {
            if !matches!(status[*dep as usize], TaskStatus::Validated(_)) {
                telemetry.waited_on.insert(*dep);
                resolved = false;
            }
        }
        if let Some(dep) = self.abort_deps[idx] {
            // The estimate is replaced once its writer has finished executing.
            if !matches!(
                status[dep as usize],
                TaskStatus::Executed(_) | TaskStatus::Validating(_) | TaskStatus::Validated(_)
            ) {
                resolved = false;
            }
        }
        resolved
    }

    fn dispatch(&mut self, txn_idx: TxnIndex, incarnation: Incarnation) {
        let idx = txn_idx as usize;
        self.status[idx] = TaskStatus::Executing(incarnation);
        self.abort_deps[idx] = None;
        self.num_in_flight += 1;

        let telemetry = &mut self.telemetry[idx];
        telemetry.incarnations = incarnation + 1;
        telemetry.first_executed_round.get_or_insert(self.round);
    }

    fn check_status(
        &self,
        txn_idx: TxnIndex,
        expected: TaskStatus,
    ) -> Result<(), PanicError> {
        let status = self.status[txn_idx as usize];
        if status != expected {
            return Err(code_invariant_error(format!(
                "[OCC]: txn {} has status {:?}, expected {:?}",
                txn_idx, status, expected
            )));
        }
        Ok(())
    }

    /// Once a txn reaches `max_incarnation`, the rest of the block runs sequentially.
    fn on_new_incarnation(&mut self, txn_idx: TxnIndex, incarnation: Incarnation) {
        if !self.sequential && incarnation >= self.max_incarnation {
            warn!(
                txn_idx = txn_idx,
                incarnation = incarnation,
                "[OCC]: Too many incarnations, falling back to sequential execution"
            );
            counters::SEQUENTIAL_FALLBACK_COUNT.inc();
            self.sequential = true;
            self.fell_back_to_sequential = true;
        }
    }

    pub fn finish_execution(
        &mut self,
        txn_idx: TxnIndex,
        incarnation: Incarnation,
        outcome: ExecutionOutcome,
    ) -> Result<(), PanicError> {
        self.check_status(txn_idx, TaskStatus::Executing(incarnation))?;
        if let ExecutionOutcome::SpeculativeAbort(depends_on) = outcome {
            if depends_on >= txn_idx {
                return Err(code_invariant_error(format!(
                    "[OCC]: txn {} aborted on a higher txn {}",
                    txn_idx, depends_on
                )));
            }
        }
        let idx = txn_idx as usize;
        self.num_in_flight -= 1;
        self.min_reexecuted_idx = Some(
            self.min_reexecuted_idx
                .map_or(txn_idx, |min_idx| min_idx.min(txn_idx)),
        );

        match outcome {
            ExecutionOutcome::Executed => {
                self.status[idx] = TaskStatus::Executed(incarnation);
            },
            ExecutionOutcome::SpeculativeAbort(depends_on) => {
                self.status[idx] = TaskStatus::Aborted(incarnation);
                self.abort_deps[idx] = Some(depends_on);
                let telemetry = &mut self.telemetry[idx];
                telemetry.aborts += 1;
                telemetry.waited_on.insert(depends_on);
                telemetry.validated_round = None;
                self.on_new_incarnation(txn_idx, incarnation + 1);
            },
            ExecutionOutcome::Halted => {
                self.status[idx] = TaskStatus::Pending(incarnation);
                self.halted = true;
            },
        }
        Ok(())
    }

    /// Starts a validation sweep: every executed incarnation, and every validated one above
    /// the lowest txn that executed since the previous sweep. Only called with nothing in
    /// flight.
    pub fn start_validation(&mut self) -> Result<Vec<(TxnIndex, Incarnation)>, PanicError> {
        if self.num_in_flight > 0 {
            return Err(code_invariant_error(format!(
                "[OCC]: Validation started with {} executions in flight",
                self.num_in_flight
            )));
        }

        let min_reexecuted_idx = self.min_reexecuted_idx.unwrap_or(self.num_txns);
        let mut candidates = Vec::new();
        for (idx, status) in self.status.iter_mut().enumerate() {
            let incarnation = match *status {
                TaskStatus::Executed(incarnation) => incarnation,
                TaskStatus::Validated(incarnation) if idx as TxnIndex > min_reexecuted_idx => {
                    incarnation
                },
                _ => continue,
            };
            *status = TaskStatus::Validating(incarnation);
            candidates.push((idx as TxnIndex, incarnation));
        }
        Ok(candidates)
    }

    /// Applies the results of a validation sweep, returning the incarnations that failed, in
    /// index order. Each of them is demoted to the next incarnation.
    pub fn finish_validation(
        &mut self,
        mut results: Vec<(TxnIndex, Incarnation, bool)>,
    ) -> Result<Vec<(TxnIndex, Incarnation)>, PanicError> {
        results.sort_unstable_by_key(|(txn_idx, _, _)| *txn_idx);

        let mut failed = Vec::new();
        for (txn_idx, incarnation, valid) in results {
            self.check_status(txn_idx, TaskStatus::Validating(incarnation))?;
            let idx = txn_idx as usize;
            if valid {
                self.status[idx] = TaskStatus::Validated(incarnation);
                self.telemetry[idx].validated_round.get_or_insert(self.round);
            } else {
                self.status[idx] = TaskStatus::Pending(incarnation + 1);
                let telemetry = &mut self.telemetry[idx];
                telemetry.validation_failures += 1;
                telemetry.validated_round = None;
                self.on_new_incarnation(txn_idx, incarnation + 1);
                failed.push((txn_idx, incarnation));
            }
        }

        if let Some((idx, status)) = self
            .status
            .iter()
            .enumerate()
            .find(|(_, status)| matches!(status, TaskStatus::Validating(_)))
        {
            return Err(code_invariant_error(format!(
                "[OCC]: txn {} left in {:?} after validation",
                idx, status
            )));
        }

        self.round += 1;
        self.min_reexecuted_idx = None;
        Ok(failed)
    }
}
