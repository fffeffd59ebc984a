// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block_output::{BlockOutput, TransactionResult},
    cached_state_view::CachedStateView,
    config::{BlockExecutorConfig, ConfigError},
    counters,
    errors::{BlockExecutionError, BlockExecutionResult, ViewError},
    scheduler::{ExecutionOutcome, Scheduler},
    task::{ExecutionStatus, ExecutorTask, Transaction},
    txn_last_input_output::TxnLastInputOutput,
    view::ExecutionView,
};
use crossbeam_channel::unbounded;
use occ_access_dag::{build_dependency_dag, AccessDeclarer};
use occ_mvhashmap::{versioned_data::VersionedData, MVHashMap};
use occ_types::{
    error::{code_invariant_error, PanicError},
    state_store::{TStateStore, TStateView},
    write_set::WriteSetMut,
    Incarnation, TxnIndex,
};
use rayon::{prelude::*, ThreadPool};
use std::{collections::BTreeSet, marker::PhantomData, sync::Arc};
use tracing::{debug, info, warn};

type TxnInputOutput<T, E> = TxnLastInputOutput<
    <T as Transaction>::Key,
    <T as Transaction>::Value,
    <E as ExecutorTask>::Output,
    <E as ExecutorTask>::Error,
>;

/// Sent by a worker once its incarnation finished. `Ok(Some(idx))` means the incarnation
/// observed an estimate written by `idx`.
struct Completion<Err> {
    txn_idx: TxnIndex,
    incarnation: Incarnation,
    result: BlockExecutionResult<Option<TxnIndex>, Err>,
}

pub struct BlockExecutor<T, E, D> {
    config: BlockExecutorConfig,
    executor_thread_pool: Arc<ThreadPool>,
    declarer: D,
    phantom: PhantomData<(T, E)>,
}

impl<T, E, D> BlockExecutor<T, E, D>
where
    T: Transaction,
    E: ExecutorTask<Txn = T>,
    D: AccessDeclarer<T>,
{
    /// Fails if the config does not sanitize, e.g. a concurrency level of 0 or above the
    /// number of CPUs. A concurrency level of 1 executes every block sequentially.
    pub fn new(
        config: BlockExecutorConfig,
        executor_thread_pool: Arc<ThreadPool>,
        declarer: D,
    ) -> Result<Self, ConfigError> {
        config.sanitize()?;
        Ok(Self {
            config,
            executor_thread_pool,
            declarer,
            phantom: PhantomData,
        })
    }

    pub fn config(&self) -> &BlockExecutorConfig {
        &self.config
    }

    /// Executes the block with a result identical to executing it sequentially in index
    /// order, and flushes the final write of every key to `store` as a single write-set.
    /// On error nothing is written to `store`.
    pub fn execute_block<S>(
        &self,
        executor_arguments: E::Argument,
        signature_verified_block: &[T],
        store: &mut S,
    ) -> BlockExecutionResult<BlockOutput<T::Key, T::Value, E::Output>, E::Error>
    where
        S: TStateStore<Key = T::Key, Value = T::Value>,
    {
        let _timer = counters::BLOCK_EXECUTION_SECONDS.start_timer();
        if signature_verified_block.is_empty() {
            return Ok(BlockOutput::empty());
        }
        let num_txns = signature_verified_block.len() as TxnIndex;

        // A block that cannot be ordered is rejected before anything executes.
        let dag = build_dependency_dag(&self.declarer, signature_verified_block)?;
        if !dag.conservative_txns().is_empty() {
            warn!(
                num_txns = num_txns,
                conservative_txns = ?dag.conservative_txns(),
                "[OCC]: Transactions declared unknown access on any resource"
            );
            counters::CONSERVATIVE_DECLARATION_COUNT.inc_by(dag.conservative_txns().len() as u64);
        }
        counters::DECLARATION_FALLBACK_COUNT.inc_by(dag.declaration_fallbacks().len() as u64);
        let dependencies = if self.config.use_dependency_hints {
            dag.all_dependencies().to_vec()
        } else {
            vec![]
        };

        let versioned_cache = MVHashMap::new();
        let executor = E::init(executor_arguments);
        let last_input_output = TxnLastInputOutput::new(num_txns);
        let mut scheduler = Scheduler::new(
            num_txns,
            dependencies,
            self.config.concurrency_level,
            self.config.max_incarnation,
        );

        {
            let base_view = CachedStateView::new(&*store);
            self.run_rounds(
                signature_verified_block,
                &executor,
                &base_view,
                versioned_cache.data(),
                &last_input_output,
                &mut scheduler,
            )?;
        }

        let mut results = Vec::with_capacity(num_txns as usize);
        for txn_idx in 0..num_txns {
            match last_input_output.take_output(txn_idx)? {
                ExecutionStatus::Success(output) => results.push(TransactionResult::Success(output)),
                ExecutionStatus::Failure(output) => results.push(TransactionResult::Failure(output)),
                ExecutionStatus::Abort(err) => {
                    warn!(txn_idx = txn_idx, "[OCC]: Fatal error from a validated incarnation");
                    return Err(BlockExecutionError::FatalVMError(err));
                },
            }
        }

        let write_set = versioned_cache.data().flush_committed(store)?;

        let num_rounds = scheduler.num_rounds();
        let fell_back_to_sequential = scheduler.fell_back_to_sequential();
        let sequential = scheduler.is_sequential();
        let output = BlockOutput::new(
            results,
            scheduler.into_telemetry(),
            num_rounds,
            fell_back_to_sequential,
            write_set,
        );
        counters::ROUNDS_PER_BLOCK.observe(num_rounds as f64);
        info!(
            num_txns = num_txns,
            num_rounds = num_rounds,
            total_aborts = output.total_aborts(),
            sequential = sequential,
            num_writes = output.write_set().len(),
            "[OCC]: Block executed"
        );
        Ok(output)
    }

    /// Drives executions and validation sweeps until every transaction is validated. Workers
    /// run on the executor thread pool; this thread owns the scheduler and blocks on the
    /// completion channel.
    fn run_rounds<BS>(
        &self,
        block: &[T],
        executor: &E,
        base_view: &BS,
        versioned_data: &VersionedData<T::Key, T::Value>,
        last_input_output: &TxnInputOutput<T, E>,
        scheduler: &mut Scheduler,
    ) -> BlockExecutionResult<(), E::Error>
    where
        BS: TStateView<Key = T::Key, Value = T::Value>,
    {
        let (completion_tx, completion_rx) = unbounded::<Completion<E::Error>>();
        let mut first_error: Option<BlockExecutionError<E::Error>> = None;

        self.executor_thread_pool.in_place_scope(|s| loop {
            for (txn_idx, incarnation) in scheduler.next_executions() {
                let txn = &block[txn_idx as usize];
                let completion_tx = completion_tx.clone();
                s.spawn(move |_| {
                    // The controller must hear back even if the transaction panics.
                    let completion_tx = scopeguard::guard_on_unwind(completion_tx, |tx| {
                        let _ = tx.send(Completion {
                            txn_idx,
                            incarnation,
                            result: Err(code_invariant_error(format!(
                                "[OCC]: txn {} incarnation {} panicked",
                                txn_idx, incarnation
                            ))
                            .into()),
                        });
                    });
                    let result = Self::execute(
                        txn_idx,
                        incarnation,
                        txn,
                        executor,
                        base_view,
                        versioned_data,
                        last_input_output,
                    );
                    // Only fails if the controller is gone, in which case the block is over.
                    let _ = completion_tx.send(Completion {
                        txn_idx,
                        incarnation,
                        result,
                    });
                });
            }

            if scheduler.num_in_flight() > 0 {
                let completion = match completion_rx.recv() {
                    Ok(completion) => completion,
                    Err(err) => {
                        first_error.get_or_insert(
                            code_invariant_error(format!("[OCC]: Completion channel: {}", err))
                                .into(),
                        );
                        break;
                    },
                };
                let outcome = match completion.result {
                    Ok(None) => ExecutionOutcome::Executed,
                    Ok(Some(depends_on)) => ExecutionOutcome::SpeculativeAbort(depends_on),
                    Err(err) => {
                        // Stop dispatching, but wait for everything in flight.
                        first_error.get_or_insert(err);
                        ExecutionOutcome::Halted
                    },
                };
                if let Err(err) = scheduler.finish_execution(
                    completion.txn_idx,
                    completion.incarnation,
                    outcome,
                ) {
                    first_error.get_or_insert(err.into());
                    scheduler.halt();
                }
                continue;
            }

            if scheduler.is_halted() || scheduler.done() {
                break;
            }
            if let Err(err) = self.validation_sweep(scheduler, versioned_data, last_input_output)
            {
                first_error.get_or_insert(err.into());
                break;
            }
        });

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn validation_sweep(
        &self,
        scheduler: &mut Scheduler,
        versioned_data: &VersionedData<T::Key, T::Value>,
        last_input_output: &TxnInputOutput<T, E>,
    ) -> Result<(), PanicError> {
        let round = scheduler.round();
        let candidates = scheduler.start_validation()?;
        if candidates.is_empty() {
            return Err(code_invariant_error(format!(
                "[OCC]: Nothing to execute or validate in round {}",
                round
            )));
        }

        let validate = |&(txn_idx, incarnation): &(TxnIndex, Incarnation)| {
            (
                txn_idx,
                incarnation,
                Self::validate(txn_idx, versioned_data, last_input_output),
            )
        };
        let results: Vec<(TxnIndex, Incarnation, bool)> = if self.config.parallel_validation
            && !scheduler.is_sequential()
            && candidates.len() > 1
        {
            self.executor_thread_pool
                .install(|| candidates.par_iter().map(validate).collect())
        } else {
            candidates.iter().map(validate).collect()
        };

        for (txn_idx, incarnation) in scheduler.finish_validation(results)? {
            counters::VALIDATION_FAILURE_COUNT.inc();
            debug!(
                txn_idx = txn_idx,
                incarnation = incarnation,
                round = round,
                "[OCC]: Validation failed"
            );
            // Readers above see the failed incarnation's writes as estimates until the next
            // incarnation replaces them.
            if let Some(keys) = last_input_output.modified_keys(txn_idx) {
                for key in keys.iter() {
                    versioned_data.set_estimate(key.clone(), txn_idx, incarnation);
                }
            }
        }
        Ok(())
    }

    fn execute<BS>(
        txn_idx: TxnIndex,
        incarnation: Incarnation,
        txn: &T,
        executor: &E,
        base_view: &BS,
        versioned_data: &VersionedData<T::Key, T::Value>,
        last_input_output: &TxnInputOutput<T, E>,
    ) -> BlockExecutionResult<Option<TxnIndex>, E::Error>
    where
        BS: TStateView<Key = T::Key, Value = T::Value>,
    {
        let _timer = counters::TASK_EXECUTE_SECONDS.start_timer();

        let mut view = ExecutionView::new(txn_idx, incarnation, versioned_data, base_view);
        let status = executor.execute_transaction(&mut view, txn, txn_idx);
        let output = view.into_output();

        if let Some(msg) = output.storage_error {
            return Err(BlockExecutionError::StorageError(msg));
        }

        let prev_modified_keys = last_input_output.modified_keys(txn_idx);
        let speculative_abort = output.speculative_abort.or(match &status {
            Err(ViewError::Aborted { depends_on }) => Some(*depends_on),
            _ => None,
        });
        if let Some(depends_on) = speculative_abort {
            counters::SPECULATIVE_ABORT_COUNT.inc();
            // Everything the txn wrote before, or was about to write, becomes an estimate.
            let mut modified_keys: BTreeSet<T::Key> = prev_modified_keys
                .map(|keys| keys.as_ref().clone())
                .unwrap_or_default();
            modified_keys.extend(output.write_set.keys().cloned());
            for key in modified_keys.iter() {
                versioned_data.set_estimate(key.clone(), txn_idx, incarnation);
            }
            last_input_output.record(txn_idx, output.reads, None, modified_keys);
            return Ok(Some(depends_on));
        }

        let status = status.map_err(|err| {
            code_invariant_error(format!(
                "[OCC]: txn {} returned {:?} that its view did not raise",
                txn_idx, err
            ))
        })?;
        let write_set = match &status {
            ExecutionStatus::Success(_) => output.write_set,
            ExecutionStatus::Failure(_) => output.checkpointed,
            ExecutionStatus::Abort(_) => WriteSetMut::default(),
        };
        let modified_keys: BTreeSet<T::Key> = write_set.keys().cloned().collect();

        for (key, op) in write_set {
            versioned_data.set(key, txn_idx, incarnation, op);
        }
        if let Some(prev_keys) = prev_modified_keys {
            for key in prev_keys.iter() {
                if !modified_keys.contains(key) {
                    versioned_data.remove(key, txn_idx);
                }
            }
        }

        last_input_output.record(txn_idx, output.reads, Some(status), modified_keys);
        Ok(None)
    }

    fn validate(
        txn_idx: TxnIndex,
        versioned_data: &VersionedData<T::Key, T::Value>,
        last_input_output: &TxnInputOutput<T, E>,
    ) -> bool {
        let _timer = counters::TASK_VALIDATE_SECONDS.start_timer();
        last_input_output
            .read_set(txn_idx)
            .is_some_and(|reads| reads.validate(versioned_data, txn_idx))
    }
}
