// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block_output::{BlockOutput, TransactionResult},
    captured_reads::DataRead,
    config::BlockExecutorConfig,
    errors::{BlockExecutionError, BlockExecutionResult, ViewError},
    executor::BlockExecutor,
    proptest_types::{
        baseline::BaselineOutput,
        types::{MockDeclarer, MockOp, MockOutcome, MockOutput, MockTask, MockTransaction},
    },
    scheduler::{ExecutionOutcome, Scheduler, TaskStatus},
    view::{ExecutionView, TransactionView},
};
use anyhow::bail;
use claims::{assert_err, assert_matches, assert_none, assert_ok, assert_ok_eq, assert_some};
use occ_access_dag::{
    AccessDeclarer, DeclarationContext, DeclarationError, MessageAccesses, NoAccessHints,
    ResourceTree, ResourceType,
};
use occ_mvhashmap::MVHashMap;
use occ_types::{
    state_store::{InMemoryStateStore, StateViewResult, TStateStore, TStateView},
    write_set::{WriteOp, WriteSetMut},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use test_case::test_case;

type Key = Vec<u8>;
type Store = InMemoryStateStore<Key, u64>;
type Output = BlockExecutionResult<BlockOutput<Key, u64, MockOutput<Key>>, usize>;

fn key(name: &str) -> Key {
    name.as_bytes().to_vec()
}

fn config(concurrency_level: usize) -> BlockExecutorConfig {
    BlockExecutorConfig {
        concurrency_level: concurrency_level.min(num_cpus::get()),
        ..Default::default()
    }
}

fn run_block<D, S>(
    config: BlockExecutorConfig,
    declarer: D,
    txns: &[MockTransaction<Key>],
    store: &mut S,
    executions: Option<&'static AtomicUsize>,
) -> Output
where
    D: AccessDeclarer<MockTransaction<Key>>,
    S: TStateStore<Key = Key, Value = u64>,
{
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()
            .unwrap(),
    );
    BlockExecutor::<MockTransaction<Key>, MockTask<Key>, D>::new(config, pool, declarer)
        .unwrap()
        .execute_block(executions, txns, store)
}

/// Runs the block and checks it against sequential execution.
fn run_and_compare<D>(
    config: BlockExecutorConfig,
    declarer: D,
    txns: &[MockTransaction<Key>],
    initial_state: BTreeMap<Key, u64>,
) -> (Output, Store)
where
    D: AccessDeclarer<MockTransaction<Key>>,
{
    let baseline = BaselineOutput::generate(&initial_state, txns);
    let mut store: Store = initial_state.into_iter().collect();
    let output = run_block(config, declarer, txns, &mut store, None);
    baseline.assert_output(&output, &store);
    (output, store)
}

/// Every txn reads the counter and writes it back incremented.
fn counter_chain(len: usize) -> Vec<MockTransaction<Key>> {
    (0..len)
        .map(|_| {
            MockTransaction::success(vec![
                MockOp::Read(key("counter")),
                MockOp::Write(key("counter"), 1),
            ])
        })
        .collect()
}

#[test]
fn empty_block() {
    let mut store = Store::new();
    let output = assert_ok!(run_block(config(4), NoAccessHints, &[], &mut store, None));
    assert!(output.results().is_empty());
    assert_eq!(output.num_rounds(), 0);
    assert!(store.is_empty());
}

#[test]
fn disjoint_writes() {
    let txns = vec![
        MockTransaction::success(vec![MockOp::Write(key("a"), 1)]),
        MockTransaction::success(vec![MockOp::Write(key("b"), 2)]),
    ];
    let (output, store) = run_and_compare(config(4), NoAccessHints, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    assert_eq!(output.total_aborts(), 0);
    for telemetry in output.telemetry() {
        assert_eq!(telemetry.incarnations, 1);
        assert_eq!(telemetry.validation_failures, 0);
    }
    assert_eq!(store.get(&key("a")), Some(&1));
    assert_eq!(store.get(&key("b")), Some(&2));
    assert_eq!(output.write_set().len(), 2);
}

#[test_case(MockDeclarer::Misleading ; "with misleading hints")]
#[test_case(MockDeclarer::Precise ; "with precise hints")]
fn read_after_write(declarer: MockDeclarer) {
    let txns = vec![
        MockTransaction::success(vec![MockOp::Write(key("x"), 5)]),
        MockTransaction::success(vec![MockOp::Read(key("x")), MockOp::Write(key("y"), 1)]),
    ];
    let (output, store) = run_and_compare(config(4), declarer, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    assert_eq!(store.get(&key("y")), Some(&6));
    assert_eq!(
        output.results()[1],
        TransactionResult::Success(MockOutput {
            reads: vec![(key("x"), Some(5))],
            scans: vec![],
        })
    );
}

#[test]
fn precise_hints_serialize_conflicts() {
    let txns = counter_chain(8);
    let (output, store) =
        run_and_compare(config(4), MockDeclarer::Precise, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    assert_eq!(store.get(&key("counter")), Some(&8));
    // Every txn waits for the previous one to be validated, so no work is wasted.
    assert_eq!(output.total_aborts(), 0);
    for telemetry in output.telemetry() {
        assert_eq!(telemetry.validation_failures, 0);
    }
}

#[test_case(true ; "with checkpoint")]
#[test_case(false ; "without checkpoint")]
fn logical_failure_discards_uncheckpointed_writes(checkpoint: bool) {
    let mut ops = vec![MockOp::Write(key("fee"), 1)];
    if checkpoint {
        ops.push(MockOp::Checkpoint);
    }
    ops.push(MockOp::Write(key("payload"), 2));
    let txns = vec![
        MockTransaction::new(ops, MockOutcome::Failure),
        MockTransaction::success(vec![
            MockOp::Read(key("fee")),
            MockOp::Read(key("payload")),
        ]),
    ];
    let (output, store) = run_and_compare(config(4), NoAccessHints, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    assert!(!output.results()[0].is_success());
    assert_eq!(store.get(&key("payload")), None);
    let expected_fee = if checkpoint { Some(1) } else { None };
    assert_eq!(store.get(&key("fee")).copied(), expected_fee);
    assert_eq!(
        output.results()[1].output().reads,
        vec![(key("fee"), expected_fee), (key("payload"), None)]
    );
}

#[test]
fn unknown_on_any_serializes_later_txns() {
    let txns: Vec<_> = (0..6)
        .map(|i| MockTransaction::success(vec![MockOp::Write(key(&i.to_string()), i)]))
        .collect();
    let config = config(4);
    let parallel = config.concurrency_level > 1;
    let (output, _) = run_and_compare(
        config,
        MockDeclarer::Conservative(BTreeSet::from([2])),
        &txns,
        BTreeMap::new(),
    );
    let output = assert_ok!(output);

    let telemetry = output.telemetry();
    let conservative_round = assert_some!(telemetry[2].validated_round);
    for txn_idx in 0..2 {
        assert!(assert_some!(telemetry[txn_idx].validated_round) < conservative_round);
    }
    for txn_idx in 3..6 {
        assert!(assert_some!(telemetry[txn_idx].validated_round) > conservative_round);
        if parallel {
            assert!(telemetry[txn_idx].waited_on.contains(&2));
        }
    }
}

struct CyclicTreeDeclarer;

impl<T> AccessDeclarer<T> for CyclicTreeDeclarer {
    fn resource_tree(&self) -> ResourceTree {
        ResourceTree::new()
            .with_parent(ResourceType::new("coin"), ResourceType::new("account"))
            .with_parent(ResourceType::new("account"), ResourceType::new("coin"))
    }

    fn declare_access(
        &self,
        _txn: &T,
        _ctx: &mut DeclarationContext,
    ) -> Result<MessageAccesses, DeclarationError> {
        Ok(vec![])
    }
}

#[test]
fn cyclic_resource_tree_rejects_block_before_execution() {
    static EXECUTIONS: AtomicUsize = AtomicUsize::new(0);

    let mut store: Store = vec![(key("a"), 1)].into_iter().collect();
    let txns = vec![MockTransaction::success(vec![MockOp::Write(key("a"), 2)])];
    let err = assert_err!(run_block(
        config(4),
        CyclicTreeDeclarer,
        &txns,
        &mut store,
        Some(&EXECUTIONS)
    ));

    assert_matches!(err, BlockExecutionError::CyclicDependency(_));
    assert_eq!(EXECUTIONS.load(Ordering::SeqCst), 0);
    assert_eq!(store.get(&key("a")), Some(&1));
}

#[test]
fn fatal_error_rejects_block() {
    let txns = vec![
        MockTransaction::success(vec![MockOp::Write(key("a"), 1)]),
        MockTransaction::new(vec![MockOp::Read(key("a"))], MockOutcome::Abort(7)),
        MockTransaction::success(vec![MockOp::Write(key("b"), 1)]),
    ];
    let (output, store) = run_and_compare(config(4), NoAccessHints, &txns, BTreeMap::new());

    assert_eq!(assert_err!(output), BlockExecutionError::FatalVMError(7));
    assert!(store.is_empty());
}

struct FailingStore {
    inner: Store,
    failing_key: Key,
    applied: bool,
}

impl TStateView for FailingStore {
    type Key = Key;
    type Value = u64;

    fn get_state_value(&self, key: &Key) -> StateViewResult<Option<u64>> {
        if *key == self.failing_key {
            bail!("disk failure");
        }
        self.inner.get_state_value(key)
    }

    fn scan(&self, start: Bound<&Key>, end: Bound<&Key>) -> StateViewResult<Vec<(Key, u64)>> {
        self.inner.scan(start, end)
    }
}

impl TStateStore for FailingStore {
    fn apply_write_set(&mut self, write_set: WriteSetMut<Key, u64>) -> StateViewResult<()> {
        self.applied = true;
        self.inner.apply_write_set(write_set)
    }
}

#[test]
fn storage_error_is_fatal() {
    let mut store = FailingStore {
        inner: vec![(key("a"), 1)].into_iter().collect(),
        failing_key: key("bad"),
        applied: false,
    };
    let txns = vec![
        MockTransaction::success(vec![MockOp::Read(key("a")), MockOp::Write(key("b"), 1)]),
        MockTransaction::success(vec![MockOp::Read(key("bad"))]),
    ];
    let err = assert_err!(run_block(config(4), NoAccessHints, &txns, &mut store, None));

    assert_matches!(err, BlockExecutionError::StorageError(msg) if msg.contains("disk failure"));
    assert!(!store.applied);
}

#[test]
fn low_max_incarnation_falls_back_to_sequential() {
    let txns = counter_chain(16);
    let config = BlockExecutorConfig {
        max_incarnation: 1,
        use_dependency_hints: false,
        ..config(4)
    };
    let (output, store) = run_and_compare(config, MockDeclarer::Precise, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    assert_eq!(store.get(&key("counter")), Some(&16));
    let reexecuted = output
        .telemetry()
        .iter()
        .any(|telemetry| telemetry.incarnations > 1);
    assert_eq!(output.fell_back_to_sequential(), reexecuted);
}

#[test]
fn concurrency_level_one_is_sequential() {
    let txns = counter_chain(5);
    let (output, store) = run_and_compare(
        BlockExecutorConfig::sequential(),
        NoAccessHints,
        &txns,
        vec![(key("counter"), 10)].into_iter().collect(),
    );
    let output = assert_ok!(output);

    assert_eq!(store.get(&key("counter")), Some(&15));
    assert_eq!(output.num_rounds(), 5);
    assert!(!output.fell_back_to_sequential());
    for (txn_idx, telemetry) in output.telemetry().iter().enumerate() {
        assert_eq!(telemetry.incarnations, 1);
        assert_eq!(telemetry.aborts, 0);
        assert_eq!(telemetry.validated_round, Some(txn_idx + 1));
    }
}

#[test]
fn scans_observe_lower_writes_and_deletions() {
    let initial_state: BTreeMap<_, _> = vec![(key("a"), 1), (key("c"), 3), (key("e"), 5)]
        .into_iter()
        .collect();
    let txns = vec![
        MockTransaction::success(vec![MockOp::Write(key("b"), 2), MockOp::Delete(key("c"))]),
        MockTransaction::success(vec![
            MockOp::Scan(key("a"), key("d")),
            MockOp::Write(key("sum"), 0),
        ]),
        MockTransaction::success(vec![MockOp::Delete(key("a"))]),
    ];
    let (output, store) = run_and_compare(config(4), NoAccessHints, &txns, initial_state);
    let output = assert_ok!(output);

    assert_eq!(
        output.results()[1].output().scans,
        vec![vec![(key("a"), 1), (key("b"), 2)]]
    );
    // Checksum of the scan: two keys plus their values.
    assert_eq!(store.get(&key("sum")), Some(&5));
    assert_none!(store.get(&key("a")));
    assert_none!(store.get(&key("c")));
}

///////////////////////////////////////////////////////////////////////////
// Execution view
///////////////////////////////////////////////////////////////////////////

#[test]
fn read_of_estimate_aborts() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("x"), 1)].into_iter().collect();
    map.data()
        .set(key("x"), 0, 0, WriteOp::Modification(5));
    map.data().set_estimate(key("x"), 0, 0);

    let mut view = ExecutionView::new(1, 0, map.data(), &store);
    assert_eq!(
        view.get(&key("x")),
        Err(ViewError::Aborted { depends_on: 0 })
    );
    assert_eq!(view.speculative_abort(), Some(0));
    assert_eq!(view.captured_reads().num_reads(), 0);

    // Lower positions never see the entry.
    let mut view = ExecutionView::new(0, 1, map.data(), &store);
    assert_ok_eq!(view.get(&key("x")), Some(1));
    assert_none!(view.speculative_abort());
}

#[test]
fn view_reads_own_writes_first() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("x"), 1), (key("y"), 2)].into_iter().collect();
    map.data()
        .set(key("x"), 0, 3, WriteOp::Modification(10));

    let mut view = ExecutionView::new(2, 0, map.data(), &store);
    assert_ok_eq!(view.get(&key("x")), Some(10));
    assert_matches!(
        view.captured_reads().get(&key("x")),
        Some(DataRead::Versioned((0, 3), _))
    );
    assert_ok_eq!(view.get(&key("y")), Some(2));
    assert_matches!(
        view.captured_reads().get(&key("y")),
        Some(DataRead::Storage(Some(2)))
    );

    view.set(key("x"), 11);
    view.delete(key("y"));
    assert_ok_eq!(view.get(&key("x")), Some(11));
    assert_ok_eq!(view.get(&key("y")), None);
    assert_eq!(view.write_set().len(), 2);
    // Own writes are not reads.
    assert_eq!(view.captured_reads().num_reads(), 2);
}

#[test]
fn validation_detects_changed_reads() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("x"), 1)].into_iter().collect();
    map.data()
        .set(key("x"), 0, 0, WriteOp::Modification(5));

    let mut view = ExecutionView::new(2, 0, map.data(), &store);
    assert_ok_eq!(view.get(&key("x")), Some(5));
    assert_ok_eq!(view.get(&key("z")), None);
    assert!(view.captured_reads().validate(map.data(), 2));

    // Same value, new incarnation: the version no longer matches.
    map.data()
        .set(key("x"), 0, 1, WriteOp::Modification(5));
    assert!(!view.captured_reads().validate(map.data(), 2));

    let mut view = ExecutionView::new(2, 0, map.data(), &store);
    assert_ok!(view.get(&key("z")));
    assert!(view.captured_reads().validate(map.data(), 2));
    // A lower txn now writes a key that was read from storage.
    map.data()
        .set(key("z"), 1, 0, WriteOp::Deletion);
    assert!(!view.captured_reads().validate(map.data(), 2));
    // Higher txns do not matter.
    let mut view = ExecutionView::new(1, 0, map.data(), &store);
    assert_ok!(view.get(&key("z")));
    map.data()
        .set(key("z"), 3, 0, WriteOp::Modification(1));
    assert!(view.captured_reads().validate(map.data(), 1));
}

#[test]
fn validation_detects_phantoms() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("a"), 1), (key("k"), 2), (key("z"), 3)]
        .into_iter()
        .collect();

    let mut view = ExecutionView::new(3, 0, map.data(), &store);
    let scanned = assert_ok!(view.iterate(Bound::Included(&key("a")), Bound::Excluded(&key("z"))));
    assert_eq!(scanned, vec![(key("a"), 1), (key("k"), 2)]);
    assert_eq!(view.captured_reads().iterations().len(), 1);
    let reads = view.into_output().reads;
    assert!(reads.validate(map.data(), 3));

    // Writes outside the range or above the scanning txn do not matter.
    map.data()
        .set(key("z"), 1, 0, WriteOp::Modification(9));
    map.data()
        .set(key("m"), 4, 0, WriteOp::Modification(9));
    assert!(reads.validate(map.data(), 3));

    // A key inserted in the range by a lower txn is a phantom.
    map.data()
        .set(key("m"), 2, 0, WriteOp::Modification(9));
    assert!(!reads.validate(map.data(), 3));
    map.data().remove(&key("m"), 2);
    assert!(reads.validate(map.data(), 3));

    // So is a deletion of a scanned key.
    map.data().set(key("k"), 0, 0, WriteOp::Deletion);
    assert!(!reads.validate(map.data(), 3));
}

#[test]
fn iterate_overlays_own_writes() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("a"), 1), (key("b"), 2)].into_iter().collect();
    map.data()
        .set(key("c"), 0, 0, WriteOp::Modification(3));

    let mut view = ExecutionView::new(1, 0, map.data(), &store);
    view.delete(key("a"));
    view.set(key("d"), 4);
    assert_ok_eq!(
        view.iterate(Bound::Unbounded, Bound::Unbounded),
        vec![(key("b"), 2), (key("c"), 3), (key("d"), 4)]
    );
    // Inverted ranges are empty.
    let scanned = assert_ok!(view.iterate(Bound::Included(&key("c")), Bound::Excluded(&key("a"))));
    assert!(scanned.is_empty());

    map.data().set_estimate(key("b"), 0, 1);
    let mut view = ExecutionView::new(1, 0, map.data(), &store);
    assert_eq!(
        view.iterate(Bound::Unbounded, Bound::Unbounded),
        Err(ViewError::Aborted { depends_on: 0 })
    );
}

#[test]
fn iterate_agrees_with_earlier_point_reads() {
    let map = MVHashMap::<Key, u64>::new();
    let store: Store = vec![(key("k"), 1), (key("m"), 2)].into_iter().collect();

    let mut view = ExecutionView::new(1, 0, map.data(), &store);
    assert_ok_eq!(view.get(&key("k")), Some(1));
    // A lower transaction deletes the key after it was read.
    map.data().set(key("k"), 0, 0, WriteOp::Deletion);
    assert_ok_eq!(
        view.iterate(Bound::Unbounded, Bound::Unbounded),
        vec![(key("k"), 1), (key("m"), 2)]
    );
    assert_ok_eq!(view.get(&key("k")), Some(1));
    // The incarnation is stale and fails validation.
    assert!(!view.captured_reads().validate(map.data(), 1));

    // The same holds for an earlier read that saw nothing and a key that appears later.
    let mut view = ExecutionView::new(2, 0, map.data(), &store);
    assert_none!(assert_ok!(view.get(&key("l"))));
    map.data().set(key("l"), 1, 0, WriteOp::Modification(7));
    assert_ok_eq!(
        view.iterate(Bound::Included(&key("k")), Bound::Unbounded),
        vec![(key("m"), 2)]
    );
    assert!(!view.captured_reads().validate(map.data(), 2));
}

#[test]
fn leaked_estimate_is_reported_as_distinct_error() {
    let map = MVHashMap::<Key, u64>::new();
    map.data().set(key("a"), 0, 0, WriteOp::Modification(1));
    map.data().set_estimate(key("a"), 1, 0);

    let mut store = Store::default();
    let err = assert_err!(map.data().flush_committed(&mut store));
    assert_matches!(
        BlockExecutionError::<usize>::from(err),
        BlockExecutionError::EstimateLeakedToCommit { txn_idx: 1, .. }
    );
    assert_none!(assert_ok!(store.get_state_value(&key("a"))));
}

///////////////////////////////////////////////////////////////////////////
// Scheduler
///////////////////////////////////////////////////////////////////////////

#[test]
fn scheduler_waits_for_declared_dependencies() {
    let dependencies = vec![BTreeSet::new(), BTreeSet::from([0]), BTreeSet::new()];
    let mut scheduler = Scheduler::new(3, dependencies, 4, 10);

    assert_eq!(scheduler.next_executions(), vec![(0, 0), (2, 0)]);
    assert_eq!(scheduler.telemetry(1).waited_on, BTreeSet::from([0]));
    assert_eq!(scheduler.status(1), TaskStatus::Pending(0));

    assert_ok!(scheduler.finish_execution(0, 0, ExecutionOutcome::Executed));
    assert_ok!(scheduler.finish_execution(2, 0, ExecutionOutcome::Executed));
    // Executed is not enough.
    assert!(scheduler.next_executions().is_empty());

    assert_eq!(assert_ok!(scheduler.start_validation()), vec![(0, 0), (2, 0)]);
    let failed = assert_ok!(scheduler.finish_validation(vec![(2, 0, true), (0, 0, true)]));
    assert!(failed.is_empty());
    assert_eq!(scheduler.round(), 2);
    assert_eq!(scheduler.next_executions(), vec![(1, 0)]);
    assert_eq!(scheduler.telemetry(1).first_executed_round, Some(2));
}

#[test]
fn scheduler_redispatches_after_estimate_writer_finishes() {
    let mut scheduler = Scheduler::new(3, vec![], 4, 10);
    assert_eq!(scheduler.next_executions(), vec![(0, 0), (1, 0), (2, 0)]);

    assert_ok!(scheduler.finish_execution(2, 0, ExecutionOutcome::SpeculativeAbort(0)));
    assert_eq!(scheduler.status(2), TaskStatus::Aborted(0));
    assert!(scheduler.next_executions().is_empty());

    assert_ok!(scheduler.finish_execution(0, 0, ExecutionOutcome::Executed));
    assert_eq!(scheduler.next_executions(), vec![(2, 1)]);
    assert_ok!(scheduler.finish_execution(1, 0, ExecutionOutcome::Executed));
    assert_ok!(scheduler.finish_execution(2, 1, ExecutionOutcome::Executed));

    let telemetry = scheduler.telemetry(2);
    assert_eq!(telemetry.incarnations, 2);
    assert_eq!(telemetry.aborts, 1);
    assert_eq!(telemetry.waited_on, BTreeSet::from([0]));
}

#[test]
fn scheduler_revalidates_above_reexecuted_txn() {
    let mut scheduler = Scheduler::new(3, vec![], 4, 10);
    for (txn_idx, incarnation) in scheduler.next_executions() {
        assert_ok!(scheduler.finish_execution(txn_idx, incarnation, ExecutionOutcome::Executed));
    }
    let candidates = assert_ok!(scheduler.start_validation());
    assert_eq!(candidates.len(), 3);
    let failed = assert_ok!(scheduler.finish_validation(vec![
        (0, 0, true),
        (1, 0, false),
        (2, 0, true),
    ]));
    assert_eq!(failed, vec![(1, 0)]);
    assert_eq!(scheduler.status(1), TaskStatus::Pending(1));
    assert!(!scheduler.done());

    assert_eq!(scheduler.next_executions(), vec![(1, 1)]);
    assert_ok!(scheduler.finish_execution(1, 1, ExecutionOutcome::Executed));
    // Txn 0 stays validated, txn 2 is validated again.
    assert_eq!(assert_ok!(scheduler.start_validation()), vec![(1, 1), (2, 0)]);
    assert_ok!(scheduler.finish_validation(vec![(1, 1, true), (2, 0, true)]));
    assert!(scheduler.done());
    assert_eq!(scheduler.num_rounds(), 2);
    assert_eq!(scheduler.telemetry(2).validated_round, Some(1));
    assert_eq!(scheduler.telemetry(1).validated_round, Some(2));
    assert_eq!(scheduler.telemetry(1).validation_failures, 1);
}

#[test]
fn scheduler_falls_back_to_sequential() {
    let mut scheduler = Scheduler::new(3, vec![], 4, 1);
    assert_eq!(scheduler.next_executions().len(), 3);
    assert_ok!(scheduler.finish_execution(1, 0, ExecutionOutcome::SpeculativeAbort(0)));
    assert!(scheduler.is_sequential());
    assert!(scheduler.fell_back_to_sequential());

    // Nothing is dispatched while anything is in flight.
    assert!(scheduler.next_executions().is_empty());
    assert_ok!(scheduler.finish_execution(0, 0, ExecutionOutcome::Executed));
    assert_ok!(scheduler.finish_execution(2, 0, ExecutionOutcome::Executed));
    // The lowest unvalidated txn is executed, not validated, so it waits for a sweep.
    assert!(scheduler.next_executions().is_empty());
    assert_ok!(scheduler.start_validation());
    assert_ok!(scheduler.finish_validation(vec![(0, 0, true), (2, 0, true)]));
    assert_eq!(scheduler.next_executions(), vec![(1, 1)]);
    assert!(scheduler.next_executions().is_empty());
}

#[test]
fn scheduler_rejects_unexpected_transitions() {
    let mut scheduler = Scheduler::new(2, vec![], 4, 10);
    assert_err!(scheduler.finish_execution(0, 0, ExecutionOutcome::Executed));
    assert_eq!(scheduler.next_executions().len(), 2);
    assert_err!(scheduler.finish_execution(0, 1, ExecutionOutcome::Executed));
    assert_err!(scheduler.start_validation());
    assert_err!(scheduler.finish_execution(0, 0, ExecutionOutcome::SpeculativeAbort(1)));
}

#[test]
fn halted_scheduler_dispatches_nothing() {
    let mut scheduler = Scheduler::new(2, vec![], 4, 10);
    assert_eq!(scheduler.next_executions(), vec![(0, 0), (1, 0)]);
    assert_ok!(scheduler.finish_execution(0, 0, ExecutionOutcome::Halted));
    assert!(scheduler.is_halted());
    assert_eq!(scheduler.num_in_flight(), 1);
    assert!(scheduler.next_executions().is_empty());
}

#[test]
fn telemetry_reports_reexecutions() {
    let txns = counter_chain(12);
    let (output, _) = run_and_compare(config(4), NoAccessHints, &txns, BTreeMap::new());
    let output = assert_ok!(output);

    for telemetry in output.telemetry() {
        assert_eq!(
            telemetry.incarnations,
            1 + telemetry.aborts + telemetry.validation_failures
        );
        assert_some!(telemetry.first_executed_round);
        assert_some!(telemetry.validated_round);
    }
    assert!(output.num_rounds() >= 1);
}
