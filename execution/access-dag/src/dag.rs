// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    access_op::AccessOperation,
    conflicting_txn_tracker::ConflictingTxnTracker,
    declaration::{declare_block, AccessDeclarer, BlockDeclarations},
    errors::DagError,
    resource_tree::ResolvedResourceTree,
};
use itertools::Itertools;
use occ_types::TxnIndex;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, error};

pub type NodeIndex = usize;

/// One declared access operation of one message of one transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DagNode {
    pub txn_idx: TxnIndex,
    pub message_idx: usize,
    pub op: AccessOperation,
}

/// Dependency graph over the declared accesses of a block.
///
/// Every node has an edge to the previous node of the same transaction. A node that conflicts
/// with an access of an earlier transaction has an edge to that transaction's final commit
/// node. Edges thus always point to earlier nodes, and the graph is acyclic as long as nodes
/// are only added through [`DependencyDag::build`]; the explicit check after construction
/// guards against the ordering assumption being broken.
#[derive(Clone, Debug, Default)]
pub struct DependencyDag {
    nodes: Vec<DagNode>,
    /// For each node, the nodes it depends on.
    edges: Vec<Vec<NodeIndex>>,
    /// For each txn, its last commit node (None if it declared no messages).
    commit_nodes: Vec<Option<NodeIndex>>,
    dependencies: Vec<BTreeSet<TxnIndex>>,
    conservative_txns: Vec<TxnIndex>,
    declaration_fallbacks: Vec<TxnIndex>,
}

impl DependencyDag {
    pub fn build(
        declarations: BlockDeclarations,
        tree: &ResolvedResourceTree,
    ) -> Result<Self, DagError> {
        let BlockDeclarations {
            accesses,
            fallbacks,
        } = declarations;
        let mut dag = DependencyDag {
            declaration_fallbacks: fallbacks,
            ..Default::default()
        };
        let mut trackers: Vec<ConflictingTxnTracker> = Vec::new();

        for (idx, messages) in accesses.into_iter().enumerate() {
            let txn_idx = idx as TxnIndex;
            let mut deps = BTreeSet::new();
            let mut prev_node = None;
            let mut conservative = false;
            let mut declared_access = false;

            for (message_idx, ops) in messages.into_iter().enumerate() {
                for op in ops {
                    let conflicts: BTreeSet<TxnIndex> = if op.is_commit() {
                        BTreeSet::new()
                    } else {
                        trackers
                            .iter()
                            .filter(|tracker| tree.overlaps(&tracker.resource_type, &op.resource_type))
                            .flat_map(|tracker| {
                                tracker.conflicting_txns(txn_idx, op.access_type, &op.key_template)
                            })
                            .collect()
                    };
                    conservative |= op.is_unknown_on_any();
                    declared_access |= !op.is_commit();
                    if !op.is_commit() {
                        match trackers
                            .iter_mut()
                            .find(|tracker| tracker.resource_type == op.resource_type)
                        {
                            Some(tracker) => tracker.add_candidate(
                                txn_idx,
                                op.access_type,
                                op.key_template.clone(),
                            ),
                            None => {
                                let mut tracker = ConflictingTxnTracker::new(op.resource_type.clone());
                                tracker.add_candidate(txn_idx, op.access_type, op.key_template.clone());
                                trackers.push(tracker);
                            },
                        }
                    }

                    let node = dag.add_node(DagNode {
                        txn_idx,
                        message_idx,
                        op,
                    });
                    if let Some(prev) = prev_node {
                        dag.add_edge(node, prev);
                    }
                    prev_node = Some(node);
                    for dep in conflicts {
                        if let Some(Some(commit)) = dag.commit_nodes.get(dep as usize) {
                            let commit = *commit;
                            dag.add_edge(node, commit);
                        }
                        deps.insert(dep);
                    }
                }
            }

            // A txn that declared no access (at most commit markers) still orders after every
            // earlier "unknown on any" declaration.
            if !declared_access {
                for dep in dag.conservative_txns.clone() {
                    if let (Some(node), Some(Some(commit))) =
                        (prev_node, dag.commit_nodes.get(dep as usize))
                    {
                        let commit = *commit;
                        dag.add_edge(node, commit);
                    }
                    deps.insert(dep);
                }
            }
            if conservative {
                dag.conservative_txns.push(txn_idx);
            }
            dag.commit_nodes.push(prev_node);
            dag.dependencies.push(deps);
        }

        dag.check_acyclic()?;
        debug!(
            num_txns = dag.num_txns(),
            num_nodes = dag.num_nodes(),
            num_edges = dag.num_edges(),
            "[OCC]: Built dependency graph"
        );
        Ok(dag)
    }

    fn add_node(&mut self, node: DagNode) -> NodeIndex {
        self.nodes.push(node);
        self.edges.push(Vec::new());
        self.nodes.len() - 1
    }

    pub(crate) fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.edges[from].push(to);
    }

    /// Kahn's algorithm over the node graph.
    pub(crate) fn check_acyclic(&self) -> Result<(), DagError> {
        let mut remaining_deps: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.nodes.len()];
        for (node, deps) in self.edges.iter().enumerate() {
            for dep in deps {
                dependents[*dep].push(node);
            }
        }

        let mut ready: VecDeque<NodeIndex> = remaining_deps
            .iter()
            .positions(|count| *count == 0)
            .collect();
        let mut visited = 0;
        while let Some(node) = ready.pop_front() {
            visited += 1;
            for dependent in &dependents[node] {
                remaining_deps[*dependent] -= 1;
                if remaining_deps[*dependent] == 0 {
                    ready.push_back(*dependent);
                }
            }
        }

        if visited == self.nodes.len() {
            return Ok(());
        }
        let txns = remaining_deps
            .iter()
            .positions(|count| *count > 0)
            .map(|node| self.nodes[node].txn_idx)
            .dedup()
            .join(", ");
        error!("[OCC]: Dependency graph has a cycle through txns {}", txns);
        Err(DagError::CyclicDependency(format!(
            "dependency graph has a cycle through txns {}",
            txns
        )))
    }

    pub fn num_txns(&self) -> usize {
        self.dependencies.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    pub fn nodes(&self) -> &[DagNode] {
        &self.nodes
    }

    /// Earlier txns that `txn_idx` must not be validated before.
    pub fn dependencies(&self, txn_idx: TxnIndex) -> Option<&BTreeSet<TxnIndex>> {
        self.dependencies.get(txn_idx as usize)
    }

    pub fn all_dependencies(&self) -> &[BTreeSet<TxnIndex>] {
        &self.dependencies
    }

    /// Txns that declared an unknown access on any resource.
    pub fn conservative_txns(&self) -> &[TxnIndex] {
        &self.conservative_txns
    }

    /// Txns whose declaration was replaced by the conservative one.
    pub fn declaration_fallbacks(&self) -> &[TxnIndex] {
        &self.declaration_fallbacks
    }
}

/// Declares the accesses of every txn with `declarer` and builds the dependency graph.
pub fn build_dependency_dag<T, D>(declarer: &D, txns: &[T]) -> Result<DependencyDag, DagError>
where
    D: AccessDeclarer<T> + ?Sized,
{
    let tree = declarer.resource_tree().resolve()?;
    DependencyDag::build(declare_block(declarer, txns), &tree)
}
