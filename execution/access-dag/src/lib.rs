// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Scheduling hints for optimistic block execution.
//!
//! Every transaction of a block declares, per message, the resources it reads and writes. The
//! declarations are turned into a [`DependencyDag`] whose per-txn dependency sets tell the
//! scheduler which earlier transactions are likely to conflict. The hints never decide
//! correctness: validation does.

#![forbid(unsafe_code)]

pub mod access_op;
mod conflicting_txn_tracker;
pub mod dag;
pub mod declaration;
pub mod errors;
pub mod resource_tree;


pub use access_op::{AccessOperation, AccessType, KeyTemplate, ResourceType};
pub use dag::{build_dependency_dag, DagNode, DependencyDag, NodeIndex};
pub use declaration::{
    declare_block, validate_declaration, AccessDeclarer, BlockDeclarations, DeclarationContext,
    MessageAccesses, NoAccessHints,
};
pub use errors::{DagError, DeclarationError};
pub use resource_tree::{ResolvedResourceTree, ResourceTree};
