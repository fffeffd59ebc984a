// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    access_op::AccessOperation, errors::DeclarationError, resource_tree::ResourceTree,
};
use occ_types::TxnIndex;
use tracing::warn;

/// Upper bound on how deeply messages may wrap other messages while being declared.
pub const MAX_DECLARATION_DEPTH: usize = 16;

/// Per message, the ordered access operations it declares. Each list ends with one
/// [`AccessType::Commit`](crate::access_op::AccessType::Commit).
pub type MessageAccesses = Vec<Vec<AccessOperation>>;

/// Supplied by the application: states which resources each transaction touches. Must be
/// pure; it is called once per transaction before anything executes.
pub trait AccessDeclarer<T>: Sync {
    /// The resource hierarchy the declarations refer to.
    fn resource_tree(&self) -> ResourceTree {
        ResourceTree::default()
    }

    fn declare_access(
        &self,
        txn: &T,
        ctx: &mut DeclarationContext,
    ) -> Result<MessageAccesses, DeclarationError>;
}

/// Declares nothing for any transaction: no scheduling hints, validation alone orders the
/// block.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAccessHints;

impl<T> AccessDeclarer<T> for NoAccessHints {
    fn declare_access(
        &self,
        _txn: &T,
        _ctx: &mut DeclarationContext,
    ) -> Result<MessageAccesses, DeclarationError> {
        Ok(vec![])
    }
}

/// Tracks the messages currently being declared so that self-referential declarations
/// terminate instead of recursing.
#[derive(Debug)]
pub struct DeclarationContext {
    txn_idx: TxnIndex,
    stack: Vec<String>,
    max_depth: usize,
}

impl DeclarationContext {
    pub fn new(txn_idx: TxnIndex) -> Self {
        Self::with_max_depth(txn_idx, MAX_DECLARATION_DEPTH)
    }

    pub fn with_max_depth(txn_idx: TxnIndex, max_depth: usize) -> Self {
        Self {
            txn_idx,
            stack: Vec::new(),
            max_depth,
        }
    }

    pub fn txn_idx(&self) -> TxnIndex {
        self.txn_idx
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Runs `declare` for the message identified by `message_id`, nested in the messages
    /// currently being declared.
    pub fn nested<R>(
        &mut self,
        message_id: &str,
        declare: impl FnOnce(&mut Self) -> Result<R, DeclarationError>,
    ) -> Result<R, DeclarationError> {
        if self.stack.iter().any(|id| id == message_id) {
            return Err(DeclarationError::Circular {
                txn_idx: self.txn_idx,
                message: message_id.to_string(),
            });
        }
        if self.stack.len() >= self.max_depth {
            return Err(DeclarationError::TooDeep {
                txn_idx: self.txn_idx,
                max_depth: self.max_depth,
            });
        }

        self.stack.push(message_id.to_string());
        let ret = declare(self);
        self.stack.pop();
        ret
    }
}

/// Checks that every message list is non-empty and ends with its only commit marker.
pub fn validate_declaration(
    txn_idx: TxnIndex,
    messages: &[Vec<AccessOperation>],
) -> Result<(), DeclarationError> {
    for (message_idx, ops) in messages.iter().enumerate() {
        let invalid = |reason: &str| DeclarationError::Invalid {
            txn_idx,
            reason: format!("message {}: {}", message_idx, reason),
        };
        match ops.last() {
            None => return Err(invalid("empty access list")),
            Some(last) if !last.is_commit() => {
                return Err(invalid("access list does not end with a commit"))
            },
            Some(_) => {},
        }
        if ops.iter().filter(|op| op.is_commit()).count() != 1 {
            return Err(invalid("more than one commit"));
        }
    }
    Ok(())
}

/// Result of declaring every transaction of a block.
#[derive(Clone, Debug, Default)]
pub struct BlockDeclarations {
    pub accesses: Vec<MessageAccesses>,
    /// Transactions whose declaration failed and was replaced by the conservative one.
    pub fallbacks: Vec<TxnIndex>,
}

/// Calls the declarer for every transaction, replacing failed or malformed declarations with
/// [`AccessOperation::conservative`].
pub fn declare_block<T, D>(declarer: &D, txns: &[T]) -> BlockDeclarations
where
    D: AccessDeclarer<T> + ?Sized,
{
    let mut declarations = BlockDeclarations {
        accesses: Vec::with_capacity(txns.len()),
        fallbacks: Vec::new(),
    };

    for (idx, txn) in txns.iter().enumerate() {
        let txn_idx = idx as TxnIndex;
        let mut ctx = DeclarationContext::new(txn_idx);
        let declared = declarer
            .declare_access(txn, &mut ctx)
            .and_then(|messages| validate_declaration(txn_idx, &messages).map(|_| messages));
        match declared {
            Ok(messages) => declarations.accesses.push(messages),
            Err(err) => {
                warn!(
                    txn_idx = txn_idx,
                    "[OCC]: Falling back to conservative declaration: {}", err
                );
                declarations
                    .accesses
                    .push(vec![AccessOperation::conservative()]);
                declarations.fallbacks.push(txn_idx);
            },
        }
    }
    declarations
}
