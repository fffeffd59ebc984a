// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::access_op::{AccessType, KeyTemplate, ResourceType};
use occ_types::TxnIndex;

/// For the txns that declared an access to the same resource type, keeps the key templates
/// they read and wrote, in the order the accesses were declared.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ConflictingTxnTracker {
    /// The resource type on which conflicting txns are being tracked by this tracker.
    pub resource_type: ResourceType,
    /// Txns that read the resource, with the keys they read.
    pending_reads: Vec<(TxnIndex, KeyTemplate)>,
    /// Txns that write (or may write) the resource, with the keys they write.
    pending_writes: Vec<(TxnIndex, KeyTemplate)>,
}

impl ConflictingTxnTracker {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            pending_reads: Default::default(),
            pending_writes: Default::default(),
        }
    }

    pub fn add_candidate(&mut self, txn_idx: TxnIndex, access_type: AccessType, key: KeyTemplate) {
        match access_type {
            AccessType::Read => self.pending_reads.push((txn_idx, key)),
            AccessType::Write | AccessType::Unknown => self.pending_writes.push((txn_idx, key)),
            AccessType::Commit => {},
        }
    }

    /// Txns other than `txn_idx` whose tracked accesses conflict with the given access. Reads
    /// only conflict with writes, writes conflict with everything.
    pub fn conflicting_txns<'a>(
        &'a self,
        txn_idx: TxnIndex,
        access_type: AccessType,
        key: &'a KeyTemplate,
    ) -> impl Iterator<Item = TxnIndex> + 'a {
        let reads: &[(TxnIndex, KeyTemplate)] = if access_type.is_write_like() {
            &self.pending_reads
        } else {
            &[]
        };
        self.pending_writes
            .iter()
            .chain(reads.iter())
            .filter(move |(idx, tracked)| *idx != txn_idx && tracked.overlaps(key))
            .map(|(idx, _)| *idx)
    }
}

#[test]
fn test_conflicting_txn_tracker() {
    let exact = |k: &[u8]| KeyTemplate::Exact(k.to_vec());
    let mut tracker = ConflictingTxnTracker::new(ResourceType::new("bank"));
    tracker.add_candidate(1, AccessType::Read, exact(b"alice"));
    tracker.add_candidate(2, AccessType::Write, exact(b"bob"));
    tracker.add_candidate(3, AccessType::Unknown, KeyTemplate::Prefix(b"al".to_vec()));
    tracker.add_candidate(4, AccessType::Commit, KeyTemplate::Any);

    let conflicts = |idx, access_type, key: KeyTemplate| {
        let mut txns: Vec<_> = tracker.conflicting_txns(idx, access_type, &key).collect();
        txns.sort();
        txns
    };
    // Reads only see writers.
    assert_eq!(conflicts(5, AccessType::Read, exact(b"alice")), vec![3]);
    assert_eq!(conflicts(5, AccessType::Read, KeyTemplate::Any), vec![2, 3]);
    // Writes see readers too.
    assert_eq!(conflicts(5, AccessType::Write, exact(b"alice")), vec![1, 3]);
    assert_eq!(conflicts(5, AccessType::Unknown, exact(b"carol")), Vec::<TxnIndex>::new());
    // A txn never conflicts with itself.
    assert_eq!(conflicts(3, AccessType::Write, exact(b"alice")), vec![1]);
}
