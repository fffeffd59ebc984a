// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum AccessType {
    Read,
    Write,
    /// The transaction may read or write, but cannot say which. Treated like a write.
    Unknown,
    /// Marks the end of a message. Every message list ends with exactly one.
    Commit,
}

impl AccessType {
    pub fn is_write_like(&self) -> bool {
        matches!(self, AccessType::Write | AccessType::Unknown)
    }
}

/// Name of a kind of resource (e.g. "bank/balances"). Resource types form a hierarchy, see
/// [`ResourceTree`](crate::resource_tree::ResourceTree).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ResourceType(Cow<'static, str>);

impl ResourceType {
    /// Root of every resource hierarchy; overlaps with all resource types.
    pub const ANY: ResourceType = ResourceType(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which keys of a resource an operation touches.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum KeyTemplate {
    Any,
    Exact(Vec<u8>),
    Prefix(Vec<u8>),
}

impl KeyTemplate {
    pub fn overlaps(&self, other: &KeyTemplate) -> bool {
        use KeyTemplate::*;
        match (self, other) {
            (Any, _) | (_, Any) => true,
            (Exact(a), Exact(b)) => a == b,
            (Exact(key), Prefix(prefix)) | (Prefix(prefix), Exact(key)) => key.starts_with(prefix),
            (Prefix(a), Prefix(b)) => a.starts_with(b) || b.starts_with(a),
        }
    }
}

/// One declared access of a message.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct AccessOperation {
    pub access_type: AccessType,
    pub resource_type: ResourceType,
    pub key_template: KeyTemplate,
}

impl AccessOperation {
    pub fn new(
        access_type: AccessType,
        resource_type: ResourceType,
        key_template: KeyTemplate,
    ) -> Self {
        Self {
            access_type,
            resource_type,
            key_template,
        }
    }

    pub fn read(resource_type: ResourceType, key_template: KeyTemplate) -> Self {
        Self::new(AccessType::Read, resource_type, key_template)
    }

    pub fn write(resource_type: ResourceType, key_template: KeyTemplate) -> Self {
        Self::new(AccessType::Write, resource_type, key_template)
    }

    pub fn unknown(resource_type: ResourceType, key_template: KeyTemplate) -> Self {
        Self::new(AccessType::Unknown, resource_type, key_template)
    }

    pub fn commit() -> Self {
        Self::new(AccessType::Commit, ResourceType::ANY, KeyTemplate::Any)
    }

    /// Unknown access to any key of any resource, followed by the commit marker. Everything
    /// after a transaction declaring this depends on it.
    pub fn conservative() -> Vec<AccessOperation> {
        vec![
            Self::unknown(ResourceType::ANY, KeyTemplate::Any),
            Self::commit(),
        ]
    }

    pub fn is_commit(&self) -> bool {
        self.access_type == AccessType::Commit
    }

    pub fn is_unknown_on_any(&self) -> bool {
        self.access_type == AccessType::Unknown && self.resource_type.is_any()
    }
}
