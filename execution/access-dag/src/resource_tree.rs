// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{access_op::ResourceType, errors::DagError};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::error;

/// Parent links between resource types, supplied by the application. Types that are never
/// registered are direct children of [`ResourceType::ANY`].
#[derive(Clone, Debug, Default)]
pub struct ResourceTree {
    parents: HashMap<ResourceType, ResourceType>,
}

impl ResourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(mut self, child: ResourceType, parent: ResourceType) -> Self {
        self.insert(child, parent);
        self
    }

    /// Registers `parent` as the parent of `child`, returning the previous parent.
    pub fn insert(&mut self, child: ResourceType, parent: ResourceType) -> Option<ResourceType> {
        self.parents.insert(child, parent)
    }

    /// Computes the ancestor chain of every registered type. Fails if a parent chain loops.
    pub fn resolve(&self) -> Result<ResolvedResourceTree, DagError> {
        if let Some(parent) = self.parents.get(&ResourceType::ANY) {
            return Err(DagError::InvalidResourceTree(format!(
                "{} is the root and cannot have parent {}",
                ResourceType::ANY,
                parent
            )));
        }

        let mut ancestors = HashMap::with_capacity(self.parents.len());
        for child in self.parents.keys() {
            let mut chain = vec![child.clone()];
            let mut visited: HashSet<&ResourceType> = HashSet::from([child]);
            let mut current = child;
            while let Some(parent) = self.parents.get(current) {
                if !visited.insert(parent) {
                    chain.push(parent.clone());
                    let cycle = chain.iter().join(" -> ");
                    error!("[OCC]: Resource tree contains a cycle: {}", cycle);
                    return Err(DagError::CyclicDependency(format!(
                        "resource hierarchy loops: {}",
                        cycle
                    )));
                }
                chain.push(parent.clone());
                current = parent;
            }
            if !current.is_any() {
                chain.push(ResourceType::ANY);
            }
            // Self is kept at the front of the chain.
            ancestors.insert(child.clone(), chain);
        }
        Ok(ResolvedResourceTree { ancestors })
    }
}

/// Acyclic resource hierarchy with precomputed ancestor chains.
#[derive(Clone, Debug, Default)]
pub struct ResolvedResourceTree {
    ancestors: HashMap<ResourceType, Vec<ResourceType>>,
}

impl ResolvedResourceTree {
    /// Returns true if `ancestor` is `resource` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: &ResourceType, resource: &ResourceType) -> bool {
        if ancestor.is_any() || ancestor == resource {
            return true;
        }
        self.ancestors
            .get(resource)
            .is_some_and(|chain| chain.contains(ancestor))
    }

    /// Two resource types overlap when one of them contains the other.
    pub fn overlaps(&self, a: &ResourceType, b: &ResourceType) -> bool {
        self.is_ancestor_or_self(a, b) || self.is_ancestor_or_self(b, a)
    }
}
