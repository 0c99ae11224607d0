//! Lineage chains: ordered, de-duplicated node lists that can branch and merge.
//!
//! Chains live in a flat arena keyed by `chain_id`. Parent and branch links are
//! stored as ids (`branches` on the parent, `parent_chain` metadata on the
//! branch), never as owned chains.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Metadata key naming the chain a branch was cut from.
pub const PARENT_CHAIN_KEY: &str = "parent_chain";
/// Metadata key naming the node a branch was cut at.
pub const BRANCH_POINT_KEY: &str = "branch_point";

/// Errors raised by lineage operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LineageError {
    /// The node is not part of the chain.
    #[error("node {node_id} not found in chain {chain_id}")]
    NodeNotFound {
        /// Chain that was searched.
        chain_id: String,
        /// Missing node.
        node_id: String,
    },
    /// No chain is registered under the id.
    #[error("chain not found: {0}")]
    ChainNotFound(String),
    /// A chain is already registered under the id.
    #[error("chain already exists: {0}")]
    ChainExists(String),
}

/// One lineage chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageChain {
    /// Chain identifier.
    pub chain_id: String,
    /// Node ids in insertion order, each at most once.
    pub nodes: IndexSet<String>,
    /// Ids of chains branched from (or merged into) this one.
    pub branches: IndexSet<String>,
    /// Free-form metadata; branches carry parent and branch point.
    pub metadata: IndexMap<String, Value>,
}

impl LineageChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            nodes: IndexSet::new(),
            branches: IndexSet::new(),
            metadata: IndexMap::new(),
        }
    }

    /// Appends a node unless present. Returns true when it was added.
    pub fn add_node(&mut self, node_id: impl Into<String>) -> bool {
        self.nodes.insert(node_id.into())
    }

    /// Returns true when the node is part of the chain.
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains(node_id)
    }

    /// Chain this one was branched from.
    #[must_use]
    pub fn parent_chain(&self) -> Option<&str> {
        self.metadata.get(PARENT_CHAIN_KEY).and_then(Value::as_str)
    }

    /// Node of the parent this chain was branched at.
    #[must_use]
    pub fn branch_point(&self) -> Option<&str> {
        self.metadata.get(BRANCH_POINT_KEY).and_then(Value::as_str)
    }
}

/// Arena of chains keyed by id, guarded by one lock.
///
/// Chains are created on first reference and never removed. Reads hand out
/// clones, so callers cannot mutate the registry behind the lock.
#[derive(Debug, Default)]
pub struct LineageRegistry {
    chains: Mutex<IndexMap<String, LineageChain>>,
}

impl LineageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain, creating it if it does not exist yet.
    pub fn create_chain(&self, chain_id: &str) -> LineageChain {
        self.chains
            .lock()
            .entry(chain_id.to_string())
            .or_insert_with(|| LineageChain::new(chain_id))
            .clone()
    }

    /// Appends `node_id` to the chain (creating the chain if needed).
    /// Returns true when the node was not already present.
    pub fn add_node(&self, chain_id: &str, node_id: &str) -> bool {
        self.chains
            .lock()
            .entry(chain_id.to_string())
            .or_insert_with(|| LineageChain::new(chain_id))
            .add_node(node_id)
    }

    /// Cuts a new chain `branch_id` off `chain_id` at `from_node`.
    ///
    /// Nothing changes unless the parent exists, contains `from_node`, and
    /// `branch_id` is still free.
    pub fn branch(
        &self,
        chain_id: &str,
        branch_id: &str,
        from_node: &str,
    ) -> Result<LineageChain, LineageError> {
        let mut chains = self.chains.lock();
        let parent = chains
            .get(chain_id)
            .ok_or_else(|| LineageError::ChainNotFound(chain_id.to_string()))?;
        if !parent.contains(from_node) {
            return Err(LineageError::NodeNotFound {
                chain_id: chain_id.to_string(),
                node_id: from_node.to_string(),
            });
        }
        if chains.contains_key(branch_id) {
            return Err(LineageError::ChainExists(branch_id.to_string()));
        }
        let mut branch = LineageChain::new(branch_id);
        branch
            .metadata
            .insert(PARENT_CHAIN_KEY.into(), Value::String(chain_id.to_string()));
        branch
            .metadata
            .insert(BRANCH_POINT_KEY.into(), Value::String(from_node.to_string()));
        if let Some(parent) = chains.get_mut(chain_id) {
            parent.branches.insert(branch_id.to_string());
        }
        chains.insert(branch_id.to_string(), branch.clone());
        Ok(branch)
    }

    /// Merges `other_id` into `chain_id` at `at_node`.
    ///
    /// Returns false and leaves both chains unchanged when either chain is
    /// missing or `at_node` is not in `chain_id`. Otherwise appends the other
    /// chain's unseen nodes in its order and unions its branch ids; a branch id
    /// present on both sides keeps a single entry (last writer wins on an
    /// identical reference).
    pub fn merge(&self, chain_id: &str, other_id: &str, at_node: &str) -> bool {
        let mut chains = self.chains.lock();
        let Some(other) = chains.get(other_id).cloned() else {
            return false;
        };
        let Some(chain) = chains.get_mut(chain_id) else {
            return false;
        };
        if !chain.contains(at_node) {
            return false;
        }
        chain.nodes.extend(other.nodes);
        chain.branches.extend(
            other
                .branches
                .into_iter()
                .filter(|branch| branch != chain_id),
        );
        true
    }

    /// Snapshot of one chain.
    #[must_use]
    pub fn get(&self, chain_id: &str) -> Option<LineageChain> {
        self.chains.lock().get(chain_id).cloned()
    }

    /// Registered chain ids in creation order.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.lock().keys().cloned().collect()
    }

    /// Number of registered chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.lock().len()
    }

    /// Returns true when no chain has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.lock().is_empty()
    }

    /// Walks `parent_chain` links from `chain_id` up to its root.
    ///
    /// The result starts with `chain_id` itself; it is empty for an unknown id.
    #[must_use]
    pub fn ancestry(&self, chain_id: &str) -> Vec<String> {
        let chains = self.chains.lock();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = chains.get(chain_id);
        while let Some(chain) = cursor {
            if !seen.insert(chain.chain_id.as_str()) {
                break;
            }
            path.push(chain.chain_id.clone());
            cursor = chain.parent_chain().and_then(|parent| chains.get(parent));
        }
        path
    }
}
