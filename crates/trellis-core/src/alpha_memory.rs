//! Alpha network: constant-test tree and alpha memories.
//!
//! Incoming facts descend a discrimination tree rooted at a single no-test
//! node. Each non-root node tests one field for equality with one constant;
//! a node may carry an alpha memory collecting every fact that passed the
//! tests along its path. Conditions with the same constant tests (in
//! canonical field order) share one alpha memory, so a fact is tested once
//! per distinct prefix no matter how many rules mention it.

use crate::error::MatchResult;
use crate::rete_network::Network;
use crate::types::{AlphaMemoryId, NodeId, TestNodeId, WmeId};
use tracing::trace;
use trellis_types::{Field, Symbol, Triple};

/// One node of the constant-test tree. The root carries no test.
#[derive(Debug, Clone)]
pub struct ConstantTestNode {
    pub id: TestNodeId,
    /// Field/constant equality this node checks; `None` only at the root.
    pub test: Option<(Field, Symbol)>,
    /// Alpha memory attached to this node, if any condition terminates here.
    pub memory: Option<AlphaMemoryId>,
    pub(crate) children: Vec<TestNodeId>,
}

/// An unordered set of facts satisfying a fixed conjunction of constant
/// tests, with the beta nodes to right-activate when the set grows.
#[derive(Debug, Clone, Default)]
pub struct AlphaMemory {
    pub id: AlphaMemoryId,
    pub(crate) wmes: Vec<WmeId>,
    pub(crate) successors: Vec<NodeId>,
}

impl Network {
    /// Drop a fact into the constant-test tree at `test_node`, inserting it
    /// into every alpha memory along the passing paths.
    pub(crate) fn alpha_activate(
        &mut self,
        test_node: TestNodeId,
        wme: WmeId,
    ) -> MatchResult<()> {
        let (test, memory, children) = {
            let node = self.test_node(test_node);
            (node.test.clone(), node.memory, node.children.clone())
        };

        if let Some((field, symbol)) = test {
            if self.wme(wme).triple.field(field) != &symbol {
                return Ok(());
            }
        }

        if let Some(memory) = memory {
            self.alpha_memory_activate(memory, wme)?;
        }
        for child in children {
            self.alpha_activate(child, wme)?;
        }
        Ok(())
    }

    /// Insert a fact into an alpha memory (deduplicated) and right-activate
    /// the memory's successors.
    ///
    /// Successors run in reverse insertion order: while a newly built node is
    /// temporarily installed as the sole child of its parent join, existing
    /// facts must reach it before being propagated anywhere else.
    pub(crate) fn alpha_memory_activate(
        &mut self,
        memory: AlphaMemoryId,
        wme: WmeId,
    ) -> MatchResult<()> {
        if self.alpha_memory(memory).wmes.contains(&wme) {
            return Ok(());
        }
        trace!(memory, wme, "alpha memory activation");
        self.alpha_memory_mut(memory).wmes.push(wme);
        self.wme_mut(wme).alpha_memories.push(memory);

        let successors = self.alpha_memory(memory).successors.clone();
        for successor in successors.into_iter().rev() {
            self.right_activate(successor, wme)?;
        }
        Ok(())
    }

    /// Walk (extending as needed) the constant-test tree for the pattern's
    /// constants and return the alpha memory at the terminal node, creating
    /// and seeding it from the working set if absent.
    pub(crate) fn build_or_share_alpha_memory(
        &mut self,
        pattern: &Triple,
    ) -> MatchResult<AlphaMemoryId> {
        let path: Vec<(Field, Symbol)> = pattern
            .constants()
            .map(|(field, symbol)| (field, symbol.clone()))
            .collect();

        let mut current = self.alpha_root;
        for (field, symbol) in path {
            current = self.build_or_share_constant_test_node(current, field, symbol);
        }

        let memory = match self.test_node(current).memory {
            Some(memory) => memory,
            None => {
                let memory = self.new_alpha_memory();
                self.test_node_mut(current).memory = Some(memory);
                memory
            }
        };

        // Seed from the facts already known to the root memory. For a shared
        // memory this deduplicates to a no-op.
        let known = self.alpha_memory(self.root_alpha_memory).wmes.clone();
        for wme in known {
            if pattern.matches(&self.wme(wme).triple) {
                self.alpha_memory_activate(memory, wme)?;
            }
        }
        Ok(memory)
    }

    fn build_or_share_constant_test_node(
        &mut self,
        parent: TestNodeId,
        field: Field,
        symbol: Symbol,
    ) -> TestNodeId {
        let children = self.test_node(parent).children.clone();
        for child in children {
            if self.test_node(child).test == Some((field, symbol.clone())) {
                return child;
            }
        }

        let id = self.new_test_node_id();
        self.test_nodes.insert(
            id,
            ConstantTestNode {
                id,
                test: Some((field, symbol)),
                memory: None,
                children: Vec::new(),
            },
        );
        self.test_node_mut(parent).children.push(id);
        id
    }
}
