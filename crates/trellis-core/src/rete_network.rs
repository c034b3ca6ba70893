//! Network construction and incremental maintenance.
//!
//! The [`Network`] owns every arena (facts, tokens, constant tests, alpha
//! memories, beta nodes, negative-join results) and the two roots: the
//! no-test alpha root and the dummy top beta memory holding the single root
//! token. Rule compilation shares structure at every level: constant-test
//! paths, alpha memories, beta memories, join/negative/NCC/filter/bind nodes
//! and production nodes are all build-or-share.
//!
//! All state is scoped to one instance; operations run synchronously to
//! completion and the internal back-references are not safe under concurrent
//! mutation.

use crate::alpha_memory::{AlphaMemory, ConstantTestNode};
use crate::beta_network::{BetaKind, BetaNode, BetaTag};
use crate::error::{MatchError, MatchResult};
use crate::types::{
    AlphaMemoryId, JoinResultId, JoinTest, NegativeJoinResult, NetworkStats, NodeId, TestNodeId,
    Token, TokenId, Wme, WmeId,
};
use std::collections::HashMap;
use tracing::{debug, instrument};
use trellis_eval::{DslEvaluator, Evaluator};
use trellis_types::{Bindings, Condition, Rhs, Rule, Symbol, Triple, Value};

/// An incremental Rete matching network over triple-shaped facts.
#[derive(Debug)]
pub struct Network {
    pub(crate) evaluator: Box<dyn Evaluator>,

    pub(crate) wmes: HashMap<WmeId, Wme>,
    pub(crate) tokens: HashMap<TokenId, Token>,
    pub(crate) join_results: HashMap<JoinResultId, NegativeJoinResult>,
    pub(crate) test_nodes: HashMap<TestNodeId, ConstantTestNode>,
    pub(crate) alpha_memories: HashMap<AlphaMemoryId, AlphaMemory>,
    pub(crate) beta_nodes: HashMap<NodeId, BetaNode>,

    /// Working-memory index for duplicate-assertion detection.
    by_triple: HashMap<Triple, WmeId>,

    pub(crate) alpha_root: TestNodeId,
    pub(crate) root_alpha_memory: AlphaMemoryId,
    pub(crate) beta_root: NodeId,
    pub(crate) dummy_top: NodeId,
    pub(crate) root_token: TokenId,

    next_wme_id: WmeId,
    next_token_id: TokenId,
    next_node_id: NodeId,
    next_test_node_id: TestNodeId,
    next_alpha_memory_id: AlphaMemoryId,
    next_join_result_id: JoinResultId,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// An empty network with the built-in expression evaluator.
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(DslEvaluator::new()))
    }

    /// An empty network with arenas pre-sized for roughly `facts` assertions.
    pub fn with_capacity(facts: usize) -> Self {
        let mut network = Self::new();
        network.wmes.reserve(facts);
        network.tokens.reserve(facts);
        network.by_triple.reserve(facts);
        network
    }

    /// An empty network using a caller-supplied expression evaluator.
    pub fn with_evaluator(evaluator: Box<dyn Evaluator>) -> Self {
        let mut network = Self {
            evaluator,
            wmes: HashMap::new(),
            tokens: HashMap::new(),
            join_results: HashMap::new(),
            test_nodes: HashMap::new(),
            alpha_memories: HashMap::new(),
            beta_nodes: HashMap::new(),
            by_triple: HashMap::new(),
            alpha_root: 0,
            root_alpha_memory: 0,
            beta_root: 0,
            dummy_top: 0,
            root_token: 0,
            next_wme_id: 0,
            next_token_id: 0,
            next_node_id: 0,
            next_test_node_id: 0,
            next_alpha_memory_id: 0,
            next_join_result_id: 0,
        };

        // Alpha root: a no-test node whose memory is the whole working set.
        network.root_alpha_memory = network.new_alpha_memory();
        let alpha_root = network.new_test_node_id();
        network.test_nodes.insert(
            alpha_root,
            ConstantTestNode {
                id: alpha_root,
                test: None,
                memory: Some(network.root_alpha_memory),
                children: Vec::new(),
            },
        );
        network.alpha_root = alpha_root;

        // Beta root and the dummy top beta memory with its root token.
        let beta_root = network.new_node_id();
        network.beta_nodes.insert(
            beta_root,
            BetaNode { id: beta_root, parent: None, children: Vec::new(), kind: BetaKind::Root },
        );
        network.beta_root = beta_root;

        let dummy_top = network.new_node_id();
        let root_token = network.new_token_id();
        network.beta_nodes.insert(
            dummy_top,
            BetaNode {
                id: dummy_top,
                parent: Some(beta_root),
                children: Vec::new(),
                kind: BetaKind::Memory { tokens: vec![root_token] },
            },
        );
        network.beta_mut(beta_root).children.push(dummy_top);
        network.tokens.insert(
            root_token,
            Token {
                id: root_token,
                parent: None,
                wme: None,
                node: dummy_top,
                bindings: Bindings::new(),
                children: Vec::new(),
                join_results: Vec::new(),
                ncc_results: Vec::new(),
                owner: None,
            },
        );
        network.dummy_top = dummy_top;
        network.root_token = root_token;
        network
    }

    // ---------------------------------------------------------------------
    // Fact maintenance
    // ---------------------------------------------------------------------

    /// Assert a fact. Re-asserting a structurally equal triple is a no-op
    /// returning the live fact's id.
    ///
    /// An evaluation failure aborts the remaining propagation; matches
    /// produced before the failure remain and the fact stays asserted.
    #[instrument(skip(self))]
    pub fn add_wme(&mut self, triple: Triple) -> MatchResult<WmeId> {
        if let Some(&existing) = self.by_triple.get(&triple) {
            debug!(%triple, existing, "duplicate assertion deduplicated");
            return Ok(existing);
        }

        let id = self.new_wme_id();
        debug!(%triple, id, "asserting fact");
        self.wmes.insert(id, Wme::new(id, triple.clone()));
        self.by_triple.insert(triple, id);
        self.alpha_activate(self.alpha_root, id)?;
        Ok(id)
    }

    /// Retract a fact: detach it from every alpha memory, cascade-delete
    /// every token mentioning it, and re-propagate tokens it was blocking at
    /// negative nodes. Unknown ids are a no-op.
    #[instrument(skip(self))]
    pub fn remove_wme(&mut self, wme: WmeId) -> MatchResult<()> {
        if !self.wmes.contains_key(&wme) {
            return Ok(());
        }
        debug!(wme, "retracting fact");

        for memory in self.wme(wme).alpha_memories.clone() {
            self.alpha_memory_mut(memory).wmes.retain(|&w| w != wme);
        }

        while let Some(&token) = self.wme(wme).tokens.first() {
            self.delete_token_and_descendants(token)?;
        }

        // The token cascade above already dissolved join results whose owner
        // died with it; what remains blocks live tokens elsewhere.
        for result_id in self.wme(wme).negative_join_results.clone() {
            let Some(result) = self.join_results.remove(&result_id) else {
                continue;
            };
            self.token_mut(result.owner)
                .join_results
                .retain(|&r| r != result_id);
            if self.token(result.owner).join_results.is_empty() {
                let node = self.token(result.owner).node;
                for child in self.beta(node).children.clone() {
                    self.left_activate(child, result.owner, None, Bindings::new())?;
                }
            }
        }

        let entry = self.wmes.remove(&wme).expect("fact vanished mid-retraction");
        self.by_triple.remove(&entry.triple);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Rule compilation
    // ---------------------------------------------------------------------

    /// Compile a rule into the network, sharing structure with existing
    /// rules, and return its production node. The opaque `rhs` attributes
    /// are stored on the production node untouched.
    #[instrument(skip(self, rule, rhs))]
    pub fn add_production(&mut self, rule: &Rule, rhs: Rhs) -> MatchResult<NodeId> {
        let mut earlier = Vec::new();
        let current =
            self.build_or_share_network_for_conditions(self.beta_root, &rule.conditions, &mut earlier)?;
        let production = self.build_or_share_production(current, rhs)?;
        debug!(production, conditions = rule.conditions.len(), "production compiled");
        Ok(production)
    }

    /// Remove a production node and every ancestor no other rule uses.
    #[instrument(skip(self))]
    pub fn remove_production(&mut self, production: NodeId) -> MatchResult<()> {
        if self.beta(production).kind.tag() != BetaTag::Production {
            return Err(MatchError::rule_format(format!(
                "node {production} is not a production node"
            )));
        }
        self.delete_node_and_unused_ancestors(production)
    }

    fn build_or_share_network_for_conditions(
        &mut self,
        parent: NodeId,
        conditions: &[Condition],
        earlier: &mut Vec<Condition>,
    ) -> MatchResult<NodeId> {
        let mut current = parent;
        for condition in conditions {
            match condition {
                Condition::Has(pattern) => {
                    current = self.build_or_share_beta_memory(current)?;
                    let tests = Self::join_tests_from_condition(pattern, earlier);
                    let memory = self.build_or_share_alpha_memory(pattern)?;
                    current = self.build_or_share_join_node(current, memory, tests, pattern);
                }
                Condition::Neg(pattern) => {
                    let tests = Self::join_tests_from_condition(pattern, earlier);
                    let memory = self.build_or_share_alpha_memory(pattern)?;
                    current = self.build_or_share_negative_node(current, memory, tests)?;
                }
                Condition::Ncc(subconditions) => {
                    current = self.build_or_share_ncc_nodes(current, subconditions, earlier)?;
                }
                Condition::Filter { template } => {
                    current = self.build_or_share_filter_node(current, template);
                }
                Condition::Bind { template, variable } => {
                    current = self.build_or_share_bind_node(current, template, variable);
                }
            }
            earlier.push(condition.clone());
        }
        Ok(current)
    }

    /// Derive the consistency tests for a new condition from variables it
    /// shares with earlier positive conditions.
    ///
    /// Ancestor indices count only token-creating conditions so they line up
    /// with the token's wmes-list; negated and compound-negated ancestors
    /// occupy an index but are never a variable source.
    fn join_tests_from_condition(pattern: &Triple, earlier: &[Condition]) -> Vec<JoinTest> {
        let mut tests = Vec::new();
        for (wme_field, variable) in pattern.variables() {
            let mut slot = 0;
            for condition in earlier {
                match condition {
                    Condition::Has(ancestor) => {
                        if let Some(ancestor_field) = ancestor.position_of(variable) {
                            tests.push(JoinTest { wme_field, ancestor: slot, ancestor_field });
                        }
                        slot += 1;
                    }
                    Condition::Neg(_) | Condition::Ncc(_) => slot += 1,
                    Condition::Filter { .. } | Condition::Bind { .. } => {}
                }
            }
        }
        tests
    }

    fn build_or_share_beta_memory(&mut self, parent: NodeId) -> MatchResult<NodeId> {
        for child in self.beta(parent).children.clone() {
            if self.beta(child).kind.tag() == BetaTag::Memory {
                return Ok(child);
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Memory { tokens: Vec::new() },
            },
        );
        self.beta_mut(parent).children.push(id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    fn build_or_share_join_node(
        &mut self,
        parent: NodeId,
        alpha_memory: AlphaMemoryId,
        tests: Vec<JoinTest>,
        pattern: &Triple,
    ) -> NodeId {
        for child in self.beta(parent).children.clone() {
            if let BetaKind::Join {
                alpha_memory: am,
                tests: t,
                pattern: p,
            } = &self.beta(child).kind
            {
                if *am == alpha_memory && *t == tests && p == pattern {
                    return child;
                }
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Join { alpha_memory, tests, pattern: pattern.clone() },
            },
        );
        self.beta_mut(parent).children.push(id);
        self.alpha_memory_mut(alpha_memory).successors.push(id);
        id
    }

    fn build_or_share_negative_node(
        &mut self,
        parent: NodeId,
        alpha_memory: AlphaMemoryId,
        tests: Vec<JoinTest>,
    ) -> MatchResult<NodeId> {
        for child in self.beta(parent).children.clone() {
            if let BetaKind::Negative {
                alpha_memory: am,
                tests: t,
                ..
            } = &self.beta(child).kind
            {
                if *am == alpha_memory && *t == tests {
                    return Ok(child);
                }
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Negative { alpha_memory, tests, tokens: Vec::new() },
            },
        );
        self.beta_mut(parent).children.push(id);
        self.alpha_memory_mut(alpha_memory).successors.push(id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    fn build_or_share_ncc_nodes(
        &mut self,
        parent: NodeId,
        subconditions: &[Condition],
        earlier: &[Condition],
    ) -> MatchResult<NodeId> {
        // The sub-network sees a copy of the earlier conditions: its own
        // conditions must not leak into the outer join plan.
        let mut sub_earlier = earlier.to_vec();
        let bottom =
            self.build_or_share_network_for_conditions(parent, subconditions, &mut sub_earlier)?;

        for child in self.beta(parent).children.clone() {
            if let BetaKind::Ncc { partner, .. } = self.beta(child).kind {
                if self.beta(partner).parent == Some(bottom) {
                    return Ok(child);
                }
            }
        }

        let ncc = self.new_node_id();
        let partner = self.new_node_id();
        self.beta_nodes.insert(
            ncc,
            BetaNode {
                id: ncc,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Ncc { tokens: Vec::new(), partner },
            },
        );
        self.beta_nodes.insert(
            partner,
            BetaNode {
                id: partner,
                parent: Some(bottom),
                children: Vec::new(),
                kind: BetaKind::NccPartner {
                    ncc,
                    subconditions: subconditions.iter().filter(|c| c.creates_token()).count(),
                    buffer: Vec::new(),
                },
            },
        );
        self.beta_mut(parent).children.push(ncc);
        self.beta_mut(bottom).children.push(partner);

        // Seed the NCC node before the partner so outer matches exist by the
        // time buffered sub-matches look for their owners.
        self.update_new_node_with_matches_from_above(ncc)?;
        self.update_new_node_with_matches_from_above(partner)?;
        Ok(ncc)
    }

    fn build_or_share_filter_node(&mut self, parent: NodeId, template: &str) -> NodeId {
        for child in self.beta(parent).children.clone() {
            if let BetaKind::Filter { template: t } = &self.beta(child).kind {
                if t == template {
                    return child;
                }
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Filter { template: template.to_string() },
            },
        );
        self.beta_mut(parent).children.push(id);
        id
    }

    fn build_or_share_bind_node(
        &mut self,
        parent: NodeId,
        template: &str,
        variable: &Symbol,
    ) -> NodeId {
        for child in self.beta(parent).children.clone() {
            if let BetaKind::Bind { template: t, variable: v } = &self.beta(child).kind {
                if t == template && v == variable {
                    return child;
                }
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Bind {
                    template: template.to_string(),
                    variable: variable.clone(),
                },
            },
        );
        self.beta_mut(parent).children.push(id);
        id
    }

    fn build_or_share_production(&mut self, parent: NodeId, rhs: Rhs) -> MatchResult<NodeId> {
        for child in self.beta(parent).children.clone() {
            if self.beta(child).kind.tag() == BetaTag::Production {
                return Ok(child);
            }
        }

        let id = self.new_node_id();
        self.beta_nodes.insert(
            id,
            BetaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind: BetaKind::Production { tokens: Vec::new(), rhs },
            },
        );
        self.beta_mut(parent).children.push(id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    /// Back-fill a newly installed node with the matches already flowing
    /// through its parent, without double-delivering to existing siblings.
    fn update_new_node_with_matches_from_above(&mut self, node: NodeId) -> MatchResult<()> {
        let Some(parent) = self.beta(node).parent else {
            return Ok(());
        };

        match &self.beta(parent).kind {
            BetaKind::Memory { tokens } => {
                for token in tokens.clone() {
                    self.left_activate(node, token, None, Bindings::new())?;
                }
                Ok(())
            }
            BetaKind::Join { alpha_memory, .. } => {
                // Replay the alpha memory through the parent with the new
                // node temporarily installed as its only child.
                let alpha_memory = *alpha_memory;
                let saved =
                    std::mem::replace(&mut self.beta_mut(parent).children, vec![node]);
                let mut outcome = Ok(());
                for wme in self.alpha_memory(alpha_memory).wmes.clone() {
                    outcome = self.right_activate(parent, wme);
                    if outcome.is_err() {
                        break;
                    }
                }
                self.beta_mut(parent).children = saved;
                outcome
            }
            BetaKind::Negative { tokens, .. } => {
                for token in tokens.clone() {
                    if self.token(token).join_results.is_empty() {
                        self.left_activate(node, token, None, Bindings::new())?;
                    }
                }
                Ok(())
            }
            BetaKind::Ncc { tokens, .. } => {
                for token in tokens.clone() {
                    if self.token(token).ncc_results.is_empty() {
                        self.left_activate(node, token, None, Bindings::new())?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    /// Remove a token and, post-order, everything below it, unhooking every
    /// back-reference as it goes.
    pub(crate) fn delete_token_and_descendants(&mut self, token: TokenId) -> MatchResult<()> {
        if !self.tokens.contains_key(&token) {
            return Ok(());
        }
        for child in self.token(token).children.clone() {
            self.delete_token_and_descendants(child)?;
        }

        let node = self.token(token).node;
        let tag = self.beta(node).kind.tag();

        // Partner result tokens live only in the buffer or on their owner's
        // ncc-results list, never in a node memory.
        if tag != BetaTag::NccPartner {
            self.detach_token_from_node(node, token);
        }
        if let Some(wme) = self.token(token).wme {
            self.wme_mut(wme).tokens.retain(|&t| t != token);
        }
        if let Some(parent) = self.token(token).parent {
            if self.tokens.contains_key(&parent) {
                self.token_mut(parent).children.retain(|&t| t != token);
            }
        }

        match tag {
            BetaTag::Negative => {
                for result_id in self.token(token).join_results.clone() {
                    let result = self
                        .join_results
                        .remove(&result_id)
                        .expect("dangling negative-join result");
                    self.wme_mut(result.wme)
                        .negative_join_results
                        .retain(|&r| r != result_id);
                }
            }
            BetaTag::Ncc => {
                for result in self.token(token).ncc_results.clone() {
                    if let Some(wme) = self.token(result).wme {
                        self.wme_mut(wme).tokens.retain(|&t| t != result);
                    }
                    if let Some(parent) = self.token(result).parent {
                        if self.tokens.contains_key(&parent) {
                            self.token_mut(parent).children.retain(|&t| t != result);
                        }
                    }
                    self.tokens.remove(&result);
                }
            }
            BetaTag::NccPartner => {
                match self.token(token).owner {
                    Some(owner) => {
                        self.token_mut(owner).ncc_results.retain(|&t| t != token);
                        if self.token(owner).ncc_results.is_empty() {
                            // The owner is no longer blocked.
                            let BetaKind::NccPartner { ncc, .. } = self.beta(node).kind else {
                                unreachable!()
                            };
                            for child in self.beta(ncc).children.clone() {
                                self.left_activate(child, owner, None, Bindings::new())?;
                            }
                        }
                    }
                    None => {
                        let BetaKind::NccPartner { buffer, .. } =
                            &mut self.beta_mut(node).kind
                        else {
                            unreachable!()
                        };
                        buffer.retain(|&t| t != token);
                    }
                }
            }
            _ => {}
        }

        self.tokens.remove(&token);
        Ok(())
    }

    /// Delete every child of a token, leaving the token itself in place.
    pub(crate) fn delete_descendants(&mut self, token: TokenId) -> MatchResult<()> {
        for child in self.token(token).children.clone() {
            self.delete_token_and_descendants(child)?;
        }
        Ok(())
    }

    fn delete_node_and_unused_ancestors(&mut self, node: NodeId) -> MatchResult<()> {
        if node == self.beta_root || node == self.dummy_top {
            return Ok(());
        }

        let mut partner_to_delete = None;
        match &self.beta(node).kind {
            BetaKind::Join { alpha_memory, .. } => {
                let memory = *alpha_memory;
                self.detach_alpha_successor(memory, node);
            }
            BetaKind::Negative { alpha_memory, tokens, .. } => {
                let (memory, tokens) = (*alpha_memory, tokens.clone());
                for token in tokens {
                    self.delete_token_and_descendants(token)?;
                }
                self.detach_alpha_successor(memory, node);
            }
            BetaKind::Memory { tokens } | BetaKind::Production { tokens, .. } => {
                for token in tokens.clone() {
                    self.delete_token_and_descendants(token)?;
                }
            }
            BetaKind::Ncc { tokens, partner } => {
                let (tokens, partner) = (tokens.clone(), *partner);
                for token in tokens {
                    self.delete_token_and_descendants(token)?;
                }
                partner_to_delete = Some(partner);
            }
            BetaKind::NccPartner { buffer, .. } => {
                for token in buffer.clone() {
                    self.delete_token_and_descendants(token)?;
                }
            }
            BetaKind::Filter { .. } | BetaKind::Bind { .. } => {}
            BetaKind::Root => return Ok(()),
        }

        // An NCC's partner hangs off the sub-network bottom; remove it (and
        // the now-unused sub-network) before pruning upward from the NCC.
        if let Some(partner) = partner_to_delete {
            self.delete_node_and_unused_ancestors(partner)?;
        }

        let parent = self.beta(node).parent;
        if let Some(parent) = parent {
            self.detach_beta_child(parent, node);
        }
        self.beta_nodes.remove(&node);

        if let Some(parent) = parent {
            if self.beta(parent).children.is_empty() {
                self.delete_node_and_unused_ancestors(parent)?;
            }
        }
        Ok(())
    }

    fn detach_token_from_node(&mut self, node: NodeId, token: TokenId) {
        let tokens = match &mut self.beta_mut(node).kind {
            BetaKind::Memory { tokens } => tokens,
            BetaKind::Negative { tokens, .. } => tokens,
            BetaKind::Ncc { tokens, .. } => tokens,
            BetaKind::Production { tokens, .. } => tokens,
            other => panic!("token owned by {}", other.tag().node_name()),
        };
        let position = tokens
            .iter()
            .position(|&t| t == token)
            .unwrap_or_else(|| panic!("token {token} missing from node {node} memory"));
        tokens.remove(position);
    }

    fn detach_beta_child(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.beta_mut(parent).children;
        let position = children
            .iter()
            .position(|&c| c == child)
            .unwrap_or_else(|| panic!("node {child} is not a child of {parent}"));
        children.remove(position);
    }

    fn detach_alpha_successor(&mut self, memory: AlphaMemoryId, node: NodeId) {
        let successors = &mut self.alpha_memory_mut(memory).successors;
        let position = successors
            .iter()
            .position(|&s| s == node)
            .unwrap_or_else(|| panic!("node {node} is not a successor of alpha memory {memory}"));
        successors.remove(position);
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Token ids of the production's current matches.
    pub fn production_matches(&self, production: NodeId) -> Vec<TokenId> {
        match &self.beta(production).kind {
            BetaKind::Production { tokens, .. } => tokens.clone(),
            other => panic!("node is a {}, not a production", other.tag().node_name()),
        }
    }

    /// Number of variable-binding tuples currently satisfying the rule.
    pub fn match_count(&self, production: NodeId) -> usize {
        match &self.beta(production).kind {
            BetaKind::Production { tokens, .. } => tokens.len(),
            other => panic!("node is a {}, not a production", other.tag().node_name()),
        }
    }

    /// The opaque right-hand-side attributes stored with a production.
    pub fn production_rhs(&self, production: NodeId) -> &Rhs {
        match &self.beta(production).kind {
            BetaKind::Production { rhs, .. } => rhs,
            other => panic!("node is a {}, not a production", other.tag().node_name()),
        }
    }

    /// The value bound to `variable` at this token, searching the token and
    /// then its ancestors.
    pub fn binding(&self, token: TokenId, variable: &Symbol) -> Option<Value> {
        let mut current = Some(token);
        while let Some(id) = current {
            let entry = self.token(id);
            if let Some(value) = entry.bindings.get(variable) {
                return Some(value.clone());
            }
            current = entry.parent;
        }
        None
    }

    /// The full binding environment of a match.
    pub fn bindings(&self, token: TokenId) -> Bindings {
        self.merged_bindings(token)
    }

    /// The token's contributing facts in condition order; negated and
    /// compound-negated positions are `None`.
    pub fn token_wmes(&self, token: TokenId) -> Vec<Option<&Triple>> {
        self.token_wme_chain(token)
            .into_iter()
            .map(|slot| slot.map(|wme| &self.wme(wme).triple))
            .collect()
    }

    /// The triple of a live fact.
    pub fn wme_triple(&self, wme: WmeId) -> Option<&Triple> {
        self.wmes.get(&wme).map(|entry| &entry.triple)
    }

    /// The id under which a triple is currently asserted, if any.
    pub fn find_wme(&self, triple: &Triple) -> Option<WmeId> {
        self.by_triple.get(triple).copied()
    }

    /// Live object counts.
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            facts: self.wmes.len(),
            tokens: self.tokens.len(),
            constant_tests: self.test_nodes.len(),
            alpha_memories: self.alpha_memories.len(),
            ..NetworkStats::default()
        };
        for node in self.beta_nodes.values() {
            match node.kind.tag() {
                BetaTag::Memory => stats.beta_memories += 1,
                BetaTag::Join => stats.join_nodes += 1,
                BetaTag::Negative => stats.negative_nodes += 1,
                BetaTag::Ncc => stats.ncc_pairs += 1,
                BetaTag::Filter => stats.filter_nodes += 1,
                BetaTag::Bind => stats.bind_nodes += 1,
                BetaTag::Production => stats.productions += 1,
                BetaTag::Root | BetaTag::NccPartner => {}
            }
        }
        stats
    }

    /// Check the structural invariants over the current state, returning a
    /// description of every violation found. Intended for tests.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for token in self.tokens.values() {
            if let Some(wme) = token.wme {
                if !self.wme(wme).tokens.contains(&token.id) {
                    violations.push(format!("token {} missing from fact {wme} list", token.id));
                }
            }
            if let Some(parent) = token.parent {
                if !self.token(parent).children.contains(&token.id) {
                    violations
                        .push(format!("token {} missing from parent {parent} children", token.id));
                }
            }
            let blocked = !token.join_results.is_empty() || !token.ncc_results.is_empty();
            if blocked && !token.children.is_empty() {
                violations.push(format!("blocked token {} has propagated", token.id));
            }
        }

        for memory in self.alpha_memories.values() {
            for &wme in &memory.wmes {
                if !self.wme(wme).alpha_memories.contains(&memory.id) {
                    violations
                        .push(format!("fact {wme} missing back-reference to memory {}", memory.id));
                }
            }
        }

        for (&id, result) in &self.join_results {
            if !self.token(result.owner).join_results.contains(&id) {
                violations.push(format!("join result {id} missing from owner token"));
            }
            if !self.wme(result.wme).negative_join_results.contains(&id) {
                violations.push(format!("join result {id} missing from fact"));
            }
        }

        violations
    }

    // ---------------------------------------------------------------------
    // Arena access (dangling ids are programmer errors and fail fast)
    // ---------------------------------------------------------------------

    pub(crate) fn wme(&self, id: WmeId) -> &Wme {
        self.wmes.get(&id).unwrap_or_else(|| panic!("dangling fact id {id}"))
    }

    pub(crate) fn wme_mut(&mut self, id: WmeId) -> &mut Wme {
        self.wmes.get_mut(&id).unwrap_or_else(|| panic!("dangling fact id {id}"))
    }

    pub(crate) fn token(&self, id: TokenId) -> &Token {
        self.tokens.get(&id).unwrap_or_else(|| panic!("dangling token id {id}"))
    }

    pub(crate) fn token_mut(&mut self, id: TokenId) -> &mut Token {
        self.tokens.get_mut(&id).unwrap_or_else(|| panic!("dangling token id {id}"))
    }

    pub(crate) fn beta(&self, id: NodeId) -> &BetaNode {
        self.beta_nodes.get(&id).unwrap_or_else(|| panic!("dangling beta node id {id}"))
    }

    pub(crate) fn beta_mut(&mut self, id: NodeId) -> &mut BetaNode {
        self.beta_nodes.get_mut(&id).unwrap_or_else(|| panic!("dangling beta node id {id}"))
    }

    pub(crate) fn alpha_memory(&self, id: AlphaMemoryId) -> &AlphaMemory {
        self.alpha_memories.get(&id).unwrap_or_else(|| panic!("dangling alpha memory id {id}"))
    }

    pub(crate) fn alpha_memory_mut(&mut self, id: AlphaMemoryId) -> &mut AlphaMemory {
        self.alpha_memories
            .get_mut(&id)
            .unwrap_or_else(|| panic!("dangling alpha memory id {id}"))
    }

    pub(crate) fn test_node(&self, id: TestNodeId) -> &ConstantTestNode {
        self.test_nodes.get(&id).unwrap_or_else(|| panic!("dangling test node id {id}"))
    }

    pub(crate) fn test_node_mut(&mut self, id: TestNodeId) -> &mut ConstantTestNode {
        self.test_nodes.get_mut(&id).unwrap_or_else(|| panic!("dangling test node id {id}"))
    }

    // ---------------------------------------------------------------------
    // Id allocation
    // ---------------------------------------------------------------------

    fn new_wme_id(&mut self) -> WmeId {
        let id = self.next_wme_id;
        self.next_wme_id += 1;
        id
    }

    pub(crate) fn new_token_id(&mut self) -> TokenId {
        let id = self.next_token_id;
        self.next_token_id += 1;
        id
    }

    fn new_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub(crate) fn new_test_node_id(&mut self) -> TestNodeId {
        let id = self.next_test_node_id;
        self.next_test_node_id += 1;
        id
    }

    pub(crate) fn new_alpha_memory(&mut self) -> AlphaMemoryId {
        let id = self.next_alpha_memory_id;
        self.next_alpha_memory_id += 1;
        self.alpha_memories.insert(id, AlphaMemory { id, ..AlphaMemory::default() });
        id
    }

    pub(crate) fn new_join_result_id(&mut self) -> JoinResultId {
        let id = self.next_join_result_id;
        self.next_join_result_id += 1;
        id
    }
}
