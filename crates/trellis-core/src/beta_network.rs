//! Beta network: partial-match maintenance across conditions.
//!
//! The beta network is a DAG of nodes below the dummy top beta memory. Beta
//! memories store tokens, join nodes inner-join a beta memory against an
//! alpha memory, negative nodes antijoin, NCC/NCC-partner pairs implement
//! compound negation, filter and bind nodes evaluate expression templates
//! inline, and production nodes collect complete matches.
//!
//! The node set is closed and the activation interface is asymmetric (left
//! activations carry tokens down, right activations carry facts in from
//! alpha memories), so activation dispatches on a tagged variant rather than
//! a node trait.

use crate::error::{MatchError, MatchResult};
use crate::rete_network::Network;
use crate::types::{AlphaMemoryId, JoinTest, NegativeJoinResult, NodeId, Token, TokenId, WmeId};
use tracing::trace;
use trellis_types::{Bindings, Rhs, Symbol, Triple, Value};

/// A node in the beta network.
#[derive(Debug, Clone)]
pub struct BetaNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub kind: BetaKind,
}

/// The closed set of beta node kinds.
#[derive(Debug, Clone)]
pub enum BetaKind {
    /// The root above the dummy top beta memory; never activated.
    Root,
    /// Stores the partial matches for a prefix of positive conditions.
    Memory { tokens: Vec<TokenId> },
    /// Inner join between the parent beta memory and an alpha memory.
    Join {
        alpha_memory: AlphaMemoryId,
        tests: Vec<JoinTest>,
        pattern: Triple,
    },
    /// Antijoin: propagates a token iff no fact in the alpha memory passes
    /// the join tests. Holds its own token memory.
    Negative {
        alpha_memory: AlphaMemoryId,
        tests: Vec<JoinTest>,
        tokens: Vec<TokenId>,
    },
    /// Compound negation over a sub-network; blocked while the partner has
    /// results for the token.
    Ncc { tokens: Vec<TokenId>, partner: NodeId },
    /// Sits under the sub-network bottom and routes sub-matches to the NCC
    /// node's tokens. `subconditions` counts the token-creating conditions
    /// of the enclosed conjunction.
    NccPartner {
        ncc: NodeId,
        subconditions: usize,
        buffer: Vec<TokenId>,
    },
    /// Propagates iff the substituted template evaluates truthy.
    Filter { template: String },
    /// Evaluates the template and binds the result to a variable.
    Bind { template: String, variable: Symbol },
    /// Terminal sink; its token memory is the rule's match set.
    Production { tokens: Vec<TokenId>, rhs: Rhs },
}

/// Discriminant used at activation sites, in the Graphviz dump and for
/// statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BetaTag {
    Root,
    Memory,
    Join,
    Negative,
    Ncc,
    NccPartner,
    Filter,
    Bind,
    Production,
}

impl BetaKind {
    pub(crate) fn tag(&self) -> BetaTag {
        match self {
            BetaKind::Root => BetaTag::Root,
            BetaKind::Memory { .. } => BetaTag::Memory,
            BetaKind::Join { .. } => BetaTag::Join,
            BetaKind::Negative { .. } => BetaTag::Negative,
            BetaKind::Ncc { .. } => BetaTag::Ncc,
            BetaKind::NccPartner { .. } => BetaTag::NccPartner,
            BetaKind::Filter { .. } => BetaTag::Filter,
            BetaKind::Bind { .. } => BetaTag::Bind,
            BetaKind::Production { .. } => BetaTag::Production,
        }
    }
}

impl BetaTag {
    pub(crate) fn node_name(self) -> &'static str {
        match self {
            BetaTag::Root => "BetaRoot",
            BetaTag::Memory => "BetaMemory",
            BetaTag::Join => "JoinNode",
            BetaTag::Negative => "NegativeNode",
            BetaTag::Ncc => "NccNode",
            BetaTag::NccPartner => "NccPartnerNode",
            BetaTag::Filter => "FilterNode",
            BetaTag::Bind => "BindNode",
            BetaTag::Production => "ProductionNode",
        }
    }
}

impl Network {
    /// Deliver `(parent token, fact, local bindings)` to a node. Join nodes
    /// treat the token as the newly arrived partial match and ignore the
    /// other arguments.
    pub(crate) fn left_activate(
        &mut self,
        node: NodeId,
        token: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        match self.beta(node).kind.tag() {
            BetaTag::Memory => self.memory_left_activate(node, token, wme, bindings),
            BetaTag::Join => self.join_left_activate(node, token),
            BetaTag::Negative => self.negative_left_activate(node, token, wme, bindings),
            BetaTag::Ncc => self.ncc_left_activate(node, token, wme, bindings),
            BetaTag::NccPartner => self.partner_left_activate(node, token, wme, bindings),
            BetaTag::Filter => self.filter_left_activate(node, token, wme, bindings),
            BetaTag::Bind => self.bind_left_activate(node, token, wme, bindings),
            BetaTag::Production => {
                self.production_left_activate(node, token, wme, bindings);
                Ok(())
            }
            BetaTag::Root => panic!("the beta root cannot be activated"),
        }
    }

    /// Deliver a fact arriving in an alpha memory to a successor node.
    pub(crate) fn right_activate(&mut self, node: NodeId, wme: WmeId) -> MatchResult<()> {
        match self.beta(node).kind.tag() {
            BetaTag::Join => self.join_right_activate(node, wme),
            BetaTag::Negative => self.negative_right_activate(node, wme),
            other => panic!("{} cannot be right-activated", other.node_name()),
        }
    }

    fn memory_left_activate(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let token = self.make_token(node, parent, wme, bindings);
        let BetaKind::Memory { tokens } = &mut self.beta_mut(node).kind else {
            unreachable!()
        };
        tokens.push(token);

        for child in self.beta(node).children.clone() {
            self.left_activate(child, token, None, Bindings::new())?;
        }
        Ok(())
    }

    fn join_left_activate(&mut self, node: NodeId, token: TokenId) -> MatchResult<()> {
        let BetaKind::Join { alpha_memory, tests, pattern } = &self.beta(node).kind else {
            unreachable!()
        };
        let (alpha_memory, tests, pattern) = (*alpha_memory, tests.clone(), pattern.clone());

        for wme in self.alpha_memory(alpha_memory).wmes.clone() {
            if self.perform_join_tests(&tests, token, wme) {
                let bindings = self.make_bindings(&pattern, wme);
                for child in self.beta(node).children.clone() {
                    self.left_activate(child, token, Some(wme), bindings.clone())?;
                }
            }
        }
        Ok(())
    }

    fn join_right_activate(&mut self, node: NodeId, wme: WmeId) -> MatchResult<()> {
        let BetaKind::Join { tests, pattern, .. } = &self.beta(node).kind else {
            unreachable!()
        };
        let (tests, pattern) = (tests.clone(), pattern.clone());
        let parent = self.beta(node).parent.expect("join node without parent");

        for token in self.memory_tokens(parent) {
            if self.perform_join_tests(&tests, token, wme) {
                let bindings = self.make_bindings(&pattern, wme);
                for child in self.beta(node).children.clone() {
                    self.left_activate(child, token, Some(wme), bindings.clone())?;
                }
            }
        }
        Ok(())
    }

    fn negative_left_activate(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let token = self.make_token(node, parent, wme, bindings);
        let BetaKind::Negative { alpha_memory, tests, tokens } = &mut self.beta_mut(node).kind
        else {
            unreachable!()
        };
        tokens.push(token);
        let (alpha_memory, tests) = (*alpha_memory, tests.clone());

        // The join tests run against the new token itself: the fact consumed
        // by this condition's predecessor rides on it.
        for candidate in self.alpha_memory(alpha_memory).wmes.clone() {
            if self.perform_join_tests(&tests, token, candidate) {
                self.link_negative_join_result(token, candidate);
            }
        }

        if self.token(token).join_results.is_empty() {
            for child in self.beta(node).children.clone() {
                self.left_activate(child, token, None, Bindings::new())?;
            }
        }
        Ok(())
    }

    fn negative_right_activate(&mut self, node: NodeId, wme: WmeId) -> MatchResult<()> {
        let BetaKind::Negative { tests, tokens, .. } = &self.beta(node).kind else {
            unreachable!()
        };
        let (tests, tokens) = (tests.clone(), tokens.clone());

        for token in tokens {
            if !self.tokens.contains_key(&token) {
                continue;
            }
            if self.perform_join_tests(&tests, token, wme) {
                // A token that had propagated is newly blocked: retract its
                // downstream matches but keep the token so a later
                // retraction of `wme` can re-propagate it.
                if self.token(token).join_results.is_empty() {
                    self.delete_descendants(token)?;
                }
                self.link_negative_join_result(token, wme);
            }
        }
        Ok(())
    }

    fn ncc_left_activate(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let token = self.make_token(node, parent, wme, bindings);
        let BetaKind::Ncc { tokens, partner } = &mut self.beta_mut(node).kind else {
            unreachable!()
        };
        tokens.push(token);
        let partner = *partner;

        // Drain every sub-match the partner buffered for this outer match;
        // the sub-network ran first because it was installed first.
        let buffered = {
            let BetaKind::NccPartner { buffer, .. } = &mut self.beta_mut(partner).kind else {
                unreachable!()
            };
            std::mem::take(buffer)
        };
        for result in buffered {
            self.token_mut(token).ncc_results.push(result);
            self.token_mut(result).owner = Some(token);
        }

        if self.token(token).ncc_results.is_empty() {
            for child in self.beta(node).children.clone() {
                self.left_activate(child, token, None, Bindings::new())?;
            }
        }
        Ok(())
    }

    fn partner_left_activate(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let BetaKind::NccPartner { ncc, subconditions, .. } = &self.beta(node).kind else {
            unreachable!()
        };
        let (ncc, subconditions) = (*ncc, *subconditions);

        let result = self.make_token(node, parent, wme, bindings);

        // Walk up one token per sub-condition to find the outer partial
        // match this sub-match extends.
        let mut owner_token = parent;
        let mut owner_wme = wme;
        for _ in 0..subconditions {
            owner_wme = self.token(owner_token).wme;
            owner_token = self
                .token(owner_token)
                .parent
                .expect("ncc owner walk escaped the token tree");
        }

        let BetaKind::Ncc { tokens, .. } = &self.beta(ncc).kind else {
            unreachable!()
        };
        let owner = tokens
            .iter()
            .copied()
            .find(|&t| {
                let t = self.token(t);
                t.parent == Some(owner_token) && t.wme == owner_wme
            });

        match owner {
            Some(owner) => {
                // The outer match is newly blocked.
                self.token_mut(owner).ncc_results.push(result);
                self.token_mut(result).owner = Some(owner);
                self.delete_descendants(owner)?;
            }
            None => {
                // The corresponding NCC activation has not happened yet.
                let BetaKind::NccPartner { buffer, .. } = &mut self.beta_mut(node).kind else {
                    unreachable!()
                };
                buffer.push(result);
            }
        }
        Ok(())
    }

    fn filter_left_activate(
        &mut self,
        node: NodeId,
        token: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let BetaKind::Filter { template } = &self.beta(node).kind else {
            unreachable!()
        };
        let template = template.clone();

        let value = self.evaluate_template(&template, token, &bindings)?;
        if value.is_truthy() {
            for child in self.beta(node).children.clone() {
                self.left_activate(child, token, wme, bindings.clone())?;
            }
        }
        Ok(())
    }

    fn bind_left_activate(
        &mut self,
        node: NodeId,
        token: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> MatchResult<()> {
        let BetaKind::Bind { template, variable } = &self.beta(node).kind else {
            unreachable!()
        };
        let (template, variable) = (template.clone(), variable.clone());

        let value = self.evaluate_template(&template, token, &bindings)?;

        // Propagate a copy so sibling activations never observe the binding.
        let mut extended = bindings;
        extended.insert(variable, value);
        for child in self.beta(node).children.clone() {
            self.left_activate(child, token, wme, extended.clone())?;
        }
        Ok(())
    }

    fn production_left_activate(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) {
        let token = self.make_token(node, parent, wme, bindings);
        trace!(node, token, "production match");
        let BetaKind::Production { tokens, .. } = &mut self.beta_mut(node).kind else {
            unreachable!()
        };
        tokens.push(token);
    }

    /// Substitute the merged binding environment into a template and hand it
    /// to the evaluator.
    fn evaluate_template(
        &self,
        template: &str,
        token: TokenId,
        local: &Bindings,
    ) -> MatchResult<Value> {
        let mut environment = self.merged_bindings(token);
        for (name, value) in local {
            environment.insert(name.clone(), value.clone());
        }
        let code = trellis_eval::substitute(template, &environment);
        self.evaluator
            .eval(&code)
            .map_err(|err| MatchError::evaluation(code.clone(), &err))
    }

    /// Allocate a token and wire it into its parent's children list and its
    /// fact's token list. The caller stores it in the owning node's memory
    /// where the node kind has one.
    pub(crate) fn make_token(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: Bindings,
    ) -> TokenId {
        let id = self.new_token_id();
        self.tokens.insert(
            id,
            Token {
                id,
                parent: Some(parent),
                wme,
                node,
                bindings,
                children: Vec::new(),
                join_results: Vec::new(),
                ncc_results: Vec::new(),
                owner: None,
            },
        );
        self.token_mut(parent).children.push(id);
        if let Some(wme) = wme {
            self.wme_mut(wme).tokens.push(id);
        }
        id
    }

    fn link_negative_join_result(&mut self, owner: TokenId, wme: WmeId) {
        let id = self.new_join_result_id();
        self.join_results
            .insert(id, NegativeJoinResult { owner, wme });
        self.token_mut(owner).join_results.push(id);
        self.wme_mut(wme).negative_join_results.push(id);
    }

    /// Run a node's join tests between a token and a candidate fact.
    pub(crate) fn perform_join_tests(
        &self,
        tests: &[JoinTest],
        token: TokenId,
        wme: WmeId,
    ) -> bool {
        if tests.is_empty() {
            return true;
        }
        let chain = self.token_wme_chain(token);
        for test in tests {
            let candidate = self.wme(wme).triple.field(test.wme_field);
            let ancestor = chain
                .get(test.ancestor)
                .copied()
                .flatten()
                .unwrap_or_else(|| {
                    panic!("join test references empty wmes-list slot {}", test.ancestor)
                });
            if candidate != self.wme(ancestor).triple.field(test.ancestor_field) {
                return false;
            }
        }
        true
    }

    /// The token's wmes-list: contributing facts from the oldest non-root
    /// ancestor down to the token itself, with `None` at positions consumed
    /// by negated or compound-negated conditions.
    pub(crate) fn token_wme_chain(&self, token: TokenId) -> Vec<Option<WmeId>> {
        let mut chain = Vec::new();
        let mut current = token;
        loop {
            let entry = self.token(current);
            chain.push(entry.wme);
            match entry.parent {
                Some(parent) if parent != self.root_token => current = parent,
                _ => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Bindings contributed by a positive condition for a matched fact:
    /// every variable field maps to the fact's symbol at that field.
    pub(crate) fn make_bindings(&self, pattern: &Triple, wme: WmeId) -> Bindings {
        let triple = &self.wme(wme).triple;
        pattern
            .variables()
            .map(|(field, variable)| (variable.clone(), Value::from(triple.field(field))))
            .collect()
    }

    /// The union of local bindings along the token's parent chain, nearer
    /// tokens overriding farther ones.
    pub(crate) fn merged_bindings(&self, token: TokenId) -> Bindings {
        let mut chain = Vec::new();
        let mut current = Some(token);
        while let Some(id) = current {
            chain.push(id);
            current = self.token(id).parent;
        }

        let mut environment = Bindings::new();
        for id in chain.into_iter().rev() {
            for (name, value) in &self.token(id).bindings {
                environment.insert(name.clone(), value.clone());
            }
        }
        environment
    }

    fn memory_tokens(&self, node: NodeId) -> Vec<TokenId> {
        match &self.beta(node).kind {
            BetaKind::Memory { tokens } => tokens.clone(),
            other => panic!("{} has no token memory", other.tag().node_name()),
        }
    }
}
