//! Arena entries and cross-reference records for the matching network.
//!
//! The algorithm's back-references (fact↔memory, token↔fact, token↔parent,
//! ncc↔partner) are cyclic, so every category lives in its own typed arena
//! inside the [`Network`](crate::Network) and cross-references are stable
//! integer ids. Deletion is explicit list removal keyed by id.

use serde::Serialize;
use trellis_types::{Bindings, Field, Triple};

/// Unique identifier for an asserted fact.
pub type WmeId = u64;
/// Unique identifier for a partial-match token.
pub type TokenId = u64;
/// Unique identifier for a beta-network node.
pub type NodeId = u64;
/// Unique identifier for a constant-test node in the alpha tree.
pub type TestNodeId = u64;
/// Unique identifier for an alpha memory.
pub type AlphaMemoryId = u64;
/// Unique identifier for a negative-join result.
pub type JoinResultId = u64;

/// An asserted fact (working memory element) plus the back-references that
/// make retraction incremental: every alpha memory holding it, every token
/// built from it, and every negative-join result it participates in.
#[derive(Debug, Clone)]
pub struct Wme {
    pub id: WmeId,
    pub triple: Triple,
    pub(crate) alpha_memories: Vec<AlphaMemoryId>,
    pub(crate) tokens: Vec<TokenId>,
    pub(crate) negative_join_results: Vec<JoinResultId>,
}

impl Wme {
    pub(crate) fn new(id: WmeId, triple: Triple) -> Self {
        Self {
            id,
            triple,
            alpha_memories: Vec::new(),
            tokens: Vec::new(),
            negative_join_results: Vec::new(),
        }
    }
}

/// A node in the partial-match tree.
///
/// A token chains a parent token with one contributing fact (absent for
/// tokens created by negated or compound-negated conditions) and carries the
/// local variable bindings made by the join that produced it. The root token
/// has neither parent nor fact.
#[derive(Debug, Clone)]
pub struct Token {
    pub id: TokenId,
    pub parent: Option<TokenId>,
    pub wme: Option<WmeId>,
    /// The beta node whose memory owns this token.
    pub node: NodeId,
    pub bindings: Bindings,
    pub(crate) children: Vec<TokenId>,
    /// Used only on tokens held by negative nodes.
    pub(crate) join_results: Vec<JoinResultId>,
    /// Used only on tokens held by NCC nodes.
    pub(crate) ncc_results: Vec<TokenId>,
    /// Used only on NCC-partner result tokens.
    pub(crate) owner: Option<TokenId>,
}

/// A record that `wme` currently blocks `owner` at a negative node. Removed
/// when either side goes away or the join test ceases to hold.
#[derive(Debug, Clone, Copy)]
pub struct NegativeJoinResult {
    pub owner: TokenId,
    pub wme: WmeId,
}

/// A consistency test performed at join and negative nodes: the value of
/// `wme_field` on the candidate fact must equal the value of
/// `ancestor_field` on the fact at position `ancestor` of the candidate
/// token's wmes-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTest {
    pub wme_field: Field,
    pub ancestor: usize,
    pub ancestor_field: Field,
}

/// Live object counts for one network instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub facts: usize,
    pub tokens: usize,
    pub constant_tests: usize,
    pub alpha_memories: usize,
    pub beta_memories: usize,
    pub join_nodes: usize,
    pub negative_nodes: usize,
    pub ncc_pairs: usize,
    pub filter_nodes: usize,
    pub bind_nodes: usize,
    pub productions: usize,
}
