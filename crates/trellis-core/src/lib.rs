#![deny(warnings)]
//! # Trellis Core - Incremental Rete Matching over Triple Facts
//!
//! Trellis maintains, for every compiled rule, the set of variable-binding
//! tuples that satisfy it. Facts are `(identifier, attribute, value)`
//! triples; rules are ordered conjunctions of positive, negated,
//! compound-negated, filter and bind conditions. Assertion and retraction
//! are incremental: match sets update without re-evaluating rules from
//! scratch.
//!
//! ## Architecture
//!
//! ```text
//! Facts → Alpha network → Alpha memories → Beta network → Productions
//!   ↓      constant          shared           joins,        match
//!  WM       tests           fact sets       negation,       sets
//!                                          filter/bind
//! ```
//!
//! - The **alpha network** is a discrimination tree of single-field constant
//!   tests; conditions with equal tests share one alpha memory.
//! - The **beta network** joins partial matches across conditions: beta
//!   memories hold tokens, join nodes inner-join against alpha memories,
//!   negative nodes antijoin, NCC pairs negate whole conjunctions, and
//!   filter/bind nodes evaluate expression templates inline.
//! - Retraction cascades through the same structure, unhooking every
//!   back-reference and re-propagating tokens that lose their blockers.
//!
//! ## Quick start
//!
//! ```rust
//! use trellis_core::{Network, Condition, Rule, Triple};
//!
//! let mut network = Network::new();
//! let rule = Rule::new(vec![
//!     Condition::has("$x", "on", "$y"),
//!     Condition::has("$y", "left-of", "$z"),
//! ]);
//! let production = network.add_production(&rule, Default::default())?;
//!
//! network.add_wme(Triple::new("B1", "on", "B2"))?;
//! network.add_wme(Triple::new("B2", "left-of", "B3"))?;
//! assert_eq!(network.match_count(production), 1);
//! # Ok::<(), trellis_core::MatchError>(())
//! ```
//!
//! The network is single-threaded: one instance owns all of its state, and
//! operations run synchronously to completion.

/// Alpha network: constant-test tree and alpha memories
pub mod alpha_memory;
/// Beta network: nodes and activation semantics
pub mod beta_network;
/// Graphviz dump of the network topology
pub mod dump;
/// Structured errors for network operations
pub mod error;
/// Network construction, fact maintenance and introspection
pub mod rete_network;
/// Arena entries and cross-reference records
pub mod types;
/// XML rule source reader
pub mod xml;

pub use beta_network::{BetaKind, BetaNode};
pub use error::{MatchError, MatchResult};
pub use rete_network::Network;
pub use types::{
    AlphaMemoryId, JoinResultId, JoinTest, NetworkStats, NodeId, TestNodeId, TokenId, WmeId,
};
pub use xml::parse_rules;

// The shared data model and the evaluator seam, re-exported for callers.
pub use trellis_eval::{DslEvaluator, Evaluator};
pub use trellis_types::{Bindings, Condition, Field, Rhs, Rule, Symbol, Triple, Value};
