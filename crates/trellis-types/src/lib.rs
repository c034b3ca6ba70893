#![deny(warnings)]
//! Shared data model for the Trellis triple matcher.
//!
//! This crate defines the vocabulary every other Trellis crate speaks:
//! [`Symbol`]s and [`Field`]s, ground [`Triple`]s, rule [`Condition`]s, and
//! the [`Value`] type produced by expression evaluation. It carries no
//! matching logic of its own.

/// Core types and conversions
pub mod types;

pub use types::{
    Bindings, Condition, Field, Rhs, Rule, Symbol, Triple, UnknownFieldError, Value,
    ValueConversionError,
};
