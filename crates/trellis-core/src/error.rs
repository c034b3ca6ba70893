//! Error handling for network operations.
//!
//! Every recoverable failure at this layer indicates a bug in the caller or
//! in a rule, so the variants carry enough structure to point back at the
//! offending input. Invariant violations inside the network (detaching an
//! unknown child, following a dangling arena id) are programmer errors and
//! fail fast with a panic instead of surfacing here.

use thiserror::Error;
use trellis_types::UnknownFieldError;

/// Error type for rule compilation, fact maintenance and rule parsing.
#[derive(Error, Debug, Clone)]
pub enum MatchError {
    /// A textual field name is not one of identifier/attribute/value.
    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    /// A rule or rule element is structurally invalid.
    #[error("rule format error: {message}")]
    RuleFormat { message: String },

    /// The expression evaluator rejected a substituted filter/bind template.
    /// The network state up to the failure point is preserved.
    #[error("evaluation error: {message}")]
    Evaluation {
        message: String,
        expression: Option<String>,
    },

    /// The XML rule source could not be read.
    #[error("rule source error: {message}")]
    XmlSource { message: String },
}

impl MatchError {
    /// Error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            MatchError::UnknownField { .. } => "unknown_field",
            MatchError::RuleFormat { .. } => "rule_format",
            MatchError::Evaluation { .. } => "evaluation",
            MatchError::XmlSource { .. } => "xml_source",
        }
    }

    pub fn rule_format(message: impl Into<String>) -> Self {
        MatchError::RuleFormat { message: message.into() }
    }

    pub fn evaluation(expression: impl Into<String>, source: &anyhow::Error) -> Self {
        MatchError::Evaluation {
            message: source.to_string(),
            expression: Some(expression.into()),
        }
    }

    pub fn xml(message: impl Into<String>) -> Self {
        MatchError::XmlSource { message: message.into() }
    }
}

impl From<UnknownFieldError> for MatchError {
    fn from(err: UnknownFieldError) -> Self {
        MatchError::UnknownField { name: err.0 }
    }
}

/// Convenient result alias for network operations.
pub type MatchResult<T> = Result<T, MatchError>;
