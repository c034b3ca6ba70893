#![deny(warnings)]
//! Expression evaluation for Trellis filter and bind conditions.
//!
//! Filter and bind conditions carry textual templates such as `$x>100`.
//! Before evaluation the network substitutes every `$name` occurrence with
//! the string form of the corresponding bound value; the result is handed to
//! an [`Evaluator`]. The evaluator is a strategy seam: the built-in
//! [`DslEvaluator`] compiles a small, side-effect-free expression language,
//! and callers with richer needs can plug in their own implementation.

pub mod ast;
pub mod evaluator;
pub mod parser;

use anyhow::Result;
use ast::Expression;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use trellis_types::{Bindings, Symbol, Value};

/// Evaluates an expression string to a value.
///
/// The string has already had its variables substituted; implementations
/// must be pure over their input. Failures propagate unchanged out of the
/// network operation that triggered the evaluation.
pub trait Evaluator: fmt::Debug {
    fn eval(&self, expression: &str) -> Result<Value>;
}

/// Substitute every `$name` occurrence in `template` with the string form of
/// its bound value.
///
/// Substitution is purely lexical: at each `$`, the longest binding key that
/// prefixes the remaining text is replaced; if no binding matches, the text
/// is left untouched for the evaluator to reject. No quoting is performed.
pub fn substitute(template: &str, bindings: &Bindings) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(at) = rest.find('$') {
        result.push_str(&rest[..at]);
        rest = &rest[at..];

        let mut matched: Option<(&Symbol, &Value)> = None;
        for (name, value) in bindings {
            if rest.starts_with(name.as_str())
                && matched.is_none_or(|(best, _)| name.as_str().len() > best.as_str().len())
            {
                matched = Some((name, value));
            }
        }

        match matched {
            Some((name, value)) => {
                result.push_str(&value.to_string());
                rest = &rest[name.as_str().len()..];
            }
            None => {
                result.push('$');
                rest = &rest[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// The built-in evaluator: compiles templates to ASTs with a per-instance
/// expression cache and evaluates them with checked arithmetic.
#[derive(Debug, Default)]
pub struct DslEvaluator {
    cache: RefCell<HashMap<String, Expression>>,
}

impl DslEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, expression: &str) -> Result<Expression> {
        if let Some(cached) = self.cache.borrow().get(expression) {
            return Ok(cached.clone());
        }
        let parsed = parser::parse_expression(expression)?;
        self.cache
            .borrow_mut()
            .insert(expression.to_string(), parsed.clone());
        Ok(parsed)
    }
}

impl Evaluator for DslEvaluator {
    fn eval(&self, expression: &str) -> Result<Value> {
        let compiled = self.compile(expression)?;
        evaluator::evaluate(&compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(name, value)| (Symbol::from(*name), value.clone()))
            .collect()
    }

    #[test]
    fn substitution_is_lexical_and_unquoted() {
        let env = bindings(&[("$x", Value::from("150"))]);
        assert_eq!(substitute("$x>100", &env), "150>100");
    }

    #[test]
    fn longest_binding_wins_on_shared_prefixes() {
        let env = bindings(&[
            ("$x", Value::from(1i64)),
            ("$xy", Value::from(2i64)),
        ]);
        assert_eq!(substitute("$xy+$x", &env), "2+1");
    }

    #[test]
    fn unbound_variables_are_left_verbatim() {
        let env = bindings(&[("$x", Value::from(1i64))]);
        assert_eq!(substitute("$x+$missing", &env), "1+$missing");
    }

    #[test]
    fn evaluator_caches_and_evaluates() {
        let evaluator = DslEvaluator::new();
        assert_eq!(evaluator.eval("150>100").unwrap(), Value::Boolean(true));
        // Second evaluation hits the compile cache.
        assert_eq!(evaluator.eval("150>100").unwrap(), Value::Boolean(true));
        assert!(evaluator.eval("$x>100").is_err());
    }
}
