//! Expression evaluator for the built-in language.
//!
//! Evaluates parsed AST expressions to [`Value`]s with numeric cross-type
//! promotion and checked division.

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use anyhow::{Result, anyhow};
use trellis_types::Value;

/// Evaluate an expression to a single value.
pub fn evaluate(expr: &Expression) -> Result<Value> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),

        Expression::UnaryOp { operator, operand } => {
            let operand = evaluate(operand)?;
            evaluate_unary_op(*operator, &operand)
        }

        Expression::BinaryOp { left, operator, right } => {
            let left = evaluate(left)?;
            let right = evaluate(right)?;
            evaluate_binary_op(&left, *operator, &right)
        }
    }
}

fn evaluate_binary_op(left: &Value, operator: BinaryOperator, right: &Value) -> Result<Value> {
    use {BinaryOperator::*, Value::*};

    match (left, right, operator) {
        // Integer arithmetic
        (Integer(a), Integer(b), Add) => Ok(Integer(a + b)),
        (Integer(a), Integer(b), Subtract) => Ok(Integer(a - b)),
        (Integer(a), Integer(b), Multiply) => Ok(Integer(a * b)),
        (Integer(a), Integer(b), Divide) => {
            if *b == 0 {
                Err(anyhow!("division by zero"))
            } else {
                Ok(Integer(a / b))
            }
        }
        (Integer(a), Integer(b), Modulo) => {
            if *b == 0 {
                Err(anyhow!("modulo by zero"))
            } else {
                Ok(Integer(a % b))
            }
        }

        // Float arithmetic
        (Float(a), Float(b), Add) => Ok(Float(a + b)),
        (Float(a), Float(b), Subtract) => Ok(Float(a - b)),
        (Float(a), Float(b), Multiply) => Ok(Float(a * b)),
        (Float(a), Float(b), Divide) => {
            if *b == 0.0 {
                Err(anyhow!("division by zero"))
            } else {
                Ok(Float(a / b))
            }
        }
        (Float(a), Float(b), Modulo) => Ok(Float(a % b)),

        // Integer comparisons
        (Integer(a), Integer(b), Equal) => Ok(Boolean(a == b)),
        (Integer(a), Integer(b), NotEqual) => Ok(Boolean(a != b)),
        (Integer(a), Integer(b), LessThan) => Ok(Boolean(a < b)),
        (Integer(a), Integer(b), LessThanOrEqual) => Ok(Boolean(a <= b)),
        (Integer(a), Integer(b), GreaterThan) => Ok(Boolean(a > b)),
        (Integer(a), Integer(b), GreaterThanOrEqual) => Ok(Boolean(a >= b)),

        // Float comparisons
        (Float(a), Float(b), Equal) => Ok(Boolean((a - b).abs() < f64::EPSILON)),
        (Float(a), Float(b), NotEqual) => Ok(Boolean((a - b).abs() >= f64::EPSILON)),
        (Float(a), Float(b), LessThan) => Ok(Boolean(a < b)),
        (Float(a), Float(b), LessThanOrEqual) => Ok(Boolean(a <= b)),
        (Float(a), Float(b), GreaterThan) => Ok(Boolean(a > b)),
        (Float(a), Float(b), GreaterThanOrEqual) => Ok(Boolean(a >= b)),

        // Mixed numeric operations promote to float
        (Integer(a), Float(_), op) => evaluate_binary_op(&Float(*a as f64), op, right),
        (Float(_), Integer(b), op) => evaluate_binary_op(left, op, &Float(*b as f64)),

        // String operations
        (String(a), String(b), Equal) => Ok(Boolean(a == b)),
        (String(a), String(b), NotEqual) => Ok(Boolean(a != b)),
        (String(a), String(b), LessThan) => Ok(Boolean(a < b)),
        (String(a), String(b), LessThanOrEqual) => Ok(Boolean(a <= b)),
        (String(a), String(b), GreaterThan) => Ok(Boolean(a > b)),
        (String(a), String(b), GreaterThanOrEqual) => Ok(Boolean(a >= b)),
        (String(a), String(b), Add) => Ok(String(format!("{a}{b}"))),

        // Boolean operations
        (Boolean(a), Boolean(b), Equal) => Ok(Boolean(a == b)),
        (Boolean(a), Boolean(b), NotEqual) => Ok(Boolean(a != b)),
        (Boolean(a), Boolean(b), And) => Ok(Boolean(*a && *b)),
        (Boolean(a), Boolean(b), Or) => Ok(Boolean(*a || *b)),

        // Null comparisons
        (Null, Null, Equal) => Ok(Boolean(true)),
        (Null, Null, NotEqual) => Ok(Boolean(false)),
        (Null, _, Equal) | (_, Null, Equal) => Ok(Boolean(false)),
        (Null, _, NotEqual) | (_, Null, NotEqual) => Ok(Boolean(true)),

        // Cross-type equality
        (a, b, Equal) if std::mem::discriminant(a) != std::mem::discriminant(b) => {
            Ok(Boolean(false))
        }
        (a, b, NotEqual) if std::mem::discriminant(a) != std::mem::discriminant(b) => {
            Ok(Boolean(true))
        }

        _ => Err(anyhow!(
            "unsupported operation: {left:?} {operator:?} {right:?}"
        )),
    }
}

fn evaluate_unary_op(operator: UnaryOperator, operand: &Value) -> Result<Value> {
    use {UnaryOperator::*, Value::*};

    match (operator, operand) {
        (Negate, Integer(i)) => Ok(Integer(-i)),
        (Negate, Float(x)) => Ok(Float(-x)),
        (Not, Boolean(b)) => Ok(Boolean(!b)),
        (Not, Null) => Ok(Boolean(true)),
        _ => Err(anyhow!("unsupported unary operation: {operator:?} {operand:?}")),
    }
}
