//! Tokenizer and recursive-descent parser for the expression language.
//!
//! The grammar is deliberately small: literals, unary `-`/`!`, arithmetic,
//! comparisons, `&&`/`||` and parentheses. Anything else is a parse error so
//! that a bad template fails loudly instead of matching silently.

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use anyhow::{Result, anyhow, bail};
use trellis_types::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !is_float {
                        is_float = true;
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    tokens.push(Token::Float(text.parse()?));
                } else {
                    tokens.push(Token::Integer(text.parse()?));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => bail!("unterminated string literal"),
                        },
                        Some(d) if d == quote => break,
                        Some(d) => text.push(d),
                        None => bail!("unterminated string literal"),
                    }
                }
                tokens.push(Token::Str(text));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut word = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        word.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    other => bail!("unknown identifier '{other}' in expression"),
                }
            }
            '$' => bail!("unbound variable in expression: {input}"),
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::EqEq),
                    _ => bail!("expected '==' in expression"),
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::LtEq);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some('&') => tokens.push(Token::AndAnd),
                    _ => bail!("expected '&&' in expression"),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some('|') => tokens.push(Token::OrOr),
                    _ => bail!("expected '||' in expression"),
                }
            }
            other => bail!("unexpected character '{other}' in expression"),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        let mut left = self.parse_comparison()?;
        loop {
            let operator = match self.peek() {
                Some(Token::EqEq) => BinaryOperator::Equal,
                Some(Token::NotEq) => BinaryOperator::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Lt) => BinaryOperator::LessThan,
                Some(Token::LtEq) => BinaryOperator::LessThanOrEqual,
                Some(Token::Gt) => BinaryOperator::GreaterThan,
                Some(Token::GtEq) => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Star) => BinaryOperator::Multiply,
                Some(Token::Slash) => BinaryOperator::Divide,
                Some(Token::Percent) => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                operator: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }
        if self.eat(&Token::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                operator: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.advance() {
            Some(Token::Integer(i)) => Ok(Expression::Literal(Value::Integer(i))),
            Some(Token::Float(x)) => Ok(Expression::Literal(Value::Float(x))),
            Some(Token::Str(s)) => Ok(Expression::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expression::Literal(Value::Boolean(true))),
            Some(Token::False) => Ok(Expression::Literal(Value::Boolean(false))),
            Some(Token::Null) => Ok(Expression::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    bail!("expected ')' in expression");
                }
                Ok(inner)
            }
            other => Err(anyhow!("unexpected token in expression: {other:?}")),
        }
    }
}

/// Parse a complete expression string into an AST.
pub fn parse_expression(input: &str) -> Result<Expression> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        bail!("empty expression");
    }
    let mut parser = Parser { tokens, position: 0 };
    let expression = parser.parse_or()?;
    if parser.position != parser.tokens.len() {
        bail!("trailing tokens in expression: {input}");
    }
    Ok(expression)
}
