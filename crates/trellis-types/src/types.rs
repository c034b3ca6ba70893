use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A value occupying one field of a triple.
///
/// A symbol whose textual form begins with `$` is a *variable*; every other
/// symbol is a *constant*. Symbols compare, hash and order by their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True iff this symbol names a rule variable (`$x`, `$item`, ...).
    pub fn is_variable(&self) -> bool {
        self.0.starts_with('$')
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for Symbol {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raised when a textual field name is not one of the three triple fields.
#[derive(Debug, Clone, Error)]
#[error("unknown field '{0}': expected identifier, attribute or value")]
pub struct UnknownFieldError(pub String);

/// One of the three positions of a triple.
///
/// The order of [`Field::ALL`] is the canonical order in which constant
/// tests are laid out in the alpha network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Identifier,
    Attribute,
    Value,
}

impl Field {
    /// Canonical field order: identifier, attribute, value.
    pub const ALL: [Field; 3] = [Field::Identifier, Field::Attribute, Field::Value];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Identifier => "identifier",
            Field::Attribute => "attribute",
            Field::Value => "value",
        }
    }
}

impl FromStr for Field {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identifier" => Ok(Field::Identifier),
            "attribute" => Ok(Field::Attribute),
            "value" => Ok(Field::Value),
            other => Err(UnknownFieldError(other.to_string())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subject/attribute/value triple.
///
/// Ground facts are triples of constants; condition patterns may put a
/// variable in any field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub identifier: Symbol,
    pub attribute: Symbol,
    pub value: Symbol,
}

impl Triple {
    pub fn new(
        identifier: impl Into<Symbol>,
        attribute: impl Into<Symbol>,
        value: impl Into<Symbol>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// The symbol at `field`.
    pub fn field(&self, field: Field) -> &Symbol {
        match field {
            Field::Identifier => &self.identifier,
            Field::Attribute => &self.attribute,
            Field::Value => &self.value,
        }
    }

    /// Variable occurrences in canonical field order.
    pub fn variables(&self) -> impl Iterator<Item = (Field, &Symbol)> {
        Field::ALL
            .into_iter()
            .map(|f| (f, self.field(f)))
            .filter(|(_, s)| s.is_variable())
    }

    /// Constant occurrences in canonical field order; the alpha-network test
    /// path for this pattern.
    pub fn constants(&self) -> impl Iterator<Item = (Field, &Symbol)> {
        Field::ALL
            .into_iter()
            .map(|f| (f, self.field(f)))
            .filter(|(_, s)| !s.is_variable())
    }

    /// The first field holding exactly `symbol`, if any.
    pub fn position_of(&self, symbol: &Symbol) -> Option<Field> {
        Field::ALL.into_iter().find(|f| self.field(*f) == symbol)
    }

    /// True iff every constant field of this pattern equals the
    /// corresponding field of the ground triple `fact`.
    pub fn matches(&self, fact: &Triple) -> bool {
        Field::ALL.into_iter().all(|f| {
            let own = self.field(f);
            own.is_variable() || own == fact.field(f)
        })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} ^{} {})", self.identifier, self.attribute, self.value)
    }
}

/// One condition of a rule's left-hand side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Positive pattern: the working set must contain a matching fact.
    Has(Triple),
    /// Negated pattern: the working set must not contain a matching fact
    /// consistent with the current partial match.
    Neg(Triple),
    /// Compound negation: succeeds iff the enclosed conjunction has no match
    /// extending the current partial match.
    Ncc(Vec<Condition>),
    /// Expression predicate over the current bindings.
    Filter { template: String },
    /// Expression assignment: evaluates the template and binds the result.
    Bind { template: String, variable: Symbol },
}

impl Condition {
    pub fn has(
        identifier: impl Into<Symbol>,
        attribute: impl Into<Symbol>,
        value: impl Into<Symbol>,
    ) -> Self {
        Condition::Has(Triple::new(identifier, attribute, value))
    }

    pub fn neg(
        identifier: impl Into<Symbol>,
        attribute: impl Into<Symbol>,
        value: impl Into<Symbol>,
    ) -> Self {
        Condition::Neg(Triple::new(identifier, attribute, value))
    }

    pub fn ncc(conditions: impl Into<Vec<Condition>>) -> Self {
        Condition::Ncc(conditions.into())
    }

    pub fn filter(template: impl Into<String>) -> Self {
        Condition::Filter { template: template.into() }
    }

    pub fn bind(template: impl Into<String>, variable: impl Into<Symbol>) -> Self {
        Condition::Bind { template: template.into(), variable: variable.into() }
    }

    /// True for the condition kinds that contribute a token to a partial
    /// match chain. Filter and bind conditions pass tokens through unchanged.
    pub fn creates_token(&self) -> bool {
        matches!(
            self,
            Condition::Has(_) | Condition::Neg(_) | Condition::Ncc(_)
        )
    }
}

/// An ordered conjunction of conditions.
///
/// Order is significant: it fixes the join plan and the set of bindings
/// visible to later filter, bind and compound-negation conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

impl Rule {
    pub fn new(conditions: impl Into<Vec<Condition>>) -> Self {
        Self { conditions: conditions.into() }
    }
}

impl FromIterator<Condition> for Rule {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self { conditions: iter.into_iter().collect() }
    }
}

/// Opaque right-hand-side attributes, carried through to the production node
/// untouched.
pub type Rhs = HashMap<String, String>;

/// Possible values produced by expression evaluation and stored in binding
/// environments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Null value
    Null,
}

impl Value {
    /// Truthiness used by filter conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
        }
    }
}

/// The string form substituted into expression templates. Strings render
/// without quoting; substitution is purely lexical.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&Symbol> for Value {
    fn from(s: &Symbol) -> Self {
        Value::String(s.as_str().to_string())
    }
}

// -------------------------------------------------------------------------
// Conversions between `Value` and `serde_json::Value`, so callers can move
// binding environments across an API boundary without hand-written mapping.
// -------------------------------------------------------------------------

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Integer(i) => Self::Number(serde_json::Number::from(i)),
            Value::Float(x) => serde_json::Number::from_f64(x).map_or(Self::Null, Self::Number),
            Value::Boolean(b) => Self::Bool(b),
            Value::Null => Self::Null,
        }
    }
}

/// Raised when a JSON value has no `Value` counterpart.
#[derive(Debug, Clone, Error)]
#[error("cannot convert JSON value: {0}")]
pub struct ValueConversionError(pub String);

impl TryFrom<&serde_json::Value> for Value {
    type Error = ValueConversionError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(x) = n.as_f64() {
                    Self::Float(x)
                } else {
                    return Err(ValueConversionError(format!("unsupported number: {n}")));
                }
            }
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Null => Self::Null,
            other => return Err(ValueConversionError(format!("unsupported value: {other}"))),
        })
    }
}

/// A variable-binding environment: the values of rule variables in one
/// partial match.
pub type Bindings = HashMap<Symbol, Value>;
