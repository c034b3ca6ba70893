//! XML rule source reader.
//!
//! A recognized document has a root element containing `production`
//! elements; each production has a left-hand-side element followed by a
//! right-hand-side element. Inside the left-hand side the recognized tags
//! are `has`, `neg`, `filter`, `bind` and (recursively) `ncc`. Right-hand
//! sides are captured as an opaque attribute map and stored on the
//! production node untouched.

use crate::error::{MatchError, MatchResult};
use crate::rete_network::Network;
use crate::types::NodeId;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use trellis_types::{Condition, Field, Rhs, Rule, Triple};

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

fn element_from(start: &BytesStart<'_>) -> MatchResult<Element> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MatchError::xml(e.to_string()))?;
        element.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            String::from_utf8_lossy(&attr.value).into_owned(),
        ));
    }
    Ok(element)
}

fn resolve_entity(name: &[u8]) -> MatchResult<char> {
    match name {
        b"lt" => Ok('<'),
        b"gt" => Ok('>'),
        b"amp" => Ok('&'),
        b"apos" => Ok('\''),
        b"quot" => Ok('"'),
        _ => {
            let text = String::from_utf8_lossy(name);
            if let Some(digits) = text.strip_prefix('#') {
                let code = if let Some(hex) = digits.strip_prefix('x') {
                    u32::from_str_radix(hex, 16)
                } else {
                    digits.parse()
                };
                if let Some(c) = code.ok().and_then(char::from_u32) {
                    return Ok(c);
                }
            }
            Err(MatchError::xml(format!("unsupported entity reference '&{text};'")))
        }
    }
}

/// Read the document into a minimal element tree via the raw event stream.
fn read_document(content: &str) -> MatchResult<Element> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(MatchError::xml(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => stack.push(element_from(&e)?),
            Ok(Event::Empty(e)) => {
                let element = element_from(&e)?;
                stack.last_mut().expect("document frame").children.push(element);
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().expect("document frame");
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Err(MatchError::xml("unbalanced closing tag")),
                }
            }
            Ok(Event::Text(t)) => {
                let top = stack.last_mut().expect("document frame");
                top.text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::CData(t)) => {
                let top = stack.last_mut().expect("document frame");
                top.text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::GeneralRef(e)) => {
                let top = stack.last_mut().expect("document frame");
                top.text.push(resolve_entity(e.as_ref())?);
            }
            Ok(_) => {}
        }
        buf.clear();
    }

    let mut document = stack.pop().expect("document frame");
    if !stack.is_empty() {
        return Err(MatchError::xml("unclosed element at end of document"));
    }
    if document.children.len() != 1 {
        return Err(MatchError::xml("expected exactly one root element"));
    }
    Ok(document.children.remove(0))
}

fn triple_from(element: &Element) -> MatchResult<Triple> {
    let mut identifier = None;
    let mut attribute = None;
    let mut value = None;
    for (key, val) in &element.attributes {
        match key.parse::<Field>()? {
            Field::Identifier => identifier = Some(val.clone()),
            Field::Attribute => attribute = Some(val.clone()),
            Field::Value => value = Some(val.clone()),
        }
    }
    let missing = |field: &str| {
        MatchError::rule_format(format!("'{}' element missing '{field}'", element.name))
    };
    Ok(Triple::new(
        identifier.ok_or_else(|| missing("identifier"))?,
        attribute.ok_or_else(|| missing("attribute"))?,
        value.ok_or_else(|| missing("value"))?,
    ))
}

fn parse_conditions(element: &Element) -> MatchResult<Vec<Condition>> {
    let mut conditions = Vec::new();
    for item in &element.children {
        match item.name.as_str() {
            "has" => conditions.push(Condition::Has(triple_from(item)?)),
            "neg" => conditions.push(Condition::Neg(triple_from(item)?)),
            "filter" => conditions.push(Condition::filter(item.text.clone())),
            "bind" => {
                let to = item
                    .attributes
                    .iter()
                    .find(|(key, _)| key == "to")
                    .map(|(_, val)| val.clone())
                    .ok_or_else(|| {
                        MatchError::rule_format("'bind' element missing 'to' attribute")
                    })?;
                conditions.push(Condition::bind(item.text.clone(), to));
            }
            "ncc" => conditions.push(Condition::Ncc(parse_conditions(item)?)),
            other => {
                return Err(MatchError::xml(format!(
                    "unrecognized condition element '{other}'"
                )));
            }
        }
    }
    Ok(conditions)
}

/// Parse a rule document into `(left-hand side, right-hand-side attributes)`
/// pairs in document order.
pub fn parse_rules(content: &str) -> MatchResult<Vec<(Rule, Rhs)>> {
    let root = read_document(content)?;
    let mut rules = Vec::new();
    for production in &root.children {
        if production.name != "production" {
            return Err(MatchError::xml(format!(
                "unexpected element '{}' in rule document",
                production.name
            )));
        }
        if production.children.len() < 2 {
            return Err(MatchError::rule_format(
                "a production needs a left-hand side and a right-hand side",
            ));
        }
        let conditions = parse_conditions(&production.children[0])?;
        let rhs: Rhs = production.children[1].attributes.iter().cloned().collect();
        rules.push((Rule::new(conditions), rhs));
    }
    Ok(rules)
}

impl Network {
    /// Parse a rule document and compile every production it contains,
    /// returning the production nodes in document order.
    pub fn add_productions_from_xml(&mut self, content: &str) -> MatchResult<Vec<NodeId>> {
        let mut productions = Vec::new();
        for (rule, rhs) in parse_rules(content)? {
            productions.push(self.add_production(&rule, rhs)?);
        }
        Ok(productions)
    }
}
