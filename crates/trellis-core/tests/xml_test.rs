//! Rule-source reader tests: document shape, recognized tags, RHS capture
//! and end-to-end compilation of parsed rules.

use trellis_core::{Condition, Network, parse_rules};

const DOCUMENT: &str = r#"
<rules>
  <production>
    <lhs>
      <has identifier="$x" attribute="on" value="$y"/>
      <has identifier="$y" attribute="left-of" value="$z"/>
      <neg identifier="$z" attribute="color" value="red"/>
    </lhs>
    <rhs action="advance" priority="1"/>
  </production>
  <production>
    <lhs>
      <has identifier="spu:1" attribute="price" value="$p"/>
      <filter>$p>100</filter>
      <bind to="$d">$p*2</bind>
      <ncc>
        <has identifier="spu:1" attribute="banned" value="$why"/>
      </ncc>
    </lhs>
    <rhs action="flag"/>
  </production>
</rules>
"#;

#[test]
fn parses_every_recognized_tag() {
    let rules = parse_rules(DOCUMENT).unwrap();
    assert_eq!(rules.len(), 2);

    let (first, rhs) = &rules[0];
    assert_eq!(first.conditions.len(), 3);
    assert_eq!(first.conditions[0], Condition::has("$x", "on", "$y"));
    assert_eq!(first.conditions[2], Condition::neg("$z", "color", "red"));
    assert_eq!(rhs.get("action").map(String::as_str), Some("advance"));
    assert_eq!(rhs.get("priority").map(String::as_str), Some("1"));

    let (second, rhs) = &rules[1];
    assert_eq!(second.conditions[1], Condition::filter("$p>100"));
    assert_eq!(second.conditions[2], Condition::bind("$p*2", "$d"));
    assert_eq!(
        second.conditions[3],
        Condition::ncc(vec![Condition::has("spu:1", "banned", "$why")])
    );
    assert_eq!(rhs.get("action").map(String::as_str), Some("flag"));
}

#[test]
fn parsed_rules_compile_and_match() {
    let mut network = Network::new();
    let productions = network.add_productions_from_xml(DOCUMENT).unwrap();
    assert_eq!(productions.len(), 2);

    network
        .add_wme(trellis_core::Triple::new("spu:1", "price", "150"))
        .unwrap();
    assert_eq!(network.match_count(productions[1]), 1);
    assert_eq!(
        network.production_rhs(productions[1]).get("action").map(String::as_str),
        Some("flag")
    );

    network
        .add_wme(trellis_core::Triple::new("spu:1", "banned", "fraud"))
        .unwrap();
    assert_eq!(network.match_count(productions[1]), 0);
}

#[test]
fn rejects_unrecognized_condition_tags() {
    let err = parse_rules(
        "<rules><production><lhs><when x=\"1\"/></lhs><rhs/></production></rules>",
    )
    .unwrap_err();
    assert_eq!(err.category(), "xml_source");
}

#[test]
fn rejects_unknown_pattern_fields() {
    let err = parse_rules(
        "<rules><production><lhs><has subject=\"a\" attribute=\"b\" value=\"c\"/></lhs><rhs/></production></rules>",
    )
    .unwrap_err();
    assert_eq!(err.category(), "unknown_field");
}

#[test]
fn rejects_incomplete_productions() {
    let err =
        parse_rules("<rules><production><lhs/></production></rules>").unwrap_err();
    assert_eq!(err.category(), "rule_format");

    let err = parse_rules(
        "<rules><production><lhs><has identifier=\"a\" attribute=\"b\"/></lhs><rhs/></production></rules>",
    )
    .unwrap_err();
    assert_eq!(err.category(), "rule_format");

    let err = parse_rules(
        "<rules><production><lhs><bind>$p*2</bind></lhs><rhs/></production></rules>",
    )
    .unwrap_err();
    assert_eq!(err.category(), "rule_format");
}
