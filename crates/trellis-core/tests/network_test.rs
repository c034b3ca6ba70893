//! End-to-end matching tests: the join plan, negation, compound negation,
//! filters, binds, sharing and retraction cascades.

use trellis_core::{Condition, Network, Rule, Symbol, Triple, Value};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn blocks_world() -> Vec<Triple> {
    vec![
        Triple::new("B1", "on", "B2"),
        Triple::new("B1", "on", "B3"),
        Triple::new("B1", "color", "red"),
        Triple::new("B2", "on", "table"),
        Triple::new("B2", "left-of", "B3"),
        Triple::new("B2", "color", "blue"),
        Triple::new("B3", "left-of", "B4"),
        Triple::new("B3", "on", "table"),
        Triple::new("B3", "color", "red"),
    ]
}

fn assert_consistent(network: &Network) {
    let violations = network.invariant_violations();
    assert!(violations.is_empty(), "invariants violated: {violations:?}");
}

#[test]
fn constants_only_rule_needs_both_facts() {
    let rule = Rule::new(vec![
        Condition::has("x", "id", "1"),
        Condition::has("x", "kind", "8"),
    ]);

    for (facts, expected) in [
        (vec![Triple::new("x", "id", "1")], 0),
        (vec![Triple::new("x", "kind", "8")], 0),
        (
            vec![Triple::new("x", "id", "1"), Triple::new("x", "kind", "8")],
            1,
        ),
    ] {
        let mut network = Network::new();
        let production = network.add_production(&rule, Default::default()).unwrap();
        for fact in facts {
            network.add_wme(fact).unwrap();
        }
        assert_eq!(network.match_count(production), expected);
        assert_consistent(&network);
    }
}

#[test]
fn three_way_join_over_blocks_world() {
    init_tracing();
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::has("$z", "color", "red"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    let mut ids = Vec::new();
    for fact in blocks_world() {
        ids.push(network.add_wme(fact).unwrap());
    }

    assert_eq!(network.match_count(production), 1);
    let matches = network.production_matches(production);
    let wmes = network.token_wmes(matches[0]);
    assert_eq!(
        wmes,
        vec![
            Some(&Triple::new("B1", "on", "B2")),
            Some(&Triple::new("B2", "left-of", "B3")),
            Some(&Triple::new("B3", "color", "red")),
        ]
    );
    assert_consistent(&network);

    // Retracting the base fact dissolves the whole match chain.
    network.remove_wme(ids[0]).unwrap();
    assert_eq!(network.match_count(production), 0);
    assert_consistent(&network);
}

#[test]
fn duplicate_variable_joins_within_one_fact() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "self", "$y"),
        Condition::has("$x", "color", "red"),
        Condition::has("$y", "color", "red"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    network.add_wme(Triple::new("B1", "self", "B1")).unwrap();
    network.add_wme(Triple::new("B1", "color", "red")).unwrap();

    assert_eq!(network.match_count(production), 1);
    assert_consistent(&network);
}

#[test]
fn negated_condition_binds_from_earlier_joins() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::neg("$z", "color", "red"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    for fact in blocks_world() {
        if fact != Triple::new("B3", "color", "red") {
            network.add_wme(fact).unwrap();
        }
    }

    assert_eq!(network.match_count(production), 1);
    let token = network.production_matches(production)[0];
    assert_eq!(
        network.binding(token, &Symbol::from("$x")),
        Some(Value::from("B1"))
    );
    assert_eq!(
        network.binding(token, &Symbol::from("$y")),
        Some(Value::from("B3"))
    );
    assert_eq!(
        network.binding(token, &Symbol::from("$z")),
        Some(Value::from("B4"))
    );
    // The negated position contributes no fact.
    assert_eq!(network.token_wmes(token).last(), Some(&None));
    assert_consistent(&network);
}

#[test]
fn negative_node_reblocks_after_retract_and_reassert() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::neg("$y", "color", "red"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    network.add_wme(Triple::new("B1", "on", "B2")).unwrap();
    assert_eq!(network.match_count(production), 1);

    let blocker = network.add_wme(Triple::new("B2", "color", "red")).unwrap();
    assert_eq!(network.match_count(production), 0);
    assert_consistent(&network);

    network.remove_wme(blocker).unwrap();
    assert_eq!(network.match_count(production), 1, "unblocked after retraction");
    assert_consistent(&network);

    network.add_wme(Triple::new("B2", "color", "red")).unwrap();
    assert_eq!(network.match_count(production), 0, "blocked again on re-assertion");
    assert_consistent(&network);
}

#[test]
fn compound_negation_blocks_and_unblocks() {
    init_tracing();
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::ncc(vec![
            Condition::has("$z", "color", "red"),
            Condition::has("$z", "on", "$w"),
        ]),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    for fact in blocks_world().into_iter().take(8) {
        network.add_wme(fact).unwrap();
    }
    assert_eq!(network.match_count(production), 2);
    assert_consistent(&network);

    let blocker = network.add_wme(Triple::new("B3", "color", "red")).unwrap();
    assert_eq!(network.match_count(production), 1);
    assert_consistent(&network);

    network.remove_wme(blocker).unwrap();
    assert_eq!(network.match_count(production), 2, "ncc unblocks when the sub-match dies");
    assert_consistent(&network);
}

#[test]
fn filters_gate_on_the_substituted_expression() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("spu:1", "price", "$x"),
        Condition::filter("$x>100"),
        Condition::filter("$x<200"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    for price in ["100", "150", "300"] {
        network.add_wme(Triple::new("spu:1", "price", price)).unwrap();
    }

    assert_eq!(network.match_count(production), 1);
    let token = network.production_matches(production)[0];
    assert_eq!(
        network.binding(token, &Symbol::from("$x")),
        Some(Value::from("150"))
    );
    assert_consistent(&network);
}

#[test]
fn bind_extends_the_environment_for_later_conditions() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("spu:1", "price", "$x"),
        Condition::bind("$x*2", "$d"),
        Condition::filter("$d>250"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    for price in ["100", "150", "300"] {
        network.add_wme(Triple::new("spu:1", "price", price)).unwrap();
    }

    assert_eq!(network.match_count(production), 2);
    let doubled: Vec<_> = network
        .production_matches(production)
        .into_iter()
        .map(|token| network.binding(token, &Symbol::from("$d")))
        .collect();
    assert_eq!(
        doubled,
        vec![Some(Value::Integer(300)), Some(Value::Integer(600))]
    );
    assert_consistent(&network);
}

#[test]
fn whitelist_blacklist_composition() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$item", "cat", "$cid"),
        Condition::has("$item", "shop", "$sid"),
        Condition::ncc(vec![
            Condition::neg("$item", "cat", "100"),
            Condition::neg("$item", "cat", "101"),
            Condition::neg("$item", "cat", "102"),
        ]),
        Condition::neg("$item", "shop", "1"),
        Condition::neg("$item", "shop", "2"),
        Condition::neg("$item", "shop", "3"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    for fact in [
        Triple::new("item:1", "cat", "101"),
        Triple::new("item:1", "shop", "4"),
        Triple::new("item:2", "cat", "100"),
        Triple::new("item:2", "shop", "1"),
    ] {
        network.add_wme(fact).unwrap();
    }

    assert_eq!(network.match_count(production), 1);
    let token = network.production_matches(production)[0];
    assert_eq!(
        network.binding(token, &Symbol::from("$item")),
        Some(Value::from("item:1"))
    );
    assert_consistent(&network);
}

#[test]
fn productions_share_prefixes_and_can_join_late() {
    let mut network = Network::new();
    let c0 = Condition::has("$x", "on", "$y");
    let c1 = Condition::has("$y", "left-of", "$z");
    let c2 = Condition::has("$z", "color", "red");
    let c3 = Condition::has("$z", "on", "table");
    let c4 = Condition::has("$z", "left-of", "B4");

    let p0 = network
        .add_production(&Rule::new(vec![c0.clone(), c1.clone(), c2.clone()]), Default::default())
        .unwrap();
    let p1 = network
        .add_production(
            &Rule::new(vec![c0.clone(), c1.clone(), c3.clone(), c4.clone()]),
            Default::default(),
        )
        .unwrap();

    for fact in blocks_world() {
        network.add_wme(fact).unwrap();
    }

    // Compiled against an already-populated working set.
    let p2 = network
        .add_production(&Rule::new(vec![c0, c1, c3, c2]), Default::default())
        .unwrap();

    assert_eq!(network.match_count(p0), 1);
    assert_eq!(network.match_count(p1), 1);
    assert_eq!(network.match_count(p2), 1, "late production back-filled");

    let token = network.production_matches(p2)[0];
    assert_eq!(
        network.token_wmes(token),
        vec![
            Some(&Triple::new("B1", "on", "B2")),
            Some(&Triple::new("B2", "left-of", "B3")),
            Some(&Triple::new("B3", "on", "table")),
            Some(&Triple::new("B3", "color", "red")),
        ]
    );
    assert_consistent(&network);

    let productions_before = network.stats().productions;
    network.remove_production(p2).unwrap();
    assert_eq!(network.stats().productions, productions_before - 1);
    assert_eq!(network.match_count(p0), 1);
    assert_eq!(network.match_count(p1), 1);
    assert_consistent(&network);
}

#[test]
fn equal_rules_share_every_node() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
    ]);

    let first = network.add_production(&rule, Default::default()).unwrap();
    let stats_first = network.stats();
    let second = network.add_production(&rule, Default::default()).unwrap();

    assert_eq!(first, second, "identical rules share one production node");
    assert_eq!(network.stats(), stats_first, "no new nodes were built");
}

#[test]
fn shared_prefix_builds_one_join_chain() {
    let mut network = Network::new();
    let c0 = Condition::has("$x", "on", "$y");
    let c1 = Condition::has("$y", "left-of", "$z");

    network
        .add_production(&Rule::new(vec![c0.clone(), c1.clone()]), Default::default())
        .unwrap();
    network
        .add_production(
            &Rule::new(vec![c0, c1, Condition::has("$z", "color", "red")]),
            Default::default(),
        )
        .unwrap();

    let stats = network.stats();
    assert_eq!(stats.join_nodes, 3, "prefix joins are shared");
    // `on`, `left-of`, `color/red` plus the root working-set memory.
    assert_eq!(stats.alpha_memories, 4);
}

#[test]
fn duplicate_assertions_are_deduplicated() {
    let mut network = Network::new();
    let rule = Rule::new(vec![Condition::has("$x", "on", "$y")]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    let first = network.add_wme(Triple::new("B1", "on", "B2")).unwrap();
    let second = network.add_wme(Triple::new("B1", "on", "B2")).unwrap();

    assert_eq!(first, second);
    assert_eq!(network.stats().facts, 1);
    assert_eq!(network.match_count(production), 1);
    assert_consistent(&network);
}

#[test]
fn retraction_is_the_inverse_of_assertion() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::neg("$z", "color", "red"),
    ]);
    let production = network.add_production(&rule, Default::default()).unwrap();

    let mut ids = Vec::new();
    for fact in blocks_world() {
        ids.push(network.add_wme(fact).unwrap());
    }
    let baseline = network.match_count(production);

    let extra = network.add_wme(Triple::new("B4", "color", "green")).unwrap();
    network.remove_wme(extra).unwrap();
    assert_eq!(network.match_count(production), baseline);
    assert_consistent(&network);

    for id in ids.into_iter().rev() {
        network.remove_wme(id).unwrap();
        assert_consistent(&network);
    }
    assert_eq!(network.match_count(production), 0);
    assert_eq!(network.stats().facts, 0);
    // Only the root token survives a full teardown.
    assert_eq!(network.stats().tokens, 1);
}

#[test]
fn retracting_unknown_facts_is_a_no_op() {
    let mut network = Network::new();
    network.remove_wme(42).unwrap();

    let id = network.add_wme(Triple::new("B1", "on", "B2")).unwrap();
    network.remove_wme(id).unwrap();
    network.remove_wme(id).unwrap();
    assert_eq!(network.stats().facts, 0);
}

#[test]
fn evaluator_failures_propagate_but_keep_the_fact() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "price", "$y"),
        Condition::filter("$unbound>1"),
    ]);
    network.add_production(&rule, Default::default()).unwrap();

    let triple = Triple::new("spu:1", "price", "10");
    let err = network.add_wme(triple.clone()).unwrap_err();
    assert_eq!(err.category(), "evaluation");
    assert!(network.find_wme(&triple).is_some(), "fact stays asserted");
}

#[test]
fn dot_dump_names_both_clusters() {
    let mut network = Network::new();
    let rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::neg("$y", "color", "red"),
    ]);
    network.add_production(&rule, Default::default()).unwrap();

    let dot = network.to_dot();
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("label = alpha"));
    assert!(dot.contains("label = beta"));
    assert!(dot.contains("attribute==on?"));
    assert!(dot.contains("NegativeNode"));
    assert!(dot.contains("ProductionNode"));
}
