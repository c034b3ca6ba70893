//! Property tests: incremental maintenance agrees with batch evaluation,
//! assertion order is irrelevant, and retraction is assertion's inverse.

use proptest::prelude::*;
use trellis_core::{Condition, Network, NodeId, Rule, Triple};

fn fact_strategy() -> impl Strategy<Value = Triple> {
    let block = || prop::sample::select(vec!["B1", "B2", "B3", "B4", "table"]);
    prop_oneof![
        (block(), block()).prop_map(|(a, b)| Triple::new(a, "on", b)),
        (block(), block()).prop_map(|(a, b)| Triple::new(a, "left-of", b)),
        (block(), prop::sample::select(vec!["red", "blue"]))
            .prop_map(|(a, c)| Triple::new(a, "color", c)),
    ]
}

fn dedup(facts: &[Triple]) -> Vec<Triple> {
    let mut unique: Vec<Triple> = Vec::new();
    for fact in facts {
        if !unique.contains(fact) {
            unique.push(fact.clone());
        }
    }
    unique
}

/// Scratch evaluation of `Has($x,on,$y) ∧ Has($y,left-of,$z) ∧ Neg($z,color,red)`.
fn oracle_neg(facts: &[Triple]) -> usize {
    let mut count = 0;
    for f1 in facts {
        if f1.attribute.as_str() != "on" {
            continue;
        }
        for f2 in facts {
            if f2.attribute.as_str() != "left-of" || f2.identifier != f1.value {
                continue;
            }
            let blocked = facts.iter().any(|f3| {
                f3.attribute.as_str() == "color"
                    && f3.value.as_str() == "red"
                    && f3.identifier == f2.value
            });
            if !blocked {
                count += 1;
            }
        }
    }
    count
}

/// Scratch evaluation of
/// `Has($x,on,$y) ∧ Has($y,left-of,$z) ∧ Ncc(Has($z,color,red), Has($z,on,$w))`.
fn oracle_ncc(facts: &[Triple]) -> usize {
    let mut count = 0;
    for f1 in facts {
        if f1.attribute.as_str() != "on" {
            continue;
        }
        for f2 in facts {
            if f2.attribute.as_str() != "left-of" || f2.identifier != f1.value {
                continue;
            }
            let sub_match = facts.iter().any(|f3| {
                f3.attribute.as_str() == "color"
                    && f3.value.as_str() == "red"
                    && f3.identifier == f2.value
            }) && facts
                .iter()
                .any(|f4| f4.attribute.as_str() == "on" && f4.identifier == f2.value);
            if !sub_match {
                count += 1;
            }
        }
    }
    count
}

fn compile(network: &mut Network) -> (NodeId, NodeId) {
    let neg_rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::neg("$z", "color", "red"),
    ]);
    let ncc_rule = Rule::new(vec![
        Condition::has("$x", "on", "$y"),
        Condition::has("$y", "left-of", "$z"),
        Condition::ncc(vec![
            Condition::has("$z", "color", "red"),
            Condition::has("$z", "on", "$w"),
        ]),
    ]);
    let neg = network.add_production(&neg_rule, Default::default()).unwrap();
    let ncc = network.add_production(&ncc_rule, Default::default()).unwrap();
    (neg, ncc)
}

proptest! {
    #[test]
    fn incremental_equals_batch_in_any_order(
        facts in prop::collection::vec(fact_strategy(), 0..12),
    ) {
        let unique = dedup(&facts);
        let expected_neg = oracle_neg(&unique);
        let expected_ncc = oracle_ncc(&unique);

        // Rules before facts, generated order.
        let mut forward = Network::new();
        let (neg, ncc) = compile(&mut forward);
        for fact in &facts {
            forward.add_wme(fact.clone()).unwrap();
        }
        prop_assert_eq!(forward.match_count(neg), expected_neg);
        prop_assert_eq!(forward.match_count(ncc), expected_ncc);
        prop_assert!(forward.invariant_violations().is_empty());

        // Rules before facts, reversed order.
        let mut backward = Network::new();
        let (neg, ncc) = compile(&mut backward);
        for fact in facts.iter().rev() {
            backward.add_wme(fact.clone()).unwrap();
        }
        prop_assert_eq!(backward.match_count(neg), expected_neg);
        prop_assert_eq!(backward.match_count(ncc), expected_ncc);

        // Facts before rules: compilation back-fills from the working set.
        let mut late = Network::new();
        for fact in &facts {
            late.add_wme(fact.clone()).unwrap();
        }
        let (neg, ncc) = compile(&mut late);
        prop_assert_eq!(late.match_count(neg), expected_neg);
        prop_assert_eq!(late.match_count(ncc), expected_ncc);
        prop_assert!(late.invariant_violations().is_empty());
    }

    #[test]
    fn assert_then_retract_is_identity(
        facts in prop::collection::vec(fact_strategy(), 0..10),
        extra in fact_strategy(),
    ) {
        let mut network = Network::new();
        let (neg, ncc) = compile(&mut network);
        for fact in &facts {
            network.add_wme(fact.clone()).unwrap();
        }
        prop_assume!(network.find_wme(&extra).is_none());

        let baseline_neg = network.match_count(neg);
        let baseline_ncc = network.match_count(ncc);

        let id = network.add_wme(extra).unwrap();
        network.remove_wme(id).unwrap();

        prop_assert_eq!(network.match_count(neg), baseline_neg);
        prop_assert_eq!(network.match_count(ncc), baseline_ncc);
        prop_assert!(network.invariant_violations().is_empty());
    }

    #[test]
    fn full_teardown_leaves_an_empty_network(
        facts in prop::collection::vec(fact_strategy(), 0..10),
    ) {
        let mut network = Network::new();
        let (neg, ncc) = compile(&mut network);
        let mut ids = Vec::new();
        for fact in &facts {
            ids.push(network.add_wme(fact.clone()).unwrap());
        }
        for id in ids {
            network.remove_wme(id).unwrap();
        }
        prop_assert_eq!(network.match_count(neg), 0);
        prop_assert_eq!(network.match_count(ncc), 0);
        prop_assert_eq!(network.stats().facts, 0);
        prop_assert!(network.invariant_violations().is_empty());
    }
}
