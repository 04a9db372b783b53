//! Graph-level consistency checks for a well-typed [`PetriNet`].
//!
//! Every check runs on every net; violations are accumulated rather than
//! returned on the first hit so one report lists all defects.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{NodeKind, PetriNet};

/// Knobs for the structural checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralPolicy {
    /// Tolerate a place with no arcs when it carries an initial marking.
    /// Such a place is exempt from the dangling and connectivity checks.
    #[serde(default)]
    pub allow_isolated_marked_places: bool,
}

/// Where an unresolved node id was referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "site", rename_all = "snake_case")]
pub enum Reference {
    ArcSource { arc: usize },
    ArcTarget { arc: usize },
    InitialMarking,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::ArcSource { arc } => write!(f, "arc {arc} 'from'"),
            Reference::ArcTarget { arc } => write!(f, "arc {arc} 'to'"),
            Reference::InitialMarking => write!(f, "initial marking"),
        }
    }
}

/// An error-level logical defect.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum StructuralViolation {
    #[error("{at} references undeclared node '{node}'")]
    UnknownNodeReference { node: String, at: Reference },

    #[error("initial marking references '{node}', which is a transition, not a place")]
    MarkedTransition { node: String },

    #[error("arc {arc} connects {kind} '{from}' to {kind} '{to}'")]
    BipartiteViolation {
        arc: usize,
        from: String,
        to: String,
        kind: NodeKind,
    },

    #[error("{kind} '{node}' is not connected to any arc")]
    DanglingNode { node: String, kind: NodeKind },

    #[error("place '{place}' has non-positive initial marking {tokens}")]
    NonPositiveInitialMarking { place: String, tokens: i64 },

    #[error("net decomposes into {count} disconnected components")]
    DisconnectedComponents { count: usize },

    #[error("id '{node}' is declared both as a place and as a transition")]
    DuplicateNodeId { node: String },

    #[error("net declares no places and no transitions")]
    EmptyNet,
}

/// An advisory finding that does not invalidate the net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum StructuralWarning {
    DuplicateArc {
        from: String,
        to: String,
        occurrences: usize,
    },
}

impl fmt::Display for StructuralWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralWarning::DuplicateArc {
                from,
                to,
                occurrences,
            } => write!(f, "arc {from} -> {to} appears {occurrences} times"),
        }
    }
}

/// Every error and warning found in a net that failed the checks.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{} structural violation(s)", .violations.len())]
pub struct StructuralFailure {
    pub violations: Vec<StructuralViolation>,
    pub warnings: Vec<StructuralWarning>,
}

/// Runs all structural checks.
///
/// Success carries the advisory warnings, which may be empty.
pub fn validate_structure(
    net: &PetriNet,
    policy: &StructuralPolicy,
) -> Result<Vec<StructuralWarning>, StructuralFailure> {
    let mut violations = Vec::new();

    check_disjoint_ids(net, &mut violations);
    check_references(net, &mut violations);
    check_bipartite(net, &mut violations);
    check_marking(net, &mut violations);

    let exempt = exempt_places(net, policy);
    check_dangling(net, &exempt, &mut violations);
    check_connectivity(net, &exempt, &mut violations);

    let warnings = duplicate_arcs(net);

    if violations.is_empty() {
        Ok(warnings)
    } else {
        Err(StructuralFailure {
            violations,
            warnings,
        })
    }
}

fn check_disjoint_ids(net: &PetriNet, out: &mut Vec<StructuralViolation>) {
    for id in net.places().keys() {
        if net.transitions().contains_key(id) {
            out.push(StructuralViolation::DuplicateNodeId { node: id.clone() });
        }
    }
}

fn check_references(net: &PetriNet, out: &mut Vec<StructuralViolation>) {
    for (i, arc) in net.arcs().iter().enumerate() {
        if !net.is_declared(&arc.from) {
            out.push(StructuralViolation::UnknownNodeReference {
                node: arc.from.clone(),
                at: Reference::ArcSource { arc: i },
            });
        }
        if !net.is_declared(&arc.to) {
            out.push(StructuralViolation::UnknownNodeReference {
                node: arc.to.clone(),
                at: Reference::ArcTarget { arc: i },
            });
        }
    }

    for place in net.initial().keys() {
        if net.places().contains_key(place) {
            continue;
        }
        if net.transitions().contains_key(place) {
            out.push(StructuralViolation::MarkedTransition {
                node: place.clone(),
            });
        } else {
            out.push(StructuralViolation::UnknownNodeReference {
                node: place.clone(),
                at: Reference::InitialMarking,
            });
        }
    }
}

fn check_bipartite(net: &PetriNet, out: &mut Vec<StructuralViolation>) {
    for (i, arc) in net.arcs().iter().enumerate() {
        if let (Some(from), Some(to)) = (net.kind_of(&arc.from), net.kind_of(&arc.to))
            && from == to
        {
            out.push(StructuralViolation::BipartiteViolation {
                arc: i,
                from: arc.from.clone(),
                to: arc.to.clone(),
                kind: from,
            });
        }
    }
}

fn check_marking(net: &PetriNet, out: &mut Vec<StructuralViolation>) {
    for (place, &tokens) in net.initial() {
        if tokens < 1 {
            out.push(StructuralViolation::NonPositiveInitialMarking {
                place: place.clone(),
                tokens,
            });
        }
    }
}

/// Places excused from the isolation rules by the policy.
fn exempt_places<'a>(net: &'a PetriNet, policy: &StructuralPolicy) -> HashSet<&'a str> {
    if !policy.allow_isolated_marked_places {
        return HashSet::new();
    }
    let touched = touched_nodes(net);
    net.initial()
        .iter()
        .filter(|(place, tokens)| {
            **tokens >= 1 && net.places().contains_key(*place) && !touched.contains(place.as_str())
        })
        .map(|(place, _)| place.as_str())
        .collect()
}

fn touched_nodes(net: &PetriNet) -> HashSet<&str> {
    net.arcs()
        .iter()
        .flat_map(|arc| [arc.from.as_str(), arc.to.as_str()])
        .collect()
}

fn check_dangling(net: &PetriNet, exempt: &HashSet<&str>, out: &mut Vec<StructuralViolation>) {
    let touched = touched_nodes(net);
    for (id, kind) in net.nodes() {
        if !touched.contains(id) && !exempt.contains(id) {
            out.push(StructuralViolation::DanglingNode {
                node: id.to_string(),
                kind,
            });
        }
    }
}

fn check_connectivity(
    net: &PetriNet,
    exempt: &HashSet<&str>,
    out: &mut Vec<StructuralViolation>,
) {
    // A duplicated id counts as one node in the graph.
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (id, _) in net.nodes() {
        if !exempt.contains(id) {
            let next = index.len();
            index.entry(id).or_insert(next);
        }
    }

    if index.is_empty() {
        if net.node_count() == 0 {
            out.push(StructuralViolation::EmptyNet);
        }
        return;
    }

    let mut sets = UnionFind::<usize>::new(index.len());
    let mut count = index.len();
    for arc in net.arcs() {
        if let (Some(&a), Some(&b)) = (index.get(arc.from.as_str()), index.get(arc.to.as_str()))
            && sets.union(a, b)
        {
            count -= 1;
        }
    }

    if count > 1 {
        out.push(StructuralViolation::DisconnectedComponents { count });
    }
}

fn duplicate_arcs(net: &PetriNet) -> Vec<StructuralWarning> {
    let mut seen: IndexMap<(&str, &str), usize> = IndexMap::new();
    for arc in net.arcs() {
        *seen.entry((arc.from.as_str(), arc.to.as_str())).or_insert(0) += 1;
    }
    seen.into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|((from, to), occurrences)| StructuralWarning::DuplicateArc {
            from: from.to_string(),
            to: to.to_string(),
            occurrences,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{validate, validate_schema};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn net(doc: Value) -> PetriNet {
        validate_schema(&doc).unwrap()
    }

    fn strict(doc: Value) -> Result<Vec<StructuralWarning>, StructuralFailure> {
        validate_structure(&net(doc), &StructuralPolicy::default())
    }

    fn violations(doc: Value) -> Vec<StructuralViolation> {
        strict(doc).unwrap_err().violations
    }

    #[test]
    fn single_place_single_transition_passes() {
        let warnings = strict(json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        }))
        .unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn cyclic_kiosk_net_passes() {
        let doc = json!({
            "places": {"p_main": "Main Screen", "p_info": "Info Shown"},
            "transitions": {"t_info": "Select Info", "t_back": "Finish Info"},
            "arcs": [
                {"from": "p_main", "to": "t_info"}, {"from": "t_info", "to": "p_info"},
                {"from": "p_info", "to": "t_back"}, {"from": "t_back", "to": "p_main"}
            ],
            "initial": {"p_main": 1}
        });
        assert!(strict(doc).is_ok());
    }

    #[test]
    fn unreferenced_place_is_dangling_and_disconnected() {
        let found = violations(json!({
            "places": {"p1": "a", "p2": "b"},
            "transitions": {"t1": "x"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        }));
        assert_eq!(
            found,
            vec![
                StructuralViolation::DanglingNode {
                    node: "p2".into(),
                    kind: NodeKind::Place
                },
                StructuralViolation::DisconnectedComponents { count: 2 },
            ]
        );
    }

    #[test]
    fn transition_to_transition_arc_is_rejected() {
        let found = violations(json!({
            "places": {"p1": "a"},
            "transitions": {"t1": "x", "t2": "y"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "t1", "to": "t2"}],
            "initial": {"p1": 1}
        }));
        assert_eq!(
            found,
            vec![StructuralViolation::BipartiteViolation {
                arc: 1,
                from: "t1".into(),
                to: "t2".into(),
                kind: NodeKind::Transition
            }]
        );
    }

    #[test]
    fn place_to_place_arc_is_rejected() {
        let found = violations(json!({
            "places": {"p1": "a", "p2": "b"},
            "transitions": {"t1": "x"},
            "arcs": [{"from": "p1", "to": "p2"}, {"from": "p2", "to": "t1"}],
            "initial": {"p1": 1}
        }));
        assert!(matches!(
            found.as_slice(),
            [StructuralViolation::BipartiteViolation { kind: NodeKind::Place, .. }]
        ));
    }

    #[test]
    fn zero_marking_is_non_positive() {
        let found = violations(json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 0}
        }));
        assert_eq!(
            found,
            vec![StructuralViolation::NonPositiveInitialMarking {
                place: "p1".into(),
                tokens: 0
            }]
        );
    }

    #[test]
    fn unknown_references_are_all_reported() {
        let found = violations(json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "ghost", "to": "t1"}],
            "initial": {"p1": 1, "p9": 2, "t1": 1}
        }));
        assert!(found.contains(&StructuralViolation::UnknownNodeReference {
            node: "ghost".into(),
            at: Reference::ArcSource { arc: 1 }
        }));
        assert!(found.contains(&StructuralViolation::UnknownNodeReference {
            node: "p9".into(),
            at: Reference::InitialMarking
        }));
        assert!(found.contains(&StructuralViolation::MarkedTransition { node: "t1".into() }));
    }

    #[test]
    fn accumulates_defects_across_categories() {
        let found = violations(json!({
            "places": {"p1": "a", "p2": "b", "p3": "c"},
            "transitions": {"t1": "x", "t2": "y"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "t1", "to": "t2"}],
            "initial": {"p1": -1}
        }));
        assert!(found.iter().any(|v| matches!(v, StructuralViolation::BipartiteViolation { .. })));
        assert!(found.iter().any(|v| matches!(v, StructuralViolation::NonPositiveInitialMarking { .. })));
        assert!(found.iter().any(|v| matches!(v, StructuralViolation::DanglingNode { .. })));
        assert!(found.contains(&StructuralViolation::DisconnectedComponents { count: 3 }));
    }

    #[test]
    fn two_independent_subnets_are_disconnected() {
        let found = violations(json!({
            "places": {"p1": "a", "p2": "b"},
            "transitions": {"t1": "x", "t2": "y"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "p2", "to": "t2"}],
            "initial": {"p1": 1}
        }));
        assert_eq!(found, vec![StructuralViolation::DisconnectedComponents { count: 2 }]);
    }

    #[test]
    fn id_declared_twice_is_reported() {
        let found = violations(json!({
            "places": {"n": "a", "p1": "b"},
            "transitions": {"n": "x"},
            "arcs": [{"from": "p1", "to": "n"}],
            "initial": {"p1": 1}
        }));
        assert!(found.contains(&StructuralViolation::DuplicateNodeId { node: "n".into() }));
        assert!(!found.iter().any(|v| matches!(v, StructuralViolation::DisconnectedComponents { .. })));
    }

    #[test]
    fn empty_net_is_rejected() {
        let found = violations(json!({"places": {}, "transitions": {}, "arcs": [], "initial": {}}));
        assert_eq!(found, vec![StructuralViolation::EmptyNet]);
    }

    #[test]
    fn duplicate_arc_is_only_a_warning() {
        let warnings = strict(json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        }))
        .unwrap();
        assert_eq!(
            warnings,
            vec![StructuralWarning::DuplicateArc {
                from: "p1".into(),
                to: "t1".into(),
                occurrences: 2
            }]
        );
    }

    #[test]
    fn failure_keeps_warnings() {
        let failure = strict(json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}, {"from": "p1", "to": "t1"}],
            "initial": {"p1": 0}
        }))
        .unwrap_err();
        assert_eq!(failure.violations.len(), 1);
        assert_eq!(failure.warnings.len(), 1);
    }

    #[test]
    fn lenient_policy_tolerates_marked_isolated_place() {
        let doc = json!({
            "places": {"p1": "idle", "sink": "done"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1, "sink": 1}
        });
        assert!(strict(doc.clone()).is_err());

        let lenient = StructuralPolicy {
            allow_isolated_marked_places: true,
        };
        assert!(validate_structure(&net(doc), &lenient).is_ok());
    }

    #[test]
    fn lenient_policy_still_rejects_unmarked_isolated_place() {
        let doc = json!({
            "places": {"p1": "idle", "p2": "orphan"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        });
        let lenient = StructuralPolicy {
            allow_isolated_marked_places: true,
        };
        assert!(validate_structure(&net(doc), &lenient).is_err());
    }

    /// Node ids arcs and markings may point at: four places, four
    /// transitions and one id that is never declared.
    fn pool_id(i: usize) -> String {
        match i {
            0..4 => format!("p{i}"),
            4..8 => format!("t{}", i - 4),
            _ => "ghost".to_string(),
        }
    }

    fn random_doc(
        places: usize,
        transitions: usize,
        arcs: &[(usize, usize)],
        marking: &[(usize, i64)],
    ) -> Value {
        let places: serde_json::Map<String, Value> =
            (0..places).map(|i| (format!("p{i}"), json!(format!("place {i}")))).collect();
        let transitions: serde_json::Map<String, Value> = (0..transitions)
            .map(|i| (format!("t{i}"), json!(format!("transition {i}"))))
            .collect();
        let arcs: Vec<Value> = arcs
            .iter()
            .map(|&(from, to)| json!({"from": pool_id(from), "to": pool_id(to)}))
            .collect();
        let initial: serde_json::Map<String, Value> = marking
            .iter()
            .map(|&(node, tokens)| (pool_id(node), json!(tokens)))
            .collect();
        json!({"places": places, "transitions": transitions, "arcs": arcs, "initial": initial})
    }

    /// Connected components of the undirected arc graph, counted by a
    /// plain traversal.
    fn components(net: &PetriNet) -> usize {
        let mut adjacent: HashMap<&str, Vec<&str>> =
            net.nodes().map(|(id, _)| (id, Vec::new())).collect();
        for arc in net.arcs() {
            adjacent.entry(arc.from.as_str()).or_default().push(arc.to.as_str());
            adjacent.entry(arc.to.as_str()).or_default().push(arc.from.as_str());
        }
        let mut seen = HashSet::new();
        let mut count = 0;
        for (start, _) in net.nodes() {
            if !seen.insert(start) {
                continue;
            }
            count += 1;
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                for &next in &adjacent[node] {
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }
        count
    }

    fn assert_invariants(net: &PetriNet) -> Result<(), TestCaseError> {
        for arc in net.arcs() {
            let (from, to) = (net.kind_of(&arc.from), net.kind_of(&arc.to));
            prop_assert!(from.is_some() && to.is_some(), "unresolved arc {:?}", arc);
            prop_assert_ne!(from, to);
        }
        for (place, &tokens) in net.initial() {
            prop_assert!(tokens >= 1);
            prop_assert_eq!(net.kind_of(place), Some(NodeKind::Place));
        }
        let touched = touched_nodes(net);
        for (id, _) in net.nodes() {
            prop_assert!(touched.contains(id), "'{}' has no arc", id);
        }
        prop_assert_eq!(components(net), 1);
        Ok(())
    }

    proptest! {
        #[test]
        fn accepted_random_nets_hold_every_invariant(
            places in 0..5usize,
            transitions in 0..5usize,
            arcs in proptest::collection::vec((0..9usize, 0..9usize), 0..12),
            marking in proptest::collection::vec((0..9usize, -1i64..3), 0..4),
        ) {
            let doc = random_doc(places, transitions, &arcs, &marking);
            if let Ok(validated) = validate(&doc, &StructuralPolicy::default()) {
                assert_invariants(&validated.net)?;

                let again = validate(&validated.net.to_json(), &StructuralPolicy::default());
                prop_assert!(again.is_ok());
                prop_assert_eq!(again.unwrap().net, validated.net);
            }
        }

        #[test]
        fn circuit_nets_are_always_accepted(
            size in 1..6usize,
            tokens in proptest::collection::vec(1i64..5, 1..6),
            extra_arcs in proptest::collection::vec((0..6usize, 0..6usize), 0..4),
        ) {
            // p0 -> t0 -> p1 -> t1 -> ... -> p0, plus random place -> transition chords.
            let mut arcs = Vec::new();
            for i in 0..size {
                arcs.push(json!({"from": format!("p{i}"), "to": format!("t{i}")}));
                arcs.push(json!({"from": format!("t{i}"), "to": format!("p{}", (i + 1) % size)}));
            }
            for (p, t) in extra_arcs {
                arcs.push(json!({"from": format!("p{}", p % size), "to": format!("t{}", t % size)}));
            }
            let places: serde_json::Map<String, Value> =
                (0..size).map(|i| (format!("p{i}"), json!("state"))).collect();
            let transitions: serde_json::Map<String, Value> =
                (0..size).map(|i| (format!("t{i}"), json!("step"))).collect();
            let initial: serde_json::Map<String, Value> = tokens
                .iter()
                .enumerate()
                .filter(|(i, _)| *i < size)
                .map(|(i, n)| (format!("p{i}"), json!(n)))
                .collect();
            let doc = json!({"places": places, "transitions": transitions, "arcs": arcs, "initial": initial});

            let validated = validate(&doc, &StructuralPolicy::default());
            prop_assert!(validated.is_ok(), "{:?}", validated);
            let validated = validated.unwrap();
            assert_invariants(&validated.net)?;
            prop_assert!(validate(&validated.net.to_json(), &StructuralPolicy::default()).is_ok());
        }
    }

    #[test]
    fn violation_display() {
        let v = StructuralViolation::BipartiteViolation {
            arc: 3,
            from: "t1".into(),
            to: "t2".into(),
            kind: NodeKind::Transition,
        };
        assert_eq!(v.to_string(), "arc 3 connects transition 't1' to transition 't2'");
        assert_eq!(
            StructuralViolation::DisconnectedComponents { count: 2 }.to_string(),
            "net decomposes into 2 disconnected components"
        );
    }
}
