use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The two node kinds of a Petri net graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Place,
    Transition,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Place => write!(f, "place"),
            NodeKind::Transition => write!(f, "transition"),
        }
    }
}

/// A directed edge between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arc {
    pub from: String,
    pub to: String,
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A well-typed Petri net.
///
/// Only the schema validator constructs one, so every value has passed the
/// shape checks; logical invariants are checked separately by
/// [`validate_structure`](super::validate_structure). Fields are private
/// and there are no mutators: re-validation can never change a net.
///
/// Maps keep their declaration order so a net serializes back the way it
/// was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PetriNet {
    places: IndexMap<String, String>,
    transitions: IndexMap<String, String>,
    arcs: Vec<Arc>,
    initial: IndexMap<String, i64>,
}

impl PetriNet {
    pub(crate) fn from_parts(
        places: IndexMap<String, String>,
        transitions: IndexMap<String, String>,
        arcs: Vec<Arc>,
        initial: IndexMap<String, i64>,
    ) -> Self {
        Self {
            places,
            transitions,
            arcs,
            initial,
        }
    }

    pub fn places(&self) -> &IndexMap<String, String> {
        &self.places
    }

    pub fn transitions(&self) -> &IndexMap<String, String> {
        &self.transitions
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn initial(&self) -> &IndexMap<String, i64> {
        &self.initial
    }

    /// Resolves a node id to its kind.
    ///
    /// Returns `None` both for unknown ids and for ids declared as a place
    /// *and* a transition, since neither has a single well-defined kind.
    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        match (self.places.contains_key(id), self.transitions.contains_key(id)) {
            (true, false) => Some(NodeKind::Place),
            (false, true) => Some(NodeKind::Transition),
            _ => None,
        }
    }

    /// Whether `id` is declared as a place or a transition (or both).
    pub fn is_declared(&self, id: &str) -> bool {
        self.places.contains_key(id) || self.transitions.contains_key(id)
    }

    /// Iterates every declared node with its kind, places first.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.places
            .keys()
            .map(|id| (id.as_str(), NodeKind::Place))
            .chain(
                self.transitions
                    .keys()
                    .map(|id| (id.as_str(), NodeKind::Transition)),
            )
    }

    pub fn node_count(&self) -> usize {
        self.places.len() + self.transitions.len()
    }

    /// The canonical JSON interchange representation.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "places": self.places,
            "transitions": self.transitions,
            "arcs": self.arcs,
            "initial": self.initial,
        })
    }
}
