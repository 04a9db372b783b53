use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::{CandidateState, IllegalTransition, LifecycleEvent, StateMachine};
use crate::net::{PetriNet, StructuralWarning};
use crate::store::{Bucket, SampleId};

/// An in-flight (scenario text, raw net) pair.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub scenario_text: String,
    pub raw_json: Value,
    pub state: CandidateState,
    pub state_history: Vec<CandidateState>,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(scenario_text: String, raw_json: Value) -> Self {
        Self {
            id: Self::new_id(),
            scenario_text,
            raw_json,
            state: CandidateState::Proposed,
            state_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A fresh `candidate_<8 hex>` id.
    pub fn new_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("candidate_{}", &hex[..8])
    }

    /// The random part of the id, reused in persisted file stems.
    pub fn short_id(&self) -> &str {
        self.id.strip_prefix("candidate_").unwrap_or(&self.id)
    }

    /// Applies `event` and records the state being left.
    pub fn advance(&mut self, event: LifecycleEvent) -> Result<CandidateState, IllegalTransition> {
        let next = StateMachine::next(self.state, event)?;
        self.state_history.push(self.state);
        self.state = next;
        Ok(next)
    }
}

/// The reviewer's verdict on a staged candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDecision {
    Accept,
    Reject,
}

/// Everything a reviewer gets to look at.
#[derive(Debug)]
pub struct ReviewPacket<'a> {
    pub candidate_id: &'a str,
    pub scenario_text: &'a str,
    pub net: &'a PetriNet,
    pub warnings: &'a [StructuralWarning],
    pub staged_files: &'a [PathBuf],
    pub diagram: Option<&'a PathBuf>,
}

/// Source of review decisions.
///
/// Has one synchronous method so the lifecycle can be driven from a console
/// prompt or from a scripted harness alike. An `Err` aborts the review; the
/// candidate's staged files are still purged.
pub trait Reviewer {
    fn decide(&mut self, packet: &ReviewPacket<'_>) -> std::io::Result<ReviewDecision>;
}

/// Structured record produced at every terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionRecord {
    pub candidate_id: String,
    pub final_state: CandidateState,
    pub state_transitions: Vec<CandidateState>,
    pub bucket: Bucket,
    pub sample_id: SampleId,
    pub stem: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub has_diagram: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Where a candidate's bundle ended up.
pub(crate) struct Placement {
    pub bucket: Bucket,
    pub sample_id: SampleId,
    pub stem: String,
    pub has_diagram: bool,
}

impl DispositionRecord {
    pub(crate) fn from_candidate(
        candidate: &Candidate,
        placement: Placement,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        debug_assert!(candidate.state.is_terminal());
        let now = Utc::now();
        let mut transitions = candidate.state_history.clone();
        transitions.push(candidate.state);
        Self {
            candidate_id: candidate.id.clone(),
            final_state: candidate.state,
            state_transitions: transitions,
            bucket: placement.bucket,
            sample_id: placement.sample_id,
            stem: placement.stem,
            errors,
            warnings,
            has_diagram: placement.has_diagram,
            started_at: candidate.created_at,
            completed_at: now,
            duration_ms: (now - candidate.created_at).num_milliseconds(),
        }
    }
}
