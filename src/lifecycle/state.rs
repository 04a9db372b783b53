use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The states of a candidate's review lifecycle.
///
/// Each candidate flows through: PROPOSED → {AUTO_REJECTED | PENDING_REVIEW}
/// and PENDING_REVIEW → {APPROVED | REJECTED_MANUAL}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateState {
    Proposed,
    AutoRejected,
    PendingReview,
    Approved,
    RejectedManual,
}

impl CandidateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CandidateState::AutoRejected | CandidateState::Approved | CandidateState::RejectedManual
        )
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateState::Proposed => write!(f, "PROPOSED"),
            CandidateState::AutoRejected => write!(f, "AUTO_REJECTED"),
            CandidateState::PendingReview => write!(f, "PENDING_REVIEW"),
            CandidateState::Approved => write!(f, "APPROVED"),
            CandidateState::RejectedManual => write!(f, "REJECTED_MANUAL"),
        }
    }
}

/// What happened to a candidate, driving the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    ValidationFailed,
    ValidationPassed,
    ReviewerAccepted,
    ReviewerRejected,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::ValidationFailed => write!(f, "validation failed"),
            LifecycleEvent::ValidationPassed => write!(f, "validation passed"),
            LifecycleEvent::ReviewerAccepted => write!(f, "reviewer accepted"),
            LifecycleEvent::ReviewerRejected => write!(f, "reviewer rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition: {event} in state {from}")]
pub struct IllegalTransition {
    pub from: CandidateState,
    pub event: LifecycleEvent,
}

/// The transition table.
pub struct StateMachine;

impl StateMachine {
    /// Computes the state that follows `from` on `event`.
    ///
    /// Terminal states accept no events.
    pub fn next(from: CandidateState, event: LifecycleEvent) -> Result<CandidateState, IllegalTransition> {
        use CandidateState::*;
        use LifecycleEvent::*;
        match (from, event) {
            (Proposed, ValidationFailed) => Ok(AutoRejected),
            (Proposed, ValidationPassed) => Ok(PendingReview),
            (PendingReview, ReviewerAccepted) => Ok(Approved),
            (PendingReview, ReviewerRejected) => Ok(RejectedManual),
            _ => Err(IllegalTransition { from, event }),
        }
    }
}
