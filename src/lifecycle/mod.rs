mod candidate;
mod manager;
mod state;

pub use candidate::{Candidate, DispositionRecord, ReviewDecision, ReviewPacket, Reviewer};
pub use manager::{LifecycleError, LifecycleManager};
pub use state::CandidateState;

#[cfg(test)]
pub(crate) use manager::tests::{FixedVisualizer, ScriptedReviewer};
