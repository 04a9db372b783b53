use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::candidate::{
    Candidate, DispositionRecord, Placement, ReviewDecision, ReviewPacket, Reviewer,
};
use super::state::{IllegalTransition, LifecycleEvent};
use crate::net::{StructuralPolicy, ValidatedNet, ValidationFailure, validate};
use crate::store::{ArtifactKind, ArtifactSet, Bucket, PersistenceFailure, RepositoryStore, StagingGuard};
use crate::visualizer::Visualizer;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Transition(#[from] IllegalTransition),

    #[error("candidate {candidate_id}: {source}")]
    Persistence {
        candidate_id: String,
        #[source]
        source: PersistenceFailure,
    },

    #[error("could not stage candidate {candidate_id} for review: {source}")]
    Staging {
        candidate_id: String,
        #[source]
        source: io::Error,
    },

    #[error("review of candidate {candidate_id} aborted: {source}")]
    ReviewAborted {
        candidate_id: String,
        #[source]
        source: io::Error,
    },

    #[error("could not encode artifacts of candidate {candidate_id}: {source}")]
    Encode {
        candidate_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LifecycleError {
    pub fn persistence_failure(&self) -> Option<&PersistenceFailure> {
        match self {
            LifecycleError::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Drives candidates from PROPOSED to a terminal state.
pub struct LifecycleManager<V, R> {
    store: RepositoryStore,
    visualizer: V,
    reviewer: R,
    policy: StructuralPolicy,
    keep_rejected_diagrams: bool,
}

impl<V: Visualizer, R: Reviewer> LifecycleManager<V, R> {
    pub fn new(store: RepositoryStore, visualizer: V, reviewer: R, policy: StructuralPolicy) -> Self {
        Self {
            store,
            visualizer,
            reviewer,
            policy,
            keep_rejected_diagrams: false,
        }
    }

    /// Keep the rendered diagram when the reviewer rejects a candidate.
    pub fn keep_rejected_diagrams(mut self, keep: bool) -> Self {
        self.keep_rejected_diagrams = keep;
        self
    }

    pub fn store(&self) -> &RepositoryStore {
        &self.store
    }

    pub fn policy(&self) -> &StructuralPolicy {
        &self.policy
    }

    /// Runs one candidate to completion.
    ///
    /// A failed validation goes straight to `invalid_auto_rejected`; a valid
    /// net is rendered, staged and put in front of the reviewer. Staged
    /// files are purged on every exit path, including errors.
    pub fn process(&mut self, candidate: Candidate) -> Result<DispositionRecord, LifecycleError> {
        debug!(candidate_id = %candidate.id, "processing candidate");
        match validate(&candidate.raw_json, &self.policy) {
            Err(failure) => self.auto_reject(candidate, failure),
            Ok(validated) => self.review(candidate, validated),
        }
    }

    fn auto_reject(
        &self,
        mut candidate: Candidate,
        failure: ValidationFailure,
    ) -> Result<DispositionRecord, LifecycleError> {
        candidate.advance(LifecycleEvent::ValidationFailed)?;
        let errors = failure.messages();
        warn!(
            candidate_id = %candidate.id,
            errors = errors.len(),
            "candidate failed validation, auto-rejecting"
        );

        let bucket = Bucket::InvalidAutoRejected;
        let encode = |source| LifecycleError::Encode {
            candidate_id: candidate.id.clone(),
            source,
        };
        let artifacts = ArtifactSet::new(stem_for(bucket, &candidate))
            .with(ArtifactKind::Text, candidate.scenario_text.as_bytes())
            .with_json(ArtifactKind::PetriJson, &candidate.raw_json)
            .and_then(|set| set.with_json(ArtifactKind::Report, &failure))
            .map_err(encode)?;

        let placement = self.place(bucket, &candidate, &artifacts)?;
        Ok(DispositionRecord::from_candidate(&candidate, placement, errors, Vec::new()))
    }

    fn review(
        &mut self,
        mut candidate: Candidate,
        validated: ValidatedNet,
    ) -> Result<DispositionRecord, LifecycleError> {
        candidate.advance(LifecycleEvent::ValidationPassed)?;
        let warnings: Vec<String> = validated.warnings.iter().map(ToString::to_string).collect();
        for w in &warnings {
            debug!(candidate_id = %candidate.id, warning = %w, "structural warning");
        }

        let diagram = match self.visualizer.render(&validated.net) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(candidate_id = %candidate.id, error = %e, "diagram rendering failed, reviewing without it");
                None
            }
        };

        let encode = |source| LifecycleError::Encode {
            candidate_id: candidate.id.clone(),
            source,
        };
        let net_json = validated.net.to_json();
        let text_and_net = ArtifactSet::new(String::new())
            .with(ArtifactKind::Text, candidate.scenario_text.as_bytes())
            .with_json(ArtifactKind::PetriJson, &net_json)
            .map_err(encode)?;
        let with_diagram = |set: ArtifactSet| match &diagram {
            Some(bytes) => set.with(ArtifactKind::Diagram, bytes.clone()),
            None => set,
        };

        let _staging = StagingGuard::new(&self.store, &candidate.id);
        let staged = self
            .store
            .stage(&candidate.id, &with_diagram(text_and_net.clone()))
            .map_err(|source| LifecycleError::Staging {
                candidate_id: candidate.id.clone(),
                source,
            })?;
        let staged_diagram: Option<PathBuf> = staged
            .iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "pdf"))
            .cloned();

        let packet = ReviewPacket {
            candidate_id: &candidate.id,
            scenario_text: &candidate.scenario_text,
            net: &validated.net,
            warnings: &validated.warnings,
            staged_files: &staged,
            diagram: staged_diagram.as_ref(),
        };
        let decision = self
            .reviewer
            .decide(&packet)
            .map_err(|source| LifecycleError::ReviewAborted {
                candidate_id: candidate.id.clone(),
                source,
            })?;

        let (event, bucket, keep_diagram) = match decision {
            ReviewDecision::Accept => (LifecycleEvent::ReviewerAccepted, Bucket::Approved, true),
            ReviewDecision::Reject => (
                LifecycleEvent::ReviewerRejected,
                Bucket::RejectedManual,
                self.keep_rejected_diagrams,
            ),
        };
        candidate.advance(event)?;

        let mut artifacts = text_and_net;
        artifacts.stem = stem_for(bucket, &candidate);
        if keep_diagram {
            artifacts = with_diagram(artifacts);
        }
        let placement = self.place(bucket, &candidate, &artifacts)?;
        Ok(DispositionRecord::from_candidate(&candidate, placement, Vec::new(), warnings))
    }

    fn place(
        &self,
        bucket: Bucket,
        candidate: &Candidate,
        artifacts: &ArtifactSet,
    ) -> Result<Placement, LifecycleError> {
        let persistence = |source| LifecycleError::Persistence {
            candidate_id: candidate.id.clone(),
            source,
        };
        let id = self.store.allocate_id(bucket).map_err(persistence)?;
        let sample = self
            .store
            .persist(bucket, &id, artifacts, Some(&candidate.id))
            .map_err(persistence)?;
        info!(
            candidate_id = %candidate.id,
            %bucket,
            sample_id = %id,
            state = %candidate.state,
            "candidate reached terminal state"
        );
        Ok(Placement {
            bucket,
            sample_id: id,
            stem: sample.manifest.stem,
            has_diagram: artifacts.get(ArtifactKind::Diagram).is_some(),
        })
    }
}

fn stem_for(bucket: Bucket, candidate: &Candidate) -> String {
    format!("gen_{}_{}", bucket.status_suffix(), candidate.short_id())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lifecycle::CandidateState;
    use crate::net::PetriNet;
    use crate::visualizer::RenderFailure;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) struct FixedVisualizer {
        pub(crate) fail: bool,
    }

    impl Visualizer for FixedVisualizer {
        fn render(&self, _net: &PetriNet) -> Result<Vec<u8>, RenderFailure> {
            if self.fail {
                Err(RenderFailure::EmptyOutput)
            } else {
                Ok(b"%PDF-1.4 fake".to_vec())
            }
        }
    }

    /// Replays scripted decisions and remembers what it was shown.
    #[derive(Default)]
    pub(crate) struct ScriptedReviewer {
        pub(crate) decisions: VecDeque<io::Result<ReviewDecision>>,
        pub(crate) seen_files: Vec<Vec<PathBuf>>,
        pub(crate) staged_present: Vec<bool>,
        pub(crate) saw_diagram: Vec<bool>,
    }

    impl ScriptedReviewer {
        pub(crate) fn deciding(decisions: Vec<io::Result<ReviewDecision>>) -> Self {
            Self {
                decisions: decisions.into(),
                ..Self::default()
            }
        }
    }

    impl Reviewer for ScriptedReviewer {
        fn decide(&mut self, packet: &ReviewPacket<'_>) -> io::Result<ReviewDecision> {
            self.seen_files.push(packet.staged_files.to_vec());
            self.staged_present
                .push(packet.staged_files.iter().all(|p| p.exists()));
            self.saw_diagram.push(packet.diagram.is_some());
            self.decisions
                .pop_front()
                .unwrap_or(Ok(ReviewDecision::Reject))
        }
    }

    impl Reviewer for &mut ScriptedReviewer {
        fn decide(&mut self, packet: &ReviewPacket<'_>) -> io::Result<ReviewDecision> {
            (**self).decide(packet)
        }
    }

    fn valid_net() -> Value {
        json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        })
    }

    fn dangling_net() -> Value {
        json!({
            "places": {"p1": "a", "p2": "b"},
            "transitions": {"t1": "x"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        })
    }

    fn store() -> (TempDir, RepositoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = RepositoryStore::new(&tmp.path().join("data"), &tmp.path().join("outputs"));
        (tmp, store)
    }

    fn review_temp_is_empty(store: &RepositoryStore) -> bool {
        match fs::read_dir(store.review_temp_dir()) {
            Ok(entries) => entries.count() == 0,
            Err(_) => true,
        }
    }

    #[test]
    fn structural_failure_goes_straight_to_auto_rejected() {
        let (_tmp, store) = store();
        let mut reviewer = ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]);
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            &mut reviewer,
            StructuralPolicy::default(),
        );

        let candidate = Candidate::new("two places, one forgotten".into(), dangling_net());
        let record = manager.process(candidate).unwrap();
        drop(manager);

        assert_eq!(record.final_state, CandidateState::AutoRejected);
        assert_eq!(
            record.state_transitions,
            vec![CandidateState::Proposed, CandidateState::AutoRejected]
        );
        assert_eq!(record.bucket, Bucket::InvalidAutoRejected);
        assert_eq!(record.errors.len(), 2);
        assert!(!record.has_diagram);

        // Never shown to the reviewer, never placed anywhere else.
        assert!(reviewer.seen_files.is_empty());
        assert!(store.list(Bucket::Approved).unwrap().is_empty());
        assert!(store.list(Bucket::RejectedManual).unwrap().is_empty());
        assert!(review_temp_is_empty(&store));

        let sample = store.load(Bucket::InvalidAutoRejected, &record.sample_id).unwrap();
        assert!(sample.manifest.stem.starts_with("gen_autorejected_"));
        let report: Value =
            serde_json::from_slice(&fs::read(sample.path_of(ArtifactKind::Report).unwrap()).unwrap())
                .unwrap();
        assert_eq!(report["stage"], "structure");
        let raw: Value =
            serde_json::from_slice(&fs::read(sample.path_of(ArtifactKind::PetriJson).unwrap()).unwrap())
                .unwrap();
        assert_eq!(raw, dangling_net());
    }

    #[test]
    fn schema_failure_keeps_raw_json() {
        let (_tmp, store) = store();
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            ScriptedReviewer::default(),
            StructuralPolicy::default(),
        );
        let raw = json!({"places": {"p1": "idle"}, "extra": true});
        let record = manager.process(Candidate::new("text".into(), raw.clone())).unwrap();
        assert_eq!(record.final_state, CandidateState::AutoRejected);

        let sample = store.load(Bucket::InvalidAutoRejected, &record.sample_id).unwrap();
        let stored: Value =
            serde_json::from_slice(&fs::read(sample.path_of(ArtifactKind::PetriJson).unwrap()).unwrap())
                .unwrap();
        assert_eq!(stored, raw);
    }

    #[test]
    fn accepted_candidate_is_approved_with_diagram() {
        let (_tmp, store) = store();
        let mut reviewer = ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]);
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            &mut reviewer,
            StructuralPolicy::default(),
        );
        let record = manager
            .process(Candidate::new("a machine starts".into(), valid_net()))
            .unwrap();
        drop(manager);

        assert_eq!(record.final_state, CandidateState::Approved);
        assert_eq!(
            record.state_transitions,
            vec![
                CandidateState::Proposed,
                CandidateState::PendingReview,
                CandidateState::Approved
            ]
        );
        assert!(record.has_diagram);
        assert_eq!(reviewer.staged_present, vec![true]);
        assert_eq!(reviewer.saw_diagram, vec![true]);
        assert_eq!(reviewer.seen_files[0].len(), 3);
        assert!(reviewer.seen_files[0].iter().all(|p| !p.exists()));
        assert!(review_temp_is_empty(&store));

        let sample = store.load(Bucket::Approved, &record.sample_id).unwrap();
        assert!(sample.path_of(ArtifactKind::Diagram).unwrap().is_file());
        assert_eq!(sample.manifest.candidate_id.as_deref(), Some(record.candidate_id.as_str()));
    }

    #[test]
    fn approved_samples_revalidate() {
        let (_tmp, store) = store();
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]),
            StructuralPolicy::default(),
        );
        manager
            .process(Candidate::new("a machine starts".into(), valid_net()))
            .unwrap();

        for sample in store.list(Bucket::Approved).unwrap() {
            let pair = store.read_pair(&sample).unwrap();
            let again = validate(&pair.petri_json, &StructuralPolicy::default()).unwrap();
            assert_eq!(again.net.to_json(), pair.petri_json);
        }
    }

    #[test]
    fn rejected_candidate_drops_diagram_by_default() {
        let (_tmp, store) = store();
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Reject)]),
            StructuralPolicy::default(),
        );
        let record = manager
            .process(Candidate::new("text".into(), valid_net()))
            .unwrap();

        assert_eq!(record.final_state, CandidateState::RejectedManual);
        assert!(!record.has_diagram);
        let sample = store.load(Bucket::RejectedManual, &record.sample_id).unwrap();
        assert!(sample.manifest.stem.starts_with("gen_rejected_manual_"));
        assert!(sample.path_of(ArtifactKind::Diagram).is_none());
        assert!(sample.path_of(ArtifactKind::PetriJson).is_some());
        assert!(review_temp_is_empty(&store));
    }

    #[test]
    fn rejected_candidate_can_keep_diagram() {
        let (_tmp, store) = store();
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Reject)]),
            StructuralPolicy::default(),
        )
        .keep_rejected_diagrams(true);
        let record = manager
            .process(Candidate::new("text".into(), valid_net()))
            .unwrap();
        assert!(record.has_diagram);
    }

    #[test]
    fn render_failure_does_not_block_review() {
        let (_tmp, store) = store();
        let mut reviewer = ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]);
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: true },
            &mut reviewer,
            StructuralPolicy::default(),
        );
        let record = manager
            .process(Candidate::new("text".into(), valid_net()))
            .unwrap();
        drop(manager);

        assert_eq!(record.final_state, CandidateState::Approved);
        assert!(!record.has_diagram);
        assert_eq!(reviewer.saw_diagram, vec![false]);
    }

    #[test]
    fn aborted_review_purges_staging_and_persists_nothing() {
        let (_tmp, store) = store();
        let mut reviewer = ScriptedReviewer::deciding(vec![Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "reviewer went away",
        ))]);
        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            &mut reviewer,
            StructuralPolicy::default(),
        );
        let err = manager
            .process(Candidate::new("text".into(), valid_net()))
            .unwrap_err();
        drop(manager);

        assert!(matches!(err, LifecycleError::ReviewAborted { .. }));
        assert_eq!(reviewer.staged_present, vec![true]);
        assert!(review_temp_is_empty(&store));
        for bucket in Bucket::SYNTHESIZED {
            assert_eq!(store.census(bucket).unwrap().complete, 0);
        }
    }

    #[test]
    fn persistence_failure_still_purges_staging() {
        let (tmp, store) = store();
        // A file where the bucket directory should be makes allocation fail.
        let synthesized = tmp.path().join("outputs/synthesized_data");
        fs::create_dir_all(&synthesized).unwrap();
        fs::write(synthesized.join("approved"), "not a directory").unwrap();

        let mut manager = LifecycleManager::new(
            store.clone(),
            FixedVisualizer { fail: false },
            ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]),
            StructuralPolicy::default(),
        );
        let err = manager
            .process(Candidate::new("text".into(), valid_net()))
            .unwrap_err();

        let failure = err.persistence_failure().unwrap();
        assert_eq!(failure.bucket, Bucket::Approved);
        assert!(failure.id.is_none());
        assert!(review_temp_is_empty(&store));
    }

    #[test]
    fn isolated_marked_place_passes_when_policy_allows() {
        let (_tmp, store) = store();
        let raw = json!({
            "places": {"p1": "idle", "sink": "done"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1, "sink": 1}
        });
        let mut manager = LifecycleManager::new(
            store,
            FixedVisualizer { fail: false },
            ScriptedReviewer::deciding(vec![Ok(ReviewDecision::Accept)]),
            StructuralPolicy {
                allow_isolated_marked_places: true,
            },
        );
        let record = manager.process(Candidate::new("text".into(), raw)).unwrap();
        assert_eq!(record.final_state, CandidateState::Approved);
    }
}
