use serde_json::json;
use tracing::{error, info, warn};

use crate::error::PetrigenError;
use crate::generator::{FewShotExample, GenerationFailure, Generator, PromptContext};
use crate::lifecycle::{Candidate, DispositionRecord, LifecycleError, LifecycleManager, Reviewer};
use crate::net::validate;
use crate::store::{ArtifactKind, ArtifactSet, Bucket, PersistedSample};
use crate::visualizer::Visualizer;

/// Hooks for operator-facing progress output.
pub trait RunObserver {
    fn generating(&self, _index: usize, _total: usize) {}
    fn generation_finished(&self, _result: Result<(), &GenerationFailure>) {}
    fn disposed(&self, _record: &DispositionRecord) {}
    fn lifecycle_failed(&self, _error: &LifecycleError) {}
}

impl RunObserver for () {}

/// Outcome counts of a forward-generation run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub requested: usize,
    pub approved: usize,
    pub rejected_manual: usize,
    pub auto_rejected: usize,
    pub generation_failures: usize,
    pub lifecycle_failures: usize,
    pub records: Vec<DispositionRecord>,
}

impl RunSummary {
    fn record(&mut self, record: DispositionRecord) {
        match record.bucket {
            Bucket::Approved => self.approved += 1,
            Bucket::RejectedManual => self.rejected_manual += 1,
            Bucket::InvalidAutoRejected => self.auto_rejected += 1,
            Bucket::HandMade => {}
        }
        self.records.push(record);
    }

    /// Whether anything went wrong that the operator must look at.
    pub fn has_failures(&self) -> bool {
        self.lifecycle_failures > 0
    }
}

/// Generation front end to the candidate lifecycle.
pub struct SynthesisPipeline<G, V, R> {
    generator: G,
    lifecycle: LifecycleManager<V, R>,
}

impl<G: Generator, V: Visualizer, R: Reviewer> SynthesisPipeline<G, V, R> {
    pub fn new(generator: G, lifecycle: LifecycleManager<V, R>) -> Self {
        Self {
            generator,
            lifecycle,
        }
    }

    /// Logs staging files left behind by an earlier, interrupted run.
    pub fn report_abandoned_staging(&self) {
        match self.lifecycle.store().abandoned_staging() {
            Ok(files) if !files.is_empty() => {
                warn!(
                    count = files.len(),
                    dir = %self.lifecycle.store().review_temp_dir().display(),
                    "found review staging files from an interrupted run"
                );
                for file in files {
                    warn!(file = %file.display(), "abandoned staging file");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not inspect review staging"),
        }
    }

    /// Up to `count` hand-made pairs whose nets pass validation.
    pub fn build_few_shot(&self, count: usize) -> Result<Vec<FewShotExample>, PetrigenError> {
        let store = self.lifecycle.store();
        let mut examples = Vec::with_capacity(count);
        for id in store.hand_made_ids()? {
            if examples.len() >= count {
                break;
            }
            let pair = match store.load_hand_made(&id) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(sample = %id, error = %e, "skipping unreadable few-shot example");
                    continue;
                }
            };
            if let Err(failure) = validate(&pair.petri_json, self.lifecycle.policy()) {
                warn!(sample = %id, errors = failure.error_count(), "skipping invalid few-shot example");
                continue;
            }
            examples.push(FewShotExample {
                scenario_text: pair.text,
                petri_json: pair.petri_json,
            });
        }
        if examples.len() < count {
            warn!(wanted = count, found = examples.len(), "fewer valid few-shot examples than requested");
        }
        Ok(examples)
    }

    /// Generates `count` candidates one at a time and drives each through
    /// the lifecycle.
    ///
    /// Generation failures and per-candidate persistence failures are
    /// counted and the run moves on; an aborted review ends the run.
    pub async fn forward_generation(
        &mut self,
        ctx: &PromptContext,
        count: usize,
        observer: &impl RunObserver,
    ) -> Result<RunSummary, PetrigenError> {
        let mut summary = RunSummary {
            requested: count,
            ..RunSummary::default()
        };

        for index in 0..count {
            observer.generating(index + 1, count);
            let pair = match self.generator.generate(ctx).await {
                Ok(pair) => {
                    observer.generation_finished(Ok(()));
                    pair
                }
                Err(e) => {
                    observer.generation_finished(Err(&e));
                    warn!(attempt = index + 1, error = %e, "generation failed");
                    summary.generation_failures += 1;
                    if let Err(le) = self.file_unusable_output(&e) {
                        error!(error = %le, "unusable model output could not be recorded");
                        observer.lifecycle_failed(&le);
                        summary.lifecycle_failures += 1;
                    }
                    continue;
                }
            };

            let candidate = Candidate::new(pair.scenario_text, pair.petri_json);
            info!(candidate_id = %candidate.id, "candidate proposed");
            match self.lifecycle.process(candidate) {
                Ok(record) => {
                    observer.disposed(&record);
                    summary.record(record);
                }
                Err(e @ (LifecycleError::ReviewAborted { .. } | LifecycleError::Transition(_))) => {
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, "candidate could not be placed");
                    observer.lifecycle_failed(&e);
                    summary.lifecycle_failures += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Files model output that never became a candidate under
    /// `invalid_auto_rejected`, with a report naming why it was unusable.
    /// Failures that returned no output leave nothing behind.
    fn file_unusable_output(
        &self,
        failure: &GenerationFailure,
    ) -> Result<Option<PersistedSample>, LifecycleError> {
        let Some(output) = failure.raw_output() else {
            return Ok(None);
        };
        let store = self.lifecycle.store();
        let bucket = Bucket::InvalidAutoRejected;
        let candidate_id = Candidate::new_id();
        let short_id = candidate_id.trim_start_matches("candidate_");
        let report = json!({
            "stage": "generation",
            "reason": failure.reason_tag(),
            "error": failure.to_string(),
        });
        let artifacts = ArtifactSet::new(format!("gen_{}_{short_id}", bucket.status_suffix()))
            .with(ArtifactKind::RawOutput, output.as_bytes())
            .with_json(ArtifactKind::Report, &report)
            .map_err(|source| LifecycleError::Encode {
                candidate_id: candidate_id.clone(),
                source,
            })?;
        let persistence = |source| LifecycleError::Persistence {
            candidate_id: candidate_id.clone(),
            source,
        };
        let id = store.allocate_id(bucket).map_err(persistence)?;
        let sample = store
            .persist(bucket, &id, &artifacts, Some(&candidate_id))
            .map_err(persistence)?;
        warn!(
            %bucket,
            sample_id = %id,
            dir = %sample.dir.display(),
            "unusable model output recorded"
        );
        Ok(Some(sample))
    }

    /// Persists paraphrases of a hand-made sample straight into `approved`.
    ///
    /// The source net is validated first; an invalid source produces nothing.
    pub async fn paraphrase(
        &self,
        sample_id: &str,
        count: usize,
    ) -> Result<Vec<PersistedSample>, PetrigenError> {
        let store = self.lifecycle.store();
        let pair = store.load_hand_made(sample_id)?;
        let validated = validate(&pair.petri_json, self.lifecycle.policy()).map_err(|failure| {
            PetrigenError::InvalidSample {
                sample: sample_id.to_string(),
                failure,
            }
        })?;

        let paraphrases = self
            .generator
            .paraphrase(&pair.text, &pair.petri_json, count)
            .await?;
        let net_json = validated.net.to_json();

        let bucket = Bucket::Approved;
        let mut persisted = Vec::with_capacity(paraphrases.len());
        for (i, text) in paraphrases.iter().enumerate() {
            let id = store.allocate_id(bucket)?;
            // The bucket id keeps stems apart across repeated runs.
            let stem = format!(
                "gen_{}_{sample_id}_paraphrase{}_{id}",
                bucket.status_suffix(),
                i + 1
            );
            let artifacts = ArtifactSet::new(stem)
                .with(ArtifactKind::Text, text.as_bytes())
                .with_json(ArtifactKind::PetriJson, &net_json)?;
            let sample = store.persist(bucket, &id, &artifacts, None)?;
            info!(source = %sample_id, sample_id = %id, stem = %sample.manifest.stem, "paraphrase saved");
            persisted.push(sample);
        }
        Ok(persisted)
    }
}
