//! Durable placement of samples into bucket directories.
//!
//! Layout under the configured roots:
//!
//! ```text
//! <data_dir>/hand_made/sample_01_text.txt, sample_01_petri.json
//! <outputs_dir>/synthesized_data/<bucket>/<NNNN>/<stem>_text.txt
//!                                               /<stem>_petri.json
//!                                               /<stem>.pdf          (optional)
//!                                               /<stem>_report.json  (auto-rejected)
//!                                               /<stem>_raw_output.txt (unusable model output)
//!                                               /manifest.json       (written last)
//! <outputs_dir>/review_temp/<candidate_id>_*
//! ```
//!
//! A sample id is claimed with an exclusive `create_dir`, so independent
//! processes never hand out the same id. Every artifact is written to a
//! hidden temp file and renamed into place. The manifest is the completion
//! marker: a directory without one is an abandoned bundle and is never
//! returned by the read operations.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "manifest.json";
const MAX_ALLOCATION_ATTEMPTS: u32 = 64;
const ID_WIDTH: usize = 4;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A durable persistence category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Approved,
    RejectedManual,
    InvalidAutoRejected,
    HandMade,
}

impl Bucket {
    /// Buckets the pipeline writes into.
    pub const SYNTHESIZED: [Bucket; 3] = [
        Bucket::Approved,
        Bucket::RejectedManual,
        Bucket::InvalidAutoRejected,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Bucket::Approved => "approved",
            Bucket::RejectedManual => "rejected_manual",
            Bucket::InvalidAutoRejected => "invalid_auto_rejected",
            Bucket::HandMade => "hand_made",
        }
    }

    /// Status word embedded in file stems.
    pub fn status_suffix(self) -> &'static str {
        match self {
            Bucket::Approved => "approved",
            Bucket::RejectedManual => "rejected_manual",
            Bucket::InvalidAutoRejected => "autorejected",
            Bucket::HandMade => "hand_made",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Opaque, zero-padded sequence id of a sample within its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    fn from_seq(n: u64) -> Self {
        Self(format!("{n:0width$}", width = ID_WIDTH))
    }

    fn parse(name: &str) -> Option<u64> {
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        name.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    PetriJson,
    Diagram,
    Report,
    RawOutput,
}

impl ArtifactKind {
    pub fn file_name(self, stem: &str) -> String {
        match self {
            ArtifactKind::Text => format!("{stem}_text.txt"),
            ArtifactKind::PetriJson => format!("{stem}_petri.json"),
            ArtifactKind::Diagram => format!("{stem}.pdf"),
            ArtifactKind::Report => format!("{stem}_report.json"),
            ArtifactKind::RawOutput => format!("{stem}_raw_output.txt"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

/// The files of one sample, named after a common stem.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub stem: String,
    pub items: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new(stem: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            items: Vec::new(),
        }
    }

    pub fn with(mut self, kind: ArtifactKind, bytes: impl Into<Vec<u8>>) -> Self {
        self.items.push(Artifact {
            kind,
            bytes: bytes.into(),
        });
        self
    }

    /// Pretty-printed JSON artifact.
    pub fn with_json<T: Serialize>(self, kind: ArtifactKind, value: &T) -> serde_json::Result<Self> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Ok(self.with(kind, bytes))
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.items.iter().find(|a| a.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: ArtifactKind,
    pub file: String,
}

/// Completion marker and index of a persisted bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub bucket: Bucket,
    pub id: SampleId,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub artifacts: Vec<ManifestEntry>,
    pub persisted_at: DateTime<Utc>,
}

/// A complete bundle as found on disk.
#[derive(Debug, Clone)]
pub struct PersistedSample {
    pub dir: PathBuf,
    pub manifest: Manifest,
}

impl PersistedSample {
    pub fn path_of(&self, kind: ArtifactKind) -> Option<PathBuf> {
        self.manifest
            .artifacts
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| self.dir.join(&e.file))
    }
}

/// A scenario text with its raw net, read back from a bucket.
#[derive(Debug, Clone)]
pub struct LoadedPair {
    pub text: String,
    pub petri_json: serde_json::Value,
    pub json_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum PersistenceCause {
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no free id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },
    #[error("bucket is read-only")]
    ReadOnlyBucket,
    #[error("sample directory was not claimed with allocate_id")]
    Unclaimed,
    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// A failed `allocate_id` or `persist` call, with enough detail to recover
/// by hand.
#[derive(Debug, Error)]
#[error("persisting {} into {bucket} failed: {cause}", .id.as_ref().map_or("<unallocated>", SampleId::as_str))]
pub struct PersistenceFailure {
    pub bucket: Bucket,
    pub id: Option<SampleId>,
    /// Artifacts that had been moved into place before the failure.
    pub partial_artifacts: Vec<PathBuf>,
    /// Whether every partial artifact was removed again and the claim
    /// released.
    pub rolled_back: bool,
    #[source]
    pub cause: PersistenceCause,
}

impl PersistenceFailure {
    fn new(bucket: Bucket, id: Option<&SampleId>, cause: PersistenceCause) -> Self {
        Self {
            bucket,
            id: id.cloned(),
            partial_artifacts: Vec::new(),
            rolled_back: true,
            cause,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sample '{0}' not found")]
    NotFound(String),
    #[error("stem '{stem}' names several samples ({}); use <bucket>/<id>", .matches.join(", "))]
    Ambiguous { stem: String, matches: Vec<String> },
    #[error("sample at {} is incomplete (no manifest)", .0.display())]
    Incomplete(PathBuf),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Count of complete and abandoned entries in one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCensus {
    pub complete: usize,
    pub incomplete: usize,
}

/// Owns every write into bucket directories.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    synthesized_root: PathBuf,
    hand_made_dir: PathBuf,
    review_temp_dir: PathBuf,
}

impl RepositoryStore {
    pub fn new(data_dir: &Path, outputs_dir: &Path) -> Self {
        Self {
            synthesized_root: outputs_dir.join("synthesized_data"),
            hand_made_dir: data_dir.join(Bucket::HandMade.dir_name()),
            review_temp_dir: outputs_dir.join("review_temp"),
        }
    }

    pub fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        match bucket {
            Bucket::HandMade => self.hand_made_dir.clone(),
            other => self.synthesized_root.join(other.dir_name()),
        }
    }

    pub fn review_temp_dir(&self) -> &Path {
        &self.review_temp_dir
    }

    /// Claims the next free sequence id in `bucket`.
    ///
    /// The claim is the empty sample directory itself; losing a race to
    /// another process shows up as `AlreadyExists` and moves on to the next
    /// number.
    pub fn allocate_id(&self, bucket: Bucket) -> Result<SampleId, PersistenceFailure> {
        if bucket == Bucket::HandMade {
            return Err(PersistenceFailure::new(bucket, None, PersistenceCause::ReadOnlyBucket));
        }
        let dir = self.bucket_dir(bucket);
        fs::create_dir_all(&dir).map_err(|source| {
            PersistenceFailure::new(
                bucket,
                None,
                PersistenceCause::Io {
                    op: "create bucket",
                    path: dir.clone(),
                    source,
                },
            )
        })?;

        let mut next = self.highest_seq(bucket).map_or(1, |n| n + 1);
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let id = SampleId::from_seq(next);
            let path = dir.join(id.as_str());
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!(%bucket, sample_id = %id, "claimed sample id");
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => next += 1,
                Err(source) => {
                    return Err(PersistenceFailure::new(
                        bucket,
                        Some(&id),
                        PersistenceCause::Io {
                            op: "claim",
                            path,
                            source,
                        },
                    ));
                }
            }
        }
        Err(PersistenceFailure::new(
            bucket,
            None,
            PersistenceCause::IdSpaceExhausted {
                attempts: MAX_ALLOCATION_ATTEMPTS,
            },
        ))
    }

    fn highest_seq(&self, bucket: Bucket) -> Option<u64> {
        let entries = fs::read_dir(self.bucket_dir(bucket)).ok()?;
        entries
            .filter_map(Result::ok)
            .filter_map(|e| SampleId::parse(&e.file_name().to_string_lossy()))
            .max()
    }

    /// Writes every artifact plus the manifest into the claimed directory.
    ///
    /// On failure the artifacts already moved into place are removed and the
    /// claim is released; the returned failure lists what had been written
    /// and whether the rollback removed all of it.
    pub fn persist(
        &self,
        bucket: Bucket,
        id: &SampleId,
        artifacts: &ArtifactSet,
        candidate_id: Option<&str>,
    ) -> Result<PersistedSample, PersistenceFailure> {
        if bucket == Bucket::HandMade {
            return Err(PersistenceFailure::new(bucket, Some(id), PersistenceCause::ReadOnlyBucket));
        }
        let dir = self.bucket_dir(bucket).join(id.as_str());
        if !dir.is_dir() {
            return Err(PersistenceFailure::new(bucket, Some(id), PersistenceCause::Unclaimed));
        }

        let mut moved: Vec<PathBuf> = Vec::with_capacity(artifacts.items.len() + 1);
        let mut entries = Vec::with_capacity(artifacts.items.len());

        for artifact in &artifacts.items {
            let file = artifact.kind.file_name(&artifacts.stem);
            let path = dir.join(&file);
            if let Err(cause) = write_atomic(&path, &artifact.bytes) {
                return Err(self.roll_back(bucket, id, &dir, moved, cause));
            }
            moved.push(path);
            entries.push(ManifestEntry {
                kind: artifact.kind,
                file,
            });
        }

        let manifest = Manifest {
            bucket,
            id: id.clone(),
            stem: artifacts.stem.clone(),
            candidate_id: candidate_id.map(str::to_string),
            artifacts: entries,
            persisted_at: Utc::now(),
        };
        let written = serde_json::to_vec_pretty(&manifest)
            .map_err(PersistenceCause::from)
            .and_then(|bytes| write_atomic(&dir.join(MANIFEST_FILE), &bytes));
        if let Err(cause) = written {
            return Err(self.roll_back(bucket, id, &dir, moved, cause));
        }

        debug!(%bucket, sample_id = %id, files = moved.len(), "persisted sample");
        Ok(PersistedSample { dir, manifest })
    }

    fn roll_back(
        &self,
        bucket: Bucket,
        id: &SampleId,
        dir: &Path,
        moved: Vec<PathBuf>,
        cause: PersistenceCause,
    ) -> PersistenceFailure {
        let mut rolled_back = true;
        for path in &moved {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "rollback could not remove artifact");
                rolled_back = false;
            }
        }
        if rolled_back && let Err(e) = fs::remove_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "could not release sample claim");
            rolled_back = false;
        }
        PersistenceFailure {
            bucket,
            id: Some(id.clone()),
            partial_artifacts: moved,
            rolled_back,
            cause,
        }
    }

    /// Reads the manifest of `bucket/id`; incomplete bundles are an error.
    pub fn load(&self, bucket: Bucket, id: &SampleId) -> Result<PersistedSample, StoreError> {
        let dir = self.bucket_dir(bucket).join(id.as_str());
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("{bucket}/{id}")));
        }
        read_manifest(&dir)
    }

    /// Complete samples in `bucket`, ordered by id.
    pub fn list(&self, bucket: Bucket) -> Result<Vec<PersistedSample>, StoreError> {
        let mut out = Vec::new();
        for dir in self.sample_dirs(bucket)? {
            match read_manifest(&dir) {
                Ok(sample) => out.push(sample),
                Err(StoreError::Incomplete(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub fn census(&self, bucket: Bucket) -> Result<BucketCensus, StoreError> {
        if bucket == Bucket::HandMade {
            let complete = self.hand_made_ids()?.len();
            return Ok(BucketCensus {
                complete,
                incomplete: 0,
            });
        }
        let mut census = BucketCensus::default();
        for dir in self.sample_dirs(bucket)? {
            if dir.join(MANIFEST_FILE).is_file() {
                census.complete += 1;
            } else {
                census.incomplete += 1;
            }
        }
        Ok(census)
    }

    fn sample_dirs(&self, bucket: Bucket) -> Result<Vec<PathBuf>, StoreError> {
        let root = self.bucket_dir(bucket);
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: root, source }),
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| SampleId::parse(&e.file_name().to_string_lossy()).is_some())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Finds a synthesized sample by file stem in `approved` or
    /// `rejected_manual`. A stem shared by several samples is an error.
    pub fn find_by_stem(&self, stem: &str) -> Result<(Bucket, PersistedSample), StoreError> {
        let mut found = Vec::new();
        for bucket in [Bucket::Approved, Bucket::RejectedManual] {
            found.extend(
                self.list(bucket)?
                    .into_iter()
                    .filter(|s| s.manifest.stem == stem)
                    .map(|s| (bucket, s)),
            );
        }
        match found.len() {
            0 => Err(StoreError::NotFound(stem.to_string())),
            1 => Ok(found.remove(0)),
            _ => Err(StoreError::Ambiguous {
                stem: stem.to_string(),
                matches: found
                    .iter()
                    .map(|(bucket, s)| format!("{bucket}/{}", s.manifest.id))
                    .collect(),
            }),
        }
    }

    /// Resolves a synthesized sample given as `<bucket>/<id>` or as a stem.
    pub fn resolve(&self, key: &str) -> Result<(Bucket, PersistedSample), StoreError> {
        if let Some((name, id)) = key.split_once('/')
            && let Some(bucket) = Bucket::SYNTHESIZED.into_iter().find(|b| b.dir_name() == name)
            && let Some(seq) = SampleId::parse(id)
        {
            return Ok((bucket, self.load(bucket, &SampleId::from_seq(seq))?));
        }
        self.find_by_stem(key)
    }

    /// Reads the text and raw JSON of a persisted sample.
    pub fn read_pair(&self, sample: &PersistedSample) -> Result<LoadedPair, StoreError> {
        let missing = || StoreError::NotFound(sample.manifest.stem.clone());
        let text_path = sample.path_of(ArtifactKind::Text).ok_or_else(missing)?;
        let json_path = sample.path_of(ArtifactKind::PetriJson).ok_or_else(missing)?;
        read_pair_files(&text_path, &json_path)
    }

    /// Ids of hand-made samples (`sample_01`, ...) sorted by name.
    pub fn hand_made_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.hand_made_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.hand_made_dir.clone(),
                    source,
                });
            }
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix("_text.txt")
                    .filter(|id| id.starts_with("sample_"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn load_hand_made(&self, sample_id: &str) -> Result<LoadedPair, StoreError> {
        let text_path = self
            .hand_made_dir
            .join(ArtifactKind::Text.file_name(sample_id));
        let json_path = self
            .hand_made_dir
            .join(ArtifactKind::PetriJson.file_name(sample_id));
        if !text_path.is_file() || !json_path.is_file() {
            return Err(StoreError::NotFound(sample_id.to_string()));
        }
        read_pair_files(&text_path, &json_path)
    }

    /// Writes review copies of a candidate's artifacts into `review_temp`.
    ///
    /// Staged files are named `<candidate_id>_...` so that leftovers can be
    /// traced back to the candidate that produced them.
    pub fn stage(&self, candidate_id: &str, artifacts: &ArtifactSet) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.review_temp_dir)?;
        let mut staged = Vec::with_capacity(artifacts.items.len());
        for artifact in &artifacts.items {
            let path = self
                .review_temp_dir
                .join(artifact.kind.file_name(candidate_id));
            write_atomic(&path, &artifact.bytes).map_err(|cause| match cause {
                PersistenceCause::Io { source, .. } => source,
                other => io::Error::other(other.to_string()),
            })?;
            staged.push(path);
        }
        Ok(staged)
    }

    /// Removes every staged file of `candidate_id`; returns how many.
    ///
    /// A file that cannot be removed does not stop the others from being
    /// removed; the first error is returned afterwards.
    pub fn purge_staging(&self, candidate_id: &str) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.review_temp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let prefix = format!("{candidate_id}_");
        let pdf = format!("{candidate_id}.pdf");
        let mut removed = 0;
        let mut first_error = None;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !(name.starts_with(&prefix) || name == pdf) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(file = %entry.path().display(), error = %e, "could not remove staged file");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Staged files of candidates that never reached a terminal state.
    pub fn abandoned_staging(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.review_temp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut out: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("candidate_"))
            .map(|e| e.path())
            .collect();
        out.sort();
        Ok(out)
    }

    /// Writes a one-off file into `review_temp`.
    pub fn write_scratch(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, PersistenceCause> {
        let path = self.review_temp_dir.join(file_name);
        write_atomic(&path, bytes)?;
        Ok(path)
    }
}

/// RAII guard that purges a candidate's staged files when dropped, on every
/// exit path.
pub struct StagingGuard<'a> {
    store: &'a RepositoryStore,
    candidate_id: String,
}

impl<'a> StagingGuard<'a> {
    pub fn new(store: &'a RepositoryStore, candidate_id: &str) -> Self {
        Self {
            store,
            candidate_id: candidate_id.to_string(),
        }
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        match self.store.purge_staging(&self.candidate_id) {
            Ok(n) => debug!(candidate_id = %self.candidate_id, removed = n, "purged review staging"),
            Err(e) => warn!(candidate_id = %self.candidate_id, error = %e, "could not purge review staging"),
        }
    }
}

fn read_manifest(dir: &Path) -> Result<PersistedSample, StoreError> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::Incomplete(dir.to_path_buf()));
        }
        Err(source) => return Err(StoreError::Io { path, source }),
    };
    let manifest = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })?;
    Ok(PersistedSample {
        dir: dir.to_path_buf(),
        manifest,
    })
}

fn read_pair_files(text_path: &Path, json_path: &Path) -> Result<LoadedPair, StoreError> {
    let text = fs::read_to_string(text_path).map_err(|source| StoreError::Io {
        path: text_path.to_path_buf(),
        source,
    })?;
    let raw = fs::read(json_path).map_err(|source| StoreError::Io {
        path: json_path.to_path_buf(),
        source,
    })?;
    let petri_json = serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
        path: json_path.to_path_buf(),
        source,
    })?;
    Ok(LoadedPair {
        text,
        petri_json,
        json_path: json_path.to_path_buf(),
    })
}

/// Writes to a hidden sibling temp file, syncs it, then renames it over
/// `path`. The temp file never outlives a failed call.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceCause> {
    let io_err = |op: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| PersistenceCause::Io { op, path, source }
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err("create dir", parent))?;
    }
    let tmp = temp_path_next_to(path);
    if let Err(source) = write_synced(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err("write temp", &tmp)(source));
    }
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err("rename", path)(source));
    }
    Ok(())
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn temp_path_next_to(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let pid = std::process::id();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{file_name}.{pid}.{n}.tmp"))
}
