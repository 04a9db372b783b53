use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::generator::GenerationFailure;
use crate::lifecycle::LifecycleError;
use crate::net::ValidationFailure;
use crate::store::{PersistenceFailure, StoreError};
use crate::visualizer::RenderFailure;

#[derive(Debug, Error)]
pub enum PetrigenError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("sample '{sample}' is invalid: {failure}")]
    InvalidSample {
        sample: String,
        #[source]
        failure: ValidationFailure,
    },

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationFailure),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderFailure),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PetrigenError {
    /// The failed durable write behind this error, if there was one.
    pub fn persistence_failure(&self) -> Option<&PersistenceFailure> {
        match self {
            PetrigenError::Persistence(failure) => Some(failure),
            PetrigenError::Lifecycle(e) => e.persistence_failure(),
            _ => None,
        }
    }
}
