mod model;
mod schema;
mod structure;

pub use model::PetriNet;
pub use schema::{SchemaViolation, validate_schema};
pub use structure::{StructuralFailure, StructuralPolicy, StructuralWarning, validate_structure};

use serde::Serialize;
use thiserror::Error;

/// A net that passed both schema and structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedNet {
    pub net: PetriNet,
    pub warnings: Vec<StructuralWarning>,
}

/// Why a raw document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error(transparent)]
    Schema(SchemaViolation),
    #[error(transparent)]
    Structure(StructuralFailure),
}

impl ValidationFailure {
    /// One line per defect, for terminal output and file names.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ValidationFailure::Schema(v) => vec![v.to_string()],
            ValidationFailure::Structure(f) => f.violations.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn error_count(&self) -> usize {
        match self {
            ValidationFailure::Schema(_) => 1,
            ValidationFailure::Structure(f) => f.violations.len(),
        }
    }
}

/// Schema validation followed by the structural checks.
pub fn validate(
    raw: &serde_json::Value,
    policy: &StructuralPolicy,
) -> Result<ValidatedNet, ValidationFailure> {
    let net = validate_schema(raw).map_err(ValidationFailure::Schema)?;
    let warnings = validate_structure(&net, policy).map_err(ValidationFailure::Structure)?;
    Ok(ValidatedNet { net, warnings })
}
