use rekey_plan::{PlanError, ValidationReport};
use thiserror::Error;

/// Errors emitted while building or running an execution plan.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Core(#[from] rekey_core::Error),
    #[error("manifest error: {0}")]
    Plan(#[from] PlanError),
    #[error("invalid manifest:\n{0}")]
    InvalidManifest(ValidationReport),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    /// The core error kind, when this error carries one.
    pub fn core(&self) -> Option<&rekey_core::Error> {
        match self {
            ImportError::Core(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for engine operations and user-supplied blocks.
pub type Result<T> = std::result::Result<T, ImportError>;
