//! Error taxonomy for record classification

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Required fields missing, empty, or of the wrong type
    #[error("invalid record: {}", problems.join("; "))]
    Validation { problems: Vec<String> },

    #[error("unknown {field} value: {value:?}")]
    UnknownCategory { field: &'static str, value: String },

    #[error("encoded vector does not match model input: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("failed to load artifact {}: {reason}", path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("model inference failed: {0}")]
    Inference(String),
}

impl ClassifyError {
    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ClassifyError::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable identifier used in verdicts and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyError::Validation { .. } => "validation",
            ClassifyError::UnknownCategory { .. } => "unknown_category",
            ClassifyError::ShapeMismatch { .. } => "shape_mismatch",
            ClassifyError::ArtifactLoad { .. } => "artifact_load",
            ClassifyError::Inference(_) => "inference",
        }
    }

    /// Whether the submitter can fix the problem by correcting the record.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ClassifyError::Validation { .. } | ClassifyError::UnknownCategory { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClassifyError>;
