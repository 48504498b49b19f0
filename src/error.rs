//! Error taxonomy for the segmentation core

use std::path::PathBuf;
use thiserror::Error;

/// Which of the two persisted model components an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Scaler,
    ClusterModel,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::ClusterModel => "cluster model",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SegmentError {
    /// Artifacts have not been loaded (or saved) yet
    #[error("model not ready: load or train the model artifacts first")]
    ModelNotReady,

    #[error("invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{artifact} artifact not found at {}", path.display())]
    ArtifactNotFound {
        artifact: ArtifactKind,
        path: PathBuf,
    },

    #[error("{artifact} artifact at {} is corrupt: {reason}", path.display())]
    ArtifactCorrupt {
        artifact: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    #[error("dataset at {} unavailable: {reason}", path.display())]
    DatasetUnavailable { path: PathBuf, reason: String },

    /// Frame lacks a required column or holds unusable values
    #[error("malformed dataset: {0}")]
    Schema(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] polars::prelude::PolarsError),

    #[error("knowledge base at {} rejected: {reason}", path.display())]
    KnowledgeBase { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for the segmentation core
pub type Result<T, E = SegmentError> = std::result::Result<T, E>;
