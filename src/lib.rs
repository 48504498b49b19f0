//! SegmentForge: customer segment prediction backed by K-Means artifacts
//!
//! Assigns a customer's annual income and spending score to one of the
//! trained segments, returns business guidance for it, and aggregates
//! per-segment statistics over the customer dataset.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod segments;
pub mod service;
pub mod stats;
pub mod store;
pub mod train;

// Re-export public items for easier access
pub use cli::{Args, Command};
pub use config::Settings;
pub use error::SegmentError;
pub use model::{ClusterModelState, ScalerState, SegmentationModel, TieBreak};
pub use segments::{KnowledgeBase, SegmentKind};
pub use service::{FeatureVector, PredictionResult, PredictionService};
pub use stats::{ClusterStatistics, StatisticsAggregator};
pub use store::ArtifactStore;
pub use train::{fit_segments, train_from_csv, TrainingParams};

/// Result type used by the trainer and the command-line front end
pub type Result<T> = anyhow::Result<T>;
