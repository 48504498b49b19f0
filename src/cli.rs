//! Command-line interface definitions and argument parsing

use crate::train::TrainingParams;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Customer segment prediction backed by pre-trained K-Means artifacts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (TOML or JSON); environment variables still take precedence
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Predict the segment for one customer
    Predict {
        /// Annual income in thousands of dollars (0-200)
        #[arg(long, allow_negative_numbers = true)]
        income: f64,

        /// Spending score (1-100)
        #[arg(long, allow_negative_numbers = true)]
        spending_score: i64,
    },

    /// Per-segment statistics over the configured dataset
    Clusters,

    /// Names, descriptions and marketing strategies for every segment
    Segments,

    /// Segment centroids in original units
    Centroids,

    /// Model metadata and readiness
    ModelInfo,

    /// Liveness and model readiness
    Health,

    /// Fit the scaler and K-Means model, then save the artifacts
    Train {
        /// Training CSV; defaults to the configured dataset path
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Number of clusters for K-Means
        #[arg(short = 'k', long, default_value = "5")]
        clusters: usize,

        /// Maximum iterations for K-Means algorithm
        #[arg(long, default_value = "300")]
        max_iters: u64,

        /// Tolerance for K-Means convergence
        #[arg(long, default_value = "1e-4")]
        tolerance: f64,

        /// Number of k-means++ restarts
        #[arg(long, default_value = "10")]
        n_runs: usize,

        /// Seed for centroid initialization
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Also write the training rows with a Cluster column to this CSV
        #[arg(long)]
        labeled_output: Option<PathBuf>,
    },
}

impl Command {
    /// Training hyperparameters for the `train` subcommand
    pub fn training_params(&self) -> Option<TrainingParams> {
        match self {
            Command::Train {
                clusters,
                max_iters,
                tolerance,
                n_runs,
                seed,
                ..
            } => Some(TrainingParams {
                n_clusters: *clusters,
                max_iters: *max_iters,
                tolerance: *tolerance,
                n_runs: *n_runs,
                seed: *seed,
                ..TrainingParams::default()
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let args = Args::try_parse_from([
            "segmentforge",
            "predict",
            "--income",
            "90",
            "--spending-score",
            "85",
        ])
        .unwrap();

        match args.command {
            Command::Predict {
                income,
                spending_score,
            } => {
                assert_eq!(income, 90.0);
                assert_eq!(spending_score, 85);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_train_defaults() {
        let args =
            Args::try_parse_from(["segmentforge", "-c", "settings.toml", "train", "-k", "4"])
                .unwrap();

        let params = args.command.training_params().unwrap();
        assert_eq!(params.n_clusters, 4);
        assert_eq!(params.max_iters, 300);
        assert_eq!(params.tolerance, 1e-4);
        assert_eq!(params.n_runs, 10);
        assert_eq!(params.seed, 42);
        assert_eq!(args.config, Some(PathBuf::from("settings.toml")));
    }

    #[test]
    fn test_non_numeric_input_rejected() {
        let result = Args::try_parse_from([
            "segmentforge",
            "predict",
            "--income",
            "lots",
            "--spending-score",
            "85",
        ]);
        assert!(result.is_err());
    }
}
