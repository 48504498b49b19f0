//! Offline training: fit the scaler and K-Means, then persist both artifacts

use crate::data::{feature_matrix, with_segments, write_csv, SegmentDataset};
use crate::model::{squared_distance, ClusterModelState, ScalerState, SegmentationModel, TieBreak};
use anyhow::{bail, Context};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::Path;

pub const MIN_CLUSTERS: usize = 2;
pub const MAX_CLUSTERS: usize = 10;

/// Hyperparameters for a training run
#[derive(Debug, Clone)]
pub struct TrainingParams {
    pub n_clusters: usize,
    pub max_iters: u64,
    pub tolerance: f64,
    /// Independent k-means++ restarts; the lowest inertia wins
    pub n_runs: usize,
    pub seed: u64,
    /// Rule used when labeling the training rows
    pub tie_break: TieBreak,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
            seed: 42,
            tie_break: TieBreak::LowestIndex,
        }
    }
}

/// Summary of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Rows used for fitting
    pub n_samples: usize,
    /// Number of fitted centroids
    pub n_clusters: usize,
    /// Within-cluster sum of squares in standardized space
    pub inertia: f64,
    /// Training rows per segment, indexed by segment id
    pub cluster_sizes: Vec<usize>,
}

/// Fitted artifacts plus the training-set assignments
#[derive(Debug)]
pub struct TrainedSegments {
    /// Standardization learned from the raw features
    pub scaler: ScalerState,
    /// Cluster centroids in standardized space
    pub clusters: ClusterModelState,
    /// Segment of each training row
    pub labels: Array1<usize>,
    pub report: TrainingReport,
}

/// Fit a scaler and K-Means on raw features
///
/// # Arguments
/// * `raw` - (n_samples, 2) matrix of annual income and spending score
/// * `params` - Cluster count, convergence settings and seed
///
/// # Returns
/// * Fitted scaler and centroids with the training-set labels
pub fn fit_segments(raw: &Array2<f64>, params: &TrainingParams) -> crate::Result<TrainedSegments> {
    let n_clusters = params.n_clusters;
    if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&n_clusters) {
        bail!(
            "Number of clusters should be between {} and {} for meaningful customer segmentation",
            MIN_CLUSTERS,
            MAX_CLUSTERS
        );
    }

    if raw.nrows() < n_clusters {
        bail!(
            "Number of data points ({}) must be at least equal to number of clusters ({})",
            raw.nrows(),
            n_clusters
        );
    }

    let scaler = ScalerState::fit(raw).context("Scaler needs a non-empty 2-column matrix")?;
    let features = scaler.transform_matrix(raw);

    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(params.seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .context("K-Means fitting failed")?;

    let clusters = ClusterModelState::new(model.centroids().clone());
    let labels = Array1::from(clusters.assign_all(&features, params.tie_break));

    let report = TrainingReport {
        n_samples,
        n_clusters,
        inertia: compute_inertia(&features, &labels, &clusters),
        cluster_sizes: cluster_sizes(&labels, n_clusters),
    };

    Ok(TrainedSegments {
        scaler,
        clusters,
        labels,
        report,
    })
}

/// Train from a CSV file and hand the artifacts to the model for saving
///
/// When `labeled_output` is given, the input rows are written there with a
/// `Cluster` column attached.
pub fn train_from_csv(
    input: &Path,
    params: &TrainingParams,
    model: &SegmentationModel,
    labeled_output: Option<&Path>,
) -> crate::Result<TrainingReport> {
    let dataset = SegmentDataset::read_csv(input)
        .with_context(|| format!("Failed to read training data from {}", input.display()))?;
    let raw = feature_matrix(dataset.frame())?;
    tracing::info!(rows = raw.nrows(), path = %input.display(), "Training data loaded");

    let trained = fit_segments(&raw, params)?;
    tracing::info!(
        n_clusters = trained.report.n_clusters,
        inertia = trained.report.inertia,
        "Model trained"
    );

    if let Some(out) = labeled_output {
        let segments: Vec<usize> = trained.labels.to_vec();
        let mut labeled = with_segments(dataset.into_frame(), &segments)?;
        write_csv(&mut labeled, out)
            .with_context(|| format!("Failed to write labeled data to {}", out.display()))?;
        tracing::info!(path = %out.display(), "Clustered data saved");
    }

    model
        .try_save(trained.scaler, trained.clusters)
        .context("Failed to save model artifacts")?;

    Ok(trained.report)
}

pub fn cluster_sizes(labels: &Array1<usize>, n_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_clusters];
    for &label in labels.iter() {
        if label < n_clusters {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Within-cluster sum of squared distances in standardized space
fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    clusters: &ClusterModelState,
) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(_, segment)| **segment < clusters.n_clusters())
        .map(|(point, segment)| squared_distance(point, clusters.centroids().row(*segment)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well separated blobs in (income, spending score)
    fn blob_features() -> Array2<f64> {
        let mut rows = Vec::new();
        for (cx, cy) in [(20.0, 20.0), (80.0, 85.0), (110.0, 15.0)] {
            for i in 0..6 {
                let offset = i as f64 - 2.5;
                rows.extend_from_slice(&[cx + offset, cy - offset * 0.5]);
            }
        }
        Array2::from_shape_vec((18, 2), rows).unwrap()
    }

    #[test]
    fn test_fit_segments() {
        let params = TrainingParams {
            n_clusters: 3,
            ..TrainingParams::default()
        };
        let trained = fit_segments(&blob_features(), &params).unwrap();

        assert_eq!(trained.clusters.n_clusters(), 3);
        assert_eq!(trained.labels.len(), 18);
        assert_eq!(trained.report.cluster_sizes, vec![6, 6, 6]);
        assert_eq!(trained.report.cluster_sizes.iter().sum::<usize>(), 18);
        assert!(trained.report.inertia >= 0.0 && trained.report.inertia.is_finite());

        // Each blob maps to a single cluster
        for blob in 0..3 {
            let first = trained.labels[blob * 6];
            assert!((0..6).all(|i| trained.labels[blob * 6 + i] == first));
        }
    }

    #[test]
    fn test_invalid_cluster_count() {
        let features = blob_features();

        let too_few = TrainingParams {
            n_clusters: 1,
            ..TrainingParams::default()
        };
        assert!(fit_segments(&features, &too_few).is_err());

        let too_many = TrainingParams {
            n_clusters: 11,
            ..TrainingParams::default()
        };
        assert!(fit_segments(&features, &too_many).is_err());
    }

    #[test]
    fn test_more_clusters_than_samples() {
        let features = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let params = TrainingParams {
            n_clusters: 3,
            ..TrainingParams::default()
        };
        assert!(fit_segments(&features, &params).is_err());
    }

    #[test]
    fn test_inertia_against_known_centroids() {
        let features =
            Array2::from_shape_vec((3, 2), vec![0.0, 0.0, 2.0, 0.0, 5.0, 5.0]).unwrap();
        let clusters =
            ClusterModelState::new(Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 5.0, 4.0]).unwrap());
        let labels = Array1::from(vec![0, 0, 1]);

        assert_eq!(compute_inertia(&features, &labels, &clusters), 3.0);
    }

    #[test]
    fn test_cluster_sizes_ignores_out_of_range() {
        let labels = Array1::from(vec![0, 1, 1, 7]);
        assert_eq!(cluster_sizes(&labels, 2), vec![1, 2]);
    }
}
