//! Segmentation model: standardization plus nearest-centroid assignment

use crate::error::{ArtifactKind, Result, SegmentError};
use crate::segments::KnowledgeBase;
use crate::store::ArtifactStore;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Feature order shared by training, inference and the dataset
pub const FEATURE_NAMES: [&str; 2] = ["Annual_Income", "Spending_Score"];
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

pub const MODEL_TYPE: &str = "KMeans Clustering";

/// Per-feature centering and scaling learned from training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl ScalerState {
    pub fn new(mean: [f64; FEATURE_COUNT], scale: [f64; FEATURE_COUNT]) -> Self {
        Self { mean, scale }
    }

    /// Fit on raw features (n_samples, 2) using the population standard deviation
    ///
    /// Constant features get a scale of 1.0 so they pass through centered.
    pub fn fit(features: &Array2<f64>) -> Option<Self> {
        if features.ncols() != FEATURE_COUNT || features.nrows() == 0 {
            return None;
        }
        let mean = features.mean_axis(Axis(0))?;
        let std = features.std_axis(Axis(0), 0.0);

        let mut state = Self::new([0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]);
        for j in 0..FEATURE_COUNT {
            state.mean[j] = mean[j];
            if std[j] > 0.0 {
                state.scale[j] = std[j];
            }
        }
        Some(state)
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }

    pub fn transform(&self, raw: [f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            out[j] = (raw[j] - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn inverse_transform(&self, scaled: [f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            out[j] = scaled[j] * self.scale[j] + self.mean[j];
        }
        out
    }

    /// Standardize every row of a raw feature matrix
    pub fn transform_matrix(&self, raw: &Array2<f64>) -> Array2<f64> {
        let mean = Array1::from(self.mean.to_vec());
        let scale = Array1::from(self.scale.to_vec());
        (raw - &mean) / &scale
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("scaler mean must be finite".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err("scaler scale must be finite and non-zero".to_string());
        }
        Ok(())
    }
}

/// Rule for picking among equidistant centroids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First centroid in fit order wins
    #[default]
    LowestIndex,
    HighestIndex,
}

/// K centroids in standardized space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModelState {
    centroids: Array2<f64>,
}

impl ClusterModelState {
    pub fn new(centroids: Array2<f64>) -> Self {
        Self { centroids }
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Index of the nearest centroid by squared Euclidean distance
    pub fn assign(&self, point: ArrayView1<f64>, tie_break: TieBreak) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;

        for (idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(point, centroid);

            let closer = match tie_break {
                TieBreak::LowestIndex => distance < best_distance,
                TieBreak::HighestIndex => distance <= best_distance,
            };
            if closer {
                best_distance = distance;
                best = idx;
            }
        }

        best
    }

    /// Assign every row of a standardized feature matrix
    pub fn assign_all(&self, points: &Array2<f64>, tie_break: TieBreak) -> Vec<usize> {
        points
            .outer_iter()
            .map(|row| self.assign(row, tie_break))
            .collect()
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.centroids.nrows() == 0 {
            return Err("cluster model has no centroids".to_string());
        }
        if self.centroids.ncols() != FEATURE_COUNT {
            return Err(format!(
                "expected {} centroid columns, found {}",
                FEATURE_COUNT,
                self.centroids.ncols()
            ));
        }
        if self.centroids.iter().any(|v| !v.is_finite()) {
            return Err("centroids must be finite".to_string());
        }
        Ok(())
    }
}

pub(crate) fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Segment id and configured name for one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentAssignment {
    /// Index of the nearest centroid
    pub segment_id: usize,
    pub segment_name: String,
}

/// Centroid restored to original feature units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Centroid {
    pub segment_id: usize,
    pub segment_name: String,
    /// Centroid income in thousands of dollars
    pub annual_income: f64,
    pub spending_score: f64,
}

/// Model metadata and readiness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: &'static str,
    /// Loaded centroids, or the configured segment count when not ready
    pub cluster_count: usize,
    /// Feature order expected by the scaler
    pub feature_names: Vec<&'static str>,
    pub ready: bool,
    /// Equal to `ready`; both artifacts load together
    pub scaler_ready: bool,
    /// Knowledge base names in segment id order
    pub segment_names: Vec<String>,
}

/// The scaler and cluster model, always swapped in together
#[derive(Debug)]
struct Fitted {
    scaler: ScalerState,
    clusters: ClusterModelState,
}

/// Owns the loaded artifacts and serves inference over them
///
/// Lifecycle is construct (not ready) -> `load`/`save` (ready). Readers clone
/// an `Arc` to the current pair, so the write lock only covers the swap.
#[derive(Debug)]
pub struct SegmentationModel {
    store: ArtifactStore,
    knowledge: Arc<KnowledgeBase>,
    tie_break: TieBreak,
    fitted: RwLock<Option<Arc<Fitted>>>,
}

impl SegmentationModel {
    pub fn new(store: ArtifactStore, knowledge: Arc<KnowledgeBase>, tie_break: TieBreak) -> Self {
        Self {
            store,
            knowledge,
            tie_break,
            fitted: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn is_ready(&self) -> bool {
        self.fitted.read().is_some()
    }

    /// Load both artifacts from the store; prior state survives a failure
    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Model artifacts not loaded");
                false
            }
        }
    }

    pub fn try_load(&self) -> Result<()> {
        let (scaler, clusters) = self.store.load()?;
        let n_clusters = clusters.n_clusters();
        self.swap_in(scaler, clusters);
        tracing::info!(
            dir = %self.store.dir().display(),
            n_clusters,
            "Model artifacts loaded"
        );
        Ok(())
    }

    /// Persist a freshly fitted pair, then make it the active model
    pub fn save(&self, scaler: ScalerState, clusters: ClusterModelState) -> bool {
        match self.try_save(scaler, clusters) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Saving model artifacts failed");
                false
            }
        }
    }

    pub fn try_save(&self, scaler: ScalerState, clusters: ClusterModelState) -> Result<()> {
        scaler.validate().map_err(|reason| SegmentError::ArtifactCorrupt {
            artifact: ArtifactKind::Scaler,
            path: self.store.path_for(ArtifactKind::Scaler),
            reason,
        })?;
        clusters
            .validate()
            .map_err(|reason| SegmentError::ArtifactCorrupt {
                artifact: ArtifactKind::ClusterModel,
                path: self.store.path_for(ArtifactKind::ClusterModel),
                reason,
            })?;

        self.store.save(&scaler, &clusters)?;
        self.swap_in(scaler, clusters);
        tracing::info!(dir = %self.store.dir().display(), "Model artifacts saved");
        Ok(())
    }

    fn swap_in(&self, scaler: ScalerState, clusters: ClusterModelState) {
        *self.fitted.write() = Some(Arc::new(Fitted { scaler, clusters }));
    }

    fn current(&self) -> Result<Arc<Fitted>> {
        self.fitted.read().clone().ok_or(SegmentError::ModelNotReady)
    }

    /// Assign raw (income, spending score) to a segment
    ///
    /// # Arguments
    /// * `annual_income` - Income in thousands of dollars
    /// * `spending_score` - Score on the 1-100 scale
    ///
    /// # Returns
    /// * Nearest segment in standardized space, or `ModelNotReady`
    pub fn predict(&self, annual_income: f64, spending_score: f64) -> Result<SegmentAssignment> {
        let fitted = self.current()?;
        let scaled = fitted.scaler.transform([annual_income, spending_score]);
        let segment_id = fitted
            .clusters
            .assign(ArrayView1::from(&scaled[..]), self.tie_break);

        tracing::debug!(annual_income, spending_score, segment_id, "Predicted segment");

        Ok(SegmentAssignment {
            segment_id,
            segment_name: self.knowledge.name(segment_id as i64).to_string(),
        })
    }

    /// Assign every row of a raw (n_samples, 2) feature matrix
    pub fn assign_batch(&self, raw: &Array2<f64>) -> Result<Vec<usize>> {
        let fitted = self.current()?;
        let scaled = fitted.scaler.transform_matrix(raw);
        Ok(fitted.clusters.assign_all(&scaled, self.tie_break))
    }

    /// Centroids in original units, ascending by segment id
    pub fn centroids(&self) -> Result<Vec<Centroid>> {
        let fitted = self.current()?;
        Ok(fitted
            .clusters
            .centroids()
            .outer_iter()
            .enumerate()
            .map(|(segment_id, row)| {
                let [annual_income, spending_score] =
                    fitted.scaler.inverse_transform([row[0], row[1]]);
                Centroid {
                    segment_id,
                    segment_name: self.knowledge.name(segment_id as i64).to_string(),
                    annual_income,
                    spending_score,
                }
            })
            .collect())
    }

    pub fn info(&self) -> ModelInfo {
        let fitted = self.fitted.read().clone();
        ModelInfo {
            model_type: MODEL_TYPE,
            cluster_count: fitted
                .as_ref()
                .map(|f| f.clusters.n_clusters())
                .unwrap_or_else(|| self.knowledge.len()),
            feature_names: FEATURE_NAMES.to_vec(),
            ready: fitted.is_some(),
            scaler_ready: fitted.is_some(),
            segment_names: self
                .knowledge
                .iter()
                .map(|(_, profile)| profile.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn three_centroid_model(dir: &std::path::Path) -> SegmentationModel {
        let model = SegmentationModel::new(
            ArtifactStore::new(dir),
            Arc::new(KnowledgeBase::default()),
            TieBreak::LowestIndex,
        );
        let saved = model.save(
            ScalerState::new([50.0, 50.0], [20.0, 20.0]),
            ClusterModelState::new(array![[-1.0, -1.0], [0.0, 0.0], [1.0, 1.0]]),
        );
        assert!(saved);
        model
    }

    #[test]
    fn test_scaler_fit_matches_population_std() {
        let raw = array![[10.0, 1.0], [20.0, 1.0], [30.0, 1.0]];
        let scaler = ScalerState::fit(&raw).unwrap();

        assert_eq!(scaler.mean(), &[20.0, 1.0]);
        assert!((scaler.scale()[0] - (200.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // Constant column keeps unit scale
        assert_eq!(scaler.scale()[1], 1.0);
    }

    #[test]
    fn test_scaler_inverse_restores_input() {
        let scaler = ScalerState::new([60.5, 50.2], [26.2, 25.8]);
        let raw = [87.0, 13.0];
        let back = scaler.inverse_transform(scaler.transform(raw));
        assert!((back[0] - raw[0]).abs() < 1e-9);
        assert!((back[1] - raw[1]).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_and_single_transform_agree() {
        let scaler = ScalerState::new([60.5, 50.2], [26.2, 25.8]);
        let raw = array![[15.0, 39.0], [137.0, 83.0]];
        let scaled = scaler.transform_matrix(&raw);
        for (i, row) in raw.outer_iter().enumerate() {
            let single = scaler.transform([row[0], row[1]]);
            assert_eq!(scaled[[i, 0]], single[0]);
            assert_eq!(scaled[[i, 1]], single[1]);
        }
    }

    #[test]
    fn test_standardized_nearest_centroid() {
        let dir = tempdir().unwrap();
        let model = three_centroid_model(dir.path());

        let assignment = model.predict(90.0, 90.0).unwrap();
        assert_eq!(assignment.segment_id, 2);
        assert_eq!(assignment.segment_name, "Young Trendsetter");

        assert_eq!(model.predict(50.0, 50.0).unwrap().segment_id, 1);
        assert_eq!(model.predict(0.0, 1.0).unwrap().segment_id, 0);
    }

    #[test]
    fn test_tie_break() {
        let clusters = ClusterModelState::new(array![[-1.0, 0.0], [1.0, 0.0]]);
        let midpoint = array![0.0, 0.0];

        assert_eq!(clusters.assign(midpoint.view(), TieBreak::LowestIndex), 0);
        assert_eq!(clusters.assign(midpoint.view(), TieBreak::HighestIndex), 1);
    }

    #[test]
    fn test_not_ready_until_loaded() {
        let dir = tempdir().unwrap();
        let model = SegmentationModel::new(
            ArtifactStore::new(dir.path()),
            Arc::new(KnowledgeBase::default()),
            TieBreak::default(),
        );

        assert!(!model.is_ready());
        assert!(matches!(model.predict(50.0, 50.0), Err(SegmentError::ModelNotReady)));
        assert!(matches!(model.centroids(), Err(SegmentError::ModelNotReady)));
        assert!(!model.load());
        assert!(!model.is_ready());

        let info = model.info();
        assert!(!info.ready);
        assert!(!info.scaler_ready);
        assert_eq!(info.cluster_count, 5);
    }

    #[test]
    fn test_centroids_in_original_units() {
        let dir = tempdir().unwrap();
        let model = three_centroid_model(dir.path());

        let centroids = model.centroids().unwrap();
        assert_eq!(centroids.len(), 3);
        let ids: Vec<usize> = centroids.iter().map(|c| c.segment_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(centroids[0].annual_income, 30.0);
        assert_eq!(centroids[0].spending_score, 30.0);
        assert_eq!(centroids[2].annual_income, 70.0);
        assert_eq!(centroids[1].segment_name, "VIP / Whale");
    }

    #[test]
    fn test_failed_load_keeps_ready_model() {
        let dir = tempdir().unwrap();
        let model = three_centroid_model(dir.path());
        let before = model.predict(90.0, 90.0).unwrap();

        std::fs::write(model.store().path_for(ArtifactKind::Scaler), b"garbage")
            .unwrap();
        assert!(!model.load());

        assert!(model.is_ready());
        assert_eq!(model.predict(90.0, 90.0).unwrap(), before);
    }

    #[test]
    fn test_invalid_pair_not_saved() {
        let dir = tempdir().unwrap();
        let model = SegmentationModel::new(
            ArtifactStore::new(dir.path()),
            Arc::new(KnowledgeBase::default()),
            TieBreak::default(),
        );

        let saved = model.save(
            ScalerState::new([50.0, 50.0], [0.0, 20.0]),
            ClusterModelState::new(array![[0.0, 0.0]]),
        );
        assert!(!saved);
        assert!(!model.is_ready());
    }

    #[test]
    fn test_unwritable_store_leaves_model_unready() {
        let dir = tempdir().unwrap();
        let occupied = dir.path().join("artifacts");
        std::fs::write(&occupied, b"not a directory").unwrap();
        let model = SegmentationModel::new(
            ArtifactStore::new(&occupied),
            Arc::new(KnowledgeBase::default()),
            TieBreak::default(),
        );

        let saved = model.save(
            ScalerState::new([50.0, 50.0], [20.0, 20.0]),
            ClusterModelState::new(array![[-1.0, -1.0], [1.0, 1.0]]),
        );
        assert!(!saved);
        assert!(!model.is_ready());
        assert!(matches!(model.predict(50.0, 50.0), Err(SegmentError::ModelNotReady)));
    }

    #[test]
    fn test_failed_save_keeps_previous_pair() {
        let dir = tempdir().unwrap();
        let model = three_centroid_model(dir.path());
        let before = model.predict(90.0, 90.0).unwrap();

        std::fs::create_dir(dir.path().join("scaler.json.tmp")).unwrap();
        let saved = model.save(
            ScalerState::new([0.0, 0.0], [1.0, 1.0]),
            ClusterModelState::new(array![[500.0, 500.0], [-500.0, -500.0]]),
        );
        assert!(!saved);

        assert!(model.is_ready());
        assert_eq!(model.predict(90.0, 90.0).unwrap(), before);
        assert_eq!(model.info().cluster_count, 3);
    }

    #[test]
    fn test_info_when_ready() {
        let dir = tempdir().unwrap();
        let model = three_centroid_model(dir.path());
        let info = model.info();

        assert_eq!(info.model_type, "KMeans Clustering");
        assert_eq!(info.cluster_count, 3);
        assert_eq!(info.feature_names, vec!["Annual_Income", "Spending_Score"]);
        assert!(info.ready && info.scaler_ready);
    }
}
