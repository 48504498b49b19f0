//! Prediction service: the business-facing operations over the model

use crate::config::Settings;
use crate::error::{Result, SegmentError};
use crate::model::{ModelInfo, SegmentationModel};
use crate::segments::KnowledgeBase;
use crate::stats::{ClusterStatistics, StatisticsAggregator};
use crate::store::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::{Validate, ValidationError, ValidationErrors};

/// Validated customer features; only constructible through [`FeatureVector::new`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(try_from = "RawFeatureVector")]
pub struct FeatureVector {
    /// Annual income in thousands of dollars
    #[validate(range(min = 0.0, max = 200.0))]
    annual_income: f64,
    #[validate(range(min = 1, max = 100))]
    spending_score: i64,
}

#[derive(Deserialize)]
struct RawFeatureVector {
    annual_income: f64,
    spending_score: i64,
}

impl TryFrom<RawFeatureVector> for FeatureVector {
    type Error = SegmentError;

    fn try_from(raw: RawFeatureVector) -> Result<Self> {
        Self::new(raw.annual_income, raw.spending_score)
    }
}

impl FeatureVector {
    pub fn new(annual_income: f64, spending_score: i64) -> Result<Self> {
        // Range checks let NaN through
        if !annual_income.is_finite() {
            let mut errors = ValidationErrors::new();
            errors.add("annual_income", ValidationError::new("finite"));
            return Err(errors.into());
        }

        let features = Self {
            annual_income,
            spending_score,
        };
        features.validate()?;
        Ok(features)
    }

    pub fn annual_income(&self) -> f64 {
        self.annual_income
    }

    pub fn spending_score(&self) -> i64 {
        self.spending_score
    }
}

/// Segment assignment for one customer, with its marketing guidance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Index of the nearest centroid
    pub segment_id: usize,
    pub segment_name: String,
    /// Echo of the validated input, in thousands of dollars
    pub annual_income: f64,
    /// Echo of the validated input
    pub spending_score: i64,
    pub description: String,
    pub marketing_strategy: String,
}

/// Knowledge base entry as presented to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentInfo {
    pub name: String,
    pub description: String,
    pub marketing_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    /// Always "healthy" while the process answers
    pub status: &'static str,
    /// Whether both artifacts are loaded
    pub model_loaded: bool,
    pub message: &'static str,
}

/// Composes the model, knowledge base and statistics aggregator
#[derive(Debug, Clone)]
pub struct PredictionService {
    model: Arc<SegmentationModel>,
    knowledge: Arc<KnowledgeBase>,
    statistics: StatisticsAggregator,
}

impl PredictionService {
    pub fn new(
        model: Arc<SegmentationModel>,
        knowledge: Arc<KnowledgeBase>,
        statistics: StatisticsAggregator,
    ) -> Self {
        Self {
            model,
            knowledge,
            statistics,
        }
    }

    /// Wire up every component from settings; the model starts not ready
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let knowledge = Arc::new(match &settings.knowledge_base_path {
            Some(path) => KnowledgeBase::from_file(path)?,
            None => KnowledgeBase::default(),
        });
        let model = Arc::new(SegmentationModel::new(
            ArtifactStore::new(&settings.model_dir),
            knowledge.clone(),
            settings.tie_break,
        ));
        let statistics = StatisticsAggregator::new(
            &settings.dataset_path,
            settings.max_dataset_bytes,
            model.clone(),
            knowledge.clone(),
        );
        Ok(Self::new(model, knowledge, statistics))
    }

    pub fn model(&self) -> &Arc<SegmentationModel> {
        &self.model
    }

    pub fn predict_segment(&self, input: &FeatureVector) -> Result<PredictionResult> {
        let assignment = self
            .model
            .predict(input.annual_income(), input.spending_score() as f64)?;
        let profile = self.knowledge.profile(assignment.segment_id as i64);

        Ok(PredictionResult {
            segment_id: assignment.segment_id,
            segment_name: assignment.segment_name,
            annual_income: input.annual_income(),
            spending_score: input.spending_score(),
            description: profile.description.clone(),
            marketing_strategy: profile.marketing_strategy.clone(),
        })
    }

    pub fn cluster_statistics(&self) -> Vec<ClusterStatistics> {
        self.statistics.compute()
    }

    pub fn all_segment_info(&self) -> BTreeMap<usize, SegmentInfo> {
        self.knowledge
            .iter()
            .map(|(id, profile)| {
                (
                    id,
                    SegmentInfo {
                        name: profile.name.clone(),
                        description: profile.description.clone(),
                        marketing_strategy: profile.marketing_strategy.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.model.info()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            model_loaded: self.model.is_ready(),
            message: "Customer segmentation service is running",
        }
    }
}
