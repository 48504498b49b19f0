//! Per-segment descriptive statistics over the customer dataset

use crate::data::{
    feature_matrix, with_segments, SegmentDataset, AGE_COLUMN, CLUSTER_COLUMN, INCOME_COLUMN,
    SPENDING_COLUMN,
};
use crate::error::{Result, SegmentError};
use crate::model::SegmentationModel;
use crate::segments::KnowledgeBase;
use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Descriptive statistics for one segment present in the dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStatistics {
    /// Segment label as found in (or assigned to) the dataset
    pub segment_id: i64,
    /// Knowledge base name, "Unknown" for unmapped ids
    pub segment_name: String,
    /// Number of customers in the segment
    pub count: usize,
    /// Mean annual income, rounded to two decimals
    pub avg_income: f64,
    /// Mean spending score, rounded to two decimals
    pub avg_spending_score: f64,
    /// Mean age when the dataset has an `Age` column
    pub avg_age: Option<f64>,
}

/// Reads the dataset on every call; nothing is cached
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    dataset_path: PathBuf,
    max_dataset_bytes: Option<u64>,
    model: Arc<SegmentationModel>,
    knowledge: Arc<KnowledgeBase>,
}

impl StatisticsAggregator {
    pub fn new(
        dataset_path: impl Into<PathBuf>,
        max_dataset_bytes: Option<u64>,
        model: Arc<SegmentationModel>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            max_dataset_bytes,
            model,
            knowledge,
        }
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Statistics ascending by segment id, or empty when the dataset is
    /// missing, oversized or unreadable
    pub fn compute(&self) -> Vec<ClusterStatistics> {
        let path = &self.dataset_path;

        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No statistics dataset yet");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Statistics dataset unreadable");
                return Vec::new();
            }
        };
        tracing::debug!(path = %path.display(), bytes = size, "Reading statistics dataset");

        if let Some(limit) = self.max_dataset_bytes {
            if size > limit {
                tracing::warn!(
                    path = %path.display(),
                    bytes = size,
                    limit,
                    "Statistics dataset exceeds size limit"
                );
                return Vec::new();
            }
        }

        let result = SegmentDataset::read_csv(path)
            .and_then(|dataset| summarize(dataset, &self.model, &self.knowledge));

        match result {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Error calculating statistics");
                Vec::new()
            }
        }
    }
}

/// Group a dataset by segment, assigning segments first when unlabeled
///
/// # Arguments
/// * `dataset` - Customer table, labeled or not
/// * `model` - Model used to assign segments to unlabeled rows
/// * `knowledge` - Source of segment names
///
/// # Returns
/// * One `ClusterStatistics` per segment present, ascending by id
pub fn summarize(
    dataset: SegmentDataset,
    model: &SegmentationModel,
    knowledge: &KnowledgeBase,
) -> Result<Vec<ClusterStatistics>> {
    let has_age = dataset.has_age();

    let labeled = match dataset {
        SegmentDataset::Labeled(df) => with_integral_labels(df)?,
        SegmentDataset::Unlabeled(df) => {
            let features = feature_matrix(&df)?;
            let segments = model.assign_batch(&features)?;
            with_segments(df, &segments)?
        }
    };

    let mut aggs = vec![
        len().alias("count"),
        col(INCOME_COLUMN)
            .cast(DataType::Float64)
            .mean()
            .alias("avg_income"),
        col(SPENDING_COLUMN)
            .cast(DataType::Float64)
            .mean()
            .alias("avg_spending_score"),
    ];
    if has_age {
        aggs.push(col(AGE_COLUMN).cast(DataType::Float64).mean().alias("avg_age"));
    }

    let grouped = labeled
        .lazy()
        .group_by([col(CLUSTER_COLUMN)])
        .agg(aggs)
        .collect()?;

    let ids = grouped.column(CLUSTER_COLUMN)?.cast(&DataType::Int64)?;
    let counts = grouped.column("count")?.cast(&DataType::Int64)?;
    let incomes = grouped.column("avg_income")?.clone();
    let spending = grouped.column("avg_spending_score")?.clone();
    let ages = if has_age {
        Some(grouped.column("avg_age")?.clone())
    } else {
        None
    };

    let mut stats = Vec::with_capacity(grouped.height());
    for row in 0..grouped.height() {
        let segment_id = ids.i64()?.get(row).ok_or_else(|| malformed("null Cluster label"))?;
        let count = counts.i64()?.get(row).unwrap_or(0) as usize;
        let avg_income = incomes
            .f64()?
            .get(row)
            .ok_or_else(|| malformed("income mean undefined"))?;
        let avg_spending_score = spending
            .f64()?
            .get(row)
            .ok_or_else(|| malformed("spending score mean undefined"))?;
        let avg_age = match &ages {
            Some(series) => series.f64()?.get(row).map(round2),
            None => None,
        };

        stats.push(ClusterStatistics {
            segment_id,
            segment_name: knowledge.name(segment_id).to_string(),
            count,
            avg_income: round2(avg_income),
            avg_spending_score: round2(avg_spending_score),
            avg_age,
        });
    }

    stats.sort_by_key(|s| s.segment_id);
    Ok(stats)
}

/// Replace the `Cluster` column with its Int64 form, rejecting null or
/// fractional labels
fn with_integral_labels(mut df: DataFrame) -> Result<DataFrame> {
    let labels = df.column(CLUSTER_COLUMN)?.cast(&DataType::Float64)?;
    for (row, label) in labels.f64()?.into_iter().enumerate() {
        match label {
            Some(value) if value.fract() == 0.0 => {}
            Some(value) => {
                return Err(SegmentError::Schema(format!(
                    "non-integral {CLUSTER_COLUMN} label {value} at row {row}"
                )))
            }
            None => {
                return Err(SegmentError::Schema(format!(
                    "null or non-numeric {CLUSTER_COLUMN} label at row {row}"
                )))
            }
        }
    }

    let ids = df.column(CLUSTER_COLUMN)?.cast(&DataType::Int64)?;
    df.with_column(ids)?;
    Ok(df)
}

fn malformed(reason: &str) -> SegmentError {
    SegmentError::Schema(reason.to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
