//! Customer dataset loading using Polars

use crate::error::{Result, SegmentError};
use crate::model::{FEATURE_COUNT, FEATURE_NAMES};
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

pub const INCOME_COLUMN: &str = FEATURE_NAMES[0];
pub const SPENDING_COLUMN: &str = FEATURE_NAMES[1];
pub const AGE_COLUMN: &str = "Age";
pub const CLUSTER_COLUMN: &str = "Cluster";

/// A customer table, tagged by whether segment labels are already present
#[derive(Debug, Clone)]
pub enum SegmentDataset {
    /// Carries a precomputed `Cluster` column
    Labeled(DataFrame),
    /// Segments must be assigned by the model
    Unlabeled(DataFrame),
}

impl SegmentDataset {
    /// Read a CSV file with a header row
    pub fn read_csv(path: &Path) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        Self::from_frame(df).map_err(|e| match e {
            SegmentError::Schema(reason) => SegmentError::DatasetUnavailable {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Classify a frame by its columns; feature columns are mandatory
    pub fn from_frame(df: DataFrame) -> Result<Self> {
        for name in FEATURE_NAMES {
            if df.column(name).is_err() {
                return Err(SegmentError::Schema(format!(
                    "missing required column {name}"
                )));
            }
        }

        if df.column(CLUSTER_COLUMN).is_ok() {
            Ok(Self::Labeled(df))
        } else {
            Ok(Self::Unlabeled(df))
        }
    }

    pub fn frame(&self) -> &DataFrame {
        match self {
            Self::Labeled(df) | Self::Unlabeled(df) => df,
        }
    }

    pub fn into_frame(self) -> DataFrame {
        match self {
            Self::Labeled(df) | Self::Unlabeled(df) => df,
        }
    }

    pub fn height(&self) -> usize {
        self.frame().height()
    }

    pub fn has_age(&self) -> bool {
        self.frame().column(AGE_COLUMN).is_ok()
    }
}

/// Extract a numeric column as f64; nulls are rejected
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                SegmentError::Schema(format!("null or non-numeric {name} at row {row}"))
            })
        })
        .collect()
}

/// Raw (n_samples, 2) matrix in model feature order
pub fn feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let income = numeric_column(df, INCOME_COLUMN)?;
    let spending = numeric_column(df, SPENDING_COLUMN)?;

    let n_samples = income.len();
    let mut raw_data = Vec::with_capacity(n_samples * FEATURE_COUNT);
    for i in 0..n_samples {
        raw_data.extend_from_slice(&[income[i], spending[i]]);
    }

    Array2::from_shape_vec((n_samples, FEATURE_COUNT), raw_data)
        .map_err(|e| SegmentError::Schema(e.to_string()))
}

/// Attach segment assignments as the `Cluster` column
pub fn with_segments(mut df: DataFrame, segments: &[usize]) -> Result<DataFrame> {
    let labels: Vec<i64> = segments.iter().map(|&id| id as i64).collect();
    df.with_column(Series::new(CLUSTER_COLUMN, labels))?;
    Ok(df)
}

/// Write a frame back out as CSV with a header row
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(header: &str, rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{header}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_unlabeled_dataset() {
        let file = create_test_csv(
            "CustomerID,Gender,Age,Annual_Income,Spending_Score",
            &["1,Male,19,15,39", "2,Male,21,15,81", "3,Female,20,16,6"],
        );

        let dataset = SegmentDataset::read_csv(file.path()).unwrap();
        assert!(matches!(dataset, SegmentDataset::Unlabeled(_)));
        assert_eq!(dataset.height(), 3);
        assert!(dataset.has_age());

        let features = feature_matrix(dataset.frame()).unwrap();
        assert_eq!(features.shape(), &[3, 2]);
        assert_eq!(features[[1, 0]], 15.0);
        assert_eq!(features[[1, 1]], 81.0);
    }

    #[test]
    fn test_labeled_dataset() {
        let file = create_test_csv(
            "Annual_Income,Spending_Score,Cluster",
            &["15.5,39,4", "88.0,90,1"],
        );

        let dataset = SegmentDataset::read_csv(file.path()).unwrap();
        assert!(matches!(dataset, SegmentDataset::Labeled(_)));
        assert!(!dataset.has_age());
    }

    #[test]
    fn test_missing_feature_column() {
        let file = create_test_csv("Annual_Income,Age", &["15,19"]);

        match SegmentDataset::read_csv(file.path()) {
            Err(SegmentError::DatasetUnavailable { path, reason }) => {
                assert_eq!(path, file.path());
                assert!(reason.contains("Spending_Score"));
            }
            other => panic!("expected DatasetUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_null_feature_rejected() {
        let file = create_test_csv("Annual_Income,Spending_Score", &["15,39", ",40"]);
        let dataset = SegmentDataset::read_csv(file.path()).unwrap();

        assert!(feature_matrix(dataset.frame()).is_err());
    }

    #[test]
    fn test_with_segments_round_trips_through_csv() {
        let file = create_test_csv("Annual_Income,Spending_Score", &["15,39", "90,85"]);
        let dataset = SegmentDataset::read_csv(file.path()).unwrap();

        let mut labeled = with_segments(dataset.into_frame(), &[4, 1]).unwrap();
        let out = NamedTempFile::new().unwrap();
        write_csv(&mut labeled, out.path()).unwrap();

        let reread = SegmentDataset::read_csv(out.path()).unwrap();
        assert!(matches!(reread, SegmentDataset::Labeled(_)));
        assert_eq!(numeric_column(reread.frame(), CLUSTER_COLUMN).unwrap(), vec![4.0, 1.0]);
    }
}
