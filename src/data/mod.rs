//! Labelled sample sets
//!
//! The core never touches images. A [`Dataset`] holds one row per sample:
//! a stable identifier, a feature vector the trainable backend understands
//! (pre-extracted embeddings for the linear probe, or whatever key the
//! external image loader needs), and a binary label.

use crate::error::{PipelineError, Result};
use ndarray::{concatenate, Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Binary-labelled sample set
#[derive(Debug, Clone)]
pub struct Dataset {
    ids: Vec<String>,
    features: Array2<f64>,
    labels: Array1<u8>,
}

impl Dataset {
    /// Create a dataset, checking shapes and that every label is 0 or 1
    pub fn new(ids: Vec<String>, features: Array2<f64>, labels: Array1<u8>) -> Result<Self> {
        if ids.len() != features.nrows() || labels.len() != features.nrows() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} ids and labels", features.nrows()),
                actual: format!("{} ids, {} labels", ids.len(), labels.len()),
            });
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(PipelineError::InvalidInput(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        Ok(Self { ids, features, labels })
    }

    /// Create a dataset with generated `sample-{i}` identifiers
    pub fn from_arrays(features: Array2<f64>, labels: Array1<u8>) -> Result<Self> {
        let ids = (0..features.nrows()).map(|i| format!("sample-{}", i)).collect();
        Self::new(ids, features, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<u8> {
        &self.labels
    }

    /// (n0, n1): number of true class-0 and class-1 samples
    pub fn class_counts(&self) -> (usize, usize) {
        let n1 = self.labels.iter().filter(|&&l| l == 1).count();
        (self.len() - n1, n1)
    }

    /// Rows at the given indices, in index order
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            ids: indices.iter().map(|&i| self.ids[i].clone()).collect(),
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Row-wise union of two datasets (used for train ∪ validation)
    pub fn concat(&self, other: &Dataset) -> Result<Dataset> {
        if self.n_features() != other.n_features() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", other.n_features()),
            });
        }
        let features = concatenate(Axis(0), &[self.features.view(), other.features.view()])?;
        let labels = concatenate(Axis(0), &[self.labels.view(), other.labels.view()])?;
        let ids = self.ids.iter().chain(other.ids.iter()).cloned().collect();
        Ok(Dataset { ids, features, labels })
    }

    /// Stratified train/holdout split.
    ///
    /// Each class contributes `round(fraction * n_class)` samples (at least one)
    /// to the holdout side.
    pub fn stratified_holdout(&self, fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(PipelineError::InvalidInput(format!(
                "holdout fraction must lie in (0, 1), got {}",
                fraction
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train_idx = Vec::new();
        let mut holdout_idx = Vec::new();

        for class in [0u8, 1u8] {
            let mut members: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            if members.len() < 2 {
                return Err(PipelineError::DataError(format!(
                    "class {} has {} samples, need at least 2 for a stratified holdout",
                    class,
                    members.len()
                )));
            }
            members.shuffle(&mut rng);
            let n_holdout = ((members.len() as f64 * fraction).round() as usize)
                .clamp(1, members.len() - 1);
            holdout_idx.extend_from_slice(&members[..n_holdout]);
            train_idx.extend_from_slice(&members[n_holdout..]);
        }

        train_idx.sort_unstable();
        holdout_idx.sort_unstable();
        Ok((self.select(&train_idx), self.select(&holdout_idx)))
    }

    /// Load a labelled dataset from CSV.
    ///
    /// `id_column` is optional in the file (row numbers are used when absent);
    /// every other column except `label_column` is a numeric feature.
    pub fn from_csv(path: impl AsRef<Path>, id_column: &str, label_column: &str) -> Result<Self> {
        let table = FeatureTable::from_csv(path, id_column, Some(label_column))?;
        let labels = table.labels.ok_or_else(|| {
            PipelineError::DataError(format!("label column '{}' not found", label_column))
        })?;
        Self::new(table.ids, table.features, labels)
    }
}

/// Unlabelled (or optionally labelled) feature rows read from disk
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub ids: Vec<String>,
    pub features: Array2<f64>,
    pub labels: Option<Array1<u8>>,
}

impl FeatureTable {
    /// Read a CSV file; `label_column` is excluded from features and parsed
    /// as labels when present
    pub fn from_csv(
        path: impl AsRef<Path>,
        id_column: &str,
        label_column: Option<&str>,
    ) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.as_str().to_string())
            .collect();

        let ids: Vec<String> = if names.iter().any(|n| n == id_column) {
            let series = df
                .column(id_column)?
                .as_materialized_series()
                .cast(&DataType::String)?;
            series
                .str()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| v.map(str::to_string).unwrap_or_else(|| format!("row-{}", i)))
                .collect()
        } else {
            (0..df.height()).map(|i| format!("row-{}", i)).collect()
        };

        let labels = match label_column {
            Some(col) if names.iter().any(|n| n == col) => {
                let values = numeric_column(&df, col)?;
                let labels = values
                    .iter()
                    .map(|&v| match v {
                        v if v == 0.0 => Ok(0u8),
                        v if v == 1.0 => Ok(1u8),
                        other => Err(PipelineError::InvalidInput(format!(
                            "label column '{}' contains non-binary value {}",
                            col, other
                        ))),
                    })
                    .collect::<Result<Vec<u8>>>()?;
                Some(Array1::from_vec(labels))
            }
            _ => None,
        };

        let feature_names: Vec<&String> = names
            .iter()
            .filter(|n| n.as_str() != id_column && Some(n.as_str()) != label_column)
            .collect();
        if feature_names.is_empty() {
            return Err(PipelineError::DataError("no feature columns found".to_string()));
        }

        let mut features = Array2::zeros((df.height(), feature_names.len()));
        for (j, name) in feature_names.iter().enumerate() {
            let values = numeric_column(&df, name)?;
            for (i, v) in values.into_iter().enumerate() {
                features[[i, j]] = v;
            }
        }

        Ok(Self { ids, features, labels })
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.filter(|x| x.is_finite()).ok_or_else(|| {
                PipelineError::DataError(format!("column '{}' row {} is missing or not numeric", name, i))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    fn toy() -> Dataset {
        let features = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let labels = array![0, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        Dataset::from_arrays(features, labels).unwrap()
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let features = Array2::zeros((2, 1));
        let result = Dataset::from_arrays(features, array![0, 2]);
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_class_counts() {
        assert_eq!(toy().class_counts(), (6, 4));
    }

    #[test]
    fn test_select_and_concat() {
        let ds = toy();
        let a = ds.select(&[0, 6]);
        let b = ds.select(&[1, 7, 8]);
        let joined = a.concat(&b).unwrap();
        assert_eq!(joined.len(), 5);
        assert_eq!(joined.class_counts(), (2, 3));
        assert_eq!(joined.ids()[2], "sample-1");
    }

    #[test]
    fn test_stratified_holdout_is_disjoint_and_stratified() {
        let ds = toy();
        let (train, holdout) = ds.stratified_holdout(0.25, 3).unwrap();
        assert_eq!(train.len() + holdout.len(), ds.len());
        let (h0, h1) = holdout.class_counts();
        assert!(h0 >= 1 && h1 >= 1);
        for id in holdout.ids() {
            assert!(!train.ids().contains(id));
        }
    }

    #[test]
    fn test_from_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,f1,f2,label").unwrap();
        writeln!(file, "a,0.5,1.0,0").unwrap();
        writeln!(file, "b,1.5,2.0,1").unwrap();
        writeln!(file, "c,2.5,3.0,1").unwrap();
        file.flush().unwrap();

        let ds = Dataset::from_csv(file.path(), "id", "label").unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.ids(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(ds.class_counts(), (1, 2));
        assert_eq!(ds.features()[[2, 1]], 3.0);
    }
}
