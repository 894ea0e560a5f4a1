//! Deployment registry
//!
//! On-disk layout:
//!
//! ```text
//! <root>/index.json            ensemble size, threshold, members in rank order
//! <root>/<key>/record.json     configuration, stage, validation report
//! <root>/<key>/model.bin       backend artifact
//! ```
//!
//! Keys are `{rank:02}-{model_kind}-{hash}` where `hash` is the first 12 hex
//! digits of the SHA-256 of the configuration's JSON, so a configuration
//! keeps its key across runs.

use crate::config::Configuration;
use crate::ensemble::EnsemblePredictor;
use crate::error::{PipelineError, Result};
use crate::retrain::{DeploymentModel, Stage};
use crate::scoring::ScoreReport;
use crate::training::TrainableModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_FILE: &str = "index.json";
const RECORD_FILE: &str = "record.json";
const ARTIFACT_FILE: &str = "model.bin";

/// Persisted description of one deployed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub key: String,
    pub rank: usize,
    pub configuration: Configuration,
    pub stage: Stage,
    pub validation: ScoreReport,
    pub seed: u64,
    pub trained_on: usize,
    /// Backend that produced the artifact
    pub backend: String,
    pub registered_at: DateTime<Utc>,
}

/// Index entry (record metadata only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub key: String,
    pub rank: usize,
    pub label: String,
    pub validation_score: f64,
}

/// Registry index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub ensemble_size: usize,
    pub decision_threshold: f64,
    pub entries: Vec<RegistryEntry>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self {
            ensemble_size: 0,
            decision_threshold: crate::config::DEFAULT_DECISION_THRESHOLD,
            entries: Vec::new(),
            updated_at: None,
        }
    }
}

/// SHA-256 of `data` as lowercase hex
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Stable registry key for a ranked configuration
pub fn record_key(rank: usize, configuration: &Configuration) -> Result<String> {
    let json = serde_json::to_vec(configuration)?;
    let digest = compute_sha256(&json);
    Ok(format!("{:02}-{}-{}", rank, configuration.model_kind, &digest[..12]))
}

fn missing(what: impl Into<String>) -> PipelineError {
    PipelineError::MissingDeploymentModel(what.into())
}

/// Registry of the deployed ensemble
pub struct DeploymentRegistry {
    root: PathBuf,
    index: RegistryIndex,
}

impl DeploymentRegistry {
    /// Create or open a registry at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let file = File::open(&index_path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            RegistryIndex::default()
        };

        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    fn save_index(&self) -> Result<()> {
        let file = File::create(self.root.join(INDEX_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.index)?;
        Ok(())
    }

    /// Replace the registered ensemble with `models`, ranked in slice order.
    ///
    /// Every model must be final and the ensemble size odd, so majority votes
    /// cannot tie. Directories of the previous ensemble that are not part of
    /// the new one are removed. Returns the keys in rank order.
    pub fn register_ensemble(
        &mut self,
        models: &[DeploymentModel],
        decision_threshold: f64,
        backend: &str,
    ) -> Result<Vec<String>> {
        if models.is_empty() || models.len() % 2 == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "ensemble size must be odd and non-zero, got {}",
                models.len()
            )));
        }
        if let Some(m) = models.iter().find(|m| m.stage != Stage::Final) {
            return Err(PipelineError::Lifecycle(format!(
                "cannot register {} model {}",
                m.stage,
                m.configuration.label()
            )));
        }

        let now = Utc::now();
        let mut entries = Vec::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            let rank = i + 1;
            let key = record_key(rank, &model.configuration)?;
            let dir = self.root.join(&key);
            fs::create_dir_all(&dir)?;

            let record = DeploymentRecord {
                key: key.clone(),
                rank,
                configuration: model.configuration.clone(),
                stage: model.stage,
                validation: model.validation,
                seed: model.seed,
                trained_on: model.trained_on,
                backend: backend.to_string(),
                registered_at: now,
            };
            let file = File::create(dir.join(RECORD_FILE))?;
            serde_json::to_writer_pretty(BufWriter::new(file), &record)?;
            fs::write(dir.join(ARTIFACT_FILE), model.model.to_bytes()?)?;

            entries.push(RegistryEntry {
                key,
                rank,
                label: model.configuration.label(),
                validation_score: model.validation.score,
            });
        }

        let stale: Vec<String> = self
            .index
            .entries
            .iter()
            .filter(|old| !entries.iter().any(|e| e.key == old.key))
            .map(|old| old.key.clone())
            .collect();

        self.index = RegistryIndex {
            ensemble_size: models.len(),
            decision_threshold,
            entries,
            updated_at: Some(now),
        };
        self.save_index()?;

        for key in &stale {
            match fs::remove_dir_all(self.root.join(key)) {
                Ok(()) => debug!(key = %key, "pruned stale registry entry"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::IoError(e)),
            }
        }

        info!(root = %self.root.display(), models = models.len(), "ensemble registered");
        Ok(self.index.entries.iter().map(|e| e.key.clone()).collect())
    }

    /// Read one record by key
    pub fn record(&self, key: &str) -> Result<DeploymentRecord> {
        let path = self.root.join(key).join(RECORD_FILE);
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => missing(format!("record {} not found", path.display())),
            _ => PipelineError::IoError(e),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// All records in rank order
    pub fn records(&self) -> Result<Vec<DeploymentRecord>> {
        self.index.entries.iter().map(|e| self.record(&e.key)).collect()
    }

    fn load_member(&self, entry: &RegistryEntry, backend: &dyn TrainableModel) -> Result<DeploymentModel> {
        let record = self.record(&entry.key)?;
        if record.stage != Stage::Final {
            return Err(PipelineError::Lifecycle(format!(
                "registered model {} is {}",
                record.key, record.stage
            )));
        }
        if record_key(record.rank, &record.configuration)? != entry.key {
            return Err(missing(format!("record {} does not match its configuration", entry.key)));
        }

        let artifact = self.root.join(&entry.key).join(ARTIFACT_FILE);
        let bytes = fs::read(&artifact).map_err(|e| match e.kind() {
            ErrorKind::NotFound => missing(format!("artifact {} not found", artifact.display())),
            _ => PipelineError::IoError(e),
        })?;
        let model = backend.load(&bytes)?;

        Ok(DeploymentModel {
            configuration: record.configuration,
            stage: record.stage,
            validation: record.validation,
            seed: record.seed,
            trained_on: record.trained_on,
            model,
        })
    }

    /// Reload exactly `k` final models and build the predictor.
    ///
    /// Fails with `MissingDeploymentModel` when the registry holds a
    /// different number of models or any record or artifact is absent.
    pub fn load_ensemble(&self, backend: &dyn TrainableModel, k: usize) -> Result<EnsemblePredictor> {
        if self.index.entries.len() != k {
            return Err(missing(format!(
                "registry at {} holds {} models, ensemble needs {}",
                self.root.display(),
                self.index.entries.len(),
                k
            )));
        }

        let members = self
            .index
            .entries
            .iter()
            .map(|e| self.load_member(e, backend))
            .collect::<Result<Vec<_>>>()?;

        info!(root = %self.root.display(), models = members.len(), "ensemble loaded");
        EnsemblePredictor::new(members, k, self.index.decision_threshold)
    }
}
