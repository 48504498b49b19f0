//! Model artifact store: JSON envelopes for the scaler and cluster model

use crate::error::{ArtifactKind, Result, SegmentError};
use crate::model::{ClusterModelState, ScalerState};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SCALER_FILE: &str = "scaler.json";
pub const CLUSTER_MODEL_FILE: &str = "kmeans_model.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    /// Shared by the two files written in one save
    pair_id: u64,
    trained_at: DateTime<Utc>,
    payload: T,
}

/// Filesystem location of the two model artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: ArtifactKind) -> PathBuf {
        match artifact {
            ArtifactKind::Scaler => self.dir.join(SCALER_FILE),
            ArtifactKind::ClusterModel => self.dir.join(CLUSTER_MODEL_FILE),
        }
    }

    /// Read and validate both artifacts
    ///
    /// Nothing is returned unless both decode cleanly and come from the same
    /// save.
    pub fn load(&self) -> Result<(ScalerState, ClusterModelState)> {
        let scaler: Envelope<ScalerState> = self.read(ArtifactKind::Scaler)?;
        let clusters: Envelope<ClusterModelState> = self.read(ArtifactKind::ClusterModel)?;

        if scaler.pair_id != clusters.pair_id {
            return Err(self.corrupt(
                ArtifactKind::ClusterModel,
                format!(
                    "written by a different save than the scaler (trained {} vs {})",
                    clusters.trained_at, scaler.trained_at
                ),
            ));
        }
        let (scaler, clusters) = (scaler.payload, clusters.payload);

        scaler
            .validate()
            .map_err(|reason| self.corrupt(ArtifactKind::Scaler, reason))?;
        clusters
            .validate()
            .map_err(|reason| self.corrupt(ArtifactKind::ClusterModel, reason))?;

        Ok((scaler, clusters))
    }

    /// Serialize both artifacts, creating the directory if needed
    ///
    /// Both files are fully written beside their targets before either is
    /// renamed into place. Staged files are removed when a save fails.
    pub fn save(&self, scaler: &ScalerState, clusters: &ClusterModelState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let pair_id: u64 = rand::random();
        let trained_at = Utc::now();

        let staging = [
            self.tmp_path_for(ArtifactKind::Scaler),
            self.tmp_path_for(ArtifactKind::ClusterModel),
        ];
        let result = self
            .stage(ArtifactKind::Scaler, scaler, pair_id, trained_at)
            .and_then(|()| self.stage(ArtifactKind::ClusterModel, clusters, pair_id, trained_at))
            .and_then(|()| {
                fs::rename(&staging[0], self.path_for(ArtifactKind::Scaler))?;
                fs::rename(&staging[1], self.path_for(ArtifactKind::ClusterModel))?;
                Ok(())
            });

        if result.is_err() {
            for tmp in &staging {
                if tmp.is_file() {
                    let _ = fs::remove_file(tmp);
                }
            }
        }
        result
    }

    fn tmp_path_for(&self, artifact: ArtifactKind) -> PathBuf {
        self.path_for(artifact).with_extension("json.tmp")
    }

    fn read<T: DeserializeOwned>(&self, artifact: ArtifactKind) -> Result<Envelope<T>> {
        let path = self.path_for(artifact);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SegmentError::ArtifactNotFound { artifact, path });
            }
            Err(e) => return Err(self.corrupt(artifact, e.to_string())),
        };

        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| self.corrupt(artifact, e.to_string()))?;

        if envelope.kind != kind_tag(artifact) {
            return Err(self.corrupt(
                artifact,
                format!("expected kind {:?}, found {:?}", kind_tag(artifact), envelope.kind),
            ));
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(self.corrupt(
                artifact,
                format!("unsupported format version {}", envelope.format_version),
            ));
        }

        Ok(envelope)
    }

    fn stage<T: Serialize>(
        &self,
        artifact: ArtifactKind,
        payload: &T,
        pair_id: u64,
        trained_at: DateTime<Utc>,
    ) -> Result<()> {
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            kind: kind_tag(artifact).to_string(),
            pair_id,
            trained_at,
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(std::io::Error::from)?;
        fs::write(self.tmp_path_for(artifact), bytes)?;
        Ok(())
    }

    fn corrupt(&self, artifact: ArtifactKind, reason: String) -> SegmentError {
        SegmentError::ArtifactCorrupt {
            artifact,
            path: self.path_for(artifact),
            reason,
        }
    }
}

fn kind_tag(artifact: ArtifactKind) -> &'static str {
    match artifact {
        ArtifactKind::Scaler => "standard_scaler",
        ArtifactKind::ClusterModel => "kmeans",
    }
}
