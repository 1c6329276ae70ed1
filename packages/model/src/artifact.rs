//! The persisted model bundle.
//!
//! Pipeline and label encoder are written together as one `MessagePack`
//! file. Saving goes through a sibling temp file and a rename, so the
//! target path only ever holds a complete artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelError;
use crate::label::LabelEncoder;
use crate::pipeline::Pipeline;

/// Format version written by this build.
pub const ARTIFACT_VERSION: u32 = 1;

/// A fitted pipeline and the label mapping it was trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    /// Format version.
    pub version: u32,
    /// When training finished.
    pub trained_at: DateTime<Utc>,
    /// Number of records the model was trained on.
    pub record_count: u64,
    /// Preprocessor + classifier.
    pub pipeline: Pipeline,
    /// Class index <-> category label.
    pub label_encoder: LabelEncoder,
}

impl TrainedArtifact {
    /// Bundles a freshly fitted pipeline.
    #[must_use]
    pub fn new(pipeline: Pipeline, label_encoder: LabelEncoder, record_count: u64) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            trained_at: Utc::now(),
            record_count,
            pipeline,
            label_encoder,
        }
    }

    /// Serializes the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserializes an artifact and checks its format version.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Decode`] for malformed bytes and
    /// [`ModelError::UnsupportedVersion`] for another format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let artifact: Self = rmp_serde::from_slice(bytes)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: artifact.version,
                expected: ARTIFACT_VERSION,
            });
        }
        Ok(artifact)
    }

    /// Writes the artifact to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if serialization or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = self.to_bytes()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path);
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        log::info!("Saved model artifact to {}", path.display());
        Ok(())
    }

    /// Reads an artifact from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
