//! Persisted scaler and classifier with a checksum manifest.
//!
//! An artifact directory holds `scaler.json`, `classifier.json` and
//! `manifest.json`. The manifest records the SHA-256 of each file; loading
//! refuses any file whose bytes no longer match.

use crate::error::FairnessError;
use crate::features::scaler::StandardScaler;
use crate::features::schema::{FEATURE_WIDTH, SCHEMA_VERSION};
use crate::mitigation::adversarial::DebiasedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub const SCALER_FILE: &str = "scaler.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Checksum entry of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub name: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ArtifactFile>,
}

impl ArtifactManifest {
    fn entry(&self, name: &str) -> Result<&ArtifactFile, FairnessError> {
        self.files
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| FairnessError::artifact(format!("manifest has no entry for {name}")))
    }
}

/// Scaler and classifier loaded together, read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedArtifacts {
    pub scaler: StandardScaler,
    pub model: DebiasedModel,
    pub schema_version: u32,
}

impl LoadedArtifacts {
    pub fn new(scaler: StandardScaler, model: DebiasedModel) -> Self {
        Self {
            scaler,
            model,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Write both artifacts and their manifest into `dir`.
    pub fn save(&self, dir: &Path) -> Result<ArtifactManifest, FairnessError> {
        std::fs::create_dir_all(dir)?;
        let scaler = serde_json::to_vec_pretty(&self.scaler)?;
        let model = serde_json::to_vec_pretty(&self.model)?;

        let files = vec![
            write_file(dir, SCALER_FILE, &scaler)?,
            write_file(dir, CLASSIFIER_FILE, &model)?,
        ];
        let manifest = ArtifactManifest {
            schema_version: self.schema_version,
            created_at: Utc::now(),
            files,
        };
        atomic_write(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(dir = %dir.display(), "Saved artifacts");
        Ok(manifest)
    }

    /// Load and verify the artifacts in `dir`.
    pub fn load(dir: &Path) -> Result<Self, FairnessError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(FairnessError::artifact(format!(
                "no artifacts at {} (missing {MANIFEST_FILE})",
                dir.display()
            )));
        }
        let manifest: ArtifactManifest = serde_json::from_slice(&std::fs::read(&manifest_path)?)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(FairnessError::schema(format!(
                "artifacts use feature schema v{}, this build expects v{SCHEMA_VERSION}",
                manifest.schema_version
            )));
        }

        let scaler = serde_json::from_slice(&read_verified(dir, manifest.entry(SCALER_FILE)?)?)?;
        let model: DebiasedModel =
            serde_json::from_slice(&read_verified(dir, manifest.entry(CLASSIFIER_FILE)?)?)?;
        model.classifier.validate(FEATURE_WIDTH).map_err(|e| {
            FairnessError::artifact(format!("{CLASSIFIER_FILE} is not usable: {e}"))
        })?;

        tracing::info!(dir = %dir.display(), created_at = %manifest.created_at, "Loaded artifacts");
        Ok(Self {
            scaler,
            model,
            schema_version: manifest.schema_version,
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<ArtifactFile, FairnessError> {
    atomic_write(&dir.join(name), bytes)?;
    Ok(ArtifactFile {
        name: name.to_string(),
        sha256: sha256_hex(bytes),
        size_bytes: bytes.len() as u64,
    })
}

fn read_verified(dir: &Path, entry: &ArtifactFile) -> Result<Vec<u8>, FairnessError> {
    let bytes = std::fs::read(dir.join(&entry.name))?;
    let actual = sha256_hex(&bytes);
    if actual != entry.sha256 {
        return Err(FairnessError::artifact(format!(
            "checksum mismatch for {}: expected {}, found {actual}",
            entry.name, entry.sha256
        )));
    }
    Ok(bytes)
}

/// Shared handle to the current artifacts with atomic reload.
///
/// Readers take a cheap `Arc` clone and keep using it even if a reload
/// swaps in newer artifacts meanwhile.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    current: RwLock<Arc<LoadedArtifacts>>,
}

impl ArtifactStore {
    /// Load artifacts from `dir` once.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FairnessError> {
        let dir = dir.into();
        let loaded = LoadedArtifacts::load(&dir)?;
        Ok(Self::with_artifacts(dir, loaded))
    }

    pub fn with_artifacts(dir: impl Into<PathBuf>, artifacts: LoadedArtifacts) -> Self {
        Self {
            dir: dir.into(),
            current: RwLock::new(Arc::new(artifacts)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current(&self) -> Arc<LoadedArtifacts> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-read the directory and swap the result in.
    ///
    /// On failure the previous artifacts stay current.
    pub fn reload(&self) -> Result<Arc<LoadedArtifacts>, FairnessError> {
        let fresh = Arc::new(LoadedArtifacts::load(&self.dir)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        tracing::info!(dir = %self.dir.display(), "Reloaded artifacts");
        Ok(fresh)
    }
}
