use crate::domain::model::PersistedModel;
use crate::domain::ports::ModelStateStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// JSON-file-backed model state. Saves are write-then-rename so a crash
/// mid-save never leaves a torn file behind.
pub struct JsonModelStore {
    path: PathBuf,
}

impl JsonModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ModelStateStore for JsonModelStore {
    async fn load(&self) -> Result<Vec<PersistedModel>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "No model state file; starting fresh");
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading model state from {}", self.path.display()))?;
        let models: Vec<PersistedModel> =
            serde_json::from_str(&raw).context("parsing model state file")?;
        info!(
            count = models.len(),
            path = %self.path.display(),
            "Loaded persisted model state"
        );
        Ok(models)
    }

    async fn save(&self, models: &[PersistedModel]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(models).context("serializing model state")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}

/// No-op store for tests and ephemeral deployments
pub struct NullModelStore;

#[async_trait]
impl ModelStateStore for NullModelStore {
    async fn load(&self) -> Result<Vec<PersistedModel>> {
        Ok(Vec::new())
    }

    async fn save(&self, _models: &[PersistedModel]) -> Result<()> {
        Ok(())
    }
}
