use crate::domain::ports::ModelScorer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of a model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Loading,
    Ready,
    Retired,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Loading => write!(f, "loading"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::Retired => write!(f, "retired"),
        }
    }
}

/// An immutable, versioned loaded model. A retrain never mutates an
/// existing handle; it produces a new one and swaps it into the registry.
#[derive(Clone)]
pub struct ModelHandle {
    pub id: String,
    pub version: u64,
    pub status: ModelStatus,
    pub scorer: Arc<dyn ModelScorer>,
    pub last_updated: DateTime<Utc>,
    /// Training-set accuracy, when the scorer came out of a fit
    pub accuracy: Option<f64>,
}

impl ModelHandle {
    pub fn ready(id: impl Into<String>, version: u64, scorer: Arc<dyn ModelScorer>) -> Self {
        Self {
            id: id.into(),
            version,
            status: ModelStatus::Ready,
            scorer,
            last_updated: Utc::now(),
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("status", &self.status)
            .field("scorer", &self.scorer.name())
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Consistent point-in-time view of all ready handles. Cloning is an
/// `Arc` bump; a snapshot taken before a publish keeps serving the
/// pre-publish handles for as long as the caller holds it.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    models: Arc<HashMap<String, Arc<ModelHandle>>>,
}

impl RegistrySnapshot {
    pub fn new(models: HashMap<String, Arc<ModelHandle>>) -> Self {
        Self {
            models: Arc::new(models),
        }
    }

    pub fn get(&self, model_id: &str) -> Option<&Arc<ModelHandle>> {
        self.models.get(model_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.models.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<ModelHandle>)> {
        self.models.iter()
    }
}

/// Serializable description of a scorer, enough to rebuild it after a
/// restart. The heavy artifacts (if any) would live behind the paths or
/// weights recorded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScorerSpec {
    /// Rule-based technical baseline, used before any fit has run
    Momentum { buy_rsi: f64, sell_rsi: f64 },
    /// Logistic model over the fixed feature vector
    Linear { weights: Vec<f64>, bias: f64 },
}

/// On-disk record of a model, used to rehydrate the registry at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel {
    pub id: String,
    pub version: u64,
    pub status: ModelStatus,
    pub last_updated: DateTime<Utc>,
    pub accuracy: Option<f64>,
    pub spec: ScorerSpec,
}
