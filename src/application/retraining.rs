use crate::domain::errors::RetrainError;
use crate::domain::jobs::{CancelHandle, JobState, RetrainJob, RetrainTarget, cancel_pair};
use crate::domain::model::{ModelHandle, PersistedModel};
use crate::domain::ports::{ModelStateStore, ModelTrainer};
use crate::infrastructure::observability::metrics::Metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::registry::ModelRegistry;

#[derive(Default)]
struct SupervisorState {
    jobs: HashMap<Uuid, RetrainJob>,
    /// Model ids with a non-terminal job, mapped to that job
    running: HashMap<String, Uuid>,
    cancels: HashMap<Uuid, CancelHandle>,
}

/// Runs long-lived retraining jobs off the request path and publishes
/// completed models into the registry in one atomic batch.
///
/// Conflict policy: a trigger that overlaps a model id with a
/// non-terminal job is REJECTED with `RetrainError::InProgress` — the
/// second request is not queued. Callers retry after the running job
/// reaches a terminal state.
pub struct RetrainingSupervisor {
    registry: Arc<ModelRegistry>,
    trainer: Arc<dyn ModelTrainer>,
    store: Arc<dyn ModelStateStore>,
    metrics: Metrics,
    state: Arc<Mutex<SupervisorState>>,
}

impl RetrainingSupervisor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        trainer: Arc<dyn ModelTrainer>,
        store: Arc<dyn ModelStateStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            trainer,
            store,
            metrics,
            state: Arc::new(Mutex::new(SupervisorState::default())),
        }
    }

    /// Enqueues a retrain and returns its job id immediately. `symbols`
    /// of `None` targets every model currently in the registry.
    pub async fn trigger(
        self: &Arc<Self>,
        symbols: Option<Vec<String>>,
    ) -> Result<Uuid, RetrainError> {
        let (target, model_ids) = match symbols {
            Some(list) => {
                let mut ids: Vec<String> =
                    list.iter().map(|s| s.trim().to_uppercase()).collect();
                ids.sort();
                ids.dedup();
                if ids.is_empty() {
                    return Err(RetrainError::NoTargets);
                }
                (RetrainTarget::Models(ids.clone()), ids)
            }
            None => {
                let snapshot = self.registry.snapshot().await;
                let ids: Vec<String> = snapshot.ids().cloned().collect();
                if ids.is_empty() {
                    return Err(RetrainError::NoTargets);
                }
                (RetrainTarget::All, ids)
            }
        };

        let job = {
            let mut state = self.state.lock().await;
            for model_id in &model_ids {
                if let Some(job_id) = state.running.get(model_id) {
                    return Err(RetrainError::InProgress {
                        model_id: model_id.clone(),
                        job_id: *job_id,
                    });
                }
            }

            let job = RetrainJob::queued(target);
            let (handle, token) = cancel_pair();
            for model_id in &model_ids {
                state.running.insert(model_id.clone(), job.id);
            }
            state.cancels.insert(job.id, handle);
            state.jobs.insert(job.id, job.clone());

            let supervisor = Arc::clone(self);
            let job_id = job.id;
            tokio::spawn(async move {
                supervisor.run_job(job_id, model_ids, token).await;
            });
            job
        };

        info!(job_id = %job.id, "Retrain job queued");
        Ok(job.id)
    }

    /// Requests cancellation of a running job. The trainer observes the
    /// token between phases; the job then terminates as failed with
    /// reason "cancelled".
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), RetrainError> {
        let state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(RetrainError::UnknownJob(job_id));
        }
        if let Some(handle) = state.cancels.get(&job_id) {
            handle.cancel();
        }
        Ok(())
    }

    pub async fn job(&self, job_id: Uuid) -> Option<RetrainJob> {
        self.state.lock().await.jobs.get(&job_id).cloned()
    }

    pub async fn jobs(&self) -> Vec<RetrainJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<RetrainJob> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.queued_at);
        jobs
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: Uuid,
        model_ids: Vec<String>,
        token: crate::domain::jobs::CancelToken,
    ) {
        self.update_job(job_id, |job| {
            job.state = JobState::Running;
            job.started_at = Some(Utc::now());
        })
        .await;

        let outcome = self.train_all(&model_ids, &token).await;

        match outcome {
            Ok(handles) => {
                // All models trained; one atomic swap makes them visible
                self.registry.publish(handles).await;
                self.metrics
                    .models_ready
                    .set(self.registry.len().await as f64);
                self.persist_registry().await;
                self.update_job(job_id, |job| {
                    job.state = JobState::Succeeded;
                    job.finished_at = Some(Utc::now());
                })
                .await;
                self.metrics
                    .retrain_jobs_total
                    .with_label_values(&["succeeded"])
                    .inc();
                info!(job_id = %job_id, "Retrain job succeeded");
            }
            Err(reason) => {
                // Registry untouched: no partial publish on any failure path
                self.update_job(job_id, |job| {
                    job.state = JobState::Failed;
                    job.finished_at = Some(Utc::now());
                    job.error = Some(reason.clone());
                })
                .await;
                self.metrics
                    .retrain_jobs_total
                    .with_label_values(&["failed"])
                    .inc();
                warn!(job_id = %job_id, reason = %reason, "Retrain job failed");
            }
        }

        let mut state = self.state.lock().await;
        for model_id in &model_ids {
            state.running.remove(model_id);
        }
        state.cancels.remove(&job_id);
    }

    /// Trains every target; any failure or cancellation aborts the whole
    /// batch before anything is published.
    async fn train_all(
        &self,
        model_ids: &[String],
        token: &crate::domain::jobs::CancelToken,
    ) -> Result<Vec<ModelHandle>, String> {
        let mut handles = Vec::with_capacity(model_ids.len());
        for model_id in model_ids {
            if token.is_cancelled() {
                return Err("cancelled".to_string());
            }
            let version = self.registry.next_version();
            let handle = self
                .trainer
                .train(model_id, version, token)
                .await
                .map_err(|e| {
                    if token.is_cancelled() {
                        "cancelled".to_string()
                    } else {
                        format!("training {} failed: {}", model_id, e)
                    }
                })?;
            handles.push(handle);
        }
        if token.is_cancelled() {
            return Err("cancelled".to_string());
        }
        Ok(handles)
    }

    async fn persist_registry(&self) {
        let snapshot = self.registry.snapshot().await;
        let persisted: Vec<PersistedModel> = snapshot
            .iter()
            .map(|(_, handle)| PersistedModel {
                id: handle.id.clone(),
                version: handle.version,
                status: handle.status,
                last_updated: handle.last_updated,
                accuracy: handle.accuracy,
                spec: handle.scorer.spec(),
            })
            .collect();
        if let Err(e) = self.store.save(&persisted).await {
            // The registry swap already happened; persistence catches up
            // on the next successful save.
            error!(error = %e, "Failed to persist model state");
        }
    }

    async fn update_job(&self, job_id: Uuid, mutate: impl FnOnce(&mut RetrainJob)) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&job_id) {
            mutate(job);
        }
    }
}
