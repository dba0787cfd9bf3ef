use quantserve::application::registry::ModelRegistry;
use quantserve::application::retraining::RetrainingSupervisor;
use quantserve::domain::errors::RetrainError;
use quantserve::domain::jobs::{CancelToken, JobState};
use quantserve::domain::model::{ModelHandle, ScorerSpec};
use quantserve::domain::ports::{ModelScorer, ModelTrainer};
use quantserve::domain::types::FeatureSet;
use quantserve::infrastructure::model_store::NullModelStore;
use quantserve::infrastructure::observability::Metrics;

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct FixedScorer(f64);

impl ModelScorer for FixedScorer {
    fn score(&self, _features: &FeatureSet) -> Result<f64, String> {
        Ok(self.0)
    }
    fn name(&self) -> &str {
        "fixed"
    }
    fn spec(&self) -> ScorerSpec {
        ScorerSpec::Momentum {
            buy_rsi: 30.0,
            sell_rsi: 70.0,
        }
    }
}

/// Trainer with a controllable outcome and duration
struct TestTrainer {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl ModelTrainer for TestTrainer {
    async fn train(
        &self,
        model_id: &str,
        version: u64,
        cancel: &CancelToken,
    ) -> Result<ModelHandle> {
        let mut cancel = cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => bail!("cancelled"),
            _ = tokio::time::sleep(self.delay) => {}
        }
        if self.fail {
            bail!("synthetic training failure");
        }
        Ok(ModelHandle::ready(
            model_id,
            version,
            Arc::new(FixedScorer(0.7)),
        ))
    }
}

fn supervisor(registry: Arc<ModelRegistry>, trainer: TestTrainer) -> Arc<RetrainingSupervisor> {
    Arc::new(RetrainingSupervisor::new(
        registry,
        Arc::new(trainer),
        Arc::new(NullModelStore),
        Metrics::new().unwrap(),
    ))
}

async fn seeded_registry() -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    registry
        .publish(vec![ModelHandle::ready(
            "AAPL",
            1,
            Arc::new(FixedScorer(0.5)),
        )])
        .await;
    registry
}

async fn wait_terminal(
    supervisor: &Arc<RetrainingSupervisor>,
    job_id: Uuid,
) -> quantserve::domain::jobs::RetrainJob {
    for _ in 0..200 {
        let job = supervisor.job(job_id).await.unwrap();
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[tokio::test]
async fn test_successful_retrain_publishes_new_version() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_millis(10),
            fail: false,
        },
    );

    let job_id = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    let job = wait_terminal(&supervisor, job_id).await;

    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.started_at.is_some() && job.finished_at.is_some());
    assert!(registry.get("AAPL").await.unwrap().version > 1);
}

#[tokio::test]
async fn test_failed_retrain_leaves_registry_untouched() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_millis(10),
            fail: true,
        },
    );

    let job_id = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    let job = wait_terminal(&supervisor, job_id).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.unwrap().contains("synthetic training failure"));
    // Pre-retrain handle still serves
    assert_eq!(registry.get("AAPL").await.unwrap().version, 1);
}

#[tokio::test]
async fn test_second_trigger_for_running_model_is_rejected() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_secs(30),
            fail: false,
        },
    );

    let first = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    let err = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap_err();
    match err {
        RetrainError::InProgress { model_id, job_id } => {
            assert_eq!(model_id, "AAPL");
            assert_eq!(job_id, first);
        }
        other => panic!("expected InProgress, got {:?}", other),
    }

    supervisor.cancel(first).await.unwrap();
    let job = wait_terminal(&supervisor, first).await;
    assert_eq!(job.state, JobState::Failed);
}

#[tokio::test]
async fn test_cancelled_job_fails_with_cancelled_reason() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_secs(30),
            fail: false,
        },
    );

    let job_id = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    supervisor.cancel(job_id).await.unwrap();

    let job = wait_terminal(&supervisor, job_id).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled"));
    assert_eq!(registry.get("AAPL").await.unwrap().version, 1);
}

#[tokio::test]
async fn test_trigger_after_terminal_job_is_accepted() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_millis(5),
            fail: false,
        },
    );

    let first = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    wait_terminal(&supervisor, first).await;

    // The model is free again once its job is terminal
    let second = supervisor
        .trigger(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    assert_ne!(first, second);
    let job = wait_terminal(&supervisor, second).await;
    assert_eq!(job.state, JobState::Succeeded);
}

#[tokio::test]
async fn test_unknown_job_operations() {
    let registry = seeded_registry().await;
    let supervisor = supervisor(
        Arc::clone(&registry),
        TestTrainer {
            delay: Duration::from_millis(5),
            fail: false,
        },
    );

    let bogus = Uuid::new_v4();
    assert!(supervisor.job(bogus).await.is_none());
    assert!(matches!(
        supervisor.cancel(bogus).await.unwrap_err(),
        RetrainError::UnknownJob(_)
    ));
}

#[tokio::test]
async fn test_trigger_all_with_empty_registry_has_no_targets() {
    let registry = Arc::new(ModelRegistry::new());
    let supervisor = supervisor(
        registry,
        TestTrainer {
            delay: Duration::from_millis(5),
            fail: false,
        },
    );
    assert!(matches!(
        supervisor.trigger(None).await.unwrap_err(),
        RetrainError::NoTargets
    ));
}
