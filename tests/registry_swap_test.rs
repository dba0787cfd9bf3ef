use quantserve::application::coordinator::{CoordinatorConfig, InferenceCoordinator};
use quantserve::application::registry::ModelRegistry;
use quantserve::domain::model::{ModelHandle, ScorerSpec};
use quantserve::domain::ports::ModelScorer;
use quantserve::domain::types::{FeatureSet, PredictionRequest, Timeframe};
use quantserve::infrastructure::cache::NoopFeatureCache;
use quantserve::infrastructure::mock::MockDataProvider;
use quantserve::infrastructure::observability::Metrics;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

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

/// Scorer that blocks until released, to pin a request mid-flight while
/// the registry is republished underneath it
struct GatedScorer {
    release: Arc<AtomicBool>,
}

impl ModelScorer for GatedScorer {
    fn score(&self, _features: &FeatureSet) -> Result<f64, String> {
        while !self.release.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(0.8)
    }
    fn name(&self) -> &str {
        "gated"
    }
    fn spec(&self) -> ScorerSpec {
        ScorerSpec::Momentum {
            buy_rsi: 30.0,
            sell_rsi: 70.0,
        }
    }
}

fn handle(id: &str, version: u64, scorer: Arc<dyn ModelScorer>) -> ModelHandle {
    ModelHandle::ready(id, version, scorer)
}

/// Test: a publish batch is visible all-or-nothing to concurrent readers
///
/// A reader loops over snapshots while a writer repeatedly publishes
/// paired handles whose versions must match. A torn write would surface
/// as a snapshot holding mismatched pair versions.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_publish_batch_never_tears() {
    let registry = Arc::new(ModelRegistry::new());
    registry
        .publish(vec![
            handle("A", 0, Arc::new(FixedScorer(0.5))),
            handle("B", 0, Arc::new(FixedScorer(0.5))),
        ])
        .await;

    let writer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for round in 1..=200u64 {
                registry
                    .publish(vec![
                        handle("A", round, Arc::new(FixedScorer(0.5))),
                        handle("B", round, Arc::new(FixedScorer(0.5))),
                    ])
                    .await;
            }
        })
    };

    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for _ in 0..2000 {
                let snap = registry.snapshot().await;
                let a = snap.get("A").unwrap().version;
                let b = snap.get("B").unwrap().version;
                assert_eq!(a, b, "observed torn publish: A v{} with B v{}", a, b);
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

/// Test: an in-flight request keeps the handle it dispatched against,
/// even when a new version is published mid-request
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inflight_request_never_sees_later_publish() {
    let registry = Arc::new(ModelRegistry::new());
    let release = Arc::new(AtomicBool::new(false));
    registry
        .publish(vec![handle(
            "AAPL",
            1,
            Arc::new(GatedScorer {
                release: Arc::clone(&release),
            }),
        )])
        .await;

    let coordinator = Arc::new(InferenceCoordinator::new(
        Arc::clone(&registry),
        Arc::new(MockDataProvider::new()),
        Arc::new(NoopFeatureCache),
        Metrics::new().unwrap(),
        CoordinatorConfig::default(),
    ));

    let request = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move {
            coordinator
                .predict(PredictionRequest::new("AAPL", Timeframe::OneDay))
                .await
        }
    });

    // Let the request take its snapshot and park inside the scorer
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry
        .publish(vec![handle("AAPL", 2, Arc::new(FixedScorer(0.5)))])
        .await;
    release.store(true, Ordering::Release);

    let result = request.await.unwrap().unwrap();
    assert_eq!(result.model_version, 1);

    // A request dispatched after the publish sees the new version
    let fresh = coordinator
        .predict(PredictionRequest::new("AAPL", Timeframe::OneDay))
        .await
        .unwrap();
    assert_eq!(fresh.model_version, 2);
}

/// Test: concurrent publishes for disjoint model sets both land
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_publishes_commute() {
    let registry = Arc::new(ModelRegistry::new());

    let mut tasks = Vec::new();
    for (id, version) in [("A", 10u64), ("B", 20u64), ("C", 30u64), ("D", 40u64)] {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry
                .publish(vec![handle(id, version, Arc::new(FixedScorer(0.5)))])
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snap = registry.snapshot().await;
    assert_eq!(snap.len(), 4);
    assert_eq!(snap.get("A").unwrap().version, 10);
    assert_eq!(snap.get("D").unwrap().version, 40);
}
