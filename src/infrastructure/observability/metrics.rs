//! Prometheus metrics definitions for Quantserve
//!
//! All metrics use the `quantserve_` prefix. The registry is push-based:
//! `export()` renders the text format for whatever sink the deployment
//! wires up.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Predictions served, labeled by outcome
    pub predictions_total: CounterVec,
    /// End-to-end predict latency in seconds, labeled by outcome
    pub prediction_latency_seconds: HistogramVec,
    /// Messages dropped under subscription backpressure
    pub subscription_dropped_total: Counter,
    /// Currently open subscriptions
    pub active_subscriptions: Gauge,
    /// Retrain jobs reaching a terminal state, labeled by state
    pub retrain_jobs_total: CounterVec,
    /// Ready models in the registry
    pub models_ready: Gauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new("quantserve_predictions_total", "Predictions served"),
            &["outcome"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let prediction_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "quantserve_prediction_latency_seconds",
                "End-to-end predict latency",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(prediction_latency_seconds.clone()))?;

        let subscription_dropped_total = Counter::with_opts(Opts::new(
            "quantserve_subscription_dropped_total",
            "Messages dropped under subscription backpressure",
        ))?;
        registry.register(Box::new(subscription_dropped_total.clone()))?;

        let active_subscriptions = Gauge::with_opts(Opts::new(
            "quantserve_active_subscriptions",
            "Currently open subscriptions",
        ))?;
        registry.register(Box::new(active_subscriptions.clone()))?;

        let retrain_jobs_total = CounterVec::new(
            Opts::new(
                "quantserve_retrain_jobs_total",
                "Retrain jobs by terminal state",
            ),
            &["state"],
        )?;
        registry.register(Box::new(retrain_jobs_total.clone()))?;

        let models_ready = Gauge::with_opts(Opts::new(
            "quantserve_models_ready",
            "Ready models in the registry",
        ))?;
        registry.register(Box::new(models_ready.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            predictions_total,
            prediction_latency_seconds,
            subscription_dropped_total,
            active_subscriptions,
            retrain_jobs_total,
            models_ready,
        })
    }

    /// Renders the registry in Prometheus text format
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}
