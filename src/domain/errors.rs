use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the inference coordinator
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("No ready model for {model_id}")]
    ModelUnavailable { model_id: String },

    #[error("Model {model_id} v{version} produced invalid output: {reason}")]
    ModelOutputInvalid {
        model_id: String,
        version: u64,
        reason: String,
    },

    #[error("Upstream data error for {symbol}: {reason}")]
    UpstreamData { symbol: String, reason: String },

    #[error("Prediction deadline exceeded after {deadline_ms}ms")]
    Timeout { deadline_ms: u64 },
}

/// Errors surfaced by the strategy evaluator
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Strategy unavailable: all {attempted} symbol predictions failed")]
    Unavailable { attempted: usize },
}

/// Errors surfaced by the risk assessor
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Invalid portfolio: {reason}")]
    InvalidPortfolio { reason: String },

    #[error("Upstream data error for {symbol}: {reason}")]
    UpstreamData { symbol: String, reason: String },
}

/// Errors surfaced by the retraining supervisor
#[derive(Debug, Error)]
pub enum RetrainError {
    #[error("Retrain already running for {model_id} (job {job_id})")]
    InProgress { model_id: String, job_id: Uuid },

    #[error("Retrain job failed: {reason}")]
    Failed { reason: String },

    #[error("Unknown retrain job: {0}")]
    UnknownJob(Uuid),

    #[error("No retrain targets: registry is empty and no symbols were given")]
    NoTargets,
}

/// Errors surfaced by the subscription broker
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription {0} is closed")]
    Closed(Uuid),

    #[error("Unknown subscription: {0}")]
    Unknown(Uuid),
}
