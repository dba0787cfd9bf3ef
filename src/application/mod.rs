pub mod broker;
pub mod coordinator;
pub mod engine;
pub mod registry;
pub mod retraining;
pub mod risk_assessor;
pub mod strategy_evaluator;
