pub mod cache;
pub mod features;
pub mod mock;
pub mod model_store;
pub mod observability;
pub mod scorers;
pub mod trainer;
