pub mod errors;
pub mod jobs;
pub mod model;
pub mod ports;
pub mod types;
