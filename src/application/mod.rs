pub mod cache;
pub mod outcome_buffer;
pub mod predictor;
pub mod retrainer;
pub mod service;
pub mod system;
