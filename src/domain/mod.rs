pub mod advisory;
pub mod classifier;
pub mod errors;
pub mod features;
pub mod model;
pub mod ports;
pub mod types;
