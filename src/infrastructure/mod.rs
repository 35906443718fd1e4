pub mod advisory;
pub mod match_store;
pub mod model_repo;
