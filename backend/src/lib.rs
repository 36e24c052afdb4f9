pub mod config;
pub mod convert;
pub mod inference;
pub mod ingest;
pub mod mapper;
pub mod pipeline;
pub mod preprocess;
pub mod render;
#[cfg(feature = "torch")]
pub mod repair;
pub mod routes;
