pub mod api;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod secrets;
pub mod trainer;
pub mod types;
