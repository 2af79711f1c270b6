// PR reviewer-assignment load harness - library root

pub mod classifier;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod http_client;
pub mod metrics;
pub mod mock_server;
pub mod models;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod scheduler;
pub mod thresholds;
