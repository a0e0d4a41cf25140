// src/lib.rs
//
// riskloom: wallet risk-intelligence scoring over EVM transaction history.
// Fetches a wallet's on-chain activity, extracts a fixed feature vector,
// runs it through an unsupervised outlier detector and a bank of
// pattern-specific detectors (temporal, MEV, bridge, sanctions), and fuses
// the results into a single `RiskReport`.

pub mod community;
pub mod concurrency;
pub mod config;
pub mod detectors;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod features;
pub mod fetcher;
pub mod graph_pipeline;
pub mod label_registry;
pub mod metrics;
pub mod state;

pub use config::Config;
pub use domain::{Address, RiskReport};
pub use engine::orchestrator::Orchestrator;
pub use errors::RiskError;
