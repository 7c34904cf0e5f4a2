// src/config/mod.rs
// Configuration: tunable thresholds from file, credentials from environment

pub mod env;
pub mod file;

pub use env::{ApiKeys, BackendConfig};
pub use file::{
    ClassifierConfig, ConflictConfig, ContextConfig, EngineConfig, RetrievalConfig, TierConfig,
};
