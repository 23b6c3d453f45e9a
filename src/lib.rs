//! # vitalrisk
//!
//! Risk scoring over a patient's time-ordered vital signs.
//!
//! This crate provides:
//! - Per-channel trend analysis and anomaly detection
//! - A bounded, explainable risk score with ranked contributing factors
//! - Linear projection of the score to a short horizon, with confidence
//! - Rule-triggered alerts
//! - An optional, time-bounded narrative explanation with a deterministic
//!   fallback
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (observations, risk results, projections, alerts)
//! - `engine`: The pure numeric pipeline
//! - `config`: Thresholds, weights and breakpoints
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (SQLite, HTTP, templates, log redaction)
//! - `application`: Use cases orchestrating the engine and ports

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;

pub use config::EngineConfig;
pub use domain::{Observation, ObservationSet, Projection, RiskCategory, RiskResult};
pub use engine::{RiskAssessment, RiskEngine};

/// Result type for vitalrisk operations
pub type Result<T> = std::result::Result<T, VitalRiskError>;

/// Main error type for vitalrisk
#[derive(Debug, thiserror::Error)]
pub enum VitalRiskError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Explanation service error: {0}")]
    Explain(#[from] ports::ExplainError),

    #[error("Invalid observation: {0}")]
    Observation(#[from] domain::ObservationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
