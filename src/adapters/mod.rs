//! Adapters layer: Concrete implementations of ports.
//!
//! - `sqlite`: SQLite observation store
//! - `http`: HTTP client for the explanation service
//! - `template`: deterministic fallback explanation
//! - `sanitize`: identifier redaction for logs

pub mod http;
pub mod sanitize;
pub mod sqlite;
pub mod template;

pub use http::HttpExplainer;
pub use sqlite::{CodeMap, SqliteObservationStore, StorageError};
pub use template::{fallback_explanation, TemplateExplainer};
