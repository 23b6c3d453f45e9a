//! Observation source port.
//!
//! Abstracts where a patient's raw vital-sign records come from. Records
//! are returned unvalidated; the domain layer decides which to keep.

use chrono::{DateTime, Utc};

use crate::domain::RawObservation;

/// Read access to stored vital-sign observations.
pub trait ObservationSource: Send + Sync {
    /// Error type for source operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a patient's records with `effective_time >= since` (all records
    /// when `since` is `None`), oldest first.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be read.
    fn fetch(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawObservation>, Self::Error>;

    /// Patients with at least one stored record.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be read.
    fn patients(&self) -> Result<Vec<String>, Self::Error>;
}
