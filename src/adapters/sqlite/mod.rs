//! SQLite adapter: Implementation of ObservationSource.
//!
//! Stores vital-sign records keyed by patient and clinical code. Codes are
//! LOINC by default and resolved to channels through a `CodeMap`; unknown
//! codes are passed through unchanged so validation can reject them.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed layout, which
//! keeps lexical and chronological order identical.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};

use crate::domain::{Channel, Observation, RawObservation};
use crate::ports::ObservationSource;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid patient id: {0:?}")]
    InvalidPatient(String),
}

/// Clinical code to channel mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeMap {
    codes: BTreeMap<String, Channel>,
}

impl CodeMap {
    /// Build from explicit `(code, channel)` pairs.
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Channel)>,
        S: Into<String>,
    {
        Self {
            codes: pairs.into_iter().map(|(c, ch)| (c.into(), ch)).collect(),
        }
    }

    #[must_use]
    pub fn resolve(&self, code: &str) -> Option<Channel> {
        self.codes.get(code.trim()).copied()
    }

    /// Code stored for a channel; the first mapped code wins.
    #[must_use]
    pub fn code_for(&self, channel: Channel) -> Option<&str> {
        self.codes
            .iter()
            .find(|(_, c)| **c == channel)
            .map(|(code, _)| code.as_str())
    }
}

impl Default for CodeMap {
    fn default() -> Self {
        Self::new([
            ("8867-4", Channel::HeartRate),
            ("8480-6", Channel::SystolicBp),
            ("8462-4", Channel::DiastolicBp),
            ("9279-1", Channel::RespiratoryRate),
            ("2339-0", Channel::Glucose),
            ("2093-3", Channel::Cholesterol),
        ])
    }
}

/// SQLite observation store.
pub struct SqliteObservationStore {
    conn: Mutex<Connection>,
    codes: CodeMap,
}

impl SqliteObservationStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(conn),
            codes: CodeMap::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Replace the code mapping.
    #[must_use]
    pub fn with_codes(mut self, codes: CodeMap) -> Self {
        self.codes = codes;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id TEXT NOT NULL,
                code TEXT NOT NULL,
                value,
                unit TEXT,
                effective_time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_observations_patient_time
                ON observations(patient_id, effective_time);
            ",
        )?;

        Ok(())
    }

    /// Fixed-width RFC 3339 with nanoseconds, so text order is time order.
    fn timestamp(t: &DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn code(&self, channel: Channel) -> String {
        self.codes
            .code_for(channel)
            .map_or_else(|| channel.as_str().to_string(), str::to_string)
    }

    /// Store one validated observation.
    ///
    /// # Errors
    /// Returns error on a blank patient id or a database failure.
    pub fn record(&self, patient_id: &str, obs: &Observation) -> Result<(), StorageError> {
        self.record_all(patient_id, std::slice::from_ref(obs))
            .map(|_| ())
    }

    /// Store observations in one transaction. Returns the number stored.
    ///
    /// # Errors
    /// Returns error on a blank patient id or a database failure; nothing is
    /// stored in that case.
    pub fn record_all(&self, patient_id: &str, observations: &[Observation]) -> Result<usize, StorageError> {
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(StorageError::InvalidPatient(patient_id.to_string()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO observations (patient_id, code, value, unit, effective_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for obs in observations {
                stmt.execute(params![
                    patient_id,
                    self.code(obs.channel),
                    obs.value,
                    obs.unit,
                    Self::timestamp(&obs.effective_time),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Stored {} observation(s)", observations.len());
        Ok(observations.len())
    }

    /// Total stored records across all patients.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete all records of one patient. Returns the number removed.
    ///
    /// # Errors
    /// Returns error if the delete fails.
    pub fn delete_patient(&self, patient_id: &str) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM observations WHERE patient_id = ?1", params![patient_id.trim()])?)
    }
}

/// Convert a stored cell into the loosely typed value a raw record carries.
fn json_value(cell: SqlValue) -> serde_json::Value {
    match cell {
        SqlValue::Integer(i) => serde_json::Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        SqlValue::Text(s) => serde_json::Value::String(s),
        SqlValue::Null | SqlValue::Blob(_) => serde_json::Value::Null,
    }
}

impl ObservationSource for SqliteObservationStore {
    type Error = StorageError;

    fn fetch(
        &self,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawObservation>, Self::Error> {
        let conn = self.lock()?;
        let since = since.map_or_else(String::new, |t| Self::timestamp(&t));

        let mut stmt = conn.prepare(
            "SELECT code, value, unit, effective_time
             FROM observations
             WHERE patient_id = ?1 AND effective_time >= ?2
             ORDER BY effective_time ASC, id ASC",
        )?;

        let rows = stmt
            .query_map(params![patient_id.trim(), since], |row| {
                let code: String = row.get(0)?;
                let value: SqlValue = row.get(1)?;
                let unit: Option<String> = row.get(2)?;
                let effective_time: String = row.get(3)?;
                Ok((code, value, unit, effective_time))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let records: Vec<RawObservation> = rows
            .into_iter()
            .map(|(code, value, unit, effective_time)| RawObservation {
                channel: self
                    .codes
                    .resolve(&code)
                    .map_or(code, |c| c.as_str().to_string()),
                value: json_value(value),
                unit,
                effective_time,
            })
            .collect();

        tracing::debug!("Fetched {} record(s)", records.len());
        Ok(records)
    }

    fn patients(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT patient_id FROM observations ORDER BY patient_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
