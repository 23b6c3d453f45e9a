//! Vital-sign observation types.
//!
//! `RawObservation` is what arrives from a data store or a JSON file. It is
//! validated record by record into `Observation`; records that fail
//! validation are skipped and reported, never fatal for the whole window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A vital-sign measurement stream.
///
/// Declaration order is significant: it breaks ties when ranking risk
/// factors of equal impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    HeartRate,
    SystolicBp,
    DiastolicBp,
    RespiratoryRate,
    Glucose,
    Cholesterol,
}

impl Channel {
    /// All channels in declaration order.
    pub const ALL: [Channel; 6] = [
        Channel::HeartRate,
        Channel::SystolicBp,
        Channel::DiastolicBp,
        Channel::RespiratoryRate,
        Channel::Glucose,
        Channel::Cholesterol,
    ];

    /// Wire name, as serialized (`HEART_RATE`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeartRate => "HEART_RATE",
            Self::SystolicBp => "SYSTOLIC_BP",
            Self::DiastolicBp => "DIASTOLIC_BP",
            Self::RespiratoryRate => "RESPIRATORY_RATE",
            Self::Glucose => "GLUCOSE",
            Self::Cholesterol => "CHOLESTEROL",
        }
    }

    /// Human-readable channel name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::HeartRate => "Heart Rate",
            Self::SystolicBp => "Systolic Blood Pressure",
            Self::DiastolicBp => "Diastolic Blood Pressure",
            Self::RespiratoryRate => "Respiratory Rate",
            Self::Glucose => "Glucose",
            Self::Cholesterol => "Cholesterol",
        }
    }

    /// Canonical unit, used when a record carries no unit.
    #[must_use]
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            Self::HeartRate => "bpm",
            Self::SystolicBp | Self::DiastolicBp => "mmHg",
            Self::RespiratoryRate => "breaths/min",
            Self::Glucose | Self::Cholesterol => "mg/dL",
        }
    }

    /// Units accepted for this channel (compared case-insensitively).
    #[must_use]
    pub fn accepted_units(&self) -> &'static [&'static str] {
        match self {
            Self::HeartRate => &["bpm", "/min", "beats/min", "{beats}/min"],
            Self::SystolicBp | Self::DiastolicBp => &["mmhg", "mm[hg]"],
            Self::RespiratoryRate => &["breaths/min", "/min", "{breaths}/min", "rpm"],
            Self::Glucose | Self::Cholesterol => &["mg/dl"],
        }
    }

    /// Parse a channel from its wire name (`HEART_RATE`, `heart_rate`,
    /// `heart-rate`, `HeartRate`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "heartrate" | "hr" | "pulse" => Some(Self::HeartRate),
            "systolicbp" | "systolic" | "sbp" => Some(Self::SystolicBp),
            "diastolicbp" | "diastolic" | "dbp" => Some(Self::DiastolicBp),
            "respiratoryrate" | "rr" => Some(Self::RespiratoryRate),
            "glucose" => Some(Self::Glucose),
            "cholesterol" => Some(Self::Cholesterol),
            _ => None,
        }
    }

    fn accepts_unit(&self, unit: &str) -> bool {
        let unit = unit.trim().to_lowercase();
        self.accepted_units().iter().any(|u| *u == unit)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons a raw record is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObservationError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unit '{unit}' not accepted for {channel}")]
    UnitMismatch { channel: Channel, unit: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A single validated measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub channel: Channel,
    pub value: f64,
    pub unit: String,
    pub effective_time: DateTime<Utc>,
}

impl Observation {
    /// Create an observation in the channel's canonical unit.
    #[must_use]
    pub fn new(channel: Channel, value: f64, effective_time: DateTime<Utc>) -> Self {
        Self {
            channel,
            value,
            unit: channel.canonical_unit().to_string(),
            effective_time,
        }
    }
}

/// An unvalidated record as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub channel: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
    pub effective_time: String,
}

impl RawObservation {
    /// Validate into an `Observation`.
    ///
    /// # Errors
    /// Returns the first problem found with the channel, value, unit or
    /// timestamp.
    pub fn validate(&self) -> Result<Observation, ObservationError> {
        let channel = Channel::parse(&self.channel)
            .ok_or_else(|| ObservationError::UnknownChannel(self.channel.clone()))?;

        let value = match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| ObservationError::InvalidValue(self.value.to_string()))?;

        if !value.is_finite() || value < 0.0 {
            return Err(ObservationError::InvalidValue(value.to_string()));
        }

        let unit = match self.unit.as_deref().map(str::trim) {
            None | Some("") => channel.canonical_unit().to_string(),
            Some(u) if channel.accepts_unit(u) => u.to_string(),
            Some(u) => {
                return Err(ObservationError::UnitMismatch {
                    channel,
                    unit: u.to_string(),
                })
            }
        };

        let effective_time = parse_timestamp(&self.effective_time)?;

        Ok(Observation {
            channel,
            value,
            unit,
            effective_time,
        })
    }
}

/// Parse RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (UTC) or a bare date
/// (midnight UTC).
fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, ObservationError> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(ObservationError::InvalidTimestamp(input.to_string()))
}

/// A rejected raw record and why.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedObservation {
    /// Position in the input sequence
    pub index: usize,
    pub error: ObservationError,
}

/// Per-channel, time-ordered observations for one patient window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSet {
    channels: BTreeMap<Channel, Vec<Observation>>,
}

impl ObservationSet {
    /// An empty window.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from validated observations.
    ///
    /// Each channel is sorted ascending by `effective_time`; the sort is
    /// stable, so equal timestamps keep arrival order.
    #[must_use]
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut channels: BTreeMap<Channel, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            channels.entry(obs.channel).or_default().push(obs);
        }
        for series in channels.values_mut() {
            series.sort_by_key(|o| o.effective_time);
        }
        Self { channels }
    }

    /// Validate raw records, skipping the malformed ones.
    #[must_use]
    pub fn ingest(records: &[RawObservation]) -> (Self, Vec<RejectedObservation>) {
        let mut valid = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match record.validate() {
                Ok(obs) => valid.push(obs),
                Err(error) => {
                    tracing::warn!("Skipping observation #{}: {}", index, error);
                    rejected.push(RejectedObservation { index, error });
                }
            }
        }

        (Self::from_observations(valid), rejected)
    }

    /// Observations for a channel (empty when the channel has no data).
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &[Observation] {
        self.channels.get(&channel).map_or(&[], Vec::as_slice)
    }

    /// Values for a channel, in time order.
    #[must_use]
    pub fn values(&self, channel: Channel) -> Vec<f64> {
        self.channel(channel).iter().map(|o| o.value).collect()
    }

    /// Number of samples for a channel.
    #[must_use]
    pub fn sample_count(&self, channel: Channel) -> usize {
        self.channel(channel).len()
    }

    /// Number of samples across all channels.
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }

    /// Distinct calendar days (UTC) covered by the whole window, at least 1.
    #[must_use]
    pub fn observed_span_days(&self) -> usize {
        let days: BTreeSet<NaiveDate> = self
            .iter()
            .map(|o| o.effective_time.date_naive())
            .collect();
        days.len().max(1)
    }

    /// All observations in channel order, then time order.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.channels.values().flatten()
    }
}
