//! Domain layer: Core vital-sign and risk types.
//!
//! Pure data types with serde support. No I/O happens here.

mod alert;
mod observation;
mod projection;
mod risk;

pub use alert::{Alert, AlertSeverity};
pub use observation::{
    Channel, Observation, ObservationError, ObservationSet, RawObservation, RejectedObservation,
};
pub use projection::{Projection, Trajectory};
pub use risk::{ChannelSummary, RiskCategory, RiskFactor, RiskResult, TrendDirection};
