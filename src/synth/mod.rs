//! Deterministic entity synthesis
//!
//! - `services`: `gensvc{i}` services and everything that lists them
//! - `tasks`: tasks spread over the node roster with rotating states
//!
//! Both generators skip IDs that already exist, so re-running them on
//! their own output changes nothing.

pub mod services;
pub mod tasks;

pub use services::{synthetic_service_id, SyntheticServiceGenerator};
pub use tasks::TaskSynthesizer;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Clock shared by one synthesis run
#[derive(Debug, Clone, Copy)]
pub struct SynthesisContext {
    now: DateTime<Utc>,
}

impl SynthesisContext {
    /// Context pinned to the current time
    pub fn now() -> Self {
        Self { now: Utc::now() }
    }

    /// Context pinned to a fixed instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.now
    }

    /// ISO-8601 timestamp `minutes_back` minutes before now, millisecond precision
    pub fn timestamp(&self, minutes_back: i64) -> String {
        (self.now - Duration::minutes(minutes_back)).to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Default for SynthesisContext {
    fn default() -> Self {
        Self::now()
    }
}
