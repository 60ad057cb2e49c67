//! Test helpers shared by the unit tests.

use std::{collections::VecDeque, sync::Mutex};

use p1_domain::domain::Reading;
use time::{macros::datetime, Duration, OffsetDateTime};

use crate::sinks::{SinkClient, SinkError};

const BASE: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

/// A reading `secs` seconds after the test epoch, with values derived from it.
pub fn reading_at(secs: i64) -> Reading {
    Reading {
        ts: BASE + Duration::seconds(secs),
        electricity_tariff1: 1000.0 + secs as f64,
        electricity_tariff2: 2000.0 + secs as f64,
        electricity_actual: 0.5,
        gas_reading: 300.0 + secs as f64,
    }
}

/// Inverse of [`reading_at`] for assertions.
pub fn timestamps(readings: &[Reading]) -> Vec<i64> {
    readings.iter().map(|r| (r.ts - BASE).whole_seconds()).collect()
}

/// Sink client that replays a scripted list of outcomes and records payloads.
pub struct ScriptedSink {
    script: Mutex<VecDeque<bool>>,
    otherwise: bool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSink {
    pub fn healthy() -> Self {
        Self::scripted(&[], true)
    }

    pub fn failing() -> Self {
        Self::scripted(&[], false)
    }

    /// Uses `outcomes` in order (true = accepted), then `otherwise` forever.
    pub fn scripted(outcomes: &[bool], otherwise: bool) -> Self {
        Self {
            script: Mutex::new(outcomes.iter().copied().collect()),
            otherwise,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SinkClient for ScriptedSink {
    async fn write_lines(&self, payload: String) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(payload);
        let ok = self.script.lock().unwrap().pop_front().unwrap_or(self.otherwise);
        if ok {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: 503,
                body: "sink unavailable".to_string(),
            })
        }
    }
}
