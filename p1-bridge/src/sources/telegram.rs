//! JSON shape of a decoded P1 telegram as emitted by the meter reader.
//!
//! ```json
//! { "timestamp": "2024-01-01T12:00:00Z",
//!   "electricity": { "received": { "tariff1": { "reading": 1234.5 },
//!                                  "tariff2": { "reading": 987.6 },
//!                                  "actual":  { "reading": 0.42 } } },
//!   "gas": { "reading": 321.0 } }
//! ```
//!
//! Any other keys the reader emits are ignored. A missing value is an error;
//! nothing is defaulted.

use p1_domain::domain::Reading;
use serde::Deserialize;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::pipeline::PipelineError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TelegramTimestamp {
    UnixSeconds(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Register {
    reading: f64,
}

#[derive(Debug, Deserialize)]
struct Received {
    tariff1: Register,
    tariff2: Register,
    actual: Register,
}

#[derive(Debug, Deserialize)]
struct Electricity {
    received: Received,
}

#[derive(Debug, Deserialize)]
pub struct IncomingTelegram {
    timestamp: TelegramTimestamp,
    electricity: Electricity,
    gas: Register,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<IncomingTelegram>),
    One(IncomingTelegram),
}

fn parse_timestamp(ts: &TelegramTimestamp) -> Result<OffsetDateTime, PipelineError> {
    match ts {
        TelegramTimestamp::UnixSeconds(secs) => OffsetDateTime::from_unix_timestamp(*secs)
            .map_err(|e| PipelineError::Source(format!("invalid timestamp {secs}: {e}"))),
        TelegramTimestamp::Text(s) => OffsetDateTime::parse(s, &Rfc3339)
            .or_else(|_| {
                // Timestamps without an offset are taken as UTC.
                PrimitiveDateTime::parse(
                    s,
                    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
                )
                .map(PrimitiveDateTime::assume_utc)
            })
            .map_err(|e| PipelineError::Source(format!("invalid timestamp '{s}': {e}"))),
    }
}

impl TryFrom<IncomingTelegram> for Reading {
    type Error = PipelineError;

    fn try_from(t: IncomingTelegram) -> Result<Self, Self::Error> {
        Ok(Reading {
            ts: parse_timestamp(&t.timestamp)?,
            electricity_tariff1: t.electricity.received.tariff1.reading,
            electricity_tariff2: t.electricity.received.tariff2.reading,
            electricity_actual: t.electricity.received.actual.reading,
            gas_reading: t.gas.reading,
        })
    }
}

/// Decodes a single telegram object.
pub fn parse_telegram(json: &str) -> Result<Reading, PipelineError> {
    let telegram: IncomingTelegram = serde_json::from_str(json)
        .map_err(|e| PipelineError::Source(format!("failed to parse telegram json: {e}")))?;
    telegram.try_into()
}

/// Decodes a request body holding one telegram object or an array of them.
///
/// Returns one result per telegram so a bad timestamp only drops its own reading.
pub fn parse_telegrams(body: &[u8]) -> Result<Vec<Result<Reading, PipelineError>>, PipelineError> {
    let parsed: OneOrMany = serde_json::from_slice(body)
        .map_err(|e| PipelineError::Source(format!("failed to parse telegram json: {e}")))?;

    let telegrams = match parsed {
        OneOrMany::Many(v) => v,
        OneOrMany::One(t) => vec![t],
    };
    Ok(telegrams.into_iter().map(Reading::try_from).collect())
}
