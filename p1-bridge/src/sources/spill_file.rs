use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use p1_domain::domain::Reading;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    pipeline::{Envelope, EventStream, PipelineError, Source, SourceEvent},
    sinks::spill_file::SPILL_DELIMITER,
};

/// Reads a spill file back for manual replay.
///
/// Each record is `ts;tariff1;tariff2;actual;gas` without a header row.
pub struct SpillFileSource {
    path: PathBuf,
}

impl SpillFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_f64(record: &StringRecord, idx: usize, name: &str) -> Result<f64, PipelineError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in spill record")))?;
    raw.trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid {name} '{raw}': {e}")))
}

fn record_to_reading(record: &StringRecord) -> Result<Reading, PipelineError> {
    if record.len() != 5 {
        return Err(PipelineError::Source(format!(
            "expected 5 columns in spill record, got {}",
            record.len()
        )));
    }

    let ts_str = record.get(0).unwrap_or_default();
    let ts = OffsetDateTime::parse(ts_str.trim(), &Rfc3339)
        .map_err(|e| PipelineError::Source(format!("invalid ts '{ts_str}': {e}")))?;

    Ok(Reading {
        ts,
        electricity_tariff1: parse_f64(record, 1, "tariff1")?,
        electricity_tariff2: parse_f64(record, 2, "tariff2")?,
        electricity_actual: parse_f64(record, 3, "actual")?,
        gas_reading: parse_f64(record, 4, "gas")?,
    })
}

#[async_trait::async_trait]
impl Source for SpillFileSource {
    async fn events(&self) -> EventStream {
        // Blocking CSV reader inside one async task; spill files are replayed
        // by hand and are small enough for that.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    yield SourceEvent::Error(PipelineError::Source(format!(
                        "failed to open spill file {}: {e}",
                        path.display()
                    )));
                    yield SourceEvent::Closed;
                    return;
                }
            };
            yield SourceEvent::Connected(path.display().to_string());

            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(SPILL_DELIMITER)
                .has_headers(false)
                .flexible(true)
                .from_reader(file);

            for result in rdr.records() {
                let event = match result {
                    Ok(record) => match record_to_reading(&record) {
                        Ok(reading) => SourceEvent::Reading(Envelope::now(reading)),
                        Err(e) => {
                            metrics::counter!("spill_parse_errors_total").increment(1);
                            SourceEvent::Error(e)
                        }
                    },
                    Err(e) => SourceEvent::Error(PipelineError::Source(format!(
                        "failed to read spill record: {e}"
                    ))),
                };
                yield event;
            }

            yield SourceEvent::Closed;
        };

        Box::pin(s)
    }
}
