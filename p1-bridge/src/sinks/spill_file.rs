use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use p1_domain::domain::Reading;
use time::format_description::well_known::Rfc3339;

use crate::cache::Overflow;

pub const SPILL_DELIMITER: u8 = b';';

#[derive(thiserror::Error, Debug)]
pub enum SpillError {
    #[error("failed to open spill file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write spill record: {0}")]
    Write(#[from] csv::Error),
    #[error("failed to flush spill file: {0}")]
    Flush(#[from] std::io::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Append-only file of undelivered readings, one `ts;tariff1;tariff2;actual;gas`
/// line per reading.
///
/// Nothing reads it back automatically; see the `replay_spill` binary.
pub struct SpillFile {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl SpillFile {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, SpillError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SpillError::Open {
                path: path.clone(),
                source,
            })?;

        let writer = csv::WriterBuilder::new()
            .delimiter(SPILL_DELIMITER)
            .has_headers(false)
            .from_writer(file);

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, readings: &[Reading]) -> Result<(), SpillError> {
        if readings.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for r in readings {
            writer.write_record([
                r.ts.format(&Rfc3339)?,
                r.electricity_tariff1.to_string(),
                r.electricity_tariff2.to_string(),
                r.electricity_actual.to_string(),
                r.gas_reading.to_string(),
            ])?;
        }
        writer.flush()?;

        metrics::counter!("spill_readings_total").increment(readings.len() as u64);
        Ok(())
    }
}

impl Overflow for SpillFile {
    fn absorb(&self, evicted: &[Reading]) {
        match self.append(evicted) {
            Ok(()) => {
                tracing::info!(
                    count = evicted.len(),
                    path = %self.path.display(),
                    "evicted readings written to spill file"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, count = evicted.len(), "evicted readings lost");
            }
        }
    }
}
