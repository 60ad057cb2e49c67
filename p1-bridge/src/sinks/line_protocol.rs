//! InfluxDB line protocol encoding for readings.
//!
//! ```text
//! measurement field1=1.5,field2=2,field3=0.25,field4=10 1704067200
//! ```
//!
//! Readings carry no tags. Timestamps are written in seconds, so every write
//! request must declare `precision=s`.

use p1_domain::domain::Reading;

/// Precision parameter matching the timestamps written by [`write_reading_line`].
pub const PRECISION: &str = "s";

/// Measurement names escape commas and spaces.
fn escape_measurement(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

/// Tag keys, tag values and field keys also escape equals signs.
fn escape_key(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    escape_key(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

pub fn write_reading_line(measurement: &str, reading: &Reading, out: &mut String) {
    escape_measurement(measurement, out);

    out.push(' ');
    let mut first = true;
    for (name, value) in reading.fields() {
        push_field_f64(out, &mut first, name.as_str(), value);
    }

    out.push(' ');
    out.push_str(&reading.ts.unix_timestamp().to_string());
}

/// Encodes a batch, one newline-terminated line per reading.
pub fn encode_batch(measurement: &str, batch: &[Reading]) -> String {
    // ~120 bytes per line for four fields and a seconds timestamp.
    let mut s = String::with_capacity(batch.len().saturating_mul(120));
    for reading in batch {
        write_reading_line(measurement, reading, &mut s);
        s.push('\n');
    }
    s
}
