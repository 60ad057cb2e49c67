use crate::pipeline::{Envelope, PipelineError, Transform};
use p1_domain::domain::Reading;
use time::macros::datetime;

/// Pure validation of a `Reading`.
///
/// Rules:
/// - every measured value must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
///
/// Invalid readings are rejected as a whole; values are never clamped or filled in.
pub fn validate_reading(env: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
    let r = &env.payload;

    for (name, value) in r.fields() {
        if !value.is_finite() || value < 0.0 {
            return Err(PipelineError::Transform(format!(
                "{} must be a non-negative number, got {value}",
                name.as_str()
            )));
        }
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform for ReadingValidation {
    async fn apply(&self, input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
