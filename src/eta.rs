//! Seconds-until-arrival derivation.

use chrono::NaiveDateTime;
use tracing::warn;

use crate::error::ParseError;
use crate::parser::PredictionBatch;

/// Published when a stop has no usable prediction. Distinct from `0`, which
/// means "arriving now".
pub const NO_PREDICTION: i64 = -1;

/// Converts a batch of arrival timestamps into seconds from `now`.
///
/// `now` must be wall-clock time in the agency's time zone, since both APIs
/// report local times without an offset. Arrivals in the past clamp to `0`.
/// Records that fail to parse are logged and skipped. The result is never
/// empty: with nothing usable it is `[NO_PREDICTION]`.
pub fn compute_etas(batch: &PredictionBatch, now: NaiveDateTime) -> Vec<i64> {
    let format = batch.mode.timestamp_format();

    let etas: Vec<i64> = batch
        .arrivals
        .iter()
        .filter_map(|raw| match parse_arrival(raw, format) {
            Ok(arrival) => Some((arrival - now).num_seconds().max(0)),
            Err(e) => {
                warn!(mode = %batch.mode, error = %e, "Skipping unparsable prediction");
                None
            }
        })
        .collect();

    if etas.is_empty() {
        vec![NO_PREDICTION]
    } else {
        etas
    }
}

fn parse_arrival(raw: &str, format: &'static str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), format).map_err(|_| ParseError::Timestamp {
        value: raw.to_string(),
        format,
    })
}

/// First ETA of a computed sequence. The sequence is never empty, but a
/// missing head still reads as [`NO_PREDICTION`].
pub fn first_eta(etas: &[i64]) -> i64 {
    etas.first().copied().unwrap_or(NO_PREDICTION)
}

/// Soonest arrival among an aggregate's members, ignoring [`NO_PREDICTION`].
///
/// `None` when no member has a prediction; nothing is published then.
pub fn aggregate_min(first_etas: &[i64]) -> Option<i64> {
    first_etas
        .iter()
        .copied()
        .filter(|&eta| eta != NO_PREDICTION)
        .min()
}
