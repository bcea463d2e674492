//! Reading normalizer
//!
//! Reduces an arbitrarily shaped "latest average" payload to a canonical
//! reading. Total and panic-free: anything unrecognized yields `None` and the
//! caller falls back to manual entry.
//!
//! EEG shapes are tried in order after unwrapping `data` / `avg` / `averages`
//! envelopes:
//! 1. flat record with all five band keys
//! 2. array of per-channel records
//! 3. map of channel name → record
//! 4. array of positional rows (delta, theta, alpha, beta, gamma)

use crate::models::{BiometricReading, EegReading};
use serde_json::{Map, Value};
use tracing::debug;

/// Keys that wrap the interesting part of a payload
const ENVELOPE_KEYS: [&str; 3] = ["data", "avg", "averages"];

/// Nesting bound for envelope unwrapping
const MAX_ENVELOPE_DEPTH: usize = 16;

type EegRecognizer = fn(&Value) -> Option<EegReading>;

/// EEG shape recognizers, tried in order
const EEG_RECOGNIZERS: [(&str, EegRecognizer); 4] = [
    ("flat-record", recognize_flat_record),
    ("channel-array", recognize_channel_array),
    ("channel-map", recognize_channel_map),
    ("positional-rows", recognize_positional_rows),
];

/// Normalize an EEG payload
///
/// Returns `None` when no recognizer matches or every band is missing.
pub fn normalize_eeg(payload: &Value) -> Option<EegReading> {
    let inner = unwrap_envelopes(payload, |obj| has_all_bands(obj));

    EEG_RECOGNIZERS.iter().find_map(|(name, recognize)| {
        let reading = recognize(inner).filter(EegReading::has_any_band)?;
        debug!(shape = name, "Recognized EEG payload");
        Some(reading)
    })
}

/// Normalize a biometric payload
///
/// Accepts a flat `{gsr, spo2}` record or an array of such samples (averaged).
/// SpO2 outside [0, 100] is rejected.
pub fn normalize_biometric(payload: &Value) -> Option<BiometricReading> {
    let inner = unwrap_envelopes(payload, |obj| {
        get_ci(obj, "gsr").is_some() && get_ci(obj, "spo2").is_some()
    });

    let reading = match inner {
        Value::Object(obj) => {
            let gsr = get_ci(obj, "gsr").and_then(coerce_number)?;
            let spo2 = get_ci(obj, "spo2").and_then(coerce_number)?;
            BiometricReading::new(gsr, spo2)
        }
        Value::Array(samples) => {
            let records: Vec<&Map<String, Value>> =
                samples.iter().filter_map(Value::as_object).collect();
            if records.is_empty() {
                return None;
            }
            let gsr = mean(records.iter().filter_map(|r| get_ci(r, "gsr").and_then(coerce_number)))?;
            let spo2 = mean(records.iter().filter_map(|r| get_ci(r, "spo2").and_then(coerce_number)))?;
            BiometricReading::new(gsr, spo2)
        }
        _ => return None,
    };

    reading.validate().ok().map(|_| reading)
}

/// Descend through envelope keys until `is_terminal` holds or no envelope remains
fn unwrap_envelopes<'a>(
    payload: &'a Value,
    is_terminal: impl Fn(&Map<String, Value>) -> bool,
) -> &'a Value {
    let mut current = payload;
    for _ in 0..MAX_ENVELOPE_DEPTH {
        let Value::Object(obj) = current else {
            break;
        };
        if is_terminal(obj) {
            break;
        }
        let next = ENVELOPE_KEYS
            .iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| v.is_object() || v.is_array());
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Case-insensitive key lookup (exact match first)
fn get_ci<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn has_all_bands(obj: &Map<String, Value>) -> bool {
    EegReading::BANDS.iter().all(|band| get_ci(obj, band).is_some())
}

fn has_any_band_key(obj: &Map<String, Value>) -> bool {
    EegReading::BANDS.iter().any(|band| get_ci(obj, band).is_some())
}

/// Finite number, or a string holding one
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn band_values(obj: &Map<String, Value>) -> [Option<f64>; 5] {
    EegReading::BANDS.map(|band| get_ci(obj, band).and_then(coerce_number))
}

/// Average each band over the records that report a finite value for it
fn average_records<'a>(records: impl Iterator<Item = &'a Map<String, Value>>) -> EegReading {
    let mut sums = [0.0f64; 5];
    let mut counts = [0usize; 5];
    for record in records {
        for (i, value) in band_values(record).into_iter().enumerate() {
            if let Some(v) = value {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }
    let mut bands = [None; 5];
    for i in 0..5 {
        if counts[i] > 0 {
            bands[i] = Some(sums[i] / counts[i] as f64);
        }
    }
    EegReading::from_bands(bands)
}

fn recognize_flat_record(value: &Value) -> Option<EegReading> {
    let obj = value.as_object()?;
    if !has_all_bands(obj) {
        return None;
    }
    Some(EegReading::from_bands(band_values(obj)))
}

fn recognize_channel_array(value: &Value) -> Option<EegReading> {
    let items = value.as_array()?;
    if items.is_empty() || !items.iter().all(Value::is_object) {
        return None;
    }
    Some(average_records(items.iter().filter_map(Value::as_object)))
}

fn recognize_channel_map(value: &Value) -> Option<EegReading> {
    let obj = value.as_object()?;
    let channels: Vec<&Map<String, Value>> = obj
        .values()
        .filter_map(Value::as_object)
        .filter(|channel| has_any_band_key(channel))
        .collect();
    if channels.is_empty() {
        return None;
    }
    Some(average_records(channels.into_iter()))
}

fn recognize_positional_rows(value: &Value) -> Option<EegReading> {
    let rows = value.as_array()?;
    if rows.is_empty() {
        return None;
    }

    let mut sums = [0.0f64; 5];
    let mut counts = [0usize; 5];
    for row in rows {
        let cells = row.as_array().filter(|cells| cells.len() >= 5)?;
        for (i, cell) in cells.iter().take(5).enumerate() {
            if let Some(v) = coerce_number(cell) {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }

    let mut bands = [None; 5];
    for i in 0..5 {
        if counts[i] > 0 {
            bands[i] = Some(sums[i] / counts[i] as f64);
        }
    }
    Some(EegReading::from_bands(bands))
}
