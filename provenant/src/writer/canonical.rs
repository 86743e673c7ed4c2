//! Canonical value rendering.
//!
//! Every value is rendered through one deterministic normalization before it
//! is serialized or hashed: strings trimmed with internal whitespace runs
//! collapsed, floats at a fixed precision, timestamps in one UTC format,
//! nulls as one fixed sentinel across the whole file.

use crate::batch::Value;
use crate::config::WriterConfig;

/// The single timestamp rendering used across all artifacts.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Renders a value canonically under the writer settings.
#[must_use]
pub fn canonical_value(value: &Value, config: &WriterConfig) -> String {
    match value {
        Value::Str(s) => normalize_string(s),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format_float(*f, config.float_precision),
        // Non-finite floats carry no usable magnitude; they render as null.
        Value::Float(_) | Value::Null => config.null_sentinel.clone(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Timestamp(t) => t.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Trims and collapses internal whitespace runs to single spaces.
///
/// This also guarantees canonical strings carry no tabs or newlines, keeping
/// the tab-separated dataset unambiguous.
#[must_use]
pub fn normalize_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

/// Renders a finite float at fixed precision. Negative zero collapses to
/// zero so equal magnitudes always render identically.
#[must_use]
pub fn format_float(value: f64, precision: usize) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.precision$}")
}
