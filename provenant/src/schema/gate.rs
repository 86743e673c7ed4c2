//! The validation gate.

use super::{ColumnSpec, Schema, SemVer, ValidationIssue};
use crate::batch::{ColumnType, Record, RecordBatch, Value};
use crate::config::{FailOpenOutput, ValidationMode};
use crate::errors::{ConfigError, CoreError, Result, ValidationFailure};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Result of a validation pass.
#[derive(Debug)]
pub struct GateOutcome {
    /// The canonical batch: declared columns only, declared order, coerced
    /// values. Under fail-open this is the full batch or the valid subset,
    /// per configuration.
    pub batch: RecordBatch,
    /// Every issue found, errors and warnings.
    pub issues: Vec<ValidationIssue>,
    /// False if any error-severity issue was found. Recorded in artifact
    /// metadata when fail-open lets the batch proceed.
    pub schema_valid: bool,
}

/// Rejects a schema whose version has drifted from the last-known version by
/// a breaking (major) increment.
///
/// Runs before any data is processed and independently of validation mode.
pub fn check_version_drift(schema: &Schema, last_known: &str) -> Result<()> {
    let pinned: SemVer = last_known.parse().map_err(|reason| {
        CoreError::Config(ConfigError::Invalid {
            field: "schema.last_known_version".to_string(),
            reason,
        })
    })?;
    if schema.version.is_breaking_from(&pinned) {
        return Err(CoreError::Config(ConfigError::SchemaDrift {
            schema_id: schema.id.clone(),
            last_known: pinned.to_string(),
            declared: schema.version.to_string(),
        }));
    }
    Ok(())
}

/// Validates a batch against a schema.
///
/// Under fail-fast, any error-severity issue aborts with all issues attached
/// to the returned error for diagnostics. Under fail-open, issues are
/// surfaced in the outcome and the batch proceeds.
pub fn validate(
    batch: &RecordBatch,
    schema: &Schema,
    mode: ValidationMode,
    fail_open_output: FailOpenOutput,
) -> Result<GateOutcome> {
    let mut issues = Vec::new();
    let row_count = batch.len();

    // Column presence. Per-row checks are skipped for columns reported
    // missing, so each absent column yields exactly one issue.
    let declared: HashSet<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    let present: HashSet<&str> = batch.columns.iter().map(String::as_str).collect();

    let mut missing: HashSet<&str> = HashSet::new();
    for spec in &schema.columns {
        if !present.contains(spec.name.as_str()) {
            missing.insert(spec.name.as_str());
            issues.push(ValidationIssue::error(
                &spec.name,
                "missing_column",
                row_count,
            ));
        }
    }
    for column in &batch.columns {
        if !declared.contains(column.as_str()) {
            issues.push(ValidationIssue::error(column, "extra_column", row_count));
        }
    }

    // Producer-declared version differing from the registry declaration is
    // surfaced, but it is not a data defect.
    if batch.schema_version != schema.version.to_string() {
        issues.push(ValidationIssue::warning(
            "schema_version",
            "declared_version_mismatch",
            0,
        ));
    }

    // Per-row type, coercion and nullability checks.
    let mut row_valid = vec![true; row_count];
    let mut coerced_rows: Vec<Record> = Vec::with_capacity(row_count);
    let mut type_failures: HashMap<&str, usize> = HashMap::new();
    let mut null_failures: HashMap<&str, usize> = HashMap::new();

    for (i, row) in batch.rows.iter().enumerate() {
        let mut out = Record::new();
        for spec in &schema.columns {
            if missing.contains(spec.name.as_str()) {
                if !spec.nullable {
                    row_valid[i] = false;
                }
                out.set(spec.name.clone(), Value::Null);
                continue;
            }
            match coerce(row.get_or_null(&spec.name), spec) {
                Ok(Value::Null) if !spec.nullable => {
                    *null_failures.entry(spec.name.as_str()).or_default() += 1;
                    row_valid[i] = false;
                    out.set(spec.name.clone(), Value::Null);
                }
                Ok(value) => out.set(spec.name.clone(), value),
                Err(original) => {
                    *type_failures.entry(spec.name.as_str()).or_default() += 1;
                    row_valid[i] = false;
                    out.set(spec.name.clone(), original);
                }
            }
        }
        coerced_rows.push(out);
    }

    for spec in &schema.columns {
        if let Some(&count) = type_failures.get(spec.name.as_str()) {
            issues.push(ValidationIssue::error(&spec.name, "type_conformance", count));
        }
        if let Some(&count) = null_failures.get(spec.name.as_str()) {
            issues.push(ValidationIssue::error(&spec.name, "not_null", count));
        }
    }

    // Uniqueness over the declared key: later duplicates fail the check.
    if !schema.unique_key.is_empty() {
        let mut seen: HashSet<String> = HashSet::with_capacity(row_count);
        let mut duplicates = 0usize;
        for (i, row) in coerced_rows.iter().enumerate() {
            let key = unique_key_of(row, &schema.unique_key);
            if !seen.insert(key) {
                duplicates += 1;
                row_valid[i] = false;
            }
        }
        if duplicates > 0 {
            issues.push(ValidationIssue::error(
                schema.unique_key.join("+"),
                "unique",
                duplicates,
            ));
        }
    }

    let schema_valid = !issues.iter().any(ValidationIssue::is_error);

    if mode == ValidationMode::FailFast && !schema_valid {
        return Err(CoreError::Validation(ValidationFailure::new(
            &schema.id, issues,
        )));
    }

    let rows = match (mode, fail_open_output) {
        (ValidationMode::FailOpen, FailOpenOutput::ValidSubset) if !schema_valid => coerced_rows
            .into_iter()
            .zip(row_valid)
            .filter_map(|(row, valid)| valid.then_some(row))
            .collect(),
        _ => coerced_rows,
    };

    let mut out = RecordBatch::new(
        &schema.id,
        schema.version.to_string(),
        schema.column_names(),
    );
    out.rows = rows;

    Ok(GateOutcome {
        batch: out,
        issues,
        schema_valid,
    })
}

/// Coerces a value to the declared column type.
///
/// Returns the original value as the error payload when it cannot conform.
fn coerce(value: &Value, spec: &ColumnSpec) -> std::result::Result<Value, Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.column_type() == Some(spec.column_type) {
        return Ok(value.clone());
    }
    if !spec.coerce {
        return Err(value.clone());
    }

    match (value, spec.column_type) {
        (Value::Str(s), ColumnType::Int) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| value.clone()),
        (Value::Str(s), ColumnType::Float) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| value.clone()),
        (Value::Str(s), ColumnType::Bool) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(value.clone()),
        },
        (Value::Str(s), ColumnType::Timestamp) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
            .map_err(|_| value.clone()),
        (Value::Int(i), ColumnType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Int(i), ColumnType::Str) => Ok(Value::Str(i.to_string())),
        _ => Err(value.clone()),
    }
}

fn unique_key_of(row: &Record, key_columns: &[String]) -> String {
    let mut key = String::new();
    for column in key_columns {
        match row.get_or_null(column) {
            Value::Str(s) => key.push_str(s),
            Value::Int(i) => key.push_str(&i.to_string()),
            Value::Float(f) => key.push_str(&f.to_string()),
            Value::Bool(b) => key.push_str(if *b { "true" } else { "false" }),
            Value::Timestamp(t) => key.push_str(&t.to_rfc3339()),
            Value::Null => key.push('\u{0}'),
        }
        key.push('\u{1f}');
    }
    key
}
