//! Quality-control sidecar.

use super::canonical::canonical_value;
use crate::batch::{RecordBatch, Value};
use crate::config::WriterConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-column completeness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuality {
    /// Column name.
    pub name: String,
    /// Rows with a non-null value.
    pub non_null_rows: usize,
    /// Fraction of rows with a non-null value, rounded to six places.
    pub completeness: f64,
}

/// One pairwise correlation between numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// First column of the pair, in declared order.
    pub column_x: String,
    /// Second column of the pair.
    pub column_y: String,
    /// Pearson coefficient over rows where both are non-null, rounded to
    /// six places.
    pub pearson: f64,
}

/// Summary of a published dataset's quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Rows in the published dataset.
    pub row_count: usize,
    /// Per-column completeness, in declared column order.
    pub columns: Vec<ColumnQuality>,
    /// Rows sharing a business key with an earlier row.
    pub duplicate_key_rows: usize,
    /// Pairwise numeric correlations, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlations: Option<Vec<Correlation>>,
}

impl QualityReport {
    /// Builds the report for a batch about to be published.
    #[must_use]
    pub fn build(batch: &RecordBatch, config: &WriterConfig) -> Self {
        let row_count = batch.len();

        let columns = batch
            .columns
            .iter()
            .map(|name| {
                let non_null_rows = batch
                    .rows
                    .iter()
                    .filter(|r| !r.get_or_null(name).is_null())
                    .count();
                let completeness = if row_count == 0 {
                    1.0
                } else {
                    round6(non_null_rows as f64 / row_count as f64)
                };
                ColumnQuality {
                    name: name.clone(),
                    non_null_rows,
                    completeness,
                }
            })
            .collect();

        let duplicate_key_rows = if config.business_key.is_empty() {
            0
        } else {
            let mut seen = HashSet::with_capacity(row_count);
            batch
                .rows
                .iter()
                .filter(|row| {
                    let key: Vec<String> = config
                        .business_key
                        .iter()
                        .map(|c| canonical_value(row.get_or_null(c), config))
                        .collect();
                    !seen.insert(key.join("\u{1f}"))
                })
                .count()
        };

        let correlations = config
            .correlations
            .then(|| pairwise_correlations(batch))
            .filter(|c| !c.is_empty());

        Self {
            row_count,
            columns,
            duplicate_key_rows,
            correlations,
        }
    }

    /// Canonical JSON bytes, newline-terminated.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn pairwise_correlations(batch: &RecordBatch) -> Vec<Correlation> {
    let numeric: Vec<(&String, Vec<Option<f64>>)> = batch
        .columns
        .iter()
        .filter_map(|name| {
            let series = numeric_series(batch, name)?;
            Some((name, series))
        })
        .collect();

    let mut out = Vec::new();
    for i in 0..numeric.len() {
        for j in (i + 1)..numeric.len() {
            if let Some(pearson) = pearson(&numeric[i].1, &numeric[j].1) {
                out.push(Correlation {
                    column_x: numeric[i].0.clone(),
                    column_y: numeric[j].0.clone(),
                    pearson: round6(pearson),
                });
            }
        }
    }
    out
}

/// Extracts a column as floats; `None` if any non-null value is non-numeric.
fn numeric_series(batch: &RecordBatch, column: &str) -> Option<Vec<Option<f64>>> {
    let mut series = Vec::with_capacity(batch.len());
    let mut saw_number = false;
    for row in &batch.rows {
        match row.get_or_null(column) {
            Value::Int(i) => {
                saw_number = true;
                series.push(Some(*i as f64));
            }
            Value::Float(f) if f.is_finite() => {
                saw_number = true;
                series.push(Some(*f));
            }
            Value::Null | Value::Float(_) => series.push(None),
            _ => return None,
        }
    }
    saw_number.then_some(series)
}

fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(cov / denom)
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
