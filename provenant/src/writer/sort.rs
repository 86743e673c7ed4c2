//! Stable business-key ordering.

use crate::batch::{RecordBatch, Value};
use crate::config::NullOrder;
use std::cmp::Ordering;

/// Stable-sorts a batch's rows ascending by the given columns, with nulls
/// positioned per `null_order`. Rows equal under the sort key keep their
/// producer order.
pub fn sort_batch(batch: &mut RecordBatch, sort_by: &[String], null_order: NullOrder) {
    if sort_by.is_empty() {
        return;
    }
    batch.rows.sort_by(|a, b| {
        for column in sort_by {
            let ordering = compare_values(a.get_or_null(column), b.get_or_null(column), null_order);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Total order over values of one column.
fn compare_values(a: &Value, b: &Value, null_order: NullOrder) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => match null_order {
            NullOrder::First => Ordering::Less,
            NullOrder::Last => Ordering::Greater,
        },
        (_, Value::Null) => match null_order {
            NullOrder::First => Ordering::Greater,
            NullOrder::Last => Ordering::Less,
        },
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).total_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.total_cmp(&(*y as f64)),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        // Mixed types cannot occur after the validation gate; rank them by
        // variant so the order stays total and deterministic regardless.
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Int(_) => 1,
        Value::Float(_) => 2,
        Value::Str(_) => 3,
        Value::Timestamp(_) => 4,
        Value::Null => 5,
    }
}
