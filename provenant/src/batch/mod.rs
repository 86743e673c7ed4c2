//! The canonical tabular data model.
//!
//! Data moves through extraction and transformation as an opaque,
//! caller-defined payload; from the validation gate onward it is a single
//! [`RecordBatch`] of flat, typed records with a declared column order.

mod record;
mod value;

pub use record::{Record, RecordBatch};
pub use value::{ColumnType, Value};
