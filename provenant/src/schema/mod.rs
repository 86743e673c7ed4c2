//! Schema declarations and the validation gate.
//!
//! A batch enters the gate as whatever the transformer produced and leaves it
//! as a canonical batch: exactly the declared columns, in the declared order,
//! with values coerced to their declared types where the schema allows.

mod definition;
mod gate;
mod issues;

pub use definition::{ColumnSpec, Schema, SchemaRegistry, SemVer};
pub use gate::{check_version_drift, validate, GateOutcome};
pub use issues::{Severity, ValidationIssue};
