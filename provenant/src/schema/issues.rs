//! Validation issue reporting.

use serde::{Deserialize, Serialize};

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fatal under fail-fast; recorded under fail-open.
    Error,
    /// Never fatal; recorded and surfaced.
    Warning,
}

/// One schema or business-rule violation found during a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// How serious the violation is.
    pub severity: Severity,
    /// The column the check applies to.
    pub column: String,
    /// The check that failed, e.g. `missing_column` or `not_null`.
    pub check_name: String,
    /// How many rows failed the check.
    pub failing_row_count: usize,
}

impl ValidationIssue {
    /// Creates an error-severity issue.
    #[must_use]
    pub fn error(
        column: impl Into<String>,
        check_name: impl Into<String>,
        failing_row_count: usize,
    ) -> Self {
        Self {
            severity: Severity::Error,
            column: column.into(),
            check_name: check_name.into(),
            failing_row_count,
        }
    }

    /// Creates a warning-severity issue.
    #[must_use]
    pub fn warning(
        column: impl Into<String>,
        check_name: impl Into<String>,
        failing_row_count: usize,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            column: column.into(),
            check_name: check_name.into(),
            failing_row_count,
        }
    }

    /// Returns true for error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] column '{}' failed '{}' on {} row(s)",
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            },
            self.column,
            self.check_name,
            self.failing_row_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_and_display() {
        let issue = ValidationIssue::error("accession", "missing_column", 30);
        assert!(issue.is_error());
        assert!(issue.to_string().contains("missing_column"));

        let issue = ValidationIssue::warning("gene", "schema_version", 0);
        assert!(!issue.is_error());
    }
}
