//! Schema declarations and the in-memory registry.

use crate::batch::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// A semantic version: `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemVer {
    /// Breaking-change counter.
    pub major: u64,
    /// Feature counter.
    pub minor: u64,
    /// Fix counter.
    pub patch: u64,
}

impl SemVer {
    /// Creates a version.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if moving from `previous` to `self` is a breaking
    /// (major) increment.
    #[must_use]
    pub fn is_breaking_from(&self, previous: &Self) -> bool {
        self.major != previous.major
    }
}

impl std::fmt::Display for SemVer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let parse = |part: Option<&str>, name: &str| -> Result<u64, String> {
            part.ok_or_else(|| format!("missing {name} component in '{s}'"))?
                .parse::<u64>()
                .map_err(|_| format!("non-numeric {name} component in '{s}'"))
        };
        let major = parse(parts.next(), "major")?;
        let minor = parse(parts.next(), "minor")?;
        let patch = match parts.next() {
            Some(p) => p
                .parse::<u64>()
                .map_err(|_| format!("non-numeric patch component in '{s}'"))?,
            None => 0,
        };
        Ok(Self::new(major, minor, patch))
    }
}

/// Declaration of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether nulls are allowed.
    pub nullable: bool,
    /// Whether representable values of other types may be coerced, e.g.
    /// numeric strings to numbers.
    pub coerce: bool,
}

impl ColumnSpec {
    /// A required (non-nullable) column without coercion.
    #[must_use]
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            coerce: false,
        }
    }

    /// Marks the column nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allows type coercion for this column.
    #[must_use]
    pub fn coercible(mut self) -> Self {
        self.coerce = true;
        self
    }
}

/// A declared, versioned schema: ordered columns plus a uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema identifier.
    pub id: String,
    /// Semantic version of this schema declaration.
    pub version: SemVer,
    /// Columns in their declared, fixed order.
    pub columns: Vec<ColumnSpec>,
    /// Columns forming the uniqueness constraint, typically the business key.
    pub unique_key: Vec<String>,
}

impl Schema {
    /// Creates a schema with no columns yet.
    #[must_use]
    pub fn new(id: impl Into<String>, version: SemVer) -> Self {
        Self {
            id: id.into(),
            version,
            columns: Vec::new(),
            unique_key: Vec::new(),
        }
    }

    /// Appends a column declaration.
    #[must_use]
    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    /// Declares the uniqueness key.
    #[must_use]
    pub fn unique_key(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.unique_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up a column declaration by name.
    #[must_use]
    pub fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The declared column names, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// In-memory schema registry, populated by the embedder before runs start.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under its identifier, replacing any previous
    /// declaration.
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.id.clone(), schema);
    }

    /// Looks up a schema by identifier.
    #[must_use]
    pub fn get(&self, schema_id: &str) -> Option<&Schema> {
        self.schemas.get(schema_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn semver_parses_and_displays() {
        let v: SemVer = "2.1.0".parse().unwrap();
        assert_eq!(v, SemVer::new(2, 1, 0));
        assert_eq!(v.to_string(), "2.1.0");

        let v: SemVer = "3.4".parse().unwrap();
        assert_eq!(v.patch, 0);

        assert!("".parse::<SemVer>().is_err());
        assert!("2.x.0".parse::<SemVer>().is_err());
    }

    #[test]
    fn breaking_change_is_major_only() {
        let old = SemVer::new(2, 1, 0);
        assert!(SemVer::new(3, 0, 0).is_breaking_from(&old));
        assert!(!SemVer::new(2, 9, 7).is_breaking_from(&old));
    }

    #[test]
    fn schema_builder_and_lookup() {
        let schema = Schema::new("proteins", SemVer::new(2, 1, 0))
            .column(ColumnSpec::required("accession", ColumnType::Str))
            .column(ColumnSpec::required("taxon", ColumnType::Int).coercible())
            .column(ColumnSpec::required("gene", ColumnType::Str).nullable())
            .unique_key(["accession"]);

        assert_eq!(schema.column_names(), vec!["accession", "taxon", "gene"]);
        assert!(schema.column_spec("taxon").unwrap().coerce);
        assert!(schema.column_spec("gene").unwrap().nullable);
        assert!(schema.column_spec("absent").is_none());
    }

    #[test]
    fn registry_registers_and_replaces() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::new("proteins", SemVer::new(1, 0, 0)));
        registry.register(Schema::new("proteins", SemVer::new(1, 1, 0)));

        assert_eq!(registry.get("proteins").unwrap().version, SemVer::new(1, 1, 0));
        assert!(registry.get("genes").is_none());
    }
}
