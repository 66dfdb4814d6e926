//! Schema description for datasets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Date,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Date => "date",
        };
        f.write_str(name)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Schema definition for a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Same column names and types in the same order; nullability is ignored.
    pub fn is_compatible(&self, other: &SchemaDefinition) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.dtype == b.dtype)
    }
}

impl fmt::Display for SchemaDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}: {}", c.name, c.dtype))
            .collect();
        write!(f, "[{}]", cols.join(", "))
    }
}

/// Statistics for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub dtype: ColumnType,
    pub null_count: usize,
    pub mean: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, dtype: ColumnType, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.into(),
            dtype,
            nullable,
        }
    }

    #[test]
    fn test_compatibility_ignores_nullability() {
        let a = SchemaDefinition {
            columns: vec![col("age", ColumnType::Float, true)],
        };
        let b = SchemaDefinition {
            columns: vec![col("age", ColumnType::Float, false)],
        };
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn test_compatibility_checks_types_and_order() {
        let a = SchemaDefinition {
            columns: vec![
                col("a", ColumnType::Integer, false),
                col("b", ColumnType::String, false),
            ],
        };
        let swapped = SchemaDefinition {
            columns: vec![
                col("b", ColumnType::String, false),
                col("a", ColumnType::Integer, false),
            ],
        };
        let retyped = SchemaDefinition {
            columns: vec![
                col("a", ColumnType::Float, false),
                col("b", ColumnType::String, false),
            ],
        };
        assert!(!a.is_compatible(&swapped));
        assert!(!a.is_compatible(&retyped));
    }

    #[test]
    fn test_schema_display() {
        let schema = SchemaDefinition {
            columns: vec![col("gender", ColumnType::Integer, false)],
        };
        assert_eq!(schema.to_string(), "[gender: integer]");
    }
}
