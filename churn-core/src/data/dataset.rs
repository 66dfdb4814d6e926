//! In-memory columnar table shared by both pipelines.

use crate::data::schema::{ColumnSchema, ColumnStats, ColumnType, SchemaDefinition};
use crate::error::ChurnError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Values of one column. Every variant is nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Utf8(v) => v.len(),
            Self::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Int64(_) => ColumnType::Integer,
            Self::Float64(_) => ColumnType::Float,
            Self::Utf8(_) => ColumnType::String,
            Self::Date(_) => ColumnType::Date,
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Self::Int64(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Float64(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Utf8(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Date(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Numeric value at `row` as f64; `None` for nulls and non-numeric columns.
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Int64(v) => v.get(row).copied().flatten().map(|x| x as f64),
            Self::Float64(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    /// Mean of the present values of a numeric column.
    pub fn mean(&self) -> Option<f64> {
        let present: Vec<f64> = (0..self.len()).filter_map(|i| self.f64_at(i)).collect();
        if present.is_empty() {
            return None;
        }
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }

    fn extend(&mut self, other: ColumnData) -> Result<(), ChurnError> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.extend(b),
            (Self::Float64(a), Self::Float64(b)) => a.extend(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.extend(b),
            (Self::Date(a), Self::Date(b)) => a.extend(b),
            (a, b) => {
                return Err(ChurnError::schema(format!(
                    "cannot append {} values to a {} column",
                    b.column_type(),
                    a.column_type()
                )));
            }
        }
        Ok(())
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn schema(&self) -> ColumnSchema {
        ColumnSchema {
            name: self.name.clone(),
            dtype: self.data.column_type(),
            nullable: self.data.null_count() > 0,
        }
    }
}

/// An ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, checking name uniqueness and equal column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, ChurnError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ChurnError::schema(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != rows) {
                return Err(ChurnError::schema(format!(
                    "column '{}' has {} rows, expected {rows}",
                    bad.name,
                    bad.data.len()
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[AccountRecord]) -> Self {
        let columns = vec![
            Column::new(
                "account_id",
                ColumnData::Int64(records.iter().map(|r| Some(r.account_id)).collect()),
            ),
            Column::new(
                "age",
                ColumnData::Int64(records.iter().map(|r| r.age).collect()),
            ),
            Column::new(
                "gender",
                ColumnData::Utf8(records.iter().map(|r| r.gender.clone()).collect()),
            ),
            Column::new(
                "balance",
                ColumnData::Float64(records.iter().map(|r| r.balance).collect()),
            ),
            Column::new(
                "transactions_last_month",
                ColumnData::Int64(records.iter().map(|r| r.transactions_last_month).collect()),
            ),
            Column::new(
                "account_created_at",
                ColumnData::Date(records.iter().map(|r| r.account_created_at).collect()),
            ),
            Column::new(
                "will_churn",
                ColumnData::Int64(records.iter().map(|r| Some(r.will_churn)).collect()),
            ),
        ];
        Self { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`Dataset::column`], but a missing column is a schema error.
    pub fn require_column(&self, name: &str) -> Result<&Column, ChurnError> {
        self.column(name)
            .ok_or_else(|| ChurnError::schema(format!("expected column '{name}' is absent")))
    }

    /// Replace the values of an existing column, keeping its position.
    pub fn replace_column(&mut self, name: &str, data: ColumnData) -> Result<(), ChurnError> {
        let rows = self.row_count();
        if data.len() != rows {
            return Err(ChurnError::schema(format!(
                "replacement for '{name}' has {} rows, expected {rows}",
                data.len()
            )));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ChurnError::schema(format!("expected column '{name}' is absent")))?;
        column.data = data;
        Ok(())
    }

    /// Append a new column at the end.
    pub fn push_column(&mut self, column: Column) -> Result<(), ChurnError> {
        if self.column(&column.name).is_some() {
            return Err(ChurnError::schema(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
        if !self.columns.is_empty() && column.data.len() != self.row_count() {
            return Err(ChurnError::schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.data.len(),
                self.row_count()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove a column; returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        self.columns.len() < before
    }

    pub fn schema(&self) -> SchemaDefinition {
        SchemaDefinition {
            columns: self.columns.iter().map(Column::schema).collect(),
        }
    }

    pub fn null_count(&self) -> usize {
        self.columns.iter().map(|c| c.data.null_count()).sum()
    }

    pub fn describe(&self) -> Vec<ColumnStats> {
        self.columns
            .iter()
            .map(|c| ColumnStats {
                name: c.name.clone(),
                dtype: c.data.column_type(),
                null_count: c.data.null_count(),
                mean: c.data.mean(),
            })
            .collect()
    }

    /// Whether the non-null values of an integer or string column are unique.
    pub fn unique_ids(&self, name: &str) -> Result<bool, ChurnError> {
        let column = self.require_column(name)?;
        let unique = match &column.data {
            ColumnData::Int64(v) => {
                let mut seen = HashSet::new();
                v.iter().flatten().all(|id| seen.insert(*id))
            }
            ColumnData::Utf8(v) => {
                let mut seen = HashSet::new();
                v.iter().flatten().all(|id| seen.insert(id.as_str()))
            }
            other => {
                return Err(ChurnError::schema(format!(
                    "identifier column '{name}' has type {}",
                    other.column_type()
                )));
            }
        };
        Ok(unique)
    }

    /// Concatenate datasets row-wise, in the given order.
    ///
    /// All parts must share column names and types in the same order.
    pub fn concat(parts: Vec<Dataset>) -> Result<Dataset, ChurnError> {
        let mut parts = parts.into_iter();
        let Some(mut acc) = parts.next() else {
            return Ok(Dataset::empty());
        };
        let schema = acc.schema();
        for (i, part) in parts.enumerate() {
            let part_schema = part.schema();
            if !schema.is_compatible(&part_schema) {
                return Err(ChurnError::schema(format!(
                    "partition {} has schema {part_schema}, expected {schema}",
                    i + 1
                )));
            }
            for (target, column) in acc.columns.iter_mut().zip(part.columns) {
                target.data.extend(column.data)?;
            }
        }
        Ok(acc)
    }
}

/// One account, as produced by upstream systems before preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: i64,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub balance: Option<f64>,
    pub transactions_last_month: Option<i64>,
    pub account_created_at: Option<NaiveDate>,
    pub will_churn: i64,
}

/// The five reference accounts used when no upstream data is configured.
pub fn reference_records() -> Vec<AccountRecord> {
    let rows: [(i64, i64, &str, f64, i64, (i32, u32, u32), i64); 5] = [
        (1, 25, "M", 1000.0, 5, (2021, 1, 1), 0),
        (2, 34, "F", 1500.5, 12, (2020, 6, 15), 1),
        (3, 45, "M", 1200.75, 8, (2019, 11, 20), 0),
        (4, 23, "F", 1100.0, 15, (2021, 3, 10), 1),
        (5, 35, "M", 1300.0, 10, (2020, 12, 5), 0),
    ];
    rows.iter()
        .map(|&(id, age, gender, balance, tx, (y, m, d), churn)| AccountRecord {
            account_id: id,
            age: Some(age),
            gender: Some(gender.to_string()),
            balance: Some(balance),
            transactions_last_month: Some(tx),
            account_created_at: NaiveDate::from_ymd_opt(y, m, d),
            will_churn: churn,
        })
        .collect()
}
