//! In-memory tabular dataset.
//!
//! A [`Dataset`] is a set of equally long, named columns. Each column is
//! either numeric or text; missing cells are `None`. Analyses only ever read
//! from a dataset, so sessions hold it behind an `Arc`.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while assembling a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Columns of differing length.
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A record with a different number of fields than the header.
    #[error("row {row} has {actual} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The same column name appears twice.
    #[error("duplicate column name: '{0}'")]
    DuplicateColumn(String),
}

/// Cell storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }
}

/// Logical type of a column, as reported in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// A numeric column with no missing cells.
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            name,
            ColumnValues::Numeric(values.into_iter().map(Some).collect()),
        )
    }

    /// A text column with no missing cells.
    pub fn text<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            name,
            ColumnValues::Text(values.into_iter().map(|s| Some(s.into())).collect()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        match self.values {
            ColumnValues::Numeric(_) => ColumnKind::Numeric,
            ColumnValues::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Numeric cells, or `None` for a text column.
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(v) => Some(v),
            ColumnValues::Text(_) => None,
        }
    }

    /// Cell rendered as a grouping key. Missing cells have no key.
    ///
    /// Whole numbers print without a fractional part so that numeric
    /// identifiers group as `7`, not `7.0`.
    pub fn key_at(&self, row: usize) -> Option<String> {
        match &self.values {
            ColumnValues::Text(v) => v.get(row)?.clone(),
            ColumnValues::Numeric(v) => {
                let x = (*v.get(row)?)?;
                if x.is_nan() {
                    None
                } else if x.fract() == 0.0 && x.abs() < 1e15 {
                    Some(format!("{}", x as i64))
                } else {
                    Some(x.to_string())
                }
            }
        }
    }
}

/// Rows × named columns, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Build a dataset from columns that must all have the same length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);

        for (i, column) in columns.iter().enumerate() {
            if column.len() != row_count {
                return Err(DatasetError::RaggedColumn {
                    column: column.name.clone(),
                    expected: row_count,
                    actual: column.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self { columns, row_count })
    }

    /// Build a dataset from string records, inferring column types.
    ///
    /// A column is numeric when it has at least one non-empty cell and every
    /// non-empty cell parses as `f64`. Empty cells become missing values.
    pub fn from_records(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, DatasetError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(DatasetError::RaggedRow {
                    row: i + 1,
                    expected: headers.len(),
                    actual: row.len(),
                });
            }
        }

        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let cells: Vec<Option<&str>> = rows
                    .iter()
                    .map(|row| {
                        let cell = row[idx].trim();
                        (!cell.is_empty()).then_some(cell)
                    })
                    .collect();
                Column::new(name, infer_values(&cells))
            })
            .collect();

        Self::from_columns(columns)
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind() == ColumnKind::Numeric)
            .map(|c| c.name.clone())
            .collect()
    }
}

fn infer_values(cells: &[Option<&str>]) -> ColumnValues {
    let parsed: Vec<Option<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => s.parse::<f64>().ok().map(Some),
        })
        .collect();

    let all_numeric = parsed.iter().all(Option::is_some);
    let any_present = cells.iter().any(Option::is_some);

    if all_numeric && any_present {
        ColumnValues::Numeric(parsed.into_iter().flatten().collect())
    } else {
        ColumnValues::Text(cells.iter().map(|c| c.map(str::to_string)).collect())
    }
}
