//! Tabular data handling.
//!
//! The dataset model plus the CSV loader that produces it.

pub mod dataset;
pub mod loader;

pub use dataset::{Column, ColumnKind, ColumnValues, Dataset, DatasetError};
pub use loader::{
    get_summary_stats, load_csv_from_bytes, load_csv_from_path, validate_production_data,
    SummaryStats,
};
