//! Heuristic column discovery.
//!
//! Uploaded datasets have unpredictable headers, so each analysis finds its
//! working columns by case-insensitive substring match against a short list
//! of fragments. Columns are scanned in dataset order; the first hit wins.

use crate::data::{Column, Dataset};

/// The logical role a column plays in an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Marks whether a record is a failure (0/1).
    Indicator,
    /// Machine or product identifier.
    Entity,
    /// Product type or category.
    Category,
    /// Failure mode / defect label.
    FailureType,
}

impl ColumnRole {
    pub fn fragments(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Indicator => &["target", "failure"],
            ColumnRole::Entity => &["product", "machine"],
            ColumnRole::Category => &["type", "category"],
            ColumnRole::FailureType => &["failure_type", "failure_mode", "defect"],
        }
    }

    /// Human-readable name used in "not found" markers.
    pub fn label(self) -> &'static str {
        match self {
            ColumnRole::Indicator => "target/failure",
            ColumnRole::Entity => "product/machine",
            ColumnRole::Category => "type/category",
            ColumnRole::FailureType => "failure type",
        }
    }
}

/// Find the first column whose lowercased name contains any fragment.
pub fn find_column_matching<'a>(dataset: &'a Dataset, fragments: &[&str]) -> Option<&'a Column> {
    dataset.columns().iter().find(|col| {
        let lower = col.name().to_lowercase();
        fragments.iter().any(|f| lower.contains(f))
    })
}

/// Find the column playing `role`.
pub fn find_column(dataset: &Dataset, role: ColumnRole) -> Option<&Column> {
    find_column_matching(dataset, role.fragments())
}
