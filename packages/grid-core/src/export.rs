//! Export formats, download file naming, and flat row rendering.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::column::ColumnSet;
use crate::query::Row;

/// File formats offered by the export endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Csv, ExportFormat::Pdf];

    /// File extension, also used as the `format` query parameter.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Download name for an export: `{table}_export_{YYYY-MM-DD}.{ext}`.
#[must_use]
pub fn export_file_name(table_name: &str, format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "{table_name}_export_{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Flattens `rows` into export strings for the `visible` columns.
///
/// The first row holds the column labels. Unknown keys are skipped.
#[must_use]
pub fn flatten_rows(columns: &ColumnSet, visible: &[String], rows: &[Row]) -> Vec<Vec<String>> {
    let cols = columns.resolve(visible);
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(cols.iter().map(|c| c.label.clone()).collect());
    for row in rows {
        out.push(cols.iter().map(|c| c.export_cell(row)).collect());
    }
    out
}
