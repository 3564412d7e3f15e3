//! The summary handed back to whoever uploaded the file.

use crate::fields::Field;
use crate::mapping::{ColumnMapping, FieldMap};
use serde::Serialize;

/// A row that failed, or the whole file when `row` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub row: Option<usize>,
    pub message: String,
}

/// Outcome of one ingestion call.
///
/// `inserted + skipped == total_rows` for every file that could be read;
/// rows listed in `errors` are also counted in `skipped`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub filename: String,
    pub total_rows: usize,
    pub inserted: usize,
    pub skipped: usize,
    /// Rows that were admitted but could not be stored, including those
    /// beyond the `errors` cap.
    pub failed: usize,
    pub errors: Vec<RowIssue>,
    pub header_row: Option<usize>,
    pub column_map: FieldMap,
    pub detected_columns: Vec<String>,
    pub mapped_columns: Vec<String>,
    pub unmapped_columns: Vec<String>,
    pub mapping_success: String,
}

impl IngestionReport {
    /// Report for a file that could not be processed at all.
    pub fn failure(filename: &str, message: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            errors: vec![RowIssue {
                row: None,
                message: message.into(),
            }],
            mapping_success: mapping_success(0, Field::ALL.len()),
            ..Default::default()
        }
    }

    /// True when nothing was stored because of a file-level failure.
    pub fn is_failure(&self) -> bool {
        self.inserted == 0 && self.errors.iter().any(|e| e.row.is_none())
    }

    /// Some rows stored, some rejected with an itemized reason.
    pub fn has_warnings(&self) -> bool {
        self.inserted > 0 && !self.errors.is_empty()
    }
}

/// `"mapped/total (pct%)"`.
pub fn mapping_success(mapped: usize, total: usize) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        mapped as f64 * 100.0 / total as f64
    };
    format!("{}/{} ({:.1}%)", mapped, total, pct)
}

/// Accumulates row outcomes while a sheet is processed.
#[derive(Debug)]
pub struct ReportBuilder {
    report: IngestionReport,
    max_errors: usize,
}

impl ReportBuilder {
    pub fn new(filename: &str, max_errors: usize) -> Self {
        Self {
            report: IngestionReport {
                filename: filename.to_string(),
                mapping_success: mapping_success(0, Field::ALL.len()),
                ..Default::default()
            },
            max_errors,
        }
    }

    pub fn header(&mut self, header_row: usize, headers: &[String], mapping: &ColumnMapping) {
        let mapped = mapping.fields.mapped_count();
        self.report.header_row = Some(header_row);
        self.report.detected_columns = headers.to_vec();
        self.report.mapped_columns = mapping
            .fields
            .iter()
            .filter_map(|(_, header)| header.map(str::to_string))
            .collect();
        self.report.unmapped_columns = mapping.unmapped.clone();
        self.report.column_map = mapping.fields.clone();
        self.report.mapping_success = mapping_success(mapped, Field::ALL.len());
    }

    pub fn total_rows(&mut self, total: usize) {
        self.report.total_rows = total;
    }

    pub fn skip(&mut self, count: usize) {
        self.report.skipped += count;
    }

    /// Counts a failed row as skipped and keeps its reason while under the
    /// cap.
    pub fn fail(&mut self, row: usize, message: impl Into<String>) {
        self.report.skipped += 1;
        self.report.failed += 1;
        if self.report.errors.len() < self.max_errors {
            self.report.errors.push(RowIssue {
                row: Some(row),
                message: message.into(),
            });
        }
    }

    pub fn inserted(&mut self, count: usize) {
        self.report.inserted += count;
    }

    pub fn finish(self) -> IngestionReport {
        self.report
    }
}
