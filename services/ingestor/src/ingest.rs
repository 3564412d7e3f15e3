//! Turning an uploaded lab spreadsheet into pending analysis records.
//!
//! Pipeline per file: read the grid, locate the header row, name the
//! columns, drop empty rows, map headers to fields, fill down the key
//! columns, then normalize and admit each row. Admitted rows are stored in
//! one batch; everything else is counted in the report.

use crate::config::IngestSettings;
use crate::fields::{FieldKind, KEY_FIELDS};
use crate::fill::fill_down_rows;
use crate::header::locate_header;
use crate::mapping::{map_columns_with, ColumnMapping};
use crate::normalize::{cell_text, is_missing, normalize_number, normalize_text};
use crate::record::{AnalysisValues, PendingRecord, RowError};
use crate::report::{IngestionReport, ReportBuilder};
use crate::sheet::{read_sheet, Cell, RawSheet};
use crate::store::{AnalysisStore, MunicipalityIndex};
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What became of one data row.
#[derive(Debug)]
pub enum RowOutcome {
    Admitted(PendingRecord),
    /// Nothing worth keeping in the row.
    Skipped,
    Failed(RowError),
}

/// A sheet with its header located and its data rows cleaned up, ready
/// for materialization.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub header_row: usize,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    /// Data rows kept after dropping blank ones, key columns filled down.
    pub rows: Vec<Vec<Cell>>,
    /// 1-based sheet row number of each entry in `rows`.
    pub row_numbers: Vec<usize>,
    /// All rows below the header, including dropped ones.
    pub total_rows: usize,
    pub dropped: usize,
}

/// Runs uploads through the pipeline against a store.
pub struct Ingestor<'a> {
    store: &'a dyn AnalysisStore,
    settings: IngestSettings,
    municipalities: MunicipalityIndex,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn AnalysisStore) -> Self {
        Self {
            store,
            settings: IngestSettings::default(),
            municipalities: MunicipalityIndex::default(),
        }
    }

    pub fn with_settings(mut self, settings: IngestSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Index used to attach `municipio_id` to records.
    pub fn with_municipalities(mut self, municipalities: MunicipalityIndex) -> Self {
        self.municipalities = municipalities;
        self
    }

    /// Ingests one file. Never fails: a file that cannot be read or stored
    /// yields an all-zero report carrying one general error.
    pub async fn process(&self, bytes: &[u8], filename: &str, owner: Uuid) -> IngestionReport {
        match self.try_process(bytes, filename, owner).await {
            Ok(report) => report,
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(file = %filename, error = %message, "ingestion failed");
                IngestionReport::failure(filename, message)
            }
        }
    }

    async fn try_process(&self, bytes: &[u8], filename: &str, owner: Uuid) -> Result<IngestionReport> {
        let sheet = read_sheet(bytes).with_context(|| format!("Failed to read {}", filename))?;
        let parsed = parse_sheet(&sheet, &self.settings);

        let mut report = ReportBuilder::new(filename, self.settings.max_errors);
        report.header(parsed.header_row, &parsed.headers, &parsed.mapping);
        report.total_rows(parsed.total_rows);
        report.skip(parsed.dropped);

        let mut batch = Vec::new();
        for (cells, &number) in parsed.rows.iter().zip(&parsed.row_numbers) {
            match materialize_row(cells, &parsed.mapping, owner, filename, &self.municipalities) {
                RowOutcome::Admitted(record) => batch.push(record),
                RowOutcome::Skipped => report.skip(1),
                RowOutcome::Failed(err) => {
                    warn!(row = number, error = %err, "row rejected");
                    report.fail(number, err.to_string());
                }
            }
        }

        // No commit at all when nothing was admitted.
        if !batch.is_empty() {
            self.store
                .insert_pending(&batch)
                .await
                .context("Failed to store pending records")?;
            report.inserted(batch.len());
        }

        let report = report.finish();
        info!(
            file = %filename,
            total = report.total_rows,
            inserted = report.inserted,
            skipped = report.skipped,
            failed = report.failed,
            mapping = %report.mapping_success,
            "ingestion finished"
        );
        Ok(report)
    }
}

/// Locates the header, names the columns and prepares the data rows.
pub fn parse_sheet(sheet: &RawSheet, settings: &IngestSettings) -> ParsedSheet {
    let candidate = locate_header(&sheet.rows, settings.header_scan_rows, settings.early_exit_score);
    debug!(row = candidate.row, score = candidate.score, "header row located");

    let header_cells = sheet.rows.get(candidate.row).map(Vec::as_slice).unwrap_or(&[]);
    let headers = column_names(header_cells, sheet.width());

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    let mut total_rows = 0;
    let mut dropped = 0;
    for (idx, row) in sheet.rows.iter().enumerate().skip(candidate.row + 1) {
        total_rows += 1;
        if row.iter().all(is_missing) {
            dropped += 1;
            continue;
        }
        rows.push(row.clone());
        row_numbers.push(idx + 1);
    }

    let mapping = map_columns_with(&headers, settings.mapping);
    for field in KEY_FIELDS {
        if let Some(col) = mapping.column(field) {
            fill_down_rows(&mut rows, col);
        }
    }

    ParsedSheet {
        header_row: candidate.row,
        headers,
        mapping,
        rows,
        row_numbers,
        total_rows,
        dropped,
    }
}

/// Column names from the header row, padded to `width`. Blank cells become
/// `Unnamed: <col>`; repeated names get `.1`, `.2`, ... suffixes.
pub fn column_names(header: &[Cell], width: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(width);
    for col in 0..width.max(header.len()) {
        // Taken as written: "Na" is sodium here, not a missing value.
        let base = header
            .get(col)
            .and_then(cell_text)
            .unwrap_or_else(|| format!("Unnamed: {}", col));
        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.clone()) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        names.push(name);
    }
    names
}

/// Normalizes one data row and decides whether it becomes a record.
pub fn materialize_row(
    cells: &[Cell],
    mapping: &ColumnMapping,
    owner: Uuid,
    filename: &str,
    municipalities: &MunicipalityIndex,
) -> RowOutcome {
    let mut values = AnalysisValues::default();
    for (&field, &col) in &mapping.columns {
        let Some(cell) = cells.get(col) else {
            continue;
        };
        match field.kind() {
            FieldKind::Text => {
                if let Some(slot) = values.text_slot(field) {
                    *slot = normalize_text(cell);
                }
            }
            FieldKind::Number => {
                if let Some(slot) = values.number_slot(field) {
                    *slot = normalize_number(cell);
                }
            }
        }
    }

    if !values.is_significant() {
        return RowOutcome::Skipped;
    }

    let municipio_id = values
        .municipio
        .as_deref()
        .and_then(|name| municipalities.lookup(name));
    match PendingRecord::new(values, owner, filename, municipio_id) {
        Ok(record) => RowOutcome::Admitted(record),
        Err(err) => RowOutcome::Failed(err),
    }
}
