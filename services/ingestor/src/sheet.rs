//! Reading uploaded bytes into a headerless grid of cells.
//!
//! Workbooks (xlsx, xlsm, xlsb, xls, ods) go through calamine and only the
//! first worksheet is read. Anything else is treated as delimited text.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const DELIMITER_CANDIDATES: [u8; 3] = [b',', b';', b'\t'];

/// An untyped spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(value) if !dt.is_duration() => Cell::Text(format_datetime(value)),
                _ => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            // Error cells keep their display form ("#N/A"), which the
            // normalizer treats as a missing value.
            other => Cell::Text(other.to_string()),
        }
    }
}

/// `YYYY-MM-DD`, with the time only when it is not midnight.
fn format_datetime(value: NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Rows of cells exactly as found in the file, no header assumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Widest row length.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("file is empty")]
    Empty,
    #[error("workbook has no sheets")]
    NoSheets,
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("failed to read delimited text: {0}")]
    Csv(#[from] csv::Error),
}

/// Parses raw upload bytes into a [`RawSheet`].
pub fn read_sheet(bytes: &[u8]) -> Result<RawSheet, SheetError> {
    if bytes.is_empty() {
        return Err(SheetError::Empty);
    }
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        read_workbook(bytes)
    } else {
        read_delimited(bytes)
    }
}

fn read_workbook(bytes: &[u8]) -> Result<RawSheet, SheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names.first().ok_or(SheetError::NoSheets)?.clone();
    let range = workbook.worksheet_range(&sheet_name)?;

    let (row_count, col_count) = range.get_size();
    debug!(
        sheet = %sheet_name,
        sheets = sheet_names.len(),
        rows = row_count,
        cols = col_count,
        "reading worksheet"
    );

    // calamine trims the used range; pad so indices match the sheet.
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(Cell::from));
        rows.push(cells);
    }

    Ok(RawSheet::new(sheet_name, rows))
}

fn read_delimited(bytes: &[u8]) -> Result<RawSheet, SheetError> {
    let content = decode_text(bytes);
    let delimiter = detect_delimiter(&content);
    debug!(delimiter = %(delimiter as char).escape_default(), "reading delimited text");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::from).collect());
    }

    Ok(RawSheet::new("csv", rows))
}

/// UTF-8 (BOM stripped) when valid, Windows-1252 otherwise; Excel on
/// Spanish-locale Windows exports CSV in that code page.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Picks the delimiter that appears most often and most consistently over
/// the first non-empty lines.
fn detect_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0.0f32;
    for delimiter in DELIMITER_CANDIDATES {
        let counts: Vec<f32> = sample
            .iter()
            .map(|line| line.bytes().filter(|b| *b == delimiter).count() as f32)
            .collect();
        let avg = counts.iter().sum::<f32>() / counts.len() as f32;
        let variance = counts.iter().map(|c| (c - avg).powi(2)).sum::<f32>() / counts.len() as f32;
        let score = avg / (1.0 + variance.sqrt());
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes_fail() {
        assert!(matches!(read_sheet(b""), Err(SheetError::Empty)));
    }

    #[test]
    fn test_csv_is_headerless_grid() {
        let sheet = read_sheet(b"Reporte,,\nMunicipio,pH,MO\nOaxaca,6.5,2.1\n").unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0][0], Cell::Text("Reporte".to_string()));
        assert_eq!(sheet.rows[0][1], Cell::Empty);
        assert_eq!(sheet.rows[2][1], Cell::Text("6.5".to_string()));
        assert_eq!(sheet.width(), 3);
    }

    #[test]
    fn test_csv_semicolon_with_decimal_commas() {
        let sheet = read_sheet(b"Municipio;pH;MO\nOaxaca;6,5;2,1\nEtla;7,1;1,8\n").unwrap();
        assert_eq!(sheet.rows[1].len(), 3);
        assert_eq!(sheet.rows[1][1], Cell::Text("6,5".to_string()));
    }

    #[test]
    fn test_csv_bom_is_stripped() {
        let sheet = read_sheet(b"\xEF\xBB\xBFMunicipio,pH\nOaxaca,6\n").unwrap();
        assert_eq!(sheet.rows[0][0], Cell::Text("Municipio".to_string()));
    }

    #[test]
    fn test_csv_windows_1252_fallback() {
        // "Fósforo" with ó encoded as 0xF3
        let sheet = read_sheet(b"F\xF3sforo,pH\n12,6\n").unwrap();
        assert_eq!(sheet.rows[0][0], Cell::Text("Fósforo".to_string()));
    }

    #[test]
    fn test_csv_ragged_rows() {
        let sheet = read_sheet(b"a,b,c\nx\n").unwrap();
        assert_eq!(sheet.rows[1].len(), 1);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn test_garbage_workbook_fails() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"not really a zip archive");
        assert!(matches!(read_sheet(&bytes), Err(SheetError::Workbook(_))));
    }

    #[test]
    fn test_xlsx_rows_are_absolute() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(2, 1, "Municipio").unwrap();
        worksheet.write_string(2, 2, "pH").unwrap();
        worksheet.write_string(3, 1, "Oaxaca").unwrap();
        worksheet.write_number(3, 2, 6.5).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = read_sheet(&bytes).unwrap();
        assert_eq!(sheet.rows.len(), 4);
        assert!(sheet.rows[0].is_empty());
        assert_eq!(sheet.rows[2][1], Cell::Text("Municipio".to_string()));
        assert_eq!(sheet.rows[3][0], Cell::Empty);
        assert_eq!(sheet.rows[3][2], Cell::Number(6.5));
    }

    #[test]
    fn test_xlsx_dates_read_as_iso_text() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
        let stamp_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd hh:mm");
        worksheet.write_string(0, 0, "Fecha de muestreo").unwrap();
        worksheet
            .write_datetime_with_format(
                1,
                0,
                &rust_xlsxwriter::ExcelDateTime::from_ymd(2024, 3, 15).unwrap(),
                &date_format,
            )
            .unwrap();
        worksheet
            .write_datetime_with_format(
                2,
                0,
                &rust_xlsxwriter::ExcelDateTime::parse_from_str("2024-03-15 12:00:00").unwrap(),
                &stamp_format,
            )
            .unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = read_sheet(&bytes).unwrap();
        assert_eq!(sheet.rows[1][0], Cell::Text("2024-03-15".to_string()));
        assert_eq!(sheet.rows[2][0], Cell::Text("2024-03-15 12:00:00".to_string()));
    }

    #[test]
    fn test_iso_date_strings_pass_through() {
        let cell = Cell::from(&Data::DateTimeIso("2024-03-15T00:00:00".to_string()));
        assert_eq!(cell, Cell::Text("2024-03-15T00:00:00".to_string()));
        let cell = Cell::from(&Data::DurationIso("PT1H".to_string()));
        assert_eq!(cell, Cell::Text("PT1H".to_string()));
    }
}
