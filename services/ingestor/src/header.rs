//! Locating the header row of a loosely structured sheet.
//!
//! Lab reports often open with a title block (lab name, dates, sample
//! batch) before the real column titles. Each cell of the first rows is
//! scored against known header vocabulary; the best row wins.

use crate::fields::{EXACT_HEADERS, HEADER_KEYWORDS};
use crate::normalize::{cell_text, normalize_header};
use crate::sheet::Cell;

/// Rows examined when looking for the header.
pub const DEFAULT_SCAN_ROWS: usize = 50;

/// A row scoring this much is taken without looking further.
pub const EARLY_EXIT_SCORE: u32 = 8;

const EXACT_BONUS: u32 = 2;

/// A row index with its keyword score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderCandidate {
    pub row: usize,
    pub score: u32,
}

/// Keyword score of a single cell. Text is scored as written, so cells
/// spelled like missing-value sentinels still count.
pub fn score_cell(cell: &Cell) -> u32 {
    let Some(text) = cell_text(cell) else {
        return 0;
    };
    let normalized = normalize_header(&text);
    if normalized.is_empty() {
        return 0;
    }

    let partial = HEADER_KEYWORDS
        .iter()
        .filter(|kw| normalized.contains(*kw))
        .count() as u32;
    let exact = if EXACT_HEADERS.contains(&normalized.as_str()) {
        EXACT_BONUS
    } else {
        0
    };
    partial + exact
}

pub fn score_row(row: &[Cell]) -> u32 {
    row.iter().map(score_cell).sum()
}

/// Best header candidate among the first `scan_rows` rows.
///
/// Ties keep the earliest row. Returns row 0 with score 0 when nothing
/// looks like a header.
pub fn locate_header(rows: &[Vec<Cell>], scan_rows: usize, early_exit: u32) -> HeaderCandidate {
    let mut best = HeaderCandidate::default();
    for (idx, row) in rows.iter().take(scan_rows).enumerate() {
        let score = score_row(row);
        if score > best.score {
            best = HeaderCandidate { row: idx, score };
        }
        if score >= early_exit {
            return HeaderCandidate { row: idx, score };
        }
    }
    best
}

/// Index of the row most likely to hold the column titles.
pub fn find_header_row(rows: &[Vec<Cell>]) -> usize {
    locate_header(rows, DEFAULT_SCAN_ROWS, EARLY_EXIT_SCORE).row
}
