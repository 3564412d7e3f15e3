//! Forward fill of vertically merged cells.
//!
//! Paper forms and merged Excel cells write a municipality or producer once
//! for a block of samples; the rows below it are left blank.

use crate::normalize::is_missing;
use crate::sheet::Cell;

/// Replaces every missing cell with the nearest non-missing cell above it.
/// Cells before the first value stay as they are.
pub fn fill_down(column: &mut [Cell]) {
    let mut last: Option<Cell> = None;
    for cell in column.iter_mut() {
        if is_missing(cell) {
            if let Some(value) = &last {
                *cell = value.clone();
            }
        } else {
            last = Some(cell.clone());
        }
    }
}

/// Applies [`fill_down`] to column `col` of a row-major grid. Short rows are
/// padded so the filled value has somewhere to go.
pub fn fill_down_rows(rows: &mut [Vec<Cell>], col: usize) {
    let mut column: Vec<Cell> = rows
        .iter()
        .map(|row| row.get(col).cloned().unwrap_or(Cell::Empty))
        .collect();
    fill_down(&mut column);

    for (row, cell) in rows.iter_mut().zip(column) {
        if row.len() <= col {
            row.resize(col + 1, Cell::Empty);
        }
        row[col] = cell;
    }
}
