use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cell::Cell;
use crate::range::{shift_index, Axis, CellCoord, CellRange};

/// Default row height in pixels
pub const DEFAULT_ROW_SIZE: f64 = 26.0;
/// Default column width in pixels
pub const DEFAULT_COL_SIZE: f64 = 96.0;
pub const DEFAULT_ROWS: u32 = 100;
pub const DEFAULT_COLS: u32 = 26;

/// Stable sheet identifier, independent of the sheet's display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn new(id: impl Into<String>) -> Self {
        SheetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SheetId {
    fn from(id: &str) -> Self {
        SheetId(id.to_string())
    }
}

/// Cells and sizes taken out by [`Sheet::remove_lines`], enough to put them back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovedLines {
    pub count: u32,
    pub cells: Vec<(CellCoord, Cell)>,
    pub sizes: Vec<(u32, f64)>,
}

/// A single sheet: a bounded grid with sparse, ordered cell storage
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    rows: u32,
    cols: u32,
    cells: BTreeMap<CellCoord, Cell>,
    row_sizes: BTreeMap<u32, f64>,
    col_sizes: BTreeMap<u32, f64>,
}

impl Sheet {
    pub fn new(id: SheetId, name: impl Into<String>, rows: u32, cols: u32) -> Self {
        Sheet {
            id,
            name: name.into(),
            rows,
            cols,
            cells: BTreeMap::new(),
            row_sizes: BTreeMap::new(),
            col_sizes: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn line_count(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Row => self.rows,
            Axis::Column => self.cols,
        }
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.is_valid(self.rows, self.cols)
    }

    pub fn contains_range(&self, range: &CellRange) -> bool {
        self.contains(range.start) && self.contains(range.end)
    }

    pub fn get_cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.cells.get(&coord)
    }

    /// Store `cell` (or clear the slot with `None`), returning the previous cell.
    /// Blank cells are not kept.
    pub fn set_cell(&mut self, coord: CellCoord, cell: Option<Cell>) -> Option<Cell> {
        match cell {
            Some(cell) if !cell.is_blank() => self.cells.insert(coord, cell),
            _ => self.cells.remove(&coord),
        }
    }

    /// All stored cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (&CellCoord, &Cell)> {
        self.cells.iter()
    }

    pub fn cells_in_range(&self, range: &CellRange) -> Vec<(CellCoord, &Cell)> {
        let last_row = range.end.row.min(self.rows.saturating_sub(1));
        let mut found = Vec::new();
        for row in range.start.row..=last_row {
            let from = CellCoord::new(row, range.start.col);
            let to = CellCoord::new(row, range.end.col);
            found.extend(self.cells.range(from..=to).map(|(c, cell)| (*c, cell)));
        }
        found
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn sizes(&self, axis: Axis) -> &BTreeMap<u32, f64> {
        match axis {
            Axis::Row => &self.row_sizes,
            Axis::Column => &self.col_sizes,
        }
    }

    fn sizes_mut(&mut self, axis: Axis) -> &mut BTreeMap<u32, f64> {
        match axis {
            Axis::Row => &mut self.row_sizes,
            Axis::Column => &mut self.col_sizes,
        }
    }

    fn default_size(axis: Axis) -> f64 {
        match axis {
            Axis::Row => DEFAULT_ROW_SIZE,
            Axis::Column => DEFAULT_COL_SIZE,
        }
    }

    pub fn size(&self, axis: Axis, index: u32) -> f64 {
        self.sizes(axis)
            .get(&index)
            .copied()
            .unwrap_or_else(|| Self::default_size(axis))
    }

    /// Custom size of a row or column, `None` when it uses the default
    pub fn custom_size(&self, axis: Axis, index: u32) -> Option<f64> {
        self.sizes(axis).get(&index).copied()
    }

    /// Set or reset a row/column size, returning the previous custom size
    pub fn set_size(&mut self, axis: Axis, index: u32, size: Option<f64>) -> Option<f64> {
        match size {
            Some(size) if (size - Self::default_size(axis)).abs() >= 0.01 => {
                self.sizes_mut(axis).insert(index, size)
            }
            _ => self.sizes_mut(axis).remove(&index),
        }
    }

    pub fn custom_sizes(&self, axis: Axis) -> impl Iterator<Item = (&u32, &f64)> {
        self.sizes(axis).iter()
    }

    fn shift(&mut self, axis: Axis, at: u32, delta: i64) {
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|(coord, cell)| coord.shifted(axis, at, delta).map(|c| (c, cell)))
            .collect();

        let sizes = std::mem::take(self.sizes_mut(axis));
        *self.sizes_mut(axis) = sizes
            .into_iter()
            .filter_map(|(i, size)| shift_index(i, at, delta).map(|i| (i, size)))
            .collect();
    }

    fn adjust_count(&mut self, axis: Axis, delta: i64) {
        let count = match axis {
            Axis::Row => &mut self.rows,
            Axis::Column => &mut self.cols,
        };
        *count = (*count as i64 + delta).max(0) as u32;
    }

    /// Insert `count` empty rows/columns before `at`
    pub fn insert_lines(&mut self, axis: Axis, at: u32, count: u32) {
        self.shift(axis, at, count as i64);
        self.adjust_count(axis, count as i64);
    }

    /// Delete `count` rows/columns starting at `at`
    pub fn remove_lines(&mut self, axis: Axis, at: u32, count: u32) -> RemovedLines {
        let end = at.saturating_add(count);
        let in_band = |i: u32| i >= at && i < end;

        let cells = self
            .cells
            .iter()
            .filter(|(coord, _)| in_band(coord.index(axis)))
            .map(|(coord, cell)| (*coord, cell.clone()))
            .collect();
        let sizes = self
            .sizes(axis)
            .iter()
            .filter(|(i, _)| in_band(**i))
            .map(|(i, size)| (*i, *size))
            .collect();

        self.shift(axis, at, -(count as i64));
        self.adjust_count(axis, -(count as i64));
        RemovedLines { count, cells, sizes }
    }

    /// Undo a [`Sheet::remove_lines`]
    pub fn restore_lines(&mut self, axis: Axis, at: u32, removed: RemovedLines) {
        self.insert_lines(axis, at, removed.count);
        for (coord, cell) in removed.cells {
            self.cells.insert(coord, cell);
        }
        for (index, size) in removed.sizes {
            self.sizes_mut(axis).insert(index, size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellContent;

    fn text(s: &str) -> Cell {
        Cell {
            raw: s.to_string(),
            content: CellContent::Text(s.to_string()),
            style: None,
        }
    }

    fn sheet() -> Sheet {
        Sheet::new(SheetId::from("s1"), "Sheet1", DEFAULT_ROWS, DEFAULT_COLS)
    }

    #[test]
    fn test_sheet_basic_operations() {
        let mut sheet = sheet();
        let coord = CellCoord::new(0, 0);

        assert_eq!(sheet.set_cell(coord, Some(text("a"))), None);
        assert_eq!(sheet.get_cell(coord), Some(&text("a")));

        let previous = sheet.set_cell(coord, None);
        assert_eq!(previous, Some(text("a")));
        assert!(sheet.get_cell(coord).is_none());

        sheet.set_cell(coord, Some(Cell::default()));
        assert_eq!(sheet.cell_count(), 0);
    }

    #[test]
    fn test_sizes() {
        let mut sheet = sheet();
        assert_eq!(sheet.size(Axis::Column, 0), DEFAULT_COL_SIZE);

        assert_eq!(sheet.set_size(Axis::Column, 1, Some(200.0)), None);
        assert_eq!(sheet.size(Axis::Column, 1), 200.0);
        assert_eq!(sheet.size(Axis::Column, 2), DEFAULT_COL_SIZE);

        assert_eq!(sheet.set_size(Axis::Column, 1, Some(DEFAULT_COL_SIZE)), Some(200.0));
        assert_eq!(sheet.custom_size(Axis::Column, 1), None);
    }

    #[test]
    fn test_cells_in_range() {
        let mut sheet = sheet();
        sheet.set_cell(CellCoord::new(0, 0), Some(text("a")));
        sheet.set_cell(CellCoord::new(1, 1), Some(text("b")));
        sheet.set_cell(CellCoord::new(5, 0), Some(text("c")));

        let range = CellRange::from_a1("A1:B2").unwrap();
        let found: Vec<_> = sheet.cells_in_range(&range).into_iter().map(|(c, _)| c).collect();
        assert_eq!(found, vec![CellCoord::new(0, 0), CellCoord::new(1, 1)]);
    }

    #[test]
    fn test_insert_lines_moves_cells() {
        let mut sheet = sheet();
        sheet.set_cell(CellCoord::new(0, 0), Some(text("a")));
        sheet.set_cell(CellCoord::new(2, 0), Some(text("b")));
        sheet.set_size(Axis::Row, 2, Some(40.0));

        sheet.insert_lines(Axis::Row, 1, 3);

        assert_eq!(sheet.rows(), DEFAULT_ROWS + 3);
        assert_eq!(sheet.get_cell(CellCoord::new(0, 0)), Some(&text("a")));
        assert_eq!(sheet.get_cell(CellCoord::new(5, 0)), Some(&text("b")));
        assert_eq!(sheet.custom_size(Axis::Row, 5), Some(40.0));
    }

    #[test]
    fn test_remove_and_restore_lines() {
        let mut sheet = sheet();
        sheet.set_cell(CellCoord::new(0, 0), Some(text("a")));
        sheet.set_cell(CellCoord::new(0, 1), Some(text("b")));
        sheet.set_cell(CellCoord::new(0, 3), Some(text("c")));
        sheet.set_size(Axis::Column, 1, Some(10.0));
        let before = sheet.clone();

        let removed = sheet.remove_lines(Axis::Column, 1, 2);
        assert_eq!(sheet.cols(), DEFAULT_COLS - 2);
        assert_eq!(removed.cells.len(), 1);
        assert_eq!(sheet.get_cell(CellCoord::new(0, 1)), Some(&text("c")));
        assert_eq!(sheet.custom_size(Axis::Column, 1), None);

        sheet.restore_lines(Axis::Column, 1, removed);
        assert_eq!(sheet, before);
    }
}
