use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sheet::SheetId;

/// Row or column direction of a structural edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Row,
    Column,
}

/// Where `index` lands after `delta` lines are inserted (positive) or
/// removed (negative) at `at`. `None` when the index itself is removed.
pub fn shift_index(index: u32, at: u32, delta: i64) -> Option<u32> {
    if delta >= 0 {
        if index >= at {
            u32::try_from(index as i64 + delta).ok()
        } else {
            Some(index)
        }
    } else {
        let end = at as i64 - delta;
        let i = index as i64;
        if i < at as i64 {
            Some(index)
        } else if i < end {
            None
        } else {
            u32::try_from(i + delta).ok()
        }
    }
}

/// Shift an inclusive span `[lo, hi]`. Spans narrow on removal and only
/// vanish when every index in them is removed; spans straddling an
/// insertion point grow.
pub fn shift_span(lo: u32, hi: u32, at: u32, delta: i64) -> Option<(u32, u32)> {
    if delta >= 0 {
        let lo = shift_index(lo, at, delta)?;
        let hi = shift_index(hi, at, delta)?;
        return Some((lo, hi));
    }
    let count = (-delta) as u32;
    let end = at.saturating_add(count);
    if lo >= at && hi < end {
        return None;
    }
    let new_lo = if lo < at {
        lo
    } else if lo < end {
        at
    } else {
        lo - count
    };
    let new_hi = if hi < at {
        hi
    } else if hi < end {
        at - 1
    } else {
        hi - count
    };
    Some((new_lo, new_hi))
}

/// Cell coordinate (0-indexed internally). Orders row-major.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        CellCoord { row, col }
    }

    /// Create from A1 notation (e.g., "A1" -> (0, 0), "B2" -> (1, 1))
    pub fn from_a1(notation: &str) -> Option<Self> {
        let notation = notation.trim().to_uppercase();
        let mut col_str = String::new();
        let mut row_str = String::new();

        for c in notation.chars() {
            if c.is_ascii_alphabetic() {
                if !row_str.is_empty() {
                    return None; // Letters after numbers
                }
                col_str.push(c);
            } else if c.is_ascii_digit() {
                row_str.push(c);
            } else {
                return None; // Invalid character
            }
        }

        if col_str.is_empty() || row_str.is_empty() {
            return None;
        }

        let col = col_from_label(&col_str)?;
        let row: u32 = row_str.parse().ok()?;

        if row == 0 {
            return None; // Rows are 1-indexed in A1 notation
        }

        Some(CellCoord {
            row: row - 1, // Convert to 0-indexed
            col,
        })
    }

    /// Convert to A1 notation (e.g., (0, 0) -> "A1")
    pub fn to_a1(&self) -> String {
        format!("{}{}", col_to_label(self.col), self.row + 1)
    }

    /// Check if this coord is within bounds
    pub fn is_valid(&self, max_rows: u32, max_cols: u32) -> bool {
        self.row < max_rows && self.col < max_cols
    }

    pub fn index(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Row => self.row,
            Axis::Column => self.col,
        }
    }

    pub fn with_index(self, axis: Axis, index: u32) -> Self {
        match axis {
            Axis::Row => CellCoord::new(index, self.col),
            Axis::Column => CellCoord::new(self.row, index),
        }
    }

    /// Move through a structural edit; `None` if the cell was deleted
    pub fn shifted(self, axis: Axis, at: u32, delta: i64) -> Option<Self> {
        let index = shift_index(self.index(axis), at, delta)?;
        Some(self.with_index(axis, index))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// Convert column index (0-indexed) to label (A, B, ..., Z, AA, AB, ...)
pub fn col_to_label(col: u32) -> String {
    let mut label = String::new();
    let mut n = col + 1; // 1-indexed for calculation

    while n > 0 {
        n -= 1;
        label.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }

    label
}

/// Convert column label (A, B, ..., Z, AA, AB, ...) to index (0-indexed)
pub fn col_from_label(label: &str) -> Option<u32> {
    let mut col: u32 = 0;

    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }

    if col == 0 {
        None
    } else {
        Some(col - 1) // Convert to 0-indexed
    }
}

/// A range of cells (e.g., A1:B10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl CellRange {
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        // Normalize so start is top-left and end is bottom-right
        CellRange {
            start: CellCoord::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellCoord::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    /// Create from A1:B1 notation
    pub fn from_a1(notation: &str) -> Option<Self> {
        let parts: Vec<&str> = notation.split(':').collect();
        match parts.len() {
            1 => {
                let coord = CellCoord::from_a1(parts[0])?;
                Some(CellRange::new(coord, coord))
            }
            2 => {
                let start = CellCoord::from_a1(parts[0])?;
                let end = CellCoord::from_a1(parts[1])?;
                Some(CellRange::new(start, end))
            }
            _ => None,
        }
    }

    /// Convert to A1:B1 notation
    pub fn to_a1(&self) -> String {
        if self.start == self.end {
            self.start.to_a1()
        } else {
            format!("{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }

    /// Check if a coordinate is within this range
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }

    /// Get the total number of cells in the range
    pub fn cell_count(&self) -> u64 {
        let rows = u64::from(self.end.row - self.start.row) + 1;
        let cols = u64::from(self.end.col - self.start.col) + 1;
        rows.saturating_mul(cols)
    }

    /// Iterate over all coordinates in the range (row by row)
    pub fn iter(&self) -> CellRangeIter {
        CellRangeIter {
            range: *self,
            current_row: self.start.row,
            current_col: self.start.col,
        }
    }

    /// Check if this range is a single cell
    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    pub fn single(coord: CellCoord) -> Self {
        CellRange { start: coord, end: coord }
    }

    /// Move through a structural edit. The range narrows on deletion and is
    /// `None` only when all of its lines were deleted.
    pub fn shifted(&self, axis: Axis, at: u32, delta: i64) -> Option<Self> {
        let (lo, hi) = shift_span(self.start.index(axis), self.end.index(axis), at, delta)?;
        Some(CellRange {
            start: self.start.with_index(axis, lo),
            end: self.end.with_index(axis, hi),
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

impl IntoIterator for CellRange {
    type Item = CellCoord;
    type IntoIter = CellRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Globally unique address of a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub sheet: SheetId,
    pub coord: CellCoord,
}

impl CellId {
    pub fn new(sheet: SheetId, coord: CellCoord) -> Self {
        CellId { sheet, coord }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.coord)
    }
}

/// Iterator over coordinates in a range
pub struct CellRangeIter {
    range: CellRange,
    current_row: u32,
    current_col: u32,
}

impl Iterator for CellRangeIter {
    type Item = CellCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row > self.range.end.row {
            return None;
        }

        let coord = CellCoord::new(self.current_row, self.current_col);

        self.current_col += 1;
        if self.current_col > self.range.end.col {
            self.current_col = self.range.start.col;
            self.current_row += 1;
        }

        Some(coord)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.current_row > self.range.end.row {
            return (0, Some(0));
        }
        let full_rows = u64::from(self.range.end.row - self.current_row);
        let width = u64::from(self.range.end.col - self.range.start.col) + 1;
        let left = full_rows
            .saturating_mul(width)
            .saturating_add(u64::from(self.range.end.col - self.current_col) + 1);
        match usize::try_from(left) {
            Ok(left) => (left, Some(left)),
            Err(_) => (usize::MAX, None),
        }
    }
}
