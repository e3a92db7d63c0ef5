use serde::{Deserialize, Serialize};
use std::fmt;

use crate::range::{shift_index, Axis, CellCoord};
use crate::sheet::SheetId;

/// Identifier of one collaborating client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        ClientId(id.into())
    }

    /// A fresh random id for a client that has none yet
    pub fn random() -> Self {
        ClientId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        ClientId(id.to_string())
    }
}

/// A client's cursor: which cell of which sheet it is on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub sheet_id: SheetId,
    pub col: u32,
    pub row: u32,
}

impl Position {
    pub fn new(sheet_id: SheetId, col: u32, row: u32) -> Self {
        Position { sheet_id, col, row }
    }

    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.row, self.col)
    }

    /// Follow a structural edit on `sheet`. A cursor inside a deleted band
    /// lands on the first line after it; `line_count` is the post-edit size.
    pub fn shifted(&self, sheet: &SheetId, axis: Axis, at: u32, delta: i64, line_count: u32) -> Position {
        if &self.sheet_id != sheet {
            return self.clone();
        }
        let last = line_count.saturating_sub(1);
        let current = self.coord().index(axis);
        let index = shift_index(current, at, delta).unwrap_or(at).min(last);
        let coord = self.coord().with_index(axis, index);
        Position::new(self.sheet_id.clone(), coord.col, coord.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(ClientId::random(), ClientId::random());
    }

    #[test]
    fn test_position_follows_insert() {
        let sheet = SheetId::from("s1");
        let pos = Position::new(sheet.clone(), 1, 0);
        let moved = pos.shifted(&sheet, Axis::Column, 1, 2, 28);
        assert_eq!((moved.col, moved.row), (3, 0));

        let other = SheetId::from("s2");
        assert_eq!(pos.shifted(&other, Axis::Column, 0, 5, 31), pos);
    }

    #[test]
    fn test_position_in_deleted_band() {
        let sheet = SheetId::from("s1");
        let pos = Position::new(sheet.clone(), 0, 4);
        let moved = pos.shifted(&sheet, Axis::Row, 3, -3, 97);
        assert_eq!(moved.row, 3);

        let last = Position::new(sheet.clone(), 0, 9);
        assert_eq!(last.shifted(&sheet, Axis::Row, 8, -2, 8).row, 7);
    }
}
