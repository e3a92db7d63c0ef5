//! Per-client view state: the active sheet and the cursor.
//!
//! Never part of the document, never recorded, never broadcast as a
//! command. Structural edits still move the cursor so it keeps pointing at
//! the same logical cell.

use cellsync_core::{Axis, Position, SheetId, Workbook};
use cellsync_history::StructuralEffect;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    position: Position,
}

impl ViewState {
    pub fn new(sheet: SheetId) -> Self {
        Self {
            position: Position::new(sheet, 0, 0),
        }
    }

    pub fn active_sheet(&self) -> &SheetId {
        &self.position.sheet_id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn activate(&mut self, sheet: SheetId) {
        self.position = Position::new(sheet, 0, 0);
    }

    pub fn select(&mut self, col: u32, row: u32) {
        self.position.col = col;
        self.position.row = row;
    }

    /// Move by a delta, clamped to a `cols` x `rows` grid
    pub fn move_by(&mut self, delta_col: i32, delta_row: i32, cols: u32, rows: u32) {
        self.position.col = step(self.position.col, delta_col, cols);
        self.position.row = step(self.position.row, delta_row, rows);
    }

    /// Follow a shape change of the workbook
    pub fn follow(&mut self, effect: &StructuralEffect, workbook: &Workbook) {
        if let StructuralEffect::Lines(edit) = effect {
            if let Some(sheet) = workbook.sheet(&edit.sheet) {
                let count = sheet.line_count(edit.axis);
                self.position = self
                    .position
                    .shifted(&edit.sheet, edit.axis, edit.at, edit.delta, count);
            }
        }
        self.ensure_valid(workbook);
    }

    /// Fall back to the first sheet when the active one is gone, and keep
    /// the cursor inside the grid
    pub fn ensure_valid(&mut self, workbook: &Workbook) {
        match workbook.sheet(&self.position.sheet_id) {
            Some(sheet) => {
                let last_col = sheet.line_count(Axis::Column).saturating_sub(1);
                let last_row = sheet.line_count(Axis::Row).saturating_sub(1);
                self.position.col = self.position.col.min(last_col);
                self.position.row = self.position.row.min(last_row);
            }
            None => {
                if let Some(first) = workbook.first_sheet() {
                    self.activate(first.id.clone());
                }
            }
        }
    }
}

fn step(index: u32, delta: i32, count: u32) -> u32 {
    let last = count.saturating_sub(1) as i64;
    (index as i64 + delta as i64).clamp(0, last) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsync_core::Sheet;
    use cellsync_formula::StructuralEdit;

    fn sheet1() -> SheetId {
        SheetId::from("sheet1")
    }

    #[test]
    fn test_move_is_clamped() {
        let mut view = ViewState::new(sheet1());
        view.move_by(-3, 2, 26, 100);
        assert_eq!((view.position().col, view.position().row), (0, 2));

        view.select(25, 99);
        view.move_by(4, 4, 26, 100);
        assert_eq!((view.position().col, view.position().row), (25, 99));
    }

    #[test]
    fn test_follows_row_insert() {
        let mut workbook = Workbook::new("Test");
        let mut view = ViewState::new(sheet1());
        view.select(1, 5);

        workbook.sheet_mut(&sheet1()).unwrap().insert_lines(Axis::Row, 2, 3);
        let effect = StructuralEffect::Lines(StructuralEdit::insert(sheet1(), Axis::Row, 2, 3));
        view.follow(&effect, &workbook);
        assert_eq!((view.position().col, view.position().row), (1, 8));
    }

    #[test]
    fn test_deleted_active_sheet() {
        let mut workbook = Workbook::new("Test");
        workbook.insert_sheet(1, Sheet::new(SheetId::from("s2"), "Other", 10, 10));
        let mut view = ViewState::new(SheetId::from("s2"));
        view.select(4, 4);

        workbook.remove_sheet(&SheetId::from("s2")).unwrap();
        view.follow(&StructuralEffect::SheetDeleted(SheetId::from("s2")), &workbook);
        assert_eq!(view.active_sheet(), &sheet1());
        assert_eq!((view.position().col, view.position().row), (0, 0));
    }
}
