use cellsync_core::{shift_index, Axis, CellCoord, CellFormat, CellRange, SheetId, FORMULA_MARKER};
use cellsync_formula::{shift_formula, SheetResolver, StructuralEdit};
use serde::{Deserialize, Serialize};

use crate::change::StructuralEffect;

/// An immutable description of one state-changing intent.
///
/// Document commands are recorded as revisions and broadcast to peers;
/// `ActivateSheet`, `SelectCell` and `MovePosition` only touch the issuing
/// client's view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    SetCellContent {
        sheet: SheetId,
        col: u32,
        row: u32,
        content: String,
    },
    ClearCells {
        sheet: SheetId,
        range: CellRange,
    },
    SetCellStyle {
        sheet: SheetId,
        range: CellRange,
        style: Option<CellFormat>,
    },
    InsertRows {
        sheet: SheetId,
        index: u32,
        count: u32,
    },
    DeleteRows {
        sheet: SheetId,
        index: u32,
        count: u32,
    },
    InsertColumns {
        sheet: SheetId,
        index: u32,
        count: u32,
    },
    DeleteColumns {
        sheet: SheetId,
        index: u32,
        count: u32,
    },
    ResizeRows {
        sheet: SheetId,
        rows: Vec<u32>,
        size: f64,
    },
    ResizeColumns {
        sheet: SheetId,
        cols: Vec<u32>,
        size: f64,
    },
    CreateSheet {
        sheet: SheetId,
        name: String,
    },
    DeleteSheet {
        sheet: SheetId,
    },
    ActivateSheet {
        sheet: SheetId,
    },
    SelectCell {
        col: u32,
        row: u32,
    },
    MovePosition {
        delta_col: i32,
        delta_row: i32,
    },
    Undo,
    Redo,
}

impl Command {
    pub fn set_content(sheet: SheetId, coord: CellCoord, content: impl Into<String>) -> Self {
        Command::SetCellContent {
            sheet,
            col: coord.col,
            row: coord.row,
            content: content.into(),
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetCellContent { .. } => "SetCellContent",
            Command::ClearCells { .. } => "ClearCells",
            Command::SetCellStyle { .. } => "SetCellStyle",
            Command::InsertRows { .. } => "InsertRows",
            Command::DeleteRows { .. } => "DeleteRows",
            Command::InsertColumns { .. } => "InsertColumns",
            Command::DeleteColumns { .. } => "DeleteColumns",
            Command::ResizeRows { .. } => "ResizeRows",
            Command::ResizeColumns { .. } => "ResizeColumns",
            Command::CreateSheet { .. } => "CreateSheet",
            Command::DeleteSheet { .. } => "DeleteSheet",
            Command::ActivateSheet { .. } => "ActivateSheet",
            Command::SelectCell { .. } => "SelectCell",
            Command::MovePosition { .. } => "MovePosition",
            Command::Undo => "Undo",
            Command::Redo => "Redo",
        }
    }

    /// View-state commands: never recorded, never broadcast
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Command::ActivateSheet { .. } | Command::SelectCell { .. } | Command::MovePosition { .. }
        )
    }

    /// Sheet the command addresses, if any
    pub fn sheet(&self) -> Option<&SheetId> {
        match self {
            Command::SetCellContent { sheet, .. }
            | Command::ClearCells { sheet, .. }
            | Command::SetCellStyle { sheet, .. }
            | Command::InsertRows { sheet, .. }
            | Command::DeleteRows { sheet, .. }
            | Command::InsertColumns { sheet, .. }
            | Command::DeleteColumns { sheet, .. }
            | Command::ResizeRows { sheet, .. }
            | Command::ResizeColumns { sheet, .. }
            | Command::CreateSheet { sheet, .. }
            | Command::DeleteSheet { sheet }
            | Command::ActivateSheet { sheet } => Some(sheet),
            Command::SelectCell { .. }
            | Command::MovePosition { .. }
            | Command::Undo
            | Command::Redo => None,
        }
    }

    /// The row/column insert or delete this command performs
    pub fn structural_edit(&self) -> Option<StructuralEdit> {
        match self {
            Command::InsertRows { sheet, index, count } => {
                Some(StructuralEdit::insert(sheet.clone(), Axis::Row, *index, *count))
            }
            Command::DeleteRows { sheet, index, count } => {
                Some(StructuralEdit::delete(sheet.clone(), Axis::Row, *index, *count))
            }
            Command::InsertColumns { sheet, index, count } => {
                Some(StructuralEdit::insert(sheet.clone(), Axis::Column, *index, *count))
            }
            Command::DeleteColumns { sheet, index, count } => {
                Some(StructuralEdit::delete(sheet.clone(), Axis::Column, *index, *count))
            }
            _ => None,
        }
    }

    /// The insert or delete command performing `edit`
    pub fn from_edit(edit: &StructuralEdit) -> Command {
        let (sheet, index, count) = (edit.sheet.clone(), edit.at, edit.count());
        match (edit.axis, edit.is_insert()) {
            (Axis::Row, true) => Command::InsertRows { sheet, index, count },
            (Axis::Row, false) => Command::DeleteRows { sheet, index, count },
            (Axis::Column, true) => Command::InsertColumns { sheet, index, count },
            (Axis::Column, false) => Command::DeleteColumns { sheet, index, count },
        }
    }

    /// Rewrite this command so it means the same thing after `effect` was
    /// applied before it. `None` when its target no longer exists.
    pub fn transform(&self, effect: &StructuralEffect, resolver: &dyn SheetResolver) -> Option<Command> {
        match effect {
            StructuralEffect::SheetDeleted(deleted) => match self.sheet() {
                Some(sheet) if sheet == deleted => None,
                _ => Some(self.clone()),
            },
            StructuralEffect::SheetCreated(_) => Some(self.clone()),
            StructuralEffect::Lines(edit) => self.shift(edit, resolver),
        }
    }

    fn shift(&self, edit: &StructuralEdit, resolver: &dyn SheetResolver) -> Option<Command> {
        if let Command::SetCellContent {
            sheet,
            col,
            row,
            content,
        } = self
        {
            // Formula text anywhere may point into the edited sheet
            let content = shift_content(content, sheet, edit, resolver).unwrap_or_else(|| content.clone());
            let coord = CellCoord::new(*row, *col);
            let coord = if sheet == &edit.sheet {
                coord.shifted(edit.axis, edit.at, edit.delta)?
            } else {
                coord
            };
            return Some(Command::set_content(sheet.clone(), coord, content));
        }

        if self.sheet() != Some(&edit.sheet) {
            return Some(self.clone());
        }

        let command = match self {
            Command::ClearCells { sheet, range } => Command::ClearCells {
                sheet: sheet.clone(),
                range: range.shifted(edit.axis, edit.at, edit.delta)?,
            },
            Command::SetCellStyle { sheet, range, style } => Command::SetCellStyle {
                sheet: sheet.clone(),
                range: range.shifted(edit.axis, edit.at, edit.delta)?,
                style: style.clone(),
            },
            Command::InsertRows { .. }
            | Command::DeleteRows { .. }
            | Command::InsertColumns { .. }
            | Command::DeleteColumns { .. } => {
                let own = self.structural_edit()?;
                Command::from_edit(&own.rebase(edit)?)
            }
            Command::ResizeRows { sheet, rows, size } if edit.axis == Axis::Row => Command::ResizeRows {
                sheet: sheet.clone(),
                rows: shift_indices(rows, edit)?,
                size: *size,
            },
            Command::ResizeColumns { sheet, cols, size } if edit.axis == Axis::Column => {
                Command::ResizeColumns {
                    sheet: sheet.clone(),
                    cols: shift_indices(cols, edit)?,
                    size: *size,
                }
            }
            other => other.clone(),
        };
        Some(command)
    }
}

fn shift_content(
    content: &str,
    host: &SheetId,
    edit: &StructuralEdit,
    resolver: &dyn SheetResolver,
) -> Option<String> {
    let formula = content.trim().strip_prefix(FORMULA_MARKER)?;
    let shifted = shift_formula(formula, host, edit, resolver)?;
    Some(format!("{FORMULA_MARKER}{shifted}"))
}

fn shift_indices(indices: &[u32], edit: &StructuralEdit) -> Option<Vec<u32>> {
    let shifted: Vec<u32> = indices
        .iter()
        .filter_map(|i| shift_index(*i, edit.at, edit.delta))
        .collect();
    (!shifted.is_empty()).then_some(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sheets;

    impl SheetResolver for Sheets {
        fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
            match name {
                "Sheet1" => Some(SheetId::from("s1")),
                "Sheet2" => Some(SheetId::from("s2")),
                _ => None,
            }
        }
    }

    fn s1() -> SheetId {
        SheetId::from("s1")
    }

    fn rows(at: u32, delta: i64) -> StructuralEffect {
        StructuralEffect::Lines(StructuralEdit {
            sheet: s1(),
            axis: Axis::Row,
            at,
            delta,
        })
    }

    fn set(sheet: &str, a1: &str, content: &str) -> Command {
        Command::set_content(SheetId::from(sheet), CellCoord::from_a1(a1).unwrap(), content)
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(&set("s1", "B3", "=A1")).unwrap();
        assert_eq!(json["type"], "SetCellContent");
        assert_eq!(json["col"], 1);
        assert_eq!(json["row"], 2);

        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, set("s1", "B3", "=A1"));

        let undo: Command = serde_json::from_str(r#"{"type":"Undo"}"#).unwrap();
        assert_eq!(undo, Command::Undo);
    }

    #[test]
    fn test_local_commands() {
        assert!(Command::SelectCell { col: 0, row: 0 }.is_local());
        assert!(Command::ActivateSheet { sheet: s1() }.is_local());
        assert!(!Command::Undo.is_local());
        assert!(!set("s1", "A1", "1").is_local());
    }

    #[test]
    fn test_set_content_follows_insert() {
        let moved = set("s1", "A5", "=A4+A1").transform(&rows(2, 3), &Sheets);
        assert_eq!(moved, Some(set("s1", "A8", "=A7+A1")));

        // Before the edit point nothing moves
        let same = set("s1", "A2", "x").transform(&rows(2, 3), &Sheets);
        assert_eq!(same, Some(set("s1", "A2", "x")));
    }

    #[test]
    fn test_set_content_on_deleted_row_is_dropped() {
        assert_eq!(set("s1", "A3", "9").transform(&rows(2, -1), &Sheets), None);
    }

    #[test]
    fn test_formula_on_other_sheet_is_rewritten() {
        let moved = set("s2", "A1", "=Sheet1!B5*2").transform(&rows(0, 1), &Sheets);
        assert_eq!(moved, Some(set("s2", "A1", "=Sheet1!B6*2")));
    }

    #[test]
    fn test_structural_against_structural() {
        let insert = Command::InsertRows {
            sheet: s1(),
            index: 5,
            count: 1,
        };
        assert_eq!(
            insert.transform(&rows(5, 2), &Sheets),
            Some(Command::InsertRows {
                sheet: s1(),
                index: 7,
                count: 1
            })
        );
        // Inserting inside a band someone else deleted lands at its start
        assert_eq!(
            insert.transform(&rows(4, -3), &Sheets),
            Some(Command::InsertRows {
                sheet: s1(),
                index: 4,
                count: 1
            })
        );

        let delete = Command::DeleteRows {
            sheet: s1(),
            index: 2,
            count: 3,
        };
        assert_eq!(
            delete.transform(&rows(3, -1), &Sheets),
            Some(Command::DeleteRows {
                sheet: s1(),
                index: 2,
                count: 2
            })
        );
        assert_eq!(delete.transform(&rows(1, -5), &Sheets), None);

        // Columns ignore row edits
        let cols = Command::DeleteColumns {
            sheet: s1(),
            index: 2,
            count: 1,
        };
        assert_eq!(cols.transform(&rows(0, 4), &Sheets), Some(cols.clone()));
    }

    #[test]
    fn test_ranges_and_resizes() {
        let clear = Command::ClearCells {
            sheet: s1(),
            range: CellRange::from_a1("A2:B4").unwrap(),
        };
        assert_eq!(
            clear.transform(&rows(0, -2), &Sheets),
            Some(Command::ClearCells {
                sheet: s1(),
                range: CellRange::from_a1("A1:B2").unwrap()
            })
        );

        let resize = Command::ResizeRows {
            sheet: s1(),
            rows: vec![1, 2, 6],
            size: 30.0,
        };
        assert_eq!(
            resize.transform(&rows(2, -1), &Sheets),
            Some(Command::ResizeRows {
                sheet: s1(),
                rows: vec![1, 5],
                size: 30.0
            })
        );
        let gone = Command::ResizeRows {
            sheet: s1(),
            rows: vec![2],
            size: 30.0,
        };
        assert_eq!(gone.transform(&rows(2, -1), &Sheets), None);
    }

    #[test]
    fn test_deleted_sheet_drops_commands() {
        let effect = StructuralEffect::SheetDeleted(s1());
        assert_eq!(set("s1", "A1", "1").transform(&effect, &Sheets), None);
        assert_eq!(
            set("s2", "A1", "1").transform(&effect, &Sheets),
            Some(set("s2", "A1", "1"))
        );
        assert_eq!(Command::Undo.transform(&effect, &Sheets), Some(Command::Undo));
    }
}
