use cellsync_core::{
    shift_index, Axis, Cell, CellCoord, CellFormat, RemovedLines, Sheet, SheetId, StyleId, Workbook,
    WorkbookError,
};
use cellsync_formula::{shift_formula, SheetResolver, StructuralEdit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the state-update primitive
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("sheet not found: {0}")]
    SheetNotFound(SheetId),

    #[error("{coord} is outside sheet {sheet}")]
    OutOfBounds { sheet: SheetId, coord: CellCoord },

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// One primitive mutation of a workbook. Applying a change returns the
/// change that undoes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Store a cell, or clear it with `None`
    SetCell {
        sheet: SheetId,
        coord: CellCoord,
        cell: Option<Cell>,
    },
    InsertLines {
        sheet: SheetId,
        axis: Axis,
        at: u32,
        count: u32,
    },
    RemoveLines {
        sheet: SheetId,
        axis: Axis,
        at: u32,
        count: u32,
    },
    /// Put back lines taken out by a `RemoveLines`
    RestoreLines {
        sheet: SheetId,
        axis: Axis,
        at: u32,
        lines: RemovedLines,
    },
    SetLineSize {
        sheet: SheetId,
        axis: Axis,
        index: u32,
        size: Option<f64>,
    },
    SetStyleEntry {
        id: StyleId,
        format: Option<CellFormat>,
    },
    CreateSheet {
        index: usize,
        sheet: Sheet,
    },
    DeleteSheet {
        sheet: SheetId,
    },
}

/// How a change reshaped the document, as seen by concurrent commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructuralEffect {
    Lines(StructuralEdit),
    SheetDeleted(SheetId),
    SheetCreated(SheetId),
}

impl StructuralEffect {
    /// This effect restated for after `change`, which was made alongside
    /// it. Lines this effect inserts at the same index as `change` stay in
    /// front. `None` when `change` already did everything this effect does.
    pub fn rebase_past(&self, change: &Change) -> Option<StructuralEffect> {
        match (self, change.effect()) {
            (StructuralEffect::Lines(edit), Some(StructuralEffect::Lines(own))) => {
                edit.rebase_ahead(&own).map(StructuralEffect::Lines)
            }
            (StructuralEffect::Lines(edit), Some(StructuralEffect::SheetDeleted(sheet))) if edit.sheet == sheet => {
                None
            }
            (StructuralEffect::SheetDeleted(a), Some(StructuralEffect::SheetDeleted(b))) if a == &b => None,
            _ => Some(self.clone()),
        }
    }

    fn cancels(&self, earlier: &StructuralEffect) -> bool {
        match (earlier, self) {
            (StructuralEffect::Lines(a), StructuralEffect::Lines(b)) => b.is_inverse_of(a),
            (StructuralEffect::SheetDeleted(a), StructuralEffect::SheetCreated(b))
            | (StructuralEffect::SheetCreated(a), StructuralEffect::SheetDeleted(b)) => a == b,
            _ => false,
        }
    }
}

impl Change {
    /// Sheet the change acts on, if any
    pub fn sheet(&self) -> Option<&SheetId> {
        match self {
            Change::SetCell { sheet, .. }
            | Change::InsertLines { sheet, .. }
            | Change::RemoveLines { sheet, .. }
            | Change::RestoreLines { sheet, .. }
            | Change::SetLineSize { sheet, .. }
            | Change::DeleteSheet { sheet } => Some(sheet),
            Change::CreateSheet { sheet, .. } => Some(&sheet.id),
            Change::SetStyleEntry { .. } => None,
        }
    }

    pub fn effect(&self) -> Option<StructuralEffect> {
        match self {
            Change::InsertLines {
                sheet,
                axis,
                at,
                count,
            } => Some(StructuralEffect::Lines(StructuralEdit::insert(
                sheet.clone(),
                *axis,
                *at,
                *count,
            ))),
            Change::RestoreLines {
                sheet,
                axis,
                at,
                lines,
            } => Some(StructuralEffect::Lines(StructuralEdit::insert(
                sheet.clone(),
                *axis,
                *at,
                lines.count,
            ))),
            Change::RemoveLines {
                sheet,
                axis,
                at,
                count,
            } => Some(StructuralEffect::Lines(StructuralEdit::delete(
                sheet.clone(),
                *axis,
                *at,
                *count,
            ))),
            Change::DeleteSheet { sheet } => Some(StructuralEffect::SheetDeleted(sheet.clone())),
            Change::CreateSheet { sheet, .. } => Some(StructuralEffect::SheetCreated(sheet.id.clone())),
            _ => None,
        }
    }

    /// Restate this change for a document that `effect` reshaped after the
    /// change was recorded. `None` when its target is gone.
    pub fn transform(&self, effect: &StructuralEffect, resolver: &dyn SheetResolver) -> Option<Change> {
        match effect {
            StructuralEffect::SheetDeleted(deleted) => match self {
                Change::CreateSheet { .. } => Some(self.clone()),
                _ if self.sheet() == Some(deleted) => None,
                _ => Some(self.clone()),
            },
            StructuralEffect::SheetCreated(_) => Some(self.clone()),
            StructuralEffect::Lines(edit) => self.shift(edit, resolver),
        }
    }

    fn shift(&self, edit: &StructuralEdit, resolver: &dyn SheetResolver) -> Option<Change> {
        let change = match self {
            Change::SetCell { sheet, coord, cell } => {
                let coord = if sheet == &edit.sheet {
                    coord.shifted(edit.axis, edit.at, edit.delta)?
                } else {
                    *coord
                };
                Change::SetCell {
                    sheet: sheet.clone(),
                    coord,
                    cell: cell.as_ref().map(|c| shift_cell(c, sheet, edit, resolver)),
                }
            }
            Change::InsertLines {
                sheet,
                axis,
                at,
                count,
            } => {
                let own = StructuralEdit::insert(sheet.clone(), *axis, *at, *count).rebase(edit)?;
                Change::InsertLines {
                    sheet: sheet.clone(),
                    axis: *axis,
                    at: own.at,
                    count: *count,
                }
            }
            Change::RemoveLines {
                sheet,
                axis,
                at,
                count,
            } => {
                let own = StructuralEdit::delete(sheet.clone(), *axis, *at, *count).rebase(edit)?;
                Change::RemoveLines {
                    sheet: sheet.clone(),
                    axis: *axis,
                    at: own.at,
                    count: own.count(),
                }
            }
            Change::RestoreLines {
                sheet,
                axis,
                at,
                lines,
            } => Change::RestoreLines {
                sheet: sheet.clone(),
                axis: *axis,
                at: StructuralEdit::insert(sheet.clone(), *axis, *at, lines.count).rebase(edit)?.at,
                lines: restore_shifted(sheet, *axis, *at, lines, edit, resolver)?,
            },
            Change::SetLineSize {
                sheet,
                axis,
                index,
                size,
            } if sheet == &edit.sheet && axis == &edit.axis => Change::SetLineSize {
                sheet: sheet.clone(),
                axis: *axis,
                index: shift_index(*index, edit.at, edit.delta)?,
                size: *size,
            },
            Change::CreateSheet { index, sheet } => {
                let mut sheet = sheet.clone();
                let moved: Vec<(CellCoord, Cell)> = sheet
                    .cells()
                    .filter(|(_, cell)| cell.is_formula())
                    .map(|(coord, cell)| (*coord, shift_cell(cell, &sheet.id, edit, resolver)))
                    .collect();
                for (coord, cell) in moved {
                    sheet.set_cell(coord, Some(cell));
                }
                Change::CreateSheet { index: *index, sheet }
            }
            other => other.clone(),
        };
        Some(change)
    }

    /// Apply to `workbook` and return the inverse change
    pub fn apply(self, workbook: &mut Workbook) -> Result<Change, ChangeError> {
        match self {
            Change::SetCell { sheet, coord, cell } => {
                let target = sheet_mut(workbook, &sheet)?;
                if !target.contains(coord) {
                    return Err(ChangeError::OutOfBounds { sheet, coord });
                }
                let previous = target.set_cell(coord, cell);
                Ok(Change::SetCell {
                    sheet,
                    coord,
                    cell: previous,
                })
            }
            Change::InsertLines {
                sheet,
                axis,
                at,
                count,
            } => {
                sheet_mut(workbook, &sheet)?.insert_lines(axis, at, count);
                Ok(Change::RemoveLines {
                    sheet,
                    axis,
                    at,
                    count,
                })
            }
            Change::RemoveLines {
                sheet,
                axis,
                at,
                count,
            } => {
                let lines = sheet_mut(workbook, &sheet)?.remove_lines(axis, at, count);
                Ok(Change::RestoreLines {
                    sheet,
                    axis,
                    at,
                    lines,
                })
            }
            Change::RestoreLines {
                sheet,
                axis,
                at,
                lines,
            } => {
                let count = lines.count;
                sheet_mut(workbook, &sheet)?.restore_lines(axis, at, lines);
                Ok(Change::RemoveLines {
                    sheet,
                    axis,
                    at,
                    count,
                })
            }
            Change::SetLineSize {
                sheet,
                axis,
                index,
                size,
            } => {
                let previous = sheet_mut(workbook, &sheet)?.set_size(axis, index, size);
                Ok(Change::SetLineSize {
                    sheet,
                    axis,
                    index,
                    size: previous,
                })
            }
            Change::SetStyleEntry { id, format } => {
                let previous = workbook.styles.set(id, format);
                Ok(Change::SetStyleEntry {
                    id,
                    format: previous,
                })
            }
            Change::CreateSheet { index, sheet } => {
                let id = sheet.id.clone();
                workbook.insert_sheet(index, sheet);
                Ok(Change::DeleteSheet { sheet: id })
            }
            Change::DeleteSheet { sheet } => {
                let (index, removed) = workbook.remove_sheet(&sheet)?;
                Ok(Change::CreateSheet {
                    index,
                    sheet: removed,
                })
            }
        }
    }
}

fn shift_cell(cell: &Cell, host: &SheetId, edit: &StructuralEdit, resolver: &dyn SheetResolver) -> Cell {
    match cell.content.formula_text().and_then(|text| shift_formula(text, host, edit, resolver)) {
        Some(text) => cell.clone().with_formula(text),
        None => cell.clone(),
    }
}

/// Lines held by a `RestoreLines` at `at`, moved for `edit`. Along the
/// restored axis they keep their offset inside the band; across it they
/// follow the edit like any other cell.
fn restore_shifted(
    sheet: &SheetId,
    axis: Axis,
    at: u32,
    lines: &RemovedLines,
    edit: &StructuralEdit,
    resolver: &dyn SheetResolver,
) -> Option<RemovedLines> {
    let own = StructuralEdit::insert(sheet.clone(), axis, at, lines.count);
    let moved_at = own.rebase(edit)?.at;
    // The edit as seen once the lines are back
    let after = edit.rebase_ahead(&own);
    let along = sheet == &edit.sheet && axis == edit.axis;

    let cells = lines
        .cells
        .iter()
        .filter_map(|(coord, cell)| {
            let coord = if along {
                coord.with_index(axis, moved_at + (coord.index(axis) - at))
            } else if sheet == &edit.sheet {
                coord.shifted(edit.axis, edit.at, edit.delta)?
            } else {
                *coord
            };
            let cell = match &after {
                Some(after) => shift_cell(cell, sheet, after, resolver),
                None => cell.clone(),
            };
            Some((coord, cell))
        })
        .collect();
    let sizes = lines
        .sizes
        .iter()
        .map(|(index, size)| {
            let index = if along { moved_at + (index - at) } else { *index };
            (index, *size)
        })
        .collect();

    Some(RemovedLines {
        count: lines.count,
        cells,
        sizes,
    })
}

/// Restate `changes`, recorded as one revision's inverse, for a document
/// that `effects` reshaped since. Each change is rewritten for the effect
/// as seen at its own place in the list. An effect undone right after it
/// happened leaves the changes alone.
pub fn rebase_changes<'a>(
    changes: Vec<Change>,
    effects: impl IntoIterator<Item = &'a StructuralEffect>,
    resolver: &dyn SheetResolver,
) -> Vec<Change> {
    let mut net: Vec<&StructuralEffect> = Vec::new();
    for effect in effects {
        match net.last() {
            Some(top) if effect.cancels(top) => {
                net.pop();
            }
            _ => net.push(effect),
        }
    }

    net.into_iter().fold(changes, |changes, effect| {
        let mut current = Some(effect.clone());
        let mut rebased = Vec::with_capacity(changes.len());
        for change in changes {
            let Some(seen) = &current else {
                rebased.push(change);
                continue;
            };
            let next = seen.rebase_past(&change);
            if let Some(change) = change.transform(seen, resolver) {
                rebased.push(change);
            }
            current = next;
        }
        rebased
    })
}

fn sheet_mut<'a>(workbook: &'a mut Workbook, id: &SheetId) -> Result<&'a mut Sheet, ChangeError> {
    workbook
        .sheet_mut(id)
        .ok_or_else(|| ChangeError::SheetNotFound(id.clone()))
}

/// Apply `changes` in order, all or nothing. The returned inverses are
/// already reversed: applying them in order restores the workbook.
pub fn apply_all(changes: Vec<Change>, workbook: &mut Workbook) -> Result<Vec<Change>, ChangeError> {
    let mut inverses = Vec::with_capacity(changes.len());
    for change in changes {
        match change.apply(workbook) {
            Ok(inverse) => inverses.push(inverse),
            Err(error) => {
                // Roll back what already went through
                for inverse in inverses.into_iter().rev() {
                    inverse.apply(workbook)?;
                }
                return Err(error);
            }
        }
    }
    inverses.reverse();
    Ok(inverses)
}
