use std::collections::BTreeSet;

use cellsync_core::{
    Axis, Cell, CellCoord, CellId, CellValue, ClientId, NumberSniffer, Position, Sheet, SheetId,
    Workbook, WorkbookError, WorkbookSnapshot,
};
use cellsync_formula::{shift_formula, FunctionRegistry, StructuralEdit};
use cellsync_history::{
    apply_all, rebase_changes, Change, Command, Revision, RevisionId, RevisionKind, RevisionLog,
    StructuralEffect,
};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::document::{DocumentState, Journal};
use crate::error::EngineError;
use crate::result::{CancelReason, CommandResult};
use crate::view::ViewState;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Fired after every state transition, one per command
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Revision recorded for the command, if it was a document command
    pub revision: Option<RevisionId>,
    pub command: &'static str,
    /// Cells whose content or value may have changed
    pub changed: Vec<CellId>,
}

/// A client's spreadsheet: document state, revision log and view state.
///
/// Commands go through [`SpreadsheetEngine::allow_dispatch`] and only
/// mutate state when it succeeds. Every document command appends one
/// revision holding the inverse records of what it did.
pub struct SpreadsheetEngine {
    client: ClientId,
    config: EngineConfig,
    sniffer: NumberSniffer,
    registry: FunctionRegistry,
    state: DocumentState,
    log: RevisionLog,
    view: ViewState,
    updates: broadcast::Sender<Update>,
}

impl SpreadsheetEngine {
    /// Create an engine with a fresh workbook and default configuration
    pub fn new(client: ClientId) -> Result<Self, EngineError> {
        Self::with_config(client, EngineConfig::default())
    }

    pub fn with_config(client: ClientId, config: EngineConfig) -> Result<Self, EngineError> {
        let workbook = Workbook::with_size(config.workbook_name.clone(), config.rows, config.cols);
        Self::with_workbook(client, config, workbook)
    }

    /// Start from a snapshot; formulas and values are derived from scratch
    pub fn from_snapshot(
        client: ClientId,
        config: EngineConfig,
        snapshot: &WorkbookSnapshot,
    ) -> Result<Self, EngineError> {
        let sniffer = NumberSniffer::new(config.number_policy.clone())?;
        let workbook = Workbook::from_snapshot(snapshot, &sniffer)?;
        Self::with_workbook(client, config, workbook)
    }

    pub fn from_json(client: ClientId, config: EngineConfig, json: &str) -> Result<Self, EngineError> {
        let snapshot: WorkbookSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(client, config, &snapshot)
    }

    fn with_workbook(client: ClientId, config: EngineConfig, workbook: Workbook) -> Result<Self, EngineError> {
        let sniffer = NumberSniffer::new(config.number_policy.clone())?;
        let first = workbook.first_sheet().ok_or(WorkbookError::NoSheets)?.id.clone();
        let registry = FunctionRegistry::with_builtins();
        let state = DocumentState::new(workbook, &registry);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            config,
            sniffer,
            registry,
            state,
            log: RevisionLog::new(),
            view: ViewState::new(first),
            updates,
        })
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn workbook(&self) -> &Workbook {
        self.state.workbook()
    }

    pub fn log(&self) -> &RevisionLog {
        &self.log
    }

    pub fn last_revision(&self) -> Option<RevisionId> {
        self.log.last_id()
    }

    pub fn active_sheet(&self) -> &SheetId {
        self.view.active_sheet()
    }

    pub fn position(&self) -> &Position {
        self.view.position()
    }

    /// Register an extra function for formulas compiled from now on
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Receive an [`Update`] after each state transition
    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }

    /// A `CreateSheet` command with a fresh id every replica will agree on
    pub fn new_sheet_command(&self, name: impl Into<String>) -> Command {
        Command::CreateSheet {
            sheet: SheetId::new(Uuid::new_v4().to_string()),
            name: name.into(),
        }
    }

    // --- Queries ---

    pub fn get_cell_value(&self, sheet: &SheetId, coord: CellCoord) -> CellValue {
        self.state.value(sheet, coord)
    }

    pub fn get_cell_display_text(&self, sheet: &SheetId, coord: CellCoord) -> String {
        self.get_cell_value(sheet, coord).as_text()
    }

    pub fn get_cell(&self, sheet: &SheetId, coord: CellCoord) -> Option<&Cell> {
        self.workbook().cell(sheet, coord)
    }

    /// Formula cells reading `coord`, sorted. With `transitive`, also the
    /// cells reading those.
    pub fn get_dependents(&self, sheet: &SheetId, coord: CellCoord, transitive: bool) -> Vec<CellId> {
        let cell = CellId::new(sheet.clone(), coord);
        self.state
            .graph()
            .dependents_of(&cell, transitive)
            .into_iter()
            .collect()
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo(&self.client)
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo(&self.client)
    }

    // --- Dispatch ---

    /// Check a command from this client without changing anything
    pub fn allow_dispatch(&self, command: &Command) -> CommandResult {
        self.allow_as(&self.client, command)
    }

    /// Check a command on behalf of `client`
    pub fn allow_as(&self, client: &ClientId, command: &Command) -> CommandResult {
        self.validate(client, command).into()
    }

    /// Validate and apply a command from this client
    pub fn dispatch(&mut self, command: Command) -> Result<CommandResult, EngineError> {
        let client = self.client.clone();
        self.dispatch_as(client, command)
    }

    /// Validate and apply a command attributed to `client`
    pub fn dispatch_as(&mut self, client: ClientId, command: Command) -> Result<CommandResult, EngineError> {
        let result = self.allow_as(&client, &command);
        if let CommandResult::Cancelled(reason) = result {
            debug!(command = command.name(), %client, %reason, "command cancelled");
            return Ok(result);
        }
        self.handle(client, command)?;
        Ok(result)
    }

    fn validate(&self, client: &ClientId, command: &Command) -> Result<(), CancelReason> {
        let workbook = self.state.workbook();
        match command {
            Command::SetCellContent { sheet, col, row, .. } => {
                in_grid(self.sheet(sheet)?, CellCoord::new(*row, *col))
            }
            Command::ClearCells { sheet, range } | Command::SetCellStyle { sheet, range, .. } => {
                if self.sheet(sheet)?.contains_range(range) {
                    Ok(())
                } else {
                    Err(CancelReason::OutOfBounds)
                }
            }
            Command::InsertRows { sheet, index, count } => self.check_insert(sheet, Axis::Row, *index, *count),
            Command::InsertColumns { sheet, index, count } => {
                self.check_insert(sheet, Axis::Column, *index, *count)
            }
            Command::DeleteRows { sheet, index, count } => self.check_delete(sheet, Axis::Row, *index, *count),
            Command::DeleteColumns { sheet, index, count } => {
                self.check_delete(sheet, Axis::Column, *index, *count)
            }
            Command::ResizeRows { sheet, rows, size } => self.check_resize(sheet, Axis::Row, rows, *size),
            Command::ResizeColumns { sheet, cols, size } => self.check_resize(sheet, Axis::Column, cols, *size),
            Command::CreateSheet { sheet, name } => {
                if workbook.sheet(sheet).is_some() {
                    return Err(CancelReason::InvalidSheetId);
                }
                workbook.validate_sheet_name(name).map_err(|e| match e {
                    WorkbookError::SheetNameExists(_) => CancelReason::DuplicateSheetName,
                    _ => CancelReason::InvalidSheetName,
                })
            }
            Command::DeleteSheet { sheet } => {
                self.sheet(sheet)?;
                if workbook.sheet_count() <= 1 {
                    return Err(CancelReason::LastSheet);
                }
                Ok(())
            }
            Command::ActivateSheet { sheet } => self.sheet(sheet).map(|_| ()),
            Command::SelectCell { col, row } => {
                in_grid(self.sheet(self.view.active_sheet())?, CellCoord::new(*row, *col))
            }
            Command::MovePosition { .. } => Ok(()),
            Command::Undo if !self.log.can_undo(client) => Err(CancelReason::EmptyUndoStack),
            Command::Redo if !self.log.can_redo(client) => Err(CancelReason::EmptyRedoStack),
            Command::Undo | Command::Redo => Ok(()),
        }
    }

    fn sheet(&self, id: &SheetId) -> Result<&Sheet, CancelReason> {
        self.state.workbook().sheet(id).ok_or(CancelReason::InvalidSheetId)
    }

    fn check_insert(&self, sheet: &SheetId, axis: Axis, index: u32, count: u32) -> Result<(), CancelReason> {
        let lines = self.sheet(sheet)?.line_count(axis);
        if count == 0 || lines.checked_add(count).is_none() {
            return Err(CancelReason::InvalidCount);
        }
        if index > lines {
            return Err(CancelReason::OutOfBounds);
        }
        Ok(())
    }

    fn check_delete(&self, sheet: &SheetId, axis: Axis, index: u32, count: u32) -> Result<(), CancelReason> {
        let lines = self.sheet(sheet)?.line_count(axis);
        if count == 0 {
            return Err(CancelReason::InvalidCount);
        }
        if index as u64 + count as u64 > lines as u64 {
            return Err(CancelReason::OutOfBounds);
        }
        if count >= lines {
            return Err(CancelReason::NotEnoughLines);
        }
        Ok(())
    }

    fn check_resize(&self, sheet: &SheetId, axis: Axis, indices: &[u32], size: f64) -> Result<(), CancelReason> {
        let lines = self.sheet(sheet)?.line_count(axis);
        if indices.is_empty() {
            return Err(CancelReason::InvalidCount);
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(CancelReason::InvalidSize);
        }
        if indices.iter().any(|i| *i >= lines) {
            return Err(CancelReason::OutOfBounds);
        }
        Ok(())
    }

    /// Apply an already validated command
    fn handle(&mut self, client: ClientId, command: Command) -> Result<Option<RevisionId>, EngineError> {
        if command.is_local() {
            self.handle_local(&command);
            self.notify(None, command.name(), BTreeSet::new());
            return Ok(None);
        }

        let (kind, forward) = match &command {
            Command::Undo => {
                let Some(target) = self.log.undo_target(&client) else {
                    return Ok(None);
                };
                (RevisionKind::Undo(target.id), self.replayable(target))
            }
            Command::Redo => {
                let Some(target) = self.log.redo_target(&client) else {
                    return Ok(None);
                };
                (RevisionKind::Redo(target.id), self.replayable(target))
            }
            _ => (RevisionKind::Command, self.plan(&command)),
        };

        let applied = self.apply(forward)?;
        let cells = applied.cells.len();
        let id = self.log.push(client.clone(), command.clone(), kind, applied.inverses, applied.effects);
        debug!(command = command.name(), %client, revision = %id, cells, "command applied");
        self.notify(Some(id), command.name(), applied.cells);
        Ok(Some(id))
    }

    /// Inverse records of `target`, moved past the rows, columns and sheets
    /// that later revisions inserted or deleted
    fn replayable(&self, target: &Revision) -> Vec<Change> {
        let later = self.log.since(target.id).iter().flat_map(|r| r.effects.iter());
        rebase_changes(target.changes.clone(), later, &self.state)
    }

    fn handle_local(&mut self, command: &Command) {
        match command {
            Command::ActivateSheet { sheet } => self.view.activate(sheet.clone()),
            Command::SelectCell { col, row } => self.view.select(*col, *row),
            Command::MovePosition { delta_col, delta_row } => {
                if let Some(sheet) = self.state.workbook().sheet(self.view.active_sheet()) {
                    let (cols, rows) = (sheet.cols(), sheet.rows());
                    self.view.move_by(*delta_col, *delta_row, cols, rows);
                }
            }
            _ => {}
        }
    }

    /// Push changes through the state-update primitive, then bring the
    /// dependent state and the view up to date
    fn apply(&mut self, changes: Vec<Change>) -> Result<Applied, EngineError> {
        let mut journal = Journal::default();
        for change in &changes {
            journal.record(change);
        }
        let effects: Vec<StructuralEffect> = changes.iter().filter_map(Change::effect).collect();

        let inverses = apply_all(changes, self.state.workbook_mut())?;
        let cells = self.state.refresh(&journal, &self.registry);
        for effect in &effects {
            self.view.follow(effect, self.state.workbook());
        }
        self.view.ensure_valid(self.state.workbook());
        Ok(Applied {
            inverses,
            effects,
            cells,
        })
    }

    /// Roll back the newest revision without recording anything. Used to
    /// take back optimistic local revisions before replaying in the agreed
    /// order; user-facing undo goes through [`Command::Undo`].
    pub fn revert_last(&mut self) -> Result<Option<Revision>, EngineError> {
        let Some(revision) = self.log.pop_last() else {
            return Ok(None);
        };

        match self.apply(revision.changes.clone()) {
            Ok(applied) => {
                debug!(revision = %revision.id, command = revision.command.name(), "revision reverted");
                self.notify(None, "Revert", applied.cells);
                Ok(Some(revision))
            }
            Err(error) => {
                let Revision {
                    client,
                    command,
                    kind,
                    changes,
                    effects,
                    ..
                } = revision;
                self.log.push(client, command, kind, changes, effects);
                Err(error)
            }
        }
    }

    /// Forget every revision, keeping the document as it is. Undo and redo
    /// start over from here.
    pub fn clear_history(&mut self) {
        debug!(revisions = self.log.len(), "history cleared");
        self.log.clear();
    }

    fn notify(&self, revision: Option<RevisionId>, command: &'static str, changed: BTreeSet<CellId>) {
        // No subscribers is fine
        let _ = self.updates.send(Update {
            revision,
            command,
            changed: changed.into_iter().collect(),
        });
    }

    // --- Planning: command -> changes ---

    fn plan(&self, command: &Command) -> Vec<Change> {
        let workbook = self.state.workbook();
        match command {
            Command::SetCellContent {
                sheet,
                col,
                row,
                content,
            } => {
                let coord = CellCoord::new(*row, *col);
                let style = workbook.cell(sheet, coord).and_then(|cell| cell.style);
                vec![Change::SetCell {
                    sheet: sheet.clone(),
                    coord,
                    cell: Some(Cell::from_input(content, &self.sniffer).with_style(style)),
                }]
            }
            Command::ClearCells { sheet, range } => workbook
                .sheet(sheet)
                .map(|s| s.cells_in_range(range))
                .unwrap_or_default()
                .into_iter()
                .filter(|(_, cell)| cell.content.literal_value() != Some(CellValue::Empty))
                .map(|(coord, cell)| Change::SetCell {
                    sheet: sheet.clone(),
                    coord,
                    // Clearing keeps the style
                    cell: cell.style.map(|style| Cell::default().with_style(Some(style))),
                })
                .collect(),
            Command::SetCellStyle { sheet, range, style } => {
                let mut changes = Vec::new();
                let id = style.as_ref().map(|format| {
                    workbook.styles.find(format).unwrap_or_else(|| {
                        let id = workbook.styles.next_id();
                        changes.push(Change::SetStyleEntry {
                            id,
                            format: Some(format.clone()),
                        });
                        id
                    })
                });
                for coord in range.iter() {
                    let existing = workbook.cell(sheet, coord);
                    if existing.and_then(|cell| cell.style) == id {
                        continue;
                    }
                    changes.push(Change::SetCell {
                        sheet: sheet.clone(),
                        coord,
                        cell: Some(existing.cloned().unwrap_or_default().with_style(id)),
                    });
                }
                changes
            }
            Command::ResizeRows { sheet, rows, size } => resize(sheet, Axis::Row, rows, *size),
            Command::ResizeColumns { sheet, cols, size } => resize(sheet, Axis::Column, cols, *size),
            Command::CreateSheet { sheet, name } => vec![Change::CreateSheet {
                index: workbook.sheet_count(),
                sheet: Sheet::new(sheet.clone(), name.clone(), self.config.rows, self.config.cols),
            }],
            Command::DeleteSheet { sheet } => vec![Change::DeleteSheet { sheet: sheet.clone() }],
            other => match other.structural_edit() {
                Some(edit) => self.plan_structural(&edit),
                None => Vec::new(),
            },
        }
    }

    /// Rewrite every formula the edit shifts, then move the lines. The
    /// rewrites address cells at their pre-edit coordinates.
    fn plan_structural(&self, edit: &StructuralEdit) -> Vec<Change> {
        let workbook = self.state.workbook();
        let mut changes = Vec::new();

        for sheet in &workbook.sheets {
            for (coord, cell) in sheet.cells() {
                let Some(text) = cell.content.formula_text() else {
                    continue;
                };
                // Cells in a deleted band go away with it
                if sheet.id == edit.sheet && coord.shifted(edit.axis, edit.at, edit.delta).is_none() {
                    continue;
                }
                if let Some(shifted) = shift_formula(text, &sheet.id, edit, &self.state) {
                    let raw = format!("={shifted}");
                    changes.push(Change::SetCell {
                        sheet: sheet.id.clone(),
                        coord: *coord,
                        cell: Some(Cell::from_input(&raw, &self.sniffer).with_style(cell.style)),
                    });
                }
            }
        }

        let count = edit.delta.unsigned_abs() as u32;
        changes.push(if edit.delta > 0 {
            Change::InsertLines {
                sheet: edit.sheet.clone(),
                axis: edit.axis,
                at: edit.at,
                count,
            }
        } else {
            Change::RemoveLines {
                sheet: edit.sheet.clone(),
                axis: edit.axis,
                at: edit.at,
                count,
            }
        });
        changes
    }

    // --- Snapshots ---

    pub fn to_snapshot(&self) -> WorkbookSnapshot {
        self.workbook().to_snapshot()
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(self.workbook().to_json()?)
    }

    /// Replace the whole document. History is dropped; formulas and values
    /// are derived again from the raw contents.
    pub fn load_json(&mut self, json: &str) -> Result<(), EngineError> {
        let workbook = Workbook::from_json(json, &self.sniffer)?;
        self.load_workbook(workbook);
        Ok(())
    }

    pub fn load_snapshot(&mut self, snapshot: &WorkbookSnapshot) -> Result<(), EngineError> {
        let workbook = Workbook::from_snapshot(snapshot, &self.sniffer)?;
        self.load_workbook(workbook);
        Ok(())
    }

    fn load_workbook(&mut self, workbook: Workbook) {
        self.state = DocumentState::new(workbook, &self.registry);
        self.log.clear();
        self.view.ensure_valid(self.state.workbook());
        let changed = self
            .workbook()
            .sheets
            .iter()
            .flat_map(|sheet| sheet.cells().map(|(coord, _)| CellId::new(sheet.id.clone(), *coord)))
            .collect();
        self.notify(None, "Load", changed);
    }
}

struct Applied {
    inverses: Vec<Change>,
    effects: Vec<StructuralEffect>,
    cells: BTreeSet<CellId>,
}

fn in_grid(sheet: &Sheet, coord: CellCoord) -> Result<(), CancelReason> {
    if sheet.contains(coord) {
        Ok(())
    } else {
        Err(CancelReason::OutOfBounds)
    }
}

fn resize(sheet: &SheetId, axis: Axis, indices: &[u32], size: f64) -> Vec<Change> {
    indices
        .iter()
        .map(|index| Change::SetLineSize {
            sheet: sheet.clone(),
            axis,
            index: *index,
            size: Some(size),
        })
        .collect()
}

impl std::fmt::Debug for SpreadsheetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpreadsheetEngine")
            .field("client", &self.client)
            .field("sheets", &self.workbook().sheet_count())
            .field("log", &self.log)
            .field("view", &self.view)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsync_core::{CellError, CellFormat, CellRange};

    fn engine() -> SpreadsheetEngine {
        SpreadsheetEngine::new(ClientId::from("me")).unwrap()
    }

    fn sheet1() -> SheetId {
        SheetId::from("sheet1")
    }

    fn at(a1: &str) -> CellCoord {
        CellCoord::from_a1(a1).unwrap()
    }

    fn set(engine: &mut SpreadsheetEngine, a1: &str, content: &str) -> CommandResult {
        engine
            .dispatch(Command::set_content(sheet1(), at(a1), content))
            .unwrap()
    }

    fn text(engine: &SpreadsheetEngine, a1: &str) -> String {
        engine.get_cell_display_text(&sheet1(), at(a1))
    }

    #[test]
    fn test_formula_evaluation() {
        let mut engine = engine();
        set(&mut engine, "A1", "=5+3");
        assert_eq!(text(&engine, "A1"), "8");

        set(&mut engine, "B1", "=(5+3)*2");
        assert_eq!(text(&engine, "B1"), "16");
    }

    #[test]
    fn test_recalculation_on_dependency_change() {
        let mut engine = engine();
        set(&mut engine, "A1", "5");
        set(&mut engine, "B1", "=A1*2");
        assert_eq!(text(&engine, "B1"), "10");

        set(&mut engine, "A1", "10");
        assert_eq!(text(&engine, "B1"), "20");
        assert_eq!(engine.get_dependents(&sheet1(), at("A1"), false), vec![CellId::new(sheet1(), at("B1"))]);
    }

    #[test]
    fn test_cancelled_commands_change_nothing() {
        let mut engine = engine();
        let result = engine
            .dispatch(Command::SetCellContent {
                sheet: SheetId::from("nope"),
                col: 0,
                row: 0,
                content: "1".into(),
            })
            .unwrap();
        assert_eq!(result, CommandResult::Cancelled(CancelReason::InvalidSheetId));

        assert_eq!(set(&mut engine, "A1000", "1"), CommandResult::Cancelled(CancelReason::OutOfBounds));
        assert_eq!(
            engine.dispatch(Command::Undo).unwrap(),
            CommandResult::Cancelled(CancelReason::EmptyUndoStack)
        );
        assert!(engine.log().is_empty());
    }

    #[test]
    fn test_validation_reasons() {
        let engine = engine();
        let insert = |index, count| Command::InsertRows {
            sheet: sheet1(),
            index,
            count,
        };
        assert_eq!(engine.allow_dispatch(&insert(0, 0)).reason(), Some(CancelReason::InvalidCount));
        assert_eq!(engine.allow_dispatch(&insert(101, 1)).reason(), Some(CancelReason::OutOfBounds));
        assert!(engine.allow_dispatch(&insert(100, 1)).is_success());

        let delete = Command::DeleteColumns {
            sheet: sheet1(),
            index: 0,
            count: 26,
        };
        assert_eq!(engine.allow_dispatch(&delete).reason(), Some(CancelReason::NotEnoughLines));

        let resize = Command::ResizeRows {
            sheet: sheet1(),
            rows: vec![0],
            size: -1.0,
        };
        assert_eq!(engine.allow_dispatch(&resize).reason(), Some(CancelReason::InvalidSize));

        let dup = Command::CreateSheet {
            sheet: SheetId::from("s2"),
            name: "sheet1".into(),
        };
        assert_eq!(engine.allow_dispatch(&dup).reason(), Some(CancelReason::DuplicateSheetName));
        let bad = Command::CreateSheet {
            sheet: SheetId::from("s2"),
            name: "a/b".into(),
        };
        assert_eq!(engine.allow_dispatch(&bad).reason(), Some(CancelReason::InvalidSheetName));
        assert_eq!(
            engine.allow_dispatch(&Command::DeleteSheet { sheet: sheet1() }).reason(),
            Some(CancelReason::LastSheet)
        );
    }

    #[test]
    fn test_clear_keeps_style() {
        let mut engine = engine();
        set(&mut engine, "A1", "hello");
        engine
            .dispatch(Command::SetCellStyle {
                sheet: sheet1(),
                range: CellRange::from_a1("A1:B1").unwrap(),
                style: Some(CellFormat::new().with_bold(true)),
            })
            .unwrap();
        engine
            .dispatch(Command::ClearCells {
                sheet: sheet1(),
                range: CellRange::from_a1("A1").unwrap(),
            })
            .unwrap();

        let cell = engine.get_cell(&sheet1(), at("A1")).unwrap();
        assert_eq!(cell.raw, "");
        assert!(cell.style.is_some());
        assert_eq!(cell.style, engine.get_cell(&sheet1(), at("B1")).and_then(|c| c.style));
        assert_eq!(engine.workbook().styles.len(), 1);
    }

    #[test]
    fn test_local_commands_are_not_recorded() {
        let mut engine = engine();
        engine.dispatch(Command::SelectCell { col: 3, row: 4 }).unwrap();
        engine
            .dispatch(Command::MovePosition {
                delta_col: -10,
                delta_row: 1,
            })
            .unwrap();
        assert_eq!((engine.position().col, engine.position().row), (0, 5));
        assert!(engine.log().is_empty());
    }

    #[test]
    fn test_updates_are_broadcast() {
        let mut engine = engine();
        let mut updates = engine.subscribe();
        set(&mut engine, "A1", "1");
        set(&mut engine, "A2", "=A1+1");
        set(&mut engine, "A1", "2");

        let first = updates.try_recv().unwrap();
        assert_eq!(first.revision, Some(RevisionId(1)));
        updates.try_recv().unwrap();
        let third = updates.try_recv().unwrap();
        assert_eq!(third.command, "SetCellContent");
        assert!(third.changed.contains(&CellId::new(sheet1(), at("A2"))));
    }

    #[test]
    fn test_revert_last_leaves_no_revision() {
        let mut engine = engine();
        set(&mut engine, "A1", "1");
        set(&mut engine, "A1", "=1/0");
        assert_eq!(
            engine.get_cell_value(&sheet1(), at("A1")),
            CellValue::Error(CellError::DivisionByZero)
        );

        let reverted = engine.revert_last().unwrap().unwrap();
        assert_eq!(reverted.id, RevisionId(2));
        assert_eq!(engine.log().len(), 1);
        assert_eq!(text(&engine, "A1"), "1");
    }
}
