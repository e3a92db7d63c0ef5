//! The document a client owns: workbook, compiled formulas, dependency
//! graph and cached formula values, kept consistent with each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cellsync_core::{CellCoord, CellError, CellId, CellRange, CellValue, SheetId, Workbook};
use cellsync_formula::{
    compile, recompute, CompiledFormula, DependencyGraph, FormulaError, FormulaSource,
    FunctionRegistry, Recomputed, Reference, SheetResolver, ValueCache,
};
use cellsync_history::Change;
use tracing::debug;

/// What a batch of changes touched, for deciding what to recompute
#[derive(Debug, Default, Clone)]
pub struct Journal {
    /// Cells whose stored content changed
    pub cells: BTreeSet<CellId>,
    /// Sheets whose rows or columns moved
    pub reshaped: BTreeSet<SheetId>,
    /// A sheet was created or deleted
    pub sheets_changed: bool,
}

impl Journal {
    pub fn record(&mut self, change: &Change) {
        match change {
            Change::SetCell { sheet, coord, .. } => {
                self.cells.insert(CellId::new(sheet.clone(), *coord));
            }
            Change::InsertLines { sheet, .. }
            | Change::RemoveLines { sheet, .. }
            | Change::RestoreLines { sheet, .. } => {
                self.reshaped.insert(sheet.clone());
            }
            Change::CreateSheet { .. } | Change::DeleteSheet { .. } => self.sheets_changed = true,
            Change::SetLineSize { .. } | Change::SetStyleEntry { .. } => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.reshaped.is_empty() && !self.sheets_changed
    }
}

struct Sheets<'a>(&'a Workbook);

impl SheetResolver for Sheets<'_> {
    fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        self.0.sheet_by_name(name).map(|sheet| sheet.id.clone())
    }
}

/// Read-only view handed to the evaluator
struct Source<'a> {
    workbook: &'a Workbook,
    formulas: &'a BTreeMap<CellId, CompiledFormula>,
}

impl FormulaSource for Source<'_> {
    fn formula(&self, cell: &CellId) -> Option<&CompiledFormula> {
        self.formulas.get(cell)
    }

    fn formula_cells_in(&self, reference: &Reference) -> Vec<CellId> {
        // Row-major keys: the corners bound every cell of the rectangle
        let first = CellId::new(reference.sheet.clone(), reference.range.start);
        let last = CellId::new(reference.sheet.clone(), reference.range.end);
        self.formulas
            .range(first..=last)
            .map(|(id, _)| id)
            .filter(|id| reference.contains(&id.sheet, id.coord))
            .cloned()
            .collect()
    }

    fn contains_range(&self, sheet: &SheetId, range: &CellRange) -> bool {
        self.workbook.sheet(sheet).is_some_and(|s| s.contains_range(range))
    }

    fn literal_value(&self, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError> {
        literal_value(self.workbook, sheet, coord)
    }
}

fn literal_value(workbook: &Workbook, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError> {
    let sheet = workbook.sheet(sheet).ok_or(CellError::InvalidReference)?;
    if !sheet.contains(coord) {
        return Err(CellError::InvalidReference);
    }
    Ok(match sheet.get_cell(coord) {
        None => CellValue::Empty,
        // A formula without a compiled form failed to compile
        Some(cell) => cell
            .content
            .literal_value()
            .unwrap_or(CellValue::Error(CellError::BadExpression)),
    })
}

/// One client's document: the single owner of the workbook, the
/// dependency graph and the value cache
#[derive(Debug)]
pub struct DocumentState {
    workbook: Workbook,
    formulas: BTreeMap<CellId, CompiledFormula>,
    broken: HashMap<CellId, FormulaError>,
    graph: DependencyGraph,
    values: ValueCache,
}

impl DocumentState {
    /// Wrap a workbook and derive everything else from its raw contents
    pub fn new(workbook: Workbook, registry: &FunctionRegistry) -> Self {
        let mut state = Self {
            workbook,
            formulas: BTreeMap::new(),
            broken: HashMap::new(),
            graph: DependencyGraph::new(),
            values: ValueCache::new(),
        };
        state.rebuild(registry);
        state
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub(crate) fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Evaluated value of any cell
    pub fn value(&self, sheet: &SheetId, coord: CellCoord) -> CellValue {
        let id = CellId::new(sheet.clone(), coord);
        if self.formulas.contains_key(&id) {
            return self.values.get(&id).cloned().unwrap_or_default();
        }
        literal_value(&self.workbook, sheet, coord).unwrap_or_else(CellValue::Error)
    }

    /// Why the formula at `cell` did not compile
    pub fn formula_error(&self, cell: &CellId) -> Option<&FormulaError> {
        self.broken.get(cell)
    }

    pub fn compiled(&self, cell: &CellId) -> Option<&CompiledFormula> {
        self.formulas.get(cell)
    }

    fn formula_cells(&self, sheet: Option<&SheetId>) -> Vec<CellId> {
        self.workbook
            .sheets
            .iter()
            .filter(|s| sheet.map_or(true, |id| &s.id == id))
            .flat_map(|s| {
                s.cells()
                    .filter(|(_, cell)| cell.is_formula())
                    .map(move |(coord, _)| CellId::new(s.id.clone(), *coord))
            })
            .collect()
    }

    /// Compile the cell's current content and replace its graph node
    fn register(&mut self, id: &CellId, registry: &FunctionRegistry) {
        let compiled = self
            .workbook
            .cell(&id.sheet, id.coord)
            .and_then(|cell| cell.content.formula_text())
            .map(|text| compile(text, &id.sheet, registry, &Sheets(&self.workbook)));

        self.unregister(id);
        match compiled {
            Some(Ok(formula)) => {
                self.graph.set_dependencies(id.clone(), formula.dependencies().to_vec());
                self.formulas.insert(id.clone(), formula);
            }
            Some(Err(error)) => {
                debug!(cell = %id, %error, "formula does not compile");
                self.broken.insert(id.clone(), error);
            }
            None => {}
        }
    }

    fn unregister(&mut self, id: &CellId) {
        self.formulas.remove(id);
        self.broken.remove(id);
        self.graph.remove_cell(id);
        self.values.remove(id);
    }

    fn recompute(&mut self, dirty: &BTreeSet<CellId>) -> Recomputed {
        let source = Source {
            workbook: &self.workbook,
            formulas: &self.formulas,
        };
        let report = recompute(&source, &mut self.values, dirty);
        for cycle in &report.cycles {
            debug!(cells = cycle.len(), first = %cycle[0], "cycle detected");
        }
        report
    }

    /// Recompile and recompute everything from raw contents
    pub fn rebuild(&mut self, registry: &FunctionRegistry) -> BTreeSet<CellId> {
        self.formulas.clear();
        self.broken.clear();
        self.graph.clear();
        self.values.clear();

        let cells = self.formula_cells(None);
        for id in &cells {
            self.register(id, registry);
        }
        let dirty: BTreeSet<CellId> = cells.into_iter().collect();
        let report = self.recompute(&dirty);
        debug!(formulas = dirty.len(), evaluated = report.evaluated.len(), "rebuilt document");
        dirty
    }

    /// Bring formulas, graph and values up to date after `journal`'s
    /// changes hit the workbook. Returns every cell whose value may have
    /// changed.
    pub fn refresh(&mut self, journal: &Journal, registry: &FunctionRegistry) -> BTreeSet<CellId> {
        if journal.sheets_changed {
            let mut changed = self.rebuild(registry);
            changed.extend(journal.cells.iter().cloned());
            return changed;
        }

        let mut dirty = BTreeSet::new();
        for sheet in &journal.reshaped {
            // Everything on a reshaped sheet may have moved
            let stale: Vec<CellId> = self
                .formulas
                .keys()
                .chain(self.broken.keys())
                .filter(|id| &id.sheet == sheet)
                .cloned()
                .collect();
            for id in &stale {
                self.unregister(id);
            }
            for id in self.formula_cells(Some(sheet)) {
                self.register(&id, registry);
                dirty.insert(id);
            }
        }
        for id in &journal.cells {
            if !journal.reshaped.contains(&id.sheet) {
                self.register(id, registry);
            }
            dirty.insert(id.clone());
        }

        let affected = self.graph.affected_by(dirty.iter());
        dirty.extend(affected);
        let report = self.recompute(&dirty);
        debug!(dirty = dirty.len(), evaluated = report.evaluated.len(), "recomputed");
        dirty
    }
}

impl SheetResolver for DocumentState {
    fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        Sheets(&self.workbook).resolve_sheet(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsync_core::{Cell, NumberPolicy, NumberSniffer};

    fn sheet1() -> SheetId {
        SheetId::from("sheet1")
    }

    fn at(a1: &str) -> CellCoord {
        CellCoord::from_a1(a1).unwrap()
    }

    fn put(state: &mut DocumentState, journal: &mut Journal, a1: &str, raw: &str) {
        let sniffer = NumberSniffer::new(NumberPolicy::default()).unwrap();
        let change = Change::SetCell {
            sheet: sheet1(),
            coord: at(a1),
            cell: Some(Cell::from_input(raw, &sniffer)),
        };
        journal.record(&change);
        change.apply(state.workbook_mut()).unwrap();
    }

    #[test]
    fn test_refresh_recomputes_dependents() {
        let registry = FunctionRegistry::with_builtins();
        let mut state = DocumentState::new(Workbook::new("Test"), &registry);

        let mut journal = Journal::default();
        put(&mut state, &mut journal, "A1", "5");
        put(&mut state, &mut journal, "A2", "=A1+1");
        state.refresh(&journal, &registry);
        assert_eq!(state.value(&sheet1(), at("A2")), CellValue::Number(6.0));

        let mut journal = Journal::default();
        put(&mut state, &mut journal, "A1", "10");
        let changed = state.refresh(&journal, &registry);
        assert!(changed.contains(&CellId::new(sheet1(), at("A2"))));
        assert_eq!(state.value(&sheet1(), at("A2")), CellValue::Number(11.0));
    }

    #[test]
    fn test_broken_formula() {
        let registry = FunctionRegistry::with_builtins();
        let mut state = DocumentState::new(Workbook::new("Test"), &registry);

        let mut journal = Journal::default();
        put(&mut state, &mut journal, "A1", "=1+");
        put(&mut state, &mut journal, "B1", "=A1*2");
        state.refresh(&journal, &registry);

        let a1 = CellId::new(sheet1(), at("A1"));
        assert_eq!(state.value(&sheet1(), at("A1")), CellValue::Error(CellError::BadExpression));
        assert_eq!(state.value(&sheet1(), at("B1")), CellValue::Error(CellError::Propagated));
        assert!(state.formula_error(&a1).is_some());
        assert!(state.compiled(&a1).is_none());
    }

    #[test]
    fn test_rebuild_from_raw_contents() {
        let registry = FunctionRegistry::with_builtins();
        let sniffer = NumberSniffer::new(NumberPolicy::default()).unwrap();
        let mut workbook = Workbook::new("Test");
        let sheet = workbook.sheet_mut(&sheet1()).unwrap();
        sheet.set_cell(at("A1"), Some(Cell::from_input("3", &sniffer)));
        sheet.set_cell(at("B1"), Some(Cell::from_input("=SUM(A1:A3)*2", &sniffer)));

        let state = DocumentState::new(workbook, &registry);
        assert_eq!(state.value(&sheet1(), at("B1")), CellValue::Number(6.0));
        assert_eq!(state.graph().len(), 1);
        assert_eq!(
            state.value(&sheet1(), CellCoord::new(500, 0)),
            CellValue::Error(CellError::InvalidReference)
        );
    }

    #[test]
    fn test_formula_cells_in_rectangle() {
        let registry = FunctionRegistry::with_builtins();
        let mut state = DocumentState::new(Workbook::new("Test"), &registry);
        let mut journal = Journal::default();
        for (a1, raw) in [("A2", "=1"), ("B2", "=2"), ("D2", "=3"), ("B3", "=4"), ("C4", "=5"), ("B5", "=6")] {
            put(&mut state, &mut journal, a1, raw);
        }
        state.refresh(&journal, &registry);

        let source = Source {
            workbook: &state.workbook,
            formulas: &state.formulas,
        };
        let reference = Reference {
            sheet: sheet1(),
            range: CellRange::from_a1("B2:C4").unwrap(),
        };
        let ids: Vec<CellCoord> = source.formula_cells_in(&reference).into_iter().map(|id| id.coord).collect();
        assert_eq!(ids, vec![at("B2"), at("B3"), at("C4")]);
    }

    #[test]
    fn test_huge_range_is_invalid_reference() {
        let registry = FunctionRegistry::with_builtins();
        let mut state = DocumentState::new(Workbook::new("Test"), &registry);
        let mut journal = Journal::default();
        put(&mut state, &mut journal, "A1", "=SUM(B1:ZZZ999999)");
        put(&mut state, &mut journal, "A2", "=COUNT(B1:Z100)");
        state.refresh(&journal, &registry);

        assert_eq!(state.value(&sheet1(), at("A1")), CellValue::Error(CellError::InvalidReference));
        assert_eq!(state.value(&sheet1(), at("A2")), CellValue::Number(0.0));
    }
}
