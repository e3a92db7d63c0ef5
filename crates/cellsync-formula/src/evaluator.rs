//! Incremental recomputation of formula values.
//!
//! A pass walks the dependency structure depth first with an explicit
//! frame stack and a per-pass visitation map (unvisited / in progress /
//! done). Cells in progress stay marked until their strongly connected
//! component is complete, so every member of a cycle is found even when
//! the cycle is entered through a side path. Components come out in
//! dependency order: each one is evaluated (or marked `#CYCLE`) as soon
//! as it closes.

use std::collections::{BTreeSet, HashMap};

use cellsync_core::{CellCoord, CellError, CellId, CellRange, CellValue, SheetId};

use crate::compiler::{CompiledFormula, EvalContext, Reference};

/// Read access to the document a pass evaluates against
pub trait FormulaSource {
    /// Compiled formula stored at `cell`, if it is a formula cell
    fn formula(&self, cell: &CellId) -> Option<&CompiledFormula>;

    /// Formula cells inside `reference`, sorted
    fn formula_cells_in(&self, reference: &Reference) -> Vec<CellId>;

    /// Whether every cell of `range` lies inside the grid of `sheet`
    fn contains_range(&self, sheet: &SheetId, range: &CellRange) -> bool;

    /// Value of a non-formula cell. `Err(InvalidReference)` outside the
    /// grid or for unknown sheets.
    fn literal_value(&self, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError>;
}

/// Cached values of formula cells
pub type ValueCache = HashMap<CellId, CellValue>;

/// Document plus cached formula values, as seen by a running formula
pub struct CachedContext<'a> {
    pub source: &'a dyn FormulaSource,
    pub values: &'a ValueCache,
}

impl EvalContext for CachedContext<'_> {
    fn cell_value(&self, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError> {
        let id = CellId::new(sheet.clone(), coord);
        if self.source.formula(&id).is_some() {
            return Ok(self.values.get(&id).cloned().unwrap_or_default());
        }
        self.source.literal_value(sheet, coord)
    }

    fn range_values(&self, sheet: &SheetId, range: CellRange) -> Result<Vec<CellValue>, CellError> {
        if !self.source.contains_range(sheet, &range) {
            return Err(CellError::InvalidReference);
        }
        range
            .iter()
            .map(|coord| match self.cell_value(sheet, coord)? {
                CellValue::Error(_) => Ok(CellValue::Error(CellError::Propagated)),
                value => Ok(value),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress { index: usize, low: usize },
    Done,
}

struct Frame {
    cell: CellId,
    deps: Vec<CellId>,
    next: usize,
}

/// What a recomputation pass did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Recomputed {
    /// Cells given a new value, in evaluation order
    pub evaluated: Vec<CellId>,
    /// Each detected cycle, members sorted
    pub cycles: Vec<Vec<CellId>>,
}

/// One recomputation pass. The visitation map lives only as long as the pass.
pub struct Evaluator<'a> {
    source: &'a dyn FormulaSource,
    values: &'a mut ValueCache,
    dirty: &'a BTreeSet<CellId>,
    marks: HashMap<CellId, Mark>,
    components: Vec<CellId>,
    counter: usize,
    report: Recomputed,
}

impl<'a> Evaluator<'a> {
    pub fn new(source: &'a dyn FormulaSource, values: &'a mut ValueCache, dirty: &'a BTreeSet<CellId>) -> Self {
        Self {
            source,
            values,
            dirty,
            marks: HashMap::new(),
            components: Vec::new(),
            counter: 0,
            report: Recomputed::default(),
        }
    }

    /// Recompute every dirty cell. Formula cells outside `dirty` keep their
    /// cached values; dirty cells that are no longer formulas lose theirs.
    pub fn run(mut self) -> Recomputed {
        let dirty = self.dirty;
        for cell in dirty {
            if self.marks.contains_key(cell) {
                continue;
            }
            if self.source.formula(cell).is_none() {
                self.values.remove(cell);
                continue;
            }
            self.visit(cell.clone());
        }
        self.report
    }

    fn needs_visit(&self, cell: &CellId) -> bool {
        self.dirty.contains(cell) && self.source.formula(cell).is_some()
    }

    /// Formula cells read by `cell`, deduplicated and sorted
    fn formula_deps(&self, cell: &CellId) -> Vec<CellId> {
        let Some(formula) = self.source.formula(cell) else {
            return Vec::new();
        };
        let mut deps = BTreeSet::new();
        for reference in formula.dependencies() {
            deps.extend(self.source.formula_cells_in(reference));
        }
        deps.into_iter().collect()
    }

    fn open(&mut self, cell: CellId, frames: &mut Vec<Frame>) {
        let index = self.counter;
        self.counter += 1;
        self.marks.insert(cell.clone(), Mark::InProgress { index, low: index });
        self.components.push(cell.clone());
        let deps = self.formula_deps(&cell);
        frames.push(Frame { cell, deps, next: 0 });
    }

    fn lower(&mut self, cell: &CellId, to: usize) {
        if let Some(Mark::InProgress { low, .. }) = self.marks.get_mut(cell) {
            *low = (*low).min(to);
        }
    }

    fn visit(&mut self, root: CellId) {
        let mut frames = Vec::new();
        self.open(root, &mut frames);

        while let Some(frame) = frames.last_mut() {
            if frame.next < frame.deps.len() {
                let dep = frame.deps[frame.next].clone();
                frame.next += 1;
                let current = frame.cell.clone();

                match self.marks.get(&dep).copied() {
                    Some(Mark::InProgress { index, .. }) => self.lower(&current, index),
                    Some(Mark::Done) => {}
                    None if self.needs_visit(&dep) => self.open(dep, &mut frames),
                    // Clean formulas and literals are already up to date
                    None => {}
                }
                continue;
            }

            let Some(frame) = frames.pop() else { break };
            let (index, low) = match self.marks.get(&frame.cell) {
                Some(Mark::InProgress { index, low }) => (*index, *low),
                _ => continue,
            };
            if let Some(parent) = frames.last() {
                let parent = parent.cell.clone();
                self.lower(&parent, low);
            }
            if low == index {
                self.close_component(&frame.cell, frame.deps.contains(&frame.cell));
            }
        }
    }

    fn close_component(&mut self, root: &CellId, self_loop: bool) {
        let mut members = Vec::new();
        while let Some(cell) = self.components.pop() {
            let done = &cell == root;
            members.push(cell);
            if done {
                break;
            }
        }

        if members.len() > 1 || self_loop {
            members.sort();
            for cell in &members {
                self.values
                    .insert(cell.clone(), CellValue::Error(CellError::CyclicReference));
                self.marks.insert(cell.clone(), Mark::Done);
                self.report.evaluated.push(cell.clone());
            }
            self.report.cycles.push(members);
            return;
        }

        for cell in members {
            let value = match self.source.formula(&cell) {
                Some(formula) => {
                    let ctx = CachedContext {
                        source: self.source,
                        values: self.values,
                    };
                    formula.evaluate(&ctx)
                }
                None => CellValue::Empty,
            };
            self.values.insert(cell.clone(), value);
            self.marks.insert(cell.clone(), Mark::Done);
            self.report.evaluated.push(cell);
        }
    }
}

/// Convenience wrapper around [`Evaluator::run`]
pub fn recompute(source: &dyn FormulaSource, values: &mut ValueCache, dirty: &BTreeSet<CellId>) -> Recomputed {
    Evaluator::new(source, values, dirty).run()
}
