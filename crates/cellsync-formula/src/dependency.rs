use std::collections::{BTreeSet, HashMap, VecDeque};

use cellsync_core::{CellCoord, CellId, CellRange, SheetId};

use crate::compiler::Reference;

/// Rows per bucket of the range index
const BAND_ROWS: u32 = 64;

/// Ranges covering more buckets than this are kept in one list
const MAX_BANDS: u32 = 64;

/// Multi-cell references of one sheet, bucketed by row band so a lookup
/// only scans the ranges that overlap the cell's band
#[derive(Debug, Default, Clone)]
struct RangeIndex {
    bands: HashMap<u32, Vec<(CellRange, CellId)>>,
    wide: Vec<(CellRange, CellId)>,
}

impl RangeIndex {
    fn bands_of(range: &CellRange) -> Option<std::ops::RangeInclusive<u32>> {
        let (first, last) = (range.start.row / BAND_ROWS, range.end.row / BAND_ROWS);
        (last - first < MAX_BANDS).then_some(first..=last)
    }

    fn insert(&mut self, range: CellRange, owner: CellId) {
        match Self::bands_of(&range) {
            Some(bands) => {
                for band in bands {
                    self.bands.entry(band).or_default().push((range, owner.clone()));
                }
            }
            None => self.wide.push((range, owner)),
        }
    }

    fn remove(&mut self, range: &CellRange, owner: &CellId) {
        let keep = |(r, o): &(CellRange, CellId)| !(o == owner && r == range);
        match Self::bands_of(range) {
            Some(bands) => {
                for band in bands {
                    if let Some(entries) = self.bands.get_mut(&band) {
                        entries.retain(keep);
                        if entries.is_empty() {
                            self.bands.remove(&band);
                        }
                    }
                }
            }
            None => self.wide.retain(keep),
        }
    }

    fn owners_at(&self, coord: CellCoord) -> impl Iterator<Item = &CellId> {
        self.bands
            .get(&(coord.row / BAND_ROWS))
            .into_iter()
            .flatten()
            .chain(self.wide.iter())
            .filter(move |(range, _)| range.contains(coord))
            .map(|(_, owner)| owner)
    }

    fn is_empty(&self) -> bool {
        self.bands.is_empty() && self.wide.is_empty()
    }
}

/// Tracks dependencies between formula cells and the cells and ranges
/// they read, for incremental recalculation.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Maps a formula cell to what it reads
    /// e.g., if A1 = B1 + SUM(C1:C3), then dependencies[A1] = [B1, C1:C3]
    dependencies: HashMap<CellId, Vec<Reference>>,

    /// Single-cell reverse lookup: dependents[B1] contains A1
    dependents: HashMap<CellId, BTreeSet<CellId>>,

    /// Multi-cell references per sheet
    range_dependents: HashMap<SheetId, RangeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every outgoing edge of `cell`. An empty list removes the node.
    pub fn set_dependencies(&mut self, cell: CellId, deps: Vec<Reference>) {
        self.unlink(&cell);

        for dep in &deps {
            if dep.range.is_single_cell() {
                self.dependents
                    .entry(CellId::new(dep.sheet.clone(), dep.range.start))
                    .or_default()
                    .insert(cell.clone());
            } else {
                self.range_dependents
                    .entry(dep.sheet.clone())
                    .or_default()
                    .insert(dep.range, cell.clone());
            }
        }

        if !deps.is_empty() {
            self.dependencies.insert(cell, deps);
        }
    }

    /// Remove a cell's node (when it stops being a formula)
    pub fn remove_cell(&mut self, cell: &CellId) {
        self.unlink(cell);
    }

    fn unlink(&mut self, cell: &CellId) {
        let Some(old) = self.dependencies.remove(cell) else {
            return;
        };

        for dep in &old {
            if dep.range.is_single_cell() {
                let target = CellId::new(dep.sheet.clone(), dep.range.start);
                if let Some(set) = self.dependents.get_mut(&target) {
                    set.remove(cell);
                    if set.is_empty() {
                        self.dependents.remove(&target);
                    }
                }
            } else if let Some(index) = self.range_dependents.get_mut(&dep.sheet) {
                index.remove(&dep.range, cell);
                if index.is_empty() {
                    self.range_dependents.remove(&dep.sheet);
                }
            }
        }
    }

    /// What `cell` reads, if it is a node
    pub fn dependencies_of(&self, cell: &CellId) -> Option<&[Reference]> {
        self.dependencies.get(cell).map(Vec::as_slice)
    }

    /// Formula cells reading `cell` directly
    pub fn direct_dependents(&self, cell: &CellId) -> BTreeSet<CellId> {
        let mut out = self.dependents.get(cell).cloned().unwrap_or_default();
        if let Some(index) = self.range_dependents.get(&cell.sheet) {
            out.extend(index.owners_at(cell.coord).cloned());
        }
        out
    }

    /// Cells that must be recomputed when `cell` changes. With
    /// `transitive`, follows dependents of dependents.
    pub fn dependents_of(&self, cell: &CellId, transitive: bool) -> BTreeSet<CellId> {
        if !transitive {
            return self.direct_dependents(cell);
        }

        let mut affected = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(cell.clone());

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(&current) {
                if affected.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        affected
    }

    /// Union of transitive dependents of every cell in `cells`
    pub fn affected_by<'a>(&self, cells: impl IntoIterator<Item = &'a CellId>) -> BTreeSet<CellId> {
        let mut out = BTreeSet::new();
        for cell in cells {
            out.extend(self.dependents_of(cell, true));
        }
        out
    }

    /// Number of formula nodes
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
        self.range_dependents.clear();
    }
}
