use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cell::Cell;
use crate::error::WorkbookError;
use crate::format::{CellFormat, StyleId, StyleTable};
use crate::number::NumberSniffer;
use crate::range::{Axis, CellCoord};
use crate::sheet::{Sheet, SheetId, DEFAULT_COLS, DEFAULT_ROWS};

pub const SNAPSHOT_VERSION: u32 = 1;

/// The persisted document: ordered sheets plus the shared style table
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub name: String,
    pub sheets: Vec<Sheet>,
    pub styles: StyleTable,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Workbook {
    /// Create a new workbook with a default sheet
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_size(name, DEFAULT_ROWS, DEFAULT_COLS)
    }

    pub fn with_size(name: impl Into<String>, rows: u32, cols: u32) -> Self {
        Self {
            name: name.into(),
            sheets: vec![Sheet::new(SheetId::from("sheet1"), "Sheet1", rows, cols)],
            styles: StyleTable::default(),
        }
    }

    pub fn sheet(&self, id: &SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| &s.id == id)
    }

    pub fn sheet_mut(&mut self, id: &SheetId) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| &s.id == id)
    }

    pub fn sheet_index(&self, id: &SheetId) -> Option<usize> {
        self.sheets.iter().position(|s| &s.id == id)
    }

    /// Look a sheet up by display name, ignoring case
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn cell(&self, sheet: &SheetId, coord: CellCoord) -> Option<&Cell> {
        self.sheet(sheet)?.get_cell(coord)
    }

    /// Check a prospective sheet name against naming rules and existing sheets
    pub fn validate_sheet_name(&self, name: &str) -> Result<(), WorkbookError> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed.len() != name.len()
            || name.chars().any(|c| c.is_control() || "[]*?/\\:".contains(c))
        {
            return Err(WorkbookError::InvalidSheetName(name.to_string()));
        }
        if self.sheet_by_name(name).is_some() {
            return Err(WorkbookError::SheetNameExists(name.to_string()));
        }
        Ok(())
    }

    pub fn insert_sheet(&mut self, index: usize, sheet: Sheet) {
        let index = index.min(self.sheets.len());
        self.sheets.insert(index, sheet);
    }

    /// Remove a sheet, returning its former index and contents
    pub fn remove_sheet(&mut self, id: &SheetId) -> Result<(usize, Sheet), WorkbookError> {
        let index = self
            .sheet_index(id)
            .ok_or_else(|| WorkbookError::SheetNotFound(id.clone()))?;
        if self.sheets.len() <= 1 {
            return Err(WorkbookError::CannotDeleteLastSheet);
        }
        Ok((index, self.sheets.remove(index)))
    }

    pub fn to_snapshot(&self) -> WorkbookSnapshot {
        WorkbookSnapshot {
            version: SNAPSHOT_VERSION,
            name: self.name.clone(),
            sheets: self.sheets.iter().map(SheetSnapshot::from_sheet).collect(),
            styles: self
                .styles
                .iter()
                .map(|(id, format)| StyleEntry {
                    id: *id,
                    format: format.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a workbook from a snapshot, re-classifying every raw content
    pub fn from_snapshot(
        snapshot: &WorkbookSnapshot,
        sniffer: &NumberSniffer,
    ) -> Result<Self, WorkbookError> {
        let mut styles = StyleTable::default();
        for entry in &snapshot.styles {
            styles.set(entry.id, Some(entry.format.clone()));
        }

        let mut sheets = Vec::with_capacity(snapshot.sheets.len());
        for sheet in &snapshot.sheets {
            sheets.push(sheet.to_sheet(sniffer)?);
        }
        if sheets.is_empty() {
            return Err(WorkbookError::NoSheets);
        }

        Ok(Workbook {
            name: snapshot.name.clone(),
            sheets,
            styles,
        })
    }

    pub fn to_json(&self) -> Result<String, WorkbookError> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    pub fn from_json(json: &str, sniffer: &NumberSniffer) -> Result<Self, WorkbookError> {
        let snapshot: WorkbookSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(&snapshot, sniffer)
    }
}

/// Complete, history-free export of a workbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookSnapshot {
    pub version: u32,
    pub name: String,
    pub sheets: Vec<SheetSnapshot>,
    #[serde(default)]
    pub styles: Vec<StyleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub id: StyleId,
    pub format: CellFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSnapshot {
    pub id: SheetId,
    pub name: String,
    pub rows: u32,
    pub cols: u32,
    /// Keyed by A1 address
    #[serde(default)]
    pub cells: BTreeMap<String, CellSnapshot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub row_sizes: BTreeMap<u32, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub col_sizes: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleId>,
}

impl SheetSnapshot {
    fn from_sheet(sheet: &Sheet) -> Self {
        SheetSnapshot {
            id: sheet.id.clone(),
            name: sheet.name.clone(),
            rows: sheet.rows(),
            cols: sheet.cols(),
            cells: sheet
                .cells()
                .map(|(coord, cell)| {
                    let snapshot = CellSnapshot {
                        content: cell.raw.clone(),
                        style: cell.style,
                    };
                    (coord.to_a1(), snapshot)
                })
                .collect(),
            row_sizes: sheet.custom_sizes(Axis::Row).map(|(i, s)| (*i, *s)).collect(),
            col_sizes: sheet.custom_sizes(Axis::Column).map(|(i, s)| (*i, *s)).collect(),
        }
    }

    fn to_sheet(&self, sniffer: &NumberSniffer) -> Result<Sheet, WorkbookError> {
        let mut sheet = Sheet::new(self.id.clone(), self.name.clone(), self.rows, self.cols);
        for (address, cell) in &self.cells {
            let coord = CellCoord::from_a1(address)
                .ok_or_else(|| WorkbookError::InvalidAddress(address.clone()))?;
            let stored = Cell::from_input(&cell.content, sniffer).with_style(cell.style);
            sheet.set_cell(coord, Some(stored));
        }
        for (index, size) in &self.row_sizes {
            sheet.set_size(Axis::Row, *index, Some(*size));
        }
        for (index, size) in &self.col_sizes {
            sheet.set_size(Axis::Column, *index, Some(*size));
        }
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellContent;
    use crate::number::NumberPolicy;

    fn sniffer() -> NumberSniffer {
        NumberSniffer::new(NumberPolicy::default()).unwrap()
    }

    #[test]
    fn test_workbook_creation() {
        let wb = Workbook::new("Test");
        assert_eq!(wb.name, "Test");
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.sheets[0].name, "Sheet1");
        assert_eq!(wb.sheets[0].rows(), DEFAULT_ROWS);
    }

    #[test]
    fn test_add_remove_sheets() {
        let mut wb = Workbook::new("Test");
        let id = SheetId::from("s2");
        wb.insert_sheet(1, Sheet::new(id.clone(), "Data", 10, 10));
        assert_eq!(wb.sheet_count(), 2);
        assert_eq!(wb.sheet_by_name("data").map(|s| &s.id), Some(&id));

        let (index, removed) = wb.remove_sheet(&id).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.name, "Data");

        assert!(matches!(
            wb.remove_sheet(&SheetId::from("sheet1")),
            Err(WorkbookError::CannotDeleteLastSheet)
        ));
    }

    #[test]
    fn test_sheet_name_validation() {
        let wb = Workbook::new("Test");
        assert!(wb.validate_sheet_name("Budget 2024").is_ok());
        assert!(matches!(
            wb.validate_sheet_name("sheet1"),
            Err(WorkbookError::SheetNameExists(_))
        ));
        assert!(wb.validate_sheet_name("  ").is_err());
        assert!(wb.validate_sheet_name("a/b").is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let sniffer = sniffer();
        let mut wb = Workbook::new("Test");
        let style = wb.styles.next_id();
        wb.styles.set(style, Some(CellFormat::new().with_bold(true)));

        let sheet = wb.sheet_mut(&SheetId::from("sheet1")).unwrap();
        sheet.set_cell(CellCoord::new(0, 0), Some(Cell::from_input("1,000", &sniffer)));
        sheet.set_cell(
            CellCoord::new(1, 0),
            Some(Cell::from_input("=A1*2", &sniffer).with_style(Some(style))),
        );
        sheet.set_size(Axis::Column, 0, Some(120.0));

        let json = wb.to_json().unwrap();
        assert!(json.contains("\"A2\""));
        let restored = Workbook::from_json(&json, &sniffer).unwrap();
        assert_eq!(restored, wb);

        let a1 = restored.cell(&SheetId::from("sheet1"), CellCoord::new(0, 0)).unwrap();
        assert_eq!(a1.content, CellContent::Number(1000.0));
        assert_eq!(a1.raw, "1,000");
    }

    #[test]
    fn test_snapshot_rejects_bad_address() {
        let json = r#"{"version":1,"name":"x","sheets":[{"id":"s","name":"S","rows":5,"cols":5,"cells":{"1A":{"content":"x"}}}]}"#;
        let result = Workbook::from_json(json, &sniffer());
        assert!(matches!(result, Err(WorkbookError::InvalidAddress(_))));
    }
}
