pub mod cell;
pub mod client;
pub mod error;
pub mod format;
pub mod number;
pub mod range;
pub mod sheet;
pub mod workbook;

pub use cell::{Cell, CellContent, CellValue};
pub use client::{ClientId, Position};
pub use error::{CellError, ErrorKind, WorkbookError};
pub use format::{CellFormat, Color, HorizontalAlign, StyleId, StyleTable};
pub use number::{NumberPolicy, NumberSniffer, PolicyError, FORMULA_MARKER};
pub use range::{col_from_label, col_to_label, shift_index, shift_span, Axis, CellCoord, CellId, CellRange};
pub use sheet::{RemovedLines, Sheet, SheetId, DEFAULT_COLS, DEFAULT_COL_SIZE, DEFAULT_ROWS, DEFAULT_ROW_SIZE};
pub use workbook::{CellSnapshot, SheetSnapshot, StyleEntry, Workbook, WorkbookSnapshot};
