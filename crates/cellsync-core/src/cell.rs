use serde::{Deserialize, Serialize};

use crate::error::CellError;
use crate::format::StyleId;
use crate::number::{NumberSniffer, FORMULA_MARKER};

/// The evaluated value of a cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    /// Numeric view of the value. Empty reads as 0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Empty => Some(0.0),
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Error(_) => None,
        }
    }

    /// Text view of the value. Empty reads as "".
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.to_string(),
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Empty => Some(false),
            CellValue::Boolean(b) => Some(*b),
            CellValue::Number(n) => Some(*n != 0.0),
            CellValue::Text(s) => match s.to_uppercase().as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            },
            CellValue::Error(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Classified content of a cell. A cell is either a literal or a formula, never both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellContent {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Formula text without the leading `=`
    Formula(String),
}

impl CellContent {
    pub fn is_formula(&self) -> bool {
        matches!(self, CellContent::Formula(_))
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellContent::Formula(text) => Some(text),
            _ => None,
        }
    }

    /// Value of a literal. Formulas have no intrinsic value.
    pub fn literal_value(&self) -> Option<CellValue> {
        match self {
            CellContent::Empty => Some(CellValue::Empty),
            CellContent::Number(n) => Some(CellValue::Number(*n)),
            CellContent::Text(s) => Some(CellValue::Text(s.clone())),
            CellContent::Boolean(b) => Some(CellValue::Boolean(*b)),
            CellContent::Formula(_) => None,
        }
    }
}

/// A stored cell: the raw text the user typed, its classification and a style reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub raw: String,
    pub content: CellContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleId>,
}

impl Cell {
    /// Build a cell from raw user input, classifying it with `sniffer`
    pub fn from_input(raw: &str, sniffer: &NumberSniffer) -> Self {
        Cell {
            raw: raw.trim().to_string(),
            content: sniffer.classify(raw),
            style: None,
        }
    }

    pub fn with_style(mut self, style: Option<StyleId>) -> Self {
        self.style = style;
        self
    }

    pub fn is_formula(&self) -> bool {
        self.content.is_formula()
    }

    /// The same cell holding formula `text` (without the leading `=`)
    pub fn with_formula(mut self, text: String) -> Self {
        self.raw = format!("{FORMULA_MARKER}{text}");
        self.content = CellContent::Formula(text);
        self
    }

    /// A cell with no content and no style can be dropped from storage
    pub fn is_blank(&self) -> bool {
        matches!(self.content, CellContent::Empty) && self.style.is_none()
    }
}
