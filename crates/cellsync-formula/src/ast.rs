use std::fmt;

use cellsync_core::{col_to_label, CellCoord, CellError, CellRange};

/// One end of a reference, with its `$` markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: u32,
    pub row: u32,
    pub abs_col: bool, // $A1 vs A1
    pub abs_row: bool, // A$1 vs A1
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        CellRef {
            col,
            row,
            abs_col: false,
            abs_row: false,
        }
    }

    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.row, self.col)
    }

    /// Same markers, new position
    pub fn moved_to(&self, coord: CellCoord) -> Self {
        CellRef {
            col: coord.col,
            row: coord.row,
            ..*self
        }
    }
}

/// A cell or range reference, optionally qualified by sheet name
#[derive(Debug, Clone, PartialEq)]
pub struct RefExpr {
    pub sheet: Option<String>,
    pub start: CellRef,
    pub end: Option<CellRef>,
}

impl RefExpr {
    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// Normalized rectangle covered by the reference
    pub fn range(&self) -> CellRange {
        let end = self.end.unwrap_or(self.start);
        CellRange::new(self.start.coord(), end.coord())
    }
}

/// Abstract Syntax Tree for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // A1, $B$2, A1:B10, Sheet2!A1
    Reference(RefExpr),

    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    // Function call (e.g., SUM(A1:A10))
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },

    // Parenthesized expression
    Grouped(Box<Expr>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // String
    Concat,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,     // -
    Pos,     // +
    Percent, // %
}

impl Expr {
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn cell(col: u32, row: u32) -> Self {
        Expr::Reference(RefExpr {
            sheet: None,
            start: CellRef::new(col, row),
            end: None,
        })
    }
}

fn needs_quotes(sheet: &str) -> bool {
    let mut chars = sheet.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return true,
    }
    !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.abs_col { "$" } else { "" },
            col_to_label(self.col),
            if self.abs_row { "$" } else { "" },
            self.row + 1
        )
    }
}

impl fmt::Display for RefExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if needs_quotes(sheet) {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            } else {
                write!(f, "{}!", sheet)?;
            }
        }
        write!(f, "{}", self.start)?;
        if let Some(end) = &self.end {
            write!(f, ":{}", end)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Expr::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Expr::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Expr::Error(e) => write!(f, "{}", e),
            Expr::Reference(r) => write!(f, "{}", r),
            Expr::Binary { left, op, right } => write!(f, "{}{}{}", left, op, right),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::Pos => write!(f, "+{}", operand),
                UnaryOp::Percent => write!(f, "{}%", operand),
            },
            Expr::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Grouped(inner) => write!(f, "({})", inner),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}
