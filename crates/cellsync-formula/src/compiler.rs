//! Expression tree to evaluation closure.
//!
//! Compiling resolves function names and sheet names once, so evaluation
//! never re-parses and never looks anything up by name. The compiled
//! closure is pure: everything it reads comes through [`EvalContext`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use cellsync_core::{CellCoord, CellError, CellRange, CellValue, SheetId};
use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expr, RefExpr, UnaryOp};
use crate::error::FormulaError;
use crate::functions::{Arg, FunctionRegistry};
use crate::parser::parse_formula;

/// Maps sheet names used in formula text to sheet ids
pub trait SheetResolver {
    fn resolve_sheet(&self, name: &str) -> Option<SheetId>;
}

/// What a compiled formula may read while it runs
pub trait EvalContext {
    /// Current value of a cell. `Err(InvalidReference)` for coordinates
    /// outside the sheet's grid or unknown sheets.
    fn cell_value(&self, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError>;

    /// Values of a range in row-major order. Cells holding errors appear
    /// as `Error(Propagated)`.
    fn range_values(&self, sheet: &SheetId, range: CellRange) -> Result<Vec<CellValue>, CellError>;
}

/// One dependency edge target: a single cell or a rectangle on a sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub sheet: SheetId,
    pub range: CellRange,
}

impl Reference {
    pub fn cell(sheet: SheetId, coord: CellCoord) -> Self {
        Reference {
            sheet,
            range: CellRange::single(coord),
        }
    }

    pub fn contains(&self, sheet: &SheetId, coord: CellCoord) -> bool {
        &self.sheet == sheet && self.range.contains(coord)
    }
}

type Node = Box<dyn Fn(&dyn EvalContext) -> Result<CellValue, CellError> + Send + Sync>;

/// A formula ready to run, plus everything it reads
#[derive(Clone)]
pub struct CompiledFormula {
    source: String,
    eval: Arc<dyn Fn(&dyn EvalContext) -> Result<CellValue, CellError> + Send + Sync>,
    dependencies: Vec<Reference>,
}

impl CompiledFormula {
    /// Formula text without the leading `=`
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct references in order of first appearance
    pub fn dependencies(&self) -> &[Reference] {
        &self.dependencies
    }

    /// Run the formula. Failures become error values.
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> CellValue {
        match (self.eval)(ctx) {
            Ok(CellValue::Number(n)) if !n.is_finite() => CellValue::Error(CellError::NumError),
            Ok(value) => value,
            Err(e) => CellValue::Error(e),
        }
    }
}

impl fmt::Debug for CompiledFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFormula")
            .field("source", &self.source)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Parse and compile formula text living on sheet `host`
pub fn compile(
    text: &str,
    host: &SheetId,
    registry: &FunctionRegistry,
    resolver: &dyn SheetResolver,
) -> Result<CompiledFormula, FormulaError> {
    let expr = parse_formula(text)?;
    compile_expr(text, &expr, host, registry, resolver)
}

/// Compile an already parsed expression
pub fn compile_expr(
    source: &str,
    expr: &Expr,
    host: &SheetId,
    registry: &FunctionRegistry,
    resolver: &dyn SheetResolver,
) -> Result<CompiledFormula, FormulaError> {
    let mut compiler = Compiler {
        host,
        registry,
        resolver,
        dependencies: Vec::new(),
    };
    let node = compiler.node(expr)?;

    Ok(CompiledFormula {
        source: source.to_string(),
        eval: Arc::from(node),
        dependencies: compiler.dependencies,
    })
}

enum Target {
    Cell(SheetId, CellCoord),
    Range(Reference),
    Missing,
}

enum ArgNode {
    Scalar(Node),
    Range(Reference),
    Missing,
}

impl ArgNode {
    fn eval(&self, ctx: &dyn EvalContext) -> Result<Arg, CellError> {
        match self {
            // Scalar failures stay values so IFERROR can see them
            ArgNode::Scalar(node) => Ok(Arg::Value(node(ctx).unwrap_or_else(CellValue::Error))),
            ArgNode::Range(r) => Ok(Arg::Range(ctx.range_values(&r.sheet, r.range)?)),
            ArgNode::Missing => Ok(Arg::Value(CellValue::Error(CellError::InvalidReference))),
        }
    }
}

struct Compiler<'a> {
    host: &'a SheetId,
    registry: &'a FunctionRegistry,
    resolver: &'a dyn SheetResolver,
    dependencies: Vec<Reference>,
}

impl Compiler<'_> {
    fn target(&mut self, r: &RefExpr) -> Target {
        let sheet = match &r.sheet {
            None => self.host.clone(),
            Some(name) => match self.resolver.resolve_sheet(name) {
                Some(id) => id,
                None => return Target::Missing,
            },
        };

        let reference = Reference {
            sheet: sheet.clone(),
            range: r.range(),
        };
        if !self.dependencies.contains(&reference) {
            self.dependencies.push(reference.clone());
        }

        if r.is_range() {
            Target::Range(reference)
        } else {
            Target::Cell(sheet, r.start.coord())
        }
    }

    fn node(&mut self, expr: &Expr) -> Result<Node, FormulaError> {
        let node: Node = match expr {
            Expr::Number(n) => {
                let n = *n;
                Box::new(move |_: &dyn EvalContext| Ok(CellValue::Number(n)))
            }
            Expr::String(s) => {
                let s = s.clone();
                Box::new(move |_: &dyn EvalContext| Ok(CellValue::Text(s.clone())))
            }
            Expr::Boolean(b) => {
                let b = *b;
                Box::new(move |_: &dyn EvalContext| Ok(CellValue::Boolean(b)))
            }
            Expr::Error(e) => {
                let e = *e;
                Box::new(move |_: &dyn EvalContext| Err(e))
            }
            Expr::Reference(r) => match self.target(r) {
                Target::Cell(sheet, coord) => Box::new(move |ctx: &dyn EvalContext| match ctx.cell_value(&sheet, coord)? {
                    CellValue::Error(_) => Err(CellError::Propagated),
                    value => Ok(value),
                }),
                // A range is not a scalar
                Target::Range(_) => Box::new(|_: &dyn EvalContext| Err(CellError::InvalidValue)),
                Target::Missing => Box::new(|_: &dyn EvalContext| Err(CellError::InvalidReference)),
            },
            Expr::Binary { left, op, right } => {
                let left = self.node(left)?;
                let right = self.node(right)?;
                let op = *op;
                Box::new(move |ctx: &dyn EvalContext| {
                    let l = left(ctx)?;
                    let r = right(ctx)?;
                    binary(op, &l, &r)
                })
            }
            Expr::Unary { op, operand } => {
                let operand = self.node(operand)?;
                let op = *op;
                Box::new(move |ctx: &dyn EvalContext| unary(op, &operand(ctx)?))
            }
            Expr::FunctionCall { name, args } => {
                let spec = *self
                    .registry
                    .get(name)
                    .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                if !spec.accepts(args.len()) {
                    return Err(FormulaError::Arity {
                        name: spec.name.to_string(),
                        expected: spec.arity(),
                        got: args.len(),
                    });
                }

                let mut arg_nodes = Vec::with_capacity(args.len());
                for arg in args {
                    arg_nodes.push(self.arg(arg)?);
                }

                let compute = spec.compute;
                Box::new(move |ctx: &dyn EvalContext| {
                    let mut values = Vec::with_capacity(arg_nodes.len());
                    for arg in &arg_nodes {
                        values.push(arg.eval(ctx)?);
                    }
                    compute(&values)
                })
            }
            Expr::Grouped(inner) => self.node(inner)?,
        };
        Ok(node)
    }

    fn arg(&mut self, expr: &Expr) -> Result<ArgNode, FormulaError> {
        match expr {
            Expr::Reference(r) if r.is_range() => Ok(match self.target(r) {
                Target::Range(reference) => ArgNode::Range(reference),
                Target::Cell(..) | Target::Missing => ArgNode::Missing,
            }),
            _ => Ok(ArgNode::Scalar(self.node(expr)?)),
        }
    }
}

fn number(value: &CellValue) -> Result<f64, CellError> {
    value.as_number().ok_or(CellError::InvalidValue)
}

fn finite(n: f64) -> Result<CellValue, CellError> {
    if n.is_finite() {
        Ok(CellValue::Number(n))
    } else {
        Err(CellError::NumError)
    }
}

fn binary(op: BinaryOp, left: &CellValue, right: &CellValue) -> Result<CellValue, CellError> {
    match op {
        BinaryOp::Add => finite(number(left)? + number(right)?),
        BinaryOp::Sub => finite(number(left)? - number(right)?),
        BinaryOp::Mul => finite(number(left)? * number(right)?),
        BinaryOp::Div => {
            let divisor = number(right)?;
            let dividend = number(left)?;
            if divisor == 0.0 {
                return Err(CellError::DivisionByZero);
            }
            finite(dividend / divisor)
        }
        BinaryOp::Pow => {
            let base = number(left)?;
            let exp = number(right)?;
            if base == 0.0 && exp < 0.0 {
                return Err(CellError::DivisionByZero);
            }
            finite(base.powf(exp))
        }
        BinaryOp::Concat => Ok(CellValue::Text(format!("{}{}", left.as_text(), right.as_text()))),
        BinaryOp::Eq => Ok(CellValue::Boolean(compare(left, right) == Ordering::Equal)),
        BinaryOp::Ne => Ok(CellValue::Boolean(compare(left, right) != Ordering::Equal)),
        BinaryOp::Lt => Ok(CellValue::Boolean(compare(left, right) == Ordering::Less)),
        BinaryOp::Gt => Ok(CellValue::Boolean(compare(left, right) == Ordering::Greater)),
        BinaryOp::Le => Ok(CellValue::Boolean(compare(left, right) != Ordering::Greater)),
        BinaryOp::Ge => Ok(CellValue::Boolean(compare(left, right) != Ordering::Less)),
    }
}

fn unary(op: UnaryOp, value: &CellValue) -> Result<CellValue, CellError> {
    let n = number(value)?;
    match op {
        UnaryOp::Neg => Ok(CellValue::Number(-n)),
        UnaryOp::Pos => Ok(CellValue::Number(n)),
        UnaryOp::Percent => Ok(CellValue::Number(n / 100.0)),
    }
}

/// Numbers sort before text, text before booleans. Empty takes the type
/// of the other side; text compares case-insensitively.
fn compare(left: &CellValue, right: &CellValue) -> Ordering {
    fn rank(value: &CellValue) -> u8 {
        match value {
            CellValue::Number(_) | CellValue::Empty | CellValue::Error(_) => 0,
            CellValue::Text(_) => 1,
            CellValue::Boolean(_) => 2,
        }
    }

    match (left, right) {
        (CellValue::Empty, CellValue::Text(b)) => String::new().cmp(b),
        (CellValue::Text(a), CellValue::Empty) => a.cmp(&String::new()),
        (CellValue::Empty, CellValue::Boolean(b)) => false.cmp(b),
        (CellValue::Boolean(a), CellValue::Empty) => a.cmp(&false),
        (CellValue::Text(a), CellValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
        _ => match (rank(left), rank(right)) {
            (0, 0) => {
                let a = left.as_number().unwrap_or(0.0);
                let b = right.as_number().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.cmp(&b),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Grid {
        cells: HashMap<(SheetId, CellCoord), CellValue>,
        rows: u32,
        cols: u32,
    }

    impl Grid {
        fn new() -> Self {
            Grid {
                cells: HashMap::new(),
                rows: 10,
                cols: 10,
            }
        }

        fn set(&mut self, sheet: &str, a1: &str, value: CellValue) {
            let coord = CellCoord::from_a1(a1).unwrap();
            self.cells.insert((SheetId::from(sheet), coord), value);
        }
    }

    impl SheetResolver for Grid {
        fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
            match name.to_ascii_lowercase().as_str() {
                "sheet1" => Some(SheetId::from("s1")),
                "data" => Some(SheetId::from("s2")),
                _ => None,
            }
        }
    }

    impl EvalContext for Grid {
        fn cell_value(&self, sheet: &SheetId, coord: CellCoord) -> Result<CellValue, CellError> {
            if !coord.is_valid(self.rows, self.cols) {
                return Err(CellError::InvalidReference);
            }
            Ok(self
                .cells
                .get(&(sheet.clone(), coord))
                .cloned()
                .unwrap_or_default())
        }

        fn range_values(&self, sheet: &SheetId, range: CellRange) -> Result<Vec<CellValue>, CellError> {
            range
                .iter()
                .map(|coord| {
                    self.cell_value(sheet, coord).map(|v| match v {
                        CellValue::Error(_) => CellValue::Error(CellError::Propagated),
                        v => v,
                    })
                })
                .collect()
        }
    }

    fn run(grid: &Grid, text: &str) -> CellValue {
        let registry = FunctionRegistry::with_builtins();
        compile(text, &SheetId::from("s1"), &registry, grid)
            .unwrap()
            .evaluate(grid)
    }

    #[test]
    fn test_arithmetic() {
        let grid = Grid::new();
        assert_eq!(run(&grid, "1 + 2 * 3"), CellValue::Number(7.0));
        assert_eq!(run(&grid, "(1 + 2) * 3"), CellValue::Number(9.0));
        assert_eq!(run(&grid, "2^3^2"), CellValue::Number(512.0));
        assert_eq!(run(&grid, "-2^2"), CellValue::Number(4.0));
        assert_eq!(run(&grid, "50%"), CellValue::Number(0.5));
        assert_eq!(run(&grid, "1/0"), CellValue::Error(CellError::DivisionByZero));
    }

    #[test]
    fn test_empty_cells_coerce() {
        let grid = Grid::new();
        assert_eq!(run(&grid, "A1+1"), CellValue::Number(1.0));
        assert_eq!(run(&grid, "A1&\"x\""), CellValue::Text("x".to_string()));
        assert_eq!(run(&grid, "A1=0"), CellValue::Boolean(true));
        assert_eq!(run(&grid, "A1=\"\""), CellValue::Boolean(true));
    }

    #[test]
    fn test_references_and_errors() {
        let mut grid = Grid::new();
        grid.set("s1", "A1", CellValue::Number(5.0));
        grid.set("s1", "A2", CellValue::Error(CellError::DivisionByZero));
        grid.set("s2", "B1", CellValue::Text("7".to_string()));

        assert_eq!(run(&grid, "A1+1"), CellValue::Number(6.0));
        assert_eq!(run(&grid, "A2+1"), CellValue::Error(CellError::Propagated));
        assert_eq!(run(&grid, "Data!B1*2"), CellValue::Number(14.0));
        assert_eq!(run(&grid, "Nowhere!B1"), CellValue::Error(CellError::InvalidReference));
        assert_eq!(run(&grid, "Z99"), CellValue::Error(CellError::InvalidReference));
        assert_eq!(run(&grid, "A1:A2"), CellValue::Error(CellError::InvalidValue));
        assert_eq!(run(&grid, "#REF!+1"), CellValue::Error(CellError::InvalidReference));
        assert_eq!(run(&grid, "\"abc\"*1"), CellValue::Error(CellError::InvalidValue));
    }

    #[test]
    fn test_functions() {
        let mut grid = Grid::new();
        grid.set("s1", "A1", CellValue::Number(1.0));
        grid.set("s1", "A2", CellValue::Number(2.0));
        grid.set("s1", "A3", CellValue::Text("x".to_string()));

        assert_eq!(run(&grid, "SUM(A1:A3)"), CellValue::Number(3.0));
        assert_eq!(run(&grid, "SUM(A1:A3, 10)"), CellValue::Number(13.0));
        assert_eq!(run(&grid, "IF(A2>A1, \"up\", \"down\")"), CellValue::Text("up".to_string()));
        assert_eq!(run(&grid, "IFERROR(1/0, -1)"), CellValue::Number(-1.0));
        assert_eq!(run(&grid, "IFERROR(Nowhere!A1:A2, 0)"), CellValue::Number(0.0));
        assert_eq!(run(&grid, "COUNTA(A1:A5)"), CellValue::Number(3.0));
    }

    #[test]
    fn test_dependencies_declared() {
        let grid = Grid::new();
        let registry = FunctionRegistry::with_builtins();
        let formula = compile("SUM(A1:B2)+A1+Data!C3+A1+Nowhere!A1", &SheetId::from("s1"), &registry, &grid).unwrap();

        let deps: Vec<String> = formula
            .dependencies()
            .iter()
            .map(|r| format!("{}!{}", r.sheet, r.range))
            .collect();
        assert_eq!(deps, vec!["s1!A1:B2", "s1!A1", "s2!C3"]);
    }

    #[test]
    fn test_compile_failures() {
        let grid = Grid::new();
        let registry = FunctionRegistry::with_builtins();
        let host = SheetId::from("s1");

        assert!(matches!(
            compile("NOPE(1)", &host, &registry, &grid),
            Err(FormulaError::UnknownFunction(name)) if name == "NOPE"
        ));
        assert!(matches!(
            compile("ABS(1, 2)", &host, &registry, &grid),
            Err(FormulaError::Arity { got: 2, .. })
        ));
        assert!(matches!(
            compile("1 +", &host, &registry, &grid),
            Err(FormulaError::BadExpression { .. })
        ));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&CellValue::Number(1.0), &CellValue::Text("a".into())), Ordering::Less);
        assert_eq!(
            compare(&CellValue::Text("ABC".into()), &CellValue::Text("abc".into())),
            Ordering::Equal
        );
        assert_eq!(compare(&CellValue::Boolean(true), &CellValue::Number(9.0)), Ordering::Greater);
    }
}
