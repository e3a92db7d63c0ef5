pub mod ast;
pub mod compiler;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod reference_shifter;

pub use ast::{BinaryOp, CellRef, Expr, RefExpr, UnaryOp};
pub use compiler::{compile, compile_expr, CompiledFormula, EvalContext, Reference, SheetResolver};
pub use dependency::DependencyGraph;
pub use error::FormulaError;
pub use evaluator::{recompute, CachedContext, Evaluator, FormulaSource, Recomputed, ValueCache};
pub use functions::{Arg, FunctionRegistry, FunctionSpec};
pub use lexer::{Lexer, Token};
pub use parser::{parse_formula, Parser};
pub use reference_shifter::{map_references, shift_formula, shift_reference, StructuralEdit};

