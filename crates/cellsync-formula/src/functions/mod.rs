//! Built-in functions and the registry formulas resolve names against.
//!
//! A function receives its arguments already evaluated. Scalar arguments
//! that failed to evaluate arrive as `CellValue::Error`, which lets
//! `IFERROR` observe them; every other function propagates the first
//! error it meets. Range arguments arrive as a flat row-major list.

pub mod logical;
pub mod math;
pub mod text;

use std::collections::HashMap;
use std::fmt;

use cellsync_core::{CellError, CellValue};

/// One evaluated function argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(CellValue),
    Range(Vec<CellValue>),
}

impl Arg {
    /// The argument as a single value. Ranges are not scalars.
    pub fn scalar(&self) -> Result<&CellValue, CellError> {
        match self {
            Arg::Value(CellValue::Error(e)) => Err(*e),
            Arg::Value(v) => Ok(v),
            Arg::Range(_) => Err(CellError::InvalidValue),
        }
    }

    pub fn number(&self) -> Result<f64, CellError> {
        self.scalar()?.as_number().ok_or(CellError::InvalidValue)
    }

    pub fn text(&self) -> Result<String, CellError> {
        Ok(self.scalar()?.as_text())
    }

    pub fn boolean(&self) -> Result<bool, CellError> {
        self.scalar()?.as_boolean().ok_or(CellError::InvalidValue)
    }
}

/// Built-in implementation: evaluated arguments in, value or error out
pub type Compute = fn(&[Arg]) -> Result<CellValue, CellError>;

/// Name, arity and behaviour of a function
#[derive(Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub compute: Compute,
}

impl FunctionSpec {
    pub const fn new(name: &'static str, min_args: usize, max_args: Option<usize>, compute: Compute) -> Self {
        FunctionSpec {
            name,
            min_args,
            max_args,
            compute,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human readable arity, e.g. `1..=2` or `1..`
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..={}", self.min_args, max),
            None => format!("{}..", self.min_args),
        }
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("arity", &self.arity())
            .finish()
    }
}

/// Name -> function table injected into the compiler
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for spec in math::FUNCTIONS
            .iter()
            .chain(logical::FUNCTIONS)
            .chain(text::FUNCTIONS)
        {
            registry.register(*spec);
        }
        registry
    }

    /// Add or replace a function. Names are case-insensitive.
    pub fn register(&mut self, spec: FunctionSpec) {
        self.functions.insert(spec.name.to_ascii_uppercase(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Every value of every argument, ranges flattened. The flag marks values
/// that came from a range.
pub(crate) fn flatten(args: &[Arg]) -> Vec<(&CellValue, bool)> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Arg::Value(v) => out.push((v, false)),
            Arg::Range(values) => out.extend(values.iter().map(|v| (v, true))),
        }
    }
    out
}

/// Numbers taking part in an aggregate. Values from ranges count only when
/// numeric; direct arguments are coerced and fail on non-numeric text.
pub(crate) fn numbers(args: &[Arg]) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for (value, from_range) in flatten(args) {
        match value {
            CellValue::Error(e) => return Err(*e),
            CellValue::Number(n) => out.push(*n),
            _ if from_range => {}
            other => out.push(other.as_number().ok_or(CellError::InvalidValue)?),
        }
    }
    Ok(out)
}

/// Reject NaN and infinities as `#NUM!`
pub(crate) fn finite(n: f64) -> Result<CellValue, CellError> {
    if n.is_finite() {
        Ok(CellValue::Number(n))
    } else {
        Err(CellError::NumError)
    }
}
