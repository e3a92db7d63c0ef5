use cellsync_core::{CellError, CellValue};

use super::{flatten, Arg, FunctionSpec};

pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::new("IF", 1, Some(3), if_fn),
    FunctionSpec::new("AND", 1, None, and),
    FunctionSpec::new("OR", 1, None, or),
    FunctionSpec::new("NOT", 1, Some(1), not),
    FunctionSpec::new("IFERROR", 2, Some(2), iferror),
];

fn passthrough(arg: &Arg) -> Result<CellValue, CellError> {
    arg.scalar().cloned()
}

/// IF - Conditional evaluation
pub fn if_fn(args: &[Arg]) -> Result<CellValue, CellError> {
    let condition = match args[0].scalar()? {
        CellValue::Text(_) => return Err(CellError::InvalidValue),
        value => value.as_boolean().ok_or(CellError::InvalidValue)?,
    };

    if condition {
        // Return true value (or TRUE if not provided)
        args.get(1).map_or(Ok(CellValue::Boolean(true)), passthrough)
    } else {
        // Return false value (or FALSE if not provided)
        args.get(2).map_or(Ok(CellValue::Boolean(false)), passthrough)
    }
}

/// Truth values of every argument. Empty cells are skipped, text is rejected.
fn truths(args: &[Arg]) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for (value, _) in flatten(args) {
        match value {
            CellValue::Error(e) => return Err(*e),
            CellValue::Empty => {}
            CellValue::Text(_) => return Err(CellError::InvalidValue),
            other => out.push(other.as_boolean().ok_or(CellError::InvalidValue)?),
        }
    }
    Ok(out)
}

/// AND - Logical AND of all values
pub fn and(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Boolean(truths(args)?.into_iter().all(|b| b)))
}

/// OR - Logical OR of all values
pub fn or(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Boolean(truths(args)?.into_iter().any(|b| b)))
}

/// NOT - Logical NOT
pub fn not(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Boolean(!args[0].boolean()?))
}

/// IFERROR - First argument unless it is an error
pub fn iferror(args: &[Arg]) -> Result<CellValue, CellError> {
    match &args[0] {
        Arg::Value(CellValue::Error(_)) => passthrough(&args[1]),
        Arg::Value(value) => Ok(value.clone()),
        Arg::Range(_) => Err(CellError::InvalidValue),
    }
}
