use cellsync_core::{CellError, CellValue};

use super::{finite, flatten, numbers, Arg, FunctionSpec};

pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::new("SUM", 1, None, sum),
    FunctionSpec::new("AVERAGE", 1, None, average),
    FunctionSpec::new("COUNT", 1, None, count),
    FunctionSpec::new("COUNTA", 1, None, counta),
    FunctionSpec::new("MIN", 1, None, min),
    FunctionSpec::new("MAX", 1, None, max),
    FunctionSpec::new("PRODUCT", 1, None, product),
    FunctionSpec::new("ABS", 1, Some(1), abs),
    FunctionSpec::new("ROUND", 1, Some(2), round),
    FunctionSpec::new("FLOOR", 1, Some(2), floor),
    FunctionSpec::new("CEILING", 1, Some(2), ceiling),
    FunctionSpec::new("SQRT", 1, Some(1), sqrt),
    FunctionSpec::new("POWER", 2, Some(2), power),
    FunctionSpec::new("MOD", 2, Some(2), modulo),
];

/// SUM - Sum all numeric values
pub fn sum(args: &[Arg]) -> Result<CellValue, CellError> {
    finite(numbers(args)?.iter().sum())
}

/// AVERAGE - Average of numeric values
pub fn average(args: &[Arg]) -> Result<CellValue, CellError> {
    let values = numbers(args)?;
    if values.is_empty() {
        return Err(CellError::DivisionByZero);
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// COUNT - Count numeric values
pub fn count(args: &[Arg]) -> Result<CellValue, CellError> {
    let count = flatten(args)
        .into_iter()
        .filter(|(v, _)| matches!(v, CellValue::Number(_)))
        .count();

    Ok(CellValue::Number(count as f64))
}

/// COUNTA - Count non-empty values
pub fn counta(args: &[Arg]) -> Result<CellValue, CellError> {
    let count = flatten(args)
        .into_iter()
        .filter(|(v, _)| !v.is_empty())
        .count();

    Ok(CellValue::Number(count as f64))
}

/// MIN - Minimum numeric value, 0 when there is none
pub fn min(args: &[Arg]) -> Result<CellValue, CellError> {
    let result = numbers(args)?.into_iter().reduce(f64::min);
    Ok(CellValue::Number(result.unwrap_or(0.0)))
}

/// MAX - Maximum numeric value, 0 when there is none
pub fn max(args: &[Arg]) -> Result<CellValue, CellError> {
    let result = numbers(args)?.into_iter().reduce(f64::max);
    Ok(CellValue::Number(result.unwrap_or(0.0)))
}

pub fn product(args: &[Arg]) -> Result<CellValue, CellError> {
    let values = numbers(args)?;
    if values.is_empty() {
        return Ok(CellValue::Number(0.0));
    }
    finite(values.iter().product())
}

/// ABS - Absolute value
pub fn abs(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Number(args[0].number()?.abs()))
}

fn optional_number(args: &[Arg], index: usize, default: f64) -> Result<f64, CellError> {
    match args.get(index) {
        Some(arg) => arg.number(),
        None => Ok(default),
    }
}

/// ROUND - Round half away from zero to the given number of decimals
pub fn round(args: &[Arg]) -> Result<CellValue, CellError> {
    let num = args[0].number()?;
    let decimals = optional_number(args, 1, 0.0)?.trunc() as i32;

    if decimals >= 0 {
        let factor = 10_f64.powi(decimals);
        finite((num * factor).round() / factor)
    } else {
        let factor = 10_f64.powi(-decimals);
        finite((num / factor).round() * factor)
    }
}

fn significance(args: &[Arg]) -> Result<f64, CellError> {
    let significance = optional_number(args, 1, 1.0)?;
    if significance == 0.0 {
        return Err(CellError::DivisionByZero);
    }
    Ok(significance)
}

/// FLOOR - Round down to a multiple of the significance
pub fn floor(args: &[Arg]) -> Result<CellValue, CellError> {
    let num = args[0].number()?;
    let significance = significance(args)?;
    finite((num / significance).floor() * significance)
}

/// CEILING - Round up to a multiple of the significance
pub fn ceiling(args: &[Arg]) -> Result<CellValue, CellError> {
    let num = args[0].number()?;
    let significance = significance(args)?;
    finite((num / significance).ceil() * significance)
}

/// SQRT - Square root
pub fn sqrt(args: &[Arg]) -> Result<CellValue, CellError> {
    let n = args[0].number()?;
    if n < 0.0 {
        return Err(CellError::NumError);
    }
    Ok(CellValue::Number(n.sqrt()))
}

/// POWER - Raise to power
pub fn power(args: &[Arg]) -> Result<CellValue, CellError> {
    let base = args[0].number()?;
    let exp = args[1].number()?;
    if base == 0.0 && exp < 0.0 {
        return Err(CellError::DivisionByZero);
    }
    finite(base.powf(exp))
}

/// MOD - Remainder with the sign of the divisor
pub fn modulo(args: &[Arg]) -> Result<CellValue, CellError> {
    let n = args[0].number()?;
    let d = args[1].number()?;
    if d == 0.0 {
        return Err(CellError::DivisionByZero);
    }
    finite(n - d * (n / d).floor())
}
