use cellsync_core::{CellError, CellValue};

use super::{flatten, Arg, FunctionSpec};

pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::new("CONCAT", 1, None, concat),
    FunctionSpec::new("CONCATENATE", 1, None, concat),
    FunctionSpec::new("LEN", 1, Some(1), len),
    FunctionSpec::new("UPPER", 1, Some(1), upper),
    FunctionSpec::new("LOWER", 1, Some(1), lower),
    FunctionSpec::new("TRIM", 1, Some(1), trim),
    FunctionSpec::new("LEFT", 1, Some(2), left),
    FunctionSpec::new("RIGHT", 1, Some(2), right),
    FunctionSpec::new("MID", 3, Some(3), mid),
];

/// CONCAT / CONCATENATE - Concatenate strings
pub fn concat(args: &[Arg]) -> Result<CellValue, CellError> {
    let mut result = String::new();

    for (value, _) in flatten(args) {
        match value {
            CellValue::Error(e) => return Err(*e),
            _ => result.push_str(&value.as_text()),
        }
    }

    Ok(CellValue::Text(result))
}

/// LEN - Length of text in characters
pub fn len(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Number(args[0].text()?.chars().count() as f64))
}

/// UPPER - Convert to uppercase
pub fn upper(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Text(args[0].text()?.to_uppercase()))
}

/// LOWER - Convert to lowercase
pub fn lower(args: &[Arg]) -> Result<CellValue, CellError> {
    Ok(CellValue::Text(args[0].text()?.to_lowercase()))
}

/// TRIM - Remove surrounding whitespace and collapse inner runs
pub fn trim(args: &[Arg]) -> Result<CellValue, CellError> {
    let text = args[0].text()?;
    Ok(CellValue::Text(text.split_whitespace().collect::<Vec<_>>().join(" ")))
}

/// Non-negative character count argument
fn char_count(args: &[Arg], index: usize) -> Result<usize, CellError> {
    match args.get(index) {
        Some(arg) => {
            let n = arg.number()?;
            if n < 0.0 {
                return Err(CellError::InvalidValue);
            }
            Ok(n as usize)
        }
        None => Ok(1),
    }
}

/// LEFT - Extract leftmost characters
pub fn left(args: &[Arg]) -> Result<CellValue, CellError> {
    let text = args[0].text()?;
    let num_chars = char_count(args, 1)?;
    Ok(CellValue::Text(text.chars().take(num_chars).collect()))
}

/// RIGHT - Extract rightmost characters
pub fn right(args: &[Arg]) -> Result<CellValue, CellError> {
    let text = args[0].text()?;
    let num_chars = char_count(args, 1)?;

    let skip = text.chars().count().saturating_sub(num_chars);
    Ok(CellValue::Text(text.chars().skip(skip).collect()))
}

/// MID - Extract middle characters, 1-indexed start
pub fn mid(args: &[Arg]) -> Result<CellValue, CellError> {
    let text = args[0].text()?;

    let start = args[1].number()?;
    if start < 1.0 {
        return Err(CellError::InvalidValue);
    }
    let num_chars = char_count(args, 2)?;

    let result: String = text.chars().skip(start as usize - 1).take(num_chars).collect();
    Ok(CellValue::Text(result))
}
