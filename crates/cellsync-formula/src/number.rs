//! Lexical rule for numeric literals inside formulas.
//!
//! Kept apart from the tokenizer so that nothing else (currency symbols,
//! percent signs, locale formatting) can leak into how numbers are read.
//! A literal is digits with optional `,` thousands groups of exactly three
//! digits, an optional fraction and an optional exponent.

use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{not, opt, recognize},
    multi::many1,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// `1,234,567` but not `1,2345` or `12,34`
fn grouped_integer(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while_m_n(1, 3, is_digit),
        many1(terminated(
            preceded(char(','), take_while_m_n(3, 3, is_digit)),
            not(satisfy(is_digit)),
        )),
    ))(input)
}

fn integer(input: &str, allow_grouping: bool) -> IResult<&str, &str> {
    if allow_grouping {
        alt((grouped_integer, digit1))(input)
    } else {
        digit1(input)
    }
}

fn mantissa(input: &str, allow_grouping: bool) -> IResult<&str, &str> {
    alt((
        recognize(pair(
            |i| integer(i, allow_grouping),
            opt(pair(char('.'), digit0)),
        )),
        recognize(pair(char('.'), digit1)),
    ))(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

/// Recognise a numeric literal at the start of `input`.
///
/// Thousands groups are only accepted when `allow_grouping` is set; the
/// tokenizer clears it inside function-call argument lists where `,`
/// separates arguments.
pub fn number_literal(input: &str, allow_grouping: bool) -> IResult<&str, f64> {
    let (rest, text) = recognize(pair(|i| mantissa(i, allow_grouping), opt(exponent)))(input)?;
    let digits: String = text.chars().filter(|c| *c != ',').collect();
    match digits.parse::<f64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}
