//! Content sniffing for raw cell input.
//!
//! Decides whether typed text is a formula, a number, a boolean or plain text.
//! The numeric rule is driven by a [`NumberPolicy`] so separators and percent
//! handling can be tuned per locale without touching the formula lexer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::CellContent;

/// Marker that turns raw content into a formula
pub const FORMULA_MARKER: char = '=';

/// Coercion rules applied when classifying raw content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberPolicy {
    /// Digit grouping mark, e.g. `1,000`. Groups must be exactly three digits.
    pub thousands_separator: Option<char>,
    pub decimal_separator: char,
    /// `50%` reads as `0.5`
    pub allow_percent: bool,
    pub allow_exponent: bool,
    /// `TRUE`/`FALSE` in any case become booleans
    pub recognize_booleans: bool,
}

impl Default for NumberPolicy {
    fn default() -> Self {
        NumberPolicy {
            thousands_separator: Some(','),
            decimal_separator: '.',
            allow_percent: true,
            allow_exponent: true,
            recognize_booleans: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("separator '{0}' cannot be a digit, sign or percent mark")]
    InvalidSeparator(char),

    #[error("thousands and decimal separators must differ")]
    AmbiguousSeparators,

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Compiled form of a [`NumberPolicy`]
#[derive(Debug, Clone)]
pub struct NumberSniffer {
    policy: NumberPolicy,
    pattern: Regex,
}

impl NumberSniffer {
    pub fn new(policy: NumberPolicy) -> Result<Self, PolicyError> {
        let mut separators = vec![policy.decimal_separator];
        separators.extend(policy.thousands_separator);
        for sep in &separators {
            if sep.is_ascii_digit() || matches!(sep, '-' | '+' | '%' | 'e' | 'E') {
                return Err(PolicyError::InvalidSeparator(*sep));
            }
        }
        if policy.thousands_separator == Some(policy.decimal_separator) {
            return Err(PolicyError::AmbiguousSeparators);
        }

        let decimal = regex::escape(&policy.decimal_separator.to_string());
        let integer = match policy.thousands_separator {
            Some(t) => format!(r"(?:\d{{1,3}}(?:{}\d{{3}})+|\d+)", regex::escape(&t.to_string())),
            None => r"\d+".to_string(),
        };
        let exponent = if policy.allow_exponent { r"(?:[eE][-+]?\d+)?" } else { "" };
        let percent = if policy.allow_percent { "%?" } else { "" };
        let pattern = format!(
            r"^[-+]?(?:{integer}(?:{decimal}\d*)?|{decimal}\d+){exponent}{percent}$"
        );

        Ok(NumberSniffer {
            policy,
            pattern: Regex::new(&pattern)?,
        })
    }

    pub fn policy(&self) -> &NumberPolicy {
        &self.policy
    }

    /// Parse `input` as a number if it matches the strict numeric pattern
    pub fn parse_number(&self, input: &str) -> Option<f64> {
        let input = input.trim();
        if !self.pattern.is_match(input) {
            return None;
        }

        let (body, scale) = match input.strip_suffix('%') {
            Some(body) => (body, 0.01),
            None => (input, 1.0),
        };
        let normalized: String = body
            .chars()
            .filter(|c| Some(*c) != self.policy.thousands_separator)
            .map(|c| if c == self.policy.decimal_separator { '.' } else { c })
            .collect();
        normalized.parse::<f64>().ok().map(|n| n * scale)
    }

    /// Classify raw content typed into a cell
    pub fn classify(&self, raw: &str) -> CellContent {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellContent::Empty;
        }
        if let Some(formula) = trimmed.strip_prefix(FORMULA_MARKER) {
            return CellContent::Formula(formula.to_string());
        }
        if let Some(n) = self.parse_number(trimmed) {
            return CellContent::Number(n);
        }
        if self.policy.recognize_booleans {
            if trimmed.eq_ignore_ascii_case("TRUE") {
                return CellContent::Boolean(true);
            }
            if trimmed.eq_ignore_ascii_case("FALSE") {
                return CellContent::Boolean(false);
            }
        }
        CellContent::Text(trimmed.to_string())
    }
}
