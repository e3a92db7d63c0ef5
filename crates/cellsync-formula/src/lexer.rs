use cellsync_core::CellError;

use crate::error::FormulaError;
use crate::number::number_literal;

/// Token types for formula parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // References
    CellRef(String),   // A1, B2, $A$1, etc.
    SheetName(String), // Sheet2 or 'My Sheet', always followed by `!`

    // Operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,   // ^
    Percent, // %
    Concat,  // &

    // Comparison
    Equal,        // =
    NotEqual,     // <>
    LessThan,     // <
    GreaterThan,  // >
    LessEqual,    // <=
    GreaterEqual, // >=

    // Delimiters
    LeftParen,
    RightParen,
    Comma,
    Colon,
    Exclaim,

    // Identifier (function names)
    Identifier(String),

    EOF,
}

/// A token and the byte offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Lexer for tokenizing formula expressions
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    /// One entry per open parenthesis; `true` when it opened a function call
    frames: Vec<bool>,
    last: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            frames: Vec::new(),
            last: None,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, FormulaError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let offset = self.position;
            let token = self.next_token()?;
            let done = token == Token::EOF;
            self.last = Some(token.clone());
            tokens.push(Spanned { token, offset });
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.position += rest.len() - trimmed.len();
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn single(&mut self, token: Token) -> Result<Token, FormulaError> {
        self.advance();
        Ok(token)
    }

    fn error(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::bad(message, self.position)
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::EOF),
        };

        match c {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Multiply),
            '/' => self.single(Token::Divide),
            '^' => self.single(Token::Power),
            '%' => self.single(Token::Percent),
            '&' => self.single(Token::Concat),
            '=' => self.single(Token::Equal),
            '<' => {
                self.advance();
                match self.peek() {
                    Some('>') => self.single(Token::NotEqual),
                    Some('=') => self.single(Token::LessEqual),
                    _ => Ok(Token::LessThan),
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.single(Token::GreaterEqual)
                } else {
                    Ok(Token::GreaterThan)
                }
            }
            '(' => {
                let call = matches!(self.last, Some(Token::Identifier(_)) | Some(Token::CellRef(_)));
                self.frames.push(call);
                self.single(Token::LeftParen)
            }
            ')' => {
                self.frames.pop();
                self.single(Token::RightParen)
            }
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '!' => self.single(Token::Exclaim),
            '"' => self.read_string(),
            '\'' => self.read_quoted_sheet(),
            '#' => self.read_error_literal(),
            '0'..='9' | '.' => self.read_number(),
            'A'..='Z' | 'a'..='z' | '_' | '$' => self.read_identifier_or_ref(),
            _ => Err(self.error(format!("unexpected character '{}'", c))),
        }
    }

    fn read_string(&mut self) -> Result<Token, FormulaError> {
        self.advance(); // opening quote
        let mut s = String::new();

        while let Some(c) = self.advance() {
            if c == '"' {
                if self.peek() == Some('"') {
                    s.push('"');
                    self.advance();
                } else {
                    return Ok(Token::String(s));
                }
            } else {
                s.push(c);
            }
        }

        Err(self.error("unterminated string"))
    }

    fn read_quoted_sheet(&mut self) -> Result<Token, FormulaError> {
        self.advance(); // opening quote
        let mut name = String::new();

        loop {
            match self.advance() {
                Some('\'') if self.peek() == Some('\'') => {
                    name.push('\'');
                    self.advance();
                }
                Some('\'') => break,
                Some(c) => name.push(c),
                None => return Err(self.error("unterminated sheet name")),
            }
        }

        if name.is_empty() || self.peek() != Some('!') {
            return Err(self.error("quoted sheet name must be followed by '!'"));
        }
        Ok(Token::SheetName(name))
    }

    fn read_error_literal(&mut self) -> Result<Token, FormulaError> {
        let start = self.position;
        self.advance(); // '#'
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '/' || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('!') | Some('?')) {
            self.advance();
        }

        let code = &self.input[start..self.position];
        CellError::from_code(code)
            .map(Token::Error)
            .ok_or_else(|| FormulaError::bad(format!("unknown error literal {}", code), start))
    }

    fn read_number(&mut self) -> Result<Token, FormulaError> {
        let allow_grouping = self.frames.last() != Some(&true);
        match number_literal(self.rest(), allow_grouping) {
            Ok((rest, n)) => {
                self.position = self.input.len() - rest.len();
                Ok(Token::Number(n))
            }
            Err(_) => Err(self.error("invalid number")),
        }
    }

    fn read_identifier_or_ref(&mut self) -> Result<Token, FormulaError> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        let raw = &self.input[start..self.position];

        if self.peek() == Some('!') && !raw.contains('$') {
            return Ok(Token::SheetName(raw.to_string()));
        }

        let s = raw.to_ascii_uppercase();
        match s.as_str() {
            "TRUE" => return Ok(Token::Boolean(true)),
            "FALSE" => return Ok(Token::Boolean(false)),
            _ => {}
        }

        if is_cell_reference(&s) {
            Ok(Token::CellRef(s))
        } else if s.contains('$') {
            Err(FormulaError::bad(format!("invalid reference {}", raw), start))
        } else {
            Ok(Token::Identifier(s))
        }
    }
}

/// Check if a string is an A1-style reference, optionally with `$` markers
pub fn is_cell_reference(s: &str) -> bool {
    let s = s.strip_prefix('$').unwrap_or(s);
    let letters = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if letters == 0 || letters > 3 {
        return false;
    }
    let rest = &s[letters..];
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            tokens("1 + 2 * 3"),
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.0),
                Token::Multiply,
                Token::Number(3.0),
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_cell_references() {
        assert_eq!(
            tokens("a1 + B2 + $C$3"),
            vec![
                Token::CellRef("A1".to_string()),
                Token::Plus,
                Token::CellRef("B2".to_string()),
                Token::Plus,
                Token::CellRef("$C$3".to_string()),
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            tokens("SUM(A1:A10)"),
            vec![
                Token::Identifier("SUM".to_string()),
                Token::LeftParen,
                Token::CellRef("A1".to_string()),
                Token::Colon,
                Token::CellRef("A10".to_string()),
                Token::RightParen,
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_sheet_names() {
        assert_eq!(
            tokens("Sheet2!A1 + 'My ''Q'' Sheet'!B2"),
            vec![
                Token::SheetName("Sheet2".to_string()),
                Token::Exclaim,
                Token::CellRef("A1".to_string()),
                Token::Plus,
                Token::SheetName("My 'Q' Sheet".to_string()),
                Token::Exclaim,
                Token::CellRef("B2".to_string()),
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_thousands_outside_calls_only() {
        assert_eq!(
            tokens("1,000+1"),
            vec![Token::Number(1000.0), Token::Plus, Token::Number(1.0), Token::EOF]
        );
        assert_eq!(
            tokens("MAX(1,000)"),
            vec![
                Token::Identifier("MAX".to_string()),
                Token::LeftParen,
                Token::Number(1.0),
                Token::Comma,
                Token::Number(0.0),
                Token::RightParen,
                Token::EOF,
            ]
        );
        assert_eq!(tokens("(2,500)")[1], Token::Number(2500.0));
    }

    #[test]
    fn test_error_literals() {
        assert_eq!(
            tokens("#REF!+#DIV/0!"),
            vec![
                Token::Error(CellError::InvalidReference),
                Token::Plus,
                Token::Error(CellError::DivisionByZero),
                Token::EOF,
            ]
        );
        assert!(Lexer::new("#WHAT").tokenize().is_err());
    }

    #[test]
    fn test_bad_input() {
        assert!(Lexer::new("\"open").tokenize().is_err());
        assert!(Lexer::new("1 @ 2").tokenize().is_err());
        assert!(Lexer::new("'Sheet").tokenize().is_err());
    }
}
