use crate::ast::{BinaryOp, CellRef, Expr, RefExpr, UnaryOp};
use crate::error::FormulaError;
use crate::lexer::{Lexer, Spanned, Token};
use cellsync_core::col_from_label;

/// Tokenize and parse formula text (without the leading `=`)
pub fn parse_formula(text: &str) -> Result<Expr, FormulaError> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser::new(tokens).parse()
}

/// Deepest nesting of parentheses, calls and operator chains accepted
const MAX_DEPTH: usize = 64;

/// Parser for formula expressions
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// Parse the token stream into an AST
    pub fn parse(&mut self) -> Result<Expr, FormulaError> {
        if self.is_at_end() {
            return Err(self.error("empty formula"));
        }

        let expr = self.parse_expression()?;

        if !self.is_at_end() {
            return Err(self.error(format!("unexpected token {:?}", self.peek())));
        }

        Ok(expr)
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|s| &s.token)
            .unwrap_or(&Token::EOF)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.position + ahead)
            .map(|s| &s.token)
            .unwrap_or(&Token::EOF)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|s| s.offset)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.position += 1;
        }
        token
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn error(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::bad(message, self.offset())
    }

    fn consume(&mut self, expected: Token, message: &str) -> Result<(), FormulaError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("{}, got {:?}", message, self.peek())))
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr, FormulaError>) -> Result<Expr, FormulaError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("formula is nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Parse expression with operator precedence
    fn parse_expression(&mut self) -> Result<Expr, FormulaError> {
        self.nested(Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_concat()?;

        loop {
            let op = match self.peek() {
                Token::Equal => BinaryOp::Eq,
                Token::NotEqual => BinaryOp::Ne,
                Token::LessThan => BinaryOp::Lt,
                Token::GreaterThan => BinaryOp::Gt,
                Token::LessEqual => BinaryOp::Le,
                Token::GreaterEqual => BinaryOp::Ge,
                _ => break,
            };

            self.advance();
            let right = self.parse_concat()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;

        while matches!(self.peek(), Token::Concat) {
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(left, BinaryOp::Concat, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_power()?;

        loop {
            let op = match self.peek() {
                Token::Multiply => BinaryOp::Mul,
                Token::Divide => BinaryOp::Div,
                _ => break,
            };

            self.advance();
            let right = self.parse_power()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, FormulaError> {
        let left = self.parse_unary()?;

        if matches!(self.peek(), Token::Power) {
            self.advance();
            // Power is right-associative
            let right = self.nested(Self::parse_power)?;
            Ok(Expr::binary(left, BinaryOp::Pow, right))
        } else {
            Ok(left)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                let operand = self.nested(Self::parse_unary)?;
                Ok(Expr::unary(UnaryOp::Neg, operand))
            }
            Token::Plus => {
                self.advance();
                let operand = self.nested(Self::parse_unary)?;
                Ok(Expr::unary(UnaryOp::Pos, operand))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.parse_primary()?;

        while matches!(self.peek(), Token::Percent) {
            self.advance();
            expr = Expr::unary(UnaryOp::Percent, expr);
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let offset = self.offset();
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::String(s) => Ok(Expr::String(s)),
            Token::Boolean(b) => Ok(Expr::Boolean(b)),
            Token::Error(e) => Ok(Expr::Error(e)),
            // LOG10( and friends lex as references
            Token::CellRef(name) if *self.peek() == Token::LeftParen && !name.contains('$') => {
                self.parse_function_call(name)
            }
            Token::CellRef(ref_str) => self.parse_reference(None, &ref_str, offset),
            Token::SheetName(sheet) => {
                self.consume(Token::Exclaim, "expected '!' after sheet name")?;
                let offset = self.offset();
                match self.advance() {
                    Token::CellRef(ref_str) => self.parse_reference(Some(sheet), &ref_str, offset),
                    other => Err(FormulaError::bad(
                        format!("expected cell reference after '{}!', got {:?}", sheet, other),
                        offset,
                    )),
                }
            }
            Token::Identifier(name) => {
                if matches!(self.peek(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Err(FormulaError::bad(format!("unexpected identifier {}", name), offset))
                }
            }
            Token::LeftParen => {
                let expr = self.parse_expression()?;
                self.consume(Token::RightParen, "expected ')'")?;
                Ok(Expr::Grouped(Box::new(expr)))
            }
            Token::EOF => Err(FormulaError::bad("unexpected end of formula", offset)),
            other => Err(FormulaError::bad(format!("unexpected token {:?}", other), offset)),
        }
    }

    fn parse_reference(
        &mut self,
        sheet: Option<String>,
        ref_str: &str,
        offset: usize,
    ) -> Result<Expr, FormulaError> {
        let start = parse_cell_reference(ref_str).ok_or_else(|| {
            FormulaError::bad(format!("invalid cell reference {}", ref_str), offset)
        })?;

        // Check for range operator
        let end = if matches!(self.peek(), Token::Colon) {
            self.advance();
            let offset = self.offset();
            match self.advance() {
                Token::CellRef(end_ref) => Some(parse_cell_reference(&end_ref).ok_or_else(|| {
                    FormulaError::bad(format!("invalid cell reference {}", end_ref), offset)
                })?),
                _ => return Err(FormulaError::bad("expected cell reference after ':'", offset)),
            }
        } else {
            None
        };

        Ok(Expr::Reference(RefExpr { sheet, start, end }))
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr, FormulaError> {
        self.consume(Token::LeftParen, "expected '(' after function name")?;

        let mut args = Vec::new();

        if !matches!(self.peek(), Token::RightParen) {
            loop {
                args.push(self.parse_expression()?);

                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::RightParen => break,
                    other => {
                        return Err(self.error(format!(
                            "expected ',' or ')' in call to {}, got {:?}",
                            name, other
                        )))
                    }
                }
            }
        }

        self.consume(Token::RightParen, "expected ')' after function arguments")?;

        Ok(Expr::FunctionCall { name, args })
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.position + 1)
    }
}

/// Parse a cell reference string (e.g., "A1", "$B$2")
fn parse_cell_reference(ref_str: &str) -> Option<CellRef> {
    let (abs_col, rest) = match ref_str.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, ref_str),
    };

    let letters = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let (col_str, rest) = rest.split_at(letters);

    let (abs_row, row_str) = match rest.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    let col = col_from_label(col_str)?;
    let row: u32 = row_str.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some(CellRef {
        col,
        row: row - 1, // Convert to 0-indexed
        abs_col,
        abs_row,
    })
}
