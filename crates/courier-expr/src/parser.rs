//! Recursive-descent parser
//!
//! Precedence from lowest to highest:
//! assignment < conditional < `??` < `||` < `&&` < equality < comparison
//! < additive < multiplicative < unary < postfix < primary

use crate::ast::{BinaryOp, Expr, Program, UnaryOp};
use crate::lexer::{tokenize, Spanned, Token};
use crate::ExprError;
use serde_json::{Number, Value};

/// Parse a single expression
///
/// # Errors
/// Returns [`ExprError`] on lexing or syntax errors, or trailing input.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens, source.len());
    parser.skip_separators();
    let expr = parser.parse_expr()?;
    parser.skip_separators();
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a script: expressions separated by `;` or newlines
///
/// # Errors
/// Returns [`ExprError`] on lexing or syntax errors.
pub fn parse_program(source: &str) -> Result<Program, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens, source.len());
    let mut statements = Vec::new();

    parser.skip_separators();
    while !parser.at_end() {
        statements.push(parser.parse_expr()?);
        if !parser.at_end() && !parser.at_separator() {
            return Err(parser.error("expected `;` or newline between statements"));
        }
        parser.skip_separators();
    }

    Ok(Program { statements })
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    nesting: usize,
    len: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            len,
        }
    }

    // -------------------------------------------------------------------------
    // Token access
    // -------------------------------------------------------------------------

    /// Current token; newlines are insignificant inside delimiters
    fn current(&mut self) -> Option<&'a Token> {
        if self.nesting > 0 {
            while matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Newline) {
                self.pos += 1;
            }
        }
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.current();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.current() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn at_end(&mut self) -> bool {
        self.current().is_none()
    }

    fn at_separator(&mut self) -> bool {
        matches!(self.current(), Some(Token::Semicolon | Token::Newline))
    }

    fn skip_separators(&mut self) {
        while self.at_separator() {
            self.pos += 1;
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |t| t.span.start)
    }

    fn error(&self, message: &str) -> ExprError {
        self.error_at(self.offset(), message)
    }

    fn error_at(&self, offset: usize, message: &str) -> ExprError {
        ExprError::Parse {
            offset,
            message: message.to_string(),
        }
    }

    /// Start of the token just consumed
    fn previous_offset(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|at| self.tokens.get(at))
            .map_or(self.len, |t| t.span.start)
    }

    fn open(&mut self) {
        self.nesting += 1;
    }

    fn close(&mut self) {
        self.nesting -= 1;
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ExprError> {
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (
            self.current(),
            self.tokens.get(self.pos + 1).map(|t| &t.token),
        ) {
            self.pos += 2;
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign {
                name: name.clone(),
                value: Box::new(value),
            });
        }
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_binary(0)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        self.open();
        let then = self.parse_assignment()?;
        self.expect(&Token::Colon, "`:` in conditional")?;
        self.close();
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, ExprError> {
        if level == LEVEL_COUNT {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        loop {
            let Some(op) = self.current().and_then(|t| binary_op(t, level)) else {
                break;
            };
            self.pos += 1;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.current() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let Some(Token::Ident(property)) = self.advance() else {
                        return Err(self.error("expected property name after `.`"));
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: property.clone(),
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.open();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "`]`")?;
                    self.close();
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.parse_list(&Token::RParen, "`)`")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let Some(token) = self.advance() else {
            return Err(self.error("unexpected end of expression"));
        };
        match token {
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Number(text) => match parse_number(text) {
                Some(number) => Ok(Expr::Literal(Value::Number(number))),
                None => Err(self.error_at(self.previous_offset(), &format!("invalid number `{text}`"))),
            },
            Token::Str(text) if courier_pattern::is_templated(text) => {
                Ok(Expr::Interpolation(text.clone()))
            }
            Token::Str(text) => Ok(Expr::Literal(Value::String(text.clone()))),
            Token::Ident(name) => Ok(Expr::Ident(name.clone())),
            Token::LParen => {
                self.open();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                self.close();
                Ok(expr)
            }
            Token::LBracket => Ok(Expr::Array(self.parse_list(&Token::RBracket, "`]`")?)),
            Token::LBrace => self.parse_object(),
            _ => {
                self.pos -= 1;
                Err(self.error("unexpected token"))
            }
        }
    }

    /// Comma-separated expressions up to `close`; the opener is consumed
    fn parse_list(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>, ExprError> {
        self.open();
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        self.close();
        Ok(items)
    }

    fn parse_object(&mut self) -> Result<Expr, ExprError> {
        self.open();
        let mut fields = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.advance() {
                Some(Token::Ident(name) | Token::Str(name) | Token::Number(name)) => name.clone(),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected object key"));
                }
            };
            let value = if self.eat(&Token::Colon) {
                self.parse_expr()?
            } else {
                Expr::Ident(key.clone())
            };
            fields.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "`}`")?;
                break;
            }
        }
        self.close();
        Ok(Expr::Object(fields))
    }
}

const LEVEL_COUNT: usize = 7;

fn binary_op(token: &Token, level: usize) -> Option<BinaryOp> {
    let op = match (level, token) {
        (0, Token::Coalesce) => BinaryOp::Coalesce,
        (1, Token::OrOr) => BinaryOp::Or,
        (2, Token::AndAnd) => BinaryOp::And,
        (3, Token::EqEq) => BinaryOp::Eq,
        (3, Token::NotEq) => BinaryOp::NotEq,
        (4, Token::Lt) => BinaryOp::Lt,
        (4, Token::LtEq) => BinaryOp::LtEq,
        (4, Token::Gt) => BinaryOp::Gt,
        (4, Token::GtEq) => BinaryOp::GtEq,
        (5, Token::Plus) => BinaryOp::Add,
        (5, Token::Minus) => BinaryOp::Sub,
        (6, Token::Star) => BinaryOp::Mul,
        (6, Token::Slash) => BinaryOp::Div,
        (6, Token::Percent) => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

fn parse_number(text: &str) -> Option<Number> {
    text.parse::<Number>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    #[test]
    fn precedence() {
        let expr = parse_expression("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: ident("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: ident("b"),
                    right: ident("c"),
                }),
            }
        );
    }

    #[test]
    fn member_and_call() {
        let expr = parse_expression("upper(user.name)").unwrap();
        assert_eq!(expr.call_name(), Some("upper"));
        assert_eq!(expr.free_identifiers(), vec!["user".to_string()]);
    }

    #[test]
    fn object_literal_with_shorthand() {
        let expr = parse_expression("{ a: 1, b }").unwrap();
        let Expr::Object(fields) = expr else {
            panic!("expected object");
        };
        assert_eq!(fields[1], ("b".to_string(), Expr::Ident("b".to_string())));
    }

    #[test]
    fn multiline_object() {
        let expr = parse_expression("json({\n  a: 1,\n  b: 'x'\n})").unwrap();
        assert_eq!(expr.call_name(), Some("json"));
    }

    #[test]
    fn program_statements() {
        let program = parse_program("x = x + 1\ny = x * 2; z = 'k'").unwrap();
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.free_identifiers(), vec!["x".to_string()]);
    }

    #[test]
    fn conditional() {
        let expr = parse_expression("ok ? 'yes' : 'no'").unwrap();
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn interpolated_string() {
        let expr = parse_expression("'Bearer {{token}}'").unwrap();
        assert_eq!(expr, Expr::Interpolation("Bearer {{token}}".to_string()));
        assert_eq!(expr.free_identifiers(), vec!["token".to_string()]);
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(matches!(parse_expression("a b"), Err(ExprError::Parse { .. })));
    }

    #[test]
    fn number_literals() {
        assert_eq!(parse_expression("12").unwrap(), Expr::Literal(json!(12)));
        assert_eq!(parse_number("007").and_then(|n| n.as_f64()), Some(7.0));
        assert_eq!(parse_number("1.2.3"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn missing_separator_in_program() {
        assert!(parse_program("a = 1 b = 2").is_err());
    }
}
