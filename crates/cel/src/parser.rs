//! Recursive descent parser.
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, relations (`==` `!=` `<`
//! `<=` `>` `>=` `in`), `+` `-`, unary `!` `-`, member access and calls.

use std::ops::Range;

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::lexer::{tokenize, Tok};
use crate::SyntaxError;

/// Nesting limit; keeps hostile input from exhausting the stack.
const MAX_DEPTH: usize = 64;

pub fn parse(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0, end: source.len() };
    if parser.tokens.is_empty() {
        return Err(SyntaxError { offset: 0, message: "empty expression".into() });
    }
    let expr = parser.expr()?;
    if let Some((tok, span)) = parser.tokens.get(parser.pos) {
        return Err(SyntaxError { offset: span.start, message: format!("unexpected {}", tok.describe()) });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Tok, Range<usize>)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, s)| s.start).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, want: &Tok) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError { offset: self.offset(), message: message.into() }
    }

    fn expect(&mut self, want: Tok, what: &str) -> Result<(), SyntaxError> {
        if self.eat(&want) {
            return Ok(());
        }
        let found = self.peek().map(Tok::describe).unwrap_or_else(|| "end of input".into());
        Err(self.error(format!("expected {what}, found {found}")))
    }

    /// One more level of tree height; fails past `MAX_DEPTH`.
    fn deepen(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn nested(&mut self, f: fn(&mut Self) -> Result<Expr, SyntaxError>) -> Result<Expr, SyntaxError> {
        self.deepen()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::ternary)
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.or()?;
        if !self.eat(&Tok::Question) {
            return Ok(cond);
        }
        let then = self.or()?;
        self.expect(Tok::Colon, "':'")?;
        let otherwise = self.expr()?;
        Ok(Expr::Ternary { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) })
    }

    // Operator and member loops build left-leaning chains; every link
    // counts against the depth budget until the loop returns.

    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Tok::OrOr) {
            self.deepen()?;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut lhs = self.relation()?;
        while self.eat(&Tok::AndAnd) {
            self.deepen()?;
            let rhs = self.relation()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::EqEq) => BinaryOp::Eq,
                Some(Tok::Ne) => BinaryOp::Ne,
                Some(Tok::Lt) => BinaryOp::Lt,
                Some(Tok::Le) => BinaryOp::Le,
                Some(Tok::Gt) => BinaryOp::Gt,
                Some(Tok::Ge) => BinaryOp::Ge,
                Some(Tok::In) => BinaryOp::In,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Tok::Bang) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        if self.eat(&Tok::Minus) {
            return match self.peek() {
                Some(Tok::Int(n)) => {
                    let n = *n;
                    let value = 0i64
                        .checked_sub_unsigned(n)
                        .ok_or_else(|| self.error(format!("integer literal -{n} out of range")))?;
                    self.pos += 1;
                    Ok(Expr::Lit(Literal::Int(value)))
                }
                Some(Tok::Float(f)) => {
                    let f = *f;
                    self.pos += 1;
                    Ok(Expr::Lit(Literal::Double(-f)))
                }
                _ => {
                    let operand = self.nested(Self::unary)?;
                    Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) })
                }
            };
        }
        self.member()
    }

    fn member(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                self.deepen()?;
                let field = match self.bump() {
                    Some(Tok::Ident(name)) => name,
                    _ => return Err(self.error("expected field name after '.'")),
                };
                if self.eat(&Tok::LParen) {
                    let args = self.args(Tok::RParen)?;
                    expr = Expr::Call { target: Some(Box::new(expr)), function: field, args };
                } else {
                    expr = Expr::Select { operand: Box::new(expr), field };
                }
            } else if self.eat(&Tok::LBracket) {
                self.deepen()?;
                let index = self.expr()?;
                self.expect(Tok::RBracket, "']'")?;
                expr = Expr::Index { operand: Box::new(expr), index: Box::new(index) };
            } else {
                self.depth = base;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.offset();
        let tok = match self.bump() {
            Some(tok) => tok,
            None => return Err(self.error("unexpected end of input")),
        };
        match tok {
            Tok::Null => Ok(Expr::Lit(Literal::Null)),
            Tok::True => Ok(Expr::Lit(Literal::Bool(true))),
            Tok::False => Ok(Expr::Lit(Literal::Bool(false))),
            Tok::Int(n) => i64::try_from(n)
                .map(|n| Expr::Lit(Literal::Int(n)))
                .map_err(|_| SyntaxError { offset: start, message: format!("integer literal {n} out of range") }),
            Tok::Float(f) => Ok(Expr::Lit(Literal::Double(f))),
            Tok::Str(s) => Ok(Expr::Lit(Literal::Str(s))),
            Tok::Ident(name) => {
                if !self.eat(&Tok::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let mut args = self.args(Tok::RParen)?;
                match name.as_str() {
                    "has" => match (args.pop(), args.is_empty()) {
                        (Some(Expr::Select { operand, field }), true) => Ok(Expr::Has { operand, field }),
                        _ => Err(SyntaxError {
                            offset: start,
                            message: "has() requires a single field selection argument".into(),
                        }),
                    },
                    "size" => match (args.pop(), args.is_empty()) {
                        (Some(arg), true) => {
                            Ok(Expr::Call { target: Some(Box::new(arg)), function: name, args: Vec::new() })
                        }
                        _ => Err(SyntaxError { offset: start, message: "size() takes exactly one argument".into() }),
                    },
                    _ => Ok(Expr::Call { target: None, function: name, args }),
                }
            }
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBracket => Ok(Expr::List(self.args(Tok::RBracket)?)),
            other => Err(SyntaxError { offset: start, message: format!("unexpected {}", other.describe()) }),
        }
    }

    /// Comma separated expressions up to `close`; a trailing comma is allowed.
    fn args(&mut self, close: Tok) -> Result<Vec<Expr>, SyntaxError> {
        let mut out = Vec::new();
        if self.eat(&close) {
            return Ok(out);
        }
        loop {
            out.push(self.expr()?);
            if self.eat(&close) {
                return Ok(out);
            }
            self.expect(Tok::Comma, "',' or closing delimiter")?;
            if self.eat(&close) {
                return Ok(out);
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}
