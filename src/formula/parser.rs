//! Formula parser using Pratt parsing (precedence climbing).
//!
//! ## Precedence Levels (lowest to highest)
//!
//! 1. `a if cond else b` (Conditional) - right associative
//! 2. `<`, `<=`, `>`, `>=`, `==`, `!=` (Comparison) - non-associative
//! 3. `+`, `-` (Addition) - left associative
//! 4. `*`, `/`, `%` (Multiplication) - left associative
//! 5. Unary `-`, `+` - prefix
//! 6. `**`, `^` (Power) - right associative
//! 7. Calls to allow-listed functions
//!
//! Security checks are structural: a formula containing a rejected construct
//! never produces an `Expr`, so there is nothing to evaluate.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::error::FormulaError;
use crate::money::Money;

use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::functions::{Constant, Function};
use super::lexer::{tokenize, Token};
use super::SandboxConfig;

/// Names that would give access to the host environment in a general
/// purpose language; rejected outright
pub const FORBIDDEN_NAMES: [&str; 31] = [
    "import", "from", "lambda", "def", "class", "for", "while", "exec", "eval", "global",
    "nonlocal", "with", "yield", "return", "del", "assert", "async", "await", "open", "compile",
    "getattr", "setattr", "delattr", "globals", "locals", "vars", "dir", "type", "object",
    "breakpoint", "input",
];

/// Boolean operators the grammar does not support
pub const BOOLEAN_WORDS: [&str; 5] = ["and", "or", "not", "in", "is"];

const UNARY_PREC: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Arith(BinaryOp),
    Compare(CompareOp),
}

fn binary_op_info(token: &Token) -> Option<(u8, Assoc, Op)> {
    match token {
        Token::Lt => Some((10, Assoc::Left, Op::Compare(CompareOp::Lt))),
        Token::LtEq => Some((10, Assoc::Left, Op::Compare(CompareOp::Le))),
        Token::Gt => Some((10, Assoc::Left, Op::Compare(CompareOp::Gt))),
        Token::GtEq => Some((10, Assoc::Left, Op::Compare(CompareOp::Ge))),
        Token::EqEq => Some((10, Assoc::Left, Op::Compare(CompareOp::Eq))),
        Token::BangEq => Some((10, Assoc::Left, Op::Compare(CompareOp::Ne))),
        Token::Plus => Some((20, Assoc::Left, Op::Arith(BinaryOp::Add))),
        Token::Minus => Some((20, Assoc::Left, Op::Arith(BinaryOp::Sub))),
        Token::Star => Some((30, Assoc::Left, Op::Arith(BinaryOp::Mul))),
        Token::Slash => Some((30, Assoc::Left, Op::Arith(BinaryOp::Div))),
        Token::Percent => Some((30, Assoc::Left, Op::Arith(BinaryOp::Rem))),
        Token::StarStar | Token::Caret => Some((50, Assoc::Right, Op::Arith(BinaryOp::Pow))),
        _ => None,
    }
}

/// Hint for tokens that never belong in a formula
fn rejected_token_hint(token: &Token) -> Option<&'static str> {
    match token {
        Token::Dot => Some("attribute access is not permitted"),
        Token::LBracket | Token::RBracket => Some("subscripts and list literals are not permitted"),
        Token::LBrace | Token::RBrace => Some("dictionary and set literals are not permitted"),
        Token::Assign => Some("assignment is not permitted"),
        Token::Colon | Token::Semicolon => Some("statements are not permitted"),
        Token::At => Some("decorators are not permitted"),
        Token::StringLiteral => Some("string literals are not permitted"),
        _ => None,
    }
}

fn rejected_name_hint(name: &str) -> Option<String> {
    if name.starts_with("__") {
        return Some(format!("'{}': double-underscore names are not permitted", name));
    }
    if FORBIDDEN_NAMES.contains(&name) {
        return Some(format!("'{}' is not permitted in formulas", name));
    }
    None
}

/// Parse formula text into an expression tree
///
/// `declared` is the set of variable names the formula may reference.
pub fn parse(
    source: &str,
    declared: &BTreeSet<String>,
    config: &SandboxConfig,
) -> Result<Expr, FormulaError> {
    if source.len() > config.max_formula_length {
        return Err(FormulaError::security(
            source,
            None,
            format!(
                "formula exceeds the maximum length of {} characters",
                config.max_formula_length
            ),
        ));
    }
    if source.trim().is_empty() {
        return Err(FormulaError::syntax(source, None, "formula is empty"));
    }

    let tokens = tokenize(source)?;

    // Reject disallowed constructs anywhere in the text before looking at
    // the grammar, so a security problem is never masked by a syntax one
    for (token, span) in &tokens {
        if let Some(hint) = rejected_token_hint(token) {
            return Err(FormulaError::security(source, Some(span.start), hint));
        }
        if let Token::Ident(name) = token {
            if let Some(hint) = rejected_name_hint(name) {
                return Err(FormulaError::security(source, Some(span.start), hint));
            }
        }
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
        declared,
        config,
    };
    let expr = parser.parse_expression()?;

    if let Some((token, span)) = parser.tokens.get(parser.pos) {
        return Err(FormulaError::syntax(
            source,
            Some(span.start),
            format!("unexpected {} after the end of the expression", token),
        ));
    }

    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    depth: usize,
    declared: &'a BTreeSet<String>,
    config: &'a SandboxConfig,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    /// Byte offset of the current token (end of input when exhausted)
    fn current_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Option<(Token, Range<usize>)> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<(), FormulaError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(FormulaError::syntax(
                self.source,
                Some(self.current_start()),
                format!("expected {} {}, found {}", expected, context, token),
            )),
            None => Err(FormulaError::syntax(
                self.source,
                Some(self.source.len()),
                format!("expected {} {}, found end of formula", expected, context),
            )),
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(FormulaError::syntax(
                self.source,
                Some(self.current_start()),
                format!("formula nests deeper than {} levels", self.config.max_depth),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// expression := pratt ('if' pratt 'else' expression)?
    fn parse_expression(&mut self) -> Result<Expr, FormulaError> {
        let then = self.parse_pratt(0)?;

        let expr = if matches!(self.peek(), Some(Token::If)) {
            self.advance();
            let condition = self.parse_pratt(0)?;
            self.expect(Token::Else, "to complete the conditional")?;
            let otherwise = self.parse_expression()?;
            Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            then
        };

        Ok(expr)
    }

    fn parse_pratt(&mut self, min_prec: u8) -> Result<Expr, FormulaError> {
        self.enter()?;
        let mut left = self.parse_prefix()?;
        let mut compared = false;

        while let Some(token) = self.peek() {
            let Some((prec, assoc, op)) = binary_op_info(token) else {
                break;
            };
            if prec < min_prec {
                break;
            }

            let position = self.current_start();
            self.advance();

            let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
            let right = self.parse_pratt(next_prec)?;

            left = match op {
                Op::Arith(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    position,
                },
                // A parenthesised comparison on the left starts a new chain
                Op::Compare(op) => match left {
                    Expr::Compare { first, mut rest } if compared => {
                        rest.push((op, right));
                        Expr::Compare { first, rest }
                    }
                    other => {
                        compared = true;
                        Expr::Compare {
                            first: Box::new(other),
                            rest: vec![(op, right)],
                        }
                    }
                },
            };
        }

        self.leave();
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_pratt(UNARY_PREC)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, FormulaError> {
        let expr = self.parse_atom()?;
        if matches!(self.peek(), Some(Token::LParen)) {
            return Err(FormulaError::security(
                self.source,
                Some(self.current_start()),
                "only allow-listed functions can be called, and only by name",
            ));
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, FormulaError> {
        let Some((token, span)) = self.advance() else {
            return Err(FormulaError::syntax(
                self.source,
                Some(self.source.len()),
                "unexpected end of formula",
            ));
        };

        match token {
            Token::Number(text) => Money::parse(&text).map(Expr::Literal).map_err(|_| {
                FormulaError::syntax(
                    self.source,
                    Some(span.start),
                    format!("invalid number '{}'", text),
                )
            }),
            Token::Ident(name) => self.parse_name(name, span.start),
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "to close the parenthesis")?;
                Ok(inner)
            }
            other => Err(FormulaError::syntax(
                self.source,
                Some(span.start),
                format!("unexpected {}", other),
            )),
        }
    }

    fn parse_name(&mut self, name: String, position: usize) -> Result<Expr, FormulaError> {
        if BOOLEAN_WORDS.contains(&name.as_str()) {
            return Err(FormulaError::syntax(
                self.source,
                Some(position),
                format!(
                    "'{}' is not supported; use a conditional expression (a if condition else b)",
                    name
                ),
            ));
        }

        if matches!(self.peek(), Some(Token::LParen)) {
            let function = Function::lookup(&name).ok_or_else(|| {
                FormulaError::security(
                    self.source,
                    Some(position),
                    format!("function '{}' is not allowed", name),
                )
            })?;
            if function.is_trig() && !self.config.enable_trig {
                return Err(FormulaError::security(
                    self.source,
                    Some(position),
                    format!("function '{}' is not enabled", name),
                ));
            }

            let args = self.parse_call_args()?;
            if !function.accepts(args.len()) {
                return Err(FormulaError::syntax(
                    self.source,
                    Some(position),
                    function.arity_hint(),
                ));
            }
            return Ok(Expr::Call {
                function,
                args,
                position,
            });
        }

        if let Some(constant) = Constant::lookup(&name) {
            return Ok(Expr::Constant(constant));
        }
        if self.declared.contains(&name) {
            return Ok(Expr::Variable { name, position });
        }
        if Function::lookup(&name).is_some() {
            return Err(FormulaError::syntax(
                self.source,
                Some(position),
                format!("function '{}' must be called with arguments", name),
            ));
        }

        Err(FormulaError::security(
            self.source,
            Some(position),
            format!("variable '{}' not defined for this component", name),
        ))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, FormulaError> {
        self.expect(Token::LParen, "to start the argument list")?;

        let mut args = Vec::new();
        while !matches!(self.peek(), Some(Token::RParen)) {
            args.push(self.parse_expression()?);

            if !matches!(self.peek(), Some(Token::RParen)) {
                self.expect(Token::Comma, "between arguments")?;
            }
        }

        self.expect(Token::RParen, "to close the argument list")?;
        Ok(args)
    }
}
