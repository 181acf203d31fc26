//! Condition evaluation for `one-of` and `for-each`
//!
//! A condition is either a boolean or a self-contained expression string:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := arith (("==" | "!=" | "<" | "<=" | ">" | ">=") arith)*
//! arith      := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("-" | "+") unary | primary
//! primary    := NUMBER | STRING | "True" | "False" | "None" | "(" or_expr ")"
//! ```
//!
//! There are no variables: any other identifier is an error. Comparisons
//! chain (`1 < x < 3` means `1 < x and x < 3`), and `and`/`or` short-circuit
//! and yield one of their operands. The final result must be a boolean.

use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

/// Errors raised while parsing or evaluating a condition expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("name '{0}' is not defined")]
    UnboundName(String),

    #[error("unsupported operand types for {op}: {left} and {right}")]
    UnsupportedOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("bad operand type for unary {op}: {operand}")]
    UnsupportedOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result {0} is not a boolean")]
    NotBoolean(String),
}

impl From<ConditionError> for Error {
    fn from(e: ConditionError) -> Self {
        Error::condition(e.to_string())
    }
}

/// Evaluate a resolved condition.
///
/// Booleans pass through. Strings are evaluated as expressions, except the
/// bare literals `"True"` and `"False"`, which both evaluate to `false` for
/// compatibility with existing templates. Anything else is an error.
pub fn evaluate(condition: &Value) -> Result<bool> {
    match condition {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "True" || s == "False" => {
            log::debug!("Condition literal \"{}\" evaluates to false", s);
            Ok(false)
        }
        Value::String(s) => evaluate_expression(s).map_err(|e| {
            Error::from(e).with_path(format!("condition \"{}\"", s))
        }),
        other => Err(Error::condition(format!(
            "Invalid condition type {}",
            other.type_name()
        ))),
    }
}

/// Parse and evaluate an expression string to a boolean
pub fn evaluate_expression(expr: &str) -> std::result::Result<bool, ConditionError> {
    let tokens = Lexer::new(expr).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        skipping: false,
    };
    let result = parser.or_expr()?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(ConditionError::UnexpectedToken(token.to_string()));
    }
    match result {
        Operand::Bool(b) => Ok(b),
        other => Err(ConditionError::NotBoolean(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "'{}'", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Name(n) => write!(f, "'{}'", n),
            Token::Op(op) => write!(f, "'{}'", op),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

/// Operators, longest first so `<=` wins over `<`
const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%"];

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn current(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<Token>, ConditionError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else if c.is_ascii_digit() || (c == '.' && self.next_is_digit()) {
                tokens.push(self.number()?);
            } else if c == '\'' || c == '"' {
                tokens.push(self.string(c)?);
            } else if c.is_alphabetic() || c == '_' {
                tokens.push(Token::Name(self.identifier()));
            } else if c == '(' {
                self.advance();
                tokens.push(Token::LParen);
            } else if c == ')' {
                self.advance();
                tokens.push(Token::RParen);
            } else if let Some(op) = OPERATORS
                .iter()
                .find(|op| self.input[self.pos..].starts_with(**op))
            {
                self.pos += op.len();
                tokens.push(Token::Op(op));
            } else {
                return Err(ConditionError::UnexpectedChar {
                    ch: c,
                    offset: self.pos,
                });
            }
        }

        Ok(tokens)
    }

    fn next_is_digit(&self) -> bool {
        self.input[self.pos..]
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn number(&mut self) -> std::result::Result<Token, ConditionError> {
        let start = self.pos;
        while let Some(c) = self.current() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.input[..self.pos].chars().last(), Some('e' | 'E'));
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.replace('_', "")
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Token::Number)
            .ok_or_else(|| ConditionError::InvalidNumber(text.to_string()))
    }

    fn string(&mut self, quote: char) -> std::result::Result<Token, ConditionError> {
        let start = self.pos;
        self.advance();
        let mut result = String::new();
        loop {
            match self.current() {
                None => return Err(ConditionError::UnterminatedString(start)),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::Str(result));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some(c) => result.push(c),
                        None => return Err(ConditionError::UnterminatedString(start)),
                    }
                    self.advance();
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Operand {
    fn type_name(&self) -> &'static str {
        match self {
            Operand::None => "NoneType",
            Operand::Bool(_) => "bool",
            Operand::Number(_) => "number",
            Operand::Str(_) => "str",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Operand::None => false,
            Operand::Bool(b) => *b,
            Operand::Number(n) => *n != 0.0,
            Operand::Str(s) => !s.is_empty(),
        }
    }

    /// Booleans take part in arithmetic as 0 and 1
    fn numeric(&self) -> Option<f64> {
        match self {
            Operand::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Operand::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => write!(f, "None"),
            Operand::Bool(true) => write!(f, "True"),
            Operand::Bool(false) => write!(f, "False"),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Parses and evaluates in one pass.
///
/// While `skipping` is set, operands are parsed but not evaluated, so the
/// right side of a settled `and`/`or` or comparison chain cannot fail at
/// run time. Syntax errors are still reported.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    skipping: bool,
}

type ParseResult = std::result::Result<Operand, ConditionError>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_name(&mut self, name: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == name) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn with_skip(&mut self, skip: bool, parse: fn(&mut Self) -> ParseResult) -> ParseResult {
        let saved = self.skipping;
        self.skipping |= skip;
        let result = parse(self);
        self.skipping = saved;
        result
    }

    fn or_expr(&mut self) -> ParseResult {
        let mut left = self.and_expr()?;
        while self.eat_name("or") {
            let settled = left.truthy();
            let right = self.with_skip(settled, Self::and_expr)?;
            if !settled {
                left = right;
            }
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult {
        let mut left = self.not_expr()?;
        while self.eat_name("and") {
            let settled = !left.truthy();
            let right = self.with_skip(settled, Self::not_expr)?;
            if !settled {
                left = right;
            }
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ParseResult {
        if self.eat_name("not") {
            let operand = self.not_expr()?;
            return Ok(Operand::Bool(!operand.truthy()));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult {
        let mut left = self.arith()?;
        let mut result: Option<bool> = None;

        while let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            let settled = result == Some(false);
            let right = self.with_skip(settled, Self::arith)?;
            if !settled && !self.skipping {
                result = Some(compare(op, &left, &right)?);
            }
            left = right;
        }

        Ok(match result {
            Some(b) => Operand::Bool(b),
            None => left,
        })
    }

    fn arith(&mut self) -> ParseResult {
        let mut left = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.term()?;
            left = if self.skipping {
                Operand::None
            } else {
                binary(op, left, right)?
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> ParseResult {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let right = self.unary()?;
            left = if self.skipping {
                Operand::None
            } else {
                binary(op, left, right)?
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult {
        if let Some(op) = self.eat_op(&["-", "+"]) {
            let operand = self.unary()?;
            if self.skipping {
                return Ok(Operand::None);
            }
            let n = operand
                .numeric()
                .ok_or(ConditionError::UnsupportedOperand {
                    op,
                    operand: operand.type_name(),
                })?;
            return Ok(Operand::Number(if op == "-" { -n } else { n }));
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult {
        match self.next() {
            Some(Token::Number(n)) => Ok(Operand::Number(n)),
            Some(Token::Str(s)) => Ok(Operand::Str(s)),
            Some(Token::Name(name)) => match name.as_str() {
                "True" => Ok(Operand::Bool(true)),
                "False" => Ok(Operand::Bool(false)),
                "None" => Ok(Operand::None),
                _ if self.skipping => Ok(Operand::None),
                _ => Err(ConditionError::UnboundName(name)),
            },
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ConditionError::UnexpectedToken(other.to_string())),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ConditionError::UnexpectedToken(other.to_string())),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

fn compare(op: &'static str, left: &Operand, right: &Operand) -> std::result::Result<bool, ConditionError> {
    let ordering = match (left, right) {
        (Operand::Str(a), Operand::Str(b)) => Some(a.cmp(b)),
        _ => match (left.numeric(), right.numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match op {
        "==" => Ok(equals(left, right)),
        "!=" => Ok(!equals(left, right)),
        _ => {
            let ordering = ordering.ok_or(ConditionError::UnsupportedOperands {
                op,
                left: left.type_name(),
                right: right.type_name(),
            })?;
            Ok(match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn equals(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::None, Operand::None) => true,
        (Operand::Str(a), Operand::Str(b)) => a == b,
        _ => match (left.numeric(), right.numeric()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn binary(op: &'static str, left: Operand, right: Operand) -> ParseResult {
    if op == "+" {
        if let (Operand::Str(a), Operand::Str(b)) = (&left, &right) {
            return Ok(Operand::Str(format!("{}{}", a, b)));
        }
    }

    let (Some(a), Some(b)) = (left.numeric(), right.numeric()) else {
        return Err(ConditionError::UnsupportedOperands {
            op,
            left: left.type_name(),
            right: right.type_name(),
        });
    };

    let n = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" if b == 0.0 => return Err(ConditionError::DivisionByZero),
        "/" => a / b,
        "%" if b == 0.0 => return Err(ConditionError::DivisionByZero),
        // Result takes the sign of the divisor
        _ => a - b * (a / b).floor(),
    };
    Ok(Operand::Number(n))
}
