//! Expression engine for the selection strings of the configuration
//!
//! Cuts, trigger predicates and region windows are written as C-like
//! expressions over event store columns, e.g.
//! `BToKEE_fit_mass > 4.5 && !(abs(BToKEE_kl_mass - 1.865) < 0.05)`.
//! They are parsed once when the configuration is loaded, then bound to the
//! columns of each sample before evaluation.
//!
//! Supports arithmetic (+, -, *, /), comparisons (==, !=, <, <=, >, >=),
//! boolean operators (&&, ||, !), the `true`/`false` literals and the
//! functions abs, sqrt, log, exp, pow, min and max.

use crate::{
    error::{SampleError, SampleResult},
    numeric::Float,
    store::{Column, EventStore},
};

use thiserror::Error;

/// Syntax error in an expression string
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid expression '{text}': {reason}")]
pub struct ExprError {
    text: String,
    reason: String,
}

// ### SYNTAX TREE ###

#[derive(Debug, Clone)]
enum Expr {
    Number(Float),
    Var(usize), // index into CompiledExpr::columns
    Neg(Box<Expr>),
    Not(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}
//
impl Func {
    /// Look up a function by name, along with its arity
    fn lookup(name: &str) -> Option<(Self, usize)> {
        Some(match name {
            "abs" => (Func::Abs, 1),
            "sqrt" => (Func::Sqrt, 1),
            "log" => (Func::Log, 1),
            "exp" => (Func::Exp, 1),
            "pow" => (Func::Pow, 2),
            "min" => (Func::Min, 2),
            "max" => (Func::Max, 2),
            _ => return None,
        })
    }
}

// ### COMPILED AND BOUND EXPRESSIONS ###

/// A parsed expression, not yet attached to any event store
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    /// Source text, kept around for error messages
    text: String,

    /// Syntax tree
    ast: Expr,

    /// Columns referenced by the expression, in order of first occurrence
    columns: Vec<String>,
}
//
impl CompiledExpr {
    /// Parse an expression string
    pub fn compile(text: &str) -> Result<Self, ExprError> {
        let error = |reason: String| ExprError {
            text: text.to_owned(),
            reason,
        };
        let tokens = tokenize(text).map_err(error)?;
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_or().map_err(error)?;
        if let Some(extra) = parser.peek() {
            return Err(error(format!("unexpected trailing token {extra:?}")));
        }
        Ok(Self {
            text: text.to_owned(),
            ast,
            columns: parser.columns,
        })
    }

    /// The expression which accepts everything
    pub fn always_true() -> Self {
        Self {
            text: "1".to_owned(),
            ast: Expr::Number(1.),
            columns: Vec::new(),
        }
    }

    /// Source text of the expression
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Attach the expression to the numeric columns of an event store
    pub fn bind<'store>(&'store self, store: &'store EventStore) -> SampleResult<BoundExpr<'store>> {
        let columns = self
            .columns
            .iter()
            .map(|name| match store.column(name) {
                Some(Column::Numeric(values)) => Ok(&values[..]),
                Some(Column::Text(_)) => Err(SampleError::Config(format!(
                    "column '{name}' used by '{}' is not numeric",
                    self.text
                ))),
                None => Err(SampleError::Config(format!(
                    "column '{name}' used by '{}' is missing",
                    self.text
                ))),
            })
            .collect::<SampleResult<Vec<_>>>()?;
        Ok(BoundExpr {
            ast: &self.ast,
            columns,
        })
    }
}

/// An expression whose variables have been resolved to event store columns
#[derive(Clone)]
pub struct BoundExpr<'store> {
    ast: &'store Expr,
    columns: Vec<&'store [Float]>,
}
//
impl BoundExpr<'_> {
    /// Evaluate the expression for one row
    pub fn eval(&self, row: usize) -> Float {
        eval_expr(self.ast, &self.columns, row)
    }

    /// Evaluate the expression for one row, as a boolean
    pub fn holds(&self, row: usize) -> bool {
        truth(self.eval(row))
    }
}

// ### EVALUATION ###

/// Truthiness of a numerical value: non-zero and not NaN
fn truth(x: Float) -> bool {
    x != 0. && !x.is_nan()
}

fn from_bool(b: bool) -> Float {
    if b {
        1.
    } else {
        0.
    }
}

fn eval_expr(e: &Expr, columns: &[&[Float]], row: usize) -> Float {
    let eval = |e: &Expr| eval_expr(e, columns, row);
    match e {
        Expr::Number(x) => *x,
        Expr::Var(i) => columns[*i][row],
        Expr::Neg(a) => -eval(a),
        Expr::Not(a) => from_bool(!truth(eval(a))),
        // Boolean operators short-circuit
        Expr::BinOp(BinOp::And, a, b) => from_bool(truth(eval(a)) && truth(eval(b))),
        Expr::BinOp(BinOp::Or, a, b) => from_bool(truth(eval(a)) || truth(eval(b))),
        Expr::BinOp(op, a, b) => {
            let (lhs, rhs) = (eval(a), eval(b));
            match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div => lhs / rhs,
                BinOp::Eq => from_bool(lhs == rhs),
                BinOp::Ne => from_bool(lhs != rhs),
                BinOp::Lt => from_bool(lhs < rhs),
                BinOp::Le => from_bool(lhs <= rhs),
                BinOp::Gt => from_bool(lhs > rhs),
                BinOp::Ge => from_bool(lhs >= rhs),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
        Expr::Call(f, args) => {
            let a0 = || eval(&args[0]);
            let a1 = || eval(&args[1]);
            match f {
                Func::Abs => a0().abs(),
                Func::Sqrt => a0().sqrt(),
                Func::Log => a0().ln(),
                Func::Exp => a0().exp(),
                Func::Pow => a0().powf(a1()),
                Func::Min => a0().min(a1()),
                Func::Max => a0().max(a1()),
            }
        }
    }
}

// ### TOKENIZER ###

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Float),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        let two = match (c, chars.get(i + 1)) {
            ('&', Some('&')) => Some(Token::And),
            ('|', Some('|')) => Some(Token::Or),
            ('=', Some('=')) => Some(Token::Eq),
            ('!', Some('=')) => Some(Token::Ne),
            ('<', Some('=')) => Some(Token::Le),
            ('>', Some('=')) => Some(Token::Ge),
            _ => None,
        };
        if let Some(token) = two {
            tokens.push(token);
            i += 2;
            continue;
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Not),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || chars[i] == '.'
                    || chars[i] == 'e'
                    || chars[i] == 'E'
                    || ((chars[i] == '+' || chars[i] == '-')
                        && i > start
                        && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
            {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let x = s
                .parse::<Float>()
                .map_err(|_| format!("invalid number '{s}'"))?;
            tokens.push(Token::Num(x));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }

    Ok(tokens)
}

// ### PARSER (RECURSIVE DESCENT) ###

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    columns: Vec<String>,
}
//
impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            columns: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(format!("expected {expected:?}, got {other:?}")),
        }
    }

    fn resolve_var(&mut self, name: String) -> usize {
        match self.columns.iter().position(|c| *c == name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name);
                self.columns.len() - 1
            }
        }
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::BinOp(op, Box::new(lhs), Box::new(rhs))
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            lhs = Self::binary(BinOp::Or, lhs, self.parse_and()?);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            lhs = Self::binary(BinOp::And, lhs, self.parse_cmp()?);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Self::binary(op, lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            lhs = Self::binary(op, lhs, self.parse_mul()?);
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            lhs = Self::binary(op, lhs, self.parse_unary()?);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Not) => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Num(x)) => Ok(Expr::Number(x)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) if self.peek() == Some(&Token::LParen) => {
                let (func, arity) =
                    Func::lookup(&name).ok_or_else(|| format!("unknown function '{name}'"))?;
                self.advance();
                let mut args = vec![self.parse_or()?];
                while self.peek() == Some(&Token::Comma) {
                    self.advance();
                    args.push(self.parse_or()?);
                }
                self.expect(&Token::RParen)?;
                if args.len() != arity {
                    return Err(format!(
                        "function '{name}' takes {arity} argument(s), got {}",
                        args.len()
                    ));
                }
                Ok(Expr::Call(func, args))
            }
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Number(1.),
                "false" => Expr::Number(0.),
                _ => Expr::Var(self.resolve_var(name)),
            }),
            other => Err(format!("expected number, identifier or '(', got {other:?}")),
        }
    }
}
