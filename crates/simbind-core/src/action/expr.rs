// Simbind Value Expressions
// Small arithmetic/conditional language for offset write values

use std::fmt;

/// Errors from parsing or evaluating a value expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("Invalid value expression '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,
}

/// Comparison operator shared by `if()` expressions and output comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }

    /// Parse an operator symbol (`=`, `==`, `!=`, `<>`, `<`, `<=`, `>`, `>=`)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "=" | "==" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(i64),
    Current,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    If {
        lhs: Box<Expr>,
        op: CompareOp,
        rhs: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Current,
    If,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Cmp(CompareOp),
}

/// A parsed value expression together with its source text.
///
/// `$` stands for the current contents of the target offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueExpr {
    source: String,
    expr: Expr,
}

impl ValueExpr {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let fail = |reason: &str| ExprError::Parse {
            input: source.to_string(),
            reason: reason.to_string(),
        };
        let tokens = tokenize(source).map_err(|reason| fail(&reason))?;
        if tokens.is_empty() {
            return Err(fail("empty expression"));
        }
        let expr = ExprParser::new(tokens)
            .parse()
            .map_err(|reason| fail(&reason))?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// A constant expression
    pub fn constant(value: i64) -> Self {
        Self {
            source: value.to_string(),
            expr: Expr::Literal(value),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether evaluation needs the current offset contents
    pub fn reads_current(&self) -> bool {
        fn walk(expr: &Expr) -> bool {
            match expr {
                Expr::Literal(_) => false,
                Expr::Current => true,
                Expr::Neg(inner) => walk(inner),
                Expr::Binary(_, l, r) => walk(l) || walk(r),
                Expr::If {
                    lhs,
                    rhs,
                    then,
                    otherwise,
                    ..
                } => walk(lhs) || walk(rhs) || walk(then) || walk(otherwise),
            }
        }
        walk(&self.expr)
    }

    pub fn eval(&self, current: i64) -> Result<i64, ExprError> {
        eval(&self.expr, current)
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, current: i64) -> Result<i64, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(*v),
        Expr::Current => Ok(current),
        Expr::Neg(inner) => eval(inner, current)?
            .checked_neg()
            .ok_or(ExprError::Overflow),
        Expr::Binary(op, l, r) => {
            let l = eval(l, current)?;
            let r = eval(r, current)?;
            match op {
                BinOp::Add => l.checked_add(r).ok_or(ExprError::Overflow),
                BinOp::Sub => l.checked_sub(r).ok_or(ExprError::Overflow),
                BinOp::Mul => l.checked_mul(r).ok_or(ExprError::Overflow),
                BinOp::Div => {
                    if r == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    l.checked_div(r).ok_or(ExprError::Overflow)
                }
            }
        }
        Expr::If {
            lhs,
            op,
            rhs,
            then,
            otherwise,
        } => {
            if op.holds(eval(lhs, current)?, eval(rhs, current)?) {
                eval(then, current)
            } else {
                eval(otherwise, current)
            }
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        match ch {
            '(' => out.push(Token::LParen),
            ')' => out.push(Token::RParen),
            ',' => out.push(Token::Comma),
            '+' => out.push(Token::Plus),
            '-' => out.push(Token::Minus),
            '*' => out.push(Token::Star),
            '/' => out.push(Token::Slash),
            '$' => out.push(Token::Current),
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                out.push(Token::Cmp(CompareOp::Eq));
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err("expected '=' after '!'".to_string());
                }
                i += 1;
                out.push(Token::Cmp(CompareOp::Ne));
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    i += 1;
                    out.push(Token::Cmp(CompareOp::Le));
                }
                Some('>') => {
                    i += 1;
                    out.push(Token::Cmp(CompareOp::Ne));
                }
                _ => out.push(Token::Cmp(CompareOp::Lt)),
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    out.push(Token::Cmp(CompareOp::Ge));
                } else {
                    out.push(Token::Cmp(CompareOp::Gt));
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push(Token::Number(parse_number(&word)?));
                continue;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.eq_ignore_ascii_case("if") {
                    out.push(Token::If);
                } else {
                    return Err(format!("unknown identifier '{}'", word));
                }
                continue;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
        i += 1;
    }

    Ok(out)
}

fn parse_number(word: &str) -> Result<i64, String> {
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => word.parse::<i64>(),
    };
    parsed.map_err(|_| format!("invalid number '{}'", word))
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<Expr, String> {
        let expr = self.parse_sum()?;
        if let Some(token) = self.peek() {
            return Err(format!("unexpected {:?}", token));
        }
        Ok(expr)
    }

    fn parse_sum(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.next();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.next();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Literal(v)),
            Some(Token::Current) => Ok(Expr::Current),
            Some(Token::LParen) => {
                let expr = self.parse_sum()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::If) => self.parse_if(),
            Some(other) => Err(format!("unexpected {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, String> {
        self.expect(Token::LParen)?;
        let lhs = self.parse_sum()?;
        let op = match self.next() {
            Some(Token::Cmp(op)) => op,
            _ => return Err("expected comparison in if()".to_string()),
        };
        let rhs = self.parse_sum()?;
        self.expect(Token::Comma)?;
        let then = self.parse_sum()?;
        self.expect(Token::Comma)?;
        let otherwise = self.parse_sum()?;
        self.expect(Token::RParen)?;
        Ok(Expr::If {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}", expected)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}
