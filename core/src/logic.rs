//! Condition language used by `$if` guards.
//!
//! Expressions are parsed once into a [`Rule`] tree and then evaluated
//! against a [`Context`] (usually a [`DeviceId`](crate::DeviceId)).
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ("||" and)*
//! and        := unary ("&&" unary)*
//! unary      := "!" unary | primary
//! primary    := "(" or ")" | comparison
//! comparison := operand (["ver"] op operand)?
//! op         := "<" | "<=" | ">" | ">=" | "===" | "!=="
//! operand    := identifier | number | 0xHEX | X.Y[.Z] | "string" | true | false
//! ```
//!
//! A comparison against a dotted version literal (or one prefixed with the
//! `ver` keyword) compares semantically after padding `X.Y` to `X.Y.0`.
//! Comparisons never fail: an undefined variable or a type mismatch makes
//! that comparison `false`.
//!
//! # Examples
//!
//! ```
//! use device_config_core::{DeviceId, logic};
//!
//! let id = DeviceId::new(0x0086, 0x0002, 0x0064).with_firmware("1.5");
//! let result = logic::evaluate("firmwareVersion > 1.0 && productId === 0x64", &id).unwrap();
//! assert!(result.is_truthy());
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{ConfigError, Result};
use crate::version::{compare_versions, is_version};

/// A value produced by evaluating a rule or looking up a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicValue {
    /// Undefined variable.
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl LogicValue {
    /// JavaScript-like truthiness: `false`, `0`, `NaN`, `""` and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            LogicValue::Null => false,
            LogicValue::Bool(b) => *b,
            LogicValue::Number(n) => *n != 0.0 && !n.is_nan(),
            LogicValue::String(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            LogicValue::Number(n) => Some(*n),
            LogicValue::String(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    fn as_version_text(&self) -> Option<String> {
        match self {
            LogicValue::String(s) => Some(s.clone()),
            LogicValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(format!("{}.0", *n as u64)),
            LogicValue::Number(n) if *n >= 0.0 => Some(n.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for LogicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicValue::Null => f.write_str("null"),
            LogicValue::Bool(b) => write!(f, "{b}"),
            LogicValue::Number(n) => write!(f, "{n}"),
            LogicValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Variable source for rule evaluation.
pub trait Context {
    /// Returns the value bound to `name`, or `None` when undefined.
    fn get(&self, name: &str) -> Option<LogicValue>;
}

impl Context for HashMap<String, LogicValue> {
    fn get(&self, name: &str) -> Option<LogicValue> {
        HashMap::get(self, name).cloned()
    }
}

impl Context for BTreeMap<String, LogicValue> {
    fn get(&self, name: &str) -> Option<LogicValue> {
        BTreeMap::get(self, name).cloned()
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Eq => "===",
            CompareOp::Ne => "!==",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Variable reference resolved against the context.
    Var(String),
    /// Dotted version literal such as `1.0` or `2.3.1`.
    Version(String),
    /// Any other literal.
    Literal(LogicValue),
}

impl Operand {
    fn resolve(&self, ctx: &dyn Context) -> LogicValue {
        match self {
            Operand::Var(name) => ctx.get(name).unwrap_or(LogicValue::Null),
            Operand::Version(v) => LogicValue::String(v.clone()),
            Operand::Literal(value) => value.clone(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(name) => f.write_str(name),
            Operand::Version(v) => f.write_str(v),
            Operand::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// Parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Compare {
        op: CompareOp,
        /// Compare as padded semantic versions (`ver <`, `ver >=`, ...).
        version: bool,
        left: Operand,
        right: Operand,
    },
    /// A bare operand; evaluates to its own value.
    Value(Operand),
}

impl Rule {
    /// Parses an expression into a rule tree.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the expression does not match
    /// the grammar.
    pub fn parse(expression: &str) -> Result<Self> {
        let tokens = tokenize(expression)
            .map_err(|reason| invalid_expression(expression, &reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let rule = parser
            .parse_or()
            .map_err(|reason| invalid_expression(expression, &reason))?;
        if let Some(token) = parser.peek() {
            return Err(invalid_expression(
                expression,
                &format!("unexpected {token}"),
            ));
        }
        Ok(rule)
    }

    /// Evaluates the rule. Never fails.
    pub fn evaluate(&self, ctx: &dyn Context) -> LogicValue {
        match self {
            Rule::And(rules) => LogicValue::Bool(rules.iter().all(|r| r.matches(ctx))),
            Rule::Or(rules) => LogicValue::Bool(rules.iter().any(|r| r.matches(ctx))),
            Rule::Not(inner) => LogicValue::Bool(!inner.matches(ctx)),
            Rule::Compare {
                op,
                version,
                left,
                right,
            } => LogicValue::Bool(compare(
                *op,
                *version,
                &left.resolve(ctx),
                &right.resolve(ctx),
            )),
            Rule::Value(operand) => operand.resolve(ctx),
        }
    }

    /// Evaluates the rule and returns its truthiness.
    pub fn matches(&self, ctx: &dyn Context) -> bool {
        self.evaluate(ctx).is_truthy()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::And(rules) => write_joined(f, rules, " && "),
            Rule::Or(rules) => write_joined(f, rules, " || "),
            Rule::Not(inner) => write!(f, "!({inner})"),
            Rule::Compare {
                op,
                version,
                left,
                right,
            } => {
                if *version {
                    write!(f, "{left} ver {} {right}", op.symbol())
                } else {
                    write!(f, "{left} {} {right}", op.symbol())
                }
            }
            Rule::Value(operand) => write!(f, "{operand}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, rules: &[Rule], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, rule) in rules.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{rule}")?;
    }
    f.write_str(")")
}

/// Parses and evaluates `expression` in one step.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the expression cannot be parsed.
/// Undefined variables never produce an error.
pub fn evaluate(expression: &str, ctx: &dyn Context) -> Result<LogicValue> {
    Ok(Rule::parse(expression)?.evaluate(ctx))
}

fn invalid_expression(expression: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid(format!("invalid condition \"{expression}\": {reason}"))
}

fn compare(op: CompareOp, version: bool, left: &LogicValue, right: &LogicValue) -> bool {
    if matches!(left, LogicValue::Null) || matches!(right, LogicValue::Null) {
        return false;
    }

    let both_versions = matches!((left, right), (LogicValue::String(a), LogicValue::String(b)) if is_version(a) && is_version(b));
    if version || both_versions {
        let (Some(a), Some(b)) = (left.as_version_text(), right.as_version_text()) else {
            return false;
        };
        return compare_versions(&a, &b).is_some_and(|ordering| op.accepts(ordering));
    }

    match op {
        CompareOp::Eq => strict_equals(left, right),
        CompareOp::Ne => !strict_equals(left, right),
        _ => match (left, right) {
            (LogicValue::String(a), LogicValue::String(b)) => {
                match (parse_number(a), parse_number(b)) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).is_some_and(|o| op.accepts(o)),
                    _ => op.accepts(a.cmp(b)),
                }
            }
            _ => match (left.as_number(), right.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).is_some_and(|o| op.accepts(o)),
                _ => false,
            },
        },
    }
}

fn strict_equals(left: &LogicValue, right: &LogicValue) -> bool {
    match (left, right) {
        (LogicValue::Number(a), LogicValue::Number(b)) => a == b,
        (LogicValue::String(a), LogicValue::String(b)) => a == b,
        (LogicValue::Bool(a), LogicValue::Bool(b)) => a == b,
        _ => false,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Version(String),
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Version(v) => write!(f, "version {v}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::Op(op) => write!(f, "'{}'", op.symbol()),
        }
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' => {
                if next == Some('=') && chars.get(i + 2) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ne));
                    i += 3;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '=' => {
                if next == Some('=') && chars.get(i + 2) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Eq));
                    i += 3;
                } else {
                    return Err("equality must be written as '==='".to_string());
                }
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                let op = match (c, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Lte,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Gte,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| "unterminated string literal".to_string())?;
                            value.push(*escaped);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                if c == '0' && matches!(next, Some('x') | Some('X')) {
                    i += 2;
                    while i < chars.len() && chars[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let value = parse_number(&text)
                        .ok_or_else(|| format!("invalid hex literal '{text}'"))?;
                    tokens.push(Token::Number(value));
                    continue;
                }
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let dots = text.matches('.').count();
                if dots == 0 {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| format!("invalid number '{text}'"))?;
                    tokens.push(Token::Number(value));
                } else if is_version(&text) {
                    tokens.push(Token::Version(text));
                } else {
                    return Err(format!("invalid version literal '{text}'"));
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
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

    fn parse_or(&mut self) -> ParseResult<Rule> {
        let mut rules = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            rules.push(self.parse_and()?);
        }
        Ok(if rules.len() == 1 {
            rules.remove(0)
        } else {
            Rule::Or(rules)
        })
    }

    fn parse_and(&mut self) -> ParseResult<Rule> {
        let mut rules = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            rules.push(self.parse_unary()?);
        }
        Ok(if rules.len() == 1 {
            rules.remove(0)
        } else {
            Rule::And(rules)
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Rule> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Rule::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Rule> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                Some(other) => Err(format!("expected ')', found {other}")),
                None => Err("expected ')', found end of expression".to_string()),
            };
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Rule> {
        let left = self.parse_operand()?;

        let mut version = false;
        if matches!(self.peek(), Some(Token::Ident(word)) if word == "ver")
            && matches!(self.tokens.get(self.pos + 1), Some(Token::Op(_)))
        {
            self.pos += 1;
            version = true;
        }

        let op = match self.peek() {
            Some(Token::Op(op)) => *op,
            _ if version => return Err("expected operator after 'ver'".to_string()),
            _ => return Ok(Rule::Value(left)),
        };
        self.pos += 1;

        let right = self.parse_operand()?;
        let version = version
            || matches!(left, Operand::Version(_))
            || matches!(right, Operand::Version(_));

        Ok(Rule::Compare {
            op,
            version,
            left,
            right,
        })
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Operand::Literal(LogicValue::Bool(true)),
                "false" => Operand::Literal(LogicValue::Bool(false)),
                _ => Operand::Var(name),
            }),
            Some(Token::Number(n)) => Ok(Operand::Literal(LogicValue::Number(n))),
            Some(Token::Version(v)) => Ok(Operand::Version(v)),
            Some(Token::Str(s)) => Ok(Operand::Literal(LogicValue::String(s))),
            Some(other) => Err(format!("expected operand, found {other}")),
            None => Err("expected operand, found end of expression".to_string()),
        }
    }
}
