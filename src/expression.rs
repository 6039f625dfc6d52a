//! Band-math expressions evaluated per pixel by the raster calculator.
//!
//! The grammar covers what a linear correction needs and a little more:
//! numeric literals, layer references (`ndvi@1` or `"my layer@1"`),
//! `+ - * /`, unary minus and parentheses.

use std::fmt;
use thiserror::Error;

use crate::config::Coefficients;

/// Reference name bound to band 1 of the corrected raster.
pub const NDVI_REFERENCE: &str = "ndvi@1";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}' in expression")]
    UnexpectedChar(char),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unterminated quoted reference")]
    UnterminatedQuote,

    #[error("Expected closing parenthesis")]
    MissingParen,

    #[error("Unexpected token in expression: {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ref(String),
    Op(char),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ref(name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    // Index into `Expression::references`
    Ref(usize),
    BinOp {
        op: char,
        left: Box<Node>,
        right: Box<Node>,
    },
    Neg(Box<Node>),
}

/// A parsed expression with its layer references in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    references: Vec<String>,
}

fn is_ref_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '.'
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '"')
                    .map(|offset| start + offset)
                    .ok_or(ExpressionError::UnterminatedQuote)?;
                tokens.push(Token::Ref(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Optional exponent: e.g. 1e-3, 2.5E+2
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if is_ref_start(c) => {
                let start = i;
                while i < chars.len() && is_ref_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ref(chars[start..i].iter().collect()));
            }
            c => return Err(ExpressionError::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    references: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            references: Vec::new(),
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

    fn reference_index(&mut self, name: String) -> usize {
        match self.references.iter().position(|r| *r == name) {
            Some(idx) => idx,
            None => {
                self.references.push(name);
                self.references.len() - 1
            }
        }
    }

    /// expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.parse_term()?;

        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// term = factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.parse_factor()?;

        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_factor()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// factor = number | reference | '(' expr ')' | ('-' | '+') factor
    fn parse_factor(&mut self) -> Result<Node, ExpressionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Num(n)),
            Some(Token::Ref(name)) => Ok(Node::Ref(self.reference_index(name))),
            Some(Token::LParen) => {
                let node = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(ExpressionError::MissingParen),
                }
            }
            Some(Token::Op('-')) => Ok(Node::Neg(Box::new(self.parse_factor()?))),
            Some(Token::Op('+')) => self.parse_factor(),
            Some(other) => Err(ExpressionError::UnexpectedToken(other.to_string())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

fn eval(node: &Node, values: &[f64]) -> f64 {
    match node {
        Node::Num(n) => *n,
        Node::Ref(idx) => values.get(*idx).copied().unwrap_or(f64::NAN),
        Node::BinOp { op, left, right } => {
            let l = eval(left, values);
            let r = eval(right, values);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                _ => f64::NAN,
            }
        }
        Node::Neg(inner) => -eval(inner, values),
    }
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(tokens);
        let root = parser.parse_expr()?;

        if let Some(token) = parser.peek() {
            return Err(ExpressionError::UnexpectedToken(token.to_string()));
        }

        Ok(Expression {
            source: source.to_string(),
            root,
            references: parser.references,
        })
    }

    /// Layer references, in the order `evaluate` expects their values.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        eval(&self.root, values)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// The correction expression `a + b * <reference>`.
pub fn linear(coefficients: &Coefficients, reference: &str) -> String {
    format!("{} + {} * {}", coefficients.a, coefficients.b, reference)
}
