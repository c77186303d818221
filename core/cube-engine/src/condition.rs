//! FILENAME: core/cube-engine/src/condition.rs
//! PURPOSE: Numeric filter applied to looped cell values.
//! CONTEXT: Export callers pass conditions such as `">= 100 and < 200"` or
//! `"< 0 or > 1000"`. A condition is stored as a disjunction of conjunctions
//! of comparisons ("and" binds tighter than "or"). Only numeric values can
//! satisfy a condition; strings and undefined cells are always rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cube_model::CellValue;

use crate::error::ConditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::GreaterEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessEqual => "<=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Comparison::Greater),
            ">=" => Some(Comparison::GreaterEqual),
            "<" => Some(Comparison::Less),
            "<=" => Some(Comparison::LessEqual),
            "=" | "==" => Some(Comparison::Equal),
            "!=" | "<>" => Some(Comparison::NotEqual),
            _ => None,
        }
    }
}

/// A single comparison against a constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub op: Comparison,
    pub operand: f64,
}

impl Clause {
    pub fn new(op: Comparison, operand: f64) -> Self {
        Clause { op, operand }
    }

    pub fn test(&self, value: f64) -> bool {
        match self.op {
            Comparison::Greater => value > self.operand,
            Comparison::GreaterEqual => value >= self.operand,
            Comparison::Less => value < self.operand,
            Comparison::LessEqual => value <= self.operand,
            Comparison::Equal => value == self.operand,
            Comparison::NotEqual => value != self.operand,
        }
    }
}

/// Disjunction of conjunctions of clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericCondition {
    any_of: Vec<Vec<Clause>>,
}

impl NumericCondition {
    pub fn new(clause: Clause) -> Self {
        NumericCondition { any_of: vec![vec![clause]] }
    }

    pub fn compare(op: Comparison, operand: f64) -> Self {
        Self::new(Clause::new(op, operand))
    }

    /// Adds a clause to the last conjunction.
    pub fn and(mut self, clause: Clause) -> Self {
        if let Some(last) = self.any_of.last_mut() {
            last.push(clause);
        }
        self
    }

    /// Starts a new alternative.
    pub fn or(mut self, clause: Clause) -> Self {
        self.any_of.push(vec![clause]);
        self
    }

    pub fn test(&self, value: f64) -> bool {
        self.any_of
            .iter()
            .any(|all| all.iter().all(|clause| clause.test(value)))
    }

    /// True if `value` is numeric and satisfies the condition.
    pub fn matches(&self, value: &CellValue) -> bool {
        value.as_number().is_some_and(|n| self.test(n))
    }

    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }

        let mut any_of: Vec<Vec<Clause>> = vec![Vec::new()];
        let mut iter = tokens.into_iter().peekable();
        loop {
            let op = match iter.next() {
                Some(Token::Op(op)) => op,
                Some(other) => return Err(ConditionError::UnexpectedToken(other.to_string())),
                None => return Err(ConditionError::UnexpectedToken("end of input".to_string())),
            };
            let operand = match iter.next() {
                Some(Token::Number(n)) => n,
                Some(other) => return Err(ConditionError::UnexpectedToken(other.to_string())),
                None => return Err(ConditionError::UnexpectedToken("end of input".to_string())),
            };
            if let Some(last) = any_of.last_mut() {
                last.push(Clause::new(op, operand));
            }

            match iter.next() {
                None => break,
                Some(Token::And) => {}
                Some(Token::Or) => any_of.push(Vec::new()),
                Some(other) => return Err(ConditionError::UnexpectedToken(other.to_string())),
            }
        }
        Ok(NumericCondition { any_of })
    }
}

impl FromStr for NumericCondition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NumericCondition::parse(s)
    }
}

impl fmt::Display for NumericCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, all) in self.any_of.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            for (j, clause) in all.iter().enumerate() {
                if j > 0 {
                    write!(f, " and ")?;
                }
                write!(f, "{} {}", clause.op.symbol(), clause.operand)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// TOKENIZER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Op(Comparison),
    Number(f64),
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Op(op) => write!(f, "{}", op.symbol()),
            Token::Number(n) => write!(f, "{}", n),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if matches!(c, '<' | '>' | '=' | '!') {
            let start = i;
            while i < chars.len() && matches!(chars[i], '<' | '>' | '=' | '!') {
                i += 1;
            }
            let symbol: String = chars[start..i].iter().collect();
            let op = Comparison::from_symbol(&symbol)
                .ok_or(ConditionError::UnknownOperator(symbol))?;
            tokens.push(Token::Op(op));
        } else if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') {
            let start = i;
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign = matches!(d, '-' | '+') && matches!(chars[i - 1], 'e' | 'E');
                if d.is_ascii_digit() || matches!(d, '.' | 'e' | 'E') || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let number = literal
                .parse::<f64>()
                .map_err(|_| ConditionError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(number));
        } else if c == '&' || c == '|' {
            let start = i;
            while i < chars.len() && chars[i] == c {
                i += 1;
            }
            match i - start {
                2 if c == '&' => tokens.push(Token::And),
                2 => tokens.push(Token::Or),
                _ => return Err(ConditionError::UnexpectedToken(chars[start..i].iter().collect())),
            }
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.to_ascii_lowercase().as_str() {
                "and" => tokens.push(Token::And),
                "or" => tokens.push(Token::Or),
                _ => return Err(ConditionError::UnexpectedToken(word)),
            }
        } else {
            return Err(ConditionError::UnexpectedToken(c.to_string()));
        }
    }
    Ok(tokens)
}
