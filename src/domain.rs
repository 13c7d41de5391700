//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Filter Domain Module
//!
//! Parser and in-memory evaluator for rule filter expressions.
//!
//! A domain is a list of conditions in prefix notation:
//!
//! ```text
//! [('is_company', '=', True), '|', ('name', 'ilike', 'azure'), ('ref', '!=', False)]
//! ```
//!
//! Consecutive conditions are implicitly joined with `&`. The logical
//! operators `'&'` and `'|'` take the next two expressions, `'!'` takes one.

use std::fmt;

use crate::errors::{Result, ZiError};
use crate::record::{ZiFieldValue, ZiStoredRecord};

/// Literal appearing on the right-hand side of a condition.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiDomainValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<ZiDomainValue>),
}

impl ZiDomainValue {
    fn is_falsy(&self) -> bool {
        match self {
            ZiDomainValue::Bool(b) => !b,
            ZiDomainValue::None => true,
            ZiDomainValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ZiDomainValue::Int(i) => Some(*i as f64),
            ZiDomainValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn from_field(value: Option<&ZiFieldValue>) -> Self {
        match value {
            None | Some(ZiFieldValue::Empty) => ZiDomainValue::None,
            Some(ZiFieldValue::Boolean(b)) => ZiDomainValue::Bool(*b),
            Some(ZiFieldValue::Integer(i)) => ZiDomainValue::Int(*i),
            Some(ZiFieldValue::Float(f)) => ZiDomainValue::Float(*f),
            Some(ZiFieldValue::Text(s)) | Some(ZiFieldValue::BinaryRef(s)) => {
                ZiDomainValue::Str(s.clone())
            }
            Some(ZiFieldValue::Binary(b)) => ZiDomainValue::Bool(!b.is_empty()),
            Some(ZiFieldValue::ManyToOne(id)) | Some(ZiFieldValue::Reference(id)) => {
                if *id == 0 {
                    ZiDomainValue::None
                } else {
                    ZiDomainValue::Int(*id)
                }
            }
            Some(ZiFieldValue::ManyToMany(ids)) | Some(ZiFieldValue::OneToMany(ids)) => {
                ZiDomainValue::List(ids.iter().map(|id| ZiDomainValue::Int(*id)).collect())
            }
        }
    }
}

impl fmt::Display for ZiDomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZiDomainValue::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            ZiDomainValue::Int(i) => write!(f, "{}", i),
            ZiDomainValue::Float(v) => write!(f, "{:?}", v),
            ZiDomainValue::Bool(true) => write!(f, "True"),
            ZiDomainValue::Bool(false) => write!(f, "False"),
            ZiDomainValue::None => write!(f, "None"),
            ZiDomainValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Comparison operator of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiDomainOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
    ILike,
    EqLike,
    EqILike,
}

impl ZiDomainOperator {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" | "==" => ZiDomainOperator::Eq,
            "!=" | "<>" => ZiDomainOperator::Ne,
            "<" => ZiDomainOperator::Lt,
            "<=" => ZiDomainOperator::Le,
            ">" => ZiDomainOperator::Gt,
            ">=" => ZiDomainOperator::Ge,
            "in" => ZiDomainOperator::In,
            "not in" => ZiDomainOperator::NotIn,
            "like" => ZiDomainOperator::Like,
            "ilike" => ZiDomainOperator::ILike,
            "=like" => ZiDomainOperator::EqLike,
            "=ilike" => ZiDomainOperator::EqILike,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZiDomainOperator::Eq => "=",
            ZiDomainOperator::Ne => "!=",
            ZiDomainOperator::Lt => "<",
            ZiDomainOperator::Le => "<=",
            ZiDomainOperator::Gt => ">",
            ZiDomainOperator::Ge => ">=",
            ZiDomainOperator::In => "in",
            ZiDomainOperator::NotIn => "not in",
            ZiDomainOperator::Like => "like",
            ZiDomainOperator::ILike => "ilike",
            ZiDomainOperator::EqLike => "=like",
            ZiDomainOperator::EqILike => "=ilike",
        }
    }
}

/// `(field, operator, value)` triple.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiCondition {
    pub field: String,
    pub operator: ZiDomainOperator,
    pub value: ZiDomainValue,
}

impl ZiCondition {
    pub fn new(field: &str, operator: ZiDomainOperator, value: ZiDomainValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    fn matches(&self, record: &ZiStoredRecord) -> bool {
        let actual = if self.field == "id" {
            ZiDomainValue::Int(record.id)
        } else {
            ZiDomainValue::from_field(record.get(&self.field))
        };
        compare(&actual, self.operator, &self.value)
    }
}

/// Parsed filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiDomain {
    /// The empty domain; matches every record.
    All,
    Leaf(ZiCondition),
    And(Box<ZiDomain>, Box<ZiDomain>),
    Or(Box<ZiDomain>, Box<ZiDomain>),
    Not(Box<ZiDomain>),
}

impl Default for ZiDomain {
    fn default() -> Self {
        ZiDomain::All
    }
}

impl ZiDomain {
    pub fn leaf(field: &str, operator: ZiDomainOperator, value: ZiDomainValue) -> Self {
        ZiDomain::Leaf(ZiCondition::new(field, operator, value))
    }

    /// Parses a domain expression. An empty or blank string is the empty domain.
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(ZiDomain::All);
        }
        let mut parser = DomainParser::new(source);
        let items = parser.parse_items()?;
        parser.expect_end()?;
        build_tree(items)
    }

    /// Conjunction of two domains.
    pub fn and(self, other: ZiDomain) -> ZiDomain {
        match (self, other) {
            (ZiDomain::All, d) | (d, ZiDomain::All) => d,
            (a, b) => ZiDomain::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn matches(&self, record: &ZiStoredRecord) -> bool {
        match self {
            ZiDomain::All => true,
            ZiDomain::Leaf(cond) => cond.matches(record),
            ZiDomain::And(a, b) => a.matches(record) && b.matches(record),
            ZiDomain::Or(a, b) => a.matches(record) || b.matches(record),
            ZiDomain::Not(a) => !a.matches(record),
        }
    }

    fn write_prefix(&self, out: &mut Vec<String>) {
        match self {
            ZiDomain::All => {}
            ZiDomain::Leaf(c) => out.push(format!(
                "('{}', '{}', {})",
                c.field,
                c.operator.as_str(),
                c.value
            )),
            ZiDomain::And(a, b) => {
                out.push("'&'".to_string());
                a.write_prefix(out);
                b.write_prefix(out);
            }
            ZiDomain::Or(a, b) => {
                out.push("'|'".to_string());
                a.write_prefix(out);
                b.write_prefix(out);
            }
            ZiDomain::Not(a) => {
                out.push("'!'".to_string());
                a.write_prefix(out);
            }
        }
    }
}

impl fmt::Display for ZiDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        self.write_prefix(&mut parts);
        write!(f, "[{}]", parts.join(", "))
    }
}

fn compare(actual: &ZiDomainValue, op: ZiDomainOperator, expected: &ZiDomainValue) -> bool {
    // x2many values compare element-wise
    if let ZiDomainValue::List(items) = actual {
        return match op {
            ZiDomainOperator::Eq if expected.is_falsy() => items.is_empty(),
            ZiDomainOperator::Ne if expected.is_falsy() => !items.is_empty(),
            ZiDomainOperator::Ne | ZiDomainOperator::NotIn => {
                !items.iter().any(|item| compare(item, negate(op), expected))
            }
            _ => items.iter().any(|item| compare(item, op, expected)),
        };
    }

    match op {
        ZiDomainOperator::Eq => values_equal(actual, expected),
        ZiDomainOperator::Ne => !values_equal(actual, expected),
        ZiDomainOperator::In => match expected {
            ZiDomainValue::List(items) => items.iter().any(|v| values_equal(actual, v)),
            other => values_equal(actual, other),
        },
        ZiDomainOperator::NotIn => !compare(actual, ZiDomainOperator::In, expected),
        ZiDomainOperator::Lt | ZiDomainOperator::Le | ZiDomainOperator::Gt | ZiDomainOperator::Ge => {
            let ordering = match (actual, expected) {
                (ZiDomainValue::Str(a), ZiDomainValue::Str(b)) => Some(a.as_str().cmp(b.as_str())),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            };
            match ordering {
                Some(ord) => match op {
                    ZiDomainOperator::Lt => ord.is_lt(),
                    ZiDomainOperator::Le => ord.is_le(),
                    ZiDomainOperator::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
                None => false,
            }
        }
        ZiDomainOperator::Like | ZiDomainOperator::ILike => match (actual, expected) {
            (ZiDomainValue::Str(a), ZiDomainValue::Str(b)) => {
                if op == ZiDomainOperator::ILike {
                    a.to_lowercase().contains(&b.to_lowercase())
                } else {
                    a.contains(b.as_str())
                }
            }
            _ => false,
        },
        ZiDomainOperator::EqLike | ZiDomainOperator::EqILike => match (actual, expected) {
            (ZiDomainValue::Str(a), ZiDomainValue::Str(b)) => {
                if op == ZiDomainOperator::EqILike {
                    like_match(&a.to_lowercase(), &b.to_lowercase())
                } else {
                    like_match(a, b)
                }
            }
            _ => false,
        },
    }
}

fn negate(op: ZiDomainOperator) -> ZiDomainOperator {
    match op {
        ZiDomainOperator::Ne => ZiDomainOperator::Eq,
        ZiDomainOperator::NotIn => ZiDomainOperator::In,
        other => other,
    }
}

fn values_equal(a: &ZiDomainValue, b: &ZiDomainValue) -> bool {
    if a.is_falsy() && b.is_falsy() {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// SQL `LIKE` pattern match with `%` and `_` wildcards.
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

enum DomainItem {
    Operator(char),
    Leaf(ZiCondition),
}

fn build_tree(items: Vec<DomainItem>) -> Result<ZiDomain> {
    let mut pos = 0;
    let mut result = ZiDomain::All;
    while pos < items.len() {
        let node = build_node(&items, &mut pos)?;
        result = result.and(node);
    }
    Ok(result)
}

fn build_node(items: &[DomainItem], pos: &mut usize) -> Result<ZiDomain> {
    let item = items
        .get(*pos)
        .ok_or_else(|| ZiError::validation("domain operator is missing an operand"))?;
    *pos += 1;
    match item {
        DomainItem::Leaf(cond) => Ok(ZiDomain::Leaf(cond.clone())),
        DomainItem::Operator('!') => Ok(ZiDomain::Not(Box::new(build_node(items, pos)?))),
        DomainItem::Operator(op) => {
            let left = build_node(items, pos)?;
            let right = build_node(items, pos)?;
            Ok(if *op == '|' {
                ZiDomain::Or(Box::new(left), Box::new(right))
            } else {
                ZiDomain::And(Box::new(left), Box::new(right))
            })
        }
    }
}

struct DomainParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> DomainParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            source,
        }
    }

    fn error(&self, message: &str) -> ZiError {
        ZiError::validation(format!(
            "invalid domain '{}' at offset {}: {}",
            self.source, self.pos, message
        ))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    fn parse_items(&mut self) -> Result<Vec<DomainItem>> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some('(') => items.push(DomainItem::Leaf(self.parse_condition()?)),
                Some('\'') | Some('"') => {
                    let op = self.parse_string()?;
                    match op.as_str() {
                        "&" | "|" | "!" => items.push(DomainItem::Operator(op.chars().next().unwrap_or('&'))),
                        other => return Err(self.error(&format!("unknown logical operator '{}'", other))),
                    }
                }
                _ => return Err(self.error("expected a condition or logical operator")),
            }
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_condition(&mut self) -> Result<ZiCondition> {
        self.expect('(')?;
        let field = match self.parse_value()? {
            ZiDomainValue::Str(s) => s,
            _ => return Err(self.error("condition field must be a string")),
        };
        self.expect(',')?;
        let op = match self.parse_value()? {
            ZiDomainValue::Str(s) => s,
            _ => return Err(self.error("condition operator must be a string")),
        };
        let operator = ZiDomainOperator::parse(&op)
            .ok_or_else(|| self.error(&format!("unknown operator '{}'", op)))?;
        self.expect(',')?;
        let value = self.parse_value()?;
        self.expect(')')?;
        Ok(ZiCondition {
            field,
            operator,
            value,
        })
    }

    fn parse_value(&mut self) -> Result<ZiDomainValue> {
        match self.peek() {
            Some('\'') | Some('"') => Ok(ZiDomainValue::Str(self.parse_string()?)),
            Some('[') => self.parse_sequence('[', ']'),
            Some('(') => self.parse_sequence('(', ')'),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_alphanumeric() {
                    self.pos += 1;
                }
                let word: String = self.chars[start..self.pos].iter().collect();
                match word.as_str() {
                    "True" | "true" => Ok(ZiDomainValue::Bool(true)),
                    "False" | "false" => Ok(ZiDomainValue::Bool(false)),
                    "None" | "null" => Ok(ZiDomainValue::None),
                    other => Err(self.error(&format!("unknown literal '{}'", other))),
                }
            }
            _ => Err(self.error("expected a value")),
        }
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<ZiDomainValue> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(ZiDomainValue::List(items));
            }
            items.push(self.parse_value()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let quote = self.peek().ok_or_else(|| self.error("expected a string"))?;
        self.pos += 1;
        let mut out = String::new();
        while let Some(&c) = self.chars.get(self.pos) {
            self.pos += 1;
            if c == '\\' {
                if let Some(&next) = self.chars.get(self.pos) {
                    out.push(next);
                    self.pos += 1;
                }
            } else if c == quote {
                return Ok(out);
            } else {
                out.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    fn parse_number(&mut self) -> Result<ZiDomainValue> {
        let start = self.pos;
        if self.chars.get(self.pos) == Some(&'-') {
            self.pos += 1;
        }
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.contains('.') {
            text.parse::<f64>()
                .map(ZiDomainValue::Float)
                .map_err(|_| self.error("invalid float"))
        } else {
            text.parse::<i64>()
                .map(ZiDomainValue::Int)
                .map_err(|_| self.error("invalid integer"))
        }
    }
}
