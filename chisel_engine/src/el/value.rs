// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A position in the source text an expression or value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLocation {
    pub line: usize,
    pub column: usize,
}

impl FileLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The type tag of a [`Value`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Array,
    Map,
    Range,
    Null,
    Undefined,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Boolean => "Boolean",
            ValueType::Number => "Number",
            ValueType::String => "String",
            ValueType::Array => "Array",
            ValueType::Map => "Map",
            ValueType::Range => "Range",
            ValueType::Null => "Null",
            ValueType::Undefined => "Undefined",
        };
        f.write_str(name)
    }
}

/// Errors raised while applying operators or coercions to values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("invalid operands {lhs} and {rhs} for operator '{op}'")]
    InvalidOperands {
        op: &'static str,
        lhs: ValueType,
        rhs: ValueType,
    },
    #[error("invalid operand {operand} for operator '{op}'")]
    InvalidOperand {
        op: &'static str,
        operand: ValueType,
    },
    #[error("cannot convert {from} value to {to}")]
    Conversion { from: ValueType, to: ValueType },
    #[error("cannot subscript {value} value with {index} index")]
    InvalidSubscript { value: ValueType, index: ValueType },
}

type Result<T> = std::result::Result<T, EvaluationError>;

pub type ArrayType = Vec<Value>;
pub type MapType = BTreeMap<String, Value>;
pub type RangeType = Vec<i64>;

#[derive(Debug, Clone)]
enum ValueKind {
    Boolean(bool),
    Number(f64),
    String(String),
    Array(ArrayType),
    Map(MapType),
    Range(RangeType),
    Null,
    Undefined,
}

/// A dynamically typed, immutable value. Values optionally remember the
/// source location they were created at; comparisons ignore it.
#[derive(Debug, Clone)]
pub struct Value {
    kind: ValueKind,
    location: Option<FileLocation>,
}

impl Value {
    pub fn null() -> Self {
        ValueKind::Null.into()
    }

    pub fn undefined() -> Self {
        ValueKind::Undefined.into()
    }

    pub fn with_location(mut self, location: Option<FileLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn location(&self) -> Option<FileLocation> {
        self.location
    }

    pub fn type_of(&self) -> ValueType {
        match &self.kind {
            ValueKind::Boolean(_) => ValueType::Boolean,
            ValueKind::Number(_) => ValueType::Number,
            ValueKind::String(_) => ValueType::String,
            ValueKind::Array(_) => ValueType::Array,
            ValueKind::Map(_) => ValueType::Map,
            ValueKind::Range(_) => ValueType::Range,
            ValueKind::Null => ValueType::Null,
            ValueKind::Undefined => ValueType::Undefined,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ValueKind::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match &self.kind {
            ValueKind::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapType> {
        match &self.kind {
            ValueKind::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeType> {
        match &self.kind {
            ValueKind::Range(r) => Some(r),
            _ => None,
        }
    }

    /// The number of subscriptable elements: characters, elements, entries.
    pub fn length(&self) -> usize {
        match &self.kind {
            ValueKind::String(s) => s.chars().count(),
            ValueKind::Array(a) => a.len(),
            ValueKind::Map(m) => m.len(),
            ValueKind::Range(r) => r.len(),
            _ => 0,
        }
    }

    /* ============= */
    /*   Coercions   */
    /* ============= */

    pub fn to_boolean(&self) -> Result<bool> {
        match &self.kind {
            ValueKind::Boolean(b) => Ok(*b),
            ValueKind::Number(n) => Ok(*n != 0.0),
            ValueKind::String(s) => Ok(!s.is_empty() && s != "false"),
            ValueKind::Null => Ok(false),
            _ => Err(EvaluationError::Conversion {
                from: self.type_of(),
                to: ValueType::Boolean,
            }),
        }
    }

    pub fn to_number(&self) -> Result<f64> {
        match &self.kind {
            ValueKind::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            ValueKind::Number(n) => Ok(*n),
            ValueKind::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(0.0)
                } else {
                    trimmed.parse::<f64>().map_err(|_| EvaluationError::Conversion {
                        from: ValueType::String,
                        to: ValueType::Number,
                    })
                }
            }
            ValueKind::Null => Ok(0.0),
            _ => Err(EvaluationError::Conversion {
                from: self.type_of(),
                to: ValueType::Number,
            }),
        }
    }

    pub fn to_string_value(&self) -> Result<String> {
        match &self.kind {
            ValueKind::Boolean(b) => Ok(if *b { "true" } else { "false" }.to_owned()),
            ValueKind::Number(n) => Ok(format_number(*n)),
            ValueKind::String(s) => Ok(s.clone()),
            ValueKind::Null => Ok(String::new()),
            _ => Err(EvaluationError::Conversion {
                from: self.type_of(),
                to: ValueType::String,
            }),
        }
    }

    /// Integer coercion for the binary bitwise operators. Numbers truncate
    /// toward zero; booleans and null become 0/1 and 0.
    fn to_integer(&self, op: &'static str) -> Result<i64> {
        match &self.kind {
            ValueKind::Number(n) => Ok(n.trunc() as i64),
            ValueKind::Boolean(b) => Ok(i64::from(*b)),
            ValueKind::Null => Ok(0),
            _ => Err(EvaluationError::InvalidOperand {
                op,
                operand: self.type_of(),
            }),
        }
    }

    /* ===================== */
    /*   Unary operations    */
    /* ===================== */

    pub fn unary_plus(&self) -> Result<Value> {
        match &self.kind {
            ValueKind::Boolean(_) | ValueKind::Number(_) => Ok(Value::from(self.to_number()?)),
            _ => Err(EvaluationError::InvalidOperand {
                op: "+",
                operand: self.type_of(),
            }),
        }
    }

    pub fn unary_minus(&self) -> Result<Value> {
        match &self.kind {
            ValueKind::Boolean(_) | ValueKind::Number(_) => Ok(Value::from(-self.to_number()?)),
            _ => Err(EvaluationError::InvalidOperand {
                op: "-",
                operand: self.type_of(),
            }),
        }
    }

    pub fn logical_not(&self) -> Result<Value> {
        match &self.kind {
            ValueKind::Boolean(b) => Ok(Value::from(!*b)),
            _ => Err(EvaluationError::InvalidOperand {
                op: "!",
                operand: self.type_of(),
            }),
        }
    }

    /// Bitwise negation accepts numbers only, truncating toward zero.
    pub fn bitwise_not(&self) -> Result<Value> {
        match &self.kind {
            ValueKind::Number(n) => Ok(Value::from(!(n.trunc() as i64) as f64)),
            _ => Err(EvaluationError::InvalidOperand {
                op: "~",
                operand: self.type_of(),
            }),
        }
    }

    /* ===================== */
    /*   Binary operations   */
    /* ===================== */

    pub fn add(&self, other: &Value) -> Result<Value> {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Boolean(_) | Number(_), Boolean(_) | Number(_)) => {
                Ok(Value::from(self.to_number()? + other.to_number()?))
            }
            (String(l), String(r)) => Ok(Value::from(format!("{l}{r}"))),
            (Array(l), Array(r)) => {
                let mut elements = l.clone();
                elements.extend(r.iter().cloned());
                Ok(Value::from(elements))
            }
            (Map(l), Map(r)) => {
                let mut entries = l.clone();
                for (key, value) in r {
                    entries.insert(key.clone(), value.clone());
                }
                Ok(Value::from(entries))
            }
            _ => Err(self.invalid_operands("+", other)),
        }
    }

    pub fn subtract(&self, other: &Value) -> Result<Value> {
        self.numeric_op("-", other, |l, r| l - r)
    }

    pub fn multiply(&self, other: &Value) -> Result<Value> {
        self.numeric_op("*", other, |l, r| l * r)
    }

    /// Division by zero yields IEEE infinities rather than an error.
    pub fn divide(&self, other: &Value) -> Result<Value> {
        self.numeric_op("/", other, |l, r| l / r)
    }

    /// Modulus by zero yields NaN rather than an error.
    pub fn modulus(&self, other: &Value) -> Result<Value> {
        self.numeric_op("%", other, |l, r| l % r)
    }

    fn numeric_op(
        &self,
        op: &'static str,
        other: &Value,
        apply: impl FnOnce(f64, f64) -> f64,
    ) -> Result<Value> {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Boolean(_) | Number(_), Boolean(_) | Number(_)) => {
                Ok(Value::from(apply(self.to_number()?, other.to_number()?)))
            }
            _ => Err(self.invalid_operands(op, other)),
        }
    }

    pub fn bitwise_and(&self, other: &Value) -> Result<Value> {
        self.integer_op("&", other, |l, r| l & r)
    }

    pub fn bitwise_or(&self, other: &Value) -> Result<Value> {
        self.integer_op("|", other, |l, r| l | r)
    }

    pub fn bitwise_xor(&self, other: &Value) -> Result<Value> {
        self.integer_op("^", other, |l, r| l ^ r)
    }

    pub fn shift_left(&self, other: &Value) -> Result<Value> {
        self.integer_op("<<", other, shift(i64::checked_shl))
    }

    pub fn shift_right(&self, other: &Value) -> Result<Value> {
        self.integer_op(">>", other, shift(i64::checked_shr))
    }

    fn integer_op(
        &self,
        op: &'static str,
        other: &Value,
        apply: impl FnOnce(i64, i64) -> i64,
    ) -> Result<Value> {
        let lhs = self.to_integer(op)?;
        let rhs = other.to_integer(op)?;
        Ok(Value::from(apply(lhs, rhs) as f64))
    }

    /// The total order underlying `< <= > >= == !=`. Null sorts below every
    /// defined value; cross-type comparisons coerce per the documented table
    /// or fail with [`EvaluationError::InvalidOperands`].
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Undefined, Undefined) => Ok(Ordering::Equal),
            (Undefined, _) => Ok(Ordering::Less),
            (_, Undefined) => Ok(Ordering::Greater),
            (Null, Null) => Ok(Ordering::Equal),
            (Null, _) => Ok(Ordering::Less),
            (_, Null) => Ok(Ordering::Greater),
            (Boolean(l), Boolean(r)) => Ok(l.cmp(r)),
            (Boolean(_) | Number(_), Boolean(_) | Number(_)) => {
                Ok(total_cmp(self.to_number()?, other.to_number()?))
            }
            (Boolean(l), String(_)) => Ok(l.cmp(&other.to_boolean()?)),
            (String(_), Boolean(r)) => Ok(self.to_boolean()?.cmp(r)),
            (Number(l), String(_)) => Ok(total_cmp(*l, other.to_number()?)),
            (String(_), Number(r)) => Ok(total_cmp(self.to_number()?, *r)),
            (String(l), String(r)) => Ok(l.cmp(r)),
            (Array(l), Array(r)) => {
                for (lv, rv) in l.iter().zip(r.iter()) {
                    let ordering = lv.compare(rv)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                Ok(l.len().cmp(&r.len()))
            }
            (Map(l), Map(r)) => {
                for ((lk, lv), (rk, rv)) in l.iter().zip(r.iter()) {
                    let key_ordering = lk.cmp(rk);
                    if key_ordering != Ordering::Equal {
                        return Ok(key_ordering);
                    }
                    let value_ordering = lv.compare(rv)?;
                    if value_ordering != Ordering::Equal {
                        return Ok(value_ordering);
                    }
                }
                Ok(l.len().cmp(&r.len()))
            }
            (Range(l), Range(r)) => Ok(l.cmp(r)),
            _ => Err(self.invalid_operands("<=>", other)),
        }
    }

    pub fn equals(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    /// `a..b`: the inclusive integer sequence between the two endpoints,
    /// ascending or descending.
    pub fn range(&self, other: &Value) -> Result<Value> {
        let from = self.to_number()?.trunc() as i64;
        let to = other.to_number()?.trunc() as i64;

        let range: RangeType = if from <= to {
            (from..=to).collect()
        } else {
            (to..=from).rev().collect()
        };
        Ok(Value::from(range))
    }

    /// Subscripting: `v[i]` per the container type. Out-of-range indices
    /// yield `Undefined`; negative indices count from the end; an array or
    /// range index selects element-wise.
    pub fn subscript(&self, index: &Value) -> Result<Value> {
        use ValueKind::*;
        match &self.kind {
            String(s) => match &index.kind {
                Number(n) => Ok(match resolve_index(*n, s.chars().count()) {
                    Some(i) => Value::from(
                        s.chars().nth(i).map(|c| c.to_string()).unwrap_or_default(),
                    ),
                    None => Value::undefined(),
                }),
                Array(_) | Range(_) => {
                    let chars: Vec<char> = s.chars().collect();
                    let mut result = std::string::String::new();
                    for i in index.index_sequence()? {
                        if let Some(i) = resolve_signed_index(i, chars.len()) {
                            result.push(chars[i]);
                        }
                    }
                    Ok(Value::from(result))
                }
                _ => Err(self.invalid_subscript(index)),
            },
            Array(elements) => match &index.kind {
                Number(n) => Ok(match resolve_index(*n, elements.len()) {
                    Some(i) => elements[i].clone(),
                    None => Value::undefined(),
                }),
                Array(_) | Range(_) => {
                    let mut result = ArrayType::new();
                    for i in index.index_sequence()? {
                        match resolve_signed_index(i, elements.len()) {
                            Some(i) => result.push(elements[i].clone()),
                            None => result.push(Value::undefined()),
                        }
                    }
                    Ok(Value::from(result))
                }
                _ => Err(self.invalid_subscript(index)),
            },
            Map(entries) => {
                let key = index
                    .to_string_value()
                    .map_err(|_| self.invalid_subscript(index))?;
                Ok(entries.get(&key).cloned().unwrap_or_else(Value::undefined))
            }
            Range(values) => match &index.kind {
                Number(n) => Ok(match resolve_index(*n, values.len()) {
                    Some(i) => Value::from(values[i] as f64),
                    None => Value::undefined(),
                }),
                Array(_) | Range(_) => {
                    let mut result = ArrayType::new();
                    for i in index.index_sequence()? {
                        match resolve_signed_index(i, values.len()) {
                            Some(i) => result.push(Value::from(values[i] as f64)),
                            None => result.push(Value::undefined()),
                        }
                    }
                    Ok(Value::from(result))
                }
                _ => Err(self.invalid_subscript(index)),
            },
            _ => Err(self.invalid_subscript(index)),
        }
    }

    /// The integer indices denoted by an Array or Range index value.
    fn index_sequence(&self) -> Result<Vec<i64>> {
        match &self.kind {
            ValueKind::Range(r) => Ok(r.clone()),
            ValueKind::Array(a) => a
                .iter()
                .map(|v| match &v.kind {
                    ValueKind::Number(n) => Ok(n.trunc() as i64),
                    _ => Err(EvaluationError::InvalidSubscript {
                        value: ValueType::Array,
                        index: v.type_of(),
                    }),
                })
                .collect(),
            _ => unreachable!("index_sequence on non-sequence index"),
        }
    }

    fn invalid_operands(&self, op: &'static str, other: &Value) -> EvaluationError {
        EvaluationError::InvalidOperands {
            op,
            lhs: self.type_of(),
            rhs: other.type_of(),
        }
    }

    fn invalid_subscript(&self, index: &Value) -> EvaluationError {
        EvaluationError::InvalidSubscript {
            value: self.type_of(),
            index: index.type_of(),
        }
    }
}

fn shift(checked: fn(i64, u32) -> Option<i64>) -> impl FnOnce(i64, i64) -> i64 {
    move |l, r| {
        if (0..64).contains(&r) {
            checked(l, r as u32).unwrap_or(0)
        } else {
            0
        }
    }
}

fn total_cmp(l: f64, r: f64) -> Ordering {
    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
}

fn resolve_index(index: f64, len: usize) -> Option<usize> {
    resolve_signed_index(index.trunc() as i64, len)
}

fn resolve_signed_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { index + len as i64 } else { index };
    if index >= 0 && (index as usize) < len {
        Some(index as usize)
    } else {
        None
    }
}

/// Numbers print without a fractional part when they hold an integral value.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<ValueKind> for Value {
    fn from(kind: ValueKind) -> Self {
        Value {
            kind,
            location: None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        ValueKind::Boolean(value).into()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        ValueKind::Number(value).into()
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        ValueKind::Number(value as f64).into()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        ValueKind::String(value.to_owned()).into()
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        ValueKind::String(value).into()
    }
}

impl From<ArrayType> for Value {
    fn from(value: ArrayType) -> Self {
        ValueKind::Array(value).into()
    }
}

impl From<MapType> for Value {
    fn from(value: MapType) -> Self {
        ValueKind::Map(value).into()
    }
}

impl From<RangeType> for Value {
    fn from(value: RangeType) -> Self {
        ValueKind::Range(value).into()
    }
}

/// Structural equality over the payload; source locations are ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Boolean(l), Boolean(r)) => l == r,
            (Number(l), Number(r)) => l == r,
            (String(l), String(r)) => l == r,
            (Array(l), Array(r)) => l == r,
            (Map(l), Map(r)) => l == r,
            (Range(l), Range(r)) => l == r,
            (Null, Null) => true,
            (Undefined, Undefined) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::Number(n) => f.write_str(&format_number(*n)),
            ValueKind::String(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            ValueKind::Array(elements) => {
                f.write_str("[ ")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(" ]")
            }
            ValueKind::Map(entries) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                f.write_str(" }")
            }
            ValueKind::Range(values) => {
                f.write_str("[ ")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(" ]")
            }
            ValueKind::Null => f.write_str("null"),
            ValueKind::Undefined => f.write_str("undefined"),
        }
    }
}

/* ================== */
/*   Variable store   */
/* ================== */

/// An immutable mapping from names to values, supplied at evaluation time.
/// Unknown names evaluate to `Undefined`.
pub trait VariableStore {
    fn variable_value(&self, name: &str) -> Value;
}

#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: HashMap<String, Value>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }
}

impl VariableStore for VariableTable {
    fn variable_value(&self, name: &str) -> Value {
        self.variables
            .get(name)
            .cloned()
            .unwrap_or_else(Value::undefined)
    }
}

impl<S: std::hash::BuildHasher> From<HashMap<String, Value, S>> for VariableTable {
    fn from(variables: HashMap<String, Value, S>) -> Self {
        let mut table = VariableTable::new();
        for (name, value) in variables {
            table.declare(name, value);
        }
        table
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn array(values: impl IntoIterator<Item = Value>) -> Value {
        Value::from(values.into_iter().collect::<ArrayType>())
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Value::from(true).to_number().unwrap(), 1.0);
        assert_eq!(Value::null().to_number().unwrap(), 0.0);
        assert_eq!(Value::from("").to_number().unwrap(), 0.0);
        assert_eq!(Value::from("2.5").to_number().unwrap(), 2.5);
        assert!(Value::from("x").to_number().is_err());

        assert!(!Value::from("false").to_boolean().unwrap());
        assert!(!Value::from("").to_boolean().unwrap());
        assert!(Value::from("yes").to_boolean().unwrap());
        assert!(!Value::null().to_boolean().unwrap());
        assert!(array([]).to_boolean().is_err());

        assert_eq!(Value::from(2.0).to_string_value().unwrap(), "2");
        assert_eq!(Value::from(2.5).to_string_value().unwrap(), "2.5");
    }

    #[test]
    fn test_add() {
        assert_eq!(
            Value::from(1.0).add(&Value::from(true)).unwrap(),
            Value::from(2.0)
        );
        assert_eq!(
            Value::from("a").add(&Value::from("b")).unwrap(),
            Value::from("ab")
        );
        assert!(Value::null().add(&Value::from(2.0)).is_err());
        assert!(Value::from(1.0).add(&Value::from("x")).is_err());

        let merged = Value::from(MapType::from([
            ("a".to_owned(), Value::from(1.0)),
            ("b".to_owned(), Value::from(2.0)),
        ]))
        .add(&Value::from(MapType::from([(
            "b".to_owned(),
            Value::from(3.0),
        )])))
        .unwrap();
        assert_eq!(
            merged.as_map().unwrap().get("b").unwrap(),
            &Value::from(3.0)
        );
    }

    #[test]
    fn test_compare() {
        use std::cmp::Ordering::*;
        assert_eq!(
            Value::null().compare(&Value::from(false)).unwrap(),
            Less
        );
        assert_eq!(
            Value::from(false).compare(&Value::from("")).unwrap(),
            Equal
        );
        assert_eq!(
            Value::from(0.0).compare(&Value::from("1")).unwrap(),
            Less
        );
        assert!(Value::from(0.0).compare(&Value::from("true")).is_err());
        assert_eq!(
            array([Value::from(1.0)])
                .compare(&array([Value::from(1.0), Value::from(2.0)]))
                .unwrap(),
            Less
        );
        assert!(array([]).compare(&Value::from(0.0)).is_err());
    }

    #[test]
    fn test_range_and_subscript() {
        let range = Value::from(1.0).range(&Value::from(3.0)).unwrap();
        assert_eq!(range.as_range().unwrap(), &vec![1, 2, 3]);
        let reversed = Value::from(3.0).range(&Value::from(1.0)).unwrap();
        assert_eq!(reversed.as_range().unwrap(), &vec![3, 2, 1]);

        let letters = array(["a", "b", "c"].map(Value::from));
        assert_eq!(
            letters.subscript(&Value::from(1.0)).unwrap(),
            Value::from("b")
        );
        assert_eq!(
            letters.subscript(&Value::from(-1.0)).unwrap(),
            Value::from("c")
        );
        assert!(letters.subscript(&Value::from(7.0)).unwrap().is_undefined());

        let word = Value::from("chisel");
        assert_eq!(word.subscript(&Value::from(0.0)).unwrap(), Value::from("c"));
        assert_eq!(
            word.subscript(&Value::from(vec![0i64, 1, 2])).unwrap(),
            Value::from("chi")
        );

        let map = Value::from(MapType::from([("k".to_owned(), Value::from(9.0))]));
        assert_eq!(map.subscript(&Value::from("k")).unwrap(), Value::from(9.0));
        assert!(map.subscript(&Value::from("missing")).unwrap().is_undefined());

        assert!(Value::undefined().subscript(&Value::from(-1.0)).is_err());
        assert!(Value::from(1.0).subscript(&Value::from(0.0)).is_err());
    }

    #[test]
    fn test_display_roundtrip_shapes() {
        assert_eq!(Value::from(5.0).to_string(), "5");
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(
            array([Value::from(1.0), Value::from(2.0)]).to_string(),
            "[ 1, 2 ]"
        );
        assert_eq!(
            Value::from(MapType::from([("k".to_owned(), Value::from(true))])).to_string(),
            "{ \"k\": true }"
        );
    }
}
