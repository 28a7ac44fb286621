// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::value::{
    ArrayType, EvaluationError, FileLocation, MapType, Value, VariableStore, VariableTable,
};

/// The variable bound inside a subscript to `length - 1`, so that `a[..]`,
/// `a[2..]` and `a[..2]` expand to full-length ranges.
pub const AUTO_RANGE_PARAMETER: &str = "__AutoRangeParameter";

/// Precedence of anything that is not a binary operator.
const ATOM_PRECEDENCE: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicalNegation,
    BitwiseNegation,
    /// A parenthesized expression. Evaluation passes the operand through.
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulus,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    BitwiseShiftLeft,
    BitwiseShiftRight,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Range,
    Case,
}

impl BinaryOp {
    /// Higher binds tighter.
    pub fn precedence(self) -> usize {
        use BinaryOp::*;
        match self {
            Multiplication | Division | Modulus => 12,
            Addition | Subtraction => 11,
            BitwiseShiftLeft | BitwiseShiftRight => 10,
            Less | LessOrEqual | Greater | GreaterOrEqual => 9,
            Equal | NotEqual => 8,
            BitwiseAnd => 7,
            BitwiseXor => 6,
            BitwiseOr => 5,
            LogicalAnd => 4,
            LogicalOr => 3,
            Range => 2,
            Case => 1,
        }
    }

    fn token(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Addition => "+",
            Subtraction => "-",
            Multiplication => "*",
            Division => "/",
            Modulus => "%",
            LogicalAnd => "&&",
            LogicalOr => "||",
            BitwiseAnd => "&",
            BitwiseXor => "^",
            BitwiseOr => "|",
            BitwiseShiftLeft => "<<",
            BitwiseShiftRight => ">>",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Equal => "==",
            NotEqual => "!=",
            Range => "..",
            Case => "->",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Variable(String),
    Array(Vec<ExpressionNode>),
    Map(BTreeMap<String, ExpressionNode>),
    Unary {
        op: UnaryOp,
        operand: ExpressionNode,
    },
    Binary {
        op: BinaryOp,
        lhs: ExpressionNode,
        rhs: ExpressionNode,
    },
    Subscript {
        lhs: ExpressionNode,
        rhs: ExpressionNode,
    },
    Switch(Vec<ExpressionNode>),
}

/// A node of the expression tree. Immutable after construction; the binary
/// constructor rotates its children to restore the precedence-heap
/// invariant, so a naive depth-first evaluation respects conventional
/// operator precedence even though the parser emits operators left to right.
#[derive(Debug, Clone)]
pub struct ExpressionNode {
    expr: Box<Expr>,
    location: Option<FileLocation>,
}

/// Equality ignores source locations.
impl PartialEq for ExpressionNode {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl ExpressionNode {
    pub fn literal(value: Value, location: Option<FileLocation>) -> Self {
        Self {
            expr: Box::new(Expr::Literal(value)),
            location,
        }
    }

    pub fn variable(name: impl Into<String>, location: Option<FileLocation>) -> Self {
        Self {
            expr: Box::new(Expr::Variable(name.into())),
            location,
        }
    }

    pub fn array(elements: Vec<ExpressionNode>, location: Option<FileLocation>) -> Self {
        Self {
            expr: Box::new(Expr::Array(elements)),
            location,
        }
    }

    pub fn map(
        entries: BTreeMap<String, ExpressionNode>,
        location: Option<FileLocation>,
    ) -> Self {
        Self {
            expr: Box::new(Expr::Map(entries)),
            location,
        }
    }

    pub fn unary(op: UnaryOp, operand: ExpressionNode, location: Option<FileLocation>) -> Self {
        Self {
            expr: Box::new(Expr::Unary { op, operand }),
            location,
        }
    }

    pub fn binary(
        op: BinaryOp,
        lhs: ExpressionNode,
        rhs: ExpressionNode,
        location: Option<FileLocation>,
    ) -> Self {
        Self {
            expr: Box::new(Expr::Binary { op, lhs, rhs }),
            location,
        }
        .rebalanced()
    }

    pub fn subscript(
        lhs: ExpressionNode,
        rhs: ExpressionNode,
        location: Option<FileLocation>,
    ) -> Self {
        Self {
            expr: Box::new(Expr::Subscript { lhs, rhs }),
            location,
        }
    }

    pub fn switch(cases: Vec<ExpressionNode>, location: Option<FileLocation>) -> Self {
        Self {
            expr: Box::new(Expr::Switch(cases)),
            location,
        }
    }

    /// `..b`: the left endpoint is the auto range parameter.
    pub fn auto_range_with_right_operand(
        rhs: ExpressionNode,
        location: Option<FileLocation>,
    ) -> Self {
        let lhs = ExpressionNode::variable(AUTO_RANGE_PARAMETER, location);
        ExpressionNode::binary(BinaryOp::Range, lhs, rhs, location)
    }

    /// `a..`: the right endpoint is the auto range parameter.
    pub fn auto_range_with_left_operand(
        lhs: ExpressionNode,
        location: Option<FileLocation>,
    ) -> Self {
        let rhs = ExpressionNode::variable(AUTO_RANGE_PARAMETER, location);
        ExpressionNode::binary(BinaryOp::Range, lhs, rhs, location)
    }

    pub fn location(&self) -> Option<FileLocation> {
        self.location
    }

    pub fn precedence(&self) -> usize {
        match &*self.expr {
            Expr::Binary { op, .. } => op.precedence(),
            _ => ATOM_PRECEDENCE,
        }
    }

    fn is_literal(&self) -> bool {
        matches!(&*self.expr, Expr::Literal(_))
    }

    /*
     * The expression tree has a similar invariant to a heap: for any given
     * node, its precedence must be less than or equal to the precedences of
     * its children. Whenever a binary node is built whose precedence exceeds
     * that of a child, the lower-precedence child is rotated up and this
     * operator sinks into its subtree. The rotation preserves the in-order
     * traversal of the tree.
     */
    fn rebalanced(self) -> Self {
        let (parent_prec, left_prec, right_prec) = match &*self.expr {
            Expr::Binary { op, lhs, rhs } => {
                (op.precedence(), lhs.precedence(), rhs.precedence())
            }
            _ => return self,
        };

        if parent_prec <= left_prec.min(right_prec) {
            return self;
        }

        let location = self.location;
        let (op, lhs, rhs) = match *self.expr {
            Expr::Binary { op, lhs, rhs } => (op, lhs, rhs),
            _ => unreachable!(),
        };

        if left_prec < right_prec {
            // Rotate the left node up and sink this operator into its right
            // subtree, then rebalance that subtree again.
            let left_location = lhs.location;
            match *lhs.expr {
                Expr::Binary {
                    op: left_op,
                    lhs: left_lhs,
                    rhs: left_rhs,
                } => {
                    let sunk = ExpressionNode {
                        expr: Box::new(Expr::Binary {
                            op,
                            lhs: left_rhs,
                            rhs,
                        }),
                        location,
                    }
                    .rebalanced();
                    ExpressionNode {
                        expr: Box::new(Expr::Binary {
                            op: left_op,
                            lhs: left_lhs,
                            rhs: sunk,
                        }),
                        location: left_location,
                    }
                }
                _ => unreachable!("non-binary child cannot have lower precedence"),
            }
        } else {
            // Rotate the right node up and sink this operator into its left
            // subtree, then rebalance that subtree again.
            let right_location = rhs.location;
            match *rhs.expr {
                Expr::Binary {
                    op: right_op,
                    lhs: right_lhs,
                    rhs: right_rhs,
                } => {
                    let sunk = ExpressionNode {
                        expr: Box::new(Expr::Binary {
                            op,
                            lhs,
                            rhs: right_lhs,
                        }),
                        location,
                    }
                    .rebalanced();
                    ExpressionNode {
                        expr: Box::new(Expr::Binary {
                            op: right_op,
                            lhs: sunk,
                            rhs: right_rhs,
                        }),
                        location: right_location,
                    }
                }
                _ => unreachable!("non-binary child cannot have lower precedence"),
            }
        }
    }

    /// Evaluates the expression against the given variable store. Evaluation
    /// is pure; it never mutates the store or the tree.
    pub fn evaluate(
        &self,
        store: &dyn VariableStore,
    ) -> Result<Value, EvaluationError> {
        let value = match &*self.expr {
            Expr::Literal(value) => value.clone(),
            Expr::Variable(name) => store.variable_value(name),
            Expr::Array(elements) => {
                let mut array = ArrayType::with_capacity(elements.len());
                for element in elements {
                    let value = element.evaluate(store)?;
                    // Embedded ranges are flattened into the array.
                    if let Some(range) = value.as_range() {
                        let location = value.location();
                        for i in range {
                            array.push(Value::from(*i as f64).with_location(location));
                        }
                    } else {
                        array.push(value);
                    }
                }
                Value::from(array)
            }
            Expr::Map(entries) => {
                let mut map = MapType::new();
                for (key, expression) in entries {
                    map.insert(key.clone(), expression.evaluate(store)?);
                }
                Value::from(map)
            }
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(store)?;
                match op {
                    UnaryOp::Plus => value.unary_plus()?,
                    UnaryOp::Minus => value.unary_minus()?,
                    UnaryOp::LogicalNegation => value.logical_not()?,
                    UnaryOp::BitwiseNegation => value.bitwise_not()?,
                    UnaryOp::Group => value,
                }
            }
            Expr::Binary { op, lhs, rhs } => Self::evaluate_binary(*op, lhs, rhs, store)?,
            Expr::Subscript { lhs, rhs } => {
                let value = lhs.evaluate(store)?;
                let stack = EvaluationStack {
                    parent: store,
                    name: AUTO_RANGE_PARAMETER,
                    value: Value::from(value.length() as i64 - 1),
                };
                let index = rhs.evaluate(&stack)?;
                value.subscript(&index)?
            }
            Expr::Switch(cases) => {
                let mut result = Value::undefined();
                for case in cases {
                    let value = case.evaluate(store)?;
                    if !value.is_undefined() {
                        result = value;
                        break;
                    }
                }
                result
            }
        };

        Ok(if value.location().is_none() {
            value.with_location(self.location)
        } else {
            value
        })
    }

    fn evaluate_binary(
        op: BinaryOp,
        lhs: &ExpressionNode,
        rhs: &ExpressionNode,
        store: &dyn VariableStore,
    ) -> Result<Value, EvaluationError> {
        use BinaryOp::*;

        // The logical and case operators must not evaluate their right
        // operand when the left operand already decides the result.
        match op {
            LogicalAnd => {
                return Ok(if !lhs.evaluate(store)?.to_boolean()? {
                    Value::from(false)
                } else {
                    Value::from(rhs.evaluate(store)?.to_boolean()?)
                });
            }
            LogicalOr => {
                return Ok(if lhs.evaluate(store)?.to_boolean()? {
                    Value::from(true)
                } else {
                    Value::from(rhs.evaluate(store)?.to_boolean()?)
                });
            }
            Case => {
                return Ok(if lhs.evaluate(store)?.to_boolean()? {
                    rhs.evaluate(store)?
                } else {
                    Value::undefined()
                });
            }
            _ => {}
        }

        let left = lhs.evaluate(store)?;
        let right = rhs.evaluate(store)?;
        match op {
            Addition => left.add(&right),
            Subtraction => left.subtract(&right),
            Multiplication => left.multiply(&right),
            Division => left.divide(&right),
            Modulus => left.modulus(&right),
            BitwiseAnd => left.bitwise_and(&right),
            BitwiseXor => left.bitwise_xor(&right),
            BitwiseOr => left.bitwise_or(&right),
            BitwiseShiftLeft => left.shift_left(&right),
            BitwiseShiftRight => left.shift_right(&right),
            Less => Ok(Value::from(left.compare(&right)? == Ordering::Less)),
            LessOrEqual => Ok(Value::from(left.compare(&right)? != Ordering::Greater)),
            Greater => Ok(Value::from(left.compare(&right)? == Ordering::Greater)),
            GreaterOrEqual => Ok(Value::from(left.compare(&right)? != Ordering::Less)),
            Equal => Ok(Value::from(left.equals(&right)?)),
            NotEqual => Ok(Value::from(!left.equals(&right)?)),
            Range => left.range(&right),
            LogicalAnd | LogicalOr | Case => unreachable!(),
        }
    }

    /// Post-order constant folding. A node collapses to a literal when all
    /// of its children are literals and its evaluation succeeds; subtrees
    /// whose evaluation would fail are left unfolded so the error still
    /// surfaces at evaluation time. Folding never changes observable
    /// semantics for any variable store.
    pub fn optimize(&self) -> ExpressionNode {
        match &*self.expr {
            Expr::Literal(_) | Expr::Variable(_) => self.clone(),
            Expr::Array(elements) => {
                let optimized: Vec<_> = elements.iter().map(|e| e.optimize()).collect();
                let all_literal = optimized.iter().all(ExpressionNode::is_literal);
                let node = ExpressionNode::array(optimized, self.location);
                if all_literal {
                    node.folded()
                } else {
                    node
                }
            }
            Expr::Map(entries) => {
                let optimized: BTreeMap<_, _> = entries
                    .iter()
                    .map(|(k, e)| (k.clone(), e.optimize()))
                    .collect();
                let all_literal = optimized.values().all(ExpressionNode::is_literal);
                let node = ExpressionNode::map(optimized, self.location);
                if all_literal {
                    node.folded()
                } else {
                    node
                }
            }
            Expr::Unary { op, operand } => {
                let operand = operand.optimize();
                let all_literal = operand.is_literal();
                let node = ExpressionNode::unary(*op, operand, self.location);
                if all_literal {
                    node.folded()
                } else {
                    node
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.optimize();
                let rhs = rhs.optimize();
                let all_literal = lhs.is_literal() && rhs.is_literal();
                let node = ExpressionNode::binary(*op, lhs, rhs, self.location);
                if all_literal {
                    node.folded()
                } else {
                    node
                }
            }
            Expr::Subscript { lhs, rhs } => {
                let lhs = lhs.optimize();
                let rhs = rhs.optimize();
                let all_literal = lhs.is_literal() && rhs.is_literal();
                let node = ExpressionNode::subscript(lhs, rhs, self.location);
                if all_literal {
                    node.folded()
                } else {
                    node
                }
            }
            Expr::Switch(cases) => {
                let mut optimized = Vec::with_capacity(cases.len());
                let mut all_literal = true;
                let mut folded = None;
                for case in cases {
                    let case = case.optimize();
                    all_literal &= case.is_literal();
                    if all_literal && folded.is_none() {
                        if let Ok(value) = case.evaluate(&VariableTable::new()) {
                            if !value.is_undefined() {
                                folded = Some(ExpressionNode::literal(value, self.location));
                            }
                        }
                    }
                    optimized.push(case);
                }
                match folded {
                    Some(literal) => literal,
                    None => ExpressionNode::switch(optimized, self.location),
                }
            }
        }
    }

    /// Collapses a node with all-literal children into a literal, keeping
    /// the node when its evaluation fails.
    fn folded(self) -> ExpressionNode {
        match self.evaluate(&VariableTable::new()) {
            Ok(value) => ExpressionNode::literal(value, self.location),
            Err(_) => self,
        }
    }
}

struct EvaluationStack<'a> {
    parent: &'a dyn VariableStore,
    name: &'static str,
    value: Value,
}

impl VariableStore for EvaluationStack<'_> {
    fn variable_value(&self, name: &str) -> Value {
        if name == self.name {
            self.value.clone()
        } else {
            self.parent.variable_value(name)
        }
    }
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.expr {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Array(elements) => {
                f.write_str("[ ")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(" ]")
            }
            Expr::Map(entries) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                f.write_str(" }")
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Plus => write!(f, "+{operand}"),
                UnaryOp::Minus => write!(f, "-{operand}"),
                UnaryOp::LogicalNegation => write!(f, "!{operand}"),
                UnaryOp::BitwiseNegation => write!(f, "~{operand}"),
                UnaryOp::Group => write!(f, "( {operand} )"),
            },
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::Range => write!(f, "{lhs}..{rhs}"),
                _ => write!(f, "{} {} {}", lhs, op.token(), rhs),
            },
            Expr::Subscript { lhs, rhs } => write!(f, "{lhs}[{rhs}]"),
            Expr::Switch(cases) => {
                f.write_str("{{ ")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{case}")?;
                }
                f.write_str(" }}")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lit(n: f64) -> ExpressionNode {
        ExpressionNode::literal(Value::from(n), None)
    }

    fn eval(node: &ExpressionNode) -> Value {
        node.evaluate(&VariableTable::new()).unwrap()
    }

    #[test]
    fn test_rebalance_sinks_low_precedence_operators() {
        // Built left to right as the parser does: (2 + 3) * 4 must become
        // 2 + (3 * 4).
        let sum = ExpressionNode::binary(BinaryOp::Addition, lit(2.0), lit(3.0), None);
        let product = ExpressionNode::binary(BinaryOp::Multiplication, sum, lit(4.0), None);
        assert_eq!(eval(&product), Value::from(14.0));
        assert_eq!(product.to_string(), "2 + 3 * 4");
        assert_eq!(product.precedence(), BinaryOp::Addition.precedence());
    }

    #[test]
    fn test_rebalance_keeps_groups() {
        let grouped = ExpressionNode::unary(
            UnaryOp::Group,
            ExpressionNode::binary(BinaryOp::Addition, lit(2.0), lit(3.0), None),
            None,
        );
        let product = ExpressionNode::binary(BinaryOp::Multiplication, grouped, lit(4.0), None);
        assert_eq!(eval(&product), Value::from(20.0));
    }

    #[test]
    fn test_switch_returns_first_defined_case() {
        let undefined_case = ExpressionNode::binary(
            BinaryOp::Case,
            ExpressionNode::literal(Value::from(false), None),
            lit(1.0),
            None,
        );
        let taken_case = ExpressionNode::binary(
            BinaryOp::Case,
            ExpressionNode::literal(Value::from(true), None),
            lit(2.0),
            None,
        );
        let switch = ExpressionNode::switch(vec![undefined_case, taken_case], None);
        assert_eq!(eval(&switch), Value::from(2.0));

        let empty = ExpressionNode::switch(vec![], None);
        assert!(eval(&empty).is_undefined());
    }

    #[test]
    fn test_optimize_folds_constants() {
        let sum = ExpressionNode::binary(BinaryOp::Addition, lit(3.0), lit(7.0), None);
        assert_eq!(
            sum.optimize(),
            ExpressionNode::literal(Value::from(10.0), None)
        );

        let with_variable = ExpressionNode::binary(
            BinaryOp::Addition,
            lit(3.0),
            ExpressionNode::variable("a", None),
            None,
        );
        assert_eq!(with_variable.optimize(), with_variable);
    }

    #[test]
    fn test_optimize_keeps_failing_subtrees() {
        // 1 + 'a' fails to evaluate; optimization must not swallow the error.
        let bad = ExpressionNode::binary(
            BinaryOp::Addition,
            lit(1.0),
            ExpressionNode::literal(Value::from("a"), None),
            None,
        );
        let optimized = bad.optimize();
        assert_eq!(optimized, bad);
        assert!(optimized.evaluate(&VariableTable::new()).is_err());
    }

    #[test]
    fn test_auto_range_binds_parameter() {
        // [1, 2, 3][1..] == [2, 3]
        let array = ExpressionNode::array(vec![lit(1.0), lit(2.0), lit(3.0)], None);
        let subscript = ExpressionNode::subscript(
            array,
            ExpressionNode::auto_range_with_left_operand(lit(1.0), None),
            None,
        );
        assert_eq!(
            eval(&subscript),
            Value::from(vec![Value::from(2.0), Value::from(3.0)])
        );
    }
}
