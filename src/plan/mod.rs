//! # Query Plans
//!
//! Plan trees and predicates, shared by the builder, the optimizer and the
//! executor.
//!
//! A plan is a tree of `PlanNode` variants: `Scan` leaves, `Filter` /
//! `Project` / `Join` interior nodes, and a `Sink` root when the plan is
//! meant to be driven to completion. Nodes own their children exclusively;
//! rewrites construct fresh nodes rather than aliasing subtrees. The scan
//! schema is captured from the CSV header when the plan is built, so every
//! node's output schema is a pure function of the tree.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use tracing::trace;

use crate::value::{Schema, Tuple, Value};

// ============================================================================
// Predicates
// ============================================================================

/// Comparison operators for row predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Parse the operator's surface syntax.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Map a three-way comparison outcome to this operator.
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One side of a comparison.
///
/// A bare identifier is resolved against the evaluating tuple's schema; an
/// identifier naming no column is treated as a string literal. Numeric
/// tokens are parsed into typed literals by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Ident(String),
    Literal(Value),
}

impl Operand {
    fn resolve(&self, tuple: &Tuple) -> Value {
        match self {
            Operand::Ident(name) => {
                if tuple.schema().contains(name) {
                    tuple.get(name)
                } else {
                    Value::string(name.as_str())
                }
            }
            Operand::Literal(value) => value.clone(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Ident(name) => f.write_str(name),
            Operand::Literal(value) => match value {
                Value::String(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
        }
    }
}

/// Row predicate: a pure `Tuple -> bool` function.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `left op right`
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// Conjunction, short-circuiting on false
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Predicate::Compare { left, op, right }
    }

    pub fn and(left: Predicate, right: Predicate) -> Self {
        Predicate::And(Box::new(left), Box::new(right))
    }

    /// Evaluate against a row. Any comparison touching null is false.
    pub fn evaluate(&self, tuple: &Tuple) -> bool {
        match self {
            Predicate::Compare { left, op, right } => {
                let lhs = left.resolve(tuple);
                let rhs = right.resolve(tuple);
                let outcome = match lhs.compare(&rhs) {
                    Some(ordering) => op.matches(ordering),
                    None => false,
                };
                trace!(predicate = %self, outcome, "predicate evaluated");
                outcome
            }
            Predicate::And(lhs, rhs) => lhs.evaluate(tuple) && rhs.evaluate(tuple),
        }
    }

    /// All bare identifiers in the predicate, literals excluded. Whether an
    /// identifier is an attribute or a string literal depends on the schema
    /// it is evaluated against, which is the caller's concern.
    pub fn idents(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_idents(&mut out);
        out
    }

    fn collect_idents<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Ident(name) = operand {
                        out.push(name);
                    }
                }
            }
            Predicate::And(lhs, rhs) => {
                lhs.collect_idents(out);
                rhs.collect_idents(out);
            }
        }
    }

    /// Number of `Compare` leaves, used by the cardinality model.
    pub fn comparison_count(&self) -> u32 {
        match self {
            Predicate::Compare { .. } => 1,
            Predicate::And(lhs, rhs) => lhs.comparison_count() + rhs.comparison_count(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Predicate::And(lhs, rhs) => write!(f, "({lhs} AND {rhs})"),
        }
    }
}

/// Join predicate. Only single-column equality is supported today; the
/// enum keeps the door open for other kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPredicate {
    /// `left column = right column`
    Equality { left: String, right: String },
}

impl JoinPredicate {
    pub fn equality(left: impl Into<String>, right: impl Into<String>) -> Self {
        JoinPredicate::Equality {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Column taken from the build (left) input.
    pub fn left_column(&self) -> &str {
        match self {
            JoinPredicate::Equality { left, .. } => left,
        }
    }

    /// Column taken from the probe (right) input.
    pub fn right_column(&self) -> &str {
        match self {
            JoinPredicate::Equality { right, .. } => right,
        }
    }

    /// Verify a concrete pair of rows, with the same coercion rules as
    /// `Predicate`. Null keys never join.
    pub fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        match self {
            JoinPredicate::Equality {
                left: lcol,
                right: rcol,
            } => left.get(lcol).compare(&right.get(rcol)) == Some(Ordering::Equal),
        }
    }

    /// Whether swapping the join inputs preserves semantics.
    pub fn is_swappable(&self) -> bool {
        matches!(self, JoinPredicate::Equality { .. })
    }

    /// The predicate with its sides exchanged, for a swapped join.
    pub fn swapped(&self) -> JoinPredicate {
        match self {
            JoinPredicate::Equality { left, right } => JoinPredicate::Equality {
                left: right.clone(),
                right: left.clone(),
            },
        }
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPredicate::Equality { left, right } => write!(f, "{left} = {right}"),
        }
    }
}

// ============================================================================
// Plan Nodes
// ============================================================================

/// A node in the operator tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Stream a CSV file in file order
    Scan {
        /// Source file; also the table's identity in the catalog
        path: PathBuf,
        /// Schema parsed from the file header at plan-build time
        schema: Schema,
    },

    /// Keep only rows satisfying the predicate
    Filter {
        input: Box<PlanNode>,
        predicate: Predicate,
    },

    /// Reorder/restrict columns by name, optionally deduplicating
    Project {
        input: Box<PlanNode>,
        /// Output column names, in output order
        columns: Vec<String>,
        /// Suppress duplicate projected rows (exact, first-seen wins)
        distinct: bool,
    },

    /// Hash join: build on the left input, probe with the right
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        predicate: JoinPredicate,
    },

    /// Write rows to a CSV file; the root of an executable plan
    Sink {
        input: Box<PlanNode>,
        path: PathBuf,
    },
}

impl PlanNode {
    /// The schema of rows this node produces. Deterministic in the node
    /// and its inputs; never touches the data.
    pub fn output_schema(&self) -> Schema {
        match self {
            PlanNode::Scan { schema, .. } => schema.clone(),
            PlanNode::Filter { input, .. } => input.output_schema(),
            PlanNode::Project { input, columns, .. } => input.output_schema().project(columns),
            PlanNode::Join { left, right, .. } => {
                left.output_schema().concat(&right.output_schema())
            }
            PlanNode::Sink { input, .. } => input.output_schema(),
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, PlanNode::Scan { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self, PlanNode::Join { .. })
    }

    /// Render the tree for `explain` output and tests.
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        match self {
            PlanNode::Scan { path, schema } => {
                let columns: Vec<&str> = schema.field_names().collect();
                format!("{}Scan({}) columns={:?}", prefix, path.display(), columns)
            }
            PlanNode::Filter { input, predicate } => {
                format!(
                    "{}Filter({})\n{}",
                    prefix,
                    predicate,
                    input.pretty_print(indent + 1)
                )
            }
            PlanNode::Project {
                input,
                columns,
                distinct,
            } => {
                format!(
                    "{}Project({:?}, distinct={})\n{}",
                    prefix,
                    columns,
                    distinct,
                    input.pretty_print(indent + 1)
                )
            }
            PlanNode::Join {
                left,
                right,
                predicate,
            } => {
                format!(
                    "{}HashJoin({})\n{}\n{}",
                    prefix,
                    predicate,
                    left.pretty_print(indent + 1),
                    right.pretty_print(indent + 1)
                )
            }
            PlanNode::Sink { input, path } => {
                format!(
                    "{}Sink({})\n{}",
                    prefix,
                    path.display(),
                    input.pretty_print(indent + 1)
                )
            }
        }
    }
}
