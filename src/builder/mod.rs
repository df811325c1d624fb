//! # Plan Builder
//!
//! Fluent construction of operator trees:
//!
//! ```rust,ignore
//! let plan = PlanBuilder::scan("customers.csv")?
//!     .filter("age > 30")?
//!     .project(["name"])?
//!     .sink("out.csv")
//!     .build();
//! ```
//!
//! Predicate text follows the grammar `<col|literal> <op> <col|literal>`
//! with `op ∈ {=, !=, <, <=, >, >=}`. A numeric token becomes an integer
//! literal when integral, a double otherwise; any other token is an
//! identifier, resolved against the evaluating row's schema at runtime and
//! treated as a string literal when it names no column. Join predicate
//! text is restricted to a single equality between one column of each
//! side.
//!
//! `scan` reads only the CSV header, so building a plan never streams
//! data.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::plan::{CompareOp, JoinPredicate, Operand, PlanNode, Predicate};
use crate::storage::{self, StorageError};
use crate::value::Value;

/// Errors raised while constructing a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Predicate text does not match `<operand> <op> <operand>`
    #[error("cannot parse predicate '{0}': expected '<col|literal> <op> <col|literal>'")]
    PredicateSyntax(String),

    /// Unknown comparison operator token
    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    /// Join predicate is not a single equality
    #[error("join predicate '{0}' must be a single equality between columns")]
    NonEqualityJoin(String),

    /// Join column does not belong to either input
    #[error("join column '{0}' not found on either side of the join")]
    UnknownJoinColumn(String),

    /// Projection with no columns
    #[error("projection must name at least one column")]
    EmptyProjection,

    /// Reading the scan header failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for plan construction
pub type PlanResult<T> = Result<T, PlanError>;

/// Parse predicate text into a `Predicate`.
pub fn parse_predicate(text: &str) -> PlanResult<Predicate> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [left, op, right] = tokens.as_slice() else {
        return Err(PlanError::PredicateSyntax(text.to_string()));
    };
    let op =
        CompareOp::from_symbol(op).ok_or_else(|| PlanError::UnknownOperator((*op).to_string()))?;
    Ok(Predicate::compare(parse_operand(left), op, parse_operand(right)))
}

/// Literal when numeric (integer if integral, double otherwise) or
/// single-quoted; identifier otherwise.
fn parse_operand(token: &str) -> Operand {
    if let Ok(i) = token.parse::<i64>() {
        return Operand::Literal(Value::Int64(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Operand::Literal(Value::Float64(f));
    }
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        return Operand::Literal(Value::string(&token[1..token.len() - 1]));
    }
    Operand::Ident(token.to_string())
}

/// Fluent builder over a growing plan tree.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    root: PlanNode,
}

impl PlanBuilder {
    /// Start a plan from a CSV table. Reads the header to capture the
    /// scan schema.
    pub fn scan(path: impl AsRef<Path>) -> PlanResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let schema = storage::read_schema(&path)?;
        Ok(PlanBuilder {
            root: PlanNode::Scan { path, schema },
        })
    }

    /// Wrap the current plan in a filter parsed from predicate text.
    pub fn filter(self, text: &str) -> PlanResult<Self> {
        let predicate = parse_predicate(text)?;
        Ok(PlanBuilder {
            root: PlanNode::Filter {
                input: Box::new(self.root),
                predicate,
            },
        })
    }

    /// Join with another plan on `"<left_col> = <right_col>"`. The column
    /// order in the text is free; each column is matched to the side that
    /// owns it.
    pub fn join(self, other: PlanBuilder, on: &str) -> PlanResult<Self> {
        let tokens: Vec<&str> = on.split_whitespace().collect();
        let [first, op, second] = tokens.as_slice() else {
            return Err(PlanError::NonEqualityJoin(on.to_string()));
        };
        if *op != "=" {
            return Err(PlanError::NonEqualityJoin(on.to_string()));
        }

        let left_schema = self.root.output_schema();
        let right_schema = other.root.output_schema();
        let predicate = if left_schema.contains(first) && right_schema.contains(second) {
            JoinPredicate::equality(*first, *second)
        } else if left_schema.contains(second) && right_schema.contains(first) {
            JoinPredicate::equality(*second, *first)
        } else {
            let missing = if left_schema.contains(first) || right_schema.contains(first) {
                *second
            } else {
                *first
            };
            return Err(PlanError::UnknownJoinColumn(missing.to_string()));
        };

        Ok(PlanBuilder {
            root: PlanNode::Join {
                left: Box::new(self.root),
                right: Box::new(other.root),
                predicate,
            },
        })
    }

    /// Project to the named columns, in order, without deduplication.
    pub fn project<I, S>(self, columns: I) -> PlanResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_inner(columns, false)
    }

    /// Project to the named columns, suppressing duplicate rows.
    pub fn project_distinct<I, S>(self, columns: I) -> PlanResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_inner(columns, true)
    }

    fn project_inner<I, S>(self, columns: I, distinct: bool) -> PlanResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(PlanError::EmptyProjection);
        }
        Ok(PlanBuilder {
            root: PlanNode::Project {
                input: Box::new(self.root),
                columns,
                distinct,
            },
        })
    }

    /// Cap the plan with an output sink.
    pub fn sink(self, path: impl AsRef<Path>) -> Self {
        PlanBuilder {
            root: PlanNode::Sink {
                input: Box::new(self.root),
                path: path.as_ref().to_path_buf(),
            },
        }
    }

    /// Finish, yielding the plan tree.
    pub fn build(self) -> PlanNode {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn customers_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"id:integer,name:string,age:integer\n1,Ann,25\n")
            .expect("write");
        file
    }

    fn orders_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"oid:integer,cid:integer\n10,2\n").expect("write");
        file
    }

    #[test]
    fn test_parse_predicate_literals() {
        let pred = parse_predicate("age > 30").expect("parse");
        assert_eq!(
            pred,
            Predicate::compare(
                Operand::Ident("age".to_string()),
                CompareOp::Gt,
                Operand::Literal(Value::Int64(30)),
            )
        );

        let pred = parse_predicate("score <= 2.5").expect("parse");
        assert_eq!(
            pred,
            Predicate::compare(
                Operand::Ident("score".to_string()),
                CompareOp::Le,
                Operand::Literal(Value::Float64(2.5)),
            )
        );

        // A bare word stays an identifier; quoting forces a string literal
        let pred = parse_predicate("department = engineering").expect("parse");
        assert_eq!(
            pred,
            Predicate::compare(
                Operand::Ident("department".to_string()),
                CompareOp::Eq,
                Operand::Ident("engineering".to_string()),
            )
        );
        let pred = parse_predicate("department = 'engineering'").expect("parse");
        assert_eq!(
            pred,
            Predicate::compare(
                Operand::Ident("department".to_string()),
                CompareOp::Eq,
                Operand::Literal(Value::string("engineering")),
            )
        );
    }

    #[test]
    fn test_parse_predicate_rejects_garbage() {
        assert!(matches!(
            parse_predicate("age >"),
            Err(PlanError::PredicateSyntax(_))
        ));
        assert!(matches!(
            parse_predicate("age >> 30"),
            Err(PlanError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_scan_captures_schema() {
        let file = customers_file();
        let plan = PlanBuilder::scan(file.path()).expect("scan").build();
        let schema = plan.output_schema();
        assert_eq!(schema.arity(), 3);
        assert_eq!(schema.index_of("age"), Some(2));
    }

    #[test]
    fn test_join_resolves_sides() {
        let customers = customers_file();
        let orders = orders_file();

        let plan = PlanBuilder::scan(customers.path())
            .expect("scan")
            .join(PlanBuilder::scan(orders.path()).expect("scan"), "id = cid")
            .expect("join")
            .build();

        let PlanNode::Join { predicate, .. } = &plan else {
            panic!("expected a join root");
        };
        assert_eq!(predicate.left_column(), "id");
        assert_eq!(predicate.right_column(), "cid");
    }

    #[test]
    fn test_join_accepts_reversed_column_order() {
        let customers = customers_file();
        let orders = orders_file();

        let plan = PlanBuilder::scan(customers.path())
            .expect("scan")
            .join(PlanBuilder::scan(orders.path()).expect("scan"), "cid = id")
            .expect("join")
            .build();

        let PlanNode::Join { predicate, .. } = &plan else {
            panic!("expected a join root");
        };
        // Normalized: left column belongs to the left input
        assert_eq!(predicate.left_column(), "id");
        assert_eq!(predicate.right_column(), "cid");
    }

    #[test]
    fn test_join_unknown_column() {
        let customers = customers_file();
        let orders = orders_file();

        let result = PlanBuilder::scan(customers.path())
            .expect("scan")
            .join(PlanBuilder::scan(orders.path()).expect("scan"), "id = zip");
        assert!(matches!(result, Err(PlanError::UnknownJoinColumn(col)) if col == "zip"));
    }

    #[test]
    fn test_empty_projection_rejected() {
        let file = customers_file();
        let result = PlanBuilder::scan(file.path())
            .expect("scan")
            .project(Vec::<String>::new());
        assert!(matches!(result, Err(PlanError::EmptyProjection)));
    }

    #[test]
    fn test_full_pipeline_shape() {
        let customers = customers_file();
        let plan = PlanBuilder::scan(customers.path())
            .expect("scan")
            .filter("age > 30")
            .expect("filter")
            .project(["name"])
            .expect("project")
            .sink("out.csv")
            .build();

        let rendered = plan.pretty_print(0);
        assert!(rendered.starts_with("Sink(out.csv)"));
        assert!(rendered.contains("Project([\"name\"], distinct=false)"));
        assert!(rendered.contains("Filter(age > 30)"));
    }
}
