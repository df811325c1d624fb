//! Hash join operator: build-left, probe-right equi-join.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::executor::{ExecResult, ExecutorError, Lifecycle, Operator};
use crate::plan::JoinPredicate;
use crate::value::{JoinKey, Schema, Tuple};

/// Two-phase hash join.
///
/// Open drains the left child completely into an in-memory hash table
/// keyed by the canonical form of the join column; that full
/// materialization of the build side is the documented scaling limit.
/// Rows with a null build key are skipped, since null never equals
/// anything. Next then streams the right child: each probe row with a
/// non-null key looks up its bucket, every bucket entry is re-verified
/// against the predicate (hash buckets may collide across coerced
/// types), and one concatenated row is emitted per verified match.
///
/// Output order is probe order on the outside and build insertion order
/// within one probe row. Duplicate build keys are all preserved, giving
/// the Cartesian pair-up per probe match.
///
/// Key coercion follows the predicate's comparison rules: integers and
/// doubles bucket by their widened double value, and numeric-looking text
/// buckets with the number it spells, so a string probe like `"7"` finds
/// an integer build key `7`. The re-verification step rejects bucket
/// mates that merely collide (`"7.0"` against `7`).
pub struct HashJoinOperator {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    predicate: JoinPredicate,
    schema: Arc<Schema>,
    table: HashMap<JoinKey, Vec<Tuple>>,
    /// Matches for the current probe row, drained one per next() call
    pending: Vec<Tuple>,
    pending_at: usize,
    state: Lifecycle,
}

impl HashJoinOperator {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, predicate: JoinPredicate) -> Self {
        let schema = Arc::new(left.schema().concat(right.schema()));
        HashJoinOperator {
            left,
            right,
            predicate,
            schema,
            table: HashMap::new(),
            pending: Vec::new(),
            pending_at: 0,
            state: Lifecycle::Created,
        }
    }
}

impl Operator for HashJoinOperator {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn open(&mut self) -> ExecResult<()> {
        trace!(operator = "HashJoin", predicate = %self.predicate, "open");
        self.left.open()?;
        self.right.open()?;

        // Build phase: materialize the left child.
        let build_column = self.predicate.left_column().to_string();
        let mut built = 0usize;
        while let Some(row) = self.left.next()? {
            let Some(key) = row.get(&build_column).join_key() else {
                continue;
            };
            self.table.entry(key).or_default().push(row);
            built += 1;
        }
        debug!(
            operator = "HashJoin",
            rows = built,
            buckets = self.table.len(),
            "build phase complete"
        );

        self.state = Lifecycle::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        self.state.expect_open("HashJoin", "next")?;
        loop {
            // Drain matches of the current probe row first.
            if self.pending_at < self.pending.len() {
                let row = self.pending[self.pending_at].clone();
                self.pending_at += 1;
                trace!(operator = "HashJoin", produced = true, "next");
                return Ok(Some(row));
            }

            let Some(probe) = self.right.next()? else {
                trace!(operator = "HashJoin", produced = false, "next");
                return Ok(None);
            };
            let Some(key) = probe.get(self.predicate.right_column()).join_key() else {
                continue;
            };
            let Some(bucket) = self.table.get(&key) else {
                continue;
            };

            let pending: Vec<Tuple> = bucket
                .iter()
                .filter(|build_row| self.predicate.matches(build_row, &probe))
                .map(|build_row| {
                    let mut values = build_row.values().to_vec();
                    values.extend_from_slice(probe.values());
                    Tuple::new(Arc::clone(&self.schema), values)
                })
                .collect();
            self.pending = pending;
            self.pending_at = 0;
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if self.state == Lifecycle::Closed {
            return Err(ExecutorError::InvalidState {
                operator: "HashJoin",
                call: "close",
                state: self.state.name(),
            });
        }
        trace!(operator = "HashJoin", "close");
        self.table.clear();
        self.pending.clear();
        self.state = Lifecycle::Closed;
        let left = self.left.close();
        let right = self.right.close();
        left.and(right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RowsOperator;
    use crate::value::{DataType, Value};

    fn customers() -> (Arc<Schema>, Vec<Tuple>) {
        let schema = Arc::new(Schema::new(vec![
            ("id".to_string(), DataType::Int64),
            ("name".to_string(), DataType::String),
        ]));
        let rows = vec![
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(1), Value::string("Ann")]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(2), Value::string("Bob")]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(3), Value::string("Cal")]),
        ];
        (schema, rows)
    }

    fn orders() -> (Arc<Schema>, Vec<Tuple>) {
        let schema = Arc::new(Schema::new(vec![
            ("oid".to_string(), DataType::Int64),
            ("cid".to_string(), DataType::Int64),
        ]));
        let rows = vec![
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(10), Value::Int64(2)]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(11), Value::Int64(3)]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(12), Value::Int64(9)]),
        ];
        (schema, rows)
    }

    fn join_all(mut join: HashJoinOperator) -> Vec<Tuple> {
        join.open().expect("open");
        let mut out = Vec::new();
        while let Some(row) = join.next().expect("next") {
            out.push(row);
        }
        join.close().expect("close");
        out
    }

    #[test]
    fn test_join_matches_in_probe_order() {
        let (cs, crows) = customers();
        let (os, orows) = orders();
        let join = HashJoinOperator::new(
            Box::new(RowsOperator::new(cs, crows)),
            Box::new(RowsOperator::new(os, orows)),
            JoinPredicate::equality("id", "cid"),
        );

        let rows = join_all(join);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Value::string("Bob"));
        assert_eq!(rows[0].get("oid"), Value::Int64(10));
        assert_eq!(rows[1].get("name"), Value::string("Cal"));
        assert_eq!(rows[1].get("oid"), Value::Int64(11));
        // Concatenated schema: left fields then right fields
        assert_eq!(rows[0].arity(), 4);
    }

    #[test]
    fn test_join_duplicate_build_keys_pair_up() {
        let schema = Arc::new(Schema::new(vec![("k".to_string(), DataType::Int64)]));
        let left_rows = vec![
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(1)]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(1)]),
        ];
        let right_schema = Arc::new(Schema::new(vec![("j".to_string(), DataType::Int64)]));
        let right_rows = vec![
            Tuple::new(Arc::clone(&right_schema), vec![Value::Int64(1)]),
            Tuple::new(Arc::clone(&right_schema), vec![Value::Int64(1)]),
        ];

        let join = HashJoinOperator::new(
            Box::new(RowsOperator::new(schema, left_rows)),
            Box::new(RowsOperator::new(right_schema, right_rows)),
            JoinPredicate::equality("k", "j"),
        );
        // 2 build rows x 2 probe rows
        assert_eq!(join_all(join).len(), 4);
    }

    #[test]
    fn test_join_null_keys_never_join() {
        let schema = Arc::new(Schema::new(vec![("k".to_string(), DataType::Int64)]));
        let left_rows = vec![
            Tuple::new(Arc::clone(&schema), vec![Value::Null]),
            Tuple::new(Arc::clone(&schema), vec![Value::Int64(1)]),
        ];
        let right_schema = Arc::new(Schema::new(vec![("j".to_string(), DataType::Int64)]));
        let right_rows = vec![
            Tuple::new(Arc::clone(&right_schema), vec![Value::Null]),
            Tuple::new(Arc::clone(&right_schema), vec![Value::Int64(1)]),
        ];

        let join = HashJoinOperator::new(
            Box::new(RowsOperator::new(schema, left_rows)),
            Box::new(RowsOperator::new(right_schema, right_rows)),
            JoinPredicate::equality("k", "j"),
        );
        // Only the 1=1 pair; nulls on either side drop out
        assert_eq!(join_all(join).len(), 1);
    }

    #[test]
    fn test_join_coerces_numeric_and_text_keys() {
        let schema = Arc::new(Schema::new(vec![("k".to_string(), DataType::Int64)]));
        let left_rows = vec![Tuple::new(Arc::clone(&schema), vec![Value::Int64(7)])];
        let right_schema = Arc::new(Schema::new(vec![("j".to_string(), DataType::String)]));
        let right_rows = vec![
            // "7" equals 7 textually and must join; "7.0" only collides
            // with the bucket and must be rejected by re-verification.
            Tuple::new(Arc::clone(&right_schema), vec![Value::string("7")]),
            Tuple::new(Arc::clone(&right_schema), vec![Value::string("7.0")]),
            Tuple::new(Arc::clone(&right_schema), vec![Value::string("seven")]),
        ];

        let join = HashJoinOperator::new(
            Box::new(RowsOperator::new(schema, left_rows)),
            Box::new(RowsOperator::new(right_schema, right_rows)),
            JoinPredicate::equality("k", "j"),
        );
        let rows = join_all(join);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("j"), Value::string("7"));
    }

    #[test]
    fn test_join_coerces_int_and_double_keys() {
        let schema = Arc::new(Schema::new(vec![("k".to_string(), DataType::Int64)]));
        let left_rows = vec![Tuple::new(Arc::clone(&schema), vec![Value::Int64(5)])];
        let right_schema = Arc::new(Schema::new(vec![("j".to_string(), DataType::Float64)]));
        let right_rows = vec![
            Tuple::new(Arc::clone(&right_schema), vec![Value::Float64(5.0)]),
            Tuple::new(Arc::clone(&right_schema), vec![Value::Float64(5.5)]),
        ];

        let join = HashJoinOperator::new(
            Box::new(RowsOperator::new(schema, left_rows)),
            Box::new(RowsOperator::new(right_schema, right_rows)),
            JoinPredicate::equality("k", "j"),
        );
        let rows = join_all(join);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("j"), Value::Float64(5.0));
    }
}
