//! # Value Type System
//!
//! Core value types for the engine: Int64, Float64, String, Null, plus the
//! typed schemas and tuples that flow through the operator pipeline.
//!
//! All comparison semantics live here. `Value::compare` is the single
//! source of truth used by predicate evaluation and by hash-join key
//! canonicalization, so the two can never disagree:
//!
//! - integers and doubles widen to double and compare numerically,
//! - strings compare lexicographically,
//! - a string against a number compares by canonical textual form,
//! - anything against null does not compare at all (`None`).
//!
//! ## Usage
//!
//! ```rust
//! use rowmill::value::{DataType, Schema, Tuple, Value};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(Schema::new(vec![
//!     ("id".to_string(), DataType::Int64),
//!     ("name".to_string(), DataType::String),
//! ]));
//!
//! let tuple = Tuple::new(schema, vec![Value::Int64(1), Value::string("Ann")]);
//! assert_eq!(tuple.get("name"), Value::string("Ann"));
//! assert!(tuple.get("missing").is_null());
//! ```

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Column types understood by the CSV schema header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 64-bit signed integer (`integer` in headers)
    Int64,
    /// 64-bit float (`double` in headers)
    Float64,
    /// UTF-8 text (`string` in headers)
    String,
}

impl DataType {
    /// Parse a schema-header type keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "integer" => Some(DataType::Int64),
            "double" => Some(DataType::Float64),
            "string" => Some(DataType::String),
            _ => None,
        }
    }

    /// The keyword used in CSV schema headers.
    pub fn keyword(&self) -> &'static str {
        match self {
            DataType::Int64 => "integer",
            DataType::Float64 => "double",
            DataType::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A dynamically typed scalar cell.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent or unparseable cell
    Null,
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit float
    Float64(f64),
    /// UTF-8 text (cheaply cloneable)
    String(Arc<str>),
}

/// Canonical hash-join key for a value.
///
/// Numerics are keyed by their widened double bits so that `Int64(5)` and
/// `Float64(5.0)` land in the same bucket. Text that parses as a number is
/// keyed the same way, because the textual fallback of `Value::compare`
/// makes `String("7")` equal to `Int64(7)`; equal values must never land
/// in different buckets. The collisions this invites (`String("7.0")`
/// shares a bucket with `Int64(7)` without being equal to it) are
/// resolved by the join's per-bucket predicate re-verification. Null
/// values have no key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    /// Any numeric value (or numeric-looking text), widened to double
    Number(u64),
    /// Text that does not parse as a number
    Text(Arc<str>),
}

impl Value {
    /// Convenience constructor for string values.
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The declared type this value belongs to, if any.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
        }
    }

    /// Widen to double when numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Three-way comparison with the engine's coercion rules.
    ///
    /// Returns `None` exactly when either side is null; every non-null pair
    /// is ordered. Doubles use `total_cmp`, so the ordering is total and
    /// deterministic even in the presence of NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(l), Some(r)) => Some(l.total_cmp(&r)),
                _ => match (self, other) {
                    (Value::String(l), Value::String(r)) => Some(l.as_ref().cmp(r.as_ref())),
                    // Mixed kinds fall back to canonical textual forms.
                    _ => Some(self.canonical_text().cmp(&other.canonical_text())),
                },
            },
        }
    }

    /// Canonical bucketing key for hash joins, `None` for null.
    ///
    /// Consistent with `compare`: two values that compare equal map to the
    /// same key. Keys may collide across values that are not equal; the
    /// join re-verifies every bucket entry, so collisions cost a
    /// comparison, never a wrong row.
    pub fn join_key(&self) -> Option<JoinKey> {
        match self {
            Value::Null => None,
            Value::Int64(i) => Some(JoinKey::Number((*i as f64).to_bits())),
            Value::Float64(f) => Some(JoinKey::Number(f.to_bits())),
            // Numeric-looking text compares equal to the number with the
            // same canonical spelling, so it must share that number's
            // bucket.
            Value::String(s) => match s.parse::<f64>() {
                Ok(f) => Some(JoinKey::Number(f.to_bits())),
                Err(_) => Some(JoinKey::Text(Arc::clone(s))),
            },
        }
    }

    /// The textual form used for mixed-kind comparison and CSV output.
    /// Null renders as the empty string.
    ///
    /// Doubles render in Rust's shortest round-trip form, so the value is
    /// preserved exactly but the spelling is normalized: a cell read as
    /// `5.00` writes back as `5`. Output files are canonical in this
    /// sense; see the storage module for the full output convention.
    pub fn canonical_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::String(s) => s.to_string(),
        }
    }
}

// Serialized as the natural JSON scalar, for `analyze --json` output.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Float64(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

// Structural equality: used by distinct projection, where Int64(5) and
// Float64(5.0) are different values. Coercing equality lives in `compare`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int64(l), Value::Int64(r)) => l == r,
            (Value::Float64(l), Value::Float64(r)) => l.to_bits() == r.to_bits(),
            (Value::String(l), Value::String(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Int64(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Value::Float64(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

/// An ordered sequence of `(column name, type)` pairs.
///
/// Column names are globally unique across all input tables; that
/// invariant is what makes name-based attribute resolution unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, DataType)>,
}

impl Schema {
    pub fn new(fields: Vec<(String, DataType)>) -> Self {
        Schema { fields }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[(String, DataType)] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn field_type(&self, index: usize) -> Option<DataType> {
        self.fields.get(index).map(|(_, t)| *t)
    }

    /// Schema of a join output: left fields then right fields.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema { fields }
    }

    /// Schema of a projection: exactly `names`, types inherited from this
    /// schema. Unknown names project to null at runtime and are typed as
    /// strings here.
    pub fn project(&self, names: &[String]) -> Schema {
        let fields = names
            .iter()
            .map(|name| {
                let dtype = self
                    .index_of(name)
                    .and_then(|i| self.field_type(i))
                    .unwrap_or(DataType::String);
                (name.clone(), dtype)
            })
            .collect();
        Schema { fields }
    }
}

/// A row: values paired with a shared reference to their schema.
///
/// Invariant: `values.len() == schema.arity()`. Operators uphold this by
/// construction; it is checked in debug builds.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(
            values.len(),
            schema.arity(),
            "tuple arity disagrees with schema"
        );
        Tuple { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Value at a position, null when out of range.
    pub fn value_at(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Column lookup by name; unknown names resolve to null.
    pub fn get(&self, name: &str) -> Value {
        match self.schema.index_of(name) {
            Some(index) => self.value_at(index),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(
            Value::Int64(5).compare(&Value::Float64(5.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Int64(2).compare(&Value::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float64(10.0).compare(&Value::Int64(3)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        assert_eq!(
            Value::string("Ann").compare(&Value::string("Bob")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::string("Bob").compare(&Value::string("Bob")),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_mixed_kinds_fall_back_to_text() {
        // "10" < "9" lexicographically
        assert_eq!(
            Value::Int64(10).compare(&Value::string("9")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::string("42").compare(&Value::Int64(42)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_null_never_compares() {
        assert_eq!(Value::Null.compare(&Value::Int64(1)), None);
        assert_eq!(Value::string("x").compare(&Value::Null), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_join_key_canonicalizes_numerics() {
        assert_eq!(Value::Int64(5).join_key(), Value::Float64(5.0).join_key());
        assert_ne!(Value::Int64(5).join_key(), Value::Int64(6).join_key());
        assert_eq!(Value::Null.join_key(), None);
    }

    #[test]
    fn test_join_key_canonicalizes_numeric_text() {
        // "7" compares equal to 7 via the textual fallback, so it must
        // share the numeric bucket.
        assert_eq!(Value::string("7").join_key(), Value::Int64(7).join_key());
        assert_eq!(
            Value::string("7.5").join_key(),
            Value::Float64(7.5).join_key()
        );
        // "7.0" is NOT equal to 7 (texts differ), but sharing the bucket
        // is fine: the join re-verifies every bucket entry.
        assert_eq!(Value::string("7.0").join_key(), Value::Int64(7).join_key());
        assert_ne!(
            Value::string("seven").join_key(),
            Value::Int64(7).join_key()
        );
    }

    #[test]
    fn test_join_key_agrees_with_compare() {
        let values = [
            Value::Int64(7),
            Value::Float64(7.0),
            Value::Float64(7.5),
            Value::string("7"),
            Value::string("7.0"),
            Value::string("seven"),
        ];
        for l in &values {
            for r in &values {
                let equal = l.compare(r) == Some(Ordering::Equal);
                let same_key = l.join_key() == r.join_key();
                // Equal values must share a bucket. (The reverse need not
                // hold; probe re-verification handles collisions.)
                if equal {
                    assert!(same_key, "{l:?} == {r:?} but keys differ");
                }
            }
        }
    }

    #[test]
    fn test_structural_equality_does_not_coerce() {
        assert_ne!(Value::Int64(5), Value::Float64(5.0));
        assert_eq!(Value::Float64(1.5), Value::Float64(1.5));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn test_data_type_keywords() {
        assert_eq!(DataType::from_keyword("integer"), Some(DataType::Int64));
        assert_eq!(DataType::from_keyword("double"), Some(DataType::Float64));
        assert_eq!(DataType::from_keyword("string"), Some(DataType::String));
        assert_eq!(DataType::from_keyword("boolean"), None);
        assert_eq!(DataType::Int64.keyword(), "integer");
    }

    #[test]
    fn test_schema_lookup_and_projection() {
        let schema = Schema::new(vec![
            ("id".to_string(), DataType::Int64),
            ("name".to_string(), DataType::String),
            ("age".to_string(), DataType::Int64),
        ]);

        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("salary"), None);

        let projected = schema.project(&["name".to_string(), "salary".to_string()]);
        assert_eq!(projected.arity(), 2);
        assert_eq!(projected.field_type(0), Some(DataType::String));
        // Unknown column defaults to string
        assert_eq!(projected.field_type(1), Some(DataType::String));
    }

    #[test]
    fn test_schema_concat() {
        let left = Schema::new(vec![("id".to_string(), DataType::Int64)]);
        let right = Schema::new(vec![("oid".to_string(), DataType::Int64)]);
        let joined = left.concat(&right);
        assert_eq!(joined.arity(), 2);
        assert_eq!(joined.index_of("oid"), Some(1));
    }

    #[test]
    fn test_tuple_lookup() {
        let schema = Arc::new(Schema::new(vec![
            ("id".to_string(), DataType::Int64),
            ("name".to_string(), DataType::String),
        ]));
        let tuple = Tuple::new(schema, vec![Value::Int64(1), Value::string("Ann")]);

        assert_eq!(tuple.get("id"), Value::Int64(1));
        assert_eq!(tuple.get("name"), Value::string("Ann"));
        assert!(tuple.get("unknown").is_null());
    }

    #[test]
    fn test_value_display_matches_csv_form() {
        assert_eq!(Value::Int64(42).to_string(), "42");
        assert_eq!(Value::Float64(2.5).to_string(), "2.5");
        assert_eq!(Value::string("Ann").to_string(), "Ann");
        assert_eq!(Value::Null.to_string(), "");
    }
}
