//! Statistics collection for query optimization.
//!
//! One pass over a CSV table produces its `TableStatistics`: the row
//! count plus, per column, min/max, an exact distinct count, the null
//! count and (for numeric columns) an equi-width histogram. The loader is
//! deterministic and idempotent; re-analyzing an unchanged file yields
//! identical statistics.
//!
//! The baseline cost model only consumes row counts; the per-column
//! detail is collected for inspection (`rowmill analyze`) and for future
//! selectivity refinement.
//!
//! # Example
//!
//! ```rust,ignore
//! let stats = load_statistics("customers.csv", &StatisticsConfig::default())?;
//! assert_eq!(stats.row_count, 3);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::storage::{CsvReader, StorageResult};
use crate::value::{DataType, Value};

/// Statistics for a single table, keyed in the catalog by source path.
#[derive(Clone, Debug, Serialize)]
pub struct TableStatistics {
    /// Total number of data rows
    pub row_count: u64,
    /// Per-column statistics, in schema order
    pub columns: Vec<ColumnStatistics>,
}

/// Statistics for a single column.
#[derive(Clone, Debug, Serialize)]
pub struct ColumnStatistics {
    /// Column name
    pub name: String,
    /// Minimum non-null value
    pub min: Option<Value>,
    /// Maximum non-null value
    pub max: Option<Value>,
    /// Number of distinct non-null values (exact)
    pub distinct_count: u64,
    /// Number of null cells
    pub null_count: u64,
    /// Equi-width bucket counts over [min, max], numeric columns only
    pub histogram: Option<Vec<u64>>,
}

/// Configuration for statistics collection.
#[derive(Clone, Debug, serde::Deserialize, Serialize)]
pub struct StatisticsConfig {
    /// Number of histogram buckets; 0 disables histograms
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: usize,
}

fn default_histogram_buckets() -> usize {
    10
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        StatisticsConfig {
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

/// Per-column accumulator for the loader's single pass.
struct ColumnAccumulator {
    name: String,
    dtype: DataType,
    min: Option<Value>,
    max: Option<Value>,
    null_count: u64,
    /// Frequency of each distinct non-null value
    frequencies: HashMap<Value, u64>,
}

impl ColumnAccumulator {
    fn new(name: String, dtype: DataType) -> Self {
        ColumnAccumulator {
            name,
            dtype,
            min: None,
            max: None,
            null_count: 0,
            frequencies: HashMap::new(),
        }
    }

    fn observe(&mut self, value: &Value) {
        if value.is_null() {
            self.null_count += 1;
            return;
        }
        if self
            .min
            .as_ref()
            .map_or(true, |m| value.compare(m) == Some(Ordering::Less))
        {
            self.min = Some(value.clone());
        }
        if self
            .max
            .as_ref()
            .map_or(true, |m| value.compare(m) == Some(Ordering::Greater))
        {
            self.max = Some(value.clone());
        }
        *self.frequencies.entry(value.clone()).or_insert(0) += 1;
    }

    fn finish(self, histogram_buckets: usize) -> ColumnStatistics {
        let histogram = self.build_histogram(histogram_buckets);
        ColumnStatistics {
            name: self.name,
            min: self.min,
            max: self.max,
            distinct_count: self.frequencies.len() as u64,
            null_count: self.null_count,
            histogram,
        }
    }

    /// Equi-width bucket counts over [min, max]. Skipped for string
    /// columns, empty columns and degenerate ranges.
    fn build_histogram(&self, buckets: usize) -> Option<Vec<u64>> {
        if buckets == 0 || !matches!(self.dtype, DataType::Int64 | DataType::Float64) {
            return None;
        }
        let lo = self.min.as_ref()?.as_f64()?;
        let hi = self.max.as_ref()?.as_f64()?;
        if !(hi > lo) {
            return None;
        }
        let width = (hi - lo) / buckets as f64;
        let mut counts = vec![0u64; buckets];
        for (value, freq) in &self.frequencies {
            let Some(v) = value.as_f64() else { continue };
            let mut bucket = ((v - lo) / width) as usize;
            if bucket >= buckets {
                bucket = buckets - 1;
            }
            counts[bucket] += freq;
        }
        Some(counts)
    }
}

/// Read a table once and compute its statistics.
pub fn load_statistics(
    path: impl AsRef<Path>,
    config: &StatisticsConfig,
) -> StorageResult<TableStatistics> {
    let path = path.as_ref();
    let mut reader = CsvReader::open(path)?;

    let mut accumulators: Vec<ColumnAccumulator> = reader
        .schema()
        .fields()
        .iter()
        .map(|(name, dtype)| ColumnAccumulator::new(name.clone(), *dtype))
        .collect();

    let mut row_count = 0u64;
    while let Some(row) = reader.next_row()? {
        row_count += 1;
        for (accumulator, value) in accumulators.iter_mut().zip(row.values()) {
            accumulator.observe(value);
        }
    }

    let columns = accumulators
        .into_iter()
        .map(|acc| acc.finish(config.histogram_buckets))
        .collect();

    info!(path = %path.display(), rows = row_count, "statistics loaded");
    Ok(TableStatistics { row_count, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn analyze(contents: &str) -> TableStatistics {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        load_statistics(file.path(), &StatisticsConfig::default()).expect("stats")
    }

    #[test]
    fn test_row_and_distinct_counts() {
        let stats = analyze("id:integer,name:string\n1,Ann\n2,Ann\n3,Bob\n");
        assert_eq!(stats.row_count, 3);
        assert_eq!(stats.columns[0].distinct_count, 3);
        assert_eq!(stats.columns[1].distinct_count, 2);
    }

    #[test]
    fn test_min_max_and_nulls() {
        let stats = analyze("id:integer,age:integer\n1,25\n2,\n3,40\n4,35\n");
        let age = &stats.columns[1];
        assert_eq!(age.min, Some(Value::Int64(25)));
        assert_eq!(age.max, Some(Value::Int64(40)));
        assert_eq!(age.null_count, 1);
        assert_eq!(age.distinct_count, 3);
    }

    #[test]
    fn test_string_columns_have_no_histogram() {
        let stats = analyze("name:string\nAnn\nBob\n");
        let name = &stats.columns[0];
        assert!(name.histogram.is_none());
        assert_eq!(name.min, Some(Value::string("Ann")));
        assert_eq!(name.max, Some(Value::string("Bob")));
    }

    #[test]
    fn test_histogram_buckets_cover_range() {
        let rows: String = (1..=100).map(|i| format!("{i}\n")).collect();
        let stats = analyze(&format!("n:integer\n{rows}"));
        let histogram = stats.columns[0].histogram.as_ref().expect("histogram");
        assert_eq!(histogram.len(), 10);
        assert_eq!(histogram.iter().sum::<u64>(), 100);
        // Uniform data spreads evenly
        assert!(histogram.iter().all(|&c| c == 10));
    }

    #[test]
    fn test_degenerate_range_skips_histogram() {
        let stats = analyze("n:integer\n5\n5\n5\n");
        assert!(stats.columns[0].histogram.is_none());
        assert_eq!(stats.columns[0].distinct_count, 1);
    }

    #[test]
    fn test_loader_is_idempotent() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"id:integer\n1\n2\n").expect("write");
        let first =
            load_statistics(file.path(), &StatisticsConfig::default()).expect("stats");
        let second =
            load_statistics(file.path(), &StatisticsConfig::default()).expect("stats");
        assert_eq!(first.row_count, second.row_count);
        assert_eq!(first.columns[0].distinct_count, second.columns[0].distinct_count);
        assert_eq!(first.columns[0].min, second.columns[0].min);
    }
}
