//! Catalog: per-table statistics keyed by source path.
//!
//! The catalog is populated once, before optimization, by running the
//! statistics loader over each input table; the optimizer then reads it
//! but never the data. It is passed into `optimize` explicitly and taken
//! by shared reference there, so it stays frozen for the whole rewrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::statistics::{self, StatisticsConfig, TableStatistics};
use crate::storage::StorageResult;

/// Maps a table's identity (its source file path) to its statistics.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<PathBuf, TableStatistics>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: HashMap::new(),
        }
    }

    /// Run the statistics loader over a table and record the result.
    /// Idempotent: re-analyzing an unchanged file replaces the entry with
    /// identical statistics.
    pub fn analyze(
        &mut self,
        path: impl AsRef<Path>,
        config: &StatisticsConfig,
    ) -> StorageResult<()> {
        let path = path.as_ref().to_path_buf();
        let stats = statistics::load_statistics(&path, config)?;
        self.tables.insert(path, stats);
        Ok(())
    }

    /// Record externally computed statistics (used by tests and harnesses
    /// that fabricate cardinalities).
    pub fn register(&mut self, path: impl Into<PathBuf>, stats: TableStatistics) {
        self.tables.insert(path.into(), stats);
    }

    pub fn get(&self, path: &Path) -> Option<&TableStatistics> {
        self.tables.get(path)
    }

    /// Row count for a table, if it has been analyzed.
    pub fn row_count(&self, path: &Path) -> Option<u64> {
        self.tables.get(path).map(|stats| stats.row_count)
    }

    pub fn has_table(&self, path: &Path) -> bool {
        self.tables.contains_key(path)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&PathBuf, &TableStatistics)> {
        self.tables.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
