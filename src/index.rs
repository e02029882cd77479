//! Per-table collection of secondary indexes, plus the always-present
//! unique ordered index on the primary key. See spec section 4.6.
//!
//! `Index` itself never scans table data: `locate`/`locate_range` return
//! `None` when a column isn't indexed, and the caller (the table layer,
//! which owns the column data) is responsible for a full scan and for
//! calling `build_index` once the auto-index heuristic fires.

use std::collections::HashMap;

use crate::btree::BPlusTree;
use crate::config::Config;
use crate::errors::DatabaseError;
use crate::hash_index::HashIndex;

enum IndexKind {
    BTree(BPlusTree),
    Hash(HashIndex),
}

impl IndexKind {
    fn insert(&mut self, key: i64, rid: i64) -> Result<(), DatabaseError> {
        match self {
            IndexKind::BTree(t) => t.insert(key, rid),
            IndexKind::Hash(h) => h.insert(key, rid),
        }
    }

    fn remove(&mut self, key: i64, rid: i64) -> Result<(), DatabaseError> {
        match self {
            IndexKind::BTree(t) => t.remove(key, rid),
            IndexKind::Hash(h) => h.remove(key, rid),
        }
    }

    fn update(&mut self, key: i64, old_rid: i64, new_rid: i64) -> Result<(), DatabaseError> {
        match self {
            IndexKind::BTree(t) => t.update(key, old_rid, new_rid),
            IndexKind::Hash(h) => h.update(key, old_rid, new_rid),
        }
    }

    fn get(&self, key: i64) -> Vec<i64> {
        match self {
            IndexKind::BTree(t) => t.get(key).map(|s| s.to_vec()).unwrap_or_default(),
            IndexKind::Hash(h) => h.get(key).map(|s| s.to_vec()).unwrap_or_default(),
        }
    }

    fn get_range(&self, lo: i64, hi: i64) -> Vec<(i64, i64)> {
        match self {
            IndexKind::BTree(t) => t.get_range(lo, hi),
            IndexKind::Hash(h) => h.get_range(lo, hi),
        }
    }
}

/// Number of distinct-column point/range queries against an unindexed
/// column before the table layer is told to build an index for it.
const AUTO_INDEX_QUERY_THRESHOLD: usize = 2;

pub struct Index {
    config: Config,
    primary_key_column: usize,
    indexes: HashMap<usize, IndexKind>,
    query_counts: HashMap<usize, usize>,
}

impl Index {
    pub fn new(config: Config, primary_key_column: usize) -> Self {
        let mut indexes = HashMap::new();
        indexes.insert(
            primary_key_column,
            IndexKind::BTree(BPlusTree::new(&config, true)),
        );
        Index {
            config,
            primary_key_column,
            indexes,
            query_counts: HashMap::new(),
        }
    }

    pub fn is_indexed(&self, column: usize) -> bool {
        self.indexes.contains_key(&column)
    }

    /// Record a point/range query against `column`. Returns `true` exactly
    /// once, the call that crosses `AUTO_INDEX_QUERY_THRESHOLD`, signalling
    /// the table layer should build an index for this column now.
    pub fn record_query(&mut self, column: usize) -> bool {
        if self.is_indexed(column) {
            return false;
        }
        let count = self.query_counts.entry(column).or_insert(0);
        *count += 1;
        *count == AUTO_INDEX_QUERY_THRESHOLD
    }

    /// Build a B+Tree index over `column` from a full column scan of
    /// `(value, rid)` pairs. `unique` should reflect whether the column is
    /// known to hold unique values (only the primary key reliably is).
    pub fn build_index(
        &mut self,
        column: usize,
        data: &[(i64, i64)],
        unique: bool,
    ) -> Result<(), DatabaseError> {
        let mut tree = BPlusTree::new(&self.config, unique);
        tree.bulk_insert(data)?;
        self.indexes.insert(column, IndexKind::BTree(tree));
        Ok(())
    }

    pub fn drop_index(&mut self, column: usize) -> Result<(), DatabaseError> {
        if column == self.primary_key_column {
            return Err(DatabaseError::ColumnOutOfRange {
                column,
                num_columns: column + 1,
            });
        }
        self.indexes.remove(&column);
        self.query_counts.remove(&column);
        Ok(())
    }

    /// Point lookup. `None` means the column isn't indexed; the caller must
    /// fall back to a full table scan (and should call `record_query` first).
    pub fn locate(&self, column: usize, value: i64) -> Option<Vec<i64>> {
        self.indexes.get(&column).map(|idx| idx.get(value))
    }

    pub fn locate_range(&self, column: usize, lo: i64, hi: i64) -> Option<Vec<(i64, i64)>> {
        self.indexes.get(&column).map(|idx| idx.get_range(lo, hi))
    }

    pub fn maintain_insert(
        &mut self,
        column_values: &[i64],
        rid: i64,
    ) -> Result<(), DatabaseError> {
        for (column, idx) in self.indexes.iter_mut() {
            if let Some(value) = column_values.get(*column) {
                idx.insert(*value, rid)?;
            }
        }
        Ok(())
    }

    pub fn maintain_update(
        &mut self,
        column: usize,
        old_value: i64,
        new_value: i64,
        rid: i64,
    ) -> Result<(), DatabaseError> {
        if let Some(idx) = self.indexes.get_mut(&column) {
            if old_value == new_value {
                return Ok(());
            }
            // Value changed identity: remove the stale entry and insert fresh
            // rather than updating in place, since the key itself moved.
            idx.remove(old_value, rid)?;
            idx.insert(new_value, rid)?;
        }
        Ok(())
    }

    pub fn maintain_delete(
        &mut self,
        column_values: &[i64],
        rid: i64,
    ) -> Result<(), DatabaseError> {
        for (column, idx) in self.indexes.iter_mut() {
            if let Some(value) = column_values.get(*column) {
                idx.remove(*value, rid)?;
            }
        }
        Ok(())
    }
}
