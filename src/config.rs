//! Process-wide configuration, passed by reference into table / buffer-pool
//! constructors rather than reached for as a global. Defaults mirror the
//! original Python implementation's `config.py`.

/// Number of metadata columns prepended to every physical record:
/// indirection, rid, timestamp, schema_encoding, tps/brid.
pub const NUM_METADATA_COLS: usize = 5;

/// Physical column index of the indirection pointer.
pub const COL_INDIRECTION: usize = 0;
/// Physical column index of the record's own RID.
pub const COL_RID: usize = 1;
/// Physical column index of the timestamp.
pub const COL_TIMESTAMP: usize = 2;
/// Physical column index of the schema-encoding bitmap.
pub const COL_SCHEMA_ENCODING: usize = 3;
/// Physical column index of the TPS (base) / BRID (tail) field.
pub const COL_TPS_OR_BRID: usize = 4;

/// Sentinel stored in the indirection / rid columns to mean "none" / "deleted".
pub const NONE_SENTINEL: i64 = -1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Bytes used to encode one signed integer cell on disk.
    pub cell_size: usize,
    /// Bytes per physical page (default 4096).
    pub page_size: usize,
    /// Pages grouped into a single on-disk block file.
    pub pages_per_block: usize,
    /// Maximum number of blocks resident in the buffer pool at once.
    pub pool_max_blocks: usize,
    /// Minimum degree for B+Tree indexes.
    pub btree_minimum_degree: usize,
    /// Leaf size below which in-node key lookup uses linear scan instead of binary search.
    pub btree_search_algorithm_threshold: usize,
    /// Incremental-fraction threshold below which `bulk_insert` falls back to one-by-one inserts.
    pub btree_bulk_insert_ratio_threshold: f64,
    /// Tree size below which `bulk_insert` always falls back to one-by-one inserts.
    pub btree_bulk_insert_start_threshold: usize,
    /// Number of tail-page updates accumulated before a page range is queued for merge.
    pub merge_threshold: usize,
    /// Number of tail pages merged per background-merge pass.
    pub num_tails_to_merge: usize,
    /// Seconds the background merge scheduler sleeps between polls.
    pub merge_interval_secs: u64,
}

impl Config {
    /// Number of cells ("records") that fit on one page given this config.
    pub fn cells_per_page(&self) -> usize {
        self.page_size / self.cell_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cell_size: 8,
            page_size: 4096,
            pages_per_block: 16,
            pool_max_blocks: 32,
            btree_minimum_degree: 16,
            btree_search_algorithm_threshold: 16,
            btree_bulk_insert_ratio_threshold: 0.3,
            btree_bulk_insert_start_threshold: 64,
            merge_threshold: 50,
            num_tails_to_merge: 4,
            merge_interval_secs: 1,
        }
    }
}
