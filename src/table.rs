//! A table: page directory + index + lock manager + background merge, plus
//! the external query surface (insert/select/update/delete/sum/increment).
//! See spec sections 4.11 and 6.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::config::{Config, COL_RID, COL_SCHEMA_ENCODING, COL_TPS_OR_BRID, NONE_SENTINEL, NUM_METADATA_COLS};
use crate::errors::DatabaseError;
use crate::index::Index;
use crate::lock_manager::LockManager;
use crate::page_directory::PageDirectory;
use crate::query::{QueryArgs, QueryOutcome, QueryWrapper};
use crate::transaction::Transaction;

const META_FILE: &str = "meta.data";

pub struct Table {
    name: String,
    path: PathBuf,
    num_user_columns: usize,
    primary_key_column: usize,
    page_directory: Arc<PageDirectory>,
    index: Mutex<Index>,
    lock_manager: LockManager,
    timestamp: AtomicI64,
    next_txn_id: AtomicU64,
    merge_handle: Mutex<Option<JoinHandle<()>>>,
    merge_shutdown: Arc<AtomicBool>,
}

impl Table {
    /// `force_merge` disables the background merge scheduler: the caller
    /// must invoke `merge` explicitly. `merge_interval` overrides
    /// `config.merge_interval_secs` for this table's scheduler when
    /// background merging is enabled.
    pub fn create(
        root: impl AsRef<Path>,
        name: &str,
        num_user_columns: usize,
        primary_key_column: usize,
        config: &Config,
        force_merge: bool,
    ) -> Result<Self, DatabaseError> {
        Self::create_with_interval(root, name, num_user_columns, primary_key_column, config, force_merge, None)
    }

    pub fn create_with_interval(
        root: impl AsRef<Path>,
        name: &str,
        num_user_columns: usize,
        primary_key_column: usize,
        config: &Config,
        force_merge: bool,
        merge_interval: Option<u64>,
    ) -> Result<Self, DatabaseError> {
        if num_user_columns == 0 {
            return Err(DatabaseError::NonPositiveColumnCount);
        }
        if primary_key_column >= num_user_columns {
            return Err(DatabaseError::PrimaryKeyOutOfRange(primary_key_column));
        }
        let path = root.as_ref().join(name);
        fs::create_dir_all(&path)?;
        let num_physical = num_user_columns + NUM_METADATA_COLS;
        let page_directory = PageDirectory::new(&path, config, num_physical)?;
        let index = Index::new(config.clone(), primary_key_column + NUM_METADATA_COLS);
        let mut effective_config = config.clone();
        if let Some(interval) = merge_interval {
            effective_config.merge_interval_secs = interval;
        }
        // Debug/ops sidecar, not part of the on-disk contract in spec section
        // 6 (that's `meta.data`'s fixed binary footer); lets an operator see
        // what a table was created with without reopening it.
        fs::write(path.join("config.json"), serde_json::to_string_pretty(&effective_config)?)?;
        Self::spin_up(
            name,
            path,
            num_user_columns,
            primary_key_column,
            page_directory,
            index,
            &effective_config,
            force_merge,
        )
    }

    /// Rehydrate a table from its directory: restore record counters from
    /// `meta.data` and rebuild the primary-key index via a base-row scan.
    /// Secondary indexes are not persisted and start unindexed again.
    pub fn open(root: impl AsRef<Path>, name: &str, config: &Config) -> Result<Self, DatabaseError> {
        let path = root.as_ref().join(name);
        let data = fs::read(path.join(META_FILE))?;
        let num_records = u32::from_le_bytes(data[0..4].try_into().unwrap()) as i64;
        let num_user_columns = u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize;
        let primary_key_column = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;

        let num_physical = num_user_columns + NUM_METADATA_COLS;
        let page_directory = PageDirectory::new(&path, config, num_physical)?;
        let pk_physical = primary_key_column + NUM_METADATA_COLS;
        let mut index = Index::new(config.clone(), pk_physical);

        for rid in 0..num_records {
            let live = page_directory.get_column_value(rid, COL_RID, false)?;
            if live == NONE_SENTINEL {
                continue;
            }
            let row = Self::logical_row_raw(&page_directory, rid, num_physical)?;
            index.maintain_insert(&row, rid)?;
        }

        Self::spin_up(
            name,
            path,
            num_user_columns,
            primary_key_column,
            page_directory,
            index,
            config,
            false,
        )
    }

    fn spin_up(
        name: &str,
        path: PathBuf,
        num_user_columns: usize,
        primary_key_column: usize,
        page_directory: PageDirectory,
        index: Index,
        config: &Config,
        no_background_merge: bool,
    ) -> Result<Self, DatabaseError> {
        let mut table = Table {
            name: name.to_string(),
            path,
            num_user_columns,
            primary_key_column,
            page_directory: Arc::new(page_directory),
            index: Mutex::new(index),
            lock_manager: LockManager::new(),
            timestamp: AtomicI64::new(0),
            next_txn_id: AtomicU64::new(1),
            merge_handle: Mutex::new(None),
            merge_shutdown: Arc::new(AtomicBool::new(false)),
        };
        if !no_background_merge {
            table.start_merge_scheduler(config.clone());
        }
        Ok(table)
    }

    /// Polls `num_tail_pages` every `merge_interval_secs`; on growth, pushes
    /// the new tail-page indices into a FIFO queue and merges
    /// `num_tails_to_merge` of them at a time. See spec section 4.11.
    fn start_merge_scheduler(&mut self, config: Config) {
        let shutdown = self.merge_shutdown.clone();
        let page_directory = self.page_directory.clone();
        let num_user_columns = self.num_user_columns;
        let interval = Duration::from_secs(config.merge_interval_secs.max(1));
        let batch_size = config.num_tails_to_merge.max(1);
        let handle = thread::spawn(move || {
            let mut queued_up_to: usize = 0;
            let mut pending: VecDeque<usize> = VecDeque::new();
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(interval);
                let total_pages = page_directory.num_tail_pages() as usize;
                while queued_up_to < total_pages {
                    pending.push_back(queued_up_to);
                    queued_up_to += 1;
                }
                while pending.len() >= batch_size {
                    let batch: Vec<usize> = pending.drain(..batch_size).collect();
                    if let Err(err) = Table::merge_pages(&page_directory, num_user_columns, &batch) {
                        warn!("background merge pass failed: {err}");
                        break;
                    }
                }
            }
        });
        *self.merge_handle.lock().unwrap() = Some(handle);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_user_columns(&self) -> usize {
        self.num_user_columns
    }

    pub fn num_physical_columns(&self) -> usize {
        self.num_user_columns + NUM_METADATA_COLS
    }

    pub fn primary_key_column(&self) -> usize {
        self.primary_key_column
    }

    pub fn physical_column(&self, user_column: usize) -> usize {
        user_column + NUM_METADATA_COLS
    }

    pub fn num_records(&self) -> i64 {
        self.page_directory.num_records()
    }

    pub fn num_tail_records(&self) -> i64 {
        self.page_directory.num_tail_records()
    }

    pub fn num_tail_pages(&self) -> i64 {
        self.page_directory.num_tail_pages()
    }

    pub(crate) fn page_directory(&self) -> &PageDirectory {
        &self.page_directory
    }

    pub(crate) fn index(&self) -> &Mutex<Index> {
        &self.index
    }

    pub(crate) fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub(crate) fn next_timestamp(&self) -> i64 {
        self.timestamp.fetch_add(1, Ordering::SeqCst)
    }

    fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn locate_pk(&self, key: i64) -> Option<i64> {
        let pk_physical = self.physical_column(self.primary_key_column);
        self.index.lock().unwrap().locate(pk_physical, key).and_then(|rids| rids.first().copied())
    }

    fn logical_row_raw(
        page_directory: &PageDirectory,
        rid: i64,
        num_physical: usize,
    ) -> Result<Vec<i64>, DatabaseError> {
        (0..num_physical)
            .map(|c| page_directory.get_data_attribute(rid, c))
            .collect()
    }

    /// The full physical row at `base_rid` with every column resolved to its
    /// latest logical value (used for index maintenance on insert/delete).
    pub(crate) fn logical_row(&self, base_rid: i64) -> Result<Vec<i64>, DatabaseError> {
        Self::logical_row_raw(&self.page_directory, base_rid, self.num_physical_columns())
    }

    pub(crate) fn project_version_column(
        &self,
        base_rid: i64,
        user_column: usize,
        relative_version: i64,
    ) -> Result<i64, DatabaseError> {
        let physical = self.physical_column(user_column);
        if relative_version == 0 {
            return self.page_directory.get_data_attribute(base_rid, physical);
        }
        let (tail_flag, source_rid) = self.page_directory.get_rid_for_version(base_rid, relative_version)?;
        if !tail_flag {
            return self.page_directory.get_column_value(source_rid, physical, false);
        }
        let schema = self.page_directory.get_column_value(source_rid, COL_SCHEMA_ENCODING, true)?;
        if (schema >> user_column) & 1 == 1 {
            self.page_directory.get_column_value(source_rid, physical, true)
        } else {
            self.page_directory.get_column_value(base_rid, physical, false)
        }
    }

    pub(crate) fn project_version(
        &self,
        base_rid: i64,
        projection: &[bool],
        relative_version: i64,
    ) -> Result<Vec<i64>, DatabaseError> {
        projection
            .iter()
            .enumerate()
            .filter(|(_, wanted)| **wanted)
            .map(|(i, _)| self.project_version_column(base_rid, i, relative_version))
            .collect()
    }

    fn run_single(&self, args: QueryArgs) -> Option<QueryOutcome> {
        let txn = self.next_txn_id();
        let mut transaction = Transaction::new(txn);
        transaction.push(QueryWrapper::new(args));
        transaction.run(self).into_iter().next().flatten()
    }

    pub fn insert(&self, values: Vec<i64>) -> bool {
        self.run_single(QueryArgs::Insert(values)).is_some()
    }

    pub fn select(&self, key: i64, projection: Vec<bool>) -> Vec<Vec<i64>> {
        match self.run_single(QueryArgs::Select { key, projection }) {
            Some(QueryOutcome::Rows(rows)) => rows,
            _ => Vec::new(),
        }
    }

    pub fn select_version(&self, key: i64, projection: Vec<bool>, relative_version: i64) -> Vec<Vec<i64>> {
        match self.run_single(QueryArgs::SelectVersion {
            key,
            projection,
            relative_version,
        }) {
            Some(QueryOutcome::Rows(rows)) => rows,
            _ => Vec::new(),
        }
    }

    pub fn update(&self, key: i64, values: Vec<Option<i64>>) -> bool {
        self.run_single(QueryArgs::Update { key, values }).is_some()
    }

    pub fn delete(&self, key: i64) -> bool {
        self.run_single(QueryArgs::Delete { key }).is_some()
    }

    pub fn sum(&self, lo: i64, hi: i64, column: usize) -> Option<i64> {
        match self.run_single(QueryArgs::Sum { lo, hi, column }) {
            Some(QueryOutcome::Sum(total)) => Some(total),
            _ => None,
        }
    }

    pub fn sum_version(&self, lo: i64, hi: i64, column: usize, relative_version: i64) -> Option<i64> {
        match self.run_single(QueryArgs::SumVersion {
            lo,
            hi,
            column,
            relative_version,
        }) {
            Some(QueryOutcome::Sum(total)) => Some(total),
            _ => None,
        }
    }

    pub fn increment(&self, key: i64, column: usize) -> bool {
        self.run_single(QueryArgs::Increment { key, column }).is_some()
    }

    /// Run a multi-query transaction against this table. Returns one
    /// `Option<QueryOutcome>` per wrapper: all `Some` on commit, all `None`
    /// on abort (lock conflict, retry later, or permanent logical failure;
    /// check `transaction.is_permanently_failed()` to tell which).
    pub fn run_transaction(&self, transaction: &mut Transaction) -> Vec<Option<QueryOutcome>> {
        transaction.run(self)
    }

    /// Consolidate the tail records belonging to `tail_pages` into their base
    /// pages: walk those tail rids newest-to-oldest, write each base row's
    /// first-seen value per changed column, and raise the base's TPS
    /// watermark past the highest tail folded in. See spec section 4.11.
    pub fn merge(&self, tail_pages: &[usize]) -> Result<(), DatabaseError> {
        let settled = Self::merge_pages(&self.page_directory, self.num_user_columns, tail_pages)?;
        info!("merge pass over {} tail page(s) consolidated {} base rows", tail_pages.len(), settled);
        Ok(())
    }

    /// All tail-page indices that currently exist, for callers that want an
    /// unconditional full merge (tests, the profiling binary, the PyO3 shell).
    pub fn all_tail_pages(&self) -> Vec<usize> {
        (0..self.page_directory.num_tail_pages() as usize).collect()
    }

    fn merge_pages(page_directory: &PageDirectory, num_user_columns: usize, tail_pages: &[usize]) -> Result<usize, DatabaseError> {
        if tail_pages.is_empty() {
            return Ok(0);
        }

        let cells_per_page = page_directory.cells_per_page() as i64;
        let num_tail_records = page_directory.num_tail_records();

        let mut tail_rids: Vec<i64> = Vec::new();
        for &page in tail_pages {
            let start = page as i64 * cells_per_page;
            if start >= num_tail_records {
                continue;
            }
            let end = (start + cells_per_page).min(num_tail_records);
            tail_rids.extend(start..end);
        }
        tail_rids.sort_unstable_by(|a, b| b.cmp(a));

        let mut settled: HashSet<i64> = HashSet::new();
        for tail_rid in tail_rids {
            let base_rid = page_directory.get_column_value(tail_rid, COL_TPS_OR_BRID, true)?;
            let schema = page_directory.get_column_value(tail_rid, COL_SCHEMA_ENCODING, true)?;

            if settled.contains(&base_rid) {
                continue;
            }
            for user_col in 0..num_user_columns {
                if (schema >> user_col) & 1 == 1 {
                    let physical = user_col + NUM_METADATA_COLS;
                    let value = page_directory.get_column_value(tail_rid, physical, true)?;
                    page_directory.set_column_value(base_rid, physical, value, false)?;
                }
            }
            let tps = page_directory.get_column_value(base_rid, COL_TPS_OR_BRID, false)?;
            if tps < tail_rid {
                page_directory.set_column_value(base_rid, COL_TPS_OR_BRID, tail_rid, false)?;
            }
            settled.insert(base_rid);
        }
        Ok(settled.len())
    }

    /// Write the `meta.data` footer, flush the buffer pool, and stop the
    /// background merge scheduler.
    pub fn close(&self) -> Result<(), DatabaseError> {
        self.merge_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.merge_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.page_directory.flush()?;

        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&(self.page_directory.num_records() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.page_directory.num_tail_records() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.num_user_columns as u32).to_le_bytes());
        buf.extend_from_slice(&(self.primary_key_column as u32).to_le_bytes());
        fs::write(self.path.join(META_FILE), buf)?;
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.merge_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.merge_handle.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("merge thread for table {} panicked during shutdown", self.name);
            }
        }
    }
}
