//! Logical column store over a `BufferPool`: maps RID + column to a page
//! and cell offset, and resolves versions through the indirection chain.
//! See spec section 4.4.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::buffer_pool::BufferPool;
use crate::config::{Config, COL_INDIRECTION, NONE_SENTINEL};
use crate::errors::DatabaseError;
use crate::page::Page;

pub struct PageDirectory {
    pool: BufferPool,
    cells_per_page: usize,
    cell_size: usize,
    num_physical_columns: usize,
    num_records: AtomicI64,
    num_tail_records: AtomicI64,
    num_tail_pages: AtomicI64,
    /// Serializes the read-modify-write sequence of appending one row across
    /// every column; reads elsewhere proceed through the buffer pool's own
    /// locking without contending on this.
    append_lock: Mutex<()>,
}

impl PageDirectory {
    pub fn new(
        base_path: impl AsRef<Path>,
        config: &Config,
        num_physical_columns: usize,
    ) -> Result<Self, DatabaseError> {
        Ok(PageDirectory {
            pool: BufferPool::new(base_path, config)?,
            cells_per_page: config.cells_per_page(),
            cell_size: config.cell_size,
            num_physical_columns,
            num_records: AtomicI64::new(0),
            num_tail_records: AtomicI64::new(0),
            num_tail_pages: AtomicI64::new(0),
            append_lock: Mutex::new(()),
        })
    }

    pub fn num_records(&self) -> i64 {
        self.num_records.load(Ordering::SeqCst)
    }

    pub fn num_tail_records(&self) -> i64 {
        self.num_tail_records.load(Ordering::SeqCst)
    }

    pub fn num_tail_pages(&self) -> i64 {
        self.num_tail_pages.load(Ordering::SeqCst)
    }

    /// Number of tail rids that fit on one tail page; used to translate a
    /// tail-page index into the rid range it covers for scoped merges.
    pub fn cells_per_page(&self) -> usize {
        self.cells_per_page
    }

    fn locate(&self, rid: i64) -> Result<(usize, usize), DatabaseError> {
        if rid < 0 {
            return Err(DatabaseError::RidOutOfRange(rid as usize));
        }
        let rid = rid as usize;
        Ok((rid / self.cells_per_page, rid % self.cells_per_page))
    }

    /// Append one value per physical column; creates a new page per column
    /// when the previous one is full. Returns the assigned RID.
    pub fn add_record(&self, values: &[i64], tail: bool) -> Result<i64, DatabaseError> {
        if values.len() != self.num_physical_columns {
            return Err(DatabaseError::ColumnOutOfRange {
                column: values.len(),
                num_columns: self.num_physical_columns,
            });
        }

        let _guard = self.append_lock.lock().unwrap();
        let counter = if tail {
            &self.num_tail_records
        } else {
            &self.num_records
        };
        let rid = counter.load(Ordering::SeqCst);
        let (page_num, offset) = self.locate(rid)?;

        for (column, value) in values.iter().enumerate() {
            if offset == 0 {
                let mut page = Page::new(self.cells_per_page, self.cell_size);
                page.write(*value)?;
                self.pool.add_page(page, page_num, column, tail)?;
            } else {
                let mut page = self.pool.get_page(page_num, column, tail)?;
                page.write(*value)?;
                self.pool.update_page(page, page_num, column, tail)?;
            }
        }

        if tail && offset == 0 {
            self.num_tail_pages.fetch_add(1, Ordering::SeqCst);
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(rid)
    }

    pub fn get_column_value(
        &self,
        rid: i64,
        column: usize,
        tail: bool,
    ) -> Result<i64, DatabaseError> {
        let (page_num, offset) = self.locate(rid)?;
        self.pool.get_page(page_num, column, tail)?.read(offset)
    }

    pub fn set_column_value(
        &self,
        rid: i64,
        column: usize,
        value: i64,
        tail: bool,
    ) -> Result<(), DatabaseError> {
        let (page_num, offset) = self.locate(rid)?;
        let mut page = self.pool.get_page(page_num, column, tail)?;
        page.write_at(value, offset)?;
        self.pool.update_page(page, page_num, column, tail)?;
        Ok(())
    }

    /// Latest-version read of a user attribute, given its physical column
    /// index, without walking the full indirection chain.
    pub fn get_data_attribute(&self, base_rid: i64, column: usize) -> Result<i64, DatabaseError> {
        let indirection = self.get_column_value(base_rid, COL_INDIRECTION, false)?;
        if indirection == NONE_SENTINEL {
            return self.get_column_value(base_rid, column, false);
        }
        let schema_column = crate::config::COL_SCHEMA_ENCODING;
        let schema = self.get_column_value(indirection, schema_column, true)?;
        let user_bit = column.checked_sub(crate::config::NUM_METADATA_COLS);
        let bit_set = match user_bit {
            Some(bit) => (schema >> bit) & 1 == 1,
            None => false,
        };
        if bit_set {
            self.get_column_value(indirection, column, true)
        } else {
            self.get_column_value(base_rid, column, false)
        }
    }

    /// Walk the indirection chain backward from `base_rid` by
    /// `-relative_version` steps (`relative_version <= 0`; 0 is newest).
    /// Returns `(tail_flag, rid)`. Terminates at the base once the chain
    /// runs out of tail records before reaching the requested depth.
    pub fn get_rid_for_version(
        &self,
        base_rid: i64,
        relative_version: i64,
    ) -> Result<(bool, i64), DatabaseError> {
        assert!(relative_version <= 0, "relative_version must be <= 0");
        let head = self.get_column_value(base_rid, COL_INDIRECTION, false)?;
        if head == NONE_SENTINEL {
            return Ok((false, base_rid));
        }

        let mut steps_remaining = -relative_version;
        let mut current_tail = head;
        loop {
            if steps_remaining == 0 {
                return Ok((true, current_tail));
            }
            let prev = self.get_column_value(current_tail, COL_INDIRECTION, true)?;
            if prev == NONE_SENTINEL {
                return Ok((false, base_rid));
            }
            current_tail = prev;
            steps_remaining -= 1;
        }
    }

    pub fn flush(&self) -> Result<(), DatabaseError> {
        self.pool.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{COL_RID, COL_SCHEMA_ENCODING, COL_TIMESTAMP, COL_TPS_OR_BRID};
    use tempfile::tempdir;

    const NUM_USER_COLS: usize = 2;
    const NUM_PHYS_COLS: usize = NUM_USER_COLS + 5;

    fn base_row(rid: i64, a: i64, b: i64) -> Vec<i64> {
        vec![NONE_SENTINEL, rid, 0, 0, NONE_SENTINEL, a, b]
    }

    #[test]
    fn add_record_then_get_column_value_round_trips() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        let rid = pd.add_record(&base_row(0, 10, 20), false).unwrap();
        assert_eq!(rid, 0);
        assert_eq!(pd.get_column_value(rid, 5, false).unwrap(), 10);
        assert_eq!(pd.get_column_value(rid, 6, false).unwrap(), 20);
    }

    #[test]
    fn get_data_attribute_without_updates_returns_base_value() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        pd.add_record(&base_row(0, 10, 20), false).unwrap();
        assert_eq!(pd.get_data_attribute(0, 5).unwrap(), 10);
    }

    #[test]
    fn get_data_attribute_follows_head_tail_when_bit_set() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        pd.add_record(&base_row(0, 10, 20), false).unwrap();

        // Tail record updating column 0 (physical column 5, schema bit 0).
        let tail_values = vec![NONE_SENTINEL, 0, 1, 0b01, 0, 999, 20];
        let tail_rid = pd.add_record(&tail_values, true).unwrap();
        pd.set_column_value(0, COL_INDIRECTION, tail_rid, false)
            .unwrap();

        assert_eq!(pd.get_data_attribute(0, 5).unwrap(), 999);
        // Column 1 untouched by the tail's schema bit: base value still wins.
        assert_eq!(pd.get_data_attribute(0, 6).unwrap(), 20);
    }

    #[test]
    fn get_rid_for_version_walks_chain_and_terminates_at_base() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        pd.add_record(&base_row(0, 10, 20), false).unwrap();

        let tail0 = pd
            .add_record(&vec![NONE_SENTINEL, 0, 1, 0b01, 0, 11, 20], true)
            .unwrap();
        pd.set_column_value(0, COL_INDIRECTION, tail0, false).unwrap();

        let tail1 = pd
            .add_record(&vec![tail0, 0, 2, 0b01, 0, 12, 20], true)
            .unwrap();
        pd.set_column_value(0, COL_INDIRECTION, tail1, false).unwrap();

        assert_eq!(pd.get_rid_for_version(0, 0).unwrap(), (true, tail1));
        assert_eq!(pd.get_rid_for_version(0, -1).unwrap(), (true, tail0));
        // One step further back than the chain has: falls back to the base.
        assert_eq!(pd.get_rid_for_version(0, -2).unwrap(), (false, 0));
    }

    #[test]
    fn unupdated_row_returns_base_for_any_requested_version() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        pd.add_record(&base_row(0, 1, 2), false).unwrap();
        assert_eq!(pd.get_rid_for_version(0, -5).unwrap(), (false, 0));
    }

    #[test]
    fn add_record_rejects_wrong_column_count() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        let err = pd.add_record(&[1, 2, 3], false).unwrap_err();
        assert!(matches!(err, DatabaseError::ColumnOutOfRange { .. }));
    }

    #[test]
    fn records_spanning_multiple_pages_round_trip() {
        let dir = tempdir().unwrap();
        let cfg = Config {
            cell_size: 8,
            page_size: 32, // 4 cells per page
            pages_per_block: 2,
            pool_max_blocks: 4,
            ..Config::default()
        };
        let pd = PageDirectory::new(dir.path(), &cfg, NUM_PHYS_COLS).unwrap();
        for i in 0..20 {
            pd.add_record(&base_row(i, i * 10, i * 100), false).unwrap();
        }
        for i in 0..20 {
            assert_eq!(pd.get_column_value(i, 5, false).unwrap(), i * 10);
            assert_eq!(pd.get_column_value(i, COL_RID, false).unwrap(), i);
        }
    }

    #[test]
    fn metadata_columns_are_independently_addressable() {
        let dir = tempdir().unwrap();
        let pd = PageDirectory::new(dir.path(), &Config::default(), NUM_PHYS_COLS).unwrap();
        pd.add_record(&base_row(0, 10, 20), false).unwrap();
        pd.set_column_value(0, COL_TIMESTAMP, 42, false).unwrap();

        let tail = vec![NONE_SENTINEL, 0, 43, 0b10, 0, 10, 99];
        let tail_rid = pd.add_record(&tail, true).unwrap();
        pd.set_column_value(0, COL_TPS_OR_BRID, tail_rid, false).unwrap();

        assert_eq!(pd.get_column_value(0, COL_TIMESTAMP, false).unwrap(), 42);
        assert_eq!(pd.get_column_value(tail_rid, COL_SCHEMA_ENCODING, true).unwrap(), 0b10);
        assert_eq!(pd.get_column_value(0, COL_TPS_OR_BRID, false).unwrap(), tail_rid);
    }
}
