//! Per-query resource planning, lock acquisition, undo capture, and
//! compensating rollback. One `QueryWrapper` per query within a
//! `Transaction`. Grounded in the original implementation's query wrapper,
//! reworked here as a tagged enum of query kinds (Rust's answer to that
//! source's per-query-type dispatch) rather than a class hierarchy. See
//! spec section 4.9.

use crate::config::{COL_INDIRECTION, COL_RID, COL_SCHEMA_ENCODING, NONE_SENTINEL};
use crate::errors::DatabaseError;
use crate::lock_manager::LockMode;
use crate::table::Table;

/// One table-wide resource that every query also locks, to serialize index
/// maintenance against concurrent structural changes.
pub const INDEX_RESOURCE: i64 = i64::MIN;

fn row_col_key(row: i64, column: usize) -> i64 {
    row.wrapping_mul(4096).wrapping_add(column as i64)
}

#[derive(Debug, Clone)]
pub enum QueryArgs {
    Insert(Vec<i64>),
    Delete { key: i64 },
    Update { key: i64, values: Vec<Option<i64>> },
    Select { key: i64, projection: Vec<bool> },
    SelectVersion {
        key: i64,
        projection: Vec<bool>,
        relative_version: i64,
    },
    Sum { lo: i64, hi: i64, column: usize },
    SumVersion {
        lo: i64,
        hi: i64,
        column: usize,
        relative_version: i64,
    },
    Increment { key: i64, column: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Inserted,
    Deleted,
    Updated,
    Rows(Vec<Vec<i64>>),
    Sum(i64),
}

#[derive(Debug)]
enum Undo {
    Insert {
        primary_key: i64,
    },
    Delete {
        original_rid: i64,
    },
    Update {
        base_rid: i64,
        prior_indirection: i64,
        prior_schema: i64,
        new_tail_rid: i64,
        changed: Vec<(usize, i64, i64)>,
    },
    None,
}

pub enum TryRunResult {
    LockFailed,
    LogicalFailure,
    Success(QueryOutcome),
}

pub struct QueryWrapper {
    args: QueryArgs,
    undo: Undo,
    executed: bool,
}

impl QueryWrapper {
    pub fn new(args: QueryArgs) -> Self {
        QueryWrapper {
            args,
            undo: Undo::None,
            executed: false,
        }
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    fn resources(&self, table: &Table) -> Vec<(LockMode, i64)> {
        let num_physical = table.num_physical_columns();
        match &self.args {
            QueryArgs::Insert(values) => {
                let pk_value = values[table.primary_key_column()];
                let mut resources: Vec<(LockMode, i64)> = (0..num_physical)
                    .map(|c| (LockMode::Exclusive, row_col_key(pk_value, c)))
                    .collect();
                resources.push((LockMode::Exclusive, INDEX_RESOURCE));
                resources
            }
            QueryArgs::Delete { key } => vec![
                (LockMode::Exclusive, INDEX_RESOURCE),
                (LockMode::Exclusive, row_col_key(*key, COL_RID)),
            ],
            QueryArgs::Update { key, .. } => {
                let mut resources: Vec<(LockMode, i64)> = (0..num_physical)
                    .map(|c| (LockMode::Exclusive, row_col_key(*key, c)))
                    .collect();
                resources.push((LockMode::Exclusive, INDEX_RESOURCE));
                resources
            }
            QueryArgs::Select { key, projection } | QueryArgs::SelectVersion { key, projection, .. } => {
                let mut resources = vec![(LockMode::Shared, INDEX_RESOURCE)];
                for (i, wanted) in projection.iter().enumerate() {
                    if *wanted {
                        resources.push((
                            LockMode::Shared,
                            row_col_key(*key, table.physical_column(i)),
                        ));
                    }
                }
                resources
            }
            QueryArgs::Sum { lo, hi, .. } | QueryArgs::SumVersion { lo, hi, .. } => {
                let mut resources = vec![(LockMode::Shared, INDEX_RESOURCE)];
                for r in *lo..*hi {
                    resources.push((LockMode::Shared, row_col_key(r, COL_RID)));
                }
                resources
            }
            QueryArgs::Increment { key, .. } => {
                let mut resources: Vec<(LockMode, i64)> = (0..num_physical)
                    .map(|c| (LockMode::Exclusive, row_col_key(*key, c)))
                    .collect();
                resources.push((LockMode::Exclusive, INDEX_RESOURCE));
                resources
            }
        }
    }

    /// Acquire every planned resource in order for `txn`; on the first
    /// failure, release whatever this call already granted and report it.
    fn acquire(&self, table: &Table, txn: u64) -> bool {
        let resources = self.resources(table);
        let mut acquired = Vec::with_capacity(resources.len());
        for (mode, key) in resources {
            if table.lock_manager().request(txn, key, mode) {
                acquired.push(key);
            } else {
                for key in acquired {
                    table.lock_manager().release(txn, key);
                }
                return false;
            }
        }
        true
    }

    pub fn try_run(&mut self, table: &Table, txn: u64) -> TryRunResult {
        if !self.acquire(table, txn) {
            return TryRunResult::LockFailed;
        }
        match self.execute(table) {
            Ok(outcome) => {
                self.executed = true;
                TryRunResult::Success(outcome)
            }
            Err(_) => TryRunResult::LogicalFailure,
        }
    }

    fn execute(&mut self, table: &Table) -> Result<QueryOutcome, DatabaseError> {
        match self.args.clone() {
            QueryArgs::Insert(values) => self.execute_insert(table, values),
            QueryArgs::Delete { key } => self.execute_delete(table, key),
            QueryArgs::Update { key, values } => self.execute_update(table, key, values),
            QueryArgs::Select { key, projection } => self.execute_select(table, key, &projection, 0),
            QueryArgs::SelectVersion {
                key,
                projection,
                relative_version,
            } => self.execute_select(table, key, &projection, relative_version),
            QueryArgs::Sum { lo, hi, column } => self.execute_sum(table, lo, hi, column, 0),
            QueryArgs::SumVersion {
                lo,
                hi,
                column,
                relative_version,
            } => self.execute_sum(table, lo, hi, column, relative_version),
            QueryArgs::Increment { key, column } => self.execute_increment(table, key, column),
        }
    }

    fn execute_insert(&mut self, table: &Table, values: Vec<i64>) -> Result<QueryOutcome, DatabaseError> {
        let pk_value = values[table.primary_key_column()];
        if table.locate_pk(pk_value).is_some() {
            return Err(DatabaseError::NonUniqueKey(pk_value));
        }
        let next_rid = table.page_directory().num_records();
        let mut physical = vec![NONE_SENTINEL, next_rid, table.next_timestamp(), 0, NONE_SENTINEL];
        physical.extend_from_slice(&values);
        let rid = table.page_directory().add_record(&physical, false)?;
        table.index().lock().unwrap().maintain_insert(&physical, rid)?;
        self.undo = Undo::Insert { primary_key: pk_value };
        Ok(QueryOutcome::Inserted)
    }

    fn execute_delete(&mut self, table: &Table, key: i64) -> Result<QueryOutcome, DatabaseError> {
        let base_rid = table.locate_pk(key).ok_or(DatabaseError::KeyNotFound(key))?;
        let row = table.logical_row(base_rid)?;
        table
            .page_directory()
            .set_column_value(base_rid, COL_RID, NONE_SENTINEL, false)?;
        table.index().lock().unwrap().maintain_delete(&row, base_rid)?;
        self.undo = Undo::Delete { original_rid: base_rid };
        Ok(QueryOutcome::Deleted)
    }

    fn execute_update(
        &mut self,
        table: &Table,
        key: i64,
        values: Vec<Option<i64>>,
    ) -> Result<QueryOutcome, DatabaseError> {
        let base_rid = table.locate_pk(key).ok_or(DatabaseError::KeyNotFound(key))?;
        let prior_indirection = table
            .page_directory()
            .get_column_value(base_rid, COL_INDIRECTION, false)?;
        let prior_schema = table
            .page_directory()
            .get_column_value(base_rid, COL_SCHEMA_ENCODING, false)?;

        let mut schema_bits: i64 = 0;
        let mut changed = Vec::new();
        let mut tail_values = vec![0i64; table.num_user_columns()];
        for (i, v) in values.iter().enumerate() {
            if let Some(new_value) = v {
                schema_bits |= 1 << i;
                let physical = table.physical_column(i);
                let old_value = table.page_directory().get_data_attribute(base_rid, physical)?;
                if old_value != *new_value {
                    changed.push((physical, old_value, *new_value));
                }
                tail_values[i] = *new_value;
            }
        }

        let mut tail_physical = vec![prior_indirection, 0, table.next_timestamp(), schema_bits, base_rid];
        tail_physical.extend_from_slice(&tail_values);
        let tail_rid = table.page_directory().add_record(&tail_physical, true)?;

        table
            .page_directory()
            .set_column_value(base_rid, COL_INDIRECTION, tail_rid, false)?;
        table
            .page_directory()
            .set_column_value(base_rid, COL_SCHEMA_ENCODING, schema_bits, false)?;

        {
            let mut index = table.index().lock().unwrap();
            for (physical, old_value, new_value) in &changed {
                index.maintain_update(*physical, *old_value, *new_value, base_rid)?;
            }
        }

        self.undo = Undo::Update {
            base_rid,
            prior_indirection,
            prior_schema,
            new_tail_rid: tail_rid,
            changed,
        };
        Ok(QueryOutcome::Updated)
    }

    fn execute_select(
        &mut self,
        table: &Table,
        key: i64,
        projection: &[bool],
        relative_version: i64,
    ) -> Result<QueryOutcome, DatabaseError> {
        let Some(base_rid) = table.locate_pk(key) else {
            return Ok(QueryOutcome::Rows(Vec::new()));
        };
        let row = table.project_version(base_rid, projection, relative_version)?;
        Ok(QueryOutcome::Rows(vec![row]))
    }

    fn execute_sum(
        &mut self,
        table: &Table,
        lo: i64,
        hi: i64,
        column: usize,
        relative_version: i64,
    ) -> Result<QueryOutcome, DatabaseError> {
        let mut total = 0i64;
        for key in lo..hi {
            if let Some(base_rid) = table.locate_pk(key) {
                total += table.project_version_column(base_rid, column, relative_version)?;
            }
        }
        Ok(QueryOutcome::Sum(total))
    }

    fn execute_increment(
        &mut self,
        table: &Table,
        key: i64,
        column: usize,
    ) -> Result<QueryOutcome, DatabaseError> {
        let base_rid = table.locate_pk(key).ok_or(DatabaseError::KeyNotFound(key))?;
        let physical = table.physical_column(column);
        let current = table.page_directory().get_data_attribute(base_rid, physical)?;
        let mut values = vec![None; table.num_user_columns()];
        values[column] = Some(current + 1);
        self.execute_update(table, key, values)?;
        Ok(QueryOutcome::Updated)
    }

    /// Undo this query's effects. Only called for wrappers whose `execute`
    /// already succeeded.
    pub fn roll_back(&self, table: &Table) -> Result<(), DatabaseError> {
        match &self.undo {
            Undo::None => Ok(()),
            Undo::Insert { primary_key } => {
                let pk_physical = table.physical_column(table.primary_key_column());
                let mut index = table.index().lock().unwrap();
                if let Some(rids) = index.locate(pk_physical, *primary_key) {
                    if let Some(rid) = rids.first().copied() {
                        table
                            .page_directory()
                            .set_column_value(rid, COL_RID, NONE_SENTINEL, false)?;
                        let row = table.logical_row(rid)?;
                        index.maintain_delete(&row, rid)?;
                    }
                }
                Ok(())
            }
            Undo::Delete { original_rid } => {
                table
                    .page_directory()
                    .set_column_value(*original_rid, COL_RID, *original_rid, false)?;
                let row = table.logical_row(*original_rid)?;
                table.index().lock().unwrap().maintain_insert(&row, *original_rid)?;
                Ok(())
            }
            Undo::Update {
                base_rid,
                prior_indirection,
                prior_schema,
                new_tail_rid,
                changed,
            } => {
                table
                    .page_directory()
                    .set_column_value(*base_rid, COL_INDIRECTION, *prior_indirection, false)?;
                table
                    .page_directory()
                    .set_column_value(*base_rid, COL_SCHEMA_ENCODING, *prior_schema, false)?;
                table
                    .page_directory()
                    .set_column_value(*new_tail_rid, COL_RID, NONE_SENTINEL, true)?;
                let mut index = table.index().lock().unwrap();
                for (physical, old_value, new_value) in changed.iter().rev() {
                    index.maintain_update(*physical, *new_value, *old_value, *base_rid)?;
                }
                Ok(())
            }
        }
    }
}
