//! A sequence of `QueryWrapper`s that commit or roll back together. See
//! spec section 4.10.

use crate::query::{QueryOutcome, QueryWrapper, TryRunResult};
use crate::table::Table;

pub struct Transaction {
    txn_id: u64,
    wrappers: Vec<QueryWrapper>,
    /// Set once a wrapper reports `LogicalFailure`: the transaction is
    /// permanently failed and must not be retried by the worker.
    permanently_failed: bool,
}

impl Transaction {
    pub fn new(txn_id: u64) -> Self {
        Transaction {
            txn_id,
            wrappers: Vec::new(),
            permanently_failed: false,
        }
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    pub fn push(&mut self, wrapper: QueryWrapper) {
        self.wrappers.push(wrapper);
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.permanently_failed
    }

    /// Run every wrapper in order. On the first lock conflict, rolls back
    /// whatever already executed and returns an empty vec (the caller, a
    /// `TransactionWorker`, should retry the whole transaction later). On a
    /// logical failure (e.g. duplicate primary key), rolls back and returns
    /// an empty vec too, but marks the transaction permanently failed so it
    /// is never retried. On full success, returns `Some` outcome per
    /// wrapper.
    pub fn run(&mut self, table: &Table) -> Vec<Option<QueryOutcome>> {
        let mut outcomes = Vec::with_capacity(self.wrappers.len());
        for wrapper in self.wrappers.iter_mut() {
            match wrapper.try_run(table, self.txn_id) {
                TryRunResult::Success(outcome) => outcomes.push(Some(outcome)),
                TryRunResult::LockFailed => {
                    self.abort(table);
                    return vec![None; self.wrappers.len()];
                }
                TryRunResult::LogicalFailure => {
                    self.permanently_failed = true;
                    self.abort(table);
                    return vec![None; self.wrappers.len()];
                }
            }
        }
        table.lock_manager().release_all(self.txn_id);
        outcomes
    }

    /// Roll back every wrapper that actually executed, in reverse order,
    /// then release every lock this transaction holds.
    fn abort(&mut self, table: &Table) {
        for wrapper in self.wrappers.iter().rev() {
            if wrapper.executed() {
                let _ = wrapper.roll_back(table);
            }
        }
        table.lock_manager().release_all(self.txn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::query::QueryArgs;
    use tempfile::tempdir;

    #[test]
    fn committed_transaction_releases_all_locks() {
        let dir = tempdir().unwrap();
        let table = Table::create(dir.path(), "t", 3, 0, &Config::default(), true).unwrap();
        let mut txn = Transaction::new(1);
        txn.push(QueryWrapper::new(QueryArgs::Insert(vec![0, 1, 2])));
        let results = txn.run(&table);
        assert_eq!(results, vec![Some(QueryOutcome::Inserted)]);
        // A fresh transaction can immediately take the same resources.
        let mut txn2 = Transaction::new(2);
        txn2.push(QueryWrapper::new(QueryArgs::Insert(vec![1, 1, 2])));
        assert_eq!(txn2.run(&table), vec![Some(QueryOutcome::Inserted)]);
    }

    #[test]
    fn logical_failure_marks_permanently_failed_and_rolls_back() {
        let dir = tempdir().unwrap();
        let table = Table::create(dir.path(), "t", 3, 0, &Config::default(), true).unwrap();
        let mut seed = Transaction::new(1);
        seed.push(QueryWrapper::new(QueryArgs::Insert(vec![0, 1, 2])));
        seed.run(&table);

        let mut txn = Transaction::new(2);
        txn.push(QueryWrapper::new(QueryArgs::Update {
            key: 0,
            values: vec![None, Some(9), None],
        }));
        txn.push(QueryWrapper::new(QueryArgs::Insert(vec![0, 5, 5])));
        let results = txn.run(&table);
        assert_eq!(results, vec![None, None]);
        assert!(txn.is_permanently_failed());

        let rows = table.select(0, vec![true, true, true]);
        assert_eq!(rows, vec![vec![0, 1, 2]]);
    }
}
