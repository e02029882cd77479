//! Integration tests against the public `Database`/`Table` surface,
//! covering the concrete scenarios and invariants from the specification.

use ripstore::config::Config;
use ripstore::database::Database;
use ripstore::query::{QueryArgs, QueryOutcome};
use ripstore::table::Table;
use ripstore::transaction::Transaction;
use tempfile::tempdir;

fn open_table(dir: &std::path::Path, num_cols: usize, pk: usize) -> Table {
    Table::create(dir, "grades", num_cols, pk, &Config::default(), true).unwrap()
}

#[test]
fn s1_insert_then_select_returns_exact_row() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 5, 0);
    assert!(table.insert(vec![0, 1, 2, 3, 4]));
    assert_eq!(table.select(0, vec![true; 5]), vec![vec![0, 1, 2, 3, 4]]);
}

#[test]
fn s2_update_then_select_reflects_changed_columns_only() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 5, 0);
    table.insert(vec![0, 1, 2, 3, 4]);
    assert!(table.update(0, vec![None, None, Some(5), Some(6), Some(7)]));
    assert_eq!(table.select(0, vec![true; 5]), vec![vec![0, 1, 5, 6, 7]]);
}

#[test]
fn s3_select_version_beyond_chain_depth_falls_back_to_base() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 5, 0);
    table.insert(vec![0, 1, 2, 3, 4]);
    table.update(0, vec![None, None, Some(5), Some(6), Some(7)]);
    assert_eq!(table.select_version(0, vec![true; 5], -3), vec![vec![0, 1, 2, 3, 4]]);
}

#[test]
fn s4_sum_over_a_contiguous_key_range() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 5, 0);
    let n = 514i64;
    for i in 1..n {
        table.insert(vec![i, i, i, i, i]);
    }
    assert_eq!(table.sum(1, n, 2), Some(132_355));
}

#[test]
fn s5_merge_collapses_a_long_update_chain_into_the_base_row() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 5, 0);
    table.insert(vec![0, 0, 0, 0, 0]);
    for i in 1..1000 {
        table.update(0, vec![None, None, Some(i), None, None]);
    }
    table.merge(&table.all_tail_pages()).unwrap();
    assert_eq!(table.select(0, vec![true; 5])[0][2], 999);
}

#[test]
fn s6_permanently_failed_transaction_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 3, 0);
    table.insert(vec![0, 0, 0]);
    table.insert(vec![1, 1, 1]);

    let mut txn = Transaction::new(7);
    txn.push(ripstore::query::QueryWrapper::new(QueryArgs::Update {
        key: 0,
        values: vec![Some(2), Some(2), Some(2)],
    }));
    txn.push(ripstore::query::QueryWrapper::new(QueryArgs::Insert(vec![0, 9, 9])));
    let results = table.run_transaction(&mut txn);

    assert!(results.iter().all(Option::is_none));
    assert!(txn.is_permanently_failed());
    assert_eq!(table.select(0, vec![true, true, true]), vec![vec![0, 0, 0]]);
    assert_eq!(table.select(1, vec![true, true, true]), vec![vec![1, 1, 1]]);
}

#[test]
fn invariant_primary_key_index_is_unique_and_live() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 3, 0);
    assert!(table.insert(vec![0, 1, 2]));
    assert!(!table.insert(vec![0, 9, 9]));
    assert!(table.delete(0));
    assert!(table.insert(vec![0, 5, 5]));
    assert_eq!(table.select(0, vec![true, true, true]), vec![vec![0, 5, 5]]);
}

#[test]
fn invariant_merge_is_idempotent() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 3, 0);
    table.insert(vec![0, 0, 0]);
    for i in 1..20 {
        table.update(0, vec![None, Some(i), None]);
    }
    table.merge(&table.all_tail_pages()).unwrap();
    let once = table.select(0, vec![true, true, true]);
    table.merge(&table.all_tail_pages()).unwrap();
    let twice = table.select(0, vec![true, true, true]);
    assert_eq!(once, twice);
}

#[test]
fn invariant_transaction_atomicity_on_abort() {
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 3, 0);
    table.insert(vec![0, 1, 1]);

    let mut txn = Transaction::new(1);
    txn.push(ripstore::query::QueryWrapper::new(QueryArgs::Update {
        key: 0,
        values: vec![None, Some(99), None],
    }));
    txn.push(ripstore::query::QueryWrapper::new(QueryArgs::Insert(vec![0, 1, 1])));
    let results = table.run_transaction(&mut txn);
    assert!(results.iter().all(Option::is_none));
    assert_eq!(table.select(0, vec![true, true, true]), vec![vec![0, 1, 1]]);
}

#[test]
fn invariant_close_then_reopen_round_trip_preserves_state() {
    let dir = tempdir().unwrap();
    {
        let table = open_table(dir.path(), 5, 0);
        for i in 0..10 {
            table.insert(vec![i, i, i, i, i]);
        }
        table.update(3, vec![None, None, Some(100), None, None]);
        table.close().unwrap();
    }
    let reopened = Table::open(dir.path(), "grades", &Config::default()).unwrap();
    assert_eq!(reopened.num_records(), 10);
    assert_eq!(reopened.select(3, vec![true; 5])[0][2], 100);
    for i in 0..10 {
        if i != 3 {
            assert_eq!(reopened.select(i, vec![true; 5]), vec![vec![i, i, i, i, i]]);
        }
    }
}

#[test]
fn database_catalog_create_drop_and_rehydrate() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(dir.path()).unwrap();
    let table = db.create_table("students", 4, 0).unwrap();
    table.insert(vec![1, 2, 3, 4]);
    db.close().unwrap();

    let mut db = Database::open(dir.path()).unwrap();
    let table = db.get_table("students").unwrap();
    assert_eq!(table.select(1, vec![true; 4]), vec![vec![1, 2, 3, 4]]);

    db.close().unwrap();
    db.drop_table("students").unwrap();
    assert!(!dir.path().join("students").exists());
}

#[test]
fn out_of_scope_version_request_returns_empty_outcome_type_check() {
    // Sanity check that QueryOutcome's Rows variant is what select surfaces,
    // matching the public API's contract (truthy rows / falsy empty vec).
    let dir = tempdir().unwrap();
    let table = open_table(dir.path(), 3, 0);
    let outcome = QueryOutcome::Rows(table.select(999, vec![true, true, true]));
    assert_eq!(outcome, QueryOutcome::Rows(Vec::new()));
}
