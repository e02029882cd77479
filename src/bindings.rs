//! Thin PyO3 shell over `Database`/`Table`/`Transaction`. The query surface
//! itself is out of core scope per spec section 6 ("contracts only"); this
//! module exists to expose the contracts, not to add behavior of its own.

use std::sync::{Arc, Mutex};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::database::Database;
use crate::query::{QueryArgs, QueryOutcome, QueryWrapper};
use crate::table::Table;
use crate::transaction::Transaction;

fn to_py_err(err: crate::errors::DatabaseError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

#[pyclass(name = "Database")]
pub struct PyDatabase {
    inner: Mutex<Database>,
}

#[pymethods]
impl PyDatabase {
    #[new]
    pub fn new(path: String) -> PyResult<Self> {
        Ok(PyDatabase {
            inner: Mutex::new(Database::open(path).map_err(to_py_err)?),
        })
    }

    pub fn close(&self) -> PyResult<()> {
        self.inner.lock().unwrap().close().map_err(to_py_err)
    }

    #[pyo3(signature = (name, num_columns, pk_index, force_merge=false, merge_interval=None))]
    pub fn create_table(
        &self,
        name: String,
        num_columns: usize,
        pk_index: usize,
        force_merge: bool,
        merge_interval: Option<u64>,
    ) -> PyResult<PyTable> {
        let table = self
            .inner
            .lock()
            .unwrap()
            .create_table_with_merge_policy(&name, num_columns, pk_index, force_merge, merge_interval)
            .map_err(to_py_err)?;
        Ok(PyTable { inner: table })
    }

    pub fn drop_table(&self, name: String) -> PyResult<()> {
        self.inner.lock().unwrap().drop_table(&name).map_err(to_py_err)
    }

    pub fn get_table(&self, name: String) -> PyResult<PyTable> {
        let table = self.inner.lock().unwrap().get_table(&name).map_err(to_py_err)?;
        Ok(PyTable { inner: table })
    }
}

#[pyclass(name = "Table")]
#[derive(Clone)]
pub struct PyTable {
    inner: Arc<Table>,
}

#[pymethods]
impl PyTable {
    pub fn insert(&self, values: Vec<i64>) -> bool {
        self.inner.insert(values)
    }

    #[pyo3(signature = (key, projection))]
    pub fn select(&self, key: i64, projection: Vec<bool>) -> Vec<Vec<i64>> {
        self.inner.select(key, projection)
    }

    #[pyo3(signature = (key, projection, relative_version))]
    pub fn select_version(&self, key: i64, projection: Vec<bool>, relative_version: i64) -> Vec<Vec<i64>> {
        self.inner.select_version(key, projection, relative_version)
    }

    pub fn update(&self, key: i64, values: Vec<Option<i64>>) -> bool {
        self.inner.update(key, values)
    }

    pub fn delete(&self, key: i64) -> bool {
        self.inner.delete(key)
    }

    pub fn sum(&self, lo: i64, hi: i64, column: usize) -> Option<i64> {
        self.inner.sum(lo, hi, column)
    }

    pub fn sum_version(&self, lo: i64, hi: i64, column: usize, relative_version: i64) -> Option<i64> {
        self.inner.sum_version(lo, hi, column, relative_version)
    }

    pub fn increment(&self, key: i64, column: usize) -> bool {
        self.inner.increment(key, column)
    }

    pub fn merge(&self) -> PyResult<()> {
        self.inner.merge(&self.inner.all_tail_pages()).map_err(to_py_err)
    }

    pub fn close(&self) -> PyResult<()> {
        self.inner.close().map_err(to_py_err)
    }
}

/// A batch of queries against one table, committed or rolled back together.
#[pyclass(name = "Transaction")]
pub struct PyTransaction {
    table: Arc<Table>,
    transaction: Transaction,
}

#[pymethods]
impl PyTransaction {
    #[new]
    pub fn new(table: &PyTable, txn_id: u64) -> Self {
        PyTransaction {
            table: table.inner.clone(),
            transaction: Transaction::new(txn_id),
        }
    }

    pub fn add_insert(&mut self, values: Vec<i64>) {
        self.transaction.push(QueryWrapper::new(QueryArgs::Insert(values)));
    }

    pub fn add_update(&mut self, key: i64, values: Vec<Option<i64>>) {
        self.transaction
            .push(QueryWrapper::new(QueryArgs::Update { key, values }));
    }

    pub fn add_delete(&mut self, key: i64) {
        self.transaction.push(QueryWrapper::new(QueryArgs::Delete { key }));
    }

    pub fn add_select(&mut self, key: i64, projection: Vec<bool>) {
        self.transaction
            .push(QueryWrapper::new(QueryArgs::Select { key, projection }));
    }

    /// Run every queued query. Returns `true` on commit, `false` on abort
    /// (lock conflict or permanent logical failure).
    pub fn run(&mut self) -> bool {
        let results = self.transaction.run(&self.table);
        results.iter().all(Option::is_some)
    }
}

impl From<QueryOutcome> for PyObject {
    fn from(outcome: QueryOutcome) -> Self {
        Python::with_gil(|py| match outcome {
            QueryOutcome::Inserted | QueryOutcome::Deleted | QueryOutcome::Updated => true.into_py(py),
            QueryOutcome::Rows(rows) => rows.into_py(py),
            QueryOutcome::Sum(total) => total.into_py(py),
        })
    }
}

pub fn register(m: &PyModule) -> PyResult<()> {
    m.add_class::<PyDatabase>()?;
    m.add_class::<PyTable>()?;
    m.add_class::<PyTransaction>()?;
    Ok(())
}
