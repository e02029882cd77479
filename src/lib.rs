use pyo3::prelude::*;

pub mod bindings;
pub mod block;
pub mod btree;
pub mod buffer_pool;
pub mod cache_policy;
pub mod config;
pub mod database;
pub mod errors;
pub mod hash_index;
pub mod index;
pub mod lock_manager;
pub mod page;
pub mod page_directory;
pub mod priority_queue;
pub mod query;
pub mod table;
pub mod transaction;
pub mod transaction_worker;

/// The Python entry point: `import ripstore`.
#[pymodule]
fn ripstore(_py: Python, m: &PyModule) -> PyResult<()> {
    let _ = env_logger::try_init();
    bindings::register(m)
}
