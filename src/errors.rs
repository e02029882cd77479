//! Error taxonomy for the storage engine core. Structural and schema
//! errors are fatal at the call site and propagate with `?`; uniqueness
//! and catalog errors are surfaced up to the query/database layer where
//! callers classify them. See spec section 7 for the full taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("cell offset {offset} out of range (page holds {num_cells} cells)")]
    OffsetOutOfRange { offset: usize, num_cells: usize },

    #[error("page is full (capacity {capacity} cells)")]
    PageFull { capacity: usize },

    #[error("physical page {0} not found")]
    PhysicalPageNotFound(usize),

    #[error("block not found at {0}")]
    BlockNotFound(String),

    #[error("record identifier {0} out of range")]
    RidOutOfRange(usize),

    #[error("column index {column} out of range (table has {num_columns} columns)")]
    ColumnOutOfRange { column: usize, num_columns: usize },

    #[error("primary key index {0} out of range")]
    PrimaryKeyOutOfRange(usize),

    #[error("column count must be positive")]
    NonPositiveColumnCount,

    #[error("duplicate key inserted into unique index: {0}")]
    NonUniqueKey(i64),

    #[error("key not found: {0:?}")]
    KeyNotFound(i64),

    #[error("key/value pair not found: key={key:?}, value={value:?}")]
    KeyValueNotFound { key: i64, value: i64 },

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table name '{0}' is not unique")]
    TableNotUnique(String),

    #[error("priority queue capacity must be positive, got {0}")]
    PriorityQueueCapacityOutOfBounds(isize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DatabaseError>;
