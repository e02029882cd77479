//! The catalog: opens/creates/drops tables rooted at one directory. See
//! spec section 6 (external interfaces).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::errors::DatabaseError;
use crate::table::Table;

pub struct Database {
    directory: PathBuf,
    config: Config,
    tables: HashMap<String, Arc<Table>>,
}

impl Database {
    /// Open (or create, if missing) the database directory at `path`. Does
    /// not load any tables; call `get_table` or `create_table` for those.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let directory = path.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Database {
            directory,
            config: Config::default(),
            tables: HashMap::new(),
        })
    }

    pub fn with_config(path: impl AsRef<Path>, config: Config) -> Result<Self, DatabaseError> {
        let mut db = Self::open(path)?;
        db.config = config;
        Ok(db)
    }

    /// Persist and close every table currently held open.
    pub fn close(&mut self) -> Result<(), DatabaseError> {
        for table in self.tables.values() {
            table.close()?;
        }
        self.tables.clear();
        Ok(())
    }

    pub fn create_table(
        &mut self,
        name: &str,
        num_columns: usize,
        primary_key_column: usize,
    ) -> Result<Arc<Table>, DatabaseError> {
        self.create_table_with_merge_policy(name, num_columns, primary_key_column, false, None)
    }

    pub fn create_table_with_merge_policy(
        &mut self,
        name: &str,
        num_columns: usize,
        primary_key_column: usize,
        force_merge: bool,
        merge_interval: Option<u64>,
    ) -> Result<Arc<Table>, DatabaseError> {
        if self.tables.contains_key(name) || self.directory.join(name).exists() {
            return Err(DatabaseError::TableNotUnique(name.to_string()));
        }
        let table = Arc::new(Table::create_with_interval(
            &self.directory,
            name,
            num_columns,
            primary_key_column,
            &self.config,
            force_merge,
            merge_interval,
        )?);
        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Remove a table's directory entirely. The table must not currently be
    /// open in this `Database` instance.
    pub fn drop_table(&mut self, name: &str) -> Result<(), DatabaseError> {
        if self.tables.contains_key(name) {
            return Err(DatabaseError::TableNotUnique(name.to_string()));
        }
        let path = self.directory.join(name);
        if !path.exists() {
            return Err(DatabaseError::TableNotFound(name.to_string()));
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Get an already-open table, or rehydrate it from disk if this is the
    /// first access this session.
    pub fn get_table(&mut self, name: &str) -> Result<Arc<Table>, DatabaseError> {
        if !self.tables.contains_key(name) {
            if !self.directory.join(name).exists() {
                return Err(DatabaseError::TableNotFound(name.to_string()));
            }
            let table = Arc::new(Table::open(&self.directory, name, &self.config)?);
            self.tables.insert(name.to_string(), table);
        }
        Ok(self.tables.get(name).unwrap().clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_get_table_round_trips() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.create_table("grades", 5, 0).unwrap();
        let table = db.get_table("grades").unwrap();
        assert!(table.insert(vec![0, 1, 2, 3, 4]));
    }

    #[test]
    fn create_table_twice_fails() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.create_table("grades", 5, 0).unwrap();
        assert!(matches!(
            db.create_table("grades", 5, 0),
            Err(DatabaseError::TableNotUnique(_))
        ));
    }

    #[test]
    fn close_then_reopen_database_preserves_table_data() {
        let dir = tempdir().unwrap();
        {
            let mut db = Database::open(dir.path()).unwrap();
            db.create_table("grades", 5, 0).unwrap();
            db.get_table("grades").unwrap().insert(vec![0, 1, 2, 3, 4]);
            db.close().unwrap();
        }
        let mut db = Database::open(dir.path()).unwrap();
        let table = db.get_table("grades").unwrap();
        assert_eq!(table.select(0, vec![true; 5]), vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn get_missing_table_fails() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        assert!(matches!(
            db.get_table("nope"),
            Err(DatabaseError::TableNotFound(_))
        ));
    }

    #[test]
    fn drop_table_removes_its_directory() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.create_table("grades", 5, 0).unwrap();
        db.close().unwrap();
        db.drop_table("grades").unwrap();
        assert!(!dir.path().join("grades").exists());
    }
}
