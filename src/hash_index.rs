//! HashMap-backed index with the same contract as `BPlusTree`, minus
//! ordering: point lookups are O(1) but `get_range` is a full scan. Used for
//! columns that get point-queried often but ranged over rarely. See spec
//! section 4.5.

use std::collections::HashMap;

use crate::errors::DatabaseError;

pub struct HashIndex {
    unique_keys: bool,
    map: HashMap<i64, Vec<i64>>,
}

impl HashIndex {
    pub fn new(unique_keys: bool) -> Self {
        HashIndex {
            unique_keys,
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn insert(&mut self, key: i64, value: i64) -> Result<(), DatabaseError> {
        let entry = self.map.entry(key).or_default();
        if self.unique_keys && !entry.is_empty() {
            return Err(DatabaseError::NonUniqueKey(key));
        }
        entry.push(value);
        Ok(())
    }

    pub fn bulk_insert(&mut self, items: &[(i64, i64)]) -> Result<(), DatabaseError> {
        for (k, v) in items {
            self.insert(*k, *v)?;
        }
        Ok(())
    }

    pub fn get(&self, key: i64) -> Option<&[i64]> {
        self.map.get(&key).map(|v| v.as_slice())
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.map.contains_key(&key)
    }

    /// Full scan: every key in `[lo, hi]`, flattened to `(key, value)` pairs
    /// sorted by key for caller convenience.
    pub fn get_range(&self, lo: i64, hi: i64) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = self
            .map
            .iter()
            .filter(|(k, _)| **k >= lo && **k <= hi)
            .flat_map(|(k, vs)| vs.iter().map(move |v| (*k, *v)))
            .collect();
        out.sort_unstable();
        out
    }

    pub fn remove(&mut self, key: i64, value: i64) -> Result<(), DatabaseError> {
        let values = self
            .map
            .get_mut(&key)
            .ok_or(DatabaseError::KeyNotFound(key))?;
        let pos = values
            .iter()
            .position(|v| *v == value)
            .ok_or(DatabaseError::KeyValueNotFound { key, value })?;
        values.remove(pos);
        if values.is_empty() {
            self.map.remove(&key);
        }
        Ok(())
    }

    pub fn remove_key(&mut self, key: i64) -> Result<Vec<i64>, DatabaseError> {
        self.map.remove(&key).ok_or(DatabaseError::KeyNotFound(key))
    }

    pub fn update(&mut self, key: i64, old_value: i64, new_value: i64) -> Result<(), DatabaseError> {
        let values = self
            .map
            .get_mut(&key)
            .ok_or(DatabaseError::KeyNotFound(key))?;
        let pos = values
            .iter()
            .position(|v| *v == old_value)
            .ok_or(DatabaseError::KeyValueNotFound { key, value: old_value })?;
        values[pos] = new_value;
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &i64> {
        self.map.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut idx = HashIndex::new(false);
        idx.insert(1, 10).unwrap();
        idx.insert(1, 20).unwrap();
        assert_eq!(idx.get(1), Some(&[10, 20][..]));
    }

    #[test]
    fn unique_keys_rejects_duplicates() {
        let mut idx = HashIndex::new(true);
        idx.insert(1, 10).unwrap();
        assert!(matches!(idx.insert(1, 20), Err(DatabaseError::NonUniqueKey(1))));
    }

    #[test]
    fn range_scan_filters_and_sorts() {
        let mut idx = HashIndex::new(true);
        for i in 0..10 {
            idx.insert(i, i * 100).unwrap();
        }
        let range = idx.get_range(3, 5);
        assert_eq!(range, vec![(3, 300), (4, 400), (5, 500)]);
    }

    #[test]
    fn remove_drops_key_once_last_value_gone() {
        let mut idx = HashIndex::new(false);
        idx.insert(7, 1).unwrap();
        idx.remove(7, 1).unwrap();
        assert!(!idx.contains_key(7));
    }

    #[test]
    fn update_replaces_value_in_place() {
        let mut idx = HashIndex::new(true);
        idx.insert(1, 10).unwrap();
        idx.update(1, 10, 99).unwrap();
        assert_eq!(idx.get(1), Some(&[99][..]));
    }
}
