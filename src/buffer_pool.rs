//! Bounded in-memory cache of `Block`s. Owns a `PriorityQueue` keyed by
//! `(column, tail_flag, block_num)`, a dirty set, reentrant pin counts, and
//! evict flags for blocks evicted while still pinned. See spec section 4.3.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, trace};

use crate::block::Block;
use crate::cache_policy::CachePolicy;
use crate::config::Config;
use crate::errors::DatabaseError;
use crate::page::Page;
use crate::priority_queue::PriorityQueue;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub column: usize,
    pub tail: bool,
    pub block_num: usize,
}

pub struct BufferPoolStats {
    pub blocks_resident: usize,
    pub dirty_blocks: usize,
    pub pins_outstanding: usize,
}

struct Inner {
    queue: PriorityQueue<BlockKey, Block>,
    dirty: HashSet<BlockKey>,
    pin_counts: HashMap<BlockKey, usize>,
    evict_flag: HashSet<BlockKey>,
    /// Blocks removed from `queue` by eviction while still pinned; their
    /// final write-back is deferred until the last matching `unpin`.
    evicted_pending: HashMap<BlockKey, Block>,
}

pub struct BufferPool {
    base_path: PathBuf,
    cells_per_page: usize,
    cell_size: usize,
    pages_per_block: usize,
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(base_path: impl AsRef<Path>, config: &Config) -> Result<Self, DatabaseError> {
        Self::with_policy(base_path, config, CachePolicy::Lru)
    }

    pub fn with_policy(
        base_path: impl AsRef<Path>,
        config: &Config,
        policy: CachePolicy,
    ) -> Result<Self, DatabaseError> {
        Ok(BufferPool {
            base_path: base_path.as_ref().to_path_buf(),
            cells_per_page: config.cells_per_page(),
            cell_size: config.cell_size,
            pages_per_block: config.pages_per_block,
            inner: Mutex::new(Inner {
                queue: PriorityQueue::new(config.pool_max_blocks, policy)?,
                dirty: HashSet::new(),
                pin_counts: HashMap::new(),
                evict_flag: HashSet::new(),
                evicted_pending: HashMap::new(),
            }),
        })
    }

    fn block_path(&self, column: usize, tail: bool, block_num: usize) -> PathBuf {
        self.base_path
            .join(if tail { "tail" } else { "base" })
            .join(column.to_string())
            .join(format!("0.{}.data", block_num))
    }

    fn key_for(&self, page_num: usize, column: usize, tail: bool) -> (BlockKey, usize) {
        let block_num = page_num / self.pages_per_block;
        let offset = page_num % self.pages_per_block;
        (
            BlockKey {
                column,
                tail,
                block_num,
            },
            offset,
        )
    }

    fn pin(inner: &mut Inner, key: &BlockKey) {
        *inner.pin_counts.entry(key.clone()).or_insert(0) += 1;
    }

    fn unpin(inner: &mut Inner, key: &BlockKey) -> Result<(), DatabaseError> {
        let count = inner
            .pin_counts
            .get_mut(key)
            .expect("unpin called without a matching pin");
        assert!(*count > 0, "pin count went negative for {:?}", key);
        *count -= 1;
        if *count == 0 {
            inner.pin_counts.remove(key);
            if inner.evict_flag.remove(key) {
                if let Some(mut block) = inner.evicted_pending.remove(key) {
                    block.write()?;
                    inner.dirty.remove(key);
                }
            }
        }
        Ok(())
    }

    /// Ensure the block for `key` is resident in `inner.queue`, loading it
    /// from disk (or creating an empty one) if absent. Handles the eviction
    /// protocol for whatever block, if any, this load displaces.
    fn ensure_loaded(&self, inner: &mut Inner, key: &BlockKey) -> Result<(), DatabaseError> {
        if inner.queue.contains_key(key) {
            inner.queue.push(key.clone(), Block::new("", 0, 0), 0);
            return Ok(());
        }

        let mut block = Block::new(
            self.block_path(key.column, key.tail, key.block_num),
            self.cells_per_page,
            self.cell_size,
        );
        let existed = block.read()?;
        trace!(
            "loaded block column={} tail={} block_num={} existed={}",
            key.column, key.tail, key.block_num, existed
        );

        let evicted = inner.queue.push(key.clone(), block, 0);
        if let Some((ekey, _priority, mut eblock)) = evicted {
            if inner.dirty.contains(&ekey) {
                let pins = *inner.pin_counts.get(&ekey).unwrap_or(&0);
                if pins == 0 {
                    eblock.write()?;
                    inner.dirty.remove(&ekey);
                    debug!("evicted and flushed dirty block {:?}", ekey);
                } else {
                    inner.evict_flag.insert(ekey.clone());
                    inner.evicted_pending.insert(ekey, eblock);
                }
            }
        }
        Ok(())
    }

    /// Append `page` to the owning block; pins, loads, appends, unpins,
    /// marks dirty, and updates cache priority.
    pub fn add_page(
        &self,
        page: Page,
        page_num: usize,
        column: usize,
        tail: bool,
    ) -> Result<(), DatabaseError> {
        let (key, _offset) = self.key_for(page_num, column, tail);
        let mut inner = self.inner.lock().unwrap();
        Self::pin(&mut inner, &key);
        self.ensure_loaded(&mut inner, &key)?;
        inner
            .queue
            .get_mut(&key)
            .expect("just ensured loaded")
            .1
            .append(page);
        inner.dirty.insert(key.clone());
        Self::unpin(&mut inner, &key)?;
        Ok(())
    }

    /// Return the page at `page_num` for `(column, tail)`.
    pub fn get_page(
        &self,
        page_num: usize,
        column: usize,
        tail: bool,
    ) -> Result<Page, DatabaseError> {
        let (key, offset_in_block) = self.key_for(page_num, column, tail);
        let mut inner = self.inner.lock().unwrap();
        Self::pin(&mut inner, &key);
        self.ensure_loaded(&mut inner, &key)?;
        let block = &inner.queue.get(&key).expect("just ensured loaded").1;
        let page = block
            .get_page(offset_in_block)
            .cloned()
            .ok_or(DatabaseError::PhysicalPageNotFound(page_num))?;
        Self::unpin(&mut inner, &key)?;
        Ok(page)
    }

    /// Replace the page at `page_num` within `(column, tail)`.
    pub fn update_page(
        &self,
        page: Page,
        page_num: usize,
        column: usize,
        tail: bool,
    ) -> Result<(), DatabaseError> {
        let (key, offset_in_block) = self.key_for(page_num, column, tail);
        let mut inner = self.inner.lock().unwrap();
        Self::pin(&mut inner, &key);
        self.ensure_loaded(&mut inner, &key)?;
        inner
            .queue
            .get_mut(&key)
            .expect("just ensured loaded")
            .1
            .set_page(offset_in_block, page);
        inner.dirty.insert(key.clone());
        Self::unpin(&mut inner, &key)?;
        Ok(())
    }

    /// Write all dirty blocks to disk and clear the queue and dirty set.
    pub fn flush(&self) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        let dirty_keys: Vec<BlockKey> = inner.dirty.iter().cloned().collect();
        for key in dirty_keys {
            if let Some((_priority, mut block)) = inner.queue.remove(&key) {
                block.write()?;
            } else if let Some(mut block) = inner.evicted_pending.remove(&key) {
                block.write()?;
            }
        }
        inner.dirty.clear();
        inner.evict_flag.clear();
        inner.queue.clear();
        debug!("buffer pool flushed");
        Ok(())
    }

    pub fn stats(&self) -> BufferPoolStats {
        let inner = self.inner.lock().unwrap();
        BufferPoolStats {
            blocks_resident: inner.queue.len(),
            dirty_blocks: inner.dirty.len(),
            pins_outstanding: inner.pin_counts.values().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config {
            pages_per_block: 2,
            pool_max_blocks: 2,
            ..Config::default()
        }
    }

    #[test]
    fn add_then_get_round_trips_within_one_page() {
        let dir = tempdir().unwrap();
        let bp = BufferPool::new(dir.path(), &test_config()).unwrap();

        let mut page = Page::new(test_config().cells_per_page(), 8);
        page.write(123).unwrap();
        bp.add_page(page, 0, 0, false).unwrap();

        let fetched = bp.get_page(0, 0, false).unwrap();
        assert_eq!(fetched.read(0).unwrap(), 123);
    }

    #[test]
    fn update_page_replaces_contents() {
        let dir = tempdir().unwrap();
        let bp = BufferPool::new(dir.path(), &test_config()).unwrap();
        let cfg = test_config();

        let mut page = Page::new(cfg.cells_per_page(), 8);
        page.write(1).unwrap();
        bp.add_page(page, 0, 0, false).unwrap();

        let mut replacement = Page::new(cfg.cells_per_page(), 8);
        replacement.write(999).unwrap();
        bp.update_page(replacement, 0, 0, false).unwrap();

        let fetched = bp.get_page(0, 0, false).unwrap();
        assert_eq!(fetched.read(0).unwrap(), 999);
    }

    #[test]
    fn flush_persists_dirty_blocks_and_resets_cache() {
        let dir = tempdir().unwrap();
        let cfg = test_config();
        let bp = BufferPool::new(dir.path(), &cfg).unwrap();

        let mut page = Page::new(cfg.cells_per_page(), 8);
        page.write(55).unwrap();
        bp.add_page(page, 0, 0, false).unwrap();
        bp.flush().unwrap();

        let stats = bp.stats();
        assert_eq!(stats.blocks_resident, 0);
        assert_eq!(stats.dirty_blocks, 0);

        // Reading again should reload from disk with the flushed value intact.
        let fetched = bp.get_page(0, 0, false).unwrap();
        assert_eq!(fetched.read(0).unwrap(), 55);
    }

    #[test]
    fn eviction_flushes_dirty_blocks_under_capacity_pressure() {
        let dir = tempdir().unwrap();
        let cfg = test_config(); // pool_max_blocks = 2, pages_per_block = 2
        let bp = BufferPool::new(dir.path(), &cfg).unwrap();

        // Column 0, block 0; column 1, block 0; column 2, block 0 -> 3 distinct
        // blocks through a 2-block cache, forcing at least one eviction.
        for column in 0..3 {
            let mut page = Page::new(cfg.cells_per_page(), 8);
            page.write(100 + column as i64).unwrap();
            bp.add_page(page, 0, column, false).unwrap();
        }

        for column in 0..3 {
            let fetched = bp.get_page(0, column, false).unwrap();
            assert_eq!(fetched.read(0).unwrap(), 100 + column as i64);
        }
    }
}
