//! A `Block` is the persistence unit: a group of pages for one column,
//! backed by one file on disk. On-disk layout (little-endian):
//! `n_pages: u32`, then for each page `num_cells: u32` followed by
//! `page_size` bytes of cell data.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::DatabaseError;
use crate::page::Page;

pub struct Block {
    path: PathBuf,
    capacity_per_page: usize,
    cell_size: usize,
    pages: Vec<Page>,
}

impl Block {
    /// Construct a block handle for `path`; no I/O happens yet.
    pub fn new(path: impl AsRef<Path>, capacity_per_page: usize, cell_size: usize) -> Self {
        Block {
            path: path.as_ref().to_path_buf(),
            capacity_per_page,
            cell_size,
            pages: Vec::new(),
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    pub fn get_page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn get_page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn append(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn set_page(&mut self, index: usize, page: Page) {
        if index < self.pages.len() {
            self.pages[index] = page;
        } else {
            self.pages.push(page);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Load this block's pages from disk. Returns `true` iff the file
    /// existed and was loaded; otherwise the block starts empty and ready
    /// to accept appends.
    pub fn read(&mut self) -> Result<bool, DatabaseError> {
        if !self.path.exists() {
            return Ok(false);
        }

        let data = fs::read(&self.path)?;
        let n_pages = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let mut offset = 4;
        let mut pages = Vec::with_capacity(n_pages);
        for _ in 0..n_pages {
            let (page, consumed) =
                Page::deserialize_from(&data[offset..], self.capacity_per_page, self.cell_size)?;
            offset += consumed;
            pages.push(page);
        }
        self.pages = pages;
        Ok(true)
    }

    /// Serialize all owned pages to disk. This is a destructive flush: the
    /// in-memory page list is cleared afterward.
    pub fn write(&mut self) -> Result<(), DatabaseError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.pages.len() as u32).to_le_bytes());
        for page in &self.pages {
            page.serialize_into(&mut buf);
        }

        let mut file = fs::File::create(&self.path)?;
        file.write_all(&buf)?;
        self.pages.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_on_missing_file_returns_false_and_empty() {
        let dir = tempdir().unwrap();
        let mut block = Block::new(dir.path().join("0.0.data"), 4, 8);
        assert_eq!(block.read().unwrap(), false);
        assert!(block.is_empty());
    }

    #[test]
    fn write_then_read_round_trips_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.0.data");

        let mut block = Block::new(&path, 4, 8);
        let mut page = Page::new(4, 8);
        page.write(11).unwrap();
        page.write(22).unwrap();
        block.append(page);
        block.write().unwrap();
        assert!(block.is_empty(), "write() clears the in-memory page list");

        let mut reloaded = Block::new(&path, 4, 8);
        assert!(reloaded.read().unwrap());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get_page(0).unwrap().read(0).unwrap(), 11);
        assert_eq!(reloaded.get_page(0).unwrap().read(1).unwrap(), 22);
    }
}
