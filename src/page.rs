//! Fixed-size byte buffer holding up to `page_size / cell_size` signed
//! integer cells. Writes append; `write_at` overwrites an existing cell.

use crate::errors::DatabaseError;

/// A physical page: a byte buffer of `capacity * cell_size` bytes, plus the
/// count of cells actually written (`num_cells`, the used prefix).
#[derive(Debug, Clone)]
pub struct Page {
    cell_size: usize,
    capacity: usize,
    bytes: Vec<u8>,
    num_cells: usize,
}

impl Page {
    /// Create a new, empty page able to hold `capacity` cells of `cell_size` bytes each.
    pub fn new(capacity: usize, cell_size: usize) -> Self {
        Page {
            cell_size,
            capacity,
            bytes: vec![0u8; capacity * cell_size],
            num_cells: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn has_capacity(&self) -> bool {
        self.num_cells < self.capacity
    }

    /// Append a new cell. Fails if the page has no remaining capacity.
    pub fn write(&mut self, value: i64) -> Result<usize, DatabaseError> {
        if !self.has_capacity() {
            return Err(DatabaseError::PageFull {
                capacity: self.capacity,
            });
        }
        let cell = self.num_cells;
        self.encode_at(cell, value);
        self.num_cells += 1;
        Ok(cell)
    }

    /// Overwrite an existing cell in place. Does not move `num_cells`.
    pub fn write_at(&mut self, value: i64, cell: usize) -> Result<(), DatabaseError> {
        if cell >= self.num_cells {
            return Err(DatabaseError::OffsetOutOfRange {
                offset: cell,
                num_cells: self.num_cells,
            });
        }
        self.encode_at(cell, value);
        Ok(())
    }

    /// Read the integer stored at `cell`.
    pub fn read(&self, cell: usize) -> Result<i64, DatabaseError> {
        if cell >= self.num_cells {
            return Err(DatabaseError::OffsetOutOfRange {
                offset: cell,
                num_cells: self.num_cells,
            });
        }
        Ok(self.decode_at(cell))
    }

    /// Iterate over written cells `0 .. num_cells`.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.num_cells).map(move |c| self.decode_at(c))
    }

    fn encode_at(&mut self, cell: usize, value: i64) {
        let start = cell * self.cell_size;
        let full = value.to_be_bytes();
        let take = full.len().min(self.cell_size);
        self.bytes[start..start + take].copy_from_slice(&full[full.len() - take..]);
    }

    fn decode_at(&self, cell: usize) -> i64 {
        let start = cell * self.cell_size;
        let slice = &self.bytes[start..start + self.cell_size];
        let mut buf = [0u8; 8];
        let pad = if slice[0] & 0x80 != 0 { 0xffu8 } else { 0u8 };
        buf.fill(pad);
        let offset = 8usize.saturating_sub(self.cell_size);
        buf[offset..].copy_from_slice(&slice[slice.len().saturating_sub(8 - offset)..]);
        i64::from_be_bytes(buf)
    }

    /// Serialize `num_cells` (4 bytes LE) then the raw page bytes (`page_size` bytes).
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.num_cells as u32).to_le_bytes());
        out.extend_from_slice(&self.bytes);
    }

    /// Inverse of `serialize_into`; `page_size` is `capacity * cell_size`.
    pub fn deserialize_from(
        data: &[u8],
        capacity: usize,
        cell_size: usize,
    ) -> Result<(Self, usize), DatabaseError> {
        let num_cells = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let page_size = capacity * cell_size;
        let bytes = data[4..4 + page_size].to_vec();
        Ok((
            Page {
                cell_size,
                capacity,
                bytes,
                num_cells,
            },
            4 + page_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut page = Page::new(4, 8);
        assert!(page.has_capacity());
        let c0 = page.write(42).unwrap();
        let c1 = page.write(-7).unwrap();
        assert_eq!(page.read(c0).unwrap(), 42);
        assert_eq!(page.read(c1).unwrap(), -7);
    }

    #[test]
    fn write_fails_once_full() {
        let mut page = Page::new(2, 8);
        page.write(1).unwrap();
        page.write(2).unwrap();
        assert!(!page.has_capacity());
        assert!(matches!(page.write(3), Err(DatabaseError::PageFull { .. })));
    }

    #[test]
    fn read_out_of_range_errors() {
        let page = Page::new(2, 8);
        assert!(matches!(
            page.read(0),
            Err(DatabaseError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn write_at_overwrites_existing_cell() {
        let mut page = Page::new(2, 8);
        page.write(1).unwrap();
        page.write_at(99, 0).unwrap();
        assert_eq!(page.read(0).unwrap(), 99);
    }

    #[test]
    fn serialize_round_trip() {
        let mut page = Page::new(4, 8);
        page.write(10).unwrap();
        page.write(-20).unwrap();
        let mut buf = Vec::new();
        page.serialize_into(&mut buf);
        let (restored, consumed) = Page::deserialize_from(&buf, 4, 8).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(restored.read(0).unwrap(), 10);
        assert_eq!(restored.read(1).unwrap(), -20);
    }

    #[test]
    fn small_cell_size_encodes_negative_values() {
        let mut page = Page::new(2, 2);
        page.write(-1).unwrap();
        assert_eq!(page.read(0).unwrap(), -1);
    }
}
