//! Address-ordered free list for the mark-sweep heap.
//!
//! Blocks are kept sorted by address so that a block returned by the sweeper
//! can be merged with its neighbours in `O(log n)`:
//!
//! ```text
//!   before insert(B):   [A free][B live][C free]
//!   after  insert(B):   [A + B + C free        ]
//! ```

use crate::object::footprint;
use std::collections::BTreeMap;

/// Smallest block worth keeping on the list: one empty object.
pub const MIN_BLOCK_SIZE: usize = footprint(0);

/// Free blocks keyed by start address.
#[derive(Debug, Default)]
pub struct FreeList {
    blocks: BTreeMap<usize, usize>,
    free_bytes: usize,
}

impl FreeList {
    /// Create an empty free list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `[addr, addr + size)` to the list, merging with adjacent blocks.
    pub fn insert(&mut self, addr: usize, size: usize) {
        debug_assert!(size > 0);
        self.free_bytes += size;

        let mut start = addr;
        let mut len = size;

        if let Some((&prev_addr, &prev_len)) = self.blocks.range(..addr).next_back() {
            debug_assert!(prev_addr + prev_len <= addr, "free block overlap");
            if prev_addr + prev_len == addr {
                self.blocks.remove(&prev_addr);
                start = prev_addr;
                len += prev_len;
            }
        }

        if let Some(next_len) = self.blocks.remove(&(addr + size)) {
            len += next_len;
        }

        self.blocks.insert(start, len);
    }

    /// Take a block of at least `size` bytes, first fit by address.
    ///
    /// Returns the block address and the number of bytes actually handed
    /// out: a tail too small to hold an object stays with the allocation.
    pub fn take(&mut self, size: usize) -> Option<(usize, usize)> {
        let (&addr, &len) = self.blocks.iter().find(|&(_, &len)| len >= size)?;
        self.blocks.remove(&addr);

        let remainder = len - size;
        let granted = if remainder >= MIN_BLOCK_SIZE {
            self.blocks.insert(addr + size, remainder);
            size
        } else {
            len
        };

        self.free_bytes -= granted;
        Some((addr, granted))
    }

    /// Whether some block can hold `size` bytes.
    pub fn can_satisfy(&self, size: usize) -> bool {
        self.blocks.values().any(|&len| len >= size)
    }

    /// Total free bytes.
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// Size of the largest block.
    pub fn largest_block(&self) -> usize {
        self.blocks.values().copied().max().unwrap_or(0)
    }

    /// Number of distinct blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether `addr` is the start of a free block.
    pub fn contains_block(&self, addr: usize) -> bool {
        self.blocks.contains_key(&addr)
    }

    /// Iterate over `(address, size)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().map(|(&addr, &len)| (addr, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_splits_block() {
        let mut list = FreeList::new();
        list.insert(0x1000, 1024);

        let (addr, granted) = list.take(64).unwrap();
        assert_eq!(addr, 0x1000);
        assert_eq!(granted, 64);
        assert_eq!(list.free_bytes(), 960);
        assert!(list.contains_block(0x1040));
    }

    #[test]
    fn test_small_tail_goes_with_allocation() {
        let mut list = FreeList::new();
        list.insert(0x1000, 64 + MIN_BLOCK_SIZE - 8);

        let (_, granted) = list.take(64).unwrap();
        assert_eq!(granted, 64 + MIN_BLOCK_SIZE - 8);
        assert_eq!(list.block_count(), 0);
        assert_eq!(list.free_bytes(), 0);
    }

    #[test]
    fn test_first_fit_by_address() {
        let mut list = FreeList::new();
        list.insert(0x3000, 256);
        list.insert(0x1000, 128);

        assert_eq!(list.take(128).map(|(a, _)| a), Some(0x1000));
        assert_eq!(list.take(128).map(|(a, _)| a), Some(0x3000));
    }

    #[test]
    fn test_coalesce_both_sides() {
        let mut list = FreeList::new();
        list.insert(0x1000, 0x100);
        list.insert(0x1200, 0x100);
        assert_eq!(list.block_count(), 2);

        list.insert(0x1100, 0x100);
        assert_eq!(list.block_count(), 1);
        assert_eq!(list.largest_block(), 0x300);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![(0x1000, 0x300)]);
    }

    #[test]
    fn test_no_coalesce_across_gap() {
        let mut list = FreeList::new();
        list.insert(0x1000, 0x100);
        list.insert(0x1180, 0x80);
        assert_eq!(list.block_count(), 2);
        assert!(list.can_satisfy(0x100));
        assert!(!list.can_satisfy(0x101));
    }

    #[test]
    fn test_exhaustion() {
        let mut list = FreeList::new();
        list.insert(0x1000, 128);
        assert!(list.take(256).is_none());
        assert_eq!(list.free_bytes(), 128);
    }
}
