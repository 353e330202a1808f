//! Semi-space pair for copying collection.
//!
//! Allocation is O(1) bump-pointer in the active space:
//! ```text
//! cursor += size;
//! return cursor - size;
//! ```
//! During a collection survivors are bumped into the other space, which then
//! becomes the active one.

use super::arena::Arena;
use std::ptr::NonNull;

/// One bump-allocated half of the heap.
struct Space {
    arena: Arena,
    /// Offset of the next free byte.
    cursor: usize,
}

impl Space {
    fn new(size: usize) -> Option<Self> {
        Some(Self {
            arena: Arena::new(size)?,
            cursor: 0,
        })
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let end = self.cursor.checked_add(size)?;
        if end > self.arena.size() {
            return None;
        }
        let ptr = self.arena.ptr_at(self.cursor);
        self.cursor = end;
        Some(ptr)
    }

    #[inline]
    fn free(&self) -> usize {
        self.arena.size() - self.cursor
    }

    /// Forget every allocation. Memory is zeroed so that stale references
    /// read invalid headers instead of plausible ones.
    fn reset(&mut self) {
        self.arena.zero(self.arena.start(), self.cursor);
        self.cursor = 0;
    }
}

/// The two semi-spaces; exactly one is active at any time.
pub struct SemiSpaces {
    from: Space,
    to: Space,
    size: usize,
}

impl SemiSpaces {
    /// Create two spaces of `size` bytes each.
    pub fn new(size: usize) -> Option<Self> {
        Some(Self {
            from: Space::new(size)?,
            to: Space::new(size)?,
            size,
        })
    }

    /// Bump-allocate in the active space.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.from.alloc(size)
    }

    /// Bump-allocate in the evacuation space (collection only).
    #[inline]
    pub fn alloc_to_space(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.to.alloc(size)
    }

    /// Check if an address is in the active space's allocated prefix.
    #[inline]
    pub fn in_from_space(&self, addr: usize) -> bool {
        addr >= self.from.arena.start() && addr < self.from.arena.start() + self.from.cursor
    }

    /// Check if an address is in the evacuation space's allocated prefix.
    #[inline]
    pub fn in_to_space(&self, addr: usize) -> bool {
        addr >= self.to.arena.start() && addr < self.to.arena.start() + self.to.cursor
    }

    /// Start of the active space.
    #[inline]
    pub fn from_start(&self) -> usize {
        self.from.arena.start()
    }

    /// Allocation cursor of the active space, as an address.
    #[inline]
    pub fn from_cursor(&self) -> usize {
        self.from.arena.start() + self.from.cursor
    }

    /// Start of the evacuation space.
    #[inline]
    pub fn to_start(&self) -> usize {
        self.to.arena.start()
    }

    /// Allocation cursor of the evacuation space, as an address.
    #[inline]
    pub fn to_cursor(&self) -> usize {
        self.to.arena.start() + self.to.cursor
    }

    /// Bytes allocated in the active space.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.from.cursor
    }

    /// Bytes still free in the active space.
    #[inline]
    pub fn free(&self) -> usize {
        self.from.free()
    }

    /// Size of each semi-space.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Make the evacuation space active after a copying collection.
    ///
    /// The old active space is reset and becomes the next evacuation space.
    pub fn flip(&mut self) {
        self.from.reset();
        std::mem::swap(&mut self.from, &mut self.to);
    }
}
