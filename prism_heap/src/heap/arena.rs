//! Raw memory regions backing the collectors.

use crate::object::OBJECT_ALIGN;
use std::alloc::Layout;
use std::ptr::NonNull;

/// A contiguous, zero-initialised region obtained from the system allocator.
pub struct Arena {
    start: NonNull<u8>,
    size: usize,
}

impl Arena {
    /// Allocate a zeroed arena of `size` bytes.
    ///
    /// Returns `None` if the system allocator refuses.
    pub fn new(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size.max(OBJECT_ALIGN), OBJECT_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).map(|start| Self { start, size })
    }

    /// First address of the arena.
    #[inline]
    pub fn start(&self) -> usize {
        self.start.as_ptr() as usize
    }

    /// One past the last address of the arena.
    #[inline]
    pub fn end(&self) -> usize {
        self.start() + self.size
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if an address lies within the arena.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }

    /// Pointer to `offset` bytes into the arena.
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.size);
        // SAFETY: offset is within the allocation (or one past it).
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) }
    }

    /// Zero `len` bytes at absolute address `addr`.
    pub fn zero(&self, addr: usize, len: usize) {
        debug_assert!(addr >= self.start() && addr + len <= self.end());
        // SAFETY: range checked above; the arena owns the memory.
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0, len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::from_size_align(self.size.max(OBJECT_ALIGN), OBJECT_ALIGN) {
            // SAFETY: allocated in `new` with the same layout.
            unsafe { std::alloc::dealloc(self.start.as_ptr(), layout) }
        }
    }
}

// Safety: the arena exclusively owns its memory; access is serialized by
// the owning heap.
unsafe impl Send for Arena {}
