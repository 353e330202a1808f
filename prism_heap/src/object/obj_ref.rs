//! Opaque reference to a heap object.
//!
//! `ObjRef` is what translated code holds. It points at the payload, never at
//! the header. Like a raw pointer it does not keep the object alive, and
//! under the copying collector it goes stale at the next collection unless
//! the word it lives in is registered as a root.

use std::ptr::NonNull;

/// Reference to the payload of a heap object.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(NonNull<u8>);

impl ObjRef {
    /// Wrap a payload pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be a payload address returned by the heap.
    #[inline]
    pub unsafe fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Decode a reference word; zero is the null reference.
    #[inline]
    pub fn from_word(word: usize) -> Option<Self> {
        NonNull::new(word as *mut u8).map(Self)
    }

    /// Encode as a reference word.
    #[inline]
    pub fn to_word(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Encode an optional reference; `None` is zero.
    #[inline]
    pub fn option_to_word(obj: Option<Self>) -> usize {
        obj.map(Self::to_word).unwrap_or(0)
    }

    /// Payload address.
    #[inline]
    pub fn addr(self) -> usize {
        self.to_word()
    }

    /// Payload pointer.
    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Address of the word at `offset`, suitable for root registration.
    #[inline]
    pub fn slot_ptr(self, offset: usize) -> *mut usize {
        self.0.as_ptr().wrapping_add(offset) as *mut usize
    }

    /// Read the word at `offset`.
    ///
    /// # Safety
    ///
    /// The object must be live and `offset + 8` within its payload.
    #[inline]
    pub unsafe fn read_word(self, offset: usize) -> usize {
        unsafe { self.slot_ptr(offset).read() }
    }

    /// Write the word at `offset`.
    ///
    /// # Safety
    ///
    /// Same as [`ObjRef::read_word`]. Writing a non-reference into a traced
    /// field corrupts the heap.
    #[inline]
    pub unsafe fn write_word(self, offset: usize, value: usize) {
        unsafe { self.slot_ptr(offset).write(value) }
    }

    /// Read the reference stored at `offset`.
    ///
    /// # Safety
    ///
    /// Same as [`ObjRef::read_word`].
    #[inline]
    pub unsafe fn read_ref(self, offset: usize) -> Option<ObjRef> {
        ObjRef::from_word(unsafe { self.read_word(offset) })
    }

    /// Store a reference at `offset`.
    ///
    /// # Safety
    ///
    /// Same as [`ObjRef::read_word`]; `value` must be a live heap object.
    #[inline]
    pub unsafe fn write_ref(self, offset: usize, value: Option<ObjRef>) {
        unsafe { self.write_word(offset, ObjRef::option_to_word(value)) }
    }

    /// Borrow `len` payload bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// The range must lie within the payload and the object must stay put
    /// (no allocation) for the lifetime of the slice.
    #[inline]
    pub unsafe fn bytes<'a>(self, offset: usize, len: usize) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr().add(offset), len) }
    }

    /// Mutable variant of [`ObjRef::bytes`].
    ///
    /// # Safety
    ///
    /// As for [`ObjRef::bytes`], plus no other borrow of the range may exist.
    #[inline]
    pub unsafe fn bytes_mut<'a>(self, offset: usize, len: usize) -> &'a mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr().add(offset), len) }
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjRef({:#x})", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_round_trip_and_null() {
        assert_eq!(ObjRef::from_word(0), None);
        assert_eq!(ObjRef::option_to_word(None), 0);

        let obj = ObjRef::from_word(0x1000).unwrap();
        assert_eq!(obj.to_word(), 0x1000);
        assert_eq!(obj.slot_ptr(16) as usize, 0x1010);
        assert_eq!(format!("{obj:?}"), "ObjRef(0x1000)");
    }

    #[test]
    fn test_field_access() {
        let mut backing = [0usize; 4];
        let obj = ObjRef::from_word(backing.as_mut_ptr() as usize).unwrap();
        let other = ObjRef::from_word(0x2000).unwrap();

        unsafe {
            obj.write_word(0, 42);
            obj.write_ref(8, Some(other));
            assert_eq!(obj.read_word(0), 42);
            assert_eq!(obj.read_ref(8), Some(other));
            assert_eq!(obj.read_ref(16), None);
        }
        assert_eq!(backing[1], 0x2000);
    }
}
