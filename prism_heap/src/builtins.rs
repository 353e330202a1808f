//! Standard layouts shared by translated code.
//!
//! ```text
//! Str   ┌────────┬──────────────────────┐
//!       │ len    │ bytes[len]           │   opaque
//!       └────────┴──────────────────────┘
//! Slab  ┌────────┬──────┬──────┬────────┐
//!       │ count  │ e[0] │ e[1] │ ...    │   traced elements
//!       └────────┴──────┴──────┴────────┘
//! List  ┌────────┬────────┐
//!       │ len    │ slab ──┼──▶ Slab with count >= len
//!       └────────┴────────┘
//! ```
//!
//! Helpers that allocate more than once keep their intermediates in a root
//! frame and re-read them after every allocation, since the copying
//! collector moves objects.

use crate::error::{Corruption, HeapError};
use crate::heap::Heap;
use crate::object::{ObjRef, TypeDescriptor, TypeId, VariableRegion, WORD_SIZE};

/// Offset of a string's byte length.
pub const STR_LEN: usize = 0;
/// Offset of a string's first byte.
pub const STR_BYTES: usize = WORD_SIZE;
/// Offset of a slab's element count.
pub const SLAB_COUNT: usize = 0;
/// Offset of a slab's first element.
pub const SLAB_ELEMENTS: usize = WORD_SIZE;
/// Offset of a list's length.
pub const LIST_LEN: usize = 0;
/// Offset of a list's backing slab reference.
pub const LIST_SLAB: usize = WORD_SIZE;

/// Type ids of the standard layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    /// Length-prefixed opaque bytes.
    pub str_type: TypeId,
    /// Count-prefixed traced references.
    pub slab_type: TypeId,
    /// Growable list backed by a slab.
    pub list_type: TypeId,
}

impl Builtins {
    /// Register the three layouts with `heap`.
    pub fn register(heap: &mut Heap) -> Result<Self, HeapError> {
        let str_type = heap.register_type(
            TypeDescriptor::new("Str", WORD_SIZE)
                .scalar(STR_LEN)
                .with_variable_region(VariableRegion::scalar(STR_LEN, 1)),
        )?;
        let slab_type = heap.register_type(
            TypeDescriptor::new("Slab", WORD_SIZE)
                .scalar(SLAB_COUNT)
                .with_variable_region(VariableRegion::traced(SLAB_COUNT)),
        )?;
        let list_type = heap.register_type(
            TypeDescriptor::new("List", 2 * WORD_SIZE)
                .scalar(LIST_LEN)
                .traced(LIST_SLAB),
        )?;

        Ok(Self {
            str_type,
            slab_type,
            list_type,
        })
    }

    // =========================================================================
    // Str
    // =========================================================================

    /// Allocate a string holding a copy of `text`.
    pub fn alloc_str(&self, heap: &mut Heap, text: &str) -> Result<ObjRef, HeapError> {
        let obj = heap.allocate_array(self.str_type, text.len())?;
        // SAFETY: the payload was just sized for `text.len()` bytes.
        unsafe { obj.bytes_mut(STR_BYTES, text.len()) }.copy_from_slice(text.as_bytes());
        Ok(obj)
    }

    /// Bytes of a string.
    ///
    /// # Safety
    ///
    /// `obj` must be a live `Str`, and the slice must not be held across an
    /// allocation.
    pub unsafe fn str_bytes<'a>(&self, obj: ObjRef) -> &'a [u8] {
        unsafe {
            let len = obj.read_word(STR_LEN);
            obj.bytes(STR_BYTES, len)
        }
    }

    // =========================================================================
    // Slab
    // =========================================================================

    /// Allocate a slab of `count` null elements.
    pub fn alloc_slab(&self, heap: &mut Heap, count: usize) -> Result<ObjRef, HeapError> {
        heap.allocate_array(self.slab_type, count)
    }

    // =========================================================================
    // List
    // =========================================================================

    /// Allocate an empty list with room for `capacity` elements.
    pub fn alloc_list(&self, heap: &mut Heap, capacity: usize) -> Result<ObjRef, HeapError> {
        let list_type = self.list_type;
        heap.scoped(|heap, frame| {
            let mut list = heap.allocate(list_type, 0)?.to_word();
            // SAFETY: `list` outlives the frame.
            unsafe { heap.add_root(frame, &mut list)? };

            let slab = self.alloc_slab(heap, capacity)?;
            let list = live(list)?;
            // SAFETY: `list` was re-read from its root after the allocation.
            unsafe { list.write_ref(LIST_SLAB, Some(slab)) };
            Ok(list)
        })
    }

    /// Number of elements in a list.
    ///
    /// # Safety
    ///
    /// `list` must be a live `List`.
    pub unsafe fn list_len(&self, list: ObjRef) -> usize {
        unsafe { list.read_word(LIST_LEN) }
    }

    /// Element `index` of a list, or `None` past the end or for a null
    /// element.
    ///
    /// # Safety
    ///
    /// `list` must be a live `List`.
    pub unsafe fn list_get(&self, list: ObjRef, index: usize) -> Option<ObjRef> {
        unsafe {
            if index >= self.list_len(list) {
                return None;
            }
            let slab = list.read_ref(LIST_SLAB)?;
            slab.read_ref(SLAB_ELEMENTS + index * WORD_SIZE)
        }
    }

    /// Append the object in `*value` to the list in `*list`, growing the
    /// backing slab when full.
    ///
    /// Both are passed as slots so that they can be rewritten if growing
    /// the slab moves them.
    ///
    /// # Safety
    ///
    /// Both slots must be registered roots of `heap` holding, respectively,
    /// a live `List` and zero or a live object.
    pub unsafe fn list_push(
        &self,
        heap: &mut Heap,
        list: *mut usize,
        value: *mut usize,
    ) -> Result<(), HeapError> {
        unsafe {
            let current = live(*list)?;
            let len = current.read_word(LIST_LEN);
            let capacity = match current.read_ref(LIST_SLAB) {
                Some(slab) => slab.read_word(SLAB_COUNT),
                None => 0,
            };

            if len == capacity {
                let grown = self.alloc_slab(heap, (capacity * 2).max(4))?;
                let current = live(*list)?;
                if let Some(old) = current.read_ref(LIST_SLAB) {
                    for index in 0..len {
                        let offset = SLAB_ELEMENTS + index * WORD_SIZE;
                        grown.write_word(offset, old.read_word(offset));
                    }
                }
                current.write_ref(LIST_SLAB, Some(grown));
            }

            let current = live(*list)?;
            let slab = live(current.read_word(LIST_SLAB))?;
            slab.write_word(SLAB_ELEMENTS + len * WORD_SIZE, *value);
            current.write_word(LIST_LEN, len + 1);
        }
        Ok(())
    }
}

/// A reference word that must not be null.
fn live(word: usize) -> Result<ObjRef, HeapError> {
    ObjRef::from_word(word).ok_or(HeapError::corrupted(word, Corruption::DanglingReference))
}
