//! Copying (semi-space) collection.
//!
//! Cheney's algorithm:
//! 1. Evacuate every object a root slot points at into to-space and rewrite
//!    the slot to the copy's address
//! 2. Walk to-space with a scan cursor; each copied object's reference
//!    slots are evacuated (or resolved through a forwarding header) in turn
//! 3. When the scan cursor catches up with the allocation cursor, flip
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FROM-SPACE                    │  TO-SPACE                              │
//! │  ┌─────┬─────┬─────┬───────┐   │  ┌─────┬─────┬───────────────────────┐ │
//! │  │  A  │  B  │  C  │ free  │   │  │  A' │  C' │      free             │ │
//! │  │ fwd │dead │ fwd │       │──▶│  │copy │copy │                       │ │
//! │  └─────┴─────┴─────┴───────┘   │  └─────┴─────┴───────────────────────┘ │
//! │                                │   ▲scan      ▲alloc                    │
//! │  B is unreachable, not copied  │  Only live objects are copied          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every object is evacuated at most once per collection. The old header
//! becomes a forwarding header; a second attempt to evacuate the same
//! address is reported as corruption rather than producing two copies.
//!
//! The collector keeps the set of object starts in the active space. A
//! reference word that is not one of them is dangling, even when it lands
//! inside a space: a stale reference from before the previous flip points
//! into what is now the evacuation space, where it would otherwise alias a
//! fresh copy.

use super::{CollectContext, CollectionResult, Collector};
use crate::error::{Corruption, HeapError};
use crate::heap::SemiSpaces;
use crate::object::{HEADER_SIZE, OBJECT_ALIGN, ObjRef, ObjectHeader, ObjectState};
use crate::trace::{SlotVisitor, trace_object};
use rustc_hash::FxHashSet;
use std::ptr::NonNull;

const NAME: &str = "copying";

/// Cheney semi-space collector.
///
/// The configured heap size is split evenly between the two spaces, so at
/// most half of it is usable at any time.
pub struct CopyingCollector {
    spaces: SemiSpaces,
    /// Payload addresses of the objects in the active space.
    resident: FxHashSet<usize>,
    /// Payload addresses of the copies made by the running collection.
    copies: FxHashSet<usize>,
    /// From-space payload addresses evacuated during the current (or last)
    /// collection.
    forwarded: FxHashSet<usize>,
}

impl CopyingCollector {
    /// Create a collector over `heap_size` bytes, half per semi-space.
    pub fn new(heap_size: usize) -> Result<Self, HeapError> {
        let space_size = (heap_size / 2) & !(OBJECT_ALIGN - 1);
        let spaces = SemiSpaces::new(space_size).ok_or(HeapError::OutOfMemory {
            collector: NAME,
            requested: heap_size,
            available: 0,
        })?;

        Ok(Self {
            spaces,
            resident: FxHashSet::default(),
            copies: FxHashSet::default(),
            forwarded: FxHashSet::default(),
        })
    }

    /// Size of each semi-space.
    pub fn semi_space_size(&self) -> usize {
        self.spaces.size()
    }

    /// Objects evacuated by the most recent collection.
    pub fn last_evacuated(&self) -> usize {
        self.forwarded.len()
    }

    /// Walk the active space header by header.
    fn walk(&self, mut f: impl FnMut(usize, &ObjectHeader)) {
        let mut cursor = self.spaces.from_start();
        let end = self.spaces.from_cursor();
        while cursor < end {
            // SAFETY: the active space is a dense sequence of allocations.
            let header = unsafe { ObjectHeader::at(cursor) };
            f(cursor, header);
            cursor += header.footprint();
        }
    }
}

impl Collector for CopyingCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn should_collect(&self, requested_bytes: usize) -> bool {
        self.spaces.free() < requested_bytes
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let block = self.spaces.alloc(size)?;
        self.resident.insert(block.as_ptr() as usize + HEADER_SIZE);
        Some(block)
    }

    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        let mut result = CollectionResult::default();
        let allocated_before = self.spaces.allocated();
        let objects_before = self.resident.len();
        self.forwarded.clear();
        self.copies.clear();

        let mut evacuator = Evacuator {
            spaces: &mut self.spaces,
            resident: &self.resident,
            copies: &mut self.copies,
            forwarded: &mut self.forwarded,
            result: &mut result,
            error: None,
        };

        // Phase 1: roots. A slot registered more than once is already
        // rewritten on its second visit.
        let mut root_slots: FxHashSet<usize> = FxHashSet::default();
        cx.roots.try_for_each_slot(|slot| {
            if !root_slots.insert(slot as usize) {
                return Ok(());
            }
            evacuator.forward_slot(slot)
        })?;

        // Phase 2: Cheney scan
        let mut scan = evacuator.spaces.to_start();
        while scan < evacuator.spaces.to_cursor() {
            // SAFETY: to-space below the cursor holds complete copies.
            let footprint = unsafe { ObjectHeader::at(scan) }.footprint();
            if let Some(obj) = ObjRef::from_word(scan + HEADER_SIZE) {
                // SAFETY: `obj` is a freshly copied, unforwarded object.
                unsafe { trace_object(cx.types, obj, &mut evacuator)? };
            }
            if let Some(err) = evacuator.error.take() {
                return Err(err);
            }
            scan += footprint;
        }

        // Phase 3: flip
        self.spaces.flip();
        std::mem::swap(&mut self.resident, &mut self.copies);
        self.copies.clear();

        let survivors = self.resident.len();
        result.objects_live = survivors;
        result.bytes_live = self.spaces.allocated();
        result.objects_reclaimed = objects_before.saturating_sub(survivors);
        result.bytes_reclaimed = allocated_before.saturating_sub(result.bytes_live);

        Ok(result)
    }

    fn live_bytes(&self) -> usize {
        self.spaces.allocated()
    }

    fn available_bytes(&self) -> usize {
        self.spaces.free()
    }

    fn owns(&self, addr: usize) -> bool {
        self.spaces.in_from_space(addr) && self.resident.contains(&addr)
    }

    fn object_count(&self) -> usize {
        self.resident.len()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        self.walk(|block, _| {
            if let Some(obj) = ObjRef::from_word(block + HEADER_SIZE) {
                f(obj);
            }
        });
    }
}

// =============================================================================
// Evacuating Visitor
// =============================================================================

/// Rewrites reference slots to point into to-space, copying referents on
/// first contact.
struct Evacuator<'a> {
    spaces: &'a mut SemiSpaces,
    /// Objects in from-space at the start of the collection.
    resident: &'a FxHashSet<usize>,
    copies: &'a mut FxHashSet<usize>,
    forwarded: &'a mut FxHashSet<usize>,
    result: &'a mut CollectionResult,
    /// First failure seen while visiting; later slots are skipped.
    error: Option<HeapError>,
}

impl Evacuator<'_> {
    fn forward_slot(&mut self, slot: *mut usize) -> Result<(), HeapError> {
        // SAFETY: slots come from the root registry or from a live payload.
        let word = unsafe { *slot };
        if word == 0 {
            return Ok(());
        }
        // Checked before any header is read: interior, stale and foreign
        // addresses never reach `from_payload`.
        if !self.resident.contains(&word) {
            return Err(HeapError::corrupted(word, Corruption::DanglingReference));
        }

        // SAFETY: `word` is the payload address of a from-space object.
        let header = unsafe { ObjectHeader::from_payload(word) };
        let target = match header.validate(word)? {
            ObjectState::Unmarked => self.evacuate(word, header)?,
            ObjectState::Forwarded => {
                let target = header.forwarding_address().unwrap_or(0);
                if !self.spaces.in_to_space(target) || !self.copies.contains(&target) {
                    return Err(HeapError::corrupted(
                        word,
                        Corruption::DanglingForward { target },
                    ));
                }
                target
            }
            ObjectState::Marked => {
                return Err(HeapError::corrupted(
                    word,
                    Corruption::BadState {
                        found: ObjectState::Marked as u8,
                    },
                ));
            }
        };

        // SAFETY: see above.
        unsafe { *slot = target };
        Ok(())
    }

    /// Copy the object at `addr` and leave a forwarding header behind.
    fn evacuate(&mut self, addr: usize, header: &mut ObjectHeader) -> Result<usize, HeapError> {
        if !self.forwarded.insert(addr) {
            return Err(HeapError::corrupted(addr, Corruption::DoubleForward));
        }

        let footprint = header.footprint();
        let block = self
            .spaces
            .alloc_to_space(footprint)
            .ok_or(HeapError::OutOfMemory {
                collector: NAME,
                requested: footprint,
                available: 0,
            })?;

        // SAFETY: both ranges are `footprint` bytes inside distinct arenas.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (addr - HEADER_SIZE) as *const u8,
                block.as_ptr(),
                footprint,
            );
        }
        let new_addr = block.as_ptr() as usize + HEADER_SIZE;
        header.forward_to(new_addr);
        self.copies.insert(new_addr);

        self.result.objects_relocated += 1;
        self.result.bytes_relocated += footprint;
        self.result.forwarding_headers += 1;
        Ok(new_addr)
    }
}

impl SlotVisitor for Evacuator<'_> {
    fn visit_slot(&mut self, slot: *mut usize) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.forward_slot(slot) {
            self.error = Some(err);
        }
    }
}
