//! Mark-sweep collection.
//!
//! 1. Mark: seed a worklist from every root slot and trace iteratively,
//!    setting each reached header to `Marked`
//! 2. Sweep: walk the allocation records in address order; unmarked blocks
//!    go back to the free list (coalescing with free neighbours), marked
//!    ones are reset to `Unmarked` for the next cycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MARK                                  SWEEP                            │
//! │  ┌─────┐     ┌─────┐     ┌─────┐       ┌─────┬─────┬─────┬──────────┐  │
//! │  │ Root│────▶│  A  │────▶│  B  │       │  A  │free │  B  │   free   │  │
//! │  └─────┘     │mark │     │mark │       │unmk │     │unmk │          │  │
//! │              └─────┘     └─────┘       └─────┴─────┴─────┴──────────┘  │
//! │                          ┌─────┐              ▲ C's block returned     │
//! │                          │  C  │ unreached                              │
//! │                          └─────┘                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Objects never move, so no reference ever changes value.

use super::{CollectContext, CollectionResult, Collector};
use crate::error::{Corruption, HeapError};
use crate::heap::{Arena, FreeList};
use crate::object::{HEADER_SIZE, ObjRef, ObjectHeader, ObjectState};
use crate::trace::{SlotVisitor, trace_object};
use std::collections::BTreeMap;
use std::ptr::NonNull;

const NAME: &str = "mark-sweep";

/// Non-moving mark-sweep collector over a single arena.
pub struct MarkSweepCollector {
    arena: Arena,
    free: FreeList,
    /// Allocation records: block address → block size.
    records: BTreeMap<usize, usize>,
    /// Payload addresses discovered but not yet traced.
    worklist: Vec<usize>,
}

impl MarkSweepCollector {
    /// Create a collector managing an arena of `heap_size` bytes.
    pub fn new(heap_size: usize) -> Result<Self, HeapError> {
        let arena = Arena::new(heap_size).ok_or(HeapError::OutOfMemory {
            collector: NAME,
            requested: heap_size,
            available: 0,
        })?;
        let mut free = FreeList::new();
        free.insert(arena.start(), arena.size());

        Ok(Self {
            arena,
            free,
            records: BTreeMap::new(),
            worklist: Vec::with_capacity(1024),
        })
    }

    /// The free list, for inspection.
    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    /// Mark phase. Returns the number of objects marked.
    fn mark(&mut self, cx: CollectContext<'_>) -> Result<usize, HeapError> {
        self.worklist.clear();
        cx.roots.try_for_each_slot(|slot| {
            // SAFETY: registered slots stay valid while registered.
            let word = unsafe { *slot };
            if word != 0 {
                self.worklist.push(word);
            }
            Ok::<(), HeapError>(())
        })?;

        let mut marked = 0;
        while let Some(addr) = self.worklist.pop() {
            if !self.records.contains_key(&addr.wrapping_sub(HEADER_SIZE)) {
                return Err(HeapError::corrupted(addr, Corruption::DanglingReference));
            }

            // SAFETY: `addr` is the payload of a recorded allocation.
            let header = unsafe { ObjectHeader::from_payload(addr) };
            match header.validate(addr)? {
                ObjectState::Marked => continue,
                ObjectState::Unmarked => header.set_state(ObjectState::Marked),
                ObjectState::Forwarded => {
                    return Err(HeapError::corrupted(
                        addr,
                        Corruption::BadState {
                            found: ObjectState::Forwarded as u8,
                        },
                    ));
                }
            }
            marked += 1;

            let Some(obj) = ObjRef::from_word(addr) else {
                continue;
            };
            let mut visitor = MarkingVisitor {
                worklist: &mut self.worklist,
            };
            // SAFETY: `obj` is a recorded, validated allocation.
            unsafe { trace_object(cx.types, obj, &mut visitor)? };
        }

        Ok(marked)
    }

    /// Sweep phase.
    fn sweep(&mut self, result: &mut CollectionResult) -> Result<(), HeapError> {
        let mut dead: Vec<(usize, usize)> = Vec::new();

        for (&block, &size) in &self.records {
            // SAFETY: every record is the start of a block holding a header.
            let header = unsafe { ObjectHeader::at(block) };
            match header.validate(block + HEADER_SIZE)? {
                ObjectState::Marked => {
                    header.set_state(ObjectState::Unmarked);
                    result.objects_live += 1;
                    result.bytes_live += size;
                }
                ObjectState::Unmarked => dead.push((block, size)),
                ObjectState::Forwarded => {
                    return Err(HeapError::corrupted(
                        block + HEADER_SIZE,
                        Corruption::BadState {
                            found: ObjectState::Forwarded as u8,
                        },
                    ));
                }
            }
        }

        for (block, size) in dead {
            self.records.remove(&block);
            self.arena.zero(block, size);
            self.free.insert(block, size);
            result.objects_reclaimed += 1;
            result.bytes_reclaimed += size;
        }

        Ok(())
    }
}

impl Collector for MarkSweepCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn should_collect(&self, requested_bytes: usize) -> bool {
        !self.free.can_satisfy(requested_bytes)
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let (addr, granted) = self.free.take(size)?;
        self.records.insert(addr, granted);
        Some(self.arena.ptr_at(addr - self.arena.start()))
    }

    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        let mut result = CollectionResult::default();
        let marked = self.mark(cx)?;
        self.sweep(&mut result)?;
        debug_assert_eq!(marked, result.objects_live);
        Ok(result)
    }

    fn live_bytes(&self) -> usize {
        self.arena.size() - self.free.free_bytes()
    }

    fn available_bytes(&self) -> usize {
        self.free.free_bytes()
    }

    fn owns(&self, addr: usize) -> bool {
        self.records.contains_key(&addr.wrapping_sub(HEADER_SIZE))
    }

    fn object_count(&self) -> usize {
        self.records.len()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        for &block in self.records.keys() {
            if let Some(obj) = ObjRef::from_word(block + HEADER_SIZE) {
                f(obj);
            }
        }
    }
}

// =============================================================================
// Marking Visitor
// =============================================================================

/// Pushes every non-null referent onto the mark worklist.
struct MarkingVisitor<'a> {
    worklist: &'a mut Vec<usize>,
}

impl SlotVisitor for MarkingVisitor<'_> {
    #[inline]
    fn visit_slot(&mut self, slot: *mut usize) {
        // SAFETY: tracing only hands out slots inside live payloads.
        let word = unsafe { *slot };
        if word != 0 {
            self.worklist.push(word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support::{node_types, place};
    use crate::object::footprint;
    use crate::roots::RootRegistry;

    #[test]
    fn test_empty_collection() {
        let (types, _) = node_types();
        let roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let result = collector.collect(CollectContext { types: &types, roots: &roots }).unwrap();
        assert_eq!(result, CollectionResult::default());
        assert_eq!(collector.available_bytes(), 4096);
    }

    #[test]
    fn test_unreachable_block_is_reused() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let dead = place(&mut collector, node, 16);
        assert_eq!(collector.object_count(), 1);

        let result = collector.collect(CollectContext { types: &types, roots: &roots }).unwrap();
        assert_eq!(result.objects_reclaimed, 1);
        assert_eq!(result.bytes_reclaimed, footprint(16));
        assert_eq!(collector.object_count(), 0);
        assert!(!collector.owns(dead.addr()));
        assert_eq!(collector.free_list().block_count(), 1);

        let again = place(&mut collector, node, 16);
        assert_eq!(again, dead);
    }

    #[test]
    fn test_reachable_graph_survives_and_is_unmarked() {
        let (types, node) = node_types();
        let mut roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        let b = place(&mut collector, node, 16);
        let garbage = place(&mut collector, node, 16);
        unsafe {
            a.write_ref(0, Some(b));
            b.write_ref(8, Some(a));
        }

        let mut slot = a.to_word();
        let frame = roots.push_root();
        unsafe { roots.add_root(frame, &mut slot).unwrap() };

        let result = collector.collect(CollectContext { types: &types, roots: &roots }).unwrap();
        assert_eq!(result.objects_live, 2);
        assert_eq!(result.objects_reclaimed, 1);
        assert_eq!(slot, a.to_word());
        assert!(collector.owns(a.addr()));
        assert!(collector.owns(b.addr()));
        assert!(!collector.owns(garbage.addr()));

        for obj in [a, b] {
            let header = unsafe { ObjectHeader::from_payload(obj.addr()) };
            assert_eq!(header.state(), Some(ObjectState::Unmarked));
        }
    }

    #[test]
    fn test_adjacent_dead_blocks_coalesce() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        for _ in 0..8 {
            place(&mut collector, node, 16);
        }
        collector.collect(CollectContext { types: &types, roots: &roots }).unwrap();

        assert_eq!(collector.free_list().block_count(), 1);
        assert_eq!(collector.free_list().largest_block(), 4096);
    }

    #[test]
    fn test_dangling_root_detected() {
        let (types, _) = node_types();
        let mut roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let mut bogus = 0x40usize;
        let frame = roots.push_root();
        unsafe { roots.add_root(frame, &mut bogus).unwrap() };

        let err = collector
            .collect(CollectContext { types: &types, roots: &roots })
            .unwrap_err();
        assert_eq!(err, HeapError::corrupted(0x40, Corruption::DanglingReference));
    }

    #[test]
    fn test_trigger_policy() {
        let (_, node) = node_types();
        let mut collector = MarkSweepCollector::new(footprint(16) * 2).unwrap();
        assert!(!collector.should_collect(footprint(16)));

        place(&mut collector, node, 16);
        place(&mut collector, node, 16);
        assert!(collector.should_collect(footprint(16)));
        assert!(collector.try_allocate(footprint(16)).is_none());
    }
}
