//! Leaky allocation: bump-allocate, never reclaim.
//!
//! Used to separate collector bugs from mutator bugs: if a failure goes away
//! under this collector, the collector is at fault. Objects still carry full
//! headers of registered types, so verification and tracing work unchanged.

use super::{CollectContext, CollectionResult, Collector};
use crate::error::HeapError;
use crate::heap::Arena;
use crate::object::{HEADER_SIZE, ObjRef, ObjectHeader};
use rustc_hash::FxHashSet;
use std::ptr::NonNull;

const NAME: &str = "leaky";

/// Collector whose `collect` reclaims nothing.
pub struct LeakyCollector {
    arena: Arena,
    /// Offset of the next free byte.
    cursor: usize,
    /// Payload addresses of every allocation.
    objects: FxHashSet<usize>,
}

impl LeakyCollector {
    /// Create a collector over an arena of `heap_size` bytes.
    pub fn new(heap_size: usize) -> Result<Self, HeapError> {
        let arena = Arena::new(heap_size).ok_or(HeapError::OutOfMemory {
            collector: NAME,
            requested: heap_size,
            available: 0,
        })?;
        Ok(Self {
            arena,
            cursor: 0,
            objects: FxHashSet::default(),
        })
    }
}

impl Collector for LeakyCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn should_collect(&self, _requested_bytes: usize) -> bool {
        false
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let end = self.cursor.checked_add(size)?;
        if end > self.arena.size() {
            return None;
        }
        let ptr = self.arena.ptr_at(self.cursor);
        self.cursor = end;
        self.objects.insert(ptr.as_ptr() as usize + HEADER_SIZE);
        Some(ptr)
    }

    fn collect(&mut self, _cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        Ok(CollectionResult {
            objects_live: self.objects.len(),
            bytes_live: self.cursor,
            ..Default::default()
        })
    }

    fn live_bytes(&self) -> usize {
        self.cursor
    }

    fn available_bytes(&self) -> usize {
        self.arena.size() - self.cursor
    }

    fn owns(&self, addr: usize) -> bool {
        self.objects.contains(&addr)
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        let end = self.arena.start() + self.cursor;
        let mut block = self.arena.start();
        while block < end {
            // SAFETY: the arena below the cursor is a dense run of allocations.
            let footprint = unsafe { ObjectHeader::at(block) }.footprint();
            if let Some(obj) = ObjRef::from_word(block + HEADER_SIZE) {
                f(obj);
            }
            block += footprint;
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
    fn test_collect_reclaims_nothing() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut collector = LeakyCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        let b = place(&mut collector, node, 16);
        assert!(!collector.should_collect(usize::MAX));

        let result = collector.collect(CollectContext { types: &types, roots: &roots }).unwrap();
        assert_eq!(result.objects_reclaimed, 0);
        assert_eq!(result.objects_live, 2);
        assert_eq!(collector.live_bytes(), 2 * footprint(16));
        assert!(collector.owns(a.addr()));
        assert!(collector.owns(b.addr()));
        assert!(!collector.owns(b.addr() + 8));
    }

    #[test]
    fn test_objects_walked_in_address_order() {
        let (_, node) = node_types();
        let mut collector = LeakyCollector::new(4096).unwrap();
        let placed: Vec<ObjRef> = (0..5).map(|_| place(&mut collector, node, 16)).collect();

        let mut seen = Vec::new();
        collector.for_each_object(&mut |obj| seen.push(obj));
        assert_eq!(seen, placed);
    }

    #[test]
    fn test_exhaustion() {
        let mut collector = LeakyCollector::new(64).unwrap();
        assert!(collector.try_allocate(48).is_some());
        assert!(collector.try_allocate(24).is_none());
        assert_eq!(collector.available_bytes(), 16);
    }
}
