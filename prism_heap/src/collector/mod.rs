//! Garbage collection strategies.
//!
//! - [`MarkSweepCollector`]: marks in place, sweeps into a coalescing free
//!   list. Objects never move.
//! - [`CopyingCollector`]: Cheney semi-space evacuation. Compacts, but every
//!   rooted reference is rewritten at each collection.
//! - [`LeakyCollector`]: bump allocation that never reclaims.
//!
//! All three sit behind the [`Collector`] trait. The heap and the
//! diagnostics wrappers depend on nothing else.

mod copying;
mod leaky;
mod mark_sweep;

pub use copying::CopyingCollector;
pub use leaky::LeakyCollector;
pub use mark_sweep::MarkSweepCollector;

use crate::error::HeapError;
use crate::object::{ObjRef, TypeRegistry};
use crate::roots::RootRegistry;
use crate::stats::GcStats;
use std::ptr::NonNull;

/// Everything a collection needs besides the collector's own space.
#[derive(Clone, Copy)]
pub struct CollectContext<'a> {
    /// Descriptor table used to trace objects.
    pub types: &'a TypeRegistry,
    /// Root slots to scan (and, for copying, rewrite).
    pub roots: &'a RootRegistry,
}

/// Outcome of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionResult {
    /// Objects whose memory was reclaimed.
    pub objects_reclaimed: usize,
    /// Bytes reclaimed, headers included.
    pub bytes_reclaimed: usize,
    /// Objects moved to a new address.
    pub objects_relocated: usize,
    /// Bytes moved.
    pub bytes_relocated: usize,
    /// Forwarding headers written.
    pub forwarding_headers: usize,
    /// Objects live after the collection.
    pub objects_live: usize,
    /// Bytes live after the collection, headers included.
    pub bytes_live: usize,
}

/// A collection strategy owning its heap space.
///
/// The allocator asks [`should_collect`](Collector::should_collect) before
/// every request, calls [`collect`](Collector::collect) when told to, and
/// then carves memory with [`try_allocate`](Collector::try_allocate).
pub trait Collector: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether a request of `requested_bytes` (header included) should be
    /// preceded by a collection.
    fn should_collect(&self, requested_bytes: usize) -> bool;

    /// Carve `size` bytes of zeroed memory, or `None` if the space cannot
    /// satisfy the request without collecting.
    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Run one full, stop-the-world collection.
    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError>;

    /// Bytes currently occupied by allocations, headers included.
    fn live_bytes(&self) -> usize;

    /// Bytes that could still be handed out without collecting.
    fn available_bytes(&self) -> usize;

    /// Whether `addr` is the payload address of an object this collector
    /// currently holds.
    fn owns(&self, addr: usize) -> bool;

    /// Number of objects currently held.
    fn object_count(&self) -> usize;

    /// Visit every object currently held, in address order.
    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef));

    /// Statistics, when the statistics wrapper is in the stack.
    fn stats(&self) -> Option<&GcStats> {
        None
    }
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn should_collect(&self, requested_bytes: usize) -> bool {
        (**self).should_collect(requested_bytes)
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        (**self).try_allocate(size)
    }

    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        (**self).collect(cx)
    }

    fn live_bytes(&self) -> usize {
        (**self).live_bytes()
    }

    fn available_bytes(&self) -> usize {
        (**self).available_bytes()
    }

    fn owns(&self, addr: usize) -> bool {
        (**self).owns(addr)
    }

    fn object_count(&self) -> usize {
        (**self).object_count()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        (**self).for_each_object(f)
    }

    fn stats(&self) -> Option<&GcStats> {
        (**self).stats()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Collector;
    use crate::object::{
        HEADER_SIZE, ObjRef, ObjectHeader, TypeDescriptor, TypeId, TypeRegistry, footprint,
    };

    /// Registry with one `Node` type: two traced words.
    pub(crate) fn node_types() -> (TypeRegistry, TypeId) {
        let mut types = TypeRegistry::new();
        let node = types
            .register(TypeDescriptor::new("Node", 16).traced(0).traced(8))
            .unwrap();
        (types, node)
    }

    /// Allocate and initialize an object directly through `collector`.
    pub(crate) fn place(collector: &mut dyn Collector, type_id: TypeId, payload: usize) -> ObjRef {
        let block = collector
            .try_allocate(footprint(payload))
            .expect("collector out of space");
        unsafe {
            std::ptr::write_bytes(block.as_ptr(), 0, footprint(payload));
            (block.as_ptr() as *mut ObjectHeader).write(ObjectHeader::new(type_id, payload));
        }
        ObjRef::from_word(block.as_ptr() as usize + HEADER_SIZE).unwrap()
    }
}
