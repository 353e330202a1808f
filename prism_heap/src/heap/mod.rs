//! Heap memory management.
//!
//! [`Heap`] is the single owning allocator: it holds the type table, the
//! root registry and the active collector stack, and is the only path
//! through which translated code reaches a collection.
//!
//! The raw spaces collectors carve from live here too:
//! - [`Arena`]: one zeroed region from the system allocator
//! - [`FreeList`]: address-ordered, coalescing free blocks (mark-sweep)
//! - [`SemiSpaces`]: the active/evacuation pair (copying)

mod arena;
mod free_list;
mod semi_space;

pub use arena::Arena;
pub use free_list::{FreeList, MIN_BLOCK_SIZE};
pub use semi_space::SemiSpaces;

use crate::collector::{CollectContext, CollectionResult, Collector};
use crate::config::GcConfig;
use crate::diagnostics::{self, ShutdownReport, VerifyReport};
use crate::error::{Corruption, HeapError, RootViolation};
use crate::object::{
    HEADER_SIZE, ObjRef, ObjectHeader, TypeDescriptor, TypeId, TypeRegistry, footprint,
};
use crate::roots::{RootHandle, RootRegistry};
use crate::stats::StatsSnapshot;

/// Largest payload a single allocation may request.
const MAX_PAYLOAD: usize = isize::MAX as usize / 2;

/// The managed heap.
///
/// Once an invariant violation has been observed the heap is poisoned:
/// every later allocation or collection fails with the same error.
pub struct Heap {
    /// Configuration parameters.
    config: GcConfig,
    /// Type descriptor table; sealed by the first allocation.
    types: TypeRegistry,
    /// Root stack and global slots.
    roots: RootRegistry,
    /// Active collector, wrapped by the configured diagnostics.
    collector: Box<dyn Collector>,
    /// First invariant violation observed, if any.
    poisoned: Option<HeapError>,
}

impl Heap {
    /// Create a new heap with the given configuration.
    pub fn new(config: GcConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let collector = diagnostics::build_collector(&config)?;
        tracing::debug!(
            collector = collector.name(),
            mode = %config.mode,
            heap_size = config.heap_size,
            "heap created"
        );

        Ok(Self {
            config,
            types: TypeRegistry::new(),
            roots: RootRegistry::new(),
            collector,
            poisoned: None,
        })
    }

    /// Create a heap with default configuration.
    pub fn with_defaults() -> Result<Self, HeapError> {
        Self::new(GcConfig::default())
    }

    /// Create a heap configured from `PRISM_GC_*` environment variables.
    pub fn from_env() -> Result<Self, HeapError> {
        Self::new(GcConfig::from_env()?)
    }

    // =========================================================================
    // Type Registration
    // =========================================================================

    /// Register a type. Must happen before the first allocation.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> Result<TypeId, HeapError> {
        self.types.register(descriptor)
    }

    /// The type descriptor table.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate an object of `type_id` with `extra_bytes` beyond its fixed
    /// size.
    ///
    /// The payload is zeroed and the header is unmarked. The returned
    /// reference must be rooted if it is held across another allocation.
    pub fn allocate(&mut self, type_id: TypeId, extra_bytes: usize) -> Result<ObjRef, HeapError> {
        self.check_poisoned()?;
        let fixed = match self.types.get(type_id) {
            Ok(descriptor) => descriptor.fixed_size(),
            Err(err) => return Err(self.poison(err)),
        };
        self.types.seal();

        let size = fixed.saturating_add(extra_bytes);
        if size > MAX_PAYLOAD {
            let err = HeapError::OutOfMemory {
                collector: self.collector.name(),
                requested: size,
                available: self.collector.available_bytes(),
            };
            return Err(self.poison(err));
        }
        let request = footprint(size);

        let mut collected = false;
        if self.collector.should_collect(request) {
            self.run_collection()?;
            collected = true;
        }

        let block = match self.collector.try_allocate(request) {
            Some(block) => block,
            None => {
                if !collected {
                    self.run_collection()?;
                }
                match self.collector.try_allocate(request) {
                    Some(block) => block,
                    None => {
                        let err = HeapError::OutOfMemory {
                            collector: self.collector.name(),
                            requested: request,
                            available: self.collector.available_bytes(),
                        };
                        return Err(self.poison(err));
                    }
                }
            }
        };

        // SAFETY: the collector handed out `request` writable bytes at
        // `block`, and `request` covers the header plus `size`.
        unsafe {
            std::ptr::write_bytes(block.as_ptr(), 0, request);
            (block.as_ptr() as *mut ObjectHeader).write(ObjectHeader::new(type_id, size));
            Ok(ObjRef::from_non_null(block.add(HEADER_SIZE)))
        }
    }

    /// Allocate an object whose variable region holds `count` elements, and
    /// store `count` in its count word.
    pub fn allocate_array(&mut self, type_id: TypeId, count: usize) -> Result<ObjRef, HeapError> {
        let (extra, count_offset) = match self.types.get(type_id) {
            Ok(descriptor) => match descriptor.variable_region() {
                Some(region) => (
                    count.saturating_mul(region.element_size),
                    region.count_offset,
                ),
                None => {
                    return Err(HeapError::InvalidDescriptor {
                        name: descriptor.name().to_string(),
                        reason: "type has no variable region".to_string(),
                    });
                }
            },
            Err(err) => return Err(self.poison(err)),
        };

        let obj = self.allocate(type_id, extra)?;
        // SAFETY: the count word lies in the fixed part just allocated.
        unsafe { obj.write_word(count_offset, count) };
        Ok(obj)
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run a full collection now.
    pub fn collect(&mut self) -> Result<CollectionResult, HeapError> {
        self.check_poisoned()?;
        self.run_collection()
    }

    fn run_collection(&mut self) -> Result<CollectionResult, HeapError> {
        let _span = tracing::debug_span!("gc", collector = self.collector.name()).entered();

        let cx = CollectContext {
            types: &self.types,
            roots: &self.roots,
        };
        let result = match self.collector.collect(cx) {
            Ok(result) => result,
            Err(err) => return Err(self.poison(err)),
        };
        tracing::debug!(
            reclaimed = result.objects_reclaimed,
            relocated = result.objects_relocated,
            live = result.objects_live,
            live_bytes = result.bytes_live,
            "collection finished"
        );

        if self.config.verify_heap {
            if let Err(err) = diagnostics::verify_heap(&self.types, &self.roots, &*self.collector) {
                return Err(self.poison(err));
            }
        }
        Ok(result)
    }

    /// Check every held object and root slot.
    pub fn verify(&self) -> Result<VerifyReport, HeapError> {
        diagnostics::verify_heap(&self.types, &self.roots, &*self.collector)
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Push a root frame.
    pub fn push_root(&mut self) -> RootHandle {
        self.roots.push_root()
    }

    /// Pop the frame named by `handle`; it must be the most recent one.
    pub fn pop_root(&mut self, handle: RootHandle) -> Result<(), HeapError> {
        self.roots
            .pop_root(handle)
            .map_err(|violation| self.poison(violation.into()))
    }

    /// Register `slot` in the frame named by `handle`.
    ///
    /// # Safety
    ///
    /// `slot` must stay valid and hold either zero or a reference returned
    /// by this heap until the frame is popped. The copying collector
    /// rewrites it in place.
    pub unsafe fn add_root(&mut self, handle: RootHandle, slot: *mut usize) -> Result<(), HeapError> {
        // SAFETY: forwarded to the caller.
        unsafe { self.roots.add_root(handle, slot) }
            .map_err(|violation| self.poison(violation.into()))
    }

    /// Register a process-wide slot that is scanned by every collection.
    ///
    /// # Safety
    ///
    /// `slot` must stay valid for the lifetime of the heap and always hold
    /// either zero or a reference returned by this heap.
    pub unsafe fn register_global(&mut self, slot: *mut usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.roots.register_global(slot) }
    }

    /// Run `f` inside a fresh root frame.
    ///
    /// The frame is popped when `f` returns, whether or not it failed.
    pub fn scoped<R>(
        &mut self,
        f: impl FnOnce(&mut Heap, RootHandle) -> Result<R, HeapError>,
    ) -> Result<R, HeapError> {
        let frame = self.push_root();
        let result = f(self, frame);
        let popped = self.pop_root(frame);
        let value = result?;
        popped?;
        Ok(value)
    }

    /// The root registry.
    pub fn roots(&self) -> &RootRegistry {
        &self.roots
    }

    // =========================================================================
    // Object Queries
    // =========================================================================

    /// Registered type of `obj`.
    pub fn type_of(&self, obj: ObjRef) -> Result<TypeId, HeapError> {
        Ok(self.checked_header(obj)?.type_id())
    }

    /// Payload size of `obj` in bytes.
    pub fn payload_size(&self, obj: ObjRef) -> Result<usize, HeapError> {
        Ok(self.checked_header(obj)?.size())
    }

    /// Descriptor of `obj`'s type.
    pub fn descriptor(&self, obj: ObjRef) -> Result<&TypeDescriptor, HeapError> {
        let type_id = self.type_of(obj)?;
        self.types.get(type_id)
    }

    /// Whether `obj` is an object this heap currently holds.
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.collector.owns(obj.addr())
    }

    fn checked_header(&self, obj: ObjRef) -> Result<&ObjectHeader, HeapError> {
        if !self.collector.owns(obj.addr()) {
            return Err(HeapError::corrupted(obj.addr(), Corruption::DanglingReference));
        }
        // SAFETY: `obj` is a payload the collector holds.
        let header: &ObjectHeader = unsafe { ObjectHeader::from_payload(obj.addr()) };
        header.validate(obj.addr())?;
        Ok(header)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Name of the active collector.
    pub fn collector_name(&self) -> &'static str {
        self.collector.name()
    }

    /// Statistics, when the configured mode records them.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.collector.stats().map(|stats| stats.snapshot())
    }

    /// Bytes occupied by allocations, headers included.
    pub fn live_bytes(&self) -> usize {
        self.collector.live_bytes()
    }

    /// Bytes that can be handed out without collecting.
    pub fn available_bytes(&self) -> usize {
        self.collector.available_bytes()
    }

    /// Objects currently held, reachable or not.
    pub fn object_count(&self) -> usize {
        self.collector.object_count()
    }

    /// The first invariant violation observed, if any.
    pub fn poisoned(&self) -> Option<&HeapError> {
        self.poisoned.as_ref()
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Run the final collection and the leak check.
    ///
    /// The root stack must be empty. Objects still reachable from global
    /// roots are a [`HeapError::LeakDetected`] unless the heap is
    /// leak-tolerant.
    pub fn shutdown(mut self) -> Result<ShutdownReport, HeapError> {
        self.check_poisoned()?;
        let depth = self.roots.depth();
        if depth != 0 {
            return Err(RootViolation::Unbalanced { depth }.into());
        }

        let result = self.run_collection()?;
        let surviving = diagnostics::census(&self.types, &self.roots)?;
        let report = ShutdownReport {
            collector: self.collector.name(),
            surviving,
            reclaimed_at_shutdown: result.objects_reclaimed,
            stats: self.stats(),
        };

        if !report.is_clean() {
            if self.config.leak_tolerant {
                tracing::debug!(
                    objects = surviving.objects,
                    bytes = surviving.bytes,
                    "objects reachable from globals at shutdown"
                );
            } else {
                tracing::warn!(
                    objects = surviving.objects,
                    bytes = surviving.bytes,
                    "leak detected at shutdown"
                );
                return Err(HeapError::LeakDetected {
                    objects: surviving.objects,
                    bytes: surviving.bytes,
                });
            }
        }

        tracing::debug!(collector = report.collector, "heap shut down");
        Ok(report)
    }

    // =========================================================================
    // Poisoning
    // =========================================================================

    fn check_poisoned(&self) -> Result<(), HeapError> {
        match &self.poisoned {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: HeapError) -> HeapError {
        if self.poisoned.is_none() {
            tracing::error!(kind = err.kind(), %err, "heap invariant violated");
            self.poisoned = Some(err.clone());
        }
        err
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("collector", &self.collector.name())
            .field("mode", &self.config.mode)
            .field("objects", &self.collector.object_count())
            .field("live_bytes", &self.collector.live_bytes())
            .field("root_depth", &self.roots.depth())
            .field("poisoned", &self.poisoned.is_some())
            .finish()
    }
}

/// Align a size up to the given alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}
