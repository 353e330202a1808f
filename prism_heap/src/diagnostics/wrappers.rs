//! Collector wrappers that change policy or observe activity without
//! touching the wrapped algorithm.

use crate::collector::{CollectContext, CollectionResult, Collector};
use crate::error::HeapError;
use crate::object::ObjRef;
use crate::stats::{GcStats, GcTimer};
use std::ptr::NonNull;

/// Forces a collection before every allocation.
pub struct Stressed<C> {
    inner: C,
}

impl<C: Collector> Stressed<C> {
    /// Wrap `inner`.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// The wrapped collector.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Collector> Collector for Stressed<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[inline]
    fn should_collect(&self, _requested_bytes: usize) -> bool {
        true
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.inner.try_allocate(size)
    }

    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        self.inner.collect(cx)
    }

    fn live_bytes(&self) -> usize {
        self.inner.live_bytes()
    }

    fn available_bytes(&self) -> usize {
        self.inner.available_bytes()
    }

    fn owns(&self, addr: usize) -> bool {
        self.inner.owns(addr)
    }

    fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        self.inner.for_each_object(f)
    }

    fn stats(&self) -> Option<&GcStats> {
        self.inner.stats()
    }
}

/// Records allocation and collection statistics.
pub struct Instrumented<C> {
    inner: C,
    stats: GcStats,
}

impl<C: Collector> Instrumented<C> {
    /// Wrap `inner` with fresh counters.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            stats: GcStats::new(),
        }
    }

    /// The wrapped collector.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Collector> Collector for Instrumented<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn should_collect(&self, requested_bytes: usize) -> bool {
        self.inner.should_collect(requested_bytes)
    }

    fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let block = self.inner.try_allocate(size)?;
        self.stats.record_allocation(size);
        Some(block)
    }

    fn collect(&mut self, cx: CollectContext<'_>) -> Result<CollectionResult, HeapError> {
        let timer = GcTimer::start(self.inner.name());
        let result = self.inner.collect(cx)?;
        self.stats.record_collection(&result, timer.stop());
        Ok(result)
    }

    fn live_bytes(&self) -> usize {
        self.inner.live_bytes()
    }

    fn available_bytes(&self) -> usize {
        self.inner.available_bytes()
    }

    fn owns(&self, addr: usize) -> bool {
        self.inner.owns(addr)
    }

    fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    fn for_each_object(&self, f: &mut dyn FnMut(ObjRef)) {
        self.inner.for_each_object(f)
    }

    fn stats(&self) -> Option<&GcStats> {
        Some(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MarkSweepCollector;
    use crate::collector::test_support::{node_types, place};
    use crate::object::footprint;
    use crate::roots::RootRegistry;

    #[test]
    fn test_stressed_always_collects() {
        let stressed = Stressed::new(MarkSweepCollector::new(4096).unwrap());
        assert!(stressed.should_collect(0));
        assert!(!stressed.inner().should_collect(0));
        assert!(stressed.stats().is_none());
    }

    #[test]
    fn test_instrumented_counts_without_changing_decisions() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut plain = MarkSweepCollector::new(4096).unwrap();
        let mut counted = Instrumented::new(MarkSweepCollector::new(4096).unwrap());

        for _ in 0..3 {
            place(&mut plain, node, 16);
            place(&mut counted, node, 16);
        }
        assert_eq!(
            plain.should_collect(footprint(16)),
            counted.should_collect(footprint(16))
        );

        let cx = CollectContext { types: &types, roots: &roots };
        assert_eq!(plain.collect(cx).unwrap(), counted.collect(cx).unwrap());

        let snap = counted.stats().unwrap().snapshot();
        assert_eq!(snap.allocations, 3);
        assert_eq!(snap.bytes_allocated, 3 * footprint(16) as u64);
        assert_eq!(snap.collections, 1);
        assert_eq!(snap.objects_reclaimed, 3);
        assert_eq!(snap.live_objects, 0);
        assert_eq!(snap.live_high_water, 3);
    }

    #[test]
    fn test_stress_over_statistics_reports_stats() {
        let stack = Stressed::new(Instrumented::new(MarkSweepCollector::new(4096).unwrap()));
        assert!(stack.should_collect(0));
        assert_eq!(stack.stats().unwrap().snapshot().collections, 0);
    }
}
