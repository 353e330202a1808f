//! Shutdown leak accounting.
//!
//! At shutdown the root stack must be empty, so whatever is still reachable
//! hangs off a global slot. The census counts it by tracing from the roots,
//! independently of the collector, so the leaky collector's garbage is not
//! mistaken for a leak.

use crate::error::HeapError;
use crate::object::{ObjRef, ObjectHeader, TypeRegistry};
use crate::roots::RootRegistry;
use crate::stats::StatsSnapshot;
use crate::trace::trace_object;
use rustc_hash::FxHashSet;

/// Objects reachable from the roots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    /// Distinct reachable objects.
    pub objects: usize,
    /// Bytes they occupy, headers included.
    pub bytes: usize,
}

/// Count every object reachable from `roots`.
pub fn census(types: &TypeRegistry, roots: &RootRegistry) -> Result<Census, HeapError> {
    let mut seen = FxHashSet::default();
    let mut worklist = Vec::new();
    roots.try_for_each_slot(|slot| {
        // SAFETY: registered slots stay valid while registered.
        worklist.push(unsafe { *slot });
        Ok::<(), HeapError>(())
    })?;

    let mut result = Census::default();
    while let Some(word) = worklist.pop() {
        let Some(obj) = ObjRef::from_word(word) else {
            continue;
        };
        if !seen.insert(word) {
            continue;
        }

        // SAFETY: reachable references point at heap payloads.
        let header = unsafe { ObjectHeader::from_payload(word) };
        header.validate(word)?;
        result.objects += 1;
        result.bytes += header.footprint();

        // SAFETY: as above.
        unsafe {
            trace_object(types, obj, &mut |slot: *mut usize| worklist.push(*slot))?;
        }
    }

    Ok(result)
}

/// What [`Heap::shutdown`](crate::Heap::shutdown) found.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Collector that ran the final collection.
    pub collector: &'static str,
    /// Objects reachable from global roots after the final collection.
    pub surviving: Census,
    /// Objects the final collection reclaimed.
    pub reclaimed_at_shutdown: usize,
    /// Final statistics, when recorded.
    pub stats: Option<StatsSnapshot>,
}

impl ShutdownReport {
    /// Whether nothing survived.
    pub fn is_clean(&self) -> bool {
        self.surviving.objects == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LeakyCollector;
    use crate::collector::test_support::{node_types, place};
    use crate::object::footprint;

    #[test]
    fn test_census_counts_shared_objects_once() {
        let (types, node) = node_types();
        let mut roots = RootRegistry::new();
        let mut collector = LeakyCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        let b = place(&mut collector, node, 16);
        let _garbage = place(&mut collector, node, 16);
        unsafe {
            a.write_ref(0, Some(b));
            a.write_ref(8, Some(b));
            b.write_ref(0, Some(a));
        }

        let mut global = a.to_word();
        unsafe { roots.register_global(&mut global) };

        assert_eq!(
            census(&types, &roots).unwrap(),
            Census {
                objects: 2,
                bytes: 2 * footprint(16),
            }
        );
    }

    #[test]
    fn test_empty_roots_are_clean() {
        let (types, _) = node_types();
        let roots = RootRegistry::new();
        let surviving = census(&types, &roots).unwrap();
        let report = ShutdownReport {
            collector: "leaky",
            surviving,
            reclaimed_at_shutdown: 0,
            stats: None,
        };
        assert!(report.is_clean());
    }
}
