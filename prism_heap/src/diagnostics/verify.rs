//! Heap verification.
//!
//! Walks every object the collector holds and checks that its header is
//! sane, that it is not left marked or forwarded, and that every reference
//! it (or any root slot) holds points at another held object.

use crate::collector::Collector;
use crate::error::{Corruption, HeapError};
use crate::object::{ObjRef, ObjectHeader, ObjectState, TypeRegistry};
use crate::roots::RootRegistry;
use crate::trace::{CollectingVisitor, trace_object};
use rustc_hash::FxHashSet;

/// Summary of a successful verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Objects checked.
    pub objects: usize,
    /// Bytes they occupy, headers included.
    pub bytes: usize,
    /// Non-null references followed, root slots included.
    pub references: usize,
}

/// Verify the whole heap.
pub fn verify_heap(
    types: &TypeRegistry,
    roots: &RootRegistry,
    collector: &dyn Collector,
) -> Result<VerifyReport, HeapError> {
    let mut held = FxHashSet::default();
    collector.for_each_object(&mut |obj| {
        held.insert(obj.addr());
    });

    let mut report = VerifyReport::default();
    let mut failure = None;
    collector.for_each_object(&mut |obj| {
        if failure.is_none() {
            failure = verify_object(types, &held, obj, &mut report).err();
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }

    roots.try_for_each_slot(|slot| {
        // SAFETY: registered slots stay valid while registered.
        let word = unsafe { *slot };
        check_reference(&held, word, &mut report)
    })?;

    Ok(report)
}

fn verify_object(
    types: &TypeRegistry,
    held: &FxHashSet<usize>,
    obj: ObjRef,
    report: &mut VerifyReport,
) -> Result<(), HeapError> {
    // SAFETY: `obj` was handed out by the collector's own walk.
    let header = unsafe { ObjectHeader::from_payload(obj.addr()) };
    let state = header.validate(obj.addr())?;
    if state != ObjectState::Unmarked {
        return Err(HeapError::corrupted(
            obj.addr(),
            Corruption::BadState { found: state as u8 },
        ));
    }
    report.objects += 1;
    report.bytes += header.footprint();

    let mut slots = CollectingVisitor::new();
    // SAFETY: as above.
    unsafe { trace_object(types, obj, &mut slots)? };
    for word in slots.words() {
        check_reference(held, word, report)?;
    }
    Ok(())
}

fn check_reference(
    held: &FxHashSet<usize>,
    word: usize,
    report: &mut VerifyReport,
) -> Result<(), HeapError> {
    if word == 0 {
        return Ok(());
    }
    if !held.contains(&word) {
        return Err(HeapError::corrupted(word, Corruption::DanglingReference));
    }
    report.references += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MarkSweepCollector;
    use crate::collector::test_support::{node_types, place};
    use crate::object::footprint;

    #[test]
    fn test_consistent_heap_passes() {
        let (types, node) = node_types();
        let mut roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        let b = place(&mut collector, node, 16);
        unsafe { a.write_ref(0, Some(b)) };
        let mut slot = a.to_word();
        let frame = roots.push_root();
        unsafe { roots.add_root(frame, &mut slot).unwrap() };

        let report = verify_heap(&types, &roots, &collector).unwrap();
        assert_eq!(
            report,
            VerifyReport {
                objects: 2,
                bytes: 2 * footprint(16),
                references: 2,
            }
        );
    }

    #[test]
    fn test_dangling_field_is_reported() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        unsafe { a.write_word(8, 0xdead_0000) };

        assert_eq!(
            verify_heap(&types, &roots, &collector),
            Err(HeapError::corrupted(0xdead_0000, Corruption::DanglingReference))
        );
    }

    #[test]
    fn test_leftover_mark_is_reported() {
        let (types, node) = node_types();
        let roots = RootRegistry::new();
        let mut collector = MarkSweepCollector::new(4096).unwrap();

        let a = place(&mut collector, node, 16);
        unsafe { ObjectHeader::from_payload(a.addr()).set_state(ObjectState::Marked) };

        assert!(matches!(
            verify_heap(&types, &roots, &collector),
            Err(HeapError::CorruptedHeader {
                corruption: Corruption::BadState { .. },
                ..
            })
        ));
    }
}
