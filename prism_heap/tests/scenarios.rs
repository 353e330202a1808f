//! End-to-end scenarios through the public heap interface.
//!
//! Coverage:
//! - Mark-sweep retention and block reuse
//! - Copying relocation and root rewriting
//! - Stress mode over a long mixed workload
//! - Root stack misuse

use prism_heap::{
    Builtins, CollectorKind, DiagnosticMode, GcConfig, Heap, HeapError, ObjRef, RootViolation,
    TypeDescriptor, TypeId,
};

fn heap(collector: CollectorKind, mode: DiagnosticMode) -> Heap {
    Heap::new(GcConfig {
        collector,
        mode,
        heap_size: 256 * 1024,
        verify_heap: true,
        ..Default::default()
    })
    .unwrap()
}

/// Two traced fields followed by a scalar tag.
fn register_t(heap: &mut Heap) -> TypeId {
    heap.register_type(TypeDescriptor::new("T", 24).traced(0).traced(8).scalar(16))
        .unwrap()
}

// =============================================================================
// Mark-Sweep
// =============================================================================

#[test]
fn test_rooted_pair_survives_mark_sweep() {
    let mut heap = heap(CollectorKind::MarkSweep, DiagnosticMode::Normal);
    let t = register_t(&mut heap);

    let frame = heap.push_root();
    let mut a = heap.allocate(t, 0).unwrap().to_word();
    unsafe { heap.add_root(frame, &mut a).unwrap() };
    let b = heap.allocate(t, 0).unwrap();
    let a_ref = ObjRef::from_word(a).unwrap();
    unsafe { a_ref.write_ref(0, Some(b)) };

    let result = heap.collect().unwrap();
    assert_eq!(result.objects_reclaimed, 0);
    assert_eq!(result.objects_live, 2);
    assert!(heap.contains(a_ref));
    assert!(heap.contains(b));
    assert_eq!(unsafe { a_ref.read_ref(0) }, Some(b));

    heap.pop_root(frame).unwrap();
}

#[test]
fn test_unrooted_block_is_reused() {
    let mut heap = heap(CollectorKind::MarkSweep, DiagnosticMode::Normal);
    let t = register_t(&mut heap);

    let c = heap.allocate(t, 0).unwrap();
    let result = heap.collect().unwrap();
    assert_eq!(result.objects_reclaimed, 1);
    assert!(!heap.contains(c));
    assert_eq!(heap.object_count(), 0);

    let reused = heap.allocate(t, 0).unwrap();
    assert_eq!(reused, c);
}

// =============================================================================
// Copying
// =============================================================================

#[test]
fn test_copying_rewrites_roots_and_fields() {
    let mut heap = heap(CollectorKind::Copying, DiagnosticMode::Normal);
    let t = register_t(&mut heap);

    let frame = heap.push_root();
    let mut d = heap.allocate(t, 0).unwrap().to_word();
    unsafe {
        heap.add_root(frame, &mut d).unwrap();
        ObjRef::from_word(d).unwrap().write_word(16, 0xD);
    }
    let mut e = heap.allocate(t, 0).unwrap().to_word();
    unsafe {
        heap.add_root(frame, &mut e).unwrap();
        ObjRef::from_word(e)
            .unwrap()
            .write_ref(0, ObjRef::from_word(d));
    }

    let d_before = d;
    let e_before = e;
    let result = heap.collect().unwrap();
    assert_eq!(result.objects_relocated, 2);
    assert_ne!(d, d_before);
    assert_ne!(e, e_before);

    let e_ref = ObjRef::from_word(e).unwrap();
    let via_field = unsafe { e_ref.read_ref(0) }.unwrap();
    assert_eq!(via_field.to_word(), d);
    assert_eq!(unsafe { via_field.read_word(16) }, 0xD);

    heap.pop_root(frame).unwrap();
}

// =============================================================================
// Stress
// =============================================================================

#[test]
fn test_stress_mixed_workload() {
    for collector in [CollectorKind::MarkSweep, CollectorKind::Copying] {
        let mut heap = heap(collector, DiagnosticMode::Stress);
        let t = register_t(&mut heap);
        let builtins = Builtins::register(&mut heap).unwrap();

        let outer = heap.push_root();
        let mut list = 0usize;
        let mut value = 0usize;
        unsafe {
            heap.add_root(outer, &mut list).unwrap();
            heap.add_root(outer, &mut value).unwrap();
        }
        list = builtins.alloc_list(&mut heap, 2).unwrap().to_word();

        let mut allocations = 1;
        let mut pushed = 0;
        while allocations < 1000 {
            match allocations % 4 {
                0 => {
                    value = builtins
                        .alloc_str(&mut heap, &format!("s{allocations}"))
                        .unwrap()
                        .to_word();
                    allocations += 1;
                }
                1 => {
                    // Temporary frame holding a node while a second is built.
                    let inner = heap.push_root();
                    let mut tmp = heap.allocate(t, 0).unwrap().to_word();
                    unsafe { heap.add_root(inner, &mut tmp).unwrap() };
                    let other = heap.allocate(t, 0).unwrap();
                    unsafe {
                        other.write_ref(0, ObjRef::from_word(tmp));
                        other.write_word(16, allocations as usize);
                    }
                    value = other.to_word();
                    heap.pop_root(inner).unwrap();
                    allocations += 2;
                }
                _ => {
                    heap.allocate(t, 0).unwrap();
                    allocations += 1;
                    continue;
                }
            }
            unsafe { builtins.list_push(&mut heap, &mut list, &mut value).unwrap() };
            pushed += 1;
        }

        let list_ref = ObjRef::from_word(list).unwrap();
        assert_eq!(unsafe { builtins.list_len(list_ref) }, pushed);
        let stats = heap.stats().unwrap();
        assert!(stats.collections > 0);
        assert!(stats.allocations >= 1000);
        heap.verify().unwrap();

        heap.pop_root(outer).unwrap();
        assert!(heap.shutdown().unwrap().is_clean());
    }
}

// =============================================================================
// Root Discipline
// =============================================================================

#[test]
fn test_pop_of_older_frame_is_violation() {
    let mut heap = heap(CollectorKind::MarkSweep, DiagnosticMode::Normal);
    let first = heap.push_root();
    let second = heap.push_root();

    let err = heap.pop_root(first).unwrap_err();
    assert_eq!(
        err,
        HeapError::RootDisciplineViolation(RootViolation::OutOfOrderPop {
            expected: second.seq(),
            found: first.seq(),
        })
    );
    assert_eq!(err.kind(), "RootDisciplineViolation");
    assert_eq!(heap.collect().unwrap_err(), err);
}
