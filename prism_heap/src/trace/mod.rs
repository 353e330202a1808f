//! Object tracing for garbage collection.
//!
//! [`trace_object`] is the single source of truth for the object graph:
//! both collectors, heap verification and the diagnostics layer discover
//! outgoing references only through it, driven by the registered
//! [`TypeDescriptor`](crate::object::TypeDescriptor). A type whose real
//! layout drifts from its descriptor is a latent memory-corruption bug.

mod visitor;

pub use visitor::{CollectingVisitor, CountingVisitor, SlotVisitor};

use crate::error::{Corruption, HeapError};
use crate::object::{FieldKind, ObjRef, ObjectHeader, ObjectState, TypeRegistry, WORD_SIZE};

/// Visit every traced-reference slot of `obj`.
///
/// Fixed traced fields are visited in declaration order, followed by the
/// elements of a traced variable region in index order. Scalar fields and
/// scalar regions are skipped. Tracing the same unmodified object twice
/// yields the same slot sequence.
///
/// # Errors
///
/// - `CorruptedHeader` if the header fails its sanity check, if the object
///   has already been forwarded, or if the variable region claims more
///   elements than the payload holds.
/// - `UnregisteredType` if the header names an unknown type.
///
/// # Safety
///
/// `obj` must be the payload address of an allocation owned by the heap.
pub unsafe fn trace_object(
    types: &TypeRegistry,
    obj: ObjRef,
    visitor: &mut dyn SlotVisitor,
) -> Result<(), HeapError> {
    // SAFETY: caller guarantees `obj` is a heap payload.
    let header = unsafe { ObjectHeader::from_payload(obj.addr()) };
    let state = header.validate(obj.addr())?;
    if state == ObjectState::Forwarded {
        return Err(HeapError::corrupted(
            obj.addr(),
            Corruption::BadState { found: state as u8 },
        ));
    }

    let descriptor = types.get(header.type_id())?;

    for offset in descriptor.traced_offsets() {
        visitor.visit_slot(obj.slot_ptr(offset));
    }

    let Some(region) = descriptor.variable_region() else {
        return Ok(());
    };

    // SAFETY: the count word lies within the fixed part (checked at
    // registration) and the fixed part is always allocated.
    let count = unsafe { obj.read_word(region.count_offset) };
    let capacity = header.size().saturating_sub(descriptor.fixed_size()) / region.element_size;
    if count > capacity {
        return Err(HeapError::corrupted(
            obj.addr(),
            Corruption::RegionOverflow { count, capacity },
        ));
    }

    if region.element_kind == FieldKind::TracedReference {
        let start = descriptor.fixed_size();
        for index in 0..count {
            visitor.visit_slot(obj.slot_ptr(start + index * WORD_SIZE));
        }
    }

    Ok(())
}
