//! Per-allocation object header.
//!
//! Every allocation is laid out as a header followed by the payload:
//!
//! ```text
//! ┌──────────────────────────── ObjectHeader ───────────────────────────┐
//! │ type_id: u32 │ magic: u8 │ state: u8 │ pad: u16 │ size │ forward    │ payload ...
//! └─────────────────────────────────────────────────────────────────────┘
//!                                                                        ▲
//!                                                          ObjRef points here
//! ```
//!
//! Translated code only ever sees the payload address. The header is
//! recovered by stepping back `HEADER_SIZE` bytes.

use super::TypeId;
use crate::error::{Corruption, HeapError};

/// Tag written into every header at allocation.
pub const HEADER_MAGIC: u8 = 0xA7;

/// Size of [`ObjectHeader`] in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();

/// Allocation granularity.
pub const OBJECT_ALIGN: usize = 8;

/// Collection state of an object.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Not (yet) proven reachable in the current cycle.
    Unmarked = 0,
    /// Reached by the mark-sweep tracer.
    Marked = 1,
    /// Evacuated by the copying collector; `forward` holds the new address.
    Forwarded = 2,
}

impl ObjectState {
    #[inline]
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ObjectState::Unmarked),
            1 => Some(ObjectState::Marked),
            2 => Some(ObjectState::Forwarded),
            _ => None,
        }
    }
}

/// Metadata prefixed to every heap allocation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    type_id: u32,
    magic: u8,
    state: u8,
    _reserved: u16,
    /// Payload size in bytes (header excluded).
    size: usize,
    /// Payload address of the copy; only meaningful when forwarded.
    forward: usize,
}

impl ObjectHeader {
    /// A fresh, unmarked header.
    pub fn new(type_id: TypeId, size: usize) -> Self {
        Self {
            type_id: type_id.as_u32(),
            magic: HEADER_MAGIC,
            state: ObjectState::Unmarked as u8,
            _reserved: 0,
            size,
            forward: 0,
        }
    }

    /// Header of the object whose payload starts at `payload`.
    ///
    /// # Safety
    ///
    /// `payload` must be a payload address handed out by the heap, so that
    /// `HEADER_SIZE` bytes before it are readable and writable.
    #[inline]
    pub unsafe fn from_payload<'a>(payload: usize) -> &'a mut ObjectHeader {
        unsafe { &mut *((payload - HEADER_SIZE) as *mut ObjectHeader) }
    }

    /// Header stored at `address` (the start of an allocation block).
    ///
    /// # Safety
    ///
    /// `address` must be the start of an allocation block owned by the heap.
    #[inline]
    pub unsafe fn at<'a>(address: usize) -> &'a mut ObjectHeader {
        unsafe { &mut *(address as *mut ObjectHeader) }
    }

    /// Structural sanity check. `address` is only used for diagnostics.
    pub fn validate(&self, address: usize) -> Result<ObjectState, HeapError> {
        if self.magic != HEADER_MAGIC {
            return Err(HeapError::corrupted(
                address,
                Corruption::BadMagic { found: self.magic },
            ));
        }
        ObjectState::from_u8(self.state).ok_or(HeapError::corrupted(
            address,
            Corruption::BadState { found: self.state },
        ))
    }

    /// Registered type of the object.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        TypeId::from_u32(self.type_id)
    }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes the whole allocation occupies.
    #[inline]
    pub fn footprint(&self) -> usize {
        footprint(self.size)
    }

    /// Raw state byte interpreted without validation.
    #[inline]
    pub fn state(&self) -> Option<ObjectState> {
        ObjectState::from_u8(self.state)
    }

    /// Overwrite the collection state.
    #[inline]
    pub fn set_state(&mut self, state: ObjectState) {
        self.state = state as u8;
    }

    /// Turn this header into a forwarding header pointing at `target`.
    #[inline]
    pub fn forward_to(&mut self, target: usize) {
        self.state = ObjectState::Forwarded as u8;
        self.forward = target;
    }

    /// Forwarding target, if this header has been forwarded.
    #[inline]
    pub fn forwarding_address(&self) -> Option<usize> {
        (self.state == ObjectState::Forwarded as u8).then_some(self.forward)
    }
}

/// Bytes occupied by an allocation whose payload is `size` bytes.
#[inline]
pub const fn footprint(size: usize) -> usize {
    crate::heap::align_up(HEADER_SIZE + size, OBJECT_ALIGN)
}
