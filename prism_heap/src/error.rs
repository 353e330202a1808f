//! Heap error taxonomy.
//!
//! Every variant is an invariant violation: the heap cannot be trusted once
//! one has been observed. Library calls surface them as `Result`s so that
//! harnesses can assert on the exact kind; translated-code call sites route
//! them through [`crate::fatal`] which aborts the process.

use crate::config::ConfigError;
use crate::object::TypeId;
use thiserror::Error;

/// Structural defects detected in an object header or heap reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// The header magic tag is not the value written at allocation.
    BadMagic {
        /// Tag byte found in the header.
        found: u8,
    },
    /// The header state byte is not a known state, or is illegal for the
    /// phase that observed it.
    BadState {
        /// State byte found in the header.
        found: u8,
    },
    /// A reference points at an address that is not a live allocation.
    DanglingReference,
    /// A forwarding header points outside the active to-space.
    DanglingForward {
        /// Recorded forward target.
        target: usize,
    },
    /// A second forwarding header was about to be written for one object.
    DoubleForward,
    /// The variable-length element count exceeds the allocated payload.
    RegionOverflow {
        /// Element count read from the object.
        count: usize,
        /// Elements that fit in the payload.
        capacity: usize,
    },
}

impl std::fmt::Display for Corruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Corruption::BadMagic { found } => write!(f, "bad header magic {found:#04x}"),
            Corruption::BadState { found } => write!(f, "bad header state {found}"),
            Corruption::DanglingReference => write!(f, "reference to a non-live address"),
            Corruption::DanglingForward { target } => {
                write!(f, "forwarding target {target:#x} outside to-space")
            }
            Corruption::DoubleForward => write!(f, "object forwarded twice in one cycle"),
            Corruption::RegionOverflow { count, capacity } => write!(
                f,
                "variable region holds {count} elements but payload fits {capacity}"
            ),
        }
    }
}

/// Ways the root stack discipline can be broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootViolation {
    /// `pop_root` was handed something other than the top frame.
    OutOfOrderPop {
        /// Sequence number of the frame on top of the stack.
        expected: u64,
        /// Sequence number carried by the handle.
        found: u64,
    },
    /// `pop_root` on an empty stack.
    EmptyStack {
        /// Sequence number carried by the handle.
        found: u64,
    },
    /// A handle was used after its frame had been popped.
    StaleHandle {
        /// Sequence number carried by the handle.
        found: u64,
    },
    /// Frames were still pushed when the heap shut down.
    Unbalanced {
        /// Number of frames left on the stack.
        depth: usize,
    },
}

impl std::fmt::Display for RootViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootViolation::OutOfOrderPop { expected, found } => write!(
                f,
                "pop of frame #{found} while frame #{expected} is on top"
            ),
            RootViolation::EmptyStack { found } => {
                write!(f, "pop of frame #{found} on an empty root stack")
            }
            RootViolation::StaleHandle { found } => {
                write!(f, "frame #{found} used after it was popped")
            }
            RootViolation::Unbalanced { depth } => {
                write!(f, "{depth} root frame(s) still pushed")
            }
        }
    }
}

/// Fatal heap errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeapError {
    /// An allocation could not be satisfied even after a collection.
    #[error(
        "out of memory in {collector} heap: requested {requested} bytes, {available} available"
    )]
    OutOfMemory {
        /// Collector that owned the exhausted space.
        collector: &'static str,
        /// Bytes requested, including the header.
        requested: usize,
        /// Bytes that were available after collecting.
        available: usize,
    },

    /// A header or reference failed a structural sanity check.
    #[error("corrupted header at {address:#x}: {corruption}")]
    CorruptedHeader {
        /// Payload address of the offending object.
        address: usize,
        /// What was wrong with it.
        corruption: Corruption,
    },

    /// The root stack was used out of LIFO order.
    #[error("root discipline violation: {0}")]
    RootDisciplineViolation(RootViolation),

    /// A type id was used that the descriptor table never issued.
    #[error("type {0} was never registered")]
    UnregisteredType(TypeId),

    /// `register_type` was called after the first allocation.
    #[error("cannot register type `{name}`: allocation has already begun")]
    RegistrationClosed {
        /// Name of the rejected descriptor.
        name: String,
    },

    /// A descriptor failed validation at registration.
    #[error("invalid descriptor for `{name}`: {reason}")]
    InvalidDescriptor {
        /// Name of the rejected descriptor.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Objects survived the shutdown collection and leak tolerance is off.
    #[error("{objects} object(s) ({bytes} bytes) still reachable at shutdown")]
    LeakDetected {
        /// Surviving objects.
        objects: usize,
        /// Bytes they occupy, headers included.
        bytes: usize,
    },

    /// The process configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HeapError {
    /// Short, stable name of the violated invariant.
    pub fn kind(&self) -> &'static str {
        match self {
            HeapError::OutOfMemory { .. } => "OutOfMemory",
            HeapError::CorruptedHeader { .. } => "CorruptedHeader",
            HeapError::RootDisciplineViolation(_) => "RootDisciplineViolation",
            HeapError::UnregisteredType(_) => "UnregisteredType",
            HeapError::RegistrationClosed { .. } => "RegistrationClosed",
            HeapError::InvalidDescriptor { .. } => "InvalidDescriptor",
            HeapError::LeakDetected { .. } => "LeakDetected",
            HeapError::Config(_) => "Config",
        }
    }

    pub(crate) fn corrupted(address: usize, corruption: Corruption) -> Self {
        HeapError::CorruptedHeader {
            address,
            corruption,
        }
    }
}

impl From<RootViolation> for HeapError {
    fn from(violation: RootViolation) -> Self {
        HeapError::RootDisciplineViolation(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = HeapError::corrupted(0x1000, Corruption::BadMagic { found: 0 });
        assert_eq!(
            err.to_string(),
            "corrupted header at 0x1000: bad header magic 0x00"
        );

        let err: HeapError = RootViolation::OutOfOrderPop {
            expected: 3,
            found: 1,
        }
        .into();
        assert_eq!(err.kind(), "RootDisciplineViolation");
        assert!(err.to_string().contains("frame #1"));
    }

    #[test]
    fn test_oom_message() {
        let err = HeapError::OutOfMemory {
            collector: "mark-sweep",
            requested: 64,
            available: 8,
        };
        assert_eq!(
            err.to_string(),
            "out of memory in mark-sweep heap: requested 64 bytes, 8 available"
        );
    }
}
