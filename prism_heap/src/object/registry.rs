//! The process-wide type descriptor table.
//!
//! Populated during startup, sealed by the first allocation, read-only
//! afterwards.

use super::{TypeDescriptor, TypeId};
use crate::error::HeapError;
use rustc_hash::FxHashMap;

/// Table of registered descriptors, indexed by [`TypeId`].
#[derive(Debug, Default)]
pub struct TypeRegistry {
    descriptors: Vec<TypeDescriptor>,
    by_name: FxHashMap<String, TypeId>,
    sealed: bool,
}

impl TypeRegistry {
    /// Create an empty, open table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record `descriptor`, returning its id.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<TypeId, HeapError> {
        if self.sealed {
            return Err(HeapError::RegistrationClosed {
                name: descriptor.name().to_string(),
            });
        }
        if let Err(reason) = descriptor.validate() {
            return Err(HeapError::InvalidDescriptor {
                name: descriptor.name().to_string(),
                reason,
            });
        }
        if self.by_name.contains_key(descriptor.name()) {
            return Err(HeapError::InvalidDescriptor {
                name: descriptor.name().to_string(),
                reason: "a type with this name is already registered".to_string(),
            });
        }

        let id = TypeId::from_u32(self.descriptors.len() as u32 + 1);
        tracing::trace!(name = descriptor.name(), %id, "registered type");
        self.by_name.insert(descriptor.name().to_string(), id);
        self.descriptors.push(descriptor);
        Ok(id)
    }

    /// Descriptor for `id`.
    #[inline]
    pub fn get(&self, id: TypeId) -> Result<&TypeDescriptor, HeapError> {
        (id.as_u32() as usize)
            .checked_sub(1)
            .and_then(|index| self.descriptors.get(index))
            .ok_or(HeapError::UnregisteredType(id))
    }

    /// Id registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Close the table to further registration.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no type has been registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
