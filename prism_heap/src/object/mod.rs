//! Object model: headers, type descriptors and references.

mod descriptor;
mod header;
mod obj_ref;
mod registry;

pub use descriptor::{
    FieldDescriptor, FieldKind, TypeDescriptor, TypeId, VariableRegion, WORD_SIZE,
};
pub use header::{
    HEADER_MAGIC, HEADER_SIZE, OBJECT_ALIGN, ObjectHeader, ObjectState, footprint,
};
pub use obj_ref::ObjRef;
pub use registry::TypeRegistry;
