//! Prism Managed Heap
//!
//! A tracing garbage-collected heap for statically-typed translated code,
//! with interchangeable collection strategies behind one allocation
//! interface.
//!
//! # Architecture
//!
//! - **Object model**: every allocation carries an [`ObjectHeader`] in front
//!   of its payload. A [`TypeDescriptor`] registered at startup says which
//!   payload words are traced references and which are opaque scalars.
//!
//! - **Roots**: a LIFO stack of frames holding the addresses of reference
//!   words, plus process-wide global slots. Frames are named by
//!   [`RootHandle`]s that are checked on every use.
//!
//! - **Collectors**: [`MarkSweepCollector`] (non-moving, coalescing free
//!   list), [`CopyingCollector`] (Cheney semi-space, rewrites roots) and
//!   [`LeakyCollector`] (never reclaims), all behind [`Collector`].
//!
//! - **Diagnostics**: stress and statistics wrappers, heap verification and
//!   the shutdown leak check, selected through [`GcConfig`].
//!
//! # Usage
//!
//! ```
//! use prism_heap::{GcConfig, Heap, TypeDescriptor};
//!
//! let mut heap = Heap::new(GcConfig::default())?;
//! let node = heap.register_type(TypeDescriptor::new("Node", 16).traced(0).scalar(8))?;
//!
//! let frame = heap.push_root();
//! let mut head = heap.allocate(node, 0)?.to_word();
//! unsafe { heap.add_root(frame, &mut head)? };
//!
//! // `head` stays valid (and is rewritten if the collector moves it).
//! heap.collect()?;
//! heap.pop_root(frame)?;
//! # Ok::<(), prism_heap::HeapError>(())
//! ```
//!
//! # Safety
//!
//! The heap requires that:
//! - Every reference held across an allocation lives in a registered root
//!   slot, and is re-read from it afterwards
//! - Objects are only written through the layout their descriptor declares
//! - Root frames are popped in LIFO order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fatal;
pub mod global;
pub mod heap;
pub mod object;
pub mod roots;
pub mod trace;

mod stats;

// Re-exports for convenient access
pub use builtins::Builtins;
pub use collector::{
    CollectContext, CollectionResult, Collector, CopyingCollector, LeakyCollector,
    MarkSweepCollector,
};
pub use config::{CollectorKind, ConfigError, DiagnosticMode, GcConfig};
pub use diagnostics::{Census, ShutdownReport, VerifyReport};
pub use error::{Corruption, HeapError, RootViolation};
pub use fatal::OrAbort;
pub use heap::Heap;
pub use object::{
    FieldKind, ObjRef, ObjectHeader, ObjectState, TypeDescriptor, TypeId, TypeRegistry,
    VariableRegion,
};
pub use roots::{RootHandle, RootRegistry};
pub use stats::{GcStats, GcTimer, StatsSnapshot};
pub use trace::{SlotVisitor, trace_object};
