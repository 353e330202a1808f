//! Diagnostic variants used to validate the collectors.
//!
//! - [`Stressed`]: collect before every allocation
//! - [`Instrumented`]: record [`GcStats`](crate::GcStats)
//! - [`verify_heap`]: full structural check, optionally after every collection
//! - [`census`]: what is still reachable at shutdown
//!
//! Wrappers compose around any collector. Stress mode is always layered over
//! statistics so that stress runs can be asserted on.

mod leak;
mod verify;
mod wrappers;

pub use leak::{Census, ShutdownReport, census};
pub use verify::{VerifyReport, verify_heap};
pub use wrappers::{Instrumented, Stressed};

use crate::collector::{Collector, CopyingCollector, LeakyCollector, MarkSweepCollector};
use crate::config::{CollectorKind, DiagnosticMode, GcConfig};
use crate::error::HeapError;

/// Build the collector stack `config` asks for.
pub fn build_collector(config: &GcConfig) -> Result<Box<dyn Collector>, HeapError> {
    let base: Box<dyn Collector> = match config.collector {
        CollectorKind::MarkSweep => Box::new(MarkSweepCollector::new(config.heap_size)?),
        CollectorKind::Copying => Box::new(CopyingCollector::new(config.heap_size)?),
        CollectorKind::Leaky => Box::new(LeakyCollector::new(config.heap_size)?),
    };

    Ok(match config.mode {
        DiagnosticMode::Normal => base,
        DiagnosticMode::Statistics => Box::new(Instrumented::new(base)),
        DiagnosticMode::Stress => Box::new(Stressed::new(Instrumented::new(base))),
    })
}
