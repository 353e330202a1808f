//! The optional process-wide heap.
//!
//! Translated code that cannot thread a `&mut Heap` through every call
//! installs one heap here at startup. The mutex doubles as the global
//! collection lock: a collection runs while the caller holds it.

use crate::config::{ConfigError, GcConfig};
use crate::error::HeapError;
use crate::heap::Heap;
use parking_lot::Mutex;

static GLOBAL_HEAP: Mutex<Option<Heap>> = parking_lot::const_mutex(None);

/// Install `heap` as the process-wide heap.
pub fn install(heap: Heap) -> Result<(), HeapError> {
    let mut slot = GLOBAL_HEAP.lock();
    if slot.is_some() {
        return Err(ConfigError::AlreadyInstalled.into());
    }
    tracing::debug!(collector = heap.collector_name(), "global heap installed");
    *slot = Some(heap);
    Ok(())
}

/// Build a heap from the environment and install it.
pub fn install_from_env() -> Result<(), HeapError> {
    install(Heap::new(GcConfig::from_env()?)?)
}

/// Whether a process-wide heap is installed.
pub fn is_installed() -> bool {
    GLOBAL_HEAP.lock().is_some()
}

/// Run `f` with exclusive access to the process-wide heap.
///
/// Returns `None` if no heap is installed.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
    GLOBAL_HEAP.lock().as_mut().map(f)
}

/// Remove the process-wide heap, typically to shut it down.
pub fn uninstall() -> Option<Heap> {
    GLOBAL_HEAP.lock().take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TypeDescriptor;

    // The only test in the crate that touches the global slot.
    #[test]
    fn test_install_use_uninstall() {
        assert!(with_heap(|_| ()).is_none());

        install(Heap::with_defaults().unwrap()).unwrap();
        assert!(is_installed());
        assert_eq!(
            install(Heap::with_defaults().unwrap()),
            Err(HeapError::Config(ConfigError::AlreadyInstalled))
        );

        let allocated = with_heap(|heap| {
            let word = heap.register_type(TypeDescriptor::new("Word", 8).scalar(0))?;
            heap.allocate(word, 0).map(|_| heap.object_count())
        })
        .unwrap()
        .unwrap();
        assert_eq!(allocated, 1);

        let heap = uninstall().unwrap();
        assert!(!is_installed());
        assert!(heap.shutdown().unwrap().is_clean());
    }
}
