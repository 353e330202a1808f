//! The fatal error channel.
//!
//! Translated code has no way to recover from a heap invariant violation,
//! so its call sites go through [`OrAbort`]: the violation is logged with
//! its diagnostic payload and the process aborts.

use crate::error::HeapError;

/// Render the one-line diagnostic printed before aborting.
pub fn diagnostic(err: &HeapError) -> String {
    format!("prism_heap: fatal {}: {}", err.kind(), err)
}

/// Log `err` and abort the process.
#[cold]
pub fn abort_on(err: &HeapError) -> ! {
    tracing::error!(kind = err.kind(), %err, "fatal heap error");
    eprintln!("{}", diagnostic(err));
    std::process::abort()
}

/// Unwrap a heap result or abort through [`abort_on`].
pub trait OrAbort<T> {
    /// The success value, or process termination.
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, HeapError> {
    #[inline]
    #[track_caller]
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => abort_on(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RootViolation;

    #[test]
    fn test_diagnostic_names_kind_and_payload() {
        let err = HeapError::from(RootViolation::OutOfOrderPop {
            expected: 4,
            found: 2,
        });
        let text = diagnostic(&err);
        assert!(text.starts_with("prism_heap: fatal RootDisciplineViolation:"));
        assert!(text.contains("frame #2 while frame #4"));
    }

    #[test]
    fn test_ok_passes_through() {
        let value: Result<u32, HeapError> = Ok(7);
        assert_eq!(value.or_abort(), 7);
    }
}
