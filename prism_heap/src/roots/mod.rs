//! Root tracking.
//!
//! GC roots are the starting points for tracing:
//! - Frames pushed around in-flight computations (locals, temporaries under
//!   construction)
//! - Global slots registered once at startup
//!
//! Roots are *addresses of reference words*, not object addresses, because
//! the copying collector rewrites them in place.

mod frame;

pub use frame::RootHandle;

use crate::error::RootViolation;
use frame::RootFrame;

/// Stack-discipline registry of root slots plus the global slot set.
#[derive(Default)]
pub struct RootRegistry {
    frames: Vec<RootFrame>,
    globals: Vec<*mut usize>,
    next_seq: u64,
}

impl RootRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an empty frame and return its handle.
    pub fn push_root(&mut self) -> RootHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let handle = RootHandle {
            depth: self.frames.len(),
            seq,
        };
        self.frames.push(RootFrame::new(seq));
        tracing::trace!(seq, depth = handle.depth, "push root frame");
        handle
    }

    /// Pop the frame named by `handle`, which must be on top of the stack.
    ///
    /// On violation the stack is left untouched.
    pub fn pop_root(&mut self, handle: RootHandle) -> Result<(), RootViolation> {
        let Some(top) = self.frames.last() else {
            return Err(RootViolation::EmptyStack { found: handle.seq });
        };
        if top.seq != handle.seq {
            return Err(RootViolation::OutOfOrderPop {
                expected: top.seq,
                found: handle.seq,
            });
        }
        self.frames.pop();
        tracing::trace!(seq = handle.seq, "pop root frame");
        Ok(())
    }

    /// Register `slot` in the frame named by `handle`.
    ///
    /// # Safety
    ///
    /// `slot` must stay valid and hold either zero or a live heap reference
    /// until the frame is popped.
    pub unsafe fn add_root(
        &mut self,
        handle: RootHandle,
        slot: *mut usize,
    ) -> Result<(), RootViolation> {
        match self.frames.get_mut(handle.depth) {
            Some(frame) if frame.seq == handle.seq => {
                frame.slots.push(slot);
                Ok(())
            }
            _ => Err(RootViolation::StaleHandle { found: handle.seq }),
        }
    }

    /// Register a process-wide slot. Registering the same slot twice is a
    /// no-op.
    ///
    /// # Safety
    ///
    /// `slot` must stay valid for the lifetime of the heap and always hold
    /// either zero or a live heap reference.
    pub unsafe fn register_global(&mut self, slot: *mut usize) {
        if !self.globals.contains(&slot) {
            self.globals.push(slot);
        }
    }

    /// Visit every registered slot, frames first, stopping at the first
    /// error.
    pub fn try_for_each_slot<E>(
        &self,
        mut f: impl FnMut(*mut usize) -> Result<(), E>,
    ) -> Result<(), E> {
        for frame in &self.frames {
            for &slot in &frame.slots {
                f(slot)?;
            }
        }
        for &slot in &self.globals {
            f(slot)?;
        }
        Ok(())
    }

    /// Whether `handle` names a frame still on the stack.
    pub fn is_live(&self, handle: RootHandle) -> bool {
        self.frames
            .get(handle.depth)
            .is_some_and(|frame| frame.seq == handle.seq)
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of slots registered across all frames.
    pub fn frame_slot_count(&self) -> usize {
        self.frames.iter().map(|frame| frame.slots.len()).sum()
    }

    /// Number of global slots.
    pub fn global_count(&self) -> usize {
        self.globals.len()
    }
}

// Safety: the registry only stores slot addresses; the heap that owns it
// serializes every access to them.
unsafe impl Send for RootRegistry {}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(roots: &RootRegistry) -> Vec<*mut usize> {
        let mut out = Vec::new();
        roots
            .try_for_each_slot::<()>(|slot| {
                out.push(slot);
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_push_pop_lifo() {
        let mut roots = RootRegistry::new();
        let a = roots.push_root();
        let b = roots.push_root();
        assert_eq!(roots.depth(), 2);

        roots.pop_root(b).unwrap();
        roots.pop_root(a).unwrap();
        assert_eq!(roots.depth(), 0);
    }

    #[test]
    fn test_out_of_order_pop_detected() {
        let mut roots = RootRegistry::new();
        let a = roots.push_root();
        let _b = roots.push_root();
        let c = roots.push_root();

        assert_eq!(
            roots.pop_root(a),
            Err(RootViolation::OutOfOrderPop {
                expected: c.seq(),
                found: a.seq()
            })
        );
        assert_eq!(roots.depth(), 3);
    }

    #[test]
    fn test_pop_empty_stack() {
        let mut roots = RootRegistry::new();
        let a = roots.push_root();
        roots.pop_root(a).unwrap();
        assert_eq!(
            roots.pop_root(a),
            Err(RootViolation::EmptyStack { found: a.seq() })
        );
    }

    #[test]
    fn test_reused_depth_does_not_revive_handle() {
        let mut roots = RootRegistry::new();
        let a = roots.push_root();
        roots.pop_root(a).unwrap();
        let b = roots.push_root();
        assert_eq!(a.depth(), b.depth());
        assert!(!roots.is_live(a));

        let mut word = 0usize;
        assert_eq!(
            unsafe { roots.add_root(a, &mut word) },
            Err(RootViolation::StaleHandle { found: a.seq() })
        );
        assert_eq!(roots.pop_root(a).unwrap_err(), RootViolation::OutOfOrderPop {
            expected: b.seq(),
            found: a.seq()
        });
    }

    #[test]
    fn test_slots_enumerated() {
        let mut roots = RootRegistry::new();
        let mut local = 0usize;
        let mut global = 0usize;

        let frame = roots.push_root();
        unsafe {
            roots.add_root(frame, &mut local).unwrap();
            roots.register_global(&mut global);
            roots.register_global(&mut global);
        }

        assert_eq!(roots.global_count(), 1);
        assert_eq!(roots.frame_slot_count(), 1);
        let all = slots(&roots);
        assert_eq!(all.len(), 2);
        assert!(all.contains(&(&mut local as *mut usize)));
        assert!(all.contains(&(&mut global as *mut usize)));

        roots.pop_root(frame).unwrap();
        assert_eq!(slots(&roots), vec![&mut global as *mut usize]);
    }
}
