//! Root frames and the handles that name them.

use smallvec::SmallVec;

/// Names one frame of the root stack.
///
/// Handles are plain values; the registry checks them against the stack on
/// every use, so a stale or misordered handle is detected rather than
/// trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle {
    /// Stack index of the frame.
    pub(crate) depth: usize,
    /// Sequence number issued at push time; never reused.
    pub(crate) seq: u64,
}

impl RootHandle {
    /// Sequence number of the frame, as shown in diagnostics.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Stack index of the frame.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// One entry of the root stack: the slots registered by one computation.
pub(crate) struct RootFrame {
    pub(crate) seq: u64,
    pub(crate) slots: SmallVec<[*mut usize; 4]>,
}

impl RootFrame {
    pub(crate) fn new(seq: u64) -> Self {
        Self {
            seq,
            slots: SmallVec::new(),
        }
    }
}
