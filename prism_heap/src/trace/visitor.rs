//! Slot visitor interface for object graph traversal.

/// Receives the address of every traced reference word of an object.
///
/// The collectors implement this to build mark worklists or to evacuate
/// referents and rewrite the slot in place.
///
/// # Example
///
/// ```ignore
/// struct MarkingVisitor<'a> {
///     worklist: &'a mut Vec<usize>,
/// }
///
/// impl SlotVisitor for MarkingVisitor<'_> {
///     fn visit_slot(&mut self, slot: *mut usize) {
///         let word = unsafe { *slot };
///         if word != 0 {
///             self.worklist.push(word);
///         }
///     }
/// }
/// ```
pub trait SlotVisitor {
    /// Visit one reference slot. The word may be zero (null).
    fn visit_slot(&mut self, slot: *mut usize);
}

impl<F: FnMut(*mut usize)> SlotVisitor for F {
    #[inline]
    fn visit_slot(&mut self, slot: *mut usize) {
        self(slot)
    }
}

/// Counts visited slots.
#[derive(Debug, Default)]
pub struct CountingVisitor {
    /// Slots visited, null ones included.
    pub slots: usize,
    /// Slots holding a non-null reference.
    pub non_null: usize,
}

impl CountingVisitor {
    /// Create a new counting visitor.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotVisitor for CountingVisitor {
    fn visit_slot(&mut self, slot: *mut usize) {
        self.slots += 1;
        // SAFETY: tracing only hands out slots inside live payloads.
        if unsafe { *slot } != 0 {
            self.non_null += 1;
        }
    }
}

/// Records every visited slot address in order.
#[derive(Debug, Default)]
pub struct CollectingVisitor {
    /// Visited slots in visit order.
    pub slots: Vec<*mut usize>,
}

impl CollectingVisitor {
    /// Create a new collecting visitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reference words of the visited slots, in order.
    pub fn words(&self) -> Vec<usize> {
        // SAFETY: see `CountingVisitor::visit_slot`.
        self.slots.iter().map(|&slot| unsafe { *slot }).collect()
    }
}

impl SlotVisitor for CollectingVisitor {
    fn visit_slot(&mut self, slot: *mut usize) {
        self.slots.push(slot);
    }
}
