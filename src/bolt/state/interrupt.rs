//! Out-of-band interrupt delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Interrupts raised for one connection and not yet applied.
///
/// The inbound reader raises it as soon as it decodes a RESET, ahead of the
/// message queue. The state machine takes the pending count before each
/// dispatch, and long-running result streams poll it between records.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    pending: Arc<AtomicUsize>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interrupt.
    pub fn raise(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether an interrupt is waiting to be applied.
    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Take every pending interrupt, leaving none.
    pub fn take(&self) -> usize {
        self.pending.swap(0, Ordering::AcqRel)
    }
}
