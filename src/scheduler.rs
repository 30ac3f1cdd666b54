//! Coalescing of matching-pass triggers

/// Dirty flag for the matching pass.
///
/// Every state change that wants a pass calls [`request`](Self::request).
/// The core drains all events already queued in the current tick before
/// calling [`take`](Self::take), so any number of triggers in one tick
/// collapse into a single pass.
#[derive(Debug, Default)]
pub(crate) struct MatchScheduler {
    dirty: bool,
    requested: u64,
    passes: u64,
}

impl MatchScheduler {
    pub(crate) fn request(&mut self) {
        self.dirty = true;
        self.requested += 1;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the flag, returning whether a pass is due
    pub(crate) fn take(&mut self) -> bool {
        let due = std::mem::take(&mut self.dirty);
        if due {
            self.passes += 1;
        }
        due
    }

    /// Triggers received versus passes run
    pub(crate) fn stats(&self) -> (u64, u64) {
        (self.requested, self.passes)
    }
}
