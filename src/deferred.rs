use crate::config::SAVE_DEFER_MS;
use crate::timer::{TimerId, Timers};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Debounce for configuration writes.
///
/// Each request restarts the quiescence window, so a burst of mutations ends in exactly one
/// write, carrying the state of the last mutation. A record that is still changing when the
/// window closes (pulses counted since the last sync) is marked as accumulating, which buys
/// one more window on expiry instead of a write.
#[derive(Debug, Default)]
pub struct DeferredSave {
    pending: bool,
    accumulating: bool,
}

impl DeferredSave {
    pub const fn new() -> Self {
        Self {
            pending: false,
            accumulating: false,
        }
    }

    /// (Re)starts the quiescence window.
    pub fn request(&mut self, timers: &mut impl Timers) {
        #[cfg(feature = "defmt")]
        trace!("deferred save: window restarted");

        timers.rearm(TimerId::ConfigSave, SAVE_DEFER_MS, false);
        self.pending = true;
    }

    /// Marks the record as still changing.
    pub fn note_activity(&mut self) {
        self.accumulating = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Handles expiry of [`TimerId::ConfigSave`]. Returns `true` if the write is due now.
    pub fn on_expiry(&mut self, timers: &mut impl Timers) -> bool {
        if !self.pending {
            return false;
        }

        if core::mem::take(&mut self.accumulating) {
            #[cfg(feature = "defmt")]
            trace!("deferred save: still accumulating, rescheduled");

            timers.rearm(TimerId::ConfigSave, SAVE_DEFER_MS, false);
            return false;
        }

        timers.disarm(TimerId::ConfigSave);
        self.pending = false;
        true
    }
}
