/// Software timers used by the persistence engine and the connectivity manager.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Deferred configuration write.
    ConfigSave,
    /// Background scan for the fallback network.
    WifiScan,
    /// Periodic signal strength sample.
    RssiSample,
}

/// Timer facility. Expiry is reported back through
/// [`crate::device::Event::TimerExpired`]; an expired one-shot timer is no longer armed.
pub trait Timers {
    /// Arms `timer` to fire after `delay_ms`, then every `delay_ms` if `repeat` is set.
    /// Arming an armed timer replaces its pending expiry.
    fn arm(&mut self, timer: TimerId, delay_ms: u32, repeat: bool);

    fn disarm(&mut self, timer: TimerId);

    /// Disarm, then arm. Every (re)scheduling goes through here so a pending expiry is always
    /// cancelled first.
    fn rearm(&mut self, timer: TimerId, delay_ms: u32, repeat: bool) {
        self.disarm(timer);
        self.arm(timer, delay_ms, repeat);
    }
}

impl<T: Timers> Timers for &mut T {
    fn arm(&mut self, timer: TimerId, delay_ms: u32, repeat: bool) {
        T::arm(self, timer, delay_ms, repeat)
    }

    fn disarm(&mut self, timer: TimerId) {
        T::disarm(self, timer)
    }
}
