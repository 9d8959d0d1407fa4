//! Wiring of the persistence engine and the connectivity manager into one device context.
//!
//! Radio callbacks, timer expiries and the pulse interrupt only enqueue an [`Event`]; the main
//! loop drains the queue through [`DeviceContext::dispatch`], so every handler runs to
//! completion before the next one starts.

use crate::error::Error;
use crate::platform::HardwareId;
use crate::radio::{LinkEvent, Radio, ScanOutcome};
use crate::storage::RecordStorage;
use crate::timer::{TimerId, Timers};
use crate::wifi::{ConnectivityManager, FnLinkReady, StatusIndicator};
use crate::{ConfigStore, LoadOutcome};
#[cfg(feature = "defmt")]
use defmt::{info, warn};
use heapless::Deque;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    TimerExpired(TimerId),
    Link(LinkEvent),
    ScanDone(ScanOutcome),
    /// The pulse interrupt counted at least one pulse.
    PulsesCounted,
}

/// Bounded FIFO of pending events.
pub struct EventQueue<const N: usize> {
    events: Deque<Event, N>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
        }
    }

    /// Appends `event`, handing it back if the queue is full.
    pub fn push(&mut self, event: Event) -> Result<(), Event> {
        self.events.push_back(event)
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything that makes up one device: its configuration, its connectivity and the timer
/// facility both schedule on.
pub struct DeviceContext<'a, S: RecordStorage, R: Radio, L: StatusIndicator, T: Timers> {
    pub store: ConfigStore<'a, S>,
    pub wifi: ConnectivityManager<R, L>,
    pub timers: T,
}

impl<'a, S: RecordStorage, R: Radio, L: StatusIndicator, T: Timers> DeviceContext<'a, S, R, L, T> {
    pub fn new(store: ConfigStore<'a, S>, wifi: ConnectivityManager<R, L>, timers: T) -> Self {
        Self {
            store,
            wifi,
            timers,
        }
    }

    /// Loads the configuration, then joins the default network named in it.
    pub fn boot(&mut self, hardware: &impl HardwareId, on_ready: FnLinkReady) -> LoadOutcome {
        let outcome = self.store.load(hardware);

        #[cfg(feature = "defmt")]
        info!(
            "device: {} booted as {}",
            self.store.profile(),
            self.store.record().device_id
        );

        let record = self.store.record();
        let ssid = record.station_ssid;
        let password = record.station_password;
        self.wifi
            .connect(&mut self.timers, ssid.as_str(), password.as_str(), on_ready);

        outcome
    }

    /// Runs the handler for one event to completion.
    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::TimerExpired(TimerId::ConfigSave) => {
                if let Err(_e) = self.store.on_save_timer(&mut self.timers) {
                    report_persistence_failure(&_e);
                }
            }
            Event::TimerExpired(TimerId::WifiScan) => self.wifi.on_scan_timer(&mut self.timers),
            Event::TimerExpired(TimerId::RssiSample) => self.wifi.on_rssi_timer(),
            Event::Link(link) => self.wifi.handle_link_event(&link),
            Event::ScanDone(outcome) => self.wifi.on_scan_done(&mut self.timers, &outcome),
            Event::PulsesCounted => self.store.sync_pulses(&mut self.timers),
        }
    }

    /// Dispatches queued events until the queue is empty. Returns how many were handled.
    pub fn run_pending<const N: usize>(&mut self, queue: &mut EventQueue<N>) -> usize {
        let mut handled = 0;
        while let Some(event) = queue.pop() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }
}

fn report_persistence_failure(_error: &Error) {
    #[cfg(feature = "defmt")]
    warn!("device: configuration not persisted: {}", _error);

    #[cfg(feature = "debug-logs")]
    println!("  device: configuration not persisted: {_error}");
}
