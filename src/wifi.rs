//! Station connectivity with automatic reconnect and a fallback network.
//!
//! The manager joins the default network from the configuration record and keeps scanning in
//! the background. When the fallback network shows up it switches over; when it disappears it
//! goes back to the default network. Only edges of the fallback's presence trigger a switch, so
//! repeated identical scan results never cause oscillation.
//!
//! ```text
//! Idle -> Connecting(p) -> Associated(p) -> Disconnected -> Connecting(p) ...
//! ```
//!
//! Scanning runs beside that while connecting or associated, until it is stopped.

use crate::config::{RSSI_CHECK_INTERVAL_MS, RSSI_UNAVAILABLE, WIFI_SCAN_INTERVAL_MS};
use crate::radio::{ConfigScope, LinkEvent, LinkStatus, OpMode, Radio, ScanOutcome, StationConfig};
use crate::timer::{TimerId, Timers};
#[cfg(feature = "defmt")]
use defmt::{debug, info, warn};
use portable_atomic::{AtomicBool, AtomicI8, Ordering};

/// Invoked with the link status every time the link becomes usable.
pub type FnLinkReady = fn(LinkStatus);

#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    Default,
    Fallback,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    Connecting(Profile),
    Associated(Profile),
    Disconnected,
}

/// Visual patterns the manager asks the status indicator for.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pattern {
    FallbackNetwork,
}

/// Fire-and-forget status output, typically an LED.
pub trait StatusIndicator {
    fn enter_pattern(&mut self, pattern: Pattern);

    fn exit_pattern(&mut self);
}

impl<T: StatusIndicator> StatusIndicator for &mut T {
    fn enter_pattern(&mut self, pattern: Pattern) {
        T::enter_pattern(self, pattern)
    }

    fn exit_pattern(&mut self) {
        T::exit_pattern(self)
    }
}

/// Spin iterations [`SignalStrength::get`] waits for a sample in progress.
pub const SAMPLE_WAIT_SPINS: u32 = 100_000;

/// Most recent signal strength sample, shared between the sampling timer and readers.
///
/// A reader arriving while a sample is being taken spins until it completes. Sampling is a
/// single register read, so the wait is short. The spin is bounded: a reader that preempted
/// the sampler on the same core gets the previous sample instead of spinning forever.
#[derive(Debug)]
pub struct SignalStrength {
    value: AtomicI8,
    in_flight: AtomicBool,
}

impl SignalStrength {
    pub const fn new() -> Self {
        Self {
            value: AtomicI8::new(RSSI_UNAVAILABLE),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn sample(&self, read: impl FnOnce() -> i8) {
        self.begin_sample();
        self.finish_sample(read());
    }

    pub fn begin_sample(&self) {
        self.in_flight.store(true, Ordering::Release);
    }

    pub fn finish_sample(&self, value: i8) {
        self.value.store(value, Ordering::Release);
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn is_sampling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Latest completed sample, or [`RSSI_UNAVAILABLE`] before the first one.
    pub fn get(&self) -> i8 {
        self.get_within(SAMPLE_WAIT_SPINS)
    }

    /// Like [`SignalStrength::get`], waiting at most `max_spins` iterations for a sample in
    /// progress before settling for the previous one.
    pub fn get_within(&self, max_spins: u32) -> i8 {
        for _ in 0..max_spins {
            if !self.is_sampling() {
                let value = self.value.load(Ordering::Acquire);
                // a sample that started meanwhile may have overwritten the value; read again
                if !self.is_sampling() {
                    return value;
                }
            }
            core::hint::spin_loop();
        }
        self.value.load(Ordering::Acquire)
    }
}

impl Default for SignalStrength {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectivityState {
    pub active_profile: Profile,
    pub link_state: LinkState,
    pub link_status: LinkStatus,
    pub fallback_present: bool,
    pub fallback_present_previous: bool,
    pub scan_in_flight: bool,
    /// Background scanning is running. Cleared by [`ConnectivityManager::stop_scanning`].
    pub scanning: bool,
    /// Whether a disassociation is answered with a reconnect. Cleared while a profile switch
    /// owns the radio.
    pub reconnect: bool,
}

impl ConnectivityState {
    const fn new() -> Self {
        Self {
            active_profile: Profile::Default,
            link_state: LinkState::Idle,
            link_status: LinkStatus::Idle,
            fallback_present: false,
            fallback_present_previous: false,
            scan_in_flight: false,
            scanning: false,
            reconnect: false,
        }
    }
}

pub struct ConnectivityManager<R: Radio, L: StatusIndicator> {
    radio: R,
    indicator: L,
    default: StationConfig,
    fallback: StationConfig,
    on_ready: Option<FnLinkReady>,
    state: ConnectivityState,
    signal: SignalStrength,
}

impl<R: Radio, L: StatusIndicator> ConnectivityManager<R, L> {
    pub fn new(radio: R, indicator: L, fallback: StationConfig) -> Self {
        Self {
            radio,
            indicator,
            default: StationConfig::default(),
            fallback,
            on_ready: None,
            state: ConnectivityState::new(),
            signal: SignalStrength::new(),
        }
    }

    /// Joins the default network and starts the background scan and signal sampling.
    /// `on_ready` runs once per transition into [`LinkState::Associated`].
    pub fn connect(
        &mut self,
        timers: &mut impl Timers,
        ssid: &str,
        password: &str,
        on_ready: FnLinkReady,
    ) {
        #[cfg(feature = "defmt")]
        info!("wifi: init, ssid {=str}", ssid);

        log_failure("set_mode", self.radio.set_mode(OpMode::Station, ConfigScope::Saved));
        // auto-connect off while the new credentials go in, back on afterwards
        log_failure("set_auto_connect", self.radio.set_auto_connect(false));
        self.on_ready = Some(on_ready);
        self.default = StationConfig::new(ssid, password);

        log_failure("disconnect", self.radio.disconnect());
        log_failure(
            "set_station_config",
            self.radio
                .set_station_config(&self.default, ConfigScope::Saved),
        );

        // first scan right away
        self.state.scanning = true;
        timers.rearm(TimerId::WifiScan, 0, false);

        log_failure("set_auto_connect", self.radio.set_auto_connect(true));
        self.state.reconnect = true;
        self.state.active_profile = Profile::Default;
        self.state.link_state = LinkState::Connecting(Profile::Default);
        log_failure("connect", self.radio.connect());

        timers.rearm(TimerId::RssiSample, RSSI_CHECK_INTERVAL_MS, true);

        self.indicator.exit_pattern();
    }

    /// Reacts to an asynchronous link notification from the radio.
    pub fn handle_link_event(&mut self, event: &LinkEvent) {
        self.state.link_status = self.radio.status();

        match event {
            LinkEvent::Connected => {}
            LinkEvent::Disconnected { reason: _reason } => {
                #[cfg(feature = "defmt")]
                debug!("wifi: disconnected, reason {}", _reason);

                #[cfg(feature = "debug-logs")]
                println!("  wifi: disconnected, reason {_reason}");

                self.state.link_state = LinkState::Disconnected;
                if self.state.reconnect {
                    self.state.link_state = LinkState::Connecting(self.state.active_profile);
                    log_failure("connect", self.radio.connect());
                }
            }
            LinkEvent::GotIp => {
                self.state.reconnect = true;
                let associated = LinkState::Associated(self.state.active_profile);
                if self.state.link_state == associated {
                    return;
                }
                self.state.link_state = associated;

                #[cfg(feature = "defmt")]
                info!("wifi: link ready on {}", self.state.active_profile);

                if let Some(on_ready) = self.on_ready {
                    on_ready(self.state.link_status);
                }
            }
        }
    }

    /// Expiry of [`TimerId::WifiScan`]. Starts a scan unless one is still running.
    pub fn on_scan_timer(&mut self, timers: &mut impl Timers) {
        if self.state.scan_in_flight {
            return;
        }

        self.state.scanning = true;
        self.state.scan_in_flight = true;
        if let Err(_e) = self.radio.start_scan() {
            #[cfg(feature = "defmt")]
            warn!("wifi: scan start failed: {}", defmt::Debug2Format(&_e));

            // no completion will follow; try again next interval
            self.state.scan_in_flight = false;
            timers.rearm(TimerId::WifiScan, WIFI_SCAN_INTERVAL_MS, false);
        }
    }

    /// Scan completion. Switches profile on edges of the fallback network's presence and
    /// schedules the next scan.
    pub fn on_scan_done(&mut self, timers: &mut impl Timers, outcome: &ScanOutcome) {
        if !self.state.scanning {
            #[cfg(feature = "defmt")]
            debug!("wifi: scan completed after stop, ignored");
            return;
        }

        let mut present = false;

        if let ScanOutcome::Done(results) = outcome {
            present = !self.fallback.ssid.is_empty()
                && results.iter().any(|ap| ap.ssid == self.fallback.ssid);

            if present && !self.state.fallback_present_previous {
                self.switch_to_fallback(timers);
            } else if !present && self.state.fallback_present_previous {
                self.switch_to_default(timers);
            }

            self.state.fallback_present_previous = present;
        }

        self.state.fallback_present = present;
        self.state.scan_in_flight = false;

        timers.rearm(TimerId::WifiScan, WIFI_SCAN_INTERVAL_MS, false);
    }

    /// Expiry of [`TimerId::RssiSample`].
    pub fn on_rssi_timer(&mut self) {
        let radio = &mut self.radio;
        self.signal.sample(|| radio.rssi());
    }

    /// Leaves whatever network is joined and associates with the fallback network.
    pub fn switch_to_fallback(&mut self, timers: &mut impl Timers) {
        #[cfg(feature = "defmt")]
        info!("wifi: switching to fallback network");

        // signal strength is only tracked on the default network
        timers.disarm(TimerId::RssiSample);

        let fallback = self.fallback.clone();
        self.join(Profile::Fallback, &fallback);

        self.indicator.enter_pattern(Pattern::FallbackNetwork);
    }

    /// Leaves whatever network is joined and associates with the default network again.
    pub fn switch_to_default(&mut self, timers: &mut impl Timers) {
        #[cfg(feature = "defmt")]
        info!("wifi: switching to default network");

        let default = self.default.clone();
        self.join(Profile::Default, &default);

        timers.rearm(TimerId::RssiSample, RSSI_CHECK_INTERVAL_MS, true);

        self.indicator.exit_pattern();
    }

    /// Stops the background scan. A scan already running may still complete; its outcome is
    /// ignored and nothing is rescheduled until [`ConnectivityManager::on_scan_timer`] is
    /// called again.
    pub fn stop_scanning(&mut self, timers: &mut impl Timers) {
        timers.disarm(TimerId::WifiScan);
        log_failure("stop_scan", self.radio.stop_scan());
        self.state.scanning = false;
        self.state.scan_in_flight = false;
    }

    pub fn is_scanning(&self) -> bool {
        self.state.scanning
    }

    /// Latest signal strength sample. Waits for a sample in progress.
    pub fn signal_strength(&self) -> i8 {
        self.signal.get()
    }

    pub fn signal(&self) -> &SignalStrength {
        &self.signal
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    pub fn active_profile(&self) -> Profile {
        self.state.active_profile
    }

    pub fn link_state(&self) -> LinkState {
        self.state.link_state
    }

    pub fn scan_in_flight(&self) -> bool {
        self.state.scan_in_flight
    }

    pub fn fallback_present(&self) -> bool {
        self.state.fallback_present
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    fn join(&mut self, profile: Profile, target: &StationConfig) {
        // keep the link event handler from reconnecting behind our back
        self.state.reconnect = false;

        log_failure("disconnect", self.radio.disconnect());
        log_failure(
            "set_mode",
            self.radio.set_mode(OpMode::Station, ConfigScope::Session),
        );

        let mut config = match self.radio.station_config() {
            Ok(config) => config,
            Err(_e) => {
                #[cfg(feature = "defmt")]
                warn!("wifi: reading station config failed: {}", defmt::Debug2Format(&_e));
                StationConfig::default()
            }
        };
        config.stamp(&target.ssid, &target.password);

        log_failure(
            "set_station_config",
            self.radio.set_station_config(&config, ConfigScope::Session),
        );

        self.state.active_profile = profile;
        self.state.link_state = LinkState::Connecting(profile);
        log_failure("connect", self.radio.connect());
    }
}

fn log_failure<E: core::fmt::Debug>(_op: &'static str, result: Result<(), E>) {
    if let Err(_e) = result {
        #[cfg(feature = "defmt")]
        warn!("wifi: {=str} failed: {}", _op, defmt::Debug2Format(&_e));

        #[cfg(feature = "debug-logs")]
        println!("  wifi: {_op} failed: {_e:?}");
    }
}
