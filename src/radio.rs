//! Station mode radio interface consumed by the connectivity manager.
//!
//! The radio reports link changes and scan completion asynchronously; the platform turns those
//! callbacks into [`LinkEvent`] and [`ScanOutcome`] values and hands them to
//! [`crate::device::DeviceContext::dispatch`].

use heapless::{String, Vec};

/// Maximum SSID length (IEEE 802.11)
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length (WPA2)
pub const MAX_PASSWORD_LEN: usize = 64;

/// Access points kept from a single scan. Further results are dropped by the platform.
pub const MAX_SCAN_RESULTS: usize = 16;

#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum AuthMode {
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
}

#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpMode {
    Station,
    AccessPoint,
    StationAndAccessPoint,
}

/// Whether a radio setting survives a radio restart or only applies to the current session.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigScope {
    Saved,
    Session,
}

/// Station connection status as reported by the radio.
#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LinkStatus {
    Idle = 0,
    Connecting = 1,
    WrongPassword = 2,
    NoApFound = 3,
    ConnectFail = 4,
    GotIp = 5,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StationConfig {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
}

impl StationConfig {
    /// Builds a config, cutting overlong credentials at the radio's field widths.
    pub fn new(ssid: &str, password: &str) -> Self {
        let mut config = Self::default();
        config.stamp(ssid, password);
        config
    }

    /// Overwrites the credentials.
    pub fn stamp(&mut self, ssid: &str, password: &str) {
        self.ssid = truncate(ssid);
        self.password = truncate(password);
    }
}

fn truncate<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Asynchronous link notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// Associated with the access point, no address yet.
    Connected,
    /// Association lost or refused.
    Disconnected { reason: u8 },
    /// Address acquired; the link is usable.
    GotIp,
}

/// One entry of a scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ApRecord {
    pub ssid: String<MAX_SSID_LEN>,
    pub rssi: i8,
}

impl ApRecord {
    pub fn new(ssid: &str, rssi: i8) -> Self {
        Self {
            ssid: truncate(ssid),
            rssi,
        }
    }
}

pub type ScanResults = Vec<ApRecord, MAX_SCAN_RESULTS>;

/// Completion of a passive scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanOutcome {
    Done(ScanResults),
    Failed,
}

/// Station mode operations of the radio. Every call returns immediately; outcomes arrive later
/// as [`LinkEvent`]s or a [`ScanOutcome`].
pub trait Radio {
    type Error: core::fmt::Debug;

    fn set_mode(&mut self, mode: OpMode, scope: ConfigScope) -> Result<(), Self::Error>;

    fn set_auto_connect(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Current station configuration, used as the template when switching networks.
    fn station_config(&mut self) -> Result<StationConfig, Self::Error>;

    fn set_station_config(
        &mut self,
        config: &StationConfig,
        scope: ConfigScope,
    ) -> Result<(), Self::Error>;

    fn connect(&mut self) -> Result<(), Self::Error>;

    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Starts a passive scan over all channels. Completion is delivered as a [`ScanOutcome`].
    fn start_scan(&mut self) -> Result<(), Self::Error>;

    fn stop_scan(&mut self) -> Result<(), Self::Error>;

    fn status(&mut self) -> LinkStatus;

    /// Instantaneous signal strength of the associated access point in dBm.
    fn rssi(&mut self) -> i8;
}
