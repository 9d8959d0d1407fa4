//! Build time defaults.
//!
//! A configuration record is regenerated from these values whenever the stored copy is
//! missing or corrupt. Every text default can be overridden while building the firmware by
//! setting the matching environment variable, e.g.
//! `METER_NODE_STA_SSID=plant-net cargo build --release`.

use crate::radio::AuthMode;

/// Layout sentinel at the start of every record. Change it to force defaults on next boot.
pub const RECORD_MAGIC: u32 = 0x00FF_55A4;

/// Quiescence window of the deferred save.
pub const SAVE_DEFER_MS: u32 = 2000;

/// Delay between the end of one background scan and the start of the next.
pub const WIFI_SCAN_INTERVAL_MS: u32 = 5000;

/// Period of the signal strength sampler.
pub const RSSI_CHECK_INTERVAL_MS: u32 = 1000;

/// Reported signal strength until the first sample completed. Real samples are never positive.
pub const RSSI_UNAVAILABLE: i8 = 31;

const fn env_or(value: Option<&'static str>, fallback: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => fallback,
    }
}

/// Values a fresh record is populated from.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub station_ssid: &'static str,
    pub station_password: &'static str,
    pub station_auth: AuthMode,

    /// Network joined while it is visible. Not part of the record.
    pub fallback_ssid: &'static str,
    pub fallback_password: &'static str,

    /// Prefix of the device id; the chip id follows as eight upper case hex digits.
    pub device_id_prefix: &'static str,

    pub service_host: &'static str,
    pub service_port: u32,
    pub service_user: &'static str,
    pub service_password: &'static str,
    pub keep_alive_seconds: u32,
    pub use_encrypted_transport: bool,

    pub symmetric_key: [u8; 16],

    pub meter_serial: &'static str,
    pub meter_energy: &'static str,
    pub impulses_per_kwh: &'static str,
}

impl Defaults {
    pub const fn from_build_env() -> Self {
        Self {
            station_ssid: env_or(option_env!("METER_NODE_STA_SSID"), "Loppen Public"),
            station_password: env_or(option_env!("METER_NODE_STA_PASS"), ""),
            station_auth: AuthMode::WpaWpa2Psk,
            fallback_ssid: env_or(option_env!("METER_NODE_FALLBACK_SSID"), "stofferFon"),
            fallback_password: env_or(option_env!("METER_NODE_FALLBACK_PASS"), "w1reless"),
            device_id_prefix: env_or(option_env!("METER_NODE_ID_PREFIX"), "ESP_"),
            service_host: env_or(option_env!("METER_NODE_HOST"), "loppen.christiania.org"),
            service_port: 1883,
            service_user: env_or(option_env!("METER_NODE_USER"), "esp8266"),
            service_password: env_or(option_env!("METER_NODE_PASS"), "chah5Kai"),
            keep_alive_seconds: 120,
            use_encrypted_transport: false,
            symmetric_key: [
                0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
                0x4f, 0x3c,
            ],
            meter_serial: env_or(option_env!("METER_NODE_METER_SERIAL"), "9999999"),
            meter_energy: "0",
            impulses_per_kwh: "100",
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_build_env()
    }
}
