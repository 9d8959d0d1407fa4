//! The persisted configuration record and its fixed byte layout.
//!
//! # Layout
//!
//! ```text
//! offset size field
//!      0    4 magic 0x00FF55A4
//!      4   64 station ssid
//!     68   64 station password
//!    132    4 station auth type
//!    136   16 device id
//!    152   64 service host
//!    216    4 service port
//!    220    4 keep-alive seconds
//!    224   32 service user
//!    256   32 service password
//!    288    1 encrypted transport
//!    289    1 profile tag
//!    290    2 reserved
//!    292   16 symmetric key
//!    308   64 profile block
//!    372    2 reserved
//!    374    2 CRC16 over bytes 0..374
//! ```
//!
//! Integers are little endian, text fields are NUL padded.

use crate::FixedStr;
use crate::config::{Defaults, RECORD_MAGIC};
use crate::crc::crc16;
use crate::error::Error;
use crate::radio::AuthMode;
use core::fmt::Write;
use heapless::Vec;

pub const RECORD_SIZE: usize = 376;
const CRC_OFFSET: usize = RECORD_SIZE - 2;
const PROFILE_BLOCK_SIZE: usize = 64;

const _: () = assert!(RECORD_SIZE.is_multiple_of(4), "record must stay word aligned");

pub const MAX_JOBS: usize = 8;
const JOB_SIZE: usize = 7;

const _: () = assert!(
    2 + MAX_JOBS * JOB_SIZE <= PROFILE_BLOCK_SIZE,
    "job table must fit into the profile block"
);

pub const DEVICE_ID_LEN: usize = 16;
pub const KEY_LEN: usize = 16;

/// Firmware flavour. Decides which profile block the record carries.
#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceProfile {
    ImpulseMeter = 1,
    General = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImpulseMeter {
    pub serial: FixedStr<16>,
    pub energy: FixedStr<16>,
    pub impulses_per_kwh: FixedStr<8>,
    /// Pulses counted so far. Snapshot of the live [`crate::PulseCounter`] taken on every save.
    pub count: u32,
}

#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum JobCommand {
    Off = 0,
    On = 1,
}

/// A scheduled on/off job. Time fields holding [`CronJob::ANY`] match every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CronJob {
    pub minute: u8,
    pub hour: u8,
    pub day_of_month: u8,
    pub month: u8,
    pub day_of_week: u8,
    pub command: JobCommand,
    pub enabled: bool,
}

impl CronJob {
    pub const ANY: u8 = 0xFF;

    /// Job running every day at `hour:minute`.
    pub const fn daily(hour: u8, minute: u8, command: JobCommand) -> Self {
        Self {
            minute,
            hour,
            day_of_month: Self::ANY,
            month: Self::ANY,
            day_of_week: Self::ANY,
            command,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct General {
    pub thermostat_state: u8,
    pub jobs: Vec<CronJob, MAX_JOBS>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileData {
    ImpulseMeter(ImpulseMeter),
    General(General),
}

impl ProfileData {
    pub fn profile(&self) -> DeviceProfile {
        match self {
            ProfileData::ImpulseMeter(_) => DeviceProfile::ImpulseMeter,
            ProfileData::General(_) => DeviceProfile::General,
        }
    }

    fn defaults(profile: DeviceProfile, defaults: &Defaults) -> Self {
        match profile {
            DeviceProfile::ImpulseMeter => ProfileData::ImpulseMeter(ImpulseMeter {
                serial: FixedStr::truncated(defaults.meter_serial),
                energy: FixedStr::truncated(defaults.meter_energy),
                impulses_per_kwh: FixedStr::truncated(defaults.impulses_per_kwh),
                count: 0,
            }),
            DeviceProfile::General => ProfileData::General(General::default()),
        }
    }
}

/// Operating record of the device. One instance lives in RAM, the durable copy in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigurationRecord {
    pub magic: u32,
    pub station_ssid: FixedStr<64>,
    pub station_password: FixedStr<64>,
    pub station_auth: AuthMode,
    pub device_id: FixedStr<DEVICE_ID_LEN>,
    pub service_host: FixedStr<64>,
    pub service_port: u32,
    pub keep_alive_seconds: u32,
    pub service_user: FixedStr<32>,
    pub service_password: FixedStr<32>,
    pub use_encrypted_transport: bool,
    pub symmetric_key: [u8; KEY_LEN],
    pub profile: ProfileData,
    /// CRC16 of the last encoded image. Only meaningful right after a load or save.
    pub checksum: u16,
}

impl ConfigurationRecord {
    /// A fresh record populated from build time defaults, with the device id derived from
    /// `chip_id`.
    pub fn defaults(profile: DeviceProfile, defaults: &Defaults, chip_id: u32) -> Self {
        Self {
            magic: RECORD_MAGIC,
            station_ssid: FixedStr::truncated(defaults.station_ssid),
            station_password: FixedStr::truncated(defaults.station_password),
            station_auth: defaults.station_auth,
            device_id: format_device_id(defaults.device_id_prefix, chip_id),
            service_host: FixedStr::truncated(defaults.service_host),
            service_port: defaults.service_port,
            keep_alive_seconds: defaults.keep_alive_seconds,
            service_user: FixedStr::truncated(defaults.service_user),
            service_password: FixedStr::truncated(defaults.service_password),
            use_encrypted_transport: defaults.use_encrypted_transport,
            symmetric_key: defaults.symmetric_key,
            profile: ProfileData::defaults(profile, defaults),
            checksum: 0,
        }
    }

    /// All-zero record as it exists in RAM before the first load.
    pub fn zeroed(profile: DeviceProfile) -> Self {
        let profile = match profile {
            DeviceProfile::ImpulseMeter => ProfileData::ImpulseMeter(ImpulseMeter {
                serial: FixedStr::empty(),
                energy: FixedStr::empty(),
                impulses_per_kwh: FixedStr::empty(),
                count: 0,
            }),
            DeviceProfile::General => ProfileData::General(General::default()),
        };

        Self {
            magic: 0,
            station_ssid: FixedStr::empty(),
            station_password: FixedStr::empty(),
            station_auth: AuthMode::Open,
            device_id: FixedStr::empty(),
            service_host: FixedStr::empty(),
            service_port: 0,
            keep_alive_seconds: 0,
            service_user: FixedStr::empty(),
            service_password: FixedStr::empty(),
            use_encrypted_transport: false,
            symmetric_key: [0; KEY_LEN],
            profile,
            checksum: 0,
        }
    }

    /// Encodes the record, stores the freshly computed CRC16 in `checksum` and returns the
    /// storage image.
    pub fn seal(&mut self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        self.encode_body(&mut buf);
        self.checksum = checksum(&buf);
        buf[CRC_OFFSET..].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decodes a storage image. The record is rejected as a whole if the trailer, the magic or
    /// the profile tag does not match.
    pub fn from_bytes(buf: &[u8; RECORD_SIZE], expected: DeviceProfile) -> Result<Self, Error> {
        let stored = u16::from_le_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
        if stored != checksum(buf) {
            return Err(Error::ChecksumMismatch);
        }

        let mut r = Reader { buf, pos: 0 };
        let magic = r.u32();
        if magic != RECORD_MAGIC {
            return Err(Error::BadMagic);
        }

        let station_ssid = r.text();
        let station_password = r.text();
        let station_auth = AuthMode::from_repr(r.u32()).ok_or(Error::InvalidField)?;
        let device_id = r.text();
        let service_host = r.text();
        let service_port = r.u32();
        let keep_alive_seconds = r.u32();
        let service_user = r.text();
        let service_password = r.text();
        let use_encrypted_transport = r.u8() != 0;
        let tag = r.u8();
        if DeviceProfile::from_repr(tag) != Some(expected) {
            return Err(Error::ProfileMismatch);
        }
        r.skip(2);
        let symmetric_key = r.array();
        let profile = decode_profile(expected, r.array::<PROFILE_BLOCK_SIZE>())?;

        Ok(Self {
            magic,
            station_ssid,
            station_password,
            station_auth,
            device_id,
            service_host,
            service_port,
            keep_alive_seconds,
            service_user,
            service_password,
            use_encrypted_transport,
            symmetric_key,
            profile,
            checksum: stored,
        })
    }

    pub fn device_profile(&self) -> DeviceProfile {
        self.profile.profile()
    }

    pub fn impulse_meter(&self) -> Option<&ImpulseMeter> {
        match &self.profile {
            ProfileData::ImpulseMeter(m) => Some(m),
            ProfileData::General(_) => None,
        }
    }

    pub fn impulse_meter_mut(&mut self) -> Option<&mut ImpulseMeter> {
        match &mut self.profile {
            ProfileData::ImpulseMeter(m) => Some(m),
            ProfileData::General(_) => None,
        }
    }

    pub fn general(&self) -> Option<&General> {
        match &self.profile {
            ProfileData::General(g) => Some(g),
            ProfileData::ImpulseMeter(_) => None,
        }
    }

    pub fn general_mut(&mut self) -> Option<&mut General> {
        match &mut self.profile {
            ProfileData::General(g) => Some(g),
            ProfileData::ImpulseMeter(_) => None,
        }
    }

    fn encode_body(&self, buf: &mut [u8; RECORD_SIZE]) {
        let mut w = Writer { buf, pos: 0 };
        w.u32(self.magic);
        w.bytes(self.station_ssid.as_bytes());
        w.bytes(self.station_password.as_bytes());
        w.u32(self.station_auth as u32);
        w.bytes(self.device_id.as_bytes());
        w.bytes(self.service_host.as_bytes());
        w.u32(self.service_port);
        w.u32(self.keep_alive_seconds);
        w.bytes(self.service_user.as_bytes());
        w.bytes(self.service_password.as_bytes());
        w.u8(self.use_encrypted_transport as u8);
        w.u8(self.device_profile() as u8);
        w.skip(2);
        w.bytes(&self.symmetric_key);
        w.bytes(&encode_profile(&self.profile));
        debug_assert_eq!(w.pos, CRC_OFFSET - 2);
    }
}

/// CRC16 of a storage image, covering everything in front of the trailer.
pub fn checksum(buf: &[u8; RECORD_SIZE]) -> u16 {
    crc16(&buf[..CRC_OFFSET])
}

/// `<prefix>` followed by the chip id as eight upper case hex digits, cut to the field width.
pub fn format_device_id(prefix: &str, chip_id: u32) -> FixedStr<DEVICE_ID_LEN> {
    // the prefix is cut to the field first, so prefix and digits always fit
    let prefix = FixedStr::<DEVICE_ID_LEN>::truncated(prefix);
    let mut id: heapless::String<{ DEVICE_ID_LEN + 8 }> = heapless::String::new();
    let written = write!(id, "{}{chip_id:08X}", prefix.as_str());
    debug_assert!(written.is_ok(), "device id buffer too small");
    FixedStr::truncated(&id)
}

fn encode_profile(profile: &ProfileData) -> [u8; PROFILE_BLOCK_SIZE] {
    let mut block = [0u8; PROFILE_BLOCK_SIZE];
    let mut w = Writer {
        buf: &mut block,
        pos: 0,
    };
    match profile {
        ProfileData::ImpulseMeter(m) => {
            w.bytes(m.serial.as_bytes());
            w.bytes(m.energy.as_bytes());
            w.bytes(m.impulses_per_kwh.as_bytes());
            w.u32(m.count);
        }
        ProfileData::General(g) => {
            w.u8(g.thermostat_state);
            w.u8(g.jobs.len() as u8);
            for job in &g.jobs {
                w.bytes(&[
                    job.minute,
                    job.hour,
                    job.day_of_month,
                    job.month,
                    job.day_of_week,
                    job.command as u8,
                    job.enabled as u8,
                ]);
            }
        }
    }
    block
}

fn decode_profile(
    profile: DeviceProfile,
    block: [u8; PROFILE_BLOCK_SIZE],
) -> Result<ProfileData, Error> {
    let mut r = Reader {
        buf: &block,
        pos: 0,
    };
    match profile {
        DeviceProfile::ImpulseMeter => Ok(ProfileData::ImpulseMeter(ImpulseMeter {
            serial: r.text(),
            energy: r.text(),
            impulses_per_kwh: r.text(),
            count: r.u32(),
        })),
        DeviceProfile::General => {
            let thermostat_state = r.u8();
            let count = r.u8() as usize;
            if count > MAX_JOBS {
                return Err(Error::InvalidField);
            }
            let mut jobs = Vec::new();
            for _ in 0..count {
                let raw: [u8; JOB_SIZE] = r.array();
                let job = CronJob {
                    minute: raw[0],
                    hour: raw[1],
                    day_of_month: raw[2],
                    month: raw[3],
                    day_of_week: raw[4],
                    command: JobCommand::from_repr(raw[5]).ok_or(Error::InvalidField)?,
                    enabled: raw[6] != 0,
                };
                jobs.push(job).map_err(|_| Error::TooManyJobs)?;
            }
            Ok(ProfileData::General(General {
                thermostat_state,
                jobs,
            }))
        }
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, src: &[u8]) {
        self.buf[self.pos..self.pos + src.len()].copy_from_slice(src);
        self.pos += src.len();
    }

    fn u8(&mut self, value: u8) {
        self.bytes(&[value]);
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    fn skip(&mut self, len: usize) {
        self.pos += len;
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn text<const N: usize>(&mut self) -> FixedStr<N> {
        FixedStr::from_bytes(self.array())
    }

    fn u8(&mut self) -> u8 {
        let [b] = self.array();
        b
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn skip(&mut self, len: usize) {
        self.pos += len;
    }
}
