use crate::DeferredSave;
use crate::FixedStr;
use crate::config::Defaults;
use crate::error::Error;
use crate::platform::HardwareId;
use crate::radio::AuthMode;
use crate::record::{ConfigurationRecord, CronJob, DeviceProfile, KEY_LEN, RECORD_SIZE};
use crate::storage::RecordStorage;
use crate::timer::Timers;
#[cfg(feature = "defmt")]
use defmt::{debug, info, warn};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Pulse counter of the impulse meter profile, incremented from the pulse interrupt.
///
/// The persistence engine snapshots it into the record on every save and repeats the save if
/// it moved while the write was in progress. The stored count is added to it when it is
/// attached and when the record is loaded, so pulses counted before either are kept.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
    dirty: AtomicBool,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Counts one pulse. Interrupt safe.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    fn add(&self, value: u32) {
        self.count.fetch_add(value, Ordering::AcqRel);
    }

    /// Returns whether pulses arrived since the last call.
    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

/// Result of [`ConfigStore::load`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// The stored record passed validation and is now the in-memory record.
    Restored,
    /// The stored record was unusable; defaults were generated and written back.
    Defaulted { cause: Error },
}

/// Owner of the device's configuration record.
///
/// The record is loaded once at boot, mutated by the application through the setters (which
/// schedule a debounced write) and written back either explicitly via [`ConfigStore::save`] or
/// when the quiescence window of the deferred save elapses.
pub struct ConfigStore<'a, S: RecordStorage> {
    storage: S,
    defaults: Defaults,
    record: ConfigurationRecord,
    deferred: DeferredSave,
    pulses: Option<&'a PulseCounter>,
    faulted: bool,
}

impl<'a, S: RecordStorage> ConfigStore<'a, S> {
    /// Creates the store with a zeroed record. Call [`ConfigStore::load`] before reading it.
    pub fn new(storage: S, profile: DeviceProfile, defaults: Defaults) -> Self {
        Self {
            storage,
            defaults,
            record: ConfigurationRecord::zeroed(profile),
            deferred: DeferredSave::new(),
            pulses: None,
            faulted: false,
        }
    }

    /// Links the live pulse counter. Only the impulse meter profile has one.
    ///
    /// The count of the current record is added to the counter. Attach before
    /// [`ConfigStore::load`], which then adds the stored count, or after it, but load only once.
    pub fn attach_pulse_counter(&mut self, pulses: &'a PulseCounter) -> Result<(), Error> {
        let count = self
            .record
            .impulse_meter()
            .ok_or(Error::ProfileMismatch)?
            .count;
        pulses.add(count);
        self.pulses = Some(pulses);
        Ok(())
    }

    /// Reads and validates the stored record. Anything unusable, a failing read included, is
    /// replaced by a record built from the defaults, which is written back immediately.
    pub fn load(&mut self, hardware: &impl HardwareId) -> LoadOutcome {
        #[cfg(feature = "defmt")]
        info!("config: load");

        let profile = self.profile();
        let mut buf = [0u8; RECORD_SIZE];
        let loaded = self
            .storage
            .read_record(&mut buf)
            .and_then(|()| ConfigurationRecord::from_bytes(&buf, profile));

        match loaded {
            Ok(record) => {
                #[cfg(feature = "defmt")]
                info!("config: crc ok");

                self.record = record;
                self.restore_pulses();
                LoadOutcome::Restored
            }
            Err(cause) => {
                #[cfg(feature = "defmt")]
                warn!("config: {}, default configuration loaded", cause);

                #[cfg(feature = "debug-logs")]
                println!("  ConfigStore: {cause}, loading defaults");

                self.record =
                    ConfigurationRecord::defaults(profile, &self.defaults, hardware.chip_id());
                // before the write back, which snapshots the counter
                self.restore_pulses();
                if let Err(_e) = self.save() {
                    #[cfg(feature = "defmt")]
                    warn!("config: writing defaults failed: {}", _e);
                }
                LoadOutcome::Defaulted { cause }
            }
        }
    }

    /// Adds the count of the freshly loaded record to pulses counted since the counter was
    /// attached.
    fn restore_pulses(&mut self) {
        if let (Some(pulses), Some(meter)) = (self.pulses, self.record.impulse_meter()) {
            pulses.add(meter.count);
        }
    }

    /// Writes the in-memory record now.
    ///
    /// With a pulse counter attached the counter is snapshotted into the record first, and the
    /// whole save is repeated until the counter did not move during a full pass, so a torn
    /// count is never left behind as the committed value.
    pub fn save(&mut self) -> Result<(), Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }

        let mut _passes = 0u32;
        loop {
            _passes += 1;
            let snapshot = self.pulses.map(PulseCounter::get);
            if let (Some(count), Some(meter)) = (snapshot, self.record.impulse_meter_mut()) {
                meter.count = count;
            }

            let image = self.record.seal();
            if let Err(e) = self.storage.write_record(&image) {
                #[cfg(feature = "defmt")]
                warn!("config: save failed, persistence disabled");

                self.faulted = true;
                return Err(e);
            }

            match (snapshot, self.pulses) {
                (Some(before), Some(pulses)) if pulses.get() != before => {
                    #[cfg(feature = "defmt")]
                    debug!("config: pulse count moved during save, repeating");
                    continue;
                }
                _ => break,
            }
        }

        #[cfg(feature = "defmt")]
        debug!("config: saved in {} pass(es), crc {:#x}", _passes, self.record.checksum);

        #[cfg(feature = "debug-logs")]
        println!(
            "  ConfigStore: saved in {_passes} pass(es), crc {:#06x}",
            self.record.checksum
        );

        Ok(())
    }

    /// Schedules a write once no further request arrived for the quiescence window.
    pub fn request_deferred_save(&mut self, timers: &mut impl Timers) {
        self.deferred.request(timers);
    }

    /// Handles expiry of the deferred save timer. Returns `Ok(true)` if a write happened.
    pub fn on_save_timer(&mut self, timers: &mut impl Timers) -> Result<bool, Error> {
        if !self.deferred.is_pending() {
            return Ok(false);
        }

        // pulses that arrived in the same tick as the expiry get one more window
        if self.pulses.is_some_and(PulseCounter::take_dirty) {
            self.deferred.note_activity();
        }

        if !self.deferred.on_expiry(timers) {
            return Ok(false);
        }

        self.save().map(|()| true)
    }

    /// Schedules a deferred save if pulses were counted since the last call.
    pub fn sync_pulses(&mut self, timers: &mut impl Timers) {
        if self.pulses.is_some_and(PulseCounter::take_dirty) {
            self.deferred.request(timers);
        }
    }

    pub fn record(&self) -> &ConfigurationRecord {
        &self.record
    }

    /// Mutates the record in place and schedules a deferred save.
    pub fn update<R>(
        &mut self,
        timers: &mut impl Timers,
        f: impl FnOnce(&mut ConfigurationRecord) -> R,
    ) -> R {
        let result = f(&mut self.record);
        self.deferred.request(timers);
        result
    }

    pub fn set_station(
        &mut self,
        timers: &mut impl Timers,
        ssid: &str,
        password: &str,
        auth: AuthMode,
    ) -> Result<(), Error> {
        let ssid = FixedStr::try_from_str(ssid)?;
        let password = FixedStr::try_from_str(password)?;
        self.update(timers, |record| {
            record.station_ssid = ssid;
            record.station_password = password;
            record.station_auth = auth;
        });
        Ok(())
    }

    pub fn set_service(
        &mut self,
        timers: &mut impl Timers,
        host: &str,
        port: u32,
        user: &str,
        password: &str,
    ) -> Result<(), Error> {
        let host = FixedStr::try_from_str(host)?;
        let user = FixedStr::try_from_str(user)?;
        let password = FixedStr::try_from_str(password)?;
        self.update(timers, |record| {
            record.service_host = host;
            record.service_port = port;
            record.service_user = user;
            record.service_password = password;
        });
        Ok(())
    }

    pub fn set_symmetric_key(&mut self, timers: &mut impl Timers, key: [u8; KEY_LEN]) {
        self.update(timers, |record| record.symmetric_key = key);
    }

    pub fn set_thermostat_state(
        &mut self,
        timers: &mut impl Timers,
        state: u8,
    ) -> Result<(), Error> {
        let general = self.record.general_mut().ok_or(Error::ProfileMismatch)?;
        general.thermostat_state = state;
        self.deferred.request(timers);
        Ok(())
    }

    pub fn add_job(&mut self, timers: &mut impl Timers, job: CronJob) -> Result<(), Error> {
        let general = self.record.general_mut().ok_or(Error::ProfileMismatch)?;
        general.jobs.push(job).map_err(|_| Error::TooManyJobs)?;
        self.deferred.request(timers);
        Ok(())
    }

    pub fn clear_jobs(&mut self, timers: &mut impl Timers) -> Result<(), Error> {
        let general = self.record.general_mut().ok_or(Error::ProfileMismatch)?;
        general.jobs.clear();
        self.deferred.request(timers);
        Ok(())
    }

    pub fn profile(&self) -> DeviceProfile {
        self.record.device_profile()
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn save_pending(&self) -> bool {
        self.deferred.is_pending()
    }

    /// Set once the storage failed a write. The record keeps working in RAM only.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}
