#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use meter_node::config::Defaults;
use meter_node::platform::{HardwareId, ProtectedStorage};
use meter_node::radio::{ConfigScope, LinkStatus, OpMode, Radio, StationConfig};
use meter_node::record::DeviceProfile;
use meter_node::storage::{RecordStorage, RedundantStorage};
use meter_node::timer::{TimerId, Timers};
use meter_node::wifi::{Pattern, StatusIndicator};
use meter_node::ConfigStore;

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;
pub const RECORD_SIZE: usize = meter_node::record::RECORD_SIZE;

pub const BANK_A: u32 = 0;
pub const BANK_B: u32 = FLASH_SECTOR_SIZE as u32;
pub const FLAG: u32 = 2 * FLASH_SECTOR_SIZE as u32;

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(sectors: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * sectors],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(sectors: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * sectors],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Makes the operation after the ones already logged the first to fail, plus `skip`.
    pub fn fail_from_now(&mut self, skip: usize) {
        self.fail_after_operation = self.operations.len() + skip;
    }

    pub fn writes_to(&self, address: u32) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { offset, .. } if *offset == address))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn flip_bit(&mut self, offset: usize, bit: u8) {
        self.buf[offset] ^= 1 << bit;
    }

    pub fn flag(&self) -> u32 {
        let at = FLAG as usize;
        u32::from_le_bytes(self.buf[at..at + 4].try_into().unwrap())
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn check_fault(&self) -> Result<(), FlashError> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));
        self.check_fault()?;
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));
        self.check_fault()?;
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));
        assert!(!bytes.is_empty());
        self.check_fault()?;
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

/// Protected parameter area of the single copy layout.
#[derive(Default)]
pub struct ProtectedArea {
    pub data: Vec<u8>,
    pub saves: usize,
    pub fail: bool,
}

impl ProtectedArea {
    pub fn new() -> Self {
        Self {
            data: vec![0xff; RECORD_SIZE],
            ..Default::default()
        }
    }
}

impl ProtectedStorage for ProtectedArea {
    type Error = FlashError;

    fn load(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(FlashError);
        }
        bytes.copy_from_slice(&self.data[..bytes.len()]);
        Ok(())
    }

    fn save_with_protect(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(FlashError);
        }
        self.data = bytes.to_vec();
        self.saves += 1;
        Ok(())
    }
}

pub struct ChipId(pub u32);

impl HardwareId for ChipId {
    fn chip_id(&self) -> u32 {
        self.0
    }
}

pub const CHIP: ChipId = ChipId(0x00C0_FFEE);

pub fn redundant(flash: Flash) -> RedundantStorage<Flash> {
    RedundantStorage::new(flash, 0).unwrap()
}

pub fn new_store<'a, S: RecordStorage>(storage: S, profile: DeviceProfile) -> ConfigStore<'a, S> {
    ConfigStore::new(storage, profile, Defaults::from_build_env())
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TimerCall {
    Arm(TimerId, u32, bool),
    Disarm(TimerId),
}

/// Manually advanced timer facility.
#[derive(Default)]
pub struct TimerWheel {
    pub now: u64,
    armed: Vec<(TimerId, u64, Option<u32>)>,
    pub calls: Vec<TimerCall>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.armed.iter().any(|(id, ..)| *id == timer)
    }

    pub fn deadline(&self, timer: TimerId) -> Option<u64> {
        self.armed
            .iter()
            .find(|(id, ..)| *id == timer)
            .map(|(_, deadline, _)| *deadline)
    }

    /// Removes and returns the earliest timer due at or before `until`, moving `now` to its
    /// deadline. Repeating timers are re-armed for their next period.
    pub fn pop_due(&mut self, until: u64) -> Option<TimerId> {
        let (index, _) = self
            .armed
            .iter()
            .enumerate()
            .filter(|(_, (_, deadline, _))| *deadline <= until)
            .min_by_key(|(_, (_, deadline, _))| *deadline)?;

        let (id, deadline, period) = self.armed[index];
        self.now = self.now.max(deadline);
        match period {
            Some(period) => self.armed[index].1 = deadline + period.max(1) as u64,
            None => {
                self.armed.remove(index);
            }
        }
        Some(id)
    }

    /// Moves time forward by `ms` and returns every expiry on the way, in order.
    pub fn advance(&mut self, ms: u64) -> Vec<TimerId> {
        let until = self.now + ms;
        let mut expired = Vec::new();
        while let Some(id) = self.pop_due(until) {
            expired.push(id);
        }
        self.now = until;
        expired
    }
}

impl Timers for TimerWheel {
    fn arm(&mut self, timer: TimerId, delay_ms: u32, repeat: bool) {
        self.calls.push(TimerCall::Arm(timer, delay_ms, repeat));
        self.armed.retain(|(id, ..)| *id != timer);
        self.armed.push((
            timer,
            self.now + delay_ms as u64,
            repeat.then_some(delay_ms),
        ));
    }

    fn disarm(&mut self, timer: TimerId) {
        self.calls.push(TimerCall::Disarm(timer));
        self.armed.retain(|(id, ..)| *id != timer);
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum RadioCall {
    SetMode(OpMode, ConfigScope),
    AutoConnect(bool),
    SetConfig(StationConfig, ConfigScope),
    Connect,
    Disconnect,
    StartScan,
    StopScan,
}

#[derive(Debug)]
pub struct RadioError;

pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub status: LinkStatus,
    pub rssi: i8,
    pub config: StationConfig,
    pub fail_scan_start: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            status: LinkStatus::Idle,
            rssi: -60,
            config: StationConfig::default(),
            fail_scan_start: false,
        }
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn scans_started(&self) -> usize {
        self.count(&RadioCall::StartScan)
    }

    pub fn connects(&self) -> usize {
        self.count(&RadioCall::Connect)
    }
}

impl Radio for MockRadio {
    type Error = RadioError;

    fn set_mode(&mut self, mode: OpMode, scope: ConfigScope) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::SetMode(mode, scope));
        Ok(())
    }

    fn set_auto_connect(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::AutoConnect(enabled));
        Ok(())
    }

    fn station_config(&mut self) -> Result<StationConfig, Self::Error> {
        Ok(self.config.clone())
    }

    fn set_station_config(
        &mut self,
        config: &StationConfig,
        scope: ConfigScope,
    ) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::SetConfig(config.clone(), scope));
        self.config = config.clone();
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::Connect);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::Disconnect);
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::StartScan);
        if self.fail_scan_start {
            return Err(RadioError);
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::StopScan);
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        self.status
    }

    fn rssi(&mut self) -> i8 {
        self.rssi
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum IndicatorCall {
    Enter(Pattern),
    Exit,
}

#[derive(Default)]
pub struct Indicator {
    pub calls: Vec<IndicatorCall>,
}

impl StatusIndicator for Indicator {
    fn enter_pattern(&mut self, pattern: Pattern) {
        self.calls.push(IndicatorCall::Enter(pattern));
    }

    fn exit_pattern(&mut self) {
        self.calls.push(IndicatorCall::Exit);
    }
}
