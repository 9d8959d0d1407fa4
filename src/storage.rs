//! Durable homes for the configuration record.
//!
//! [`SimpleStorage`] keeps a single copy and relies on the storage primitive for power loss
//! protection. [`RedundantStorage`] is for raw media without such protection: it alternates
//! between two banks and commits a write by flipping a separate flag slot afterwards.

use crate::error::Error;
use crate::platform::{AlignedOps, Platform, ProtectedStorage};
use crate::record::RECORD_SIZE;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Backend the persistence engine reads and writes whole record images through.
pub trait RecordStorage {
    fn read_record(&mut self, buf: &mut [u8; RECORD_SIZE]) -> Result<(), Error>;

    fn write_record(&mut self, buf: &[u8; RECORD_SIZE]) -> Result<(), Error>;
}

impl<T: RecordStorage> RecordStorage for &mut T {
    fn read_record(&mut self, buf: &mut [u8; RECORD_SIZE]) -> Result<(), Error> {
        T::read_record(self, buf)
    }

    fn write_record(&mut self, buf: &[u8; RECORD_SIZE]) -> Result<(), Error> {
        T::write_record(self, buf)
    }
}

/// Single copy in a protected area.
pub struct SimpleStorage<S: ProtectedStorage> {
    inner: S,
}

impl<S: ProtectedStorage> SimpleStorage<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ProtectedStorage> RecordStorage for SimpleStorage<S> {
    fn read_record(&mut self, buf: &mut [u8; RECORD_SIZE]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("simple: load [{}]", RECORD_SIZE);

        self.inner.load(buf).map_err(|_e| {
            #[cfg(feature = "debug-logs")]
            println!("  SimpleStorage: load failed: {_e:?}");
            Error::FlashError
        })
    }

    fn write_record(&mut self, buf: &[u8; RECORD_SIZE]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("simple: save_with_protect [{}]", RECORD_SIZE);

        self.inner.save_with_protect(buf).map_err(|_e| {
            #[cfg(feature = "debug-logs")]
            println!("  SimpleStorage: save failed: {_e:?}");
            Error::FlashError
        })
    }
}

/// One of the two record banks of the redundant layout.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bank {
    A,
    B,
}

impl Bank {
    pub fn other(self) -> Bank {
        match self {
            Bank::A => Bank::B,
            Bank::B => Bank::A,
        }
    }

    fn slot(self) -> u32 {
        match self {
            Bank::A => 0,
            Bank::B => 1,
        }
    }
}

const FLAG_SLOT: u32 = 2;
const SAVE_FLAG_SIZE: usize = 4;
/// Largest read/write granularity the flag and trailer buffers accommodate.
const MAX_ACCESS_SIZE: usize = 32;

/// Marker naming the bank that holds the committed record. Zero selects bank A, anything else
/// (including erased flash) bank B.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SaveFlag(pub u32);

impl SaveFlag {
    pub fn pointing_at(bank: Bank) -> Self {
        match bank {
            Bank::A => SaveFlag(0),
            Bank::B => SaveFlag(1),
        }
    }

    pub fn live_bank(self) -> Bank {
        if self.0 == 0 { Bank::A } else { Bank::B }
    }
}

/// Two record banks plus a flag slot, each rounded up to whole erase sectors, starting at
/// `base`:
///
/// ```text
/// base + 0 * slot: bank A
/// base + 1 * slot: bank B
/// base + 2 * slot: save flag
/// ```
pub struct RedundantStorage<F: Platform> {
    flash: F,
    base: u32,
    slot_size: u32,
}

impl<F: Platform> RedundantStorage<F> {
    pub fn new(flash: F, base: u32) -> Result<Self, Error> {
        if !(base as usize).is_multiple_of(F::ERASE_SIZE)
            || !RECORD_SIZE.is_multiple_of(F::READ_SIZE)
            || !RECORD_SIZE.is_multiple_of(F::WRITE_SIZE)
            || F::READ_SIZE > MAX_ACCESS_SIZE
            || F::WRITE_SIZE > MAX_ACCESS_SIZE
        {
            return Err(Error::UnalignedRecord);
        }

        let slot_size = F::align_erase_ceil(RECORD_SIZE);
        if (base as usize).saturating_add(3 * slot_size) > flash.capacity() {
            return Err(Error::SlotTooSmall);
        }

        Ok(Self {
            flash,
            base,
            slot_size: slot_size as u32,
        })
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn bank_address(&self, bank: Bank) -> u32 {
        self.base + bank.slot() * self.slot_size
    }

    pub fn flag_address(&self) -> u32 {
        self.base + FLAG_SLOT * self.slot_size
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    pub fn read_flag(&mut self) -> Result<SaveFlag, Error> {
        let mut buf = [0u8; MAX_ACCESS_SIZE];
        let len = F::align_read(SAVE_FLAG_SIZE);
        self.flash
            .read(self.flag_address(), &mut buf[..len])
            .map_err(|_| Error::FlashError)?;

        Ok(SaveFlag(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])))
    }

    fn write_flag(&mut self, flag: SaveFlag) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("redundant: commit {}", flag.live_bank());

        #[cfg(feature = "debug-logs")]
        println!("  RedundantStorage: commit bank {}", flag.live_bank());

        let address = self.flag_address();
        self.erase_slot(address)?;

        let mut buf = [0xFFu8; MAX_ACCESS_SIZE];
        buf[..SAVE_FLAG_SIZE].copy_from_slice(&flag.0.to_le_bytes());
        let len = F::align_write_ceil(SAVE_FLAG_SIZE);
        self.flash
            .write(address, &buf[..len])
            .map_err(|_| Error::FlashError)
    }

    fn erase_slot(&mut self, address: u32) -> Result<(), Error> {
        self.flash
            .erase(address, address + self.slot_size)
            .map_err(|_| Error::FlashError)
    }
}

impl<F: Platform> RecordStorage for RedundantStorage<F> {
    fn read_record(&mut self, buf: &mut [u8; RECORD_SIZE]) -> Result<(), Error> {
        let bank = self.read_flag()?.live_bank();

        #[cfg(feature = "defmt")]
        trace!("redundant: load bank {}", bank);

        self.flash
            .read(self.bank_address(bank), buf)
            .map_err(|_| Error::FlashError)
    }

    /// Writes into the bank the flag does not point at, then flips the flag. A power loss
    /// before the flag lands leaves the previous record committed.
    fn write_record(&mut self, buf: &[u8; RECORD_SIZE]) -> Result<(), Error> {
        let target = self.read_flag()?.live_bank().other();

        #[cfg(feature = "defmt")]
        trace!("redundant: save to bank {}", target);

        #[cfg(feature = "debug-logs")]
        println!("  RedundantStorage: save to bank {target}");

        let address = self.bank_address(target);
        self.erase_slot(address)?;
        self.flash.write(address, buf).map_err(|_e| {
            #[cfg(feature = "defmt")]
            warn!("redundant: data write to bank {} failed", target);
            Error::FlashError
        })?;

        self.write_flag(SaveFlag::pointing_at(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_selects_bank_a() {
        assert_eq!(SaveFlag(0).live_bank(), Bank::A);
        assert_eq!(SaveFlag(1).live_bank(), Bank::B);
        assert_eq!(SaveFlag(0xFFFF_FFFF).live_bank(), Bank::B);
        assert_eq!(SaveFlag(0x0000_0100).live_bank(), Bank::B);
    }

    #[test]
    fn flag_round_trips_bank() {
        for bank in [Bank::A, Bank::B] {
            assert_eq!(SaveFlag::pointing_at(bank).live_bank(), bank);
            assert_ne!(bank.other(), bank);
        }
    }
}
