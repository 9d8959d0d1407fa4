use embedded_storage::nor_flash::NorFlash;

/// Raw storage used by the redundant bank layout. Any `NorFlash` works; external FeRAM can be
/// exposed with a small `ERASE_SIZE` and an erase that simply fills with `0xFF`.
pub trait Platform: NorFlash {}

impl<T: NorFlash> Platform for T {}

/// Storage primitive that guarantees an all-or-nothing write to a fixed location, like the
/// vendor SDK's protected parameter area. Used by the single copy layout.
pub trait ProtectedStorage {
    type Error: core::fmt::Debug;

    /// Read `bytes.len()` bytes from the start of the protected area.
    fn load(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error>;

    /// Replace the protected area with `bytes`. A power loss during the call must leave either
    /// the old or the new contents readable.
    fn save_with_protect(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

impl<T: ProtectedStorage> ProtectedStorage for &mut T {
    type Error = T::Error;

    fn load(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        T::load(self, bytes)
    }

    fn save_with_protect(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        T::save_with_protect(self, bytes)
    }
}

/// Source of a stable, device unique integer. Read once to derive the default device id.
pub trait HardwareId {
    fn chip_id(&self) -> u32;
}

pub trait AlignedOps: Platform {
    fn align_read(size: usize) -> usize {
        align_ceil(size, Self::READ_SIZE)
    }

    fn align_write_ceil(size: usize) -> usize {
        align_ceil(size, Self::WRITE_SIZE)
    }

    fn align_erase_ceil(size: usize) -> usize {
        align_ceil(size, Self::ERASE_SIZE)
    }
}

#[inline(always)]
const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

impl<T: Platform> AlignedOps for T {}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
mod chip {
    use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
    use esp_storage::{FlashStorage, FlashStorageError};

    /// Internal SPI flash of the ESP32 family, used as raw bank storage.
    pub struct EspFlash<'d> {
        inner: FlashStorage<'d>,
    }

    impl<'d> EspFlash<'d> {
        pub fn new(inner: FlashStorage<'d>) -> Self {
            Self { inner }
        }
    }

    impl ErrorType for EspFlash<'_> {
        type Error = FlashStorageError;
    }

    impl NorFlash for EspFlash<'_> {
        const WRITE_SIZE: usize = FlashStorage::WRITE_SIZE;
        const ERASE_SIZE: usize = FlashStorage::ERASE_SIZE;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            self.inner.erase(from, to)
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            self.inner.write(offset, bytes)
        }
    }

    impl ReadNorFlash for EspFlash<'_> {
        const READ_SIZE: usize = FlashStorage::READ_SIZE;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            self.inner.read(offset, bytes)
        }

        fn capacity(&self) -> usize {
            self.inner.capacity()
        }
    }
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
pub use chip::*;
