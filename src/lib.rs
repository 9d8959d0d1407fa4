#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod config;
pub mod crc;
mod deferred;
pub mod device;
pub mod error;
pub mod platform;
pub mod radio;
pub mod record;
pub mod storage;
mod store;
pub mod timer;
pub mod wifi;

pub use deferred::DeferredSave;
pub use store::{ConfigStore, LoadOutcome, PulseCounter};

use crate::error::Error;
use core::fmt;

/// Fixed width, NUL padded text field as laid out in the persisted record.
///
/// At most `N - 1` bytes of text are kept so the field always ends with a NUL byte, the same
/// way `snprintf` into a fixed buffer truncates.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    /// Longest text that fits, excluding the terminating NUL.
    pub const CAPACITY: usize = N - 1;

    pub const fn empty() -> Self {
        Self([0u8; N])
    }

    /// Copies `s` into the field, cutting it at `N - 1` bytes. The cut never splits a UTF-8
    /// sequence.
    ///
    /// Tip: use a const context for build time defaults:
    ///   `const SSID: FixedStr<64> = FixedStr::truncated("my-network");`
    pub const fn truncated(s: &str) -> Self {
        let src = s.as_bytes();
        let mut end = if src.len() > Self::CAPACITY {
            Self::CAPACITY
        } else {
            src.len()
        };
        // back off continuation bytes so the kept prefix stays valid UTF-8
        while end < src.len() && end > 0 && (src[end] & 0xC0) == 0x80 {
            end -= 1;
        }

        let mut dst = [0u8; N];
        let mut i = 0;
        while i < end {
            dst[i] = src[i];
            i += 1;
        }
        Self(dst)
    }

    /// Copies `s` into the field, rejecting text that would have to be cut.
    pub fn try_from_str(s: &str) -> Result<Self, Error> {
        if s.len() > Self::CAPACITY {
            return Err(Error::ValueTooLong);
        }
        Ok(Self::truncated(s))
    }

    /// Wraps raw bytes read from storage.
    pub const fn from_bytes(raw: [u8; N]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Text up to the first NUL byte. Bytes that are not valid UTF-8 end the text early.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        match core::str::from_utf8(&self.0[..end]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.0[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedStr(b\"")?;

        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        for &byte in &self.0[..end] {
            // escape_default would escape 0 as \x00, but \0 is more readable
            if byte == 0 {
                write!(f, "\\0")?;
                continue;
            }

            write!(f, "{}", core::ascii::escape_default(byte))?;
        }

        write!(f, "\")")
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for FixedStr<N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str());
    }
}

impl<const N: usize> AsRef<[u8]> for FixedStr<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
