use thiserror::Error;

/// Errors surfaced by the persistence engine and the connectivity manager. Most conditions
/// (corrupt records, torn counter values, link loss) are recovered internally and never
/// reach the caller; what is left here is either a caller mistake or a hardware failure.
#[derive(Error, Debug, PartialEq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The storage primitive reported a failure. Once seen, the store stays faulted and
    /// keeps working on the in-memory record only.
    #[error("internal flash error")]
    FlashError,

    /// A storage slot cannot hold a full record.
    #[error("storage slot too small")]
    SlotTooSmall,

    /// Slot base or record size does not match the read/write granularity of the medium.
    #[error("record not aligned to storage granularity")]
    UnalignedRecord,

    /// The layout sentinel at the start of the record does not match.
    #[error("bad magic")]
    BadMagic,

    /// The stored CRC16 trailer does not match the record contents.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The record was written by a firmware image built for another device profile, or
    /// profile specific data was accessed on the wrong profile.
    #[error("device profile mismatch")]
    ProfileMismatch,

    /// A field holds a value no firmware version writes.
    #[error("invalid field value")]
    InvalidField,

    /// Text does not fit into the fixed width field.
    #[error("value too long")]
    ValueTooLong,

    /// The scheduled job table is full.
    #[error("too many scheduled jobs")]
    TooManyJobs,

    /// The radio rejected a request.
    #[error("radio error")]
    RadioError,
}
