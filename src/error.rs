//! Library-wide error type.
//!
//! Every failure the engine can produce is one variant of [`ZpaqError`].
//! Errors are surfaced to the caller of the compress / decompress entry
//! points; nothing is retried internally. A [`CorruptStream`] is fatal for
//! its segment, but the caller may scan forward to the next locator tag and
//! resume at block granularity.
//!
//! [`CorruptStream`]: ZpaqError::CorruptStream

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZpaqError>;

/// All error conditions defined by the ZPAQ level 2 format plus I/O failure.
#[derive(Error, Debug)]
pub enum ZpaqError {
    /// The block header is malformed: unknown component type, out-of-range
    /// size bits, a component referring to a later component, a bad MIX
    /// input count, or a missing terminator byte.
    #[error("invalid block header: {0}")]
    HeaderInvalid(&'static str),

    /// The ZPAQL program executed an undefined opcode, or a long jump left
    /// the program bounds.
    #[error("ZPAQL execution error: {0}")]
    VmInvalidInstruction(&'static str),

    /// An arithmetic-coder invariant was violated, the end-of-stream marker
    /// was coded with pending range bytes, or the input ended mid-byte.
    #[error("archive corrupted: {0}")]
    CorruptStream(&'static str),

    /// The SHA-1 of a segment's post-processed output disagrees with the
    /// checksum stored in its trailer.
    #[error("segment checksum mismatch")]
    ChecksumMismatch {
        /// The 20-byte digest stored in the segment trailer.
        expected: [u8; 20],
        /// The digest computed over the decoded output.
        computed: [u8; 20],
    },

    /// The post-processor loader saw a type byte outside {0, 1}, or the
    /// embedded program ended prematurely.
    #[error("bad post-processor stream: {0}")]
    PostProcessorProtocol(&'static str),

    /// The block announced a level outside {1, 2} or a block type other
    /// than 1.
    #[error("unsupported block level or type ({level})")]
    UnsupportedLevel {
        /// The offending level or type byte.
        level: u8,
    },

    /// The underlying reader or writer failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
