//! ZPAQ level 2 — a context-mixing compression library and archiver.
//!
//! The archive format is self-describing: every block's header carries the
//! model configuration and the context-computation program that drove its
//! compression, so any conforming decoder can decompress any conforming
//! archive. Around the core engine sit an optional post-processing stage
//! (itself a program executed during decompression), block/segment framing
//! with SHA-1 segment checksums, and a locator tag that makes blocks
//! findable inside arbitrary byte streams.
//!
//! # One-shot use
//!
//! ```no_run
//! let data = b"hello, hello, hello";
//! let mut archive = Vec::new();
//! zpaq::compress(&mut zpaq::SliceReader::new(data), &mut archive, 2).unwrap();
//! let mut restored = Vec::new();
//! zpaq::decompress(&mut zpaq::SliceReader::new(&archive), &mut restored).unwrap();
//! assert_eq!(restored, data);
//! ```
//!
//! # Streaming use
//!
//! [`Compressor`] and [`Decompresser`] expose the block/segment structure
//! directly: multiple segments per block share one model, multiple blocks
//! are independent (and decodable in parallel by separate readers).

pub mod cli;
pub mod error;
pub mod frame;
pub mod io;
pub mod models;

mod array;
mod coder;
mod model;
mod state_table;
mod tables;
mod vm;

pub use error::{Result, ZpaqError};
pub use frame::{Compressor, Decompresser, LOCATOR_TAG, MAGIC};
pub use io::{ByteReader, ByteWriter, CountingWriter, IoReader, IoWriter, NullWriter, SliceReader};
pub use vm::{Vm, VmInput};

use sha1::{Digest, Sha1};

/// Format level written on new blocks; levels 1 and 2 are read.
pub const ZPAQ_LEVEL: u8 = frame::compressor::WRITE_LEVEL;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compress `input` into a single-block, single-segment archive at the
/// given level (0 = store, 1..=3 = fast/mid/max). The segment trailer
/// carries the SHA-1 of the input.
pub fn compress<R, W>(input: &mut R, output: &mut W, level: u8) -> Result<()>
where
    R: ByteReader + ?Sized,
    W: ByteWriter,
{
    let mut c = Compressor::new(output);
    c.start_block_level(level)?;
    c.start_segment("", "")?;
    c.post_process(None)?;
    let mut hasher = Sha1::new();
    while let Some(byte) = input.get()? {
        hasher.update([byte]);
        c.compress_byte(byte)?;
    }
    let digest: [u8; 20] = hasher.finalize().into();
    c.end_segment(Some(&digest))?;
    c.end_block()
}

/// Decompress every segment of every block in `input` into `output`,
/// verifying stored checksums.
pub fn decompress<R, W>(input: &mut R, output: &mut W) -> Result<()>
where
    R: ByteReader,
    W: ByteWriter,
{
    let mut d = Decompresser::new(input);
    while d.find_block()? {
        while d.find_filename()?.is_some() {
            d.read_comment()?;
            d.decompress_segment(output)?;
            d.read_segment_end()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_roundtrip_all_levels() {
        let data = b"abracadabra abracadabra abracadabra".repeat(20);
        for level in 0..=3u8 {
            let mut archive = Vec::new();
            compress(&mut SliceReader::new(&data), &mut archive, level).unwrap();
            let mut restored = Vec::new();
            decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
            assert_eq!(restored, data, "level {level}");
        }
    }

    #[test]
    fn rejects_bad_level() {
        let mut out = Vec::new();
        assert!(compress(&mut SliceReader::new(b"x"), &mut out, 4).is_err());
    }
}
