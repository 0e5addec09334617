//! Parsers for the on-disk structures of container formats.
//!
//! The parsers read through the [`crate::FileIO`] contract and produce plain index data; the
//! corresponding [`crate::FileSystem`] implementations in [`crate::vfs`] turn that index into
//! entries and streams.
//!
//! - [`cpio`] - CPIO archive index (newc, crc, portable ASCII, old binary)
//! - [`partition`] - GPT and MBR partition tables behind the [`partition::PartitionAnalyzer`]
//!   collaborator trait

pub mod cpio;
pub(crate) mod io;
pub mod partition;
