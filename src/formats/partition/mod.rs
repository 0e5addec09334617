//! Partition table analysis.
//!
//! The partition back-end does not parse partition tables itself. It hands the disk image to a
//! [`PartitionAnalyzer`], which returns the list of partitions it found. The default analyzer,
//! [`PartitionTableAnalyzer`], understands GUID partition tables and MBR tables with extended
//! partition chains.
//!
//! ```rust
//! use vfscope::{Memory, PartitionAnalyzer, PartitionTableAnalyzer};
//!
//! // An empty disk has no partition table.
//! let disk = Memory::new(vec![0u8; 4096]);
//! assert!(PartitionTableAnalyzer.analyze(&disk, 512).is_err());
//! ```

mod gpt;
mod mbr;

use std::fmt;

use strum::Display;
use tracing::debug;
use uguid::Guid;

use crate::{file_io::FileIO, Result};

/// The table scheme a partition was found in, with its scheme-specific type.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum PartitionKind {
    /// A primary or logical MBR partition with its one-byte type code
    #[strum(to_string = "mbr")]
    Mbr {
        /// The partition type code (`0x83` Linux, `0x07` NTFS, ...)
        type_code: u8,
    },
    /// A GPT partition with its type GUID and name
    #[strum(to_string = "gpt")]
    Gpt {
        /// The partition type GUID
        type_guid: Guid,
        /// The UTF-16 partition name
        name: String,
    },
}

/// One partition found by a [`PartitionAnalyzer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// 1-based partition number, in table order
    pub index: u32,
    /// Byte offset of the partition in the disk image
    pub offset: u64,
    /// Size of the partition in bytes
    pub size: u64,
    /// Stable identifier: the unique partition GUID (GPT) or disk signature and offset (MBR)
    pub identifier: String,
    /// Scheme and type of the partition
    pub kind: PartitionKind,
}

/// Enumerates the partitions of a disk image.
pub trait PartitionAnalyzer: Send + Sync + fmt::Debug {
    /// Analyzes `source` and returns its partitions ordered by index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no supported partition table is found or the table
    /// is damaged.
    fn analyze(&self, source: &dyn FileIO, sector_size: u64) -> Result<Vec<PartitionInfo>>;
}

/// GPT first, MBR as fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionTableAnalyzer;

impl PartitionAnalyzer for PartitionTableAnalyzer {
    fn analyze(&self, source: &dyn FileIO, sector_size: u64) -> Result<Vec<PartitionInfo>> {
        if sector_size < 512 || !sector_size.is_power_of_two() {
            return Err(malformed_error!("unsupported sector size {}", sector_size));
        }

        if let Some(partitions) = gpt::parse(source, sector_size)? {
            debug!(partitions = partitions.len(), "found GUID partition table");
            return Ok(partitions);
        }

        let partitions = mbr::parse(source, sector_size)?;
        debug!(partitions = partitions.len(), "found MBR partition table");
        Ok(partitions)
    }
}
