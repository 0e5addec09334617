//! GUID partition tables.

use uguid::Guid;
use widestring::{U16CStr, U16Str};

use super::{PartitionInfo, PartitionKind};
use crate::{
    file_io::FileIO,
    formats::io::{read_le, read_le_at},
    Result,
};

const SIGNATURE: &[u8; 8] = b"EFI PART";
const HEADER_SIZE: usize = 92;
const MAX_ENTRIES: u32 = 1024;
const MIN_ENTRY_SIZE: u32 = 128;
const MAX_ENTRY_SIZE: u32 = 4096;
const NAME_OFFSET: usize = 56;
const NAME_UNITS: usize = 36;

fn utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    match U16CStr::from_slice_truncate(&units) {
        Ok(name) => name.to_string_lossy(),
        Err(_) => U16Str::from_slice(&units).to_string_lossy(),
    }
}

fn guid_at(data: &[u8], offset: usize) -> Result<Guid> {
    let Some(bytes) = data.get(offset..offset + 16) else {
        return Err(crate::Error::OutOfBounds);
    };
    let mut buffer = [0u8; 16];
    buffer.copy_from_slice(bytes);
    Ok(Guid::from_bytes(buffer))
}

/// Parses the GUID partition table of `source`.
///
/// Returns `Ok(None)` if the disk carries no GPT header, so the caller can fall back to MBR.
pub(super) fn parse(source: &dyn FileIO, sector_size: u64) -> Result<Option<Vec<PartitionInfo>>> {
    let mut signature = [0u8; 8];
    if source.read_at(sector_size, &mut signature)? < signature.len() || &signature != SIGNATURE {
        return Ok(None);
    }

    let header = source
        .read_vec(sector_size, HEADER_SIZE)
        .map_err(|_| malformed_error!("GPT header is truncated"))?;

    let entries_lba = read_le::<u64>(&header[72..])?;
    let entry_count = read_le::<u32>(&header[80..])?;
    let entry_size = read_le::<u32>(&header[84..])?;

    if entry_count > MAX_ENTRIES {
        return Err(malformed_error!("GPT declares {} entries", entry_count));
    }
    if !(MIN_ENTRY_SIZE..=MAX_ENTRY_SIZE).contains(&entry_size) {
        return Err(malformed_error!("invalid GPT entry size {}", entry_size));
    }

    let table_offset = entries_lba
        .checked_mul(sector_size)
        .ok_or_else(|| malformed_error!("GPT entry array LBA {} out of range", entries_lba))?;
    let table_len = entry_count as usize * entry_size as usize;
    let table = source
        .read_vec(table_offset, table_len)
        .map_err(|_| malformed_error!("GPT entry array is truncated"))?;

    let mut partitions = Vec::new();
    for (slot, entry) in table.chunks_exact(entry_size as usize).enumerate() {
        let type_guid = guid_at(entry, 0)?;
        if type_guid == Guid::ZERO {
            continue;
        }
        let unique_guid = guid_at(entry, 16)?;

        let mut offset = 32;
        let first_lba = read_le_at::<u64>(entry, &mut offset)?;
        let last_lba = read_le_at::<u64>(entry, &mut offset)?;
        if last_lba < first_lba {
            return Err(malformed_error!(
                "GPT entry {} ends before it starts",
                slot + 1
            ));
        }

        let partition_offset = first_lba
            .checked_mul(sector_size)
            .ok_or_else(|| malformed_error!("GPT entry {} out of range", slot + 1))?;
        let size = (last_lba - first_lba + 1)
            .checked_mul(sector_size)
            .ok_or_else(|| malformed_error!("GPT entry {} out of range", slot + 1))?;

        partitions.push(PartitionInfo {
            index: partitions.len() as u32 + 1,
            offset: partition_offset,
            size,
            identifier: unique_guid.to_string(),
            kind: PartitionKind::Gpt {
                type_guid,
                name: utf16_name(&entry[NAME_OFFSET..NAME_OFFSET + NAME_UNITS * 2]),
            },
        });
    }

    Ok(Some(partitions))
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;
    use crate::{
        file_io::Memory,
        test::{GptBuilder, LINUX_FILESYSTEM_GUID},
        Error,
    };

    #[test]
    fn parses_entries() {
        let disk = GptBuilder::new()
            .partition(LINUX_FILESYSTEM_GUID, 34, 133, "root")
            .partition(LINUX_FILESYSTEM_GUID, 200, 263, "a name that fills all thirty-six u16")
            .build(512);
        let partitions = parse(&Memory::new(disk), 512).unwrap().unwrap();

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].index, 1);
        assert_eq!(partitions[0].offset, 34 * 512);
        assert_eq!(partitions[0].size, 100 * 512);
        assert_eq!(
            partitions[0].kind,
            PartitionKind::Gpt {
                type_guid: guid!("0fc63daf-8483-4772-8e79-3d69d8477de4"),
                name: "root".to_string(),
            }
        );
        match &partitions[1].kind {
            PartitionKind::Gpt { name, .. } => assert_eq!(name.chars().count(), 36),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_ne!(partitions[0].identifier, partitions[1].identifier);
    }

    #[test]
    fn absent_header() {
        assert!(parse(&Memory::new(vec![0u8; 2048]), 512).unwrap().is_none());
        assert!(parse(&Memory::new(vec![0u8; 10]), 512).unwrap().is_none());
    }

    #[test]
    fn rejects_hostile_counts() {
        let mut disk = GptBuilder::new()
            .partition(LINUX_FILESYSTEM_GUID, 34, 40, "x")
            .build(512);
        disk[512 + 80..512 + 84].copy_from_slice(&100_000u32.to_le_bytes());
        assert!(matches!(
            parse(&Memory::new(disk), 512),
            Err(Error::Malformed { .. })
        ));
    }
}
