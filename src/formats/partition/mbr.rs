//! Master boot record partition tables, including extended partition chains.

use std::collections::HashSet;

use super::{PartitionInfo, PartitionKind};
use crate::{
    file_io::FileIO,
    formats::io::{read_le, read_le_at},
    Result,
};

const BOOT_SIGNATURE: u16 = 0xAA55;
const TABLE_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;
const PROTECTIVE_GPT: u8 = 0xEE;
const MAX_LOGICAL_PARTITIONS: usize = 128;

struct MbrEntry {
    type_code: u8,
    start_lba: u64,
    sectors: u64,
}

impl MbrEntry {
    fn is_extended(&self) -> bool {
        matches!(self.type_code, 0x05 | 0x0F | 0x85)
    }
}

/// Reads the boot sector at `lba` and returns its four table slots and the disk signature.
fn read_table(source: &dyn FileIO, lba: u64, sector_size: u64) -> Result<(u32, Vec<MbrEntry>)> {
    let offset = lba
        .checked_mul(sector_size)
        .ok_or_else(|| malformed_error!("boot record LBA {} out of range", lba))?;
    let sector = source
        .read_vec(offset, 512)
        .map_err(|_| malformed_error!("boot record at LBA {} is truncated", lba))?;

    if read_le::<u16>(&sector[510..])? != BOOT_SIGNATURE {
        return Err(malformed_error!("missing boot signature at LBA {}", lba));
    }

    let signature = read_le::<u32>(&sector[440..])?;
    let mut entries = Vec::with_capacity(4);
    for slot in 0..4 {
        let mut offset = TABLE_OFFSET + slot * ENTRY_SIZE + 4;
        let type_code = read_le_at::<u8>(&sector, &mut offset)?;
        offset += 3;
        let start_lba = u64::from(read_le_at::<u32>(&sector, &mut offset)?);
        let sectors = u64::from(read_le_at::<u32>(&sector, &mut offset)?);
        entries.push(MbrEntry {
            type_code,
            start_lba,
            sectors,
        });
    }
    Ok((signature, entries))
}

fn partition(
    index: u32,
    signature: u32,
    type_code: u8,
    start_lba: u64,
    sectors: u64,
    sector_size: u64,
) -> Result<PartitionInfo> {
    let offset = start_lba
        .checked_mul(sector_size)
        .ok_or_else(|| malformed_error!("partition {} starts out of range", index))?;
    let size = sectors
        .checked_mul(sector_size)
        .ok_or_else(|| malformed_error!("partition {} size out of range", index))?;

    Ok(PartitionInfo {
        index,
        offset,
        size,
        identifier: format!("{signature:08x}-{offset:x}"),
        kind: PartitionKind::Mbr { type_code },
    })
}

/// Parses the MBR partition table of `source`.
///
/// Primary partitions are numbered first, in slot order, followed by the logical partitions of
/// the extended partition chain.
pub(super) fn parse(source: &dyn FileIO, sector_size: u64) -> Result<Vec<PartitionInfo>> {
    let (signature, primaries) = read_table(source, 0, sector_size)?;
    let mut partitions = Vec::new();
    let mut index = 0u32;
    let mut extended = None;

    for entry in &primaries {
        if entry.type_code == 0 || entry.sectors == 0 || entry.type_code == PROTECTIVE_GPT {
            continue;
        }
        if entry.is_extended() {
            extended.get_or_insert(entry.start_lba);
            continue;
        }
        index += 1;
        partitions.push(partition(
            index,
            signature,
            entry.type_code,
            entry.start_lba,
            entry.sectors,
            sector_size,
        )?);
    }

    if let Some(extended_start) = extended {
        let mut visited = HashSet::new();
        let mut ebr_lba = extended_start;

        while visited.insert(ebr_lba) {
            if visited.len() > MAX_LOGICAL_PARTITIONS {
                return Err(malformed_error!("extended partition chain is too long"));
            }

            let (_, entries) = read_table(source, ebr_lba, sector_size)?;
            let logical = &entries[0];
            if logical.type_code != 0 && logical.sectors != 0 {
                index += 1;
                partitions.push(partition(
                    index,
                    signature,
                    logical.type_code,
                    ebr_lba + logical.start_lba,
                    logical.sectors,
                    sector_size,
                )?);
            }

            let next = &entries[1];
            if !next.is_extended() || next.start_lba == 0 {
                break;
            }
            ebr_lba = extended_start + next.start_lba;
        }
    }

    if partitions.is_empty() {
        return Err(malformed_error!("MBR partition table has no partitions"));
    }
    Ok(partitions)
}
