//! Shared helpers for the unit tests: image builders and instrumented stubs.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use uguid::{guid, Guid};

use crate::{
    file_io::{copy_at, FileIO},
    formats::{
        cpio::CpioFormat,
        partition::{PartitionAnalyzer, PartitionInfo, PartitionKind},
    },
    Result,
};

pub(crate) const LINUX_FILESYSTEM_GUID: Guid = guid!("0fc63daf-8483-4772-8e79-3d69d8477de4");

/// An in-memory stream that counts reads and closes.
#[derive(Debug)]
pub(crate) struct CountingFile {
    data: Vec<u8>,
    pub reads: AtomicUsize,
    pub closes: AtomicUsize,
}

impl CountingFile {
    pub(crate) fn new(data: Vec<u8>) -> CountingFile {
        CountingFile {
            data,
            reads: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl FileIO for CountingFile {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(copy_at(&self.data, offset, buf))
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A partition analyzer returning a fixed list and recording the sources it was shown.
#[derive(Debug, Default)]
pub(crate) struct StubAnalyzer {
    partitions: Vec<PartitionInfo>,
    pub calls: AtomicUsize,
    pub seen_sizes: Mutex<Vec<u64>>,
}

impl StubAnalyzer {
    pub(crate) fn new(partitions: Vec<PartitionInfo>) -> Arc<StubAnalyzer> {
        Arc::new(StubAnalyzer {
            partitions,
            ..StubAnalyzer::default()
        })
    }

    /// Helper function to describe an MBR partition of `size` bytes at `offset`
    pub(crate) fn partition(index: u32, offset: u64, size: u64) -> PartitionInfo {
        PartitionInfo {
            index,
            offset,
            size,
            identifier: format!("stub-{index}"),
            kind: PartitionKind::Mbr { type_code: 0x83 },
        }
    }
}

impl PartitionAnalyzer for StubAnalyzer {
    fn analyze(&self, source: &dyn FileIO, _sector_size: u64) -> Result<Vec<PartitionInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_sizes.lock().unwrap().push(source.size()?);
        Ok(self.partitions.clone())
    }
}

/// Header values of one member written by [`CpioBuilder`].
#[derive(Debug, Clone)]
pub(crate) struct CpioEntrySpec {
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u32,
    pub inode: u32,
    pub data: Vec<u8>,
}

impl CpioEntrySpec {
    pub(crate) fn new(name: &str, mode: u32, data: &[u8]) -> CpioEntrySpec {
        CpioEntrySpec {
            name: name.to_string(),
            mode,
            uid: 1000,
            gid: 1000,
            mtime: 1_700_000_000,
            inode: 0,
            data: data.to_vec(),
        }
    }
}

/// Writes CPIO archives in any of the supported header variants.
pub(crate) struct CpioBuilder {
    format: CpioFormat,
    entries: Vec<CpioEntrySpec>,
}

impl CpioBuilder {
    pub(crate) fn new(format: CpioFormat) -> CpioBuilder {
        CpioBuilder {
            format,
            entries: Vec::new(),
        }
    }

    pub(crate) fn directory(self, name: &str) -> CpioBuilder {
        self.entry(CpioEntrySpec::new(name, 0o040755, &[]))
    }

    pub(crate) fn file(self, name: &str, data: &[u8]) -> CpioBuilder {
        self.entry(CpioEntrySpec::new(name, 0o100644, data))
    }

    pub(crate) fn symlink(self, name: &str, target: &str) -> CpioBuilder {
        self.entry(CpioEntrySpec::new(name, 0o120777, target.as_bytes()))
    }

    pub(crate) fn entry(mut self, mut entry: CpioEntrySpec) -> CpioBuilder {
        if entry.inode == 0 {
            entry.inode = self.entries.len() as u32 + 1;
        }
        self.entries.push(entry);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            self.write_entry(&mut out, entry);
        }
        self.write_entry(&mut out, &CpioEntrySpec::new("TRAILER!!!", 0, &[]));
        out
    }

    fn write_entry(&self, out: &mut Vec<u8>, entry: &CpioEntrySpec) {
        let name_size = entry.name.len() as u32 + 1;
        let file_size = entry.data.len() as u32;
        let alignment = match self.format {
            CpioFormat::NewAscii | CpioFormat::NewAsciiCrc => 4,
            CpioFormat::PortableAscii => 1,
            CpioFormat::BinaryLittleEndian | CpioFormat::BinaryBigEndian => 2,
        };

        match self.format {
            CpioFormat::NewAscii | CpioFormat::NewAsciiCrc => {
                let magic = if self.format == CpioFormat::NewAscii {
                    "070701"
                } else {
                    "070702"
                };
                let checksum: u32 = if self.format == CpioFormat::NewAsciiCrc {
                    entry.data.iter().map(|b| u32::from(*b)).sum()
                } else {
                    0
                };
                let header = format!(
                    "{magic}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
                    entry.inode,
                    entry.mode,
                    entry.uid,
                    entry.gid,
                    1,
                    entry.mtime,
                    file_size,
                    0,
                    0,
                    0,
                    0,
                    name_size,
                    checksum
                );
                out.extend_from_slice(header.as_bytes());
            }
            CpioFormat::PortableAscii => {
                let header = format!(
                    "070707{:06o}{:06o}{:06o}{:06o}{:06o}{:06o}{:06o}{:011o}{:06o}{:011o}",
                    0,
                    entry.inode & 0o777777,
                    entry.mode,
                    entry.uid,
                    entry.gid,
                    1,
                    0,
                    entry.mtime,
                    name_size,
                    file_size
                );
                out.extend_from_slice(header.as_bytes());
            }
            CpioFormat::BinaryLittleEndian | CpioFormat::BinaryBigEndian => {
                let words: [u16; 13] = [
                    0o070707,
                    0,
                    entry.inode as u16,
                    entry.mode as u16,
                    entry.uid as u16,
                    entry.gid as u16,
                    1,
                    0,
                    (entry.mtime >> 16) as u16,
                    entry.mtime as u16,
                    name_size as u16,
                    (file_size >> 16) as u16,
                    file_size as u16,
                ];
                for word in words {
                    if self.format == CpioFormat::BinaryLittleEndian {
                        out.extend_from_slice(&word.to_le_bytes());
                    } else {
                        out.extend_from_slice(&word.to_be_bytes());
                    }
                }
            }
        }

        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        pad(out, alignment);
        out.extend_from_slice(&entry.data);
        pad(out, alignment);
    }
}

fn pad(out: &mut Vec<u8>, alignment: usize) {
    while out.len() % alignment != 0 {
        out.push(0);
    }
}

fn write_mbr_entry(sector: &mut [u8], slot: usize, type_code: u8, start_lba: u32, sectors: u32) {
    let offset = 446 + slot * 16;
    sector[offset + 4] = type_code;
    sector[offset + 8..offset + 12].copy_from_slice(&start_lba.to_le_bytes());
    sector[offset + 12..offset + 16].copy_from_slice(&sectors.to_le_bytes());
}

/// Writes disk images with an MBR partition table and optional extended partition chain.
pub(crate) struct MbrBuilder {
    signature: u32,
    primaries: Vec<(u8, u32, u32)>,
    extended: Option<(u32, Vec<(u8, u32)>)>,
}

impl MbrBuilder {
    pub(crate) fn new(signature: u32) -> MbrBuilder {
        MbrBuilder {
            signature,
            primaries: Vec::new(),
            extended: None,
        }
    }

    pub(crate) fn primary(mut self, type_code: u8, start_lba: u32, sectors: u32) -> MbrBuilder {
        self.primaries.push((type_code, start_lba, sectors));
        self
    }

    /// Adds an extended partition at `start_lba` holding one logical partition per
    /// `(type_code, sectors)`, each preceded by its EBR.
    pub(crate) fn extended(mut self, start_lba: u32, logical: &[(u8, u32)]) -> MbrBuilder {
        self.extended = Some((start_lba, logical.to_vec()));
        self
    }

    /// Builds an image of `total_sectors` 512-byte sectors.
    pub(crate) fn build(&self, total_sectors: usize) -> Vec<u8> {
        let mut disk = vec![0u8; total_sectors * 512];
        disk[440..444].copy_from_slice(&self.signature.to_le_bytes());
        disk[510] = 0x55;
        disk[511] = 0xAA;

        let mut slot = 0;
        for (type_code, start, sectors) in &self.primaries {
            write_mbr_entry(&mut disk[..512], slot, *type_code, *start, *sectors);
            slot += 1;
        }

        if let Some((extended_start, logical)) = &self.extended {
            let total: u32 = logical.iter().map(|(_, sectors)| sectors + 1).sum();
            write_mbr_entry(&mut disk[..512], slot, 0x05, *extended_start, total);

            let mut ebr = *extended_start;
            for (position, (type_code, sectors)) in logical.iter().enumerate() {
                let base = ebr as usize * 512;
                let sector = &mut disk[base..base + 512];
                sector[510] = 0x55;
                sector[511] = 0xAA;
                write_mbr_entry(sector, 0, *type_code, 1, *sectors);

                let next = ebr + 1 + sectors;
                if position + 1 < logical.len() {
                    let (_, next_sectors) = logical[position + 1];
                    write_mbr_entry(sector, 1, 0x05, next - extended_start, next_sectors + 1);
                }
                ebr = next;
            }
        }
        disk
    }
}

/// Writes disk images with a protective MBR and a GUID partition table.
pub(crate) struct GptBuilder {
    partitions: Vec<(Guid, u64, u64, String)>,
}

impl GptBuilder {
    pub(crate) fn new() -> GptBuilder {
        GptBuilder {
            partitions: Vec::new(),
        }
    }

    pub(crate) fn partition(
        mut self,
        type_guid: Guid,
        first_lba: u64,
        last_lba: u64,
        name: &str,
    ) -> GptBuilder {
        self.partitions
            .push((type_guid, first_lba, last_lba, name.to_string()));
        self
    }

    /// Builds an image large enough for every partition, with 512-byte sectors.
    pub(crate) fn build(&self, sector_size: usize) -> Vec<u8> {
        let last = self
            .partitions
            .iter()
            .map(|(_, _, last, _)| *last as usize)
            .max()
            .unwrap_or(64);
        let mut disk = vec![0u8; (last + 2) * sector_size];

        write_mbr_entry(&mut disk[..512], 0, 0xEE, 1, (last + 1) as u32);
        disk[510] = 0x55;
        disk[511] = 0xAA;

        let header = &mut disk[sector_size..sector_size + 92];
        header[0..8].copy_from_slice(b"EFI PART");
        header[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
        header[12..16].copy_from_slice(&92u32.to_le_bytes());
        header[24..32].copy_from_slice(&1u64.to_le_bytes());
        header[72..80].copy_from_slice(&2u64.to_le_bytes());
        header[80..84].copy_from_slice(&(self.partitions.len() as u32).to_le_bytes());
        header[84..88].copy_from_slice(&128u32.to_le_bytes());

        for (slot, (type_guid, first, last, name)) in self.partitions.iter().enumerate() {
            let offset = 2 * sector_size + slot * 128;
            let entry = &mut disk[offset..offset + 128];
            entry[0..16].copy_from_slice(&type_guid.to_bytes());

            let mut unique = [0u8; 16];
            unique[0] = slot as u8 + 1;
            unique[15] = 0xA5;
            entry[16..32].copy_from_slice(&unique);

            entry[32..40].copy_from_slice(&first.to_le_bytes());
            entry[40..48].copy_from_slice(&last.to_le_bytes());
            for (index, unit) in name.encode_utf16().take(36).enumerate() {
                entry[56 + index * 2..58 + index * 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
        disk
    }
}
