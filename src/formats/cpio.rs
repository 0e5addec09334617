//! CPIO archive index parsing.
//!
//! Supported header variants:
//!
//! | Format             | Magic      | Header | Fields        | Alignment |
//! |--------------------|------------|--------|---------------|-----------|
//! | New ASCII (`newc`) | `070701`   | 110    | 8 hex digits  | 4         |
//! | New ASCII with CRC | `070702`   | 110    | 8 hex digits  | 4         |
//! | Portable ASCII     | `070707`   | 76     | octal digits  | 1         |
//! | Old binary         | `0x71c7`   | 26     | 16-bit words  | 2         |
//!
//! Parsing walks the headers from the start of the archive until the `TRAILER!!!` entry.
//! Only the index is kept in memory; member data stays in the source stream and is located
//! through [`CpioEntry::data_offset`].

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use strum::Display;

use super::io::{read_be_at, read_le_at};
use crate::{
    file_io::FileIO,
    vfs::{normalize_location, FileEntryKind},
    Error, Result,
};

const TRAILER: &str = "TRAILER!!!";
const MAX_NAME_SIZE: u64 = 4096;
const MAX_LINK_TARGET: u64 = 4096;

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// The header variant of a CPIO archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CpioFormat {
    /// SVR4 portable format without checksum (`070701`)
    #[strum(serialize = "newc")]
    NewAscii,
    /// SVR4 portable format with checksum (`070702`)
    #[strum(serialize = "crc")]
    NewAsciiCrc,
    /// POSIX.1 portable format (`070707`)
    #[strum(serialize = "odc")]
    PortableAscii,
    /// Old binary format written on a little-endian host
    #[strum(serialize = "bin-le")]
    BinaryLittleEndian,
    /// Old binary format written on a big-endian host
    #[strum(serialize = "bin-be")]
    BinaryBigEndian,
}

impl CpioFormat {
    /// Detects the format from the first bytes of a header.
    #[must_use]
    pub fn detect(magic: &[u8]) -> Option<CpioFormat> {
        match magic {
            [b'0', b'7', b'0', b'7', b'0', b'1', ..] => Some(CpioFormat::NewAscii),
            [b'0', b'7', b'0', b'7', b'0', b'2', ..] => Some(CpioFormat::NewAsciiCrc),
            [b'0', b'7', b'0', b'7', b'0', b'7', ..] => Some(CpioFormat::PortableAscii),
            [0xc7, 0x71, ..] => Some(CpioFormat::BinaryLittleEndian),
            [0x71, 0xc7, ..] => Some(CpioFormat::BinaryBigEndian),
            _ => None,
        }
    }

    /// Size of a header in bytes, excluding the name.
    #[must_use]
    pub fn header_size(self) -> u64 {
        match self {
            CpioFormat::NewAscii | CpioFormat::NewAsciiCrc => 110,
            CpioFormat::PortableAscii => 76,
            CpioFormat::BinaryLittleEndian | CpioFormat::BinaryBigEndian => 26,
        }
    }

    fn alignment(self) -> u64 {
        match self {
            CpioFormat::NewAscii | CpioFormat::NewAsciiCrc => 4,
            CpioFormat::PortableAscii => 1,
            CpioFormat::BinaryLittleEndian | CpioFormat::BinaryBigEndian => 2,
        }
    }

    fn align(self, offset: u64) -> Option<u64> {
        let alignment = self.alignment();
        offset
            .checked_add(alignment - 1)
            .map(|end| end / alignment * alignment)
    }

    fn parse_header(self, header: &[u8]) -> Result<CpioHeader> {
        match self {
            CpioFormat::NewAscii | CpioFormat::NewAsciiCrc => Ok(CpioHeader {
                inode: ascii_field(header, 6, 8, 16)?,
                mode: ascii_field(header, 14, 8, 16)? as u32,
                uid: ascii_field(header, 22, 8, 16)? as u32,
                gid: ascii_field(header, 30, 8, 16)? as u32,
                mtime: ascii_field(header, 46, 8, 16)?,
                file_size: ascii_field(header, 54, 8, 16)?,
                name_size: ascii_field(header, 94, 8, 16)?,
            }),
            CpioFormat::PortableAscii => Ok(CpioHeader {
                inode: ascii_field(header, 12, 6, 8)?,
                mode: ascii_field(header, 18, 6, 8)? as u32,
                uid: ascii_field(header, 24, 6, 8)? as u32,
                gid: ascii_field(header, 30, 6, 8)? as u32,
                mtime: ascii_field(header, 48, 11, 8)?,
                name_size: ascii_field(header, 59, 6, 8)?,
                file_size: ascii_field(header, 65, 11, 8)?,
            }),
            CpioFormat::BinaryLittleEndian | CpioFormat::BinaryBigEndian => {
                let read = |offset: &mut usize| -> Result<u16> {
                    if self == CpioFormat::BinaryLittleEndian {
                        read_le_at::<u16>(header, offset)
                    } else {
                        read_be_at::<u16>(header, offset)
                    }
                };

                let mut offset = 4;
                let inode = read(&mut offset)?;
                let mode = read(&mut offset)?;
                let uid = read(&mut offset)?;
                let gid = read(&mut offset)?;
                offset += 4; // nlink, rdev
                let mtime_high = read(&mut offset)?;
                let mtime_low = read(&mut offset)?;
                let name_size = read(&mut offset)?;
                let size_high = read(&mut offset)?;
                let size_low = read(&mut offset)?;

                Ok(CpioHeader {
                    inode: u64::from(inode),
                    mode: u32::from(mode),
                    uid: u32::from(uid),
                    gid: u32::from(gid),
                    mtime: (u64::from(mtime_high) << 16) | u64::from(mtime_low),
                    file_size: (u64::from(size_high) << 16) | u64::from(size_low),
                    name_size: u64::from(name_size),
                })
            }
        }
    }
}

fn ascii_field(header: &[u8], offset: usize, len: usize, radix: u32) -> Result<u64> {
    let Some(field) = header.get(offset..offset + len) else {
        return Err(Error::OutOfBounds);
    };
    let text = std::str::from_utf8(field)
        .map_err(|_| malformed_error!("non-ASCII header field at offset {}", offset))?;
    u64::from_str_radix(text, radix)
        .map_err(|_| malformed_error!("invalid header field '{}' at offset {}", text, offset))
}

struct CpioHeader {
    inode: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    mtime: u64,
    file_size: u64,
    name_size: u64,
}

bitflags! {
    /// Permission bits of a CPIO entry mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpioPermissions: u32 {
        /// Set user ID on execution
        const SETUID = 0o4000;
        /// Set group ID on execution
        const SETGID = 0o2000;
        /// Restricted deletion
        const STICKY = 0o1000;
        /// Owner may read
        const OWNER_READ = 0o400;
        /// Owner may write
        const OWNER_WRITE = 0o200;
        /// Owner may execute
        const OWNER_EXECUTE = 0o100;
        /// Group may read
        const GROUP_READ = 0o040;
        /// Group may write
        const GROUP_WRITE = 0o020;
        /// Group may execute
        const GROUP_EXECUTE = 0o010;
        /// Others may read
        const OTHER_READ = 0o004;
        /// Others may write
        const OTHER_WRITE = 0o002;
        /// Others may execute
        const OTHER_EXECUTE = 0o001;
    }
}

/// One member of a CPIO archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioEntry {
    /// Normalized absolute location (`/a/b`)
    pub path: String,
    /// Offset of the member data in the archive
    pub data_offset: u64,
    /// Size of the member data
    pub size: u64,
    /// Raw mode: file type and permission bits
    pub mode: u32,
    /// Owner user ID
    pub uid: u32,
    /// Owner group ID
    pub gid: u32,
    /// Modification time in seconds since the epoch
    pub mtime: u64,
    /// Inode number
    pub inode: u64,
    /// Target of a symbolic link
    pub link_target: Option<String>,
}

impl CpioEntry {
    /// The node kind encoded in the mode.
    #[must_use]
    pub fn kind(&self) -> FileEntryKind {
        match self.mode & S_IFMT {
            S_IFDIR => FileEntryKind::Directory,
            S_IFLNK => FileEntryKind::Link,
            S_IFBLK | S_IFCHR => FileEntryKind::Device,
            S_IFIFO => FileEntryKind::Pipe,
            S_IFSOCK => FileEntryKind::Socket,
            S_IFREG => FileEntryKind::File,
            _ => FileEntryKind::File,
        }
    }

    /// The permission bits of the mode.
    #[must_use]
    pub fn permissions(&self) -> CpioPermissions {
        CpioPermissions::from_bits_truncate(self.mode)
    }
}

/// The parsed index of a CPIO archive.
#[derive(Debug, Clone)]
pub struct CpioArchive {
    format: CpioFormat,
    entries: BTreeMap<String, CpioEntry>,
    directories: BTreeSet<String>,
}

impl CpioArchive {
    /// Parses the archive index stored in `source`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown magic, a damaged header, a member
    /// extending past the end of the source, or an archive without trailer.
    pub fn parse(source: &dyn FileIO) -> Result<CpioArchive> {
        let size = source.size()?;
        let mut magic = [0u8; 6];
        if source.read_at(0, &mut magic)? < 2 {
            return Err(malformed_error!("too small for a CPIO header"));
        }
        let Some(format) = CpioFormat::detect(&magic) else {
            return Err(malformed_error!("unknown CPIO magic {:02x?}", magic));
        };

        let mut archive = CpioArchive {
            format,
            entries: BTreeMap::new(),
            directories: BTreeSet::from(["/".to_string()]),
        };

        let mut offset = 0u64;
        loop {
            let header_size = format.header_size();
            let header = read_checked(source, offset, header_size, size)?;
            if CpioFormat::detect(&header) != Some(format) {
                return Err(malformed_error!("bad header magic at offset {}", offset));
            }
            let header = format.parse_header(&header)?;

            if header.name_size == 0 || header.name_size > MAX_NAME_SIZE {
                return Err(malformed_error!(
                    "invalid name size {} at offset {}",
                    header.name_size,
                    offset
                ));
            }
            let name_offset = offset + header_size;
            let name = read_checked(source, name_offset, header.name_size, size)?;
            let name = String::from_utf8_lossy(&name)
                .trim_end_matches('\0')
                .to_string();

            let data_offset = format
                .align(name_offset + header.name_size)
                .ok_or(Error::OutOfBounds)?;
            if name == TRAILER {
                break;
            }

            let data_end = data_offset
                .checked_add(header.file_size)
                .filter(|end| *end <= size)
                .ok_or_else(|| malformed_error!("member '{}' extends past the archive", name))?;

            let link_target = if header.mode & S_IFMT == S_IFLNK
                && header.file_size <= MAX_LINK_TARGET
            {
                let target = read_checked(source, data_offset, header.file_size, size)?;
                Some(String::from_utf8_lossy(&target).into_owned())
            } else {
                None
            };

            archive.insert(CpioEntry {
                path: normalize_location(&name),
                data_offset,
                size: header.file_size,
                mode: header.mode,
                uid: header.uid,
                gid: header.gid,
                mtime: header.mtime,
                inode: header.inode,
                link_target,
            });

            offset = format.align(data_end).ok_or(Error::OutOfBounds)?;
        }

        Ok(archive)
    }

    fn insert(&mut self, entry: CpioEntry) {
        if entry.path == "/" {
            return;
        }

        let mut parent = String::new();
        let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            parent.push('/');
            parent.push_str(segment);
            self.directories.insert(parent.clone());
        }
        if entry.kind() == FileEntryKind::Directory {
            self.directories.insert(entry.path.clone());
        }
        self.entries.insert(entry.path.clone(), entry);
    }

    /// The header variant of the archive.
    #[must_use]
    pub fn format(&self) -> CpioFormat {
        self.format
    }

    /// The stored members keyed by normalized location, in location order.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, CpioEntry> {
        &self.entries
    }

    /// The stored member at `location`, if any.
    #[must_use]
    pub fn get(&self, location: &str) -> Option<&CpioEntry> {
        self.entries.get(location)
    }

    /// Returns `true` if `location` is a stored or implied directory.
    #[must_use]
    pub fn is_directory(&self, location: &str) -> bool {
        self.directories.contains(location)
    }

    /// Returns `true` if `location` names a member or a directory.
    #[must_use]
    pub fn contains(&self, location: &str) -> bool {
        self.entries.contains_key(location) || self.directories.contains(location)
    }

    /// Locations directly below `directory`, in order.
    #[must_use]
    pub fn children(&self, directory: &str) -> Vec<&str> {
        let prefix = if directory == "/" {
            "/".to_string()
        } else {
            format!("{directory}/")
        };
        let is_child = |location: &&String| {
            location
                .strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        };

        let children: BTreeSet<&str> = self
            .entries
            .keys()
            .filter(is_child)
            .chain(self.directories.iter().filter(is_child))
            .map(String::as_str)
            .collect();
        children.into_iter().collect()
    }

    /// Number of stored members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_checked(source: &dyn FileIO, offset: u64, len: u64, size: u64) -> Result<Vec<u8>> {
    let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
    if end > size {
        return Err(malformed_error!(
            "truncated archive: {} bytes needed at offset {}",
            len,
            offset
        ));
    }
    let len = usize::try_from(len).map_err(|_| Error::OutOfBounds)?;
    source.read_vec(offset, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file_io::Memory,
        test::{CpioBuilder, CpioEntrySpec},
    };

    fn sample(format: CpioFormat) -> Vec<u8> {
        CpioBuilder::new(format)
            .directory("./var")
            .file("./var/log/syslog", b"Jan  1 00:00:00 host kernel: boot")
            .symlink("current", "var/log/syslog")
            .build()
    }

    #[test]
    fn parse_all_formats() {
        for format in [
            CpioFormat::NewAscii,
            CpioFormat::NewAsciiCrc,
            CpioFormat::PortableAscii,
            CpioFormat::BinaryLittleEndian,
            CpioFormat::BinaryBigEndian,
        ] {
            let data = sample(format);
            let archive = CpioArchive::parse(&Memory::new(data.clone())).unwrap();
            assert_eq!(archive.format(), format);
            assert_eq!(archive.len(), 3, "{format}");

            let syslog = archive.get("/var/log/syslog").unwrap();
            assert_eq!(syslog.kind(), FileEntryKind::File);
            let start = syslog.data_offset as usize;
            assert_eq!(
                &data[start..start + syslog.size as usize],
                b"Jan  1 00:00:00 host kernel: boot"
            );

            let link = archive.get("/current").unwrap();
            assert_eq!(link.kind(), FileEntryKind::Link);
            assert_eq!(link.link_target.as_deref(), Some("var/log/syslog"));
        }
    }

    #[test]
    fn implied_directories() {
        let archive = CpioArchive::parse(&Memory::new(sample(CpioFormat::NewAscii))).unwrap();

        assert!(archive.is_directory("/var"));
        assert!(archive.is_directory("/var/log"));
        assert!(archive.get("/var/log").is_none());
        assert!(archive.contains("/var/log"));
        assert_eq!(archive.children("/"), vec!["/current", "/var"]);
        assert_eq!(archive.children("/var"), vec!["/var/log"]);
        assert_eq!(archive.children("/var/log"), vec!["/var/log/syslog"]);
    }

    #[test]
    fn metadata() {
        let data = CpioBuilder::new(CpioFormat::NewAscii)
            .entry(CpioEntrySpec {
                name: "bin/tool".to_string(),
                mode: 0o104755,
                uid: 1000,
                gid: 100,
                mtime: 1_700_000_000,
                inode: 42,
                data: b"#!/bin/sh".to_vec(),
            })
            .build();
        let archive = CpioArchive::parse(&Memory::new(data)).unwrap();
        let tool = archive.get("/bin/tool").unwrap();

        assert_eq!(tool.uid, 1000);
        assert_eq!(tool.gid, 100);
        assert_eq!(tool.mtime, 1_700_000_000);
        assert_eq!(tool.inode, 42);
        assert!(tool.permissions().contains(CpioPermissions::SETUID));
        assert!(tool.permissions().contains(CpioPermissions::OWNER_EXECUTE));
        assert!(!tool.permissions().contains(CpioPermissions::GROUP_WRITE));
    }

    #[test]
    fn rejects_garbage() {
        let result = CpioArchive::parse(&Memory::new(b"PK\x03\x04 not a cpio".to_vec()));
        assert!(matches!(result, Err(Error::Malformed { .. })));

        let result = CpioArchive::parse(&Memory::new(Vec::new()));
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn rejects_truncation() {
        let data = sample(CpioFormat::NewAscii);
        for cut in [50, 120, data.len() - 20] {
            let result = CpioArchive::parse(&Memory::new(data[..cut].to_vec()));
            assert!(
                matches!(result, Err(Error::Malformed { .. })),
                "cut at {cut}: {result:?}"
            );
        }
    }

    #[test]
    fn stops_at_trailer() {
        let mut data = sample(CpioFormat::PortableAscii);
        data.extend_from_slice(&[0xAB; 512]);
        let archive = CpioArchive::parse(&Memory::new(data)).unwrap();
        assert_eq!(archive.len(), 3);
    }
}
