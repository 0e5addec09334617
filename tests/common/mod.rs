//! Evidence image builders shared by the integration tests.

#![allow(dead_code)]

use std::io::Write;

use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use flate2::{write::GzEncoder, Compression};

/// Writes a `newc` CPIO archive holding `members` as `(name, mode, data)`.
pub fn newc_archive(members: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let trailer: (&str, u32, &[u8]) = ("TRAILER!!!", 0, &[]);

    for (inode, (name, mode, data)) in members.iter().chain([&trailer]).enumerate() {
        let header = format!(
            "070701{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
            inode + 1,
            mode,
            0,
            0,
            1,
            1_700_000_000u32,
            data.len(),
            0,
            0,
            0,
            0,
            name.len() + 1,
            0
        );
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        pad4(&mut out);
        out.extend_from_slice(data);
        pad4(&mut out);
    }
    out
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Regular file mode for [`newc_archive`].
pub const FILE: u32 = 0o100644;

/// Directory mode for [`newc_archive`].
pub const DIRECTORY: u32 = 0o040755;

/// Writes an MBR disk image of `total_sectors` 512-byte sectors.
///
/// Each partition is `(type_code, start_lba, content)`; its size is the content rounded up to
/// whole sectors.
pub fn mbr_disk(partitions: &[(u8, u32, &[u8])], total_sectors: usize) -> Vec<u8> {
    let mut disk = vec![0u8; total_sectors * 512];
    disk[440..444].copy_from_slice(&0xC0FF_EE00u32.to_le_bytes());
    disk[510] = 0x55;
    disk[511] = 0xAA;

    for (slot, (type_code, start, content)) in partitions.iter().enumerate() {
        let sectors = content.len().div_ceil(512) as u32;
        let entry = 446 + slot * 16;
        disk[entry + 4] = *type_code;
        disk[entry + 8..entry + 12].copy_from_slice(&start.to_le_bytes());
        disk[entry + 12..entry + 16].copy_from_slice(&sectors.to_le_bytes());

        let offset = *start as usize * 512;
        disk[offset..offset + content.len()].copy_from_slice(content);
    }
    disk
}

/// Gzip compresses `data`.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Encrypts `plaintext` with AES-128-CBC; the input is zero padded to the block size.
pub fn aes128_cbc(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut data = plaintext.to_vec();
    data.resize(plaintext.len().div_ceil(16) * 16, 0);
    cbc::Encryptor::<aes::Aes128>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&data)
}
