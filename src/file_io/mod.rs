//! Positional byte-stream access to storage.
//!
//! Every layer of a resolved chain is exposed to the layer above it as a [`FileIO`]: a read-only
//! byte source with a size and positional reads. Handles are shared through the resolver cache,
//! so a [`FileIO`] carries no cursor of its own. Callers that want `std::io::Read + Seek`
//! semantics use a [`FileObject`], which owns its position and a lease on the cached handle.
//!
//! # Key Components
//!
//! - [`FileIO`] - The byte-stream contract implemented by every back-end
//! - [`FileObject`] - A cursor over a cached [`FileIO`]
//! - [`Memory`] - A stream backed by an in-memory buffer
//! - [`OsFile`] - A memory-mapped file of the host operating system
//! - [`RangedFile`] - A window into another stream (partitions, archive members)
//! - [`TransformedStream`] - A lazily decoded, decompressed or decrypted view of another stream

mod memory;
mod object;
mod os;
mod range;
mod transform;

pub use memory::Memory;
pub use object::FileObject;
pub use os::OsFile;
pub use range::RangedFile;
pub use transform::{StreamTransform, TransformedStream};

use std::fmt;

use crate::{Error::OutOfBounds, Result};

/// Read-only, positional access to a byte stream.
///
/// Implementations must be safe to share between threads; a read never changes observable
/// state other than internal caches.
pub trait FileIO: Send + Sync + fmt::Debug {
    /// Total number of bytes in the stream.
    ///
    /// # Errors
    /// Returns an error if the size cannot be determined, for example because a lazy
    /// transformation fails or the handle was closed.
    fn size(&self) -> Result<u64>;

    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is `0` at or past the end of the stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotOpen`] after [`FileIO::close`], or the error of the
    /// underlying storage.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Releases the resources held by the stream.
    ///
    /// Called by the resolver cache once the last lease on the handle is released.
    ///
    /// # Errors
    /// Returns an error if releasing a held parent handle fails.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Fills `buf` completely from `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream ends before `buf` is full.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let read = self.read_at(offset, buf)?;
            if read == 0 {
                return Err(OutOfBounds);
            }
            offset += read as u64;
            buf = &mut buf[read..];
        }
        Ok(())
    }

    /// Reads exactly `len` bytes from `offset` into a new buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream ends early.
    fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads the whole stream into memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream does not fit the address space.
    fn read_all(&self) -> Result<Vec<u8>> {
        let Ok(size) = usize::try_from(self.size()?) else {
            return Err(OutOfBounds);
        };
        self.read_vec(0, size)
    }
}

/// Copies the bytes of `data` starting at `offset` into `buf`, clamped to the end of `data`.
pub(crate) fn copy_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }

    let count = buf.len().min(data.len() - start);
    buf[..count].copy_from_slice(&data[start..start + count]);
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_clamps_to_end() {
        let data = b"0123456789";
        let mut buf = [0u8; 4];

        assert_eq!(copy_at(data, 0, &mut buf), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(copy_at(data, 8, &mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(copy_at(data, 10, &mut buf), 0);
        assert_eq!(copy_at(data, u64::MAX, &mut buf), 0);
    }

    #[test]
    fn default_read_helpers() {
        let memory = Memory::new(b"forensics".to_vec());

        assert_eq!(memory.read_vec(3, 3).unwrap(), b"ens");
        assert_eq!(memory.read_all().unwrap(), b"forensics");
        assert!(matches!(memory.read_vec(5, 10), Err(OutOfBounds)));

        let mut buf = [0u8; 2];
        memory.read_exact_at(7, &mut buf).unwrap();
        assert_eq!(&buf, b"cs");
    }
}
