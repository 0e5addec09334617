use std::sync::Arc;

use super::FileIO;
use crate::{Error::OutOfBounds, Result};

/// A contiguous window into another stream.
///
/// Used for partitions inside a disk image and member data inside an archive. Reads are clamped
/// to the window; a window that extends past the end of a truncated source simply returns fewer
/// bytes.
#[derive(Debug)]
pub struct RangedFile {
    source: Arc<dyn FileIO>,
    offset: u64,
    size: u64,
}

impl RangedFile {
    /// Creates a window of `size` bytes starting at `offset` in `source`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the end of the window overflows.
    pub fn new(source: Arc<dyn FileIO>, offset: u64, size: u64) -> Result<RangedFile> {
        if offset.checked_add(size).is_none() {
            return Err(OutOfBounds);
        }
        Ok(RangedFile {
            source,
            offset,
            size,
        })
    }

    /// Start of the window in the source stream.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl FileIO for RangedFile {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }

        let available = self.size - offset;
        let len = usize::try_from(available).map_or(buf.len(), |available| buf.len().min(available));
        self.source.read_at(self.offset + offset, &mut buf[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::Memory;

    #[test]
    fn window_reads() {
        let source: Arc<dyn FileIO> = Arc::new(Memory::new(b"headerPAYLOADtrailer".to_vec()));
        let range = RangedFile::new(source, 6, 7).unwrap();

        assert_eq!(range.size().unwrap(), 7);
        assert_eq!(range.offset(), 6);
        assert_eq!(range.read_all().unwrap(), b"PAYLOAD");

        let mut buf = [0u8; 16];
        assert_eq!(range.read_at(4, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"OAD");
        assert_eq!(range.read_at(7, &mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_source() {
        let source: Arc<dyn FileIO> = Arc::new(Memory::new(vec![1u8; 10]));
        let range = RangedFile::new(source, 8, 100).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(range.read_at(0, &mut buf).unwrap(), 2);
        assert!(matches!(range.read_vec(0, 4), Err(OutOfBounds)));
    }

    #[test]
    fn overflowing_window() {
        let source: Arc<dyn FileIO> = Arc::new(Memory::new(Vec::new()));
        assert!(matches!(
            RangedFile::new(source, u64::MAX, 2),
            Err(OutOfBounds)
        ));
    }
}
