//! Memory-mapped files of the host operating system.
//!
//! [`OsFile`] maps a file read-only into the address space of the process. Only the pages that
//! are actually read get loaded, which keeps opening a multi-gigabyte disk image cheap. The
//! mapping is dropped on [`FileIO::close`]; reads after that fail with
//! [`crate::Error::NotOpen`].

use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use memmap2::Mmap;

use super::{copy_at, FileIO};
use crate::{
    Error::{self, FileError, NotOpen},
    Result,
};

/// A read-only, memory-mapped file of the host file system.
///
/// # Examples
///
/// ```rust,no_run
/// use vfscope::{FileIO, OsFile};
///
/// let image = OsFile::open("/cases/0042/disk.raw")?;
/// let mut boot_sector = [0u8; 512];
/// image.read_exact_at(0, &mut boot_sector)?;
/// assert_eq!(&boot_sector[510..], &[0x55, 0xAA]);
/// # Ok::<(), vfscope::Error>(())
/// ```
#[derive(Debug)]
pub struct OsFile {
    path: PathBuf,
    data: RwLock<Option<Mmap>>,
}

impl OsFile {
    /// Opens and maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, or
    /// [`crate::Error::Error`] if it is not a regular file or mapping fails.
    pub fn open(path: impl AsRef<Path>) -> Result<OsFile> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(FileError)?;

        if !file.metadata().map_err(FileError)?.is_file() {
            return Err(Error::Error(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        // Safety: the mapping is read-only; evidence files are not expected to change while
        // they are being analysed.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|error| Error::Error(error.to_string()))?;

        Ok(OsFile {
            path: path.to_path_buf(),
            data: RwLock::new(Some(mmap)),
        })
    }

    /// The host path this file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileIO for OsFile {
    fn size(&self) -> Result<u64> {
        let data = read_lock!(self.data);
        match data.as_ref() {
            Some(mmap) => Ok(mmap.len() as u64),
            None => Err(NotOpen),
        }
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let data = read_lock!(self.data);
        match data.as_ref() {
            Some(mmap) => Ok(copy_at(mmap, offset, buf)),
            None => Err(NotOpen),
        }
    }

    fn close(&self) -> Result<()> {
        *write_lock!(self.data) = None;
        Ok(())
    }
}
