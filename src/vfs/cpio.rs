//! The CPIO archive back-end.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::{normalize_location, FileEntry, FileEntryKind, FileSystem};
use crate::{
    file_io::{FileIO, RangedFile},
    formats::cpio::CpioArchive,
    path::{PathSpec, TypeIndicator},
    resolver::{HeldLease, Lease},
    Error, Result,
};

/// The members of a CPIO archive stored in a parent stream.
///
/// The archive index is parsed once when the file system is opened; member streams are windows
/// into the parent stream, which the file system keeps leased until it is closed.
#[derive(Debug)]
pub struct CpioFileSystem {
    me: Weak<CpioFileSystem>,
    identity: PathSpec,
    archive: CpioArchive,
    parent: HeldLease<dyn FileIO>,
}

impl CpioFileSystem {
    /// Parses the archive stored in `parent`.
    ///
    /// ## Arguments
    /// * 'identity' - The path specification of the archive, without entry location
    /// * 'parent' - Lease on the stream holding the archive
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the archive index cannot be parsed.
    pub fn open(identity: PathSpec, parent: Lease<dyn FileIO>) -> Result<Arc<CpioFileSystem>> {
        let archive = CpioArchive::parse(&*parent)?;
        debug!(
            format = %archive.format(),
            entries = archive.len(),
            "opened CPIO archive"
        );

        Ok(Arc::new_cyclic(|me| CpioFileSystem {
            me: me.clone(),
            identity,
            archive,
            parent: HeldLease::new(parent),
        }))
    }

    /// The parsed archive index.
    #[must_use]
    pub fn archive(&self) -> &CpioArchive {
        &self.archive
    }

    fn entry(&self, location: &str) -> Option<FileEntry> {
        let path_spec = self.identity.clone().with_location(location);
        if location == "/" {
            return Some(
                FileEntry::new(self.me.clone(), path_spec, "", FileEntryKind::Directory)
                    .with_root(),
            );
        }

        let name = self.basename(location);
        if let Some(member) = self.archive.get(location) {
            let kind = member.kind();
            let entry = FileEntry::new(self.me.clone(), path_spec, name, kind);
            return Some(if kind == FileEntryKind::Directory {
                entry
            } else {
                entry.with_size(member.size)
            });
        }

        self.archive
            .is_directory(location)
            .then(|| FileEntry::new(self.me.clone(), path_spec, name, FileEntryKind::Directory))
    }
}

impl FileSystem for CpioFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Cpio
    }

    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>> {
        let Some(location) = path_spec.location() else {
            return Ok(None);
        };
        Ok(self.entry(&normalize_location(location)))
    }

    fn get_root_file_entry(&self) -> Result<Option<FileEntry>> {
        Ok(self.entry("/"))
    }

    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        let Some(location) = entry.path_spec().location() else {
            return Ok(Vec::new());
        };
        let location = normalize_location(location);

        Ok(self
            .archive
            .children(&location)
            .into_iter()
            .filter_map(|child| self.entry(child))
            .collect())
    }

    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>> {
        let location = normalize_location(path_spec.location().unwrap_or_default());
        let Some(member) = self.archive.get(&location) else {
            if self.archive.is_directory(&location) {
                return Err(Error::Error(format!("{location} is a directory")));
            }
            return Err(Error::NotFound(location));
        };
        if member.kind() == FileEntryKind::Directory {
            return Err(Error::Error(format!("{location} is a directory")));
        }

        let source = self.parent.handle().ok_or(Error::FileSystemClosed)?;
        Ok(Arc::new(RangedFile::new(source, member.data_offset, member.size)?))
    }

    fn close(&self) -> Result<()> {
        self.parent.release()
    }
}
