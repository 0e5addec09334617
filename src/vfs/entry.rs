use std::sync::{Arc, Weak};

use strum::Display;

use super::FileSystem;
use crate::{file_io::FileIO, path::PathSpec, Error, Result};

/// The kind of node a [`FileEntry`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FileEntryKind {
    /// A regular file
    File,
    /// A directory
    Directory,
    /// A symbolic link
    Link,
    /// A character or block device
    Device,
    /// A named pipe
    Pipe,
    /// A socket
    Socket,
    /// A partition of a partitioned disk image
    Partition,
    /// The single stream exposed by an encoded, compressed or encrypted stream
    Stream,
}

/// A node inside a [`FileSystem`].
///
/// Entries are lightweight descriptions produced on demand by their file system. They refer back
/// to it through a weak link and never keep it alive; navigating from an entry whose file system
/// has been dropped fails with [`crate::Error::FileSystemClosed`].
#[derive(Debug, Clone)]
pub struct FileEntry {
    file_system: Weak<dyn FileSystem>,
    path_spec: PathSpec,
    name: String,
    is_root: bool,
    kind: FileEntryKind,
    size: Option<u64>,
}

impl FileEntry {
    /// Creates a non-root entry.
    #[must_use]
    pub fn new(
        file_system: Weak<dyn FileSystem>,
        path_spec: PathSpec,
        name: impl Into<String>,
        kind: FileEntryKind,
    ) -> FileEntry {
        FileEntry {
            file_system,
            path_spec,
            name: name.into(),
            is_root: false,
            kind,
            size: None,
        }
    }

    /// Marks this entry as the root of its file system.
    #[must_use]
    pub fn with_root(mut self) -> FileEntry {
        self.is_root = true;
        self
    }

    /// Sets the size of the entry's data.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> FileEntry {
        self.size = Some(size);
        self
    }

    /// The path specification addressing this entry.
    #[must_use]
    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    /// The entry name; empty for most roots.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the root entry of a file system.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// The node kind.
    #[must_use]
    pub fn kind(&self) -> FileEntryKind {
        self.kind
    }

    /// Returns `true` for directories.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == FileEntryKind::Directory
    }

    /// Returns `true` for entries with a byte stream (files, partitions, streams).
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(
            self.kind,
            FileEntryKind::File | FileEntryKind::Partition | FileEntryKind::Stream
        )
    }

    /// The size of the entry's data, if known.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// The owning file system.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileSystemClosed`] if the file system has been dropped.
    pub fn file_system(&self) -> Result<Arc<dyn FileSystem>> {
        self.file_system.upgrade().ok_or(Error::FileSystemClosed)
    }

    /// The parent entry, `None` for the root.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileSystemClosed`] if the file system has been dropped.
    pub fn parent(&self) -> Result<Option<FileEntry>> {
        self.file_system()?.parent_file_entry(self)
    }

    /// The entries directly below this one.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileSystemClosed`] if the file system has been dropped.
    pub fn sub_file_entries(&self) -> Result<Vec<FileEntry>> {
        self.file_system()?.sub_file_entries(self)
    }

    /// Opens the entry's data directly, bypassing the resolver cache.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileSystemClosed`] if the file system has been dropped, or the
    /// error of the file system for entries without data.
    pub fn open_stream(&self) -> Result<Arc<dyn FileIO>> {
        self.file_system()?.open_entry_stream(&self.path_spec)
    }
}
