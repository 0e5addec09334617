//! The virtual file system layer.
//!
//! A [`FileSystem`] is one opened container: a host directory tree, an archive, a partition
//! table or a transformed stream. File systems hand out [`FileEntry`] values describing their
//! nodes and byte streams ([`crate::FileIO`]) for entries with data.
//!
//! # Key Components
//!
//! - [`FileSystem`] - The contract every container back-end implements
//! - [`FileEntry`] / [`FileEntryKind`] - Lazily produced node handles
//! - [`OsFileSystem`] - The host operating system, with POSIX or Windows path rules
//! - [`FakeFileSystem`] / [`FakeVolume`] - An in-memory volume
//! - [`CpioFileSystem`] - Entries of a CPIO archive
//! - [`PartitionFileSystem`] - Partitions of a disk image
//! - [`StreamFileSystem`] - The single entry of an encoded, compressed or encrypted stream
//!
//! # Lookups never fail for missing entries
//!
//! [`FileSystem::file_entry_exists_by_path_spec`] returns `false` and
//! [`FileSystem::get_file_entry_by_path_spec`] returns `Ok(None)` for paths that do not exist.
//! Errors are reserved for damaged containers and closed handles.

mod cpio;
mod entry;
mod fake;
mod os;
mod partition;
mod stream;

pub use cpio::CpioFileSystem;
pub use entry::{FileEntry, FileEntryKind};
pub use fake::{FakeFileSystem, FakeVolume};
pub use os::OsFileSystem;
pub use partition::PartitionFileSystem;
pub use stream::StreamFileSystem;

use std::{fmt, sync::Arc};

use crate::{file_io::FileIO, path::PathSpec, path::TypeIndicator, Result};

/// An opened storage container.
///
/// Implementations are created by a [`crate::ResolverHelper`] and cached by the
/// [`crate::ResolverContext`]; they are shared between threads and only ever read.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// The format this file system implements.
    fn type_indicator(&self) -> TypeIndicator;

    /// The separator between path segments of entry locations.
    fn path_separator(&self) -> char {
        '/'
    }

    /// Looks up the entry addressed by `path_spec`.
    ///
    /// Returns `Ok(None)` if no such entry exists.
    ///
    /// # Errors
    /// Returns an error if the container cannot be read.
    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>>;

    /// Returns `true` if the entry addressed by `path_spec` exists.
    ///
    /// Never fails: unreadable containers report `false`.
    fn file_entry_exists_by_path_spec(&self, path_spec: &PathSpec) -> bool {
        matches!(self.get_file_entry_by_path_spec(path_spec), Ok(Some(_)))
    }

    /// The root entry of the file system.
    ///
    /// # Errors
    /// Returns an error if the container cannot be read.
    fn get_root_file_entry(&self) -> Result<Option<FileEntry>>;

    /// The entries directly below `entry`.
    ///
    /// # Errors
    /// Returns an error if the container cannot be read.
    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>>;

    /// The entry directly above `entry`, `None` for the root.
    ///
    /// # Errors
    /// Returns an error if the container cannot be read.
    fn parent_file_entry(&self, entry: &FileEntry) -> Result<Option<FileEntry>> {
        if entry.is_root() {
            return Ok(None);
        }
        let Some(location) = entry.path_spec().location() else {
            return self.get_root_file_entry();
        };

        let parent = entry
            .path_spec()
            .clone()
            .with_location(self.dirname(location));
        self.get_file_entry_by_path_spec(&parent)
    }

    /// Opens the byte stream of the entry addressed by `path_spec`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if the entry does not exist, or an error if it has no
    /// data (directories) or the container cannot be read.
    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>>;

    /// Releases the resources held by the file system.
    ///
    /// Called by the resolver cache once the last lease on the file system is released.
    ///
    /// # Errors
    /// Returns an error if releasing a held parent stream fails.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Joins path segments into a normalized, absolute location.
    ///
    /// Segments are split on the separator and empty segments are dropped, so
    /// `["/a//b/", "c"]` becomes `/a/b/c`.
    fn join_path(&self, segments: &[&str]) -> String {
        join_segments(self.path_separator(), segments)
    }

    /// Splits a location into its non-empty segments.
    fn split_path(&self, path: &str) -> Vec<String> {
        let separator = self.path_separator();
        path.split(separator)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The last segment of a location, empty for the root.
    fn basename(&self, path: &str) -> String {
        self.split_path(path).pop().unwrap_or_default()
    }

    /// The location of the directory containing `path`.
    fn dirname(&self, path: &str) -> String {
        let mut segments = self.split_path(path);
        segments.pop();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.join_path(&segments)
    }
}

/// Joins `segments` with `separator` into an absolute path without empty segments.
pub(crate) fn join_segments(separator: char, segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments
        .iter()
        .flat_map(|segment| segment.split(separator))
        .filter(|segment| !segment.is_empty())
    {
        path.push(separator);
        path.push_str(segment);
    }

    if path.is_empty() {
        path.push(separator);
    }
    path
}

/// Normalizes an archive or volume location to `/a/b` form.
///
/// Leading `./`, repeated separators and trailing separators are removed; `.` segments are
/// dropped. The root is `/`.
pub(crate) fn normalize_location(location: &str) -> String {
    let segments: Vec<&str> = location
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    join_segments('/', &segments)
}
