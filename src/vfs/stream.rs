//! Single-entry file systems over transformed streams.
//!
//! Encoded, compressed and encrypted streams have no internal structure. Their file system
//! consists of one root entry of kind [`FileEntryKind::Stream`] whose data is the transformed
//! parent stream. Nothing is decoded until the entry's stream is first read.

use std::sync::{Arc, Weak};

use super::{normalize_location, FileEntry, FileEntryKind, FileSystem};
use crate::{
    file_io::{FileIO, StreamTransform, TransformedStream},
    path::{PathSpec, TypeIndicator},
    resolver::{HeldLease, Lease},
    Error, Result,
};

/// The file system of an encoded, compressed or encrypted stream.
#[derive(Debug)]
pub struct StreamFileSystem {
    me: Weak<StreamFileSystem>,
    identity: PathSpec,
    transform: StreamTransform,
    limit: u64,
    parent: HeldLease<dyn FileIO>,
}

impl StreamFileSystem {
    /// Wraps `parent` with `transform`.
    ///
    /// ## Arguments
    /// * 'identity' - The path specification of the stream
    /// * 'parent' - Lease on the stream holding the transformed bytes
    /// * 'transform' - The transformation to apply on read
    /// * 'limit' - The maximum accepted size of the transformed output
    #[must_use]
    pub fn new(
        identity: PathSpec,
        parent: Lease<dyn FileIO>,
        transform: StreamTransform,
        limit: u64,
    ) -> Arc<StreamFileSystem> {
        Arc::new_cyclic(|me| StreamFileSystem {
            me: me.clone(),
            identity,
            transform,
            limit,
            parent: HeldLease::new(parent),
        })
    }

    /// The transformation applied to the parent stream.
    #[must_use]
    pub fn transform(&self) -> &StreamTransform {
        &self.transform
    }

    fn is_root_location(location: Option<&str>) -> bool {
        location.map_or(true, |location| normalize_location(location) == "/")
    }
}

impl FileSystem for StreamFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        self.identity.type_indicator()
    }

    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>> {
        if !Self::is_root_location(path_spec.location()) {
            return Ok(None);
        }
        self.get_root_file_entry()
    }

    fn get_root_file_entry(&self) -> Result<Option<FileEntry>> {
        Ok(Some(
            FileEntry::new(
                self.me.clone(),
                self.identity.clone(),
                "",
                FileEntryKind::Stream,
            )
            .with_root(),
        ))
    }

    fn sub_file_entries(&self, _entry: &FileEntry) -> Result<Vec<FileEntry>> {
        Ok(Vec::new())
    }

    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>> {
        if !Self::is_root_location(path_spec.location()) {
            return Err(Error::NotFound(
                path_spec.location().unwrap_or_default().to_string(),
            ));
        }

        let source = self.parent.handle().ok_or(Error::FileSystemClosed)?;
        Ok(Arc::new(TransformedStream::new(
            source,
            self.transform.clone(),
            self.limit,
        )))
    }

    fn close(&self) -> Result<()> {
        self.parent.release()
    }
}
