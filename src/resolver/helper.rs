//! Format back-end plug-ins of the [`crate::Resolver`].
//!
//! A [`ResolverHelper`] knows how to build the [`FileSystem`] of one type indicator and how to
//! open the byte stream of an entry inside it. Helpers are registered with a resolver at
//! initialization time; [`crate::Resolver::with_default_helpers`] registers every helper below
//! except [`FakeResolverHelper`], which needs a volume.

use std::{fmt, sync::Arc};

use crate::{
    config::ResolverConfig,
    credentials::CredentialStore,
    file_io::{FileIO, StreamTransform},
    formats::partition::{PartitionAnalyzer, PartitionTableAnalyzer},
    path::{PathSpec, TypeIndicator},
    resolver::{HeldLease, Lease},
    vfs::{
        normalize_location, CpioFileSystem, FakeFileSystem, FakeVolume, FileSystem,
        OsFileSystem, PartitionFileSystem, StreamFileSystem,
    },
    Error, Result,
};

/// Constructs the file systems and entry streams of one type indicator.
pub trait ResolverHelper: Send + Sync + fmt::Debug {
    /// The type indicator this helper handles.
    fn type_indicator(&self) -> TypeIndicator;

    /// Builds the file system identified by `path_spec`.
    ///
    /// ## Arguments
    /// * 'path_spec' - The file system identity: the entry-addressing parts are already removed
    /// * 'parent' - Lease on the parent stream, `None` for root types
    /// * 'config' - The resolver configuration
    ///
    /// # Errors
    /// Returns [`crate::Error::PathSpec`] if a required parent or attribute is missing, or the
    /// error of the format parser.
    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>>;

    /// Opens the byte stream of the entry addressed by `path_spec` in `file_system`.
    ///
    /// The returned stream keeps the file system leased until it is closed.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if the entry does not exist, or an error if it has no
    /// data.
    fn new_file_object(
        &self,
        path_spec: &PathSpec,
        file_system: Lease<dyn FileSystem>,
    ) -> Result<Arc<dyn FileIO>> {
        let stream = file_system.open_entry_stream(path_spec)?;
        Ok(Arc::new(FileSystemStream::new(stream, file_system)))
    }

    /// The canonical form of the innermost node of `path_spec`.
    ///
    /// Every spelling of one entry must map to the same path specification. The parent chain is
    /// returned unchanged.
    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        path_spec.clone()
    }
}

/// Rewrites an archive location to its `/a/b` form.
fn normalized(path_spec: &PathSpec) -> PathSpec {
    match path_spec.location() {
        Some(location) => path_spec.clone().with_location(normalize_location(location)),
        None => path_spec.clone(),
    }
}

/// A stream has a single entry; a root location is dropped.
fn stream_root(path_spec: &PathSpec) -> PathSpec {
    match path_spec.location() {
        Some(location) if normalize_location(location) == "/" => path_spec.clone().without_location(),
        _ => path_spec.clone(),
    }
}

fn require_parent(
    type_indicator: TypeIndicator,
    parent: Option<Lease<dyn FileIO>>,
) -> Result<Lease<dyn FileIO>> {
    parent.ok_or_else(|| Error::PathSpec(format!("{type_indicator} requires a parent")))
}

/// An entry stream that keeps its file system cached while it is open.
#[derive(Debug)]
pub struct FileSystemStream {
    stream: Arc<dyn FileIO>,
    file_system: HeldLease<dyn FileSystem>,
}

impl FileSystemStream {
    /// Ties `stream` to a lease on the file system it was opened from.
    #[must_use]
    pub fn new(stream: Arc<dyn FileIO>, file_system: Lease<dyn FileSystem>) -> FileSystemStream {
        FileSystemStream {
            stream,
            file_system: HeldLease::new(file_system),
        }
    }
}

impl FileIO for FileSystemStream {
    fn size(&self) -> Result<u64> {
        self.stream.size()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.stream.read_at(offset, buf)
    }

    fn close(&self) -> Result<()> {
        let closed = self.stream.close();
        self.file_system.release()?;
        closed
    }
}

/// Host operating system files.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsResolverHelper;

impl ResolverHelper for OsResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn new_file_system(
        &self,
        _path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        if parent.is_some() {
            return Err(Error::PathSpec("OS cannot have a parent".to_string()));
        }
        Ok(OsFileSystem::new(config.path_style))
    }
}

/// In-memory volume files.
#[derive(Debug, Clone)]
pub struct FakeResolverHelper {
    volume: Arc<FakeVolume>,
}

impl FakeResolverHelper {
    /// Serves `FAKE` path specifications from `volume`.
    #[must_use]
    pub fn new(volume: FakeVolume) -> FakeResolverHelper {
        FakeResolverHelper {
            volume: Arc::new(volume),
        }
    }
}

impl ResolverHelper for FakeResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Fake
    }

    fn new_file_system(
        &self,
        _path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        _config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        if parent.is_some() {
            return Err(Error::PathSpec("FAKE cannot have a parent".to_string()));
        }
        Ok(FakeFileSystem::new(self.volume.clone()))
    }

    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        normalized(path_spec)
    }
}

/// CPIO archive members.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpioResolverHelper;

impl ResolverHelper for CpioResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Cpio
    }

    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        _config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        let parent = require_parent(TypeIndicator::Cpio, parent)?;
        Ok(CpioFileSystem::open(path_spec.clone(), parent)?)
    }

    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        normalized(path_spec)
    }
}

/// Base16, base32 and base64 encoded streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodedStreamResolverHelper;

impl ResolverHelper for EncodedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::EncodedStream
    }

    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        let parent = require_parent(TypeIndicator::EncodedStream, parent)?;
        let Some(method) = path_spec.attributes().encoding_method else {
            return Err(Error::PathSpec(
                "ENCODED_STREAM requires encoding_method".to_string(),
            ));
        };

        Ok(StreamFileSystem::new(
            path_spec.clone(),
            parent,
            StreamTransform::Decode(method),
            config.max_decoded_size,
        ))
    }

    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        stream_root(path_spec)
    }
}

/// Deflate, zlib and gzip compressed streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompressedStreamResolverHelper;

impl ResolverHelper for CompressedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::CompressedStream
    }

    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        let parent = require_parent(TypeIndicator::CompressedStream, parent)?;
        let Some(method) = path_spec.attributes().compression_method else {
            return Err(Error::PathSpec(
                "COMPRESSED_STREAM requires compression_method".to_string(),
            ));
        };

        Ok(StreamFileSystem::new(
            path_spec.clone(),
            parent,
            StreamTransform::Decompress(method),
            config.max_decoded_size,
        ))
    }

    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        stream_root(path_spec)
    }
}

/// AES-CBC encrypted streams, keyed through a [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct EncryptedStreamResolverHelper {
    credentials: Arc<dyn CredentialStore>,
}

impl EncryptedStreamResolverHelper {
    /// Looks up key material in `credentials`.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialStore>) -> EncryptedStreamResolverHelper {
        EncryptedStreamResolverHelper { credentials }
    }
}

impl ResolverHelper for EncryptedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::EncryptedStream
    }

    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        let parent = require_parent(TypeIndicator::EncryptedStream, parent)?;
        let Some(method) = path_spec.attributes().encryption_method else {
            return Err(Error::PathSpec(
                "ENCRYPTED_STREAM requires encryption_method".to_string(),
            ));
        };
        let Some(credentials) = self.credentials.credentials(path_spec) else {
            return Err(Error::CredentialsRequired(
                path_spec.comparable().trim_end().replace('\n', " | "),
            ));
        };

        Ok(StreamFileSystem::new(
            path_spec.clone(),
            parent,
            StreamTransform::Decrypt {
                method,
                key: credentials.key().to_vec(),
                iv: credentials.iv().to_vec(),
            },
            config.max_decoded_size,
        ))
    }

    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        stream_root(path_spec)
    }
}

/// Partitions of a disk image, enumerated by a [`PartitionAnalyzer`].
#[derive(Debug, Clone)]
pub struct PartitionResolverHelper {
    analyzer: Arc<dyn PartitionAnalyzer>,
}

impl Default for PartitionResolverHelper {
    fn default() -> Self {
        PartitionResolverHelper::new(Arc::new(PartitionTableAnalyzer))
    }
}

impl PartitionResolverHelper {
    /// Enumerates partitions with `analyzer`.
    #[must_use]
    pub fn new(analyzer: Arc<dyn PartitionAnalyzer>) -> PartitionResolverHelper {
        PartitionResolverHelper { analyzer }
    }
}

impl ResolverHelper for PartitionResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Partition
    }

    fn new_file_system(
        &self,
        path_spec: &PathSpec,
        parent: Option<Lease<dyn FileIO>>,
        config: &ResolverConfig,
    ) -> Result<Arc<dyn FileSystem>> {
        let parent = require_parent(TypeIndicator::Partition, parent)?;
        Ok(PartitionFileSystem::open(
            path_spec.clone(),
            parent,
            self.analyzer.as_ref(),
            config.sector_size,
        )?)
    }

    /// Partitions are addressed as `/pN`; `partition_index` takes precedence over the location.
    fn canonical_path_spec(&self, path_spec: &PathSpec) -> PathSpec {
        let index = path_spec.attributes().partition_index.or_else(|| {
            path_spec
                .location()
                .map(normalize_location)
                .and_then(|location| location.strip_prefix("/p")?.parse::<u32>().ok())
        });

        let mut attributes = path_spec.attributes().clone();
        attributes.partition_index = None;
        let canonical = path_spec.clone().with_attributes(attributes);
        match (index, path_spec.location()) {
            (Some(index), _) => canonical.with_location(format!("/p{index}")),
            (None, Some(location)) => canonical.with_location(normalize_location(location)),
            (None, None) => canonical,
        }
    }
}
