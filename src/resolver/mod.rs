//! Turning path specifications into live storage handles.
//!
//! The [`Resolver`] owns a [`HelperRegistry`] mapping every [`TypeIndicator`] to the
//! [`ResolverHelper`] that implements it. Resolution walks a [`PathSpec`] chain from the inside
//! out: to open a CPIO member stored in a partition of a disk image, the resolver opens the
//! partition stream, which opens the partition table file system, which opens the disk image
//! stream. Every intermediate handle is cached in the caller's [`ResolverContext`], so a second
//! resolution sharing a prefix of the chain reuses the already opened layers.
//!
//! # Key Components
//!
//! - [`Resolver`] - Entry points: [`Resolver::open_file_object`], [`Resolver::open_file_system`]
//!   and [`Resolver::open_file_entry`]
//! - [`ResolverHelper`] - One per format back-end
//! - [`ResolverContext`] / [`Lease`] - The shared, reference-counted handle cache
//!
//! # Examples
//!
//! ```rust
//! use std::{io::Read, sync::Arc};
//! use vfscope::prelude::*;
//!
//! let mut volume = FakeVolume::new();
//! volume.add_file("/notes.b64", b"aGVsbG8gd29ybGQ=".to_vec());
//!
//! let mut resolver = Resolver::with_default_helpers(ResolverConfig::posix())?;
//! resolver.register_helper(Arc::new(FakeResolverHelper::new(volume)))?;
//! let context = Arc::new(ResolverContext::new());
//!
//! let decoded = PathSpec::encoded_stream(EncodingMethod::Base64, PathSpec::fake("/notes.b64"));
//! let mut file = resolver.open_file_object(&decoded, &context)?;
//! let mut text = String::new();
//! file.read_to_string(&mut text)?;
//! assert_eq!(text, "hello world");
//!
//! drop(file);
//! assert!(context.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod context;
mod helper;

pub(crate) use context::HeldLease;
pub use context::{CacheHandle, CacheKey, CachedHandle, HandleKind, Lease, ResolverContext};
pub use helper::{
    CompressedStreamResolverHelper, CpioResolverHelper, EncodedStreamResolverHelper,
    EncryptedStreamResolverHelper, FakeResolverHelper, FileSystemStream, OsResolverHelper,
    PartitionResolverHelper, ResolverHelper,
};

use std::{collections::HashMap, ops::Deref, sync::Arc};

use tracing::{debug, trace};

use crate::{
    config::ResolverConfig,
    credentials::KeyChain,
    file_io::{FileIO, FileObject},
    path::{PathSpec, TypeIndicator},
    vfs::{FileEntry, FileSystem},
    Error, Result,
};

/// The set of helpers known to a [`Resolver`], one per type indicator.
#[derive(Debug, Default, Clone)]
pub struct HelperRegistry {
    helpers: HashMap<TypeIndicator, Arc<dyn ResolverHelper>>,
}

impl HelperRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> HelperRegistry {
        HelperRegistry::default()
    }

    /// Registers `helper` under its type indicator.
    ///
    /// # Errors
    /// Returns [`crate::Error::HelperAlreadyRegistered`] if the type indicator is taken.
    pub fn register(&mut self, helper: Arc<dyn ResolverHelper>) -> Result<()> {
        let type_indicator = helper.type_indicator();
        if self.helpers.contains_key(&type_indicator) {
            return Err(Error::HelperAlreadyRegistered(type_indicator));
        }
        self.helpers.insert(type_indicator, helper);
        Ok(())
    }

    /// Removes and returns the helper of `type_indicator`.
    ///
    /// # Errors
    /// Returns [`crate::Error::HelperNotRegistered`] if no helper is registered for it.
    pub fn deregister(&mut self, type_indicator: TypeIndicator) -> Result<Arc<dyn ResolverHelper>> {
        self.helpers
            .remove(&type_indicator)
            .ok_or(Error::HelperNotRegistered(type_indicator))
    }

    /// The helper of `type_indicator`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedType`] if no helper is registered for it.
    pub fn get(&self, type_indicator: TypeIndicator) -> Result<&Arc<dyn ResolverHelper>> {
        self.helpers
            .get(&type_indicator)
            .ok_or(Error::UnsupportedType(type_indicator))
    }

    /// Returns `true` if a helper is registered for `type_indicator`.
    #[must_use]
    pub fn contains(&self, type_indicator: TypeIndicator) -> bool {
        self.helpers.contains_key(&type_indicator)
    }

    /// The registered type indicators, sorted.
    #[must_use]
    pub fn type_indicators(&self) -> Vec<TypeIndicator> {
        let mut indicators: Vec<TypeIndicator> = self.helpers.keys().copied().collect();
        indicators.sort();
        indicators
    }
}

/// An entry returned by [`Resolver::open_file_entry`], together with the lease that keeps its
/// file system cached.
#[derive(Debug)]
pub struct ResolvedEntry {
    entry: FileEntry,
    file_system: Lease<dyn FileSystem>,
}

impl ResolvedEntry {
    /// The entry.
    #[must_use]
    pub fn entry(&self) -> &FileEntry {
        &self.entry
    }

    /// The lease on the file system the entry belongs to.
    #[must_use]
    pub fn file_system(&self) -> &Lease<dyn FileSystem> {
        &self.file_system
    }

    /// Releases the file system lease and returns the bare entry.
    ///
    /// # Errors
    /// Returns the error raised while closing the file system if this was its last reference.
    pub fn release(self) -> Result<FileEntry> {
        self.file_system.release()?;
        Ok(self.entry)
    }
}

impl Deref for ResolvedEntry {
    type Target = FileEntry;

    fn deref(&self) -> &FileEntry {
        &self.entry
    }
}

/// Resolves path specifications into file systems, entries and byte streams.
///
/// The resolver itself is immutable during resolution and can be shared between threads; all
/// mutable state lives in the [`ResolverContext`] passed to each call. Helpers are registered
/// through `&mut self` before the resolver is shared.
#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
    helpers: HelperRegistry,
    key_chain: Arc<KeyChain>,
}

impl Resolver {
    /// Creates a resolver without helpers.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Resolver {
        Resolver {
            config,
            helpers: HelperRegistry::new(),
            key_chain: Arc::new(KeyChain::new()),
        }
    }

    /// Creates a resolver with the OS, CPIO, encoded, compressed, encrypted and partition
    /// helpers registered.
    ///
    /// # Errors
    /// Never fails in practice; registration errors are propagated.
    pub fn with_default_helpers(config: ResolverConfig) -> Result<Resolver> {
        let mut resolver = Resolver::new(config);
        let key_chain = resolver.key_chain.clone();

        resolver.register_helper(Arc::new(OsResolverHelper))?;
        resolver.register_helper(Arc::new(CpioResolverHelper))?;
        resolver.register_helper(Arc::new(EncodedStreamResolverHelper))?;
        resolver.register_helper(Arc::new(CompressedStreamResolverHelper))?;
        resolver.register_helper(Arc::new(EncryptedStreamResolverHelper::new(key_chain)))?;
        resolver.register_helper(Arc::new(PartitionResolverHelper::default()))?;
        Ok(resolver)
    }

    /// The configuration handed to every helper.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The key chain consulted by the default encrypted stream helper.
    #[must_use]
    pub fn key_chain(&self) -> &Arc<KeyChain> {
        &self.key_chain
    }

    /// The registered helpers.
    #[must_use]
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// Registers `helper` under its type indicator.
    ///
    /// # Errors
    /// Returns [`crate::Error::HelperAlreadyRegistered`] if the type indicator is taken.
    pub fn register_helper(&mut self, helper: Arc<dyn ResolverHelper>) -> Result<()> {
        debug!(type_indicator = %helper.type_indicator(), "registering resolver helper");
        self.helpers.register(helper)
    }

    /// Removes the helper of `type_indicator`.
    ///
    /// # Errors
    /// Returns [`crate::Error::HelperNotRegistered`] if no helper is registered for it.
    pub fn deregister_helper(&mut self, type_indicator: TypeIndicator) -> Result<()> {
        debug!(%type_indicator, "deregistering resolver helper");
        self.helpers.deregister(type_indicator).map(|_| ())
    }

    /// Opens the file system containing the entry addressed by `path_spec`.
    ///
    /// All entries of one container share a single cached file system.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedType`], [`crate::Error::PathSpec`] or
    /// [`crate::Error::RecursionLimit`] before any I/O if the chain cannot be resolved, and
    /// [`crate::Error::BackEnd`] if a layer fails to open.
    pub fn open_file_system(
        &self,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<Lease<dyn FileSystem>> {
        self.check(path_spec)?;
        self.file_system(&self.canonical_path_spec(path_spec)?, context)
    }

    /// Opens the byte stream addressed by `path_spec` as a cursor.
    ///
    /// # Errors
    /// Same as [`Resolver::open_file_system`]; a missing entry surfaces as
    /// [`crate::Error::BackEnd`] wrapping [`crate::Error::NotFound`].
    pub fn open_file_object(
        &self,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<FileObject> {
        self.check(path_spec)?;
        let stream = self.file_object(&self.canonical_path_spec(path_spec)?, context)?;
        Ok(FileObject::new(path_spec.clone(), stream))
    }

    /// Looks up the entry addressed by `path_spec`.
    ///
    /// Returns `Ok(None)` if the container opens but has no such entry.
    ///
    /// # Errors
    /// Same as [`Resolver::open_file_system`].
    pub fn open_file_entry(
        &self,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<Option<ResolvedEntry>> {
        self.check(path_spec)?;
        let canonical = self.canonical_path_spec(path_spec)?;
        let file_system = self.file_system(&canonical, context)?;
        let entry = file_system
            .get_file_entry_by_path_spec(&canonical)
            .map_err(|error| error.into_back_end(path_spec.type_indicator()))?;

        Ok(entry.map(|entry| ResolvedEntry { entry, file_system }))
    }

    /// Rewrites every node of `path_spec` into the form its helper considers canonical.
    ///
    /// Different spellings of one entry, such as `syslog` and `/syslog/` inside an archive or
    /// `/p01` and `partition_index: 1` on a volume, canonicalize to the same path specification
    /// and therefore share cached handles.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedType`] if a node has no registered helper.
    pub fn canonical_path_spec(&self, path_spec: &PathSpec) -> Result<PathSpec> {
        let helper = self.helpers.get(path_spec.type_indicator())?;
        let canonical = helper.canonical_path_spec(path_spec);
        match path_spec.parent() {
            Some(parent) => Ok(canonical.with_parent(self.canonical_path_spec(parent)?)),
            None => Ok(canonical),
        }
    }

    /// Address checks that must pass before any storage is touched.
    fn check(&self, path_spec: &PathSpec) -> Result<()> {
        for node in path_spec.ancestors() {
            self.helpers.get(node.type_indicator())?;
        }
        path_spec.validate(self.config.max_chain_depth)
    }

    fn file_system(
        &self,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<Lease<dyn FileSystem>> {
        let type_indicator = path_spec.type_indicator();
        let helper = self.helpers.get(type_indicator)?;
        let key = CacheKey::file_system(path_spec);

        context.acquire(key, || {
            trace!(%type_indicator, "constructing file system");
            let parent = match path_spec.parent() {
                Some(parent) => Some(self.file_object(parent, context)?),
                None => None,
            };
            helper
                .new_file_system(&path_spec.file_system_identity(), parent, &self.config)
                .map_err(|error| error.into_back_end(type_indicator))
        })
    }

    fn file_object(
        &self,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<Lease<dyn FileIO>> {
        let type_indicator = path_spec.type_indicator();
        let helper = self.helpers.get(type_indicator)?;
        let key = CacheKey::file_object(path_spec);

        context.acquire(key, || {
            trace!(%type_indicator, "constructing file object");
            let file_system = self.file_system(path_spec, context)?;
            helper
                .new_file_object(path_spec, file_system)
                .map_err(|error| error.into_back_end(type_indicator))
        })
    }
}
