//! # vfscope Prelude
//!
//! The types needed to build path specifications, resolve them and read the result. Import
//! everything with `use vfscope::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all vfscope operations
pub use crate::Error;

/// The result type used throughout vfscope
pub use crate::Result;

/// Configuration shared by the resolver and its back-ends
pub use crate::{PathStyle, ResolverConfig};

// ================================================================================================
// Addressing
// ================================================================================================

/// The chained address type and its format attributes
pub use crate::{
    CompressionMethod, EncodingMethod, EncryptionMethod, PathSpec, PathSpecAttributes,
    TypeIndicator,
};

// ================================================================================================
// Resolution
// ================================================================================================

/// Main entry point and the handle cache
pub use crate::{CacheKey, Lease, ResolvedEntry, Resolver, ResolverContext};

/// Back-end plug-ins
pub use crate::{FakeResolverHelper, ResolverHelper};

/// Key material for encrypted streams
pub use crate::{CredentialStore, Credentials, KeyChain};

// ================================================================================================
// Virtual File System
// ================================================================================================

/// File systems, entries and streams
pub use crate::{FakeVolume, FileEntry, FileEntryKind, FileIO, FileObject, FileSystem};
