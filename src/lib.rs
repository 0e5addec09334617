// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file_io/os.rs' uses mmap to map a file into memory

//! # vfscope
//!
//! A layered virtual file system for forensic analysis. Evidence is rarely a plain file: it is a
//! log inside an archive inside a compressed stream inside a partition of a disk image.
//! `vfscope` addresses such data with a single composable address, a [`PathSpec`] chain, and
//! opens it without mounting anything or trusting host file system drivers.
//!
//! ## Features
//!
//! - **Composable addresses** - [`PathSpec`] chains from the target outward to raw storage
//! - **Pluggable back-ends** - one [`ResolverHelper`] per format, registered with a [`Resolver`]
//! - **Shared handle cache** - every layer is opened once per [`ResolverContext`] and reference
//!   counted through [`Lease`] tickets
//! - **Positional I/O** - [`FileIO`] handles carry no cursor and are shared between threads;
//!   [`FileObject`] adds `std::io::Read + Seek`
//! - **Formats** - host files (POSIX and Windows path rules), CPIO archives, GPT and MBR
//!   partition tables, base-N encoded, compressed and AES-CBC encrypted streams
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use std::{io::Read, sync::Arc};
//! use vfscope::prelude::*;
//!
//! let resolver = Resolver::with_default_helpers(ResolverConfig::native())?;
//! let context = Arc::new(ResolverContext::new());
//!
//! // The syslog in the CPIO archive stored in the second partition of a disk image.
//! let disk = PathSpec::os("/cases/0042/disk.raw");
//! let partition = PathSpec::partition("/p2", disk);
//! let syslog = PathSpec::cpio("/var/log/syslog", partition);
//!
//! let mut file = resolver.open_file_object(&syslog, &context)?;
//! let mut text = String::new();
//! file.read_to_string(&mut text)?;
//! file.close()?;
//!
//! context.empty()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Navigating entries
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vfscope::prelude::*;
//!
//! let resolver = Resolver::with_default_helpers(ResolverConfig::native())?;
//! let context = Arc::new(ResolverContext::new());
//!
//! let archive = PathSpec::cpio("/", PathSpec::os("/cases/0042/initrd.cpio"));
//! if let Some(root) = resolver.open_file_entry(&archive, &context)? {
//!     for entry in root.sub_file_entries()? {
//!         println!("{} ({})", entry.name(), entry.kind());
//!     }
//! }
//! # Ok::<(), vfscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`path`] - The [`PathSpec`] address type and [`TypeIndicator`]
//! - [`resolver`] - [`Resolver`], the helper registry and the [`ResolverContext`] cache
//! - [`vfs`] - The [`FileSystem`] contract, [`FileEntry`] and the back-end file systems
//! - [`file_io`] - The [`FileIO`] contract and stream implementations
//! - [`formats`] - CPIO and partition table parsers
//! - [`credentials`] - Key material for encrypted streams
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with the crate [`Error`]. Malformed addresses are
//! reported as [`Error::PathSpec`] before any storage is read; failures inside a format
//! back-end are wrapped once in [`Error::BackEnd`] with the original cause attached. Missing
//! entries are not errors: lookups return `None`.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events for helper registration, cache hits, misses and closes,
//! and back-end initialization. No subscriber is installed by the library.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test;

/// Commonly used types and traits.
///
/// ```rust
/// use vfscope::prelude::*;
///
/// let spec = PathSpec::cpio("/etc/passwd", PathSpec::os("/evidence/initrd.cpio"));
/// assert_eq!(spec.type_indicator(), TypeIndicator::Cpio);
/// ```
pub mod prelude;

pub mod config;
pub mod credentials;
pub mod file_io;
pub mod formats;
pub mod path;
pub mod resolver;
pub mod vfs;

/// `vfscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. Used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `vfscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use config::{PathStyle, ResolverConfig};
pub use credentials::{CredentialStore, Credentials, KeyChain};
pub use file_io::{FileIO, FileObject, Memory, OsFile, RangedFile, StreamTransform, TransformedStream};
pub use formats::partition::{PartitionAnalyzer, PartitionInfo, PartitionKind, PartitionTableAnalyzer};
pub use path::{
    CompressionMethod, EncodingMethod, EncryptionMethod, PathSpec, PathSpecAttributes,
    TypeIndicator,
};
pub use resolver::{
    CacheKey, CompressedStreamResolverHelper, CpioResolverHelper, EncodedStreamResolverHelper,
    EncryptedStreamResolverHelper, FakeResolverHelper, FileSystemStream, HelperRegistry, Lease,
    OsResolverHelper, PartitionResolverHelper, ResolvedEntry, Resolver, ResolverContext,
    ResolverHelper,
};
pub use vfs::{
    CpioFileSystem, FakeFileSystem, FakeVolume, FileEntry, FileEntryKind, FileSystem,
    OsFileSystem, PartitionFileSystem, StreamFileSystem,
};
