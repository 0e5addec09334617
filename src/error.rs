use thiserror::Error;

use crate::path::TypeIndicator;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups that callers usually treat differently:
///
/// ## Address errors
/// - [`Error::PathSpec`] - The path specification chain is malformed (missing parent, missing
///   attribute, unsupported combination). Always detected before any storage is touched.
/// - [`Error::UnsupportedType`] - No helper is registered for a type indicator.
/// - [`Error::RecursionLimit`] - The chain is deeper than the configured limit.
///
/// ## Back-end errors
/// - [`Error::BackEnd`] - A format back-end failed while opening a container; the original
///   cause is attached.
/// - [`Error::Malformed`], [`Error::OutOfBounds`], [`Error::Decode`] - Parser level failures,
///   usually surfaced wrapped inside [`Error::BackEnd`].
/// - [`Error::CredentialsRequired`] - An encrypted container needs key material that the
///   credential store does not have.
///
/// ## Lifecycle errors
/// - [`Error::CacheKeyNotFound`] - A release was issued for a handle that is not cached.
/// - [`Error::FileSystemClosed`], [`Error::NotOpen`] - A handle was used after it was closed.
/// - [`Error::HelperAlreadyRegistered`], [`Error::HelperNotRegistered`] - Registry misuse.
///
/// Missing entries are not errors: existence checks return `false` and lookups return `None`.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use vfscope::{Error, PathSpec, Resolver, ResolverConfig, ResolverContext};
///
/// let resolver = Resolver::with_default_helpers(ResolverConfig::default()).unwrap();
/// let context = Arc::new(ResolverContext::new());
///
/// // A partition table needs the disk image it lives in.
/// let orphan = PathSpec::new(vfscope::TypeIndicator::Partition).with_location("/p1");
/// match resolver.open_file_system(&orphan, &context) {
///     Err(Error::PathSpec(message)) => println!("bad address: {message}"),
///     Err(other) => println!("other error: {other}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Address errors
    /// The path specification is malformed.
    ///
    /// Raised for a missing required parent, a parent on a root type, a missing
    /// required attribute or an attribute that does not belong to the type indicator.
    #[error("Invalid path specification - {0}")]
    PathSpec(String),

    /// No resolver helper is registered for this type indicator.
    #[error("Unsupported type indicator - {0}")]
    UnsupportedType(TypeIndicator),

    /// The path specification chain is deeper than the configured limit.
    ///
    /// The associated value shows the limit that was exceeded.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    // Back-end errors
    /// A format back-end failed to open or read its container.
    ///
    /// The cause reported by the format parser (or the parent layer) is kept in `source`.
    #[error("{type_indicator} back-end failure - {source}")]
    BackEnd {
        /// The type indicator of the layer that failed
        type_indicator: TypeIndicator,
        /// The original failure
        #[source]
        source: Box<Error>,
    },

    /// The data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A stream transformation (decoding, decompression, decryption) failed.
    #[error("Unable to decode stream - {0}")]
    Decode(String),

    /// The entry addressed by a path specification does not exist.
    ///
    /// Only raised when a byte stream is requested for a missing entry; lookups
    /// return `None` instead.
    #[error("No such entry - {0}")]
    NotFound(String),

    /// Decryption key material is required but not available.
    #[error("Missing credentials for - {0}")]
    CredentialsRequired(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised by the host operating system.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    // Lifecycle errors
    /// The handle has already been closed.
    #[error("The handle is not open")]
    NotOpen,

    /// The file system backing a file entry is no longer open.
    #[error("The owning file system has been closed")]
    FileSystemClosed,

    /// A release was issued for a cache key without a live entry.
    #[error("No cached handle for key - {0}")]
    CacheKeyNotFound(String),

    /// A helper for this type indicator is already registered.
    #[error("Resolver helper already registered - {0}")]
    HelperAlreadyRegistered(TypeIndicator),

    /// No helper for this type indicator is registered.
    #[error("Resolver helper not registered - {0}")]
    HelperNotRegistered(TypeIndicator),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Wraps this error into [`Error::BackEnd`] for the given layer.
    ///
    /// Address errors and errors that are already back-end failures pass through
    /// unchanged, so a failure deep in a chain is wrapped exactly once.
    #[must_use]
    pub fn into_back_end(self, type_indicator: TypeIndicator) -> Error {
        match self {
            Error::PathSpec(_)
            | Error::UnsupportedType(_)
            | Error::RecursionLimit(_)
            | Error::BackEnd { .. }
            | Error::LockError => self,
            other => Error::BackEnd {
                type_indicator,
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` for errors describing a malformed address.
    #[must_use]
    pub fn is_path_spec(&self) -> bool {
        matches!(self, Error::PathSpec(_))
    }

    /// Returns the innermost cause of a chain of [`Error::BackEnd`] wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::BackEnd { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
