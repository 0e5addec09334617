//! Resolver configuration.
//!
//! [`ResolverConfig`] carries the values that back-ends need at construction time: the path
//! style of the host file system, the sector size used by partition analysis and the limits that
//! protect against hostile input.

/// Path conventions of the host operating system back-end.
///
/// The style is chosen once when the OS file system is constructed; path joining and root
/// detection never consult the running platform on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `/` separated paths rooted at `/`
    Posix,
    /// `\` separated paths with drive letter, device namespace and UNC prefixes
    Windows,
}

impl PathStyle {
    /// The style of the platform this crate was compiled for.
    #[must_use]
    pub fn native() -> PathStyle {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    /// The path separator of this style.
    #[must_use]
    pub fn separator(self) -> char {
        match self {
            PathStyle::Posix => '/',
            PathStyle::Windows => '\\',
        }
    }

    /// Returns `true` if the first path segment may carry a Windows prefix.
    #[must_use]
    pub fn parses_prefixes(self) -> bool {
        self == PathStyle::Windows
    }
}

/// Configuration shared by the resolver and every back-end it constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Path conventions of the OS back-end (default: native).
    pub path_style: PathStyle,

    /// Maximum number of nodes in a path specification chain (default: 32).
    pub max_chain_depth: usize,

    /// Bytes per sector assumed by partition analysis (default: 512).
    pub sector_size: u64,

    /// Upper bound in bytes for decoded, decompressed or decrypted streams (default: 1 GiB).
    pub max_decoded_size: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            path_style: PathStyle::native(),
            max_chain_depth: 32,
            sector_size: 512,
            max_decoded_size: 1 << 30,
        }
    }
}

impl ResolverConfig {
    /// Creates the default configuration for the running platform.
    #[must_use]
    pub fn native() -> Self {
        Self::default()
    }

    /// Creates a configuration with POSIX path conventions.
    #[must_use]
    pub fn posix() -> Self {
        Self {
            path_style: PathStyle::Posix,
            ..Self::default()
        }
    }

    /// Creates a configuration with Windows path conventions.
    #[must_use]
    pub fn windows() -> Self {
        Self {
            path_style: PathStyle::Windows,
            ..Self::default()
        }
    }

    /// Sets the maximum chain depth.
    #[must_use]
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Sets the sector size used by partition analysis.
    #[must_use]
    pub fn with_sector_size(mut self, sector_size: u64) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Sets the upper bound for transformed streams.
    #[must_use]
    pub fn with_max_decoded_size(mut self, size: u64) -> Self {
        self.max_decoded_size = size;
        self
    }
}
