//! Key material for encrypted containers.
//!
//! Encrypted stream back-ends ask a [`CredentialStore`] for the key of the path specification
//! they are opening. The default store, [`KeyChain`], is an in-memory map keyed structurally by
//! path specification, shared by every resolution of a [`crate::Resolver`]. Back-ends look up
//! the canonical form of the path specification (see [`crate::Resolver::canonical_path_spec`]).

use std::fmt;

use dashmap::DashMap;

use crate::path::PathSpec;

/// Key and initialization vector of an encrypted container.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl Credentials {
    /// Creates credentials from a raw key and initialization vector.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, iv: impl Into<Vec<u8>>) -> Credentials {
        Credentials {
            key: key.into(),
            iv: iv.into(),
        }
    }

    /// The raw key.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The initialization vector.
    #[must_use]
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

/// Source of key material for encrypted path specifications.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// The credentials registered for `path_spec`, if any.
    fn credentials(&self, path_spec: &PathSpec) -> Option<Credentials>;
}

/// In-memory credential store keyed by path specification.
///
/// # Examples
///
/// ```rust
/// use vfscope::{CredentialStore, Credentials, EncryptionMethod, KeyChain, PathSpec};
///
/// let volume = PathSpec::encrypted_stream(EncryptionMethod::AesCbc, PathSpec::os("/evidence.bin"));
/// let key_chain = KeyChain::new();
/// key_chain.set(&volume, Credentials::new([0x11; 16], [0x22; 16]));
///
/// assert_eq!(key_chain.credentials(&volume).unwrap().key(), &[0x11; 16]);
/// ```
#[derive(Debug, Default)]
pub struct KeyChain {
    entries: DashMap<PathSpec, Credentials>,
}

impl KeyChain {
    /// Creates an empty key chain.
    #[must_use]
    pub fn new() -> KeyChain {
        KeyChain::default()
    }

    /// Registers `credentials` for `path_spec`, replacing earlier ones.
    pub fn set(&self, path_spec: &PathSpec, credentials: Credentials) {
        self.entries.insert(path_spec.clone(), credentials);
    }

    /// Removes and returns the credentials of `path_spec`.
    pub fn remove(&self, path_spec: &PathSpec) -> Option<Credentials> {
        self.entries
            .remove(path_spec)
            .map(|(_, credentials)| credentials)
    }

    /// Number of registered credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no credentials are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for KeyChain {
    fn credentials(&self, path_spec: &PathSpec) -> Option<Credentials> {
        self.entries
            .get(path_spec)
            .map(|entry| entry.value().clone())
    }
}
