//! Type indicators and format-specific path specification attributes.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Identifies the storage format addressed by one [`crate::PathSpec`] node.
///
/// Every format back-end is registered with the [`crate::Resolver`] under exactly one type
/// indicator. The string form (`"OS"`, `"CPIO"`, `"ENCODED_STREAM"`, ...) is what appears in
/// comparable path specification strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeIndicator {
    /// A file or directory of the host operating system
    Os,
    /// A file or directory inside an in-memory volume
    Fake,
    /// An entry inside a CPIO archive
    Cpio,
    /// A base-N encoded byte stream
    EncodedStream,
    /// A deflate, zlib or gzip compressed byte stream
    CompressedStream,
    /// An encrypted byte stream
    EncryptedStream,
    /// A partition inside a partitioned disk image
    Partition,
}

impl TypeIndicator {
    /// Returns `true` if path specifications of this type must have a parent.
    ///
    /// Only the root types, which address raw storage directly, can stand alone.
    #[must_use]
    pub fn requires_parent(self) -> bool {
        !self.is_root()
    }

    /// Returns `true` for types that address raw storage and never have a parent.
    #[must_use]
    pub fn is_root(self) -> bool {
        matches!(self, TypeIndicator::Os | TypeIndicator::Fake)
    }

    /// Returns `true` for types whose file system exposes a single synthetic stream entry.
    #[must_use]
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            TypeIndicator::EncodedStream
                | TypeIndicator::CompressedStream
                | TypeIndicator::EncryptedStream
        )
    }
}

/// Encoding methods supported by [`TypeIndicator::EncodedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EncodingMethod {
    /// Hexadecimal text, either case
    Base16,
    /// RFC 4648 base32 alphabet with `=` padding
    Base32,
    /// RFC 4648 standard base64 alphabet with `=` padding
    Base64,
}

/// Compression methods supported by [`TypeIndicator::CompressedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CompressionMethod {
    /// Raw deflate (RFC 1951)
    Deflate,
    /// Zlib wrapped deflate (RFC 1950)
    Zlib,
    /// Gzip member (RFC 1952)
    Gzip,
}

/// Encryption methods supported by [`TypeIndicator::EncryptedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EncryptionMethod {
    /// AES in cipher block chaining mode, key size chosen by the key length
    AesCbc,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn string_forms() {
        assert_eq!(TypeIndicator::Os.to_string(), "OS");
        assert_eq!(TypeIndicator::EncodedStream.to_string(), "ENCODED_STREAM");
        assert_eq!(
            TypeIndicator::from_str("PARTITION").unwrap(),
            TypeIndicator::Partition
        );
        assert_eq!(EncodingMethod::Base64.to_string(), "base64");
        assert_eq!(EncryptionMethod::AesCbc.to_string(), "aes_cbc");
        assert_eq!(
            CompressionMethod::from_str("gzip").unwrap(),
            CompressionMethod::Gzip
        );
    }

    #[test]
    fn only_root_types_stand_alone() {
        let roots: Vec<_> = TypeIndicator::iter().filter(|t| t.is_root()).collect();
        assert_eq!(roots, vec![TypeIndicator::Os, TypeIndicator::Fake]);

        for indicator in TypeIndicator::iter() {
            assert_eq!(indicator.requires_parent(), !indicator.is_root());
        }
    }
}
