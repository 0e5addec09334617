//! The chained path specification type.

use std::fmt;

use crate::{
    path::{CompressionMethod, EncodingMethod, EncryptionMethod, TypeIndicator},
    Error, Result,
};

/// Format-specific attributes of a single path specification node.
///
/// Each attribute belongs to exactly one type indicator; [`PathSpec::validate`] rejects
/// attributes set on a node of another type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathSpecAttributes {
    /// Decoding applied by [`TypeIndicator::EncodedStream`]
    pub encoding_method: Option<EncodingMethod>,
    /// Decompression applied by [`TypeIndicator::CompressedStream`]
    pub compression_method: Option<CompressionMethod>,
    /// Decryption applied by [`TypeIndicator::EncryptedStream`]
    pub encryption_method: Option<EncryptionMethod>,
    /// 1-based partition number for [`TypeIndicator::Partition`]
    pub partition_index: Option<u32>,
}

/// An immutable, chainable address into nested storage containers.
///
/// A path specification names a location (`location`) inside one container format
/// (`type_indicator`) and optionally the container that format lives in (`parent`). The chain
/// points outward: the node a caller holds is the innermost target, its last ancestor addresses
/// raw storage.
///
/// Building a path specification is pure data assembly and never performs I/O. Validation is
/// deferred to [`PathSpec::validate`], which the resolver calls before touching any storage.
/// The typed constructors ([`PathSpec::cpio`], [`PathSpec::partition`], ...) take their parent
/// by value and cannot produce an orphan.
///
/// # Examples
///
/// ```rust
/// use vfscope::{EncodingMethod, PathSpec, TypeIndicator};
///
/// let image = PathSpec::os("/cases/0042/evidence.raw");
/// let archive = PathSpec::cpio("/var/log/syslog.b64", image);
/// let decoded = PathSpec::encoded_stream(EncodingMethod::Base64, archive);
///
/// assert_eq!(decoded.depth(), 3);
/// assert_eq!(decoded.type_indicator(), TypeIndicator::EncodedStream);
/// assert_eq!(decoded.parent().unwrap().location(), Some("/var/log/syslog.b64"));
/// assert!(decoded.validate(32).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSpec {
    type_indicator: TypeIndicator,
    location: Option<String>,
    attributes: PathSpecAttributes,
    parent: Option<Box<PathSpec>>,
}

impl PathSpec {
    /// Creates a bare path specification of the given type.
    ///
    /// No validation happens here; use the `with_*` methods to fill in the node.
    #[must_use]
    pub fn new(type_indicator: TypeIndicator) -> PathSpec {
        PathSpec {
            type_indicator,
            location: None,
            attributes: PathSpecAttributes::default(),
            parent: None,
        }
    }

    /// Addresses a file or directory of the host operating system.
    #[must_use]
    pub fn os(location: impl Into<String>) -> PathSpec {
        PathSpec::new(TypeIndicator::Os).with_location(location)
    }

    /// Addresses a file or directory of an in-memory volume.
    #[must_use]
    pub fn fake(location: impl Into<String>) -> PathSpec {
        PathSpec::new(TypeIndicator::Fake).with_location(location)
    }

    /// Addresses an entry of the CPIO archive stored in `parent`.
    #[must_use]
    pub fn cpio(location: impl Into<String>, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::Cpio)
            .with_location(location)
            .with_parent(parent)
    }

    /// Addresses the decoded form of the stream stored in `parent`.
    #[must_use]
    pub fn encoded_stream(method: EncodingMethod, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::EncodedStream)
            .with_attributes(PathSpecAttributes {
                encoding_method: Some(method),
                ..PathSpecAttributes::default()
            })
            .with_parent(parent)
    }

    /// Addresses the decompressed form of the stream stored in `parent`.
    #[must_use]
    pub fn compressed_stream(method: CompressionMethod, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::CompressedStream)
            .with_attributes(PathSpecAttributes {
                compression_method: Some(method),
                ..PathSpecAttributes::default()
            })
            .with_parent(parent)
    }

    /// Addresses the decrypted form of the stream stored in `parent`.
    ///
    /// Key material is looked up in the resolver's credential store under this path
    /// specification.
    #[must_use]
    pub fn encrypted_stream(method: EncryptionMethod, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::EncryptedStream)
            .with_attributes(PathSpecAttributes {
                encryption_method: Some(method),
                ..PathSpecAttributes::default()
            })
            .with_parent(parent)
    }

    /// Addresses a partition (`/p1`, `/p2`, ...) or the partition table root (`/`) of the disk
    /// image stored in `parent`.
    #[must_use]
    pub fn partition(location: impl Into<String>, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::Partition)
            .with_location(location)
            .with_parent(parent)
    }

    /// Addresses a partition of the disk image stored in `parent` by its 1-based index.
    #[must_use]
    pub fn partition_index(index: u32, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::Partition)
            .with_attributes(PathSpecAttributes {
                partition_index: Some(index),
                ..PathSpecAttributes::default()
            })
            .with_parent(parent)
    }

    /// Returns a copy of this node with the location replaced.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> PathSpec {
        self.location = Some(location.into());
        self
    }

    /// Returns a copy of this node without a location.
    #[must_use]
    pub fn without_location(mut self) -> PathSpec {
        self.location = None;
        self
    }

    /// Returns a copy of this node with the parent replaced.
    #[must_use]
    pub fn with_parent(mut self, parent: PathSpec) -> PathSpec {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Returns a copy of this node with the format attributes replaced.
    #[must_use]
    pub fn with_attributes(mut self, attributes: PathSpecAttributes) -> PathSpec {
        self.attributes = attributes;
        self
    }

    /// The storage format of this node.
    #[must_use]
    pub fn type_indicator(&self) -> TypeIndicator {
        self.type_indicator
    }

    /// The format-specific location inside the container, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The format-specific attributes of this node.
    #[must_use]
    pub fn attributes(&self) -> &PathSpecAttributes {
        &self.attributes
    }

    /// The path specification of the enclosing container.
    #[must_use]
    pub fn parent(&self) -> Option<&PathSpec> {
        self.parent.as_deref()
    }

    /// Returns `true` if this node has a parent.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Number of nodes in the chain, this node included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Iterates from this node outward to the raw storage node.
    pub fn ancestors(&self) -> impl Iterator<Item = &PathSpec> {
        std::iter::successors(Some(self), |node| node.parent())
    }

    /// The identity of the container this node lives in.
    ///
    /// Drops the entry-addressing parts (location and partition index) of this node, so every
    /// entry of one container maps to the same file system.
    #[must_use]
    pub fn file_system_identity(&self) -> PathSpec {
        let mut identity = self.clone().without_location();
        identity.attributes.partition_index = None;
        identity
    }

    /// Canonical, multi-line identity string of the whole chain, outermost node first.
    ///
    /// Two path specifications are structurally identical exactly when their comparable strings
    /// are equal. Backslashes, commas and line breaks inside locations are escaped with a
    /// backslash, so a location can never spell out further attributes or nodes.
    #[must_use]
    pub fn comparable(&self) -> String {
        let mut nodes: Vec<&PathSpec> = self.ancestors().collect();
        nodes.reverse();

        let mut comparable = String::new();
        for node in nodes {
            comparable.push_str(&node.node_comparable());
            comparable.push('\n');
        }
        comparable
    }

    fn node_comparable(&self) -> String {
        let mut line = format!("type: {}", self.type_indicator);
        if let Some(location) = &self.location {
            line.push_str(", location: ");
            escape_location(location, &mut line);
        }
        if let Some(method) = self.attributes.encoding_method {
            line.push_str(&format!(", encoding_method: {method}"));
        }
        if let Some(method) = self.attributes.compression_method {
            line.push_str(&format!(", compression_method: {method}"));
        }
        if let Some(method) = self.attributes.encryption_method {
            line.push_str(&format!(", encryption_method: {method}"));
        }
        if let Some(index) = self.attributes.partition_index {
            line.push_str(&format!(", partition_index: {index}"));
        }
        line
    }

    /// Checks the whole chain for structural errors.
    ///
    /// # Arguments
    /// * `max_depth` - Maximum number of nodes the chain may have.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] if the chain is longer than `max_depth`, and
    /// [`crate::Error::PathSpec`] for a missing required parent, a parent on a root type, or a
    /// missing or misplaced attribute.
    pub fn validate(&self, max_depth: usize) -> Result<()> {
        for (depth, node) in self.ancestors().enumerate() {
            if depth >= max_depth {
                return Err(Error::RecursionLimit(max_depth));
            }
            node.validate_node()?;
        }
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        let indicator = self.type_indicator;

        if indicator.requires_parent() && self.parent.is_none() {
            return Err(Error::PathSpec(format!("{indicator} requires a parent")));
        }
        if indicator.is_root() && self.parent.is_some() {
            return Err(Error::PathSpec(format!("{indicator} cannot have a parent")));
        }
        if indicator.is_root() && self.location.is_none() {
            return Err(Error::PathSpec(format!("{indicator} requires a location")));
        }

        let attributes = &self.attributes;
        check_attribute(
            indicator,
            TypeIndicator::EncodedStream,
            attributes.encoding_method.is_some(),
            "encoding_method",
            true,
        )?;
        check_attribute(
            indicator,
            TypeIndicator::CompressedStream,
            attributes.compression_method.is_some(),
            "compression_method",
            true,
        )?;
        check_attribute(
            indicator,
            TypeIndicator::EncryptedStream,
            attributes.encryption_method.is_some(),
            "encryption_method",
            true,
        )?;
        check_attribute(
            indicator,
            TypeIndicator::Partition,
            attributes.partition_index.is_some(),
            "partition_index",
            false,
        )?;

        if attributes.partition_index == Some(0) {
            return Err(Error::PathSpec("partition_index is 1-based".to_string()));
        }
        Ok(())
    }
}

fn check_attribute(
    indicator: TypeIndicator,
    owner: TypeIndicator,
    present: bool,
    name: &str,
    required: bool,
) -> Result<()> {
    if indicator == owner && required && !present {
        return Err(Error::PathSpec(format!("{indicator} requires {name}")));
    }
    if indicator != owner && present {
        return Err(Error::PathSpec(format!(
            "{name} is not supported by {indicator}"
        )));
    }
    Ok(())
}

fn escape_location(location: &str, out: &mut String) {
    for character in location.chars() {
        match character {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.comparable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syslog_spec() -> PathSpec {
        PathSpec::cpio("/syslog", PathSpec::os("/tmp/syslog.cpio"))
    }

    #[test]
    fn comparable_lists_outermost_first() {
        let spec = PathSpec::encoded_stream(EncodingMethod::Base64, syslog_spec());
        assert_eq!(
            spec.comparable(),
            "type: OS, location: /tmp/syslog.cpio\n\
             type: CPIO, location: /syslog\n\
             type: ENCODED_STREAM, encoding_method: base64\n"
        );
        assert_eq!(spec.to_string(), spec.comparable());
    }

    #[test]
    fn comparable_escapes_locations() {
        let injected = PathSpec::fake("/a\ntype: CPIO, location: /b");
        let nested = PathSpec::cpio("/b", PathSpec::fake("/a"));
        assert_ne!(injected.comparable(), nested.comparable());
        assert_eq!(
            injected.comparable(),
            "type: FAKE, location: /a\\ntype: CPIO\\, location: /b\n"
        );

        let windows = PathSpec::os(r"C:\Windows\n");
        assert_eq!(windows.comparable(), "type: OS, location: C:\\\\Windows\\\\n\n");
        assert_ne!(windows.comparable(), PathSpec::os("C:\\Windows\n").comparable());
    }

    #[test]
    fn structural_equality() {
        assert_eq!(syslog_spec(), syslog_spec());
        assert_ne!(
            syslog_spec(),
            PathSpec::cpio("/bogus", PathSpec::os("/tmp/syslog.cpio"))
        );
    }

    #[test]
    fn chain_navigation() {
        let spec = syslog_spec();
        assert!(spec.has_parent());
        assert_eq!(spec.depth(), 2);

        let kinds: Vec<_> = spec.ancestors().map(PathSpec::type_indicator).collect();
        assert_eq!(kinds, vec![TypeIndicator::Cpio, TypeIndicator::Os]);
    }

    #[test]
    fn file_system_identity_drops_entry_address() {
        let first = PathSpec::partition("/p1", PathSpec::fake("/disk.raw"));
        let second = PathSpec::partition_index(2, PathSpec::fake("/disk.raw"));
        assert_eq!(first.file_system_identity(), second.file_system_identity());

        let encoded = PathSpec::encoded_stream(EncodingMethod::Base16, PathSpec::fake("/a"));
        assert_eq!(
            encoded.file_system_identity().attributes().encoding_method,
            Some(EncodingMethod::Base16)
        );
    }

    #[test]
    fn validate_missing_parent() {
        let orphan = PathSpec::new(TypeIndicator::Partition).with_location("/p1");
        assert!(matches!(orphan.validate(32), Err(Error::PathSpec(_))));

        let orphan = PathSpec::new(TypeIndicator::Cpio).with_location("/syslog");
        assert!(matches!(orphan.validate(32), Err(Error::PathSpec(_))));
    }

    #[test]
    fn validate_root_rules() {
        let spec = PathSpec::os("/a").with_parent(PathSpec::os("/b"));
        assert!(matches!(spec.validate(32), Err(Error::PathSpec(_))));

        let spec = PathSpec::new(TypeIndicator::Os);
        assert!(matches!(spec.validate(32), Err(Error::PathSpec(_))));
    }

    #[test]
    fn validate_attributes() {
        let spec = PathSpec::new(TypeIndicator::EncodedStream).with_parent(PathSpec::fake("/a"));
        assert!(matches!(spec.validate(32), Err(Error::PathSpec(_))));

        let spec = PathSpec::cpio("/a", PathSpec::fake("/a")).with_attributes(PathSpecAttributes {
            encoding_method: Some(EncodingMethod::Base64),
            ..PathSpecAttributes::default()
        });
        assert!(matches!(spec.validate(32), Err(Error::PathSpec(_))));

        let spec = PathSpec::partition_index(0, PathSpec::fake("/disk"));
        assert!(matches!(spec.validate(32), Err(Error::PathSpec(_))));

        assert!(PathSpec::partition_index(1, PathSpec::fake("/disk"))
            .validate(32)
            .is_ok());
    }

    #[test]
    fn validate_depth_limit() {
        let mut spec = PathSpec::fake("/image");
        for _ in 0..4 {
            spec = PathSpec::compressed_stream(CompressionMethod::Gzip, spec);
        }
        assert!(spec.validate(5).is_ok());
        assert!(matches!(spec.validate(4), Err(Error::RecursionLimit(4))));
    }
}
