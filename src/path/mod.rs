//! Path specifications: composable addresses into nested storage containers.
//!
//! A [`PathSpec`] is a singly-linked chain of nodes. Each node names one storage format through
//! its [`TypeIndicator`], an optional format-specific `location`, and format attributes such as
//! the [`EncodingMethod`] of an encoded stream. The chain runs from the innermost target outward
//! to the raw storage source:
//!
//! ```text
//! ENCODED_STREAM (base64)
//!   └─ CPIO  /var/log/syslog.b64
//!        └─ PARTITION  /p2
//!             └─ OS  /cases/0042/disk.raw
//! ```
//!
//! Path specifications own no live resources. They are resolved into file systems and byte
//! streams by the [`crate::Resolver`].

mod indicator;
mod spec;

pub use indicator::{CompressionMethod, EncodingMethod, EncryptionMethod, TypeIndicator};
pub use spec::{PathSpec, PathSpecAttributes};
