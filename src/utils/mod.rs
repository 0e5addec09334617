//! Byte-level stream transformations used by the stream back-ends.
//!
//! - [`decode`] - base16, base32 and base64 text decoding
//! - [`decompress`] - deflate, zlib and gzip decompression with an output bound
//! - [`decrypt`] - block cipher decryption with caller supplied key material

pub(crate) mod decode;
pub(crate) mod decompress;
pub(crate) mod decrypt;
