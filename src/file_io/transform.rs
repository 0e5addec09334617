//! Lazily transformed views of another stream.
//!
//! The transformation runs once, on the first size query or read, and the result is kept for the
//! lifetime of the handle. Every [`TransformedStream`] enforces an upper bound on its output size.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use tracing::debug;

use super::{copy_at, FileIO};
use crate::{
    path::{CompressionMethod, EncodingMethod, EncryptionMethod},
    utils::{decode::decode, decompress::decompress, decrypt::decrypt},
    Error, Result,
};

/// A reversible byte transformation applied to a parent stream.
#[derive(Clone, PartialEq, Eq)]
pub enum StreamTransform {
    /// Base-N text decoding
    Decode(EncodingMethod),
    /// Decompression
    Decompress(CompressionMethod),
    /// Decryption with caller supplied key material
    Decrypt {
        /// The cipher and mode
        method: EncryptionMethod,
        /// The raw key
        key: Vec<u8>,
        /// The initialization vector
        iv: Vec<u8>,
    },
}

impl fmt::Debug for StreamTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTransform::Decode(method) => f.debug_tuple("Decode").field(method).finish(),
            StreamTransform::Decompress(method) => {
                f.debug_tuple("Decompress").field(method).finish()
            }
            // Key material stays out of logs.
            StreamTransform::Decrypt { method, .. } => f
                .debug_struct("Decrypt")
                .field("method", method)
                .finish_non_exhaustive(),
        }
    }
}

impl StreamTransform {
    fn apply(&self, input: &[u8], limit: u64) -> Result<Vec<u8>> {
        let output = match self {
            StreamTransform::Decode(method) => decode(*method, input)?,
            StreamTransform::Decompress(method) => decompress(*method, input, limit)?,
            StreamTransform::Decrypt { method, key, iv } => decrypt(*method, key, iv, input)?,
        };

        if output.len() as u64 > limit {
            return Err(Error::Decode(format!(
                "transformed stream exceeds {limit} bytes"
            )));
        }
        Ok(output)
    }
}

/// A stream whose contents are a [`StreamTransform`] of another stream.
#[derive(Debug)]
pub struct TransformedStream {
    source: Arc<dyn FileIO>,
    transform: StreamTransform,
    limit: u64,
    output: Mutex<Option<Arc<[u8]>>>,
}

impl TransformedStream {
    /// Creates a lazy view of `source`.
    ///
    /// ## Arguments
    /// * 'source' - The stream holding the encoded, compressed or encrypted bytes
    /// * 'transform' - The transformation to apply
    /// * 'limit' - The maximum accepted size of the transformed output
    #[must_use]
    pub fn new(source: Arc<dyn FileIO>, transform: StreamTransform, limit: u64) -> Self {
        TransformedStream {
            source,
            transform,
            limit,
            output: Mutex::new(None),
        }
    }

    /// The transformation applied by this stream.
    #[must_use]
    pub fn transform(&self) -> &StreamTransform {
        &self.transform
    }

    fn output(&self) -> Result<Arc<[u8]>> {
        let mut output = lock!(self.output);
        if let Some(data) = output.as_ref() {
            return Ok(data.clone());
        }

        // Base16 is the least dense encoding, two input bytes per output byte.
        let input_size = self.source.size()?;
        if input_size > self.limit.saturating_mul(2) {
            return Err(Error::Decode(format!(
                "source stream of {input_size} bytes exceeds the transformation bound"
            )));
        }

        let input = self.source.read_all()?;
        let data: Arc<[u8]> = self.transform.apply(&input, self.limit)?.into();
        debug!(
            transform = ?self.transform,
            input = input.len(),
            output = data.len(),
            "transformed stream"
        );

        *output = Some(data.clone());
        Ok(data)
    }
}

impl FileIO for TransformedStream {
    fn size(&self) -> Result<u64> {
        Ok(self.output()?.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(copy_at(&self.output()?, offset, buf))
    }

    fn close(&self) -> Result<()> {
        *lock!(self.output) = None;
        Ok(())
    }
}
