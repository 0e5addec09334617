//! Base-N text decoding.
//!
//! Encoded evidence is frequently wrapped at fixed line lengths, so ASCII whitespace is removed
//! before decoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use data_encoding::BASE32;

use crate::{path::EncodingMethod, Error, Result};

/// Decodes `data` with the given encoding method.
///
/// # Errors
/// Returns [`crate::Error::Decode`] if the input contains characters outside the alphabet or
/// has an invalid length.
pub fn decode(method: EncodingMethod, data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();

    match method {
        EncodingMethod::Base16 => {
            hex::decode(&cleaned).map_err(|error| Error::Decode(format!("base16: {error}")))
        }
        EncodingMethod::Base32 => decode_base32(&cleaned),
        EncodingMethod::Base64 => STANDARD
            .decode(&cleaned)
            .map_err(|error| Error::Decode(format!("base64: {error}"))),
    }
}

/// RFC 4648 base32 with `=` padding; lowercase input is accepted.
fn decode_base32(data: &[u8]) -> Result<Vec<u8>> {
    BASE32
        .decode(&data.to_ascii_uppercase())
        .map_err(|error| Error::Decode(format!("base32: {error}")))
}
