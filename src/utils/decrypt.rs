//! Block cipher decryption of encrypted evidence streams.
//!
//! Streams are decrypted without padding removal: the plaintext is a raw byte stream, not a
//! message. Trailing bytes that do not fill a whole cipher block are dropped.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::{path::EncryptionMethod, Error, Result};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const AES_BLOCK_SIZE: usize = 16;

/// Decrypts `data` with the given method and key material.
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] for an unsupported key length or a short IV.
pub fn decrypt(method: EncryptionMethod, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match method {
        EncryptionMethod::AesCbc => {
            let usable = data.len() - data.len() % AES_BLOCK_SIZE;
            let data = &data[..usable];

            match key.len() {
                16 => cbc_decrypt::<Aes128CbcDec>(key, iv, data),
                24 => cbc_decrypt::<Aes192CbcDec>(key, iv, data),
                32 => cbc_decrypt::<Aes256CbcDec>(key, iv, data),
                other => Err(Error::Decode(format!(
                    "aes_cbc: unsupported key length {other}"
                ))),
            }
        }
    }
}

fn cbc_decrypt<D: BlockDecryptMut + KeyIvInit>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != AES_BLOCK_SIZE {
        return Err(Error::Decode(format!(
            "aes_cbc: initialization vector must be {AES_BLOCK_SIZE} bytes"
        )));
    }

    let cipher = D::new_from_slices(key, iv)
        .map_err(|_| Error::Decode("aes_cbc: invalid key material".to_string()))?;
    let mut buf = data.to_vec();
    let plaintext_len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| Error::Decode("aes_cbc: unaligned ciphertext".to_string()))?
        .len();
    buf.truncate(plaintext_len);

    Ok(buf)
}

#[cfg(test)]
pub(crate) fn encrypt_aes_cbc(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;

    assert_eq!(plaintext.len() % AES_BLOCK_SIZE, 0);
    let mut buf = plaintext.to_vec();
    let len = buf.len();
    match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap()
            .to_vec(),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap()
            .to_vec(),
        _ => panic!("unsupported test key length"),
    }
}
