//! Endian-aware, bounds-checked reading of fixed-size integers from on-disk structures.
//!
//! Partition tables and archive headers are parsed from small byte buffers that were read from
//! a [`crate::FileIO`] beforehand. The functions here never panic on short input; reading past
//! the end of a buffer yields [`crate::Error::OutOfBounds`].
//!
//! ```rust,ignore
//! let mut offset = 0;
//! let signature: u16 = read_le_at(&sector, &mut offset)?;
//! ```

use crate::{Error::OutOfBounds, Result};

/// Integer types that can be decoded from raw bytes in either byte order.
pub trait ByteIO: Sized {
    /// Byte array representation of the integer.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Decodes a little-endian value.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Decodes a big-endian value.
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_byte_io {
    ($($ty:ty),*) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }
            }
        )*
    };
}

impl_byte_io!(u8, u16, u32, u64);

fn take<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T::Bytes> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(bytes)
}

/// Reads a little-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    take::<T>(data, offset).map(T::from_le_bytes)
}

/// Reads a big-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_be_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    take::<T>(data, offset).map(T::from_be_bytes)
}

/// Reads a little-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: ByteIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}
