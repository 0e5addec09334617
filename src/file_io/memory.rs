use std::sync::Arc;

use super::{copy_at, FileIO};
use crate::Result;

/// Byte stream backed by memory
#[derive(Debug, Clone)]
pub struct Memory {
    data: Arc<[u8]>,
}

impl Memory {
    /// Create a new memory stream
    ///
    /// ## Arguments
    /// * 'data' - The data buffer to expose, shared without copying if already an `Arc<[u8]>`
    pub fn new(data: impl Into<Arc<[u8]>>) -> Memory {
        Memory { data: data.into() }
    }

    /// The complete contents of the stream
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FileIO for Memory {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(copy_at(&self.data, offset, buf))
    }
}
