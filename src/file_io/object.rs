use std::io::{self, Read, Seek, SeekFrom};

use super::FileIO;
use crate::{path::PathSpec, resolver::Lease, Result};

/// A cursor over a cached byte stream, returned by [`crate::Resolver::open_file_object`].
///
/// The underlying [`FileIO`] is shared with every other open of the same path specification in
/// the same context; the read position belongs to this object only. Dropping the object
/// releases its reference on the cached stream.
///
/// # Examples
///
/// ```rust,no_run
/// use std::{io::{Read, Seek, SeekFrom}, sync::Arc};
/// use vfscope::{PathSpec, Resolver, ResolverConfig, ResolverContext};
///
/// let resolver = Resolver::with_default_helpers(ResolverConfig::default())?;
/// let context = Arc::new(ResolverContext::new());
///
/// let mut file = resolver.open_file_object(&PathSpec::os("/var/log/syslog"), &context)?;
/// file.seek(SeekFrom::End(-16))?;
/// let mut tail = Vec::new();
/// file.read_to_end(&mut tail)?;
/// file.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct FileObject {
    path_spec: PathSpec,
    stream: Lease<dyn FileIO>,
    position: u64,
}

impl FileObject {
    /// Creates a cursor at offset 0 over a leased stream.
    #[must_use]
    pub fn new(path_spec: PathSpec, stream: Lease<dyn FileIO>) -> FileObject {
        FileObject {
            path_spec,
            stream,
            position: 0,
        }
    }

    /// The path specification this object was opened from.
    #[must_use]
    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    /// The shared stream behind this cursor.
    #[must_use]
    pub fn stream(&self) -> &Lease<dyn FileIO> {
        &self.stream
    }

    /// Size of the stream in bytes.
    ///
    /// # Errors
    /// Returns the error of the underlying stream.
    pub fn size(&self) -> Result<u64> {
        self.stream.size()
    }

    /// The current read position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Releases the reference on the cached stream.
    ///
    /// # Errors
    /// Returns the error raised while closing the stream if this was the last reference.
    pub fn close(self) -> Result<()> {
        self.stream.release()
    }
}

impl Read for FileObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self
            .stream
            .read_at(self.position, buf)
            .map_err(io::Error::other)?;
        self.position += read as u64;
        Ok(read)
    }
}

impl Seek for FileObject {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let size = self.stream.size().map_err(io::Error::other)?;
                size.checked_add_signed(delta)
            }
        };

        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            ));
        };
        self.position = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{file_io::Memory, resolver::CacheKey, ResolverContext};

    fn object(context: &Arc<ResolverContext>, data: &'static [u8]) -> FileObject {
        let spec = PathSpec::fake("/object");
        let lease = context
            .acquire(CacheKey::file_object(&spec), || {
                Ok(Arc::new(Memory::new(data.to_vec())) as Arc<dyn FileIO>)
            })
            .unwrap();
        FileObject::new(spec, lease)
    }

    #[test]
    fn read_and_seek() {
        let context = Arc::new(ResolverContext::new());
        let mut file = object(&context, b"0123456789");

        let mut buf = [0u8; 4];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        assert_eq!(file.position(), 4);

        assert_eq!(file.seek(SeekFrom::End(-2)).unwrap(), 8);
        let mut rest = Vec::new();
        file.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"89");

        assert_eq!(file.seek(SeekFrom::Current(-5)).unwrap(), 5);
        assert!(file.seek(SeekFrom::Current(-6)).is_err());
        assert_eq!(file.position(), 5);

        // Seeking past the end is allowed, reads return nothing.
        file.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn cursors_are_independent() {
        let context = Arc::new(ResolverContext::new());
        let mut first = object(&context, b"abcdef");
        let mut second = object(&context, b"abcdef");
        assert!(Arc::ptr_eq(first.stream().handle(), second.stream().handle()));

        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).unwrap();
        second.read_exact(&mut buf[..1]).unwrap();
        assert_eq!(first.position(), 3);
        assert_eq!(second.position(), 1);

        first.close().unwrap();
        assert_eq!(second.size().unwrap(), 6);
        second.close().unwrap();
        assert!(context.is_empty());
    }
}
