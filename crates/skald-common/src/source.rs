//! Seekable byte sources.
//!
//! A [`ByteSource`] is a dumb cursor over bytes: it has no notion of headers or
//! lookahead, and a short read is always an error. Archives are never
//! partially trusted, so callers compute bounds before reading.

use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

/// A random-access byte stream.
pub trait ByteSource {
    /// Fill `buf` completely or fail without a partial result.
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Advance the position by `count` bytes.
    fn skip(&mut self, count: u64) -> Result<()>;

    /// Move to an absolute position.
    fn seek_to(&mut self, position: u64) -> Result<()>;

    /// Current absolute position.
    fn position(&self) -> u64;

    /// Total length of the source.
    fn len(&self) -> u64;

    /// Bytes left between the position and the end.
    #[inline]
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    /// Whether the position has reached the end.
    #[inline]
    fn is_at_end(&self) -> bool {
        self.position() >= self.len()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_into(buf)
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        (**self).skip(count)
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        (**self).seek_to(position)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn len(&self) -> u64 {
        (**self).len()
    }
}

/// A source over bytes already in memory.
///
/// Works over anything that derefs to a byte slice: `Vec<u8>`, `&[u8]`, or a
/// memory-mapped file.
#[derive(Debug, Clone)]
pub struct MemorySource<B> {
    data: B,
    position: usize,
}

impl<B: AsRef<[u8]>> MemorySource<B> {
    #[inline]
    pub fn new(data: B) -> Self {
        Self { data, position: 0 }
    }

    /// The full underlying buffer.
    #[inline]
    pub fn get_ref(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Consume the source and return its buffer.
    #[inline]
    pub fn into_inner(self) -> B {
        self.data
    }
}

impl<B: AsRef<[u8]>> ByteSource for MemorySource<B> {
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let data = self.data.as_ref();
        let available = data.len().saturating_sub(self.position);
        if available < buf.len() {
            return Err(Error::UnexpectedEof {
                needed: buf.len() as u64,
                available: available as u64,
            });
        }
        buf.copy_from_slice(&data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let available = self.remaining();
        if available < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available,
            });
        }
        self.position += count as usize;
        Ok(())
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        let len = self.len();
        if position > len {
            return Err(Error::SeekOutOfRange { target: position, len });
        }
        self.position = position as usize;
        Ok(())
    }

    #[inline]
    fn position(&self) -> u64 {
        self.position as u64
    }

    #[inline]
    fn len(&self) -> u64 {
        self.data.as_ref().len() as u64
    }
}

/// A source over any seekable reader, such as a buffered file.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    position: u64,
    len: u64,
}

impl<R: Read + Seek> StreamSource<R> {
    /// Wrap a reader, measuring its length and starting from its current position.
    pub fn new(mut inner: R) -> Result<Self> {
        let position = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;
        Ok(Self {
            inner,
            position,
            len,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for StreamSource<R> {
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.remaining();
        if available < buf.len() as u64 {
            return Err(Error::UnexpectedEof {
                needed: buf.len() as u64,
                available,
            });
        }
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let available = self.remaining();
        if available < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available,
            });
        }
        self.position = self.inner.seek(SeekFrom::Start(self.position + count))?;
        Ok(())
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.len {
            return Err(Error::SeekOutOfRange {
                target: position,
                len: self.len,
            });
        }
        self.position = self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    #[inline]
    fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    fn len(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_memory_short_read_does_not_advance() {
        let mut source = MemorySource::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 4];

        assert!(matches!(
            source.read_exact_into(&mut buf),
            Err(Error::UnexpectedEof { needed: 4, available: 3 })
        ));
        assert_eq!(source.position(), 0);

        let mut buf = [0u8; 2];
        source.read_exact_into(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(source.position(), 2);
        assert!(!source.is_at_end());

        source.skip(1).unwrap();
        assert!(source.is_at_end());
        assert!(source.skip(1).is_err());
    }

    #[test]
    fn test_stream_matches_memory() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut stream = StreamSource::new(Cursor::new(data.clone())).unwrap();
        let mut memory = MemorySource::new(data);

        let mut a = [0u8; 5];
        let mut b = [0u8; 5];
        stream.skip(7).unwrap();
        memory.skip(7).unwrap();
        stream.read_exact_into(&mut a).unwrap();
        memory.read_exact_into(&mut b).unwrap();

        assert_eq!(a, b);
        assert_eq!(stream.position(), memory.position());
        assert_eq!(stream.remaining(), 20);

        stream.seek_to(0).unwrap();
        assert_eq!(stream.position(), 0);
        assert!(stream.seek_to(33).is_err());
    }
}
