//! Binary reader for subrecord payloads and fixed-size headers.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! little-endian values from a byte slice without copying.

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::{Error, FormId, Result, Tag};

/// A binary reader over a byte slice.
///
/// Subrecord payloads are small and fully materialized, so field decoders
/// read them through this type rather than through the archive stream.
///
/// # Example
///
/// ```
/// use skald_common::BinaryReader;
///
/// let data = [0x2A, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x01];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 42);
/// assert_eq!(reader.read_form_id().unwrap().slot(), 1);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count as u64,
                available: self.remaining() as u64,
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(LittleEndian::read_u16)
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_bytes(2).map(LittleEndian::read_i16)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(LittleEndian::read_u32)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_bytes(4).map(LittleEndian::read_i32)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_bytes(8).map(LittleEndian::read_u64)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_bytes(4).map(LittleEndian::read_f32)
    }

    /// Read a four-character code.
    #[inline]
    pub fn read_tag(&mut self) -> Result<Tag> {
        let bytes = self.read_bytes(4)?;
        Ok(Tag::new([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a raw (file-local) form id.
    #[inline]
    pub fn read_form_id(&mut self) -> Result<FormId> {
        self.read_u32().map(FormId::new)
    }

    /// Read a fixed-length, zero-terminated string.
    ///
    /// Returns the decoded text and whether the terminator was present.
    pub fn read_zstring(&mut self, length: usize) -> Result<(Cow<'a, str>, bool)> {
        let bytes = self.read_bytes(length)?;
        Ok(decode_zstring(bytes))
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size as u64,
            available: bytes.len() as u64,
        })
    }
}

/// Decode a zero-terminated string whose length comes from its header.
///
/// The last byte is always dropped. When it is not `0x00` the second value is
/// `false` so the caller can report it; the text is still produced. Bytes that
/// are not UTF-8 are replaced rather than rejected, since archives predate any
/// encoding rule.
pub fn decode_zstring(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    match bytes.split_last() {
        Some((&last, body)) => {
            let body = match memchr::memchr(0, body) {
                Some(end) if last == 0 => &body[..end],
                _ => body,
            };
            (String::from_utf8_lossy(body), last == 0)
        }
        None => (Cow::Borrowed(""), false),
    }
}
