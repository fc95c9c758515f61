//! The archive header record and opening archives from disk.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use memmap2::Mmap;
use skald_common::{BinaryReader, ByteSource, FormId, MemorySource, StreamSource};

use crate::cursor::{Chunk, Cursor};
use crate::header::{HeaderFormat, RecordHeader, ARCHIVE_HEADER_TAG, MAX_HEADER_SIZE};
use crate::rebase::LoadOrder;
use crate::{Error, ReaderOptions, Result};

/// A master file declared by an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterFile {
    pub name: String,
    /// Size recorded when the archive was saved; usually zero.
    pub size: Option<u64>,
}

/// Contents of the `TES4` record that opens every archive.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchiveHeader {
    pub format: HeaderFormat,
    pub record: RecordHeader,
    pub version: f32,
    /// Number of records and groups in the archive.
    pub record_count: u32,
    pub next_object_id: u32,
    pub author: Option<String>,
    pub description: Option<String>,
    /// Declared masters, in the order form id slots refer to them.
    pub masters: Vec<MasterFile>,
    /// Raw ids of master records this archive overrides.
    pub overrides: Vec<FormId>,
    pub intv: Option<u32>,
    pub incc: Option<u32>,
}

impl ArchiveHeader {
    pub const FLAG_MASTER: u32 = 0x0000_0001;
    pub const FLAG_LOCALIZED: u32 = 0x0000_0080;

    #[inline]
    pub fn is_master(&self) -> bool {
        self.record.flags & Self::FLAG_MASTER != 0
    }

    /// Strings live in external string tables instead of the records.
    #[inline]
    pub fn is_localized(&self) -> bool {
        self.record.flags & Self::FLAG_LOCALIZED != 0
    }

    pub fn master_names(&self) -> Vec<&str> {
        self.masters.iter().map(|master| master.name.as_str()).collect()
    }

    /// Read the header record at the cursor's position.
    ///
    /// Unknown subrecords are skipped. A `DATA` subrecord belongs to the
    /// `MAST` right before it.
    pub fn read<S: ByteSource>(cursor: &mut Cursor<S>) -> Result<Self> {
        let record = match cursor.next_chunk()? {
            Some(Chunk::Record(record)) if record.tag == ARCHIVE_HEADER_TAG => record,
            Some(Chunk::Record(record)) => {
                return Err(Error::InvalidArchiveHeader(format!(
                    "first record is {}, expected {ARCHIVE_HEADER_TAG}",
                    record.tag
                )))
            }
            Some(_) => return Err(Error::InvalidArchiveHeader("archive starts with a group".into())),
            None => return Err(Error::InvalidArchiveHeader("archive is empty".into())),
        };

        let mut header = Self {
            format: cursor.format(),
            record,
            version: 0.0,
            record_count: 0,
            next_object_id: 0,
            author: None,
            description: None,
            masters: Vec::new(),
            overrides: Vec::new(),
            intv: None,
            incc: None,
        };
        let mut saw_hedr = false;

        while cursor.next_sub_record_header()? {
            let Some(sub) = cursor.sub_record_header().copied() else {
                break;
            };

            match sub.tag.as_bytes() {
                b"HEDR" => {
                    let bytes = cursor.read_field_bytes()?;
                    let mut reader = BinaryReader::new(&bytes);
                    let invalid = |e: skald_common::Error| Error::InvalidArchiveHeader(format!("HEDR: {e}"));
                    header.version = reader.read_f32().map_err(invalid)?;
                    header.record_count = reader.read_u32().map_err(invalid)?;
                    header.next_object_id = reader.read_u32().map_err(invalid)?;
                    saw_hedr = true;
                }
                b"CNAM" => header.author = Some(cursor.read_field_zstring()?),
                b"SNAM" => header.description = Some(cursor.read_field_zstring()?),
                b"MAST" => header.masters.push(MasterFile {
                    name: cursor.read_field_zstring()?,
                    size: None,
                }),
                b"DATA" => match header.masters.last_mut() {
                    Some(master) if master.size.is_none() => master.size = Some(cursor.read_field_u64()?),
                    _ => cursor.skip_field()?,
                },
                b"ONAM" => {
                    let bytes = cursor.read_field_bytes()?;
                    let mut reader = BinaryReader::new(&bytes);
                    while reader.remaining() >= 4 {
                        let id = reader
                            .read_form_id()
                            .map_err(|e| Error::InvalidArchiveHeader(format!("ONAM: {e}")))?;
                        header.overrides.push(id);
                    }
                }
                b"INTV" => header.intv = Some(cursor.read_field_u32()?),
                b"INCC" => header.incc = Some(cursor.read_field_u32()?),
                _ => cursor.skip_field()?,
            }
        }

        if !saw_hedr {
            return Err(Error::InvalidArchiveHeader("missing HEDR subrecord".into()));
        }
        Ok(header)
    }
}

/// Tell the header revision from the archive's first bytes.
///
/// The header record's first subrecord is `HEDR`; it sits right after a
/// 20-byte header and four bytes later after a 24-byte one. The source is
/// left where it was.
pub fn detect_format<S: ByteSource>(source: &mut S) -> Result<HeaderFormat> {
    let start = source.position();
    let available = source.remaining().min(MAX_HEADER_SIZE as u64) as usize;
    if available < HeaderFormat::Tes4.header_size() {
        return Err(Error::InvalidArchiveHeader(format!(
            "{available} bytes is too short for an archive header"
        )));
    }

    let mut probe = [0u8; MAX_HEADER_SIZE];
    source
        .read_exact_into(&mut probe[..available])
        .map_err(|e| Error::from_source(start, e))?;
    source.seek_to(start).map_err(|e| Error::from_source(start, e))?;

    if probe[..4] != *ARCHIVE_HEADER_TAG.as_bytes() {
        return Err(Error::InvalidArchiveHeader(format!(
            "archive starts with {}, expected {ARCHIVE_HEADER_TAG}",
            skald_common::Tag::new([probe[0], probe[1], probe[2], probe[3]])
        )));
    }

    if available < MAX_HEADER_SIZE || &probe[20..24] == b"HEDR" {
        Ok(HeaderFormat::Tes4)
    } else {
        Ok(HeaderFormat::Tes5)
    }
}

/// Memory-map an archive and open it against `load_order`.
///
/// The archive is looked up in the load order by its file name.
pub fn open_archive<P: AsRef<Path>>(
    path: P,
    load_order: &LoadOrder,
    options: ReaderOptions,
) -> Result<Cursor<MemorySource<Mmap>>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let name = file_name(path);
    Cursor::open(MemorySource::new(mmap), &name, load_order, options)
}

/// Read only the header record of an archive on disk.
///
/// Reads through a buffered stream, so only the first record is touched.
pub fn read_archive_header<P: AsRef<Path>>(path: P) -> Result<ArchiveHeader> {
    let file = File::open(path.as_ref())?;
    let mut source = StreamSource::new(BufReader::new(file)).map_err(|e| Error::from_source(0, e))?;
    let format = detect_format(&mut source)?;
    ArchiveHeader::read(&mut Cursor::new(source, format))
}

/// File name of `path`, as used for load order lookups.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
