//! The group/record/subrecord cursor.
//!
//! The cursor walks the chunk hierarchy of one archive. It keeps a stack of
//! open groups, each with a count of content bytes not yet accounted for; the
//! innermost count alone decides whether another chunk follows. Tags are never
//! used to find boundaries, so unknown record and subrecord types are walked
//! like any other.
//!
//! A record is charged to its group in full when its header is read. Whatever
//! part of the record the caller leaves unread is skipped before the next
//! header, so the stream never drifts from the accounting even when a decoder
//! gives up halfway through a record.
//!
//! Compressed records are inflated on first access. Until the cursor moves to
//! the next chunk, subrecord reads come from the inflated buffer while the
//! archive stream already sits at the record's end.

use std::fmt;

use skald_common::{decode_zstring, ByteSource, FormId, MemorySource, Tag};
use tracing::{debug, trace, warn};

use crate::decompress;
use crate::header::{
    ChunkHeader, GroupHeader, HeaderFormat, RecordHeader, SubRecordHeader, MAX_HEADER_SIZE,
    OVERSIZE_TAG, SUB_RECORD_HEADER_SIZE,
};
use crate::progress::{NoProgress, ProgressObserver};
use crate::rebase::{LoadOrder, RebaseTable};
use crate::{archive, ArchiveHeader, Error, ReaderOptions, Result};

/// One step through the chunk hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    GroupStart(GroupHeader),
    /// Emitted once per closed group; nested groups ending together close
    /// innermost first.
    GroupEnd(GroupHeader),
    Record(RecordHeader),
}

/// Where the cursor is within the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No record open.
    Idle,
    /// A record header has been read.
    InRecord,
    /// A subrecord header has been read and its payload is pending.
    InSubRecord,
}

/// An open group on the cursor's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupFrame {
    pub header: GroupHeader,
    /// Archive offset of the group header.
    pub offset: u64,
    /// Content bytes not yet consumed by children.
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct OpenRecord {
    header: RecordHeader,
    /// Archive offset of the record header.
    offset: u64,
    /// Archive offset just past the record.
    end: u64,
    /// End of subrecord data in the active stream.
    data_end: u64,
}

/// A reader over the groups, records and subrecords of one archive.
pub struct Cursor<S> {
    source: S,
    format: HeaderFormat,
    options: ReaderOptions,
    rebase: RebaseTable,
    archive: Option<ArchiveHeader>,
    observer: Box<dyn ProgressObserver + Send>,
    groups: Vec<GroupFrame>,
    record: Option<OpenRecord>,
    sub: Option<SubRecordHeader>,
    pushback: Option<SubRecordHeader>,
    inflated: Option<MemorySource<Vec<u8>>>,
}

impl<S: ByteSource> Cursor<S> {
    /// Create a cursor over a source positioned at a chunk header.
    ///
    /// No archive header is parsed and no rebasing is set up; see
    /// [`Cursor::open`] for that.
    pub fn new(source: S, format: HeaderFormat) -> Self {
        Self {
            source,
            format,
            options: ReaderOptions::default(),
            rebase: RebaseTable::default(),
            archive: None,
            observer: Box::new(NoProgress),
            groups: Vec::new(),
            record: None,
            sub: None,
            pushback: None,
            inflated: None,
        }
    }

    /// Open an archive: detect its format, read its header record and build
    /// its rebase table against `load_order`.
    pub fn open(mut source: S, name: &str, load_order: &LoadOrder, options: ReaderOptions) -> Result<Self> {
        let format = match options.format {
            Some(format) => format,
            None => archive::detect_format(&mut source)?,
        };

        let mut cursor = Self::new(source, format).with_options(options);
        let header = ArchiveHeader::read(&mut cursor)?;

        let table = load_order.rebase_table(name, header.master_names().as_slice())?;
        if options.require_primary_master {
            table.verify_primary_master()?;
        }
        debug!(
            archive = name,
            ?format,
            masters = header.masters.len(),
            records = header.record_count,
            "opened archive"
        );

        cursor.rebase = table;
        cursor.archive = Some(header);
        Ok(cursor)
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rebase_table(mut self, table: RebaseTable) -> Self {
        self.rebase = table;
        self
    }

    pub fn with_observer<O: ProgressObserver + Send + 'static>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    #[inline]
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    #[inline]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// The parsed archive header, when opened through [`Cursor::open`].
    #[inline]
    pub fn archive_header(&self) -> Option<&ArchiveHeader> {
        self.archive.as_ref()
    }

    #[inline]
    pub fn rebase_table(&self) -> &RebaseTable {
        &self.rebase
    }

    /// Position in the archive stream.
    #[inline]
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Length of the archive stream.
    #[inline]
    pub fn len(&self) -> u64 {
        self.source.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.source.len() == 0
    }

    pub fn state(&self) -> CursorState {
        match (&self.record, &self.sub) {
            (None, _) => CursorState::Idle,
            (Some(_), Some(_)) => CursorState::InSubRecord,
            (Some(_), None) => CursorState::InRecord,
        }
    }

    /// Open groups, outermost first.
    #[inline]
    pub fn group_stack(&self) -> &[GroupFrame] {
        &self.groups
    }

    #[inline]
    pub fn current_group_stack_depth(&self) -> usize {
        self.groups.len()
    }

    /// Header of the open record.
    #[inline]
    pub fn record_header(&self) -> Option<&RecordHeader> {
        self.record.as_ref().map(|record| &record.header)
    }

    /// Header of the subrecord whose payload is pending.
    #[inline]
    pub fn sub_record_header(&self) -> Option<&SubRecordHeader> {
        self.sub.as_ref()
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Advance to the next group boundary or record.
    ///
    /// Returns `None` at the end of the archive. Running out of data while
    /// groups are still open is [`Error::ArchiveCorrupt`].
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        self.finish_record()?;

        if let Some(frame) = self.groups.last() {
            if frame.remaining == 0 {
                return self.close_group().map(|header| Some(Chunk::GroupEnd(header)));
            }
            if self.source.is_at_end() {
                return Err(Error::corrupt(
                    self.source.position(),
                    format!(
                        "end of data with {} groups open, {} bytes still claimed",
                        self.groups.len(),
                        frame.remaining
                    ),
                ));
            }
        } else if self.source.is_at_end() {
            return Ok(None);
        }

        let offset = self.source.position();
        let header_size = self.format.header_size();
        let mut buf = [0u8; MAX_HEADER_SIZE];
        self.read_outer(&mut buf[..header_size])?;

        match ChunkHeader::parse(&buf[..header_size], self.format).map_err(|e| Error::from_source(offset, e))? {
            ChunkHeader::Group(header) => {
                self.open_group(header, offset)?;
                Ok(Some(Chunk::GroupStart(header)))
            }
            ChunkHeader::Record(header) => {
                self.open_record(header, offset)?;
                Ok(Some(Chunk::Record(header)))
            }
        }
    }

    /// Read the next record header, entering nested groups on the way.
    ///
    /// Returns `false` when the innermost group (or the archive) ends; calling
    /// again continues in the enclosing group.
    pub fn next_record_header(&mut self) -> Result<bool> {
        loop {
            match self.next_chunk()? {
                Some(Chunk::Record(_)) => return Ok(true),
                Some(Chunk::GroupStart(_)) => continue,
                Some(Chunk::GroupEnd(_)) | None => return Ok(false),
            }
        }
    }

    /// Discard the rest of the open record without inflating it.
    pub fn skip_record(&mut self) -> Result<()> {
        if self.record.is_none() {
            return Err(Error::NotInRecord);
        }
        self.finish_record()
    }

    /// Discard the rest of the innermost group.
    ///
    /// The group is closed by the next call to [`Cursor::next_chunk`].
    pub fn skip_group(&mut self) -> Result<()> {
        self.finish_record()?;
        let Some(frame) = self.groups.last_mut() else {
            return Err(Error::NotInGroup);
        };
        let remaining = std::mem::take(&mut frame.remaining);
        self.skip_outer(u64::from(remaining))
    }

    /// Read the next subrecord header of the open record.
    ///
    /// A pushed-back header is returned first. An unread payload of the
    /// previous subrecord is skipped. Returns `false` at the end of the record.
    pub fn next_sub_record_header(&mut self) -> Result<bool> {
        let Some(record) = self.record else {
            return Err(Error::NotInRecord);
        };

        if let Some(header) = self.pushback.take() {
            self.sub = Some(header);
            return Ok(true);
        }

        if record.header.is_compressed() && self.inflated.is_none() {
            self.enter_compressed_payload()?;
        }

        if let Some(pending) = self.sub.take() {
            self.skip_active(u64::from(pending.data_size))?;
        }

        let data_end = self.record.map_or(record.data_end, |record| record.data_end);
        if self.active_position() >= data_end {
            return Ok(false);
        }

        let header = self.read_sub_record_header(data_end)?;
        self.sub = Some(header);
        Ok(true)
    }

    /// Hand the current subrecord header back so the next
    /// [`Cursor::next_sub_record_header`] returns it again.
    ///
    /// The stream does not move; the payload stays unread. Only one header
    /// can be held at a time.
    pub fn pushback_sub_record_header(&mut self) -> Result<()> {
        if self.pushback.is_some() {
            return Err(Error::DoublePushback);
        }
        let header = self.sub.take().ok_or(Error::InvalidPushback)?;
        self.pushback = Some(header);
        Ok(())
    }

    /// Whether another subrecord follows in the open record.
    pub fn has_more_sub_records(&mut self) -> Result<bool> {
        let Some(record) = self.record else {
            return Ok(false);
        };
        if self.pushback.is_some() {
            return Ok(true);
        }
        if record.header.is_compressed() && self.inflated.is_none() {
            self.enter_compressed_payload()?;
        }

        let data_end = self.record.map_or(record.data_end, |record| record.data_end);
        let pending = self.sub.map_or(0, |sub| u64::from(sub.data_size));
        Ok(self.active_position() + pending < data_end)
    }

    /// Inflate the open record's payload and read subrecords from it.
    ///
    /// Called on first subrecord access of a compressed record; calling it
    /// again, or on an uncompressed record, does nothing.
    pub fn enter_compressed_payload(&mut self) -> Result<()> {
        let Some(record) = self.record else {
            return Err(Error::NotInRecord);
        };
        if !record.header.is_compressed() || self.inflated.is_some() {
            return Ok(());
        }

        let data_size = record.header.data_size;
        if (data_size as usize) < decompress::SIZE_PREFIX_LEN {
            return Err(Error::corrupt(
                record.offset,
                format!("compressed record {} of {} bytes has no size prefix", record.header.tag, data_size),
            ));
        }
        let data_start = record.end - u64::from(data_size);
        if self.source.position() != data_start {
            return Err(Error::corrupt(
                self.source.position(),
                format!("compressed record {} was partially read before inflating", record.header.tag),
            ));
        }

        let mut payload = vec![0u8; data_size as usize];
        self.read_outer(&mut payload)?;
        let data = decompress::inflate_payload(&payload)?;

        debug!(
            offset = record.offset,
            tag = %record.header.tag,
            compressed = data_size,
            inflated = data.len(),
            "inflated record payload"
        );

        if let Some(open) = self.record.as_mut() {
            open.data_end = data.len() as u64;
        }
        self.inflated = Some(MemorySource::new(data));
        Ok(())
    }

    /// Read the pending payload into `buf`, which must match its declared size.
    pub fn read_field(&mut self, buf: &mut [u8]) -> Result<()> {
        let header = self.sub.ok_or(Error::NotInSubRecord)?;
        if buf.len() != header.data_size as usize {
            return Err(Error::FieldSizeMismatch {
                tag: header.tag,
                declared: header.data_size,
                requested: buf.len(),
            });
        }
        self.read_active(buf)?;
        self.sub = None;
        Ok(())
    }

    /// Read the pending payload, whatever its size.
    pub fn read_field_bytes(&mut self) -> Result<Vec<u8>> {
        let header = self.sub.ok_or(Error::NotInSubRecord)?;
        let mut buf = vec![0u8; header.data_size as usize];
        self.read_field(&mut buf)?;
        Ok(buf)
    }

    /// Discard the pending payload.
    pub fn skip_field(&mut self) -> Result<()> {
        let header = self.sub.take().ok_or(Error::NotInSubRecord)?;
        self.skip_active(u64::from(header.data_size))
    }

    fn read_field_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_field(&mut buf)?;
        Ok(buf)
    }

    pub fn read_field_u8(&mut self) -> Result<u8> {
        self.read_field_array::<1>().map(|b| b[0])
    }

    pub fn read_field_u16(&mut self) -> Result<u16> {
        self.read_field_array().map(u16::from_le_bytes)
    }

    pub fn read_field_u32(&mut self) -> Result<u32> {
        self.read_field_array().map(u32::from_le_bytes)
    }

    pub fn read_field_i32(&mut self) -> Result<i32> {
        self.read_field_array().map(i32::from_le_bytes)
    }

    pub fn read_field_u64(&mut self) -> Result<u64> {
        self.read_field_array().map(u64::from_le_bytes)
    }

    pub fn read_field_f32(&mut self) -> Result<f32> {
        self.read_field_array().map(f32::from_le_bytes)
    }

    pub fn read_field_tag(&mut self) -> Result<Tag> {
        self.read_field_array().map(Tag::new)
    }

    /// Read a form id field and rebase it into the session's numbering.
    pub fn read_field_form_id(&mut self) -> Result<FormId> {
        let raw = FormId::new(self.read_field_u32()?);
        Ok(self.rebase_form_id(raw))
    }

    /// Read a zero-terminated string field.
    ///
    /// A missing terminator is logged and the last byte is dropped anyway.
    pub fn read_field_zstring(&mut self) -> Result<String> {
        let header = self.sub.ok_or(Error::NotInSubRecord)?;
        let offset = self.active_position();
        let bytes = self.read_field_bytes()?;

        let (text, terminated) = decode_zstring(&bytes);
        if !terminated {
            warn!(
                tag = %header.tag,
                size = header.data_size,
                offset,
                record = ?self.record.map(|record| record.header.tag),
                "string field is not zero-terminated"
            );
        }
        Ok(text.into_owned())
    }

    /// Map a raw form id from this archive into the session's numbering.
    #[inline]
    pub fn rebase_form_id(&self, raw: FormId) -> FormId {
        self.rebase.rebase(raw)
    }

    fn open_group(&mut self, header: GroupHeader, offset: u64) -> Result<()> {
        let Some(content) = header.content_size(self.format) else {
            return Err(Error::corrupt(
                offset,
                format!(
                    "group size {} is smaller than its {}-byte header",
                    header.total_size,
                    self.format.header_size()
                ),
            ));
        };

        if let Some(parent) = self.groups.last() {
            if parent.remaining < header.total_size {
                let reason = format!(
                    "group of {} bytes exceeds the {} bytes left in its parent",
                    header.total_size, parent.remaining
                );
                if !self.options.tolerate_group_overrun {
                    return Err(Error::corrupt(offset, reason));
                }
                warn!(offset, "{reason}");
            }
        }

        debug!(
            offset,
            kind = ?header.kind,
            label = ?header.label,
            size = header.total_size,
            depth = self.groups.len(),
            "entering group"
        );
        self.groups.push(GroupFrame {
            header,
            offset,
            remaining: content,
        });
        Ok(())
    }

    /// Pop the innermost group and charge its full size to the parent.
    fn close_group(&mut self) -> Result<GroupHeader> {
        let frame = self.groups.pop().ok_or(Error::NotInGroup)?;
        let tolerate = self.options.tolerate_group_overrun;

        if let Some(parent) = self.groups.last_mut() {
            match parent.remaining.checked_sub(frame.header.total_size) {
                Some(left) => parent.remaining = left,
                None => {
                    let reason = format!(
                        "finished group of {} bytes exceeds the {} bytes left in its parent",
                        frame.header.total_size, parent.remaining
                    );
                    if !tolerate {
                        return Err(Error::corrupt(frame.offset, reason));
                    }
                    warn!(offset = frame.offset, "{reason}; clamping");
                    parent.remaining = 0;
                }
            }
        }

        debug!(offset = frame.offset, depth = self.groups.len(), "leaving group");
        Ok(frame.header)
    }

    fn open_record(&mut self, header: RecordHeader, offset: u64) -> Result<()> {
        let total = header.total_size(self.format);

        if let Some(frame) = self.groups.last_mut() {
            if u64::from(frame.remaining) < total {
                return Err(Error::corrupt(
                    offset,
                    format!(
                        "record {} of {} bytes exceeds the {} bytes left in its group",
                        header.tag, total, frame.remaining
                    ),
                ));
            }
            frame.remaining -= total as u32;
        }

        trace!(offset, tag = %header.tag, id = %header.id, size = header.data_size, "record");

        let end = offset + total;
        self.record = Some(OpenRecord {
            header,
            offset,
            end,
            data_end: end,
        });
        Ok(())
    }

    /// Close the open record, skipping whatever the caller left unread.
    fn finish_record(&mut self) -> Result<()> {
        let Some(record) = self.record.take() else {
            return Ok(());
        };
        self.sub = None;
        self.pushback = None;
        self.inflated = None;

        let position = self.source.position();
        if position > record.end {
            return Err(Error::corrupt(
                position,
                format!("read past the end of record {} ending at {:#x}", record.header.tag, record.end),
            ));
        }
        self.skip_outer(record.end - position)
    }

    fn read_sub_record_header(&mut self, data_end: u64) -> Result<SubRecordHeader> {
        let (mut tag, mut data_size) = self.read_raw_sub_record_header(data_end)?;

        if tag == OVERSIZE_TAG {
            let offset = self.active_position();
            if data_size != 4 || offset + 4 > data_end {
                return Err(Error::corrupt(
                    offset,
                    format!("{OVERSIZE_TAG} subrecord of {data_size} bytes, expected 4"),
                ));
            }
            let mut size = [0u8; 4];
            self.read_active(&mut size)?;

            // The following header's own size field is ignored.
            let (next_tag, _) = self.read_raw_sub_record_header(data_end)?;
            tag = next_tag;
            data_size = u32::from_le_bytes(size);
        }

        let offset = self.active_position();
        if offset + u64::from(data_size) > data_end {
            return Err(Error::corrupt(
                offset,
                format!(
                    "subrecord {tag} of {data_size} bytes overruns its record by {} bytes",
                    offset + u64::from(data_size) - data_end
                ),
            ));
        }

        Ok(SubRecordHeader { tag, data_size })
    }

    fn read_raw_sub_record_header(&mut self, data_end: u64) -> Result<(Tag, u32)> {
        let offset = self.active_position();
        if offset + SUB_RECORD_HEADER_SIZE as u64 > data_end {
            return Err(Error::corrupt(offset, "subrecord header crosses the end of its record"));
        }

        let mut buf = [0u8; SUB_RECORD_HEADER_SIZE];
        self.read_active(&mut buf)?;
        let tag = Tag::new([buf[0], buf[1], buf[2], buf[3]]);
        let data_size = u16::from_le_bytes([buf[4], buf[5]]);
        Ok((tag, u32::from(data_size)))
    }

    fn read_outer(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.source.position();
        self.source
            .read_exact_into(buf)
            .map_err(|e| Error::from_source(offset, e))?;
        self.observer.on_bytes_consumed(buf.len());
        Ok(())
    }

    fn skip_outer(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let offset = self.source.position();
        self.source.skip(count).map_err(|e| Error::from_source(offset, e))?;
        self.observer.on_bytes_consumed(count as usize);
        Ok(())
    }

    fn read_active(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inflated.as_mut() {
            Some(inflated) => {
                let offset = inflated.position();
                inflated
                    .read_exact_into(buf)
                    .map_err(|e| Error::from_source(offset, e))
            }
            None => self.read_outer(buf),
        }
    }

    fn skip_active(&mut self, count: u64) -> Result<()> {
        match self.inflated.as_mut() {
            Some(inflated) => {
                let offset = inflated.position();
                inflated.skip(count).map_err(|e| Error::from_source(offset, e))
            }
            None => self.skip_outer(count),
        }
    }

    /// Position in whichever stream subrecords are read from.
    fn active_position(&self) -> u64 {
        match &self.inflated {
            Some(inflated) => inflated.position(),
            None => self.source.position(),
        }
    }
}

impl<S> fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("format", &self.format)
            .field("groups", &self.groups)
            .field("record", &self.record.map(|record| record.header))
            .field("sub", &self.sub)
            .field("pushback", &self.pushback)
            .field("inflated", &self.inflated.as_ref().map(|inflated| inflated.len()))
            .finish_non_exhaustive()
    }
}
