//! Walking whole archives through the cursor.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use skald_esm::{
    Chunk, Cursor, CursorState, Error, FormId, GroupLabel, HeaderFormat, MemorySource, ReaderOptions, Tag,
};

fn cursor(format: HeaderFormat, bytes: Vec<u8>) -> Cursor<MemorySource<Vec<u8>>> {
    Cursor::new(MemorySource::new(bytes), format)
}

/// Describe every chunk and field, reading strings and integers by tag.
fn describe(cursor: &mut Cursor<MemorySource<Vec<u8>>>) -> skald_esm::Result<Vec<String>> {
    let mut events = Vec::new();
    while let Some(chunk) = cursor.next_chunk()? {
        match chunk {
            Chunk::GroupStart(header) => events.push(format!("group {:?}", header.label)),
            Chunk::GroupEnd(_) => events.push("end".to_string()),
            Chunk::Record(header) => {
                events.push(format!("record {} {}", header.tag, header.id));
                while cursor.next_sub_record_header()? {
                    let Some(sub) = cursor.sub_record_header().copied() else {
                        break;
                    };
                    let value = match sub.tag.as_bytes() {
                        b"EDID" => cursor.read_field_zstring()?,
                        b"DATA" => cursor.read_field_u32()?.to_string(),
                        _ => format!("{} bytes", cursor.read_field_bytes()?.len()),
                    };
                    events.push(format!("  {} {}", sub.tag, value));
                }
            }
        }
    }
    Ok(events)
}

#[test]
fn test_group_with_compressed_and_plain_records() {
    for format in [HeaderFormat::Tes4, HeaderFormat::Tes5] {
        let bytes = top_group(
            format,
            b"NPC_",
            &[
                compressed_record(format, b"NPC_", 1, &[sub(b"EDID", b"foo\0")]),
                record(format, b"NPC_", 2, &[sub(b"DATA", &42u32.to_le_bytes())]),
            ],
        );
        let mut cursor = cursor(format, bytes);

        assert_eq!(
            describe(&mut cursor).unwrap(),
            vec![
                format!("group {:?}", GroupLabel::RecordType(Tag::new(*b"NPC_"))),
                "record NPC_ 00000001".to_string(),
                "  EDID foo".to_string(),
                "record NPC_ 00000002".to_string(),
                "  DATA 42".to_string(),
                "end".to_string(),
            ]
        );
        assert_eq!(cursor.current_group_stack_depth(), 0);
        assert!(cursor.next_chunk().unwrap().is_none());
    }
}

#[test]
fn test_nested_groups_close_innermost_first() {
    let format = HeaderFormat::Tes4;
    let cell = record(format, b"CELL", 0x3C, &[sub(b"EDID", b"cell\0")]);
    let refr = record(format, b"REFR", 0x3D, &[]);
    let children = group(format, 0x3C, 6, &[group(format, 0x3C, 9, &[refr])]);
    let block = group(format, 0x0003_FFFE, 4, &[cell, children]);
    let bytes = [top_group(format, b"WRLD", &[block]), top_group(format, b"GMST", &[])].concat();
    let mut cursor = cursor(format, bytes);

    assert_eq!(
        describe(&mut cursor).unwrap(),
        vec![
            "group RecordType(Tag(WRLD))".to_string(),
            "group Grid { x: 3, y: -2 }".to_string(),
            "record CELL 0000003C".to_string(),
            "  EDID cell".to_string(),
            format!("group {:?}", GroupLabel::FormId(FormId::new(0x3C))),
            format!("group {:?}", GroupLabel::FormId(FormId::new(0x3C))),
            "record REFR 0000003D".to_string(),
            "end".to_string(),
            "end".to_string(),
            "end".to_string(),
            "end".to_string(),
            "group RecordType(Tag(GMST))".to_string(),
            "end".to_string(),
        ]
    );
}

#[test]
fn test_compressed_payload_swaps_streams() {
    let format = HeaderFormat::Tes5;
    let subs = [sub(b"EDID", b"IronSword\0"), sub(b"DATA", &25u32.to_le_bytes())];
    let first = compressed_record(format, b"WEAP", 0x12EB7, &subs);
    let first_len = first.len() as u64;
    let bytes = [first, record(format, b"WEAP", 0x12EB8, &subs)].concat();
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    let header = *cursor.record_header().unwrap();
    assert!(header.is_compressed());
    assert_eq!(cursor.position(), format.header_size() as u64);

    cursor.enter_compressed_payload().unwrap();
    // The archive stream is already past the whole record.
    assert_eq!(cursor.position(), header.total_size(format));
    assert_eq!(cursor.position(), first_len);
    cursor.enter_compressed_payload().unwrap();

    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "IronSword");
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_u32().unwrap(), 25);
    assert!(!cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.position(), first_len);

    assert!(cursor.next_record_header().unwrap());
    assert_eq!(cursor.record_header().unwrap().id, FormId::new(0x12EB8));
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "IronSword");
}

#[test]
fn test_skipping_compressed_record_never_inflates() {
    let format = HeaderFormat::Tes4;
    let garbage = [16, 0, 0, 0, 1, 2, 3, 4, 5];
    let bytes = [
        record_with_flags(format, b"LAND", 1, FLAG_COMPRESSED, &garbage),
        record_with_flags(format, b"LAND", 2, FLAG_COMPRESSED, &garbage),
        record(format, b"GMST", 3, &[sub(b"DATA", &7u32.to_le_bytes())]),
    ]
    .concat();
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    cursor.skip_record().unwrap();
    // Moving on without touching the payload skips it as well.
    assert!(cursor.next_record_header().unwrap());
    assert!(cursor.next_record_header().unwrap());
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_u32().unwrap(), 7);

    let mut cursor = self::cursor(format, record_with_flags(format, b"LAND", 1, FLAG_COMPRESSED, &garbage));
    assert!(cursor.next_record_header().unwrap());
    assert!(matches!(cursor.next_sub_record_header(), Err(Error::Decompression(_))));
}

#[test]
fn test_pushback_returns_same_header_without_moving() {
    let format = HeaderFormat::Tes4;
    let bytes = record(
        format,
        b"NPC_",
        1,
        &[sub(b"EDID", b"guard\0"), sub(b"FULL", b"Guard\0")],
    );
    let mut cursor = cursor(format, bytes);
    assert!(cursor.next_record_header().unwrap());

    assert!(cursor.next_sub_record_header().unwrap());
    let first = *cursor.sub_record_header().unwrap();
    let position = cursor.position();

    cursor.pushback_sub_record_header().unwrap();
    assert_eq!(cursor.position(), position);
    assert_eq!(cursor.state(), CursorState::InRecord);
    assert!(matches!(cursor.pushback_sub_record_header(), Err(Error::DoublePushback)));

    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(*cursor.sub_record_header().unwrap(), first);
    assert_eq!(cursor.position(), position);

    cursor.pushback_sub_record_header().unwrap();
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "guard");
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "Guard");
}

#[test]
fn test_double_pushback() {
    let format = HeaderFormat::Tes4;
    let bytes = record(format, b"NPC_", 1, &[sub(b"EDID", b"a\0"), sub(b"FULL", b"b\0")]);
    let mut cursor = cursor(format, bytes);
    assert!(cursor.next_record_header().unwrap());

    assert!(cursor.next_sub_record_header().unwrap());
    cursor.pushback_sub_record_header().unwrap();
    assert!(cursor.next_sub_record_header().unwrap());
    cursor.pushback_sub_record_header().unwrap();
    assert!(matches!(cursor.pushback_sub_record_header(), Err(Error::DoublePushback)));

    // The held header survives the failed call.
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "a");
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "b");

    // After a consumed payload there is nothing to push back.
    assert!(matches!(cursor.pushback_sub_record_header(), Err(Error::InvalidPushback)));
}

#[test]
fn test_oversized_field_inside_compressed_record() {
    let format = HeaderFormat::Tes5;
    let big: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    let bytes = compressed_record(
        format,
        b"WRLD",
        0x3C,
        &[oversize_sub(b"OFST", &big), sub(b"EDID", b"Tamriel\0")],
    );
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    assert!(cursor.next_sub_record_header().unwrap());
    let header = *cursor.sub_record_header().unwrap();
    assert_eq!(header.tag, Tag::new(*b"OFST"));
    assert_eq!(header.data_size, 100_000);
    assert_eq!(cursor.read_field_bytes().unwrap(), big);
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "Tamriel");
    assert!(!cursor.has_more_sub_records().unwrap());
}

#[test]
fn test_unterminated_string_drops_last_byte() {
    let format = HeaderFormat::Tes4;
    let bytes = record(format, b"BOOK", 1, &[sub(b"FULL", b"Lusty"), sub(b"DESC", b"a\0b\0")]);
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "Lust");
    assert!(cursor.next_sub_record_header().unwrap());
    assert_eq!(cursor.read_field_zstring().unwrap(), "a");
}

#[test]
fn test_truncated_archive() {
    let format = HeaderFormat::Tes4;
    let mut bytes = top_group(format, b"GMST", &[record(format, b"GMST", 1, &[sub(b"DATA", &[0; 4])])]);
    bytes.truncate(bytes.len() - 2);
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    assert!(matches!(cursor.next_chunk(), Err(Error::TruncatedArchive { .. })));

    // A partial header at the very end.
    let mut cursor = self::cursor(format, b"GRUP\x30\0\0\0".to_vec());
    assert!(matches!(cursor.next_chunk(), Err(Error::TruncatedArchive { offset: 0, .. })));
}

#[test]
fn test_end_of_data_inside_group() {
    let format = HeaderFormat::Tes4;
    let record = record(format, b"GMST", 1, &[]);
    let mut bytes = top_group(format, b"GMST", &[record.clone(), record.clone()]);
    bytes.truncate(bytes.len() - record.len());
    let mut cursor = cursor(format, bytes);

    assert!(cursor.next_record_header().unwrap());
    assert!(matches!(cursor.next_chunk(), Err(Error::ArchiveCorrupt { .. })));
}

#[test]
fn test_group_overrun_is_fatal_unless_tolerated() {
    let format = HeaderFormat::Tes4;
    let inner = group(format, 1, 7, &[record(format, b"INFO", 1, &[])]);
    let mut bytes = top_group(format, b"DIAL", &[inner]);
    // Shrink the outer group so the inner one no longer fits.
    let outer_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) - 4;
    bytes[4..8].copy_from_slice(&outer_size.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);

    let mut strict = cursor(format, bytes.clone());
    assert!(matches!(strict.next_chunk().unwrap(), Some(Chunk::GroupStart(_))));
    assert!(matches!(strict.next_chunk(), Err(Error::ArchiveCorrupt { .. })));

    let mut lenient = cursor(format, bytes).with_options(ReaderOptions::default().tolerate_group_overrun(true));
    assert!(matches!(lenient.next_chunk().unwrap(), Some(Chunk::GroupStart(_))));
    assert!(matches!(lenient.next_chunk().unwrap(), Some(Chunk::GroupStart(_))));
    assert!(matches!(lenient.next_chunk().unwrap(), Some(Chunk::Record(_))));
    assert!(matches!(lenient.next_chunk().unwrap(), Some(Chunk::GroupEnd(_))));
    assert!(matches!(lenient.next_chunk().unwrap(), Some(Chunk::GroupEnd(_))));
    assert_eq!(lenient.current_group_stack_depth(), 0);
}

#[test]
fn test_record_overrunning_group_is_corrupt() {
    let format = HeaderFormat::Tes4;
    let mut bytes = top_group(format, b"GMST", &[record(format, b"GMST", 1, &[sub(b"DATA", &[0; 4])])]);
    let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) - 1;
    bytes[4..8].copy_from_slice(&size.to_le_bytes());
    let mut cursor = cursor(format, bytes);

    assert!(matches!(cursor.next_record_header(), Err(Error::ArchiveCorrupt { offset: 20, .. })));
}
