//! Helpers for building archives in memory.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use skald_esm::HeaderFormat;

pub const FLAG_COMPRESSED: u32 = 0x0004_0000;

/// A subrecord with a 16-bit size.
pub fn sub(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
    out.extend_from_slice(payload);
    out
}

/// A subrecord too large for its size field, announced by `XXXX`.
pub fn oversize_sub(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = sub(b"XXXX", &(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(tag);
    out.write_u16::<LittleEndian>(0).unwrap();
    out.extend_from_slice(payload);
    out
}

fn record_header(format: HeaderFormat, tag: &[u8; 4], data_size: usize, flags: u32, id: u32) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.write_u32::<LittleEndian>(data_size as u32).unwrap();
    out.write_u32::<LittleEndian>(flags).unwrap();
    out.write_u32::<LittleEndian>(id).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    if format == HeaderFormat::Tes5 {
        out.write_u16::<LittleEndian>(44).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
    }
    out
}

/// A record holding `subs` as stored.
pub fn record(format: HeaderFormat, tag: &[u8; 4], id: u32, subs: &[Vec<u8>]) -> Vec<u8> {
    record_with_flags(format, tag, id, 0, &subs.concat())
}

/// A record with a raw payload and explicit flags.
pub fn record_with_flags(format: HeaderFormat, tag: &[u8; 4], id: u32, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = record_header(format, tag, payload.len(), flags, id);
    out.extend_from_slice(payload);
    out
}

/// A size prefix followed by the zlib stream of `data`.
pub fn compress_payload(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A record whose subrecords are stored compressed.
pub fn compressed_record(format: HeaderFormat, tag: &[u8; 4], id: u32, subs: &[Vec<u8>]) -> Vec<u8> {
    let payload = compress_payload(&subs.concat());
    record_with_flags(format, tag, id, FLAG_COMPRESSED, &payload)
}

/// A group of the given kind around already-encoded children.
pub fn group(format: HeaderFormat, label: u32, kind: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let content = children.concat();
    let mut out = b"GRUP".to_vec();
    out.write_u32::<LittleEndian>((format.header_size() + content.len()) as u32).unwrap();
    out.write_u32::<LittleEndian>(label).unwrap();
    out.write_u32::<LittleEndian>(kind).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    if format == HeaderFormat::Tes5 {
        out.write_u32::<LittleEndian>(0).unwrap();
    }
    out.extend_from_slice(&content);
    out
}

/// A top-level group labelled with the record type it holds.
pub fn top_group(format: HeaderFormat, tag: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    group(format, u32::from_le_bytes(*tag), 0, children)
}

/// A `TES4` header record declaring `masters`.
pub fn archive_header(format: HeaderFormat, flags: u32, masters: &[&str]) -> Vec<u8> {
    let mut hedr = Vec::new();
    hedr.write_f32::<LittleEndian>(1.7).unwrap();
    hedr.write_u32::<LittleEndian>(0).unwrap();
    hedr.write_u32::<LittleEndian>(0x800).unwrap();

    let mut subs = vec![sub(b"HEDR", &hedr), sub(b"CNAM", b"tests\0")];
    for master in masters {
        let mut name = master.as_bytes().to_vec();
        name.push(0);
        subs.push(sub(b"MAST", &name));
        subs.push(sub(b"DATA", &0u64.to_le_bytes()));
    }
    record_with_flags(format, b"TES4", 0, flags, &subs.concat())
}
