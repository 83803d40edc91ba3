/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! RFC1952 gzip members

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    extent::ByteExtent,
    puff_error::{ExitCode, PuffError, Result, err_exit_code},
    size_probe::InflateProbe,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;

/// CRC-32 and ISIZE
const GZIP_TRAILER_SIZE: usize = 8;

/// Reads past the gzip member header, leaving the reader at the start of the deflate data.
fn skip_gzip_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut buffer = [0; 10];
    reader.read_exact(&mut buffer)?; // Read past the fixed 10-byte GZIP header

    if buffer[0..2] != GZIP_MAGIC {
        return err_exit_code(ExitCode::InvalidGzipHeader, "missing gzip magic");
    }

    if buffer[2] != 8 {
        return err_exit_code(ExitCode::InvalidGzipHeader, "Unsupported compression method");
    }

    let flags = buffer[3];

    if flags & FLAG_EXTRA != 0 {
        let extra_len = reader.read_u16::<LittleEndian>()?;
        let mut extra = vec![0; extra_len as usize];
        reader.read_exact(&mut extra)?;
    }

    if flags & FLAG_NAME != 0 {
        // null-terminated file name
        while reader.read_u8()? != 0 {}
    }

    if flags & FLAG_COMMENT != 0 {
        while reader.read_u8()? != 0 {}
    }

    if flags & FLAG_HCRC != 0 {
        reader.read_u16::<LittleEndian>()?;
    }

    Ok(())
}

/// Parses one gzip member at `pos` and returns its deflate extent and the position
/// after its trailer.
fn gzip_member(
    data: &[u8],
    pos: usize,
    probe: &impl InflateProbe,
) -> Result<(ByteExtent, usize)> {
    let mut cursor = Cursor::new(&data[pos..]);
    skip_gzip_header(&mut cursor).map_err(|e| {
        if e.exit_code() == ExitCode::ShortRead {
            PuffError::new(ExitCode::InvalidGzipHeader, "truncated gzip header")
        } else {
            e
        }
    })?;

    let deflate_start = pos + cursor.position() as usize;
    let sizes = probe.probe(data, deflate_start)?;

    let trailer_start = deflate_start + sizes.compressed_size as usize;
    let mut trailer = Cursor::new(data.get(trailer_start..).unwrap_or_default());
    let (crc32, input_size) = match (
        trailer.read_u32::<LittleEndian>(),
        trailer.read_u32::<LittleEndian>(),
    ) {
        (Ok(crc32), Ok(input_size)) => (crc32, input_size),
        _ => {
            return err_exit_code(ExitCode::OutOfBounds, "gzip trailer past end of data");
        }
    };

    if crc32 != sizes.crc32 {
        log::warn!(
            "CRC-32 in the gzip trailer: {:08x} doesn't match the data: {:08x}",
            crc32,
            sizes.crc32
        );
    }

    // ISIZE is the size modulo 2^32
    if input_size != sizes.uncompressed_size as u32 {
        log::warn!(
            "Size in the gzip trailer: {} doesn't equal the real size: {}",
            input_size,
            sizes.uncompressed_size
        );
    }

    Ok((
        ByteExtent::new(deflate_start as u64, sizes.compressed_size),
        trailer_start + GZIP_TRAILER_SIZE,
    ))
}

/// Returns the deflate extent of every member of a (possibly multi-member) gzip file.
///
/// The first member has to be valid. Anything after the last valid member that doesn't
/// look like another member is ignored.
pub fn locate_deflates_in_gzip(data: &[u8], probe: &impl InflateProbe) -> Result<Vec<ByteExtent>> {
    let (first, mut pos) = gzip_member(data, 0, probe)?;
    let mut deflates = vec![first];

    while pos < data.len() {
        match gzip_member(data, pos, probe) {
            Ok((deflate, next)) => {
                deflates.push(deflate);
                pos = next;
            }
            Err(e) => {
                log::debug!(
                    "stopping at offset {} after {} gzip members: {}",
                    pos,
                    deflates.len(),
                    e
                );
                break;
            }
        }
    }

    Ok(deflates)
}

#[cfg(test)]
use crate::size_probe::MinizInflateProbe;

#[cfg(test)]
fn gzip_member_bytes(content: &[u8], flags: u8) -> (Vec<u8>, Vec<u8>) {
    use byteorder::WriteBytesExt;

    let deflate = miniz_oxide::deflate::compress_to_vec(content, 6);

    let mut r = vec![0x1f, 0x8b, 8, flags, 0, 0, 0, 0, 0, 3];
    if flags & FLAG_EXTRA != 0 {
        r.write_u16::<LittleEndian>(4).unwrap();
        r.extend_from_slice(b"abcd");
    }
    if flags & FLAG_NAME != 0 {
        r.extend_from_slice(b"name.txt\0");
    }
    if flags & FLAG_COMMENT != 0 {
        r.extend_from_slice(b"a comment\0");
    }
    if flags & FLAG_HCRC != 0 {
        r.write_u16::<LittleEndian>(0x1234).unwrap();
    }
    r.extend_from_slice(&deflate);
    r.write_u32::<LittleEndian>(crc32fast::hash(content)).unwrap();
    r.write_u32::<LittleEndian>(content.len() as u32).unwrap();

    (r, deflate)
}

#[test]
fn gzip_single_member() {
    let (data, deflate) = gzip_member_bytes(b"hello gzip hello gzip", 0);

    assert_eq!(
        locate_deflates_in_gzip(&data, &MinizInflateProbe).unwrap(),
        [ByteExtent::new(10, deflate.len() as u64)]
    );
}

#[test]
fn gzip_optional_header_fields() {
    let flags = FLAG_EXTRA | FLAG_NAME | FLAG_COMMENT | FLAG_HCRC;
    let (data, deflate) = gzip_member_bytes(&[5u8; 1000], flags);

    // 10 fixed + 2 + 4 extra + 9 name + 10 comment + 2 header crc
    assert_eq!(
        locate_deflates_in_gzip(&data, &MinizInflateProbe).unwrap(),
        [ByteExtent::new(37, deflate.len() as u64)]
    );
}

#[test]
fn gzip_multiple_members() {
    crate::init_logging();

    let (mut data, first) = gzip_member_bytes(b"first member", FLAG_NAME);
    let second_start = data.len() + 10;
    let (second_member, second) = gzip_member_bytes(b"second member", 0);
    data.extend_from_slice(&second_member);

    // trailing garbage ends the scan without failing it
    data.extend_from_slice(&[0u8; 16]);

    assert_eq!(
        locate_deflates_in_gzip(&data, &MinizInflateProbe).unwrap(),
        [
            ByteExtent::new(19, first.len() as u64),
            ByteExtent::new(second_start as u64, second.len() as u64)
        ]
    );
}

#[test]
fn gzip_bad_first_member() {
    let (mut data, _) = gzip_member_bytes(b"content", 0);

    data[2] = 7;
    assert_eq!(
        locate_deflates_in_gzip(&data, &MinizInflateProbe)
            .unwrap_err()
            .exit_code(),
        ExitCode::InvalidGzipHeader
    );

    assert_eq!(
        locate_deflates_in_gzip(&data[..5], &MinizInflateProbe)
            .unwrap_err()
            .exit_code(),
        ExitCode::InvalidGzipHeader
    );

    assert_eq!(
        locate_deflates_in_gzip(b"not a gzip file at all", &MinizInflateProbe)
            .unwrap_err()
            .exit_code(),
        ExitCode::InvalidGzipHeader
    );
}
