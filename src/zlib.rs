/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! RFC1950 zlib stream headers

use std::path::Path;

use crate::{
    bit_reader::BitReader,
    extent::{BitExtent, ByteExtent},
    file_stream::FileStream,
    puff_error::{AddContext, ExitCode, Result, err_exit_code},
    puffer::PuffTransform,
    stream::PuffStream,
    sub_blocks::find_deflate_sub_blocks,
};

/// size of the Adler-32 trailer, which is skipped and never checked
const ADLER32_SIZE: u64 = 4;

/// zlib header as decoded from the first two bytes of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibHeader {
    /// compression method, 8 is deflate
    pub cm: u8,
    /// log2 of the window size minus 8
    pub cinfo: u8,
    pub fcheck: u8,
    pub fdict: bool,
    pub flevel: u8,
}

impl ZlibHeader {
    /// decodes and validates the CMF and FLG bytes
    pub fn parse(header: [u8; 2]) -> Result<ZlibHeader> {
        let mut bit_reader = BitReader::new(&header);

        let cm = bit_reader.get(4)? as u8;
        if cm != 8 && cm != 15 {
            log::error!("Invalid compression method {}", cm);
            return err_exit_code(ExitCode::InvalidZlibHeader, "invalid compression method");
        }

        let cinfo = bit_reader.get(4)? as u8;
        if cinfo > 7 {
            log::error!("Invalid window size {}", cinfo);
            return err_exit_code(ExitCode::InvalidZlibHeader, "window size too large");
        }

        if u16::from_be_bytes(header) % 31 != 0 {
            return err_exit_code(ExitCode::InvalidZlibHeader, "header check bits mismatch");
        }

        let fcheck = bit_reader.get(5)? as u8;
        let fdict = bit_reader.get(1)? != 0;
        let flevel = bit_reader.get(2)? as u8;

        Ok(ZlibHeader {
            cm,
            cinfo,
            fcheck,
            fdict,
            flevel,
        })
    }

    /// number of bytes before the deflate data
    pub fn header_len(&self) -> u64 {
        if self.fdict { 6 } else { 2 }
    }
}

/// Reads the zlib header at the start of `zlib` and returns the extent of the
/// deflate data it wraps.
pub fn zlib_deflate_extent(src: &mut impl PuffStream, zlib: &ByteExtent) -> Result<ByteExtent> {
    let stream_size = src.size().context()?;
    if !zlib.checked_end().is_some_and(|end| end <= stream_size) {
        return err_exit_code(
            ExitCode::OutOfBounds,
            "zlib extent runs past the end of the stream",
        );
    }

    src.seek(zlib.offset).context()?;

    let mut header = [0u8; 2];
    src.read(&mut header).context()?;

    let zlib_header = ZlibHeader::parse(header).map_err(|mut e| {
        log::error!("Invalid zlib header at offset {}", zlib.offset);
        e.add_context();
        e
    })?;

    if zlib_header.fdict {
        let mut dictionary_id = [0u8; 4];
        src.read(&mut dictionary_id).context()?;
    }

    let header_len = zlib_header.header_len();
    let Some(deflate_len) = zlib.length.checked_sub(header_len + ADLER32_SIZE) else {
        return err_exit_code(
            ExitCode::OutOfBounds,
            "zlib extent too short for header and trailer",
        );
    };

    Ok(ByteExtent::new(zlib.offset + header_len, deflate_len))
}

/// Finds the deflate blocks inside each of the zlib streams.
///
/// Any bad zlib stream fails the whole call, no partial results are returned.
pub fn locate_deflates_in_zlib_blocks(
    transform: &mut impl PuffTransform,
    src: &mut impl PuffStream,
    zlibs: &[ByteExtent],
) -> Result<Vec<BitExtent>> {
    let mut deflates = Vec::new();
    for zlib in zlibs {
        let deflate = zlib_deflate_extent(src, zlib)?;
        deflates.extend(find_deflate_sub_blocks(transform, src, &[deflate])?);
    }
    Ok(deflates)
}

/// Same as [`locate_deflates_in_zlib_blocks`], reading from a file
pub fn locate_deflates_in_zlib_file(
    transform: &mut impl PuffTransform,
    path: impl AsRef<Path>,
    zlibs: &[ByteExtent],
) -> Result<Vec<BitExtent>> {
    let mut src = FileStream::open(path, true, false)?;
    locate_deflates_in_zlib_blocks(transform, &mut src, zlibs)
}

#[cfg(test)]
use crate::{memory_stream::MemoryStream, puffer::Puffer};

#[test]
fn parse_valid_headers() {
    for (header, cinfo, flevel) in [
        ([0x78u8, 0x01], 7, 0),
        ([0x78, 0x5e], 7, 1),
        ([0x78, 0x9c], 7, 2),
        ([0x78, 0xda], 7, 3),
        ([0x48, 0x0d], 4, 0),
    ] {
        let h = ZlibHeader::parse(header).unwrap();
        assert_eq!(h.cm, 8);
        assert_eq!(h.cinfo, cinfo);
        assert_eq!(h.flevel, flevel);
        assert!(!h.fdict);
        assert_eq!(h.header_len(), 2);
    }

    let h = ZlibHeader::parse([0x78, 0x20]).unwrap();
    assert!(h.fdict);
    assert_eq!(h.header_len(), 6);
}

#[test]
fn reject_bad_headers() {
    // CM = 9
    // bad FCHECK
    // CINFO = 8
    for header in [[0x79u8, 0x18], [0x78, 0x9d], [0x88, 0x1c]] {
        assert_eq!(
            ZlibHeader::parse(header).unwrap_err().exit_code(),
            ExitCode::InvalidZlibHeader,
            "{:x?}",
            header
        );
    }
}

#[test]
fn zlib_blocks_in_stream() {
    let input: Vec<u8> = (0..5000u32).map(|i| (i % 37) as u8).collect();
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&input, 6);

    let mut data = vec![0x11u8; 3];
    data.extend_from_slice(&zlib);

    let r = locate_deflates_in_zlib_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &[ByteExtent::new(3, zlib.len() as u64)],
    )
    .unwrap();

    assert_eq!(r[0].offset, (3 + 2) * 8);
    assert_eq!(r.last().unwrap().end(), (3 + zlib.len() as u64 - 4) * 8);
}

#[test]
fn zlib_with_dictionary_id() {
    let raw = miniz_oxide::deflate::compress_to_vec(b"dictionary dictionary dictionary", 6);

    let mut data = vec![0x78u8, 0x20, 0xde, 0xad, 0xbe, 0xef];
    data.extend_from_slice(&raw);
    data.extend_from_slice(&[0, 0, 0, 0]);

    let extent = ByteExtent::new(0, data.len() as u64);
    assert_eq!(
        zlib_deflate_extent(&mut MemoryStream::for_read(&data), &extent).unwrap(),
        ByteExtent::new(6, raw.len() as u64)
    );

    let r = locate_deflates_in_zlib_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &[extent],
    )
    .unwrap();
    assert_eq!(r[0].offset, 48);
}

#[test]
fn zlib_batch_fails_fast() {
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(b"fail fast fail fast", 6);

    let mut data = zlib.clone();
    data.extend_from_slice(&[0x79, 0x18, 0, 0, 0, 0, 0, 0]);

    let e = locate_deflates_in_zlib_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &[
            ByteExtent::new(0, zlib.len() as u64),
            ByteExtent::new(zlib.len() as u64, 8),
        ],
    )
    .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::InvalidZlibHeader);

    // too short to hold the header and the trailer
    let e = zlib_deflate_extent(&mut MemoryStream::for_read(&data), &ByteExtent::new(0, 5))
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::OutOfBounds);
}

#[test]
fn zlib_extent_past_end_of_stream() {
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(b"bounded bounded bounded", 6);

    for extent in [
        ByteExtent::new(0, zlib.len() as u64 + 1),
        ByteExtent::new(0, 1 << 62),
        ByteExtent::new(u64::MAX - 1, 6),
    ] {
        let e = locate_deflates_in_zlib_blocks(
            &mut Puffer::new(),
            &mut MemoryStream::for_read(&zlib),
            &[ByteExtent::new(0, zlib.len() as u64), extent],
        )
        .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::OutOfBounds, "{:?}", extent);
    }
}

#[test]
fn zlib_from_file() {
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&[42u8; 3000], 9);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.zlib");
    std::fs::write(&path, &zlib).unwrap();

    let r = locate_deflates_in_zlib_file(
        &mut Puffer::new(),
        &path,
        &[ByteExtent::new(0, zlib.len() as u64)],
    )
    .unwrap();
    assert_eq!(r[0].offset, 16);

    let e = locate_deflates_in_zlib_file(
        &mut Puffer::new(),
        dir.path().join("missing"),
        &[ByteExtent::new(0, zlib.len() as u64)],
    )
    .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::OsError);
}
