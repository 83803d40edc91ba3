/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    extent::{BitExtent, ByteExtent},
    memory_stream::MemoryStream,
    puff_error::Result,
    puffer::PuffTransform,
    size_probe::InflateProbe,
    sub_blocks::find_deflate_sub_blocks,
};

const ZIP_LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// size of the fixed part of the local file header
const ZIP_LOCAL_FILE_HEADER_SIZE: usize = 30;

const COMPRESSION_METHOD_DEFLATE: u16 = 8;

/// general purpose flag: sizes and CRC-32 are in a data descriptor after the payload
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

#[derive(Default, Debug)]
pub struct ZipLocalFileHeader {
    pub local_file_header_signature: u32,
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl ZipLocalFileHeader {
    pub fn create_and_load<R: Read>(binary_reader: &mut R) -> Result<Self> {
        let zip_local_file_header = Self {
            local_file_header_signature: binary_reader.read_u32::<LittleEndian>()?,
            version_needed_to_extract: binary_reader.read_u16::<LittleEndian>()?,
            general_purpose_bit_flag: binary_reader.read_u16::<LittleEndian>()?,
            compression_method: binary_reader.read_u16::<LittleEndian>()?,
            last_mod_file_time: binary_reader.read_u16::<LittleEndian>()?,
            last_mod_file_date: binary_reader.read_u16::<LittleEndian>()?,
            crc32: binary_reader.read_u32::<LittleEndian>()?,
            compressed_size: binary_reader.read_u32::<LittleEndian>()?,
            uncompressed_size: binary_reader.read_u32::<LittleEndian>()?,
            file_name_length: binary_reader.read_u16::<LittleEndian>()?,
            extra_field_length: binary_reader.read_u16::<LittleEndian>()?,
        };

        Ok(zip_local_file_header)
    }

    /// size of the header including the file name and extra field
    pub fn header_size(&self) -> u64 {
        ZIP_LOCAL_FILE_HEADER_SIZE as u64
            + u64::from(self.file_name_length)
            + u64::from(self.extra_field_length)
    }
}

/// Scans a zip archive for deflate compressed entries by looking for local file headers.
///
/// The central directory is never consulted, and the sizes in the local headers are only
/// used as a sanity check: the real size of each entry is found by decompressing it. Headers
/// that don't check out are skipped, so this never fails, it just finds fewer entries.
pub fn locate_deflates_in_zip_archive(data: &[u8], probe: &impl InflateProbe) -> Vec<ByteExtent> {
    let mut deflate_blocks = Vec::new();

    let mut pos: usize = 0;
    while pos + ZIP_LOCAL_FILE_HEADER_SIZE <= data.len() {
        if data[pos..pos + 4] != ZIP_LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes() {
            pos += 1;
            continue;
        }

        match try_local_file_header(data, pos, probe) {
            Some(deflate) => {
                deflate_blocks.push(deflate);
                pos = deflate.end() as usize;
            }
            None => pos += 4,
        }
    }

    deflate_blocks
}

/// checks the local file header at `pos` and returns the extent of its deflate payload
fn try_local_file_header(
    data: &[u8],
    pos: usize,
    probe: &impl InflateProbe,
) -> Option<ByteExtent> {
    let mut binary_reader = Cursor::new(&data[pos..pos + ZIP_LOCAL_FILE_HEADER_SIZE]);
    let header = ZipLocalFileHeader::create_and_load(&mut binary_reader).ok()?;

    if header.compression_method != COMPRESSION_METHOD_DEFLATE {
        return None;
    }

    let header_size = header.header_size();

    // the declared size has to fit, even though it's not otherwise trusted
    let declared_end = (pos as u64)
        .checked_add(header_size)?
        .checked_add(u64::from(header.compressed_size))?;
    if declared_end > data.len() as u64 {
        return None;
    }

    let deflate_start = pos + header_size as usize;
    let sizes = match probe.probe(data, deflate_start) {
        Ok(sizes) => sizes,
        Err(e) => {
            log::error!(
                "Failed to decompress the zip entry starting from: {}, skip adding deflates for this entry. {}",
                pos,
                e
            );
            return None;
        }
    };

    if header.compressed_size > 0 && u64::from(header.compressed_size) != sizes.compressed_size {
        log::warn!(
            "Compressed size in the file header: {} doesn't equal the real size: {}",
            header.compressed_size,
            sizes.compressed_size
        );
    }

    if header.uncompressed_size > 0
        && u64::from(header.uncompressed_size) != sizes.uncompressed_size
    {
        log::warn!(
            "Uncompressed size in the file header: {} doesn't equal the real size: {}",
            header.uncompressed_size,
            sizes.uncompressed_size
        );
    }

    if header.general_purpose_bit_flag & FLAG_DATA_DESCRIPTOR == 0
        && header.crc32 != 0
        && header.crc32 != sizes.crc32
    {
        log::warn!(
            "CRC-32 in the file header: {:08x} doesn't match the data: {:08x}",
            header.crc32,
            sizes.crc32
        );
    }

    Some(ByteExtent::new(deflate_start as u64, sizes.compressed_size))
}

/// Finds the deflate blocks of every deflate compressed entry in the zip archive
pub fn locate_deflate_sub_blocks_in_zip_archive(
    transform: &mut impl PuffTransform,
    data: &[u8],
    probe: &impl InflateProbe,
) -> Result<Vec<BitExtent>> {
    let deflate_blocks = locate_deflates_in_zip_archive(data, probe);

    let mut src = MemoryStream::for_read(data);
    find_deflate_sub_blocks(transform, &mut src, &deflate_blocks)
}

#[cfg(test)]
use crate::{puff_error::ExitCode, size_probe::MinizInflateProbe};

/// builds a local file header followed by the payload
#[cfg(test)]
pub fn zip_local_entry(
    name: &[u8],
    method: u16,
    payload: &[u8],
    declared: (u32, u32, u32),
) -> Vec<u8> {
    use byteorder::WriteBytesExt;

    let (crc32, compressed_size, uncompressed_size) = declared;

    let mut r = Vec::new();
    r.write_u32::<LittleEndian>(ZIP_LOCAL_FILE_HEADER_SIGNATURE).unwrap();
    r.write_u16::<LittleEndian>(20).unwrap();
    r.write_u16::<LittleEndian>(0).unwrap();
    r.write_u16::<LittleEndian>(method).unwrap();
    r.write_u16::<LittleEndian>(0x6000).unwrap();
    r.write_u16::<LittleEndian>(0x5821).unwrap();
    r.write_u32::<LittleEndian>(crc32).unwrap();
    r.write_u32::<LittleEndian>(compressed_size).unwrap();
    r.write_u32::<LittleEndian>(uncompressed_size).unwrap();
    r.write_u16::<LittleEndian>(name.len() as u16).unwrap();
    r.write_u16::<LittleEndian>(0).unwrap();
    r.extend_from_slice(name);
    r.extend_from_slice(payload);
    r
}

#[test]
fn zip_entries_with_zeroed_sizes() {
    crate::init_logging();

    let first = miniz_oxide::deflate::compress_to_vec(&[b'a'; 2000], 6);
    let second = miniz_oxide::deflate::compress_to_vec(b"the second entry of the archive", 6);

    let mut data = zip_local_entry(b"a.txt", 8, &first, (0, 0, 0));
    let second_start = data.len() + 30 + 9;
    data.extend(zip_local_entry(b"dir/b.txt", 8, &second, (0, 0, 0)));

    let r = locate_deflates_in_zip_archive(&data, &MinizInflateProbe);
    assert_eq!(
        r,
        [
            ByteExtent::new(35, first.len() as u64),
            ByteExtent::new(second_start as u64, second.len() as u64)
        ]
    );

    // deterministic
    assert_eq!(locate_deflates_in_zip_archive(&data, &MinizInflateProbe), r);
}

#[test]
fn zip_spurious_magic_in_payload() {
    // an entry whose content is itself a complete zip entry
    let inner_deflate = miniz_oxide::deflate::compress_to_vec(b"nested nested nested", 6);
    let mut content = b"leading text ".to_vec();
    content.extend(zip_local_entry(b"inner.txt", 8, &inner_deflate, (0, 0, 0)));
    content.extend_from_slice(b" trailing text");

    // on its own the nested entry is found
    assert_eq!(
        locate_deflates_in_zip_archive(&content, &MinizInflateProbe),
        [ByteExtent::new(13 + 39, inner_deflate.len() as u64)]
    );

    // a stored deflate block carries it through unchanged
    let deflate = miniz_oxide::deflate::compress_to_vec(&content, 0);
    assert!(deflate.windows(content.len()).any(|w| w == content));

    let mut data = zip_local_entry(b"x", 8, &deflate, (0, 0, 0));
    data.extend_from_slice(b"PK\x01\x02");

    // the scan continues after the outer payload, so the nested header is never seen
    assert_eq!(
        locate_deflates_in_zip_archive(&data, &MinizInflateProbe),
        [ByteExtent::new(31, deflate.len() as u64)]
    );
}

#[test]
fn zip_skips_bad_entries() {
    crate::init_logging();

    let good = miniz_oxide::deflate::compress_to_vec(b"good good good good", 6);

    // stored entry
    let mut data = zip_local_entry(b"s", 0, b"plain", (0, 5, 5));
    // declared size larger than the archive
    data.extend(zip_local_entry(b"big", 8, &good, (0, 1_000_000, 0)));
    // payload that doesn't inflate
    data.extend(zip_local_entry(b"bad", 8, &[0xff; 8], (0, 0, 0)));
    let good_start = data.len() + 30 + 4;
    // wrong declared sizes and crc are only warnings
    data.extend(zip_local_entry(b"good", 8, &good, (1, 2, 3)));

    assert_eq!(
        locate_deflates_in_zip_archive(&data, &MinizInflateProbe),
        [ByteExtent::new(good_start as u64, good.len() as u64)]
    );

    // shorter than a local header
    assert!(locate_deflates_in_zip_archive(&data[..29], &MinizInflateProbe).is_empty());
    assert!(locate_deflates_in_zip_archive(&[], &MinizInflateProbe).is_empty());
}

#[test]
fn zip_sub_blocks() {
    use crate::puffer::Puffer;

    let input: Vec<u8> = (0..70000u32).map(|i| (i % 1013) as u8).collect();
    let deflate = miniz_oxide::deflate::compress_to_vec(&input, 6);
    let data = zip_local_entry(b"big.bin", 8, &deflate, (0, 0, 0));

    let r = locate_deflate_sub_blocks_in_zip_archive(&mut Puffer::new(), &data, &MinizInflateProbe)
        .unwrap();

    assert_eq!(r[0].offset, 37 * 8);
    assert_eq!(r.last().unwrap().end(), data.len() as u64 * 8);
    for pair in r.windows(2) {
        assert_eq!(pair[0].end(), pair[1].offset);
    }

    // cutting off the last byte leaves the final block incomplete
    let e = find_deflate_sub_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &[ByteExtent::new(37, deflate.len() as u64 - 1)],
    )
    .unwrap_err();
    assert_ne!(e.exit_code(), ExitCode::ConsistencyCheck);
}
