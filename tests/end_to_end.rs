/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use puff_locate::{
    BitExtent, BitReader, ByteExtent, ExitCode, FileStream, MemoryStream, MinizInflateProbe,
    PuffLocations, PuffStream, PuffTransform, PuffWriter, Puffer, bytes_in_byte_extents,
    find_deflate_sub_blocks, find_puff_locations, locate_deflate_sub_blocks_in_zip_archive,
    locate_deflates_in_gzip, locate_deflates_in_zip_archive, locate_deflates_in_zlib_blocks,
    locate_deflates_in_zlib_file,
};

/// text-like data from a small vocabulary, so that it compresses into several blocks
fn sample_text(len: usize, seed: u32) -> Vec<u8> {
    const WORDS: [&[u8]; 12] = [
        b"deflate ", b"puff ", b"zlib ", b"gzip ", b"archive ", b"block ", b"huffman ",
        b"literal ", b"distance ", b"length ", b"stream\n", b"bits ",
    ];

    let mut state = seed;
    let mut r = Vec::with_capacity(len + 16);
    while r.len() < len {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
        r.extend_from_slice(WORDS[(state >> 16) as usize % WORDS.len()]);
        if (state >> 8) % 7 == 0 {
            r.extend_from_slice(&((state >> 4) as u16).to_le_bytes());
        }
    }
    r.truncate(len);
    r
}

fn zip_local_entry(name: &[u8], method: u16, payload: &[u8]) -> Vec<u8> {
    // sizes and crc left at zero, the way streaming zip writers do it
    let mut r = Vec::new();
    r.extend_from_slice(&0x04034b50u32.to_le_bytes());
    r.extend_from_slice(&20u16.to_le_bytes());
    r.extend_from_slice(&0u16.to_le_bytes());
    r.extend_from_slice(&method.to_le_bytes());
    r.extend_from_slice(&[0u8; 4 + 4 + 4 + 4]);
    r.extend_from_slice(&(name.len() as u16).to_le_bytes());
    r.extend_from_slice(&0u16.to_le_bytes());
    r.extend_from_slice(name);
    r.extend_from_slice(payload);
    r
}

/// size of the puff of a whole deflate stream
fn puff_size_of(deflate: &[u8]) -> u64 {
    let mut bit_reader = BitReader::new(deflate);
    let mut puff_writer = PuffWriter::counting();
    Puffer::new()
        .puff_deflate(&mut bit_reader, &mut puff_writer, None)
        .unwrap();
    puff_writer.size() as u64
}

/// checks that everything outside of the deflates carries over to the puff stream
fn verify_layout(source_size: u64, deflates: &[BitExtent], locations: &PuffLocations) {
    assert_eq!(deflates.len(), locations.puffs.len());

    let mut expected_size = source_size;
    let mut prev: Option<&BitExtent> = None;
    for (deflate, puff) in deflates.iter().zip(&locations.puffs) {
        let gap = match prev {
            Some(p) if p.end() == deflate.offset && deflate.offset % 8 != 0 => 1,
            _ => 0,
        };
        let whole_bytes = deflate.end() / 8 - deflate.offset.div_ceil(8);
        // a shared byte stays in the source and is also part of the previous puff
        expected_size = expected_size + puff.length - whole_bytes - gap;
        prev = Some(deflate);
    }
    assert_eq!(expected_size, locations.puff_size);

    for pair in locations.puffs.windows(2) {
        assert!(pair[0].end() <= pair[1].offset);
    }
    assert!(locations.puffs.last().unwrap().end() <= locations.puff_size);
}

#[test]
fn zip_archive_to_puff_locations() {
    let first_content = sample_text(600_000, 1);
    let second_content = sample_text(5_000, 2);

    let first = miniz_oxide::deflate::compress_to_vec(&first_content, 6);
    let second = miniz_oxide::deflate::compress_to_vec(&second_content, 9);

    let mut data = zip_local_entry(b"docs/first.txt", 8, &first);
    data.extend(zip_local_entry(b"stored.txt", 0, b"this entry is not compressed"));
    data.extend(zip_local_entry(b"second.txt", 8, &second));
    // central directory stand-in
    data.extend_from_slice(b"PK\x01\x02 trailing data that is not a local header");

    let deflates = locate_deflates_in_zip_archive(&data, &MinizInflateProbe);
    assert_eq!(deflates.len(), 2);
    assert_eq!(deflates[0], ByteExtent::new(44, first.len() as u64));
    assert_eq!(deflates[1].length, second.len() as u64);
    assert_eq!(
        bytes_in_byte_extents(&deflates),
        (first.len() + second.len()) as u64
    );

    let sub_blocks =
        locate_deflate_sub_blocks_in_zip_archive(&mut Puffer::new(), &data, &MinizInflateProbe)
            .unwrap();

    // big enough to be split into several blocks
    assert!(sub_blocks.len() > 2);
    assert_eq!(sub_blocks[0].offset, deflates[0].offset * 8);
    assert_eq!(sub_blocks.last().unwrap().end(), deflates[1].end() * 8);

    let mut puffer = Puffer::new();
    let locations = find_puff_locations(
        &mut puffer,
        &mut MemoryStream::for_read(&data),
        &sub_blocks,
    )
    .unwrap();

    verify_layout(data.len() as u64, &sub_blocks, &locations);

    // the puffs of the blocks add up to the puff of the whole stream
    let puffed: u64 = locations.puffs.iter().map(|p| p.length).sum();
    assert_eq!(puffed, puff_size_of(&first) + puff_size_of(&second));

    // running the same locations again gives the same answer
    assert_eq!(
        find_puff_locations(
            &mut puffer,
            &mut MemoryStream::for_read(&data),
            &sub_blocks
        )
        .unwrap(),
        locations
    );
}

#[test]
fn whole_streams_and_blocks_agree() {
    let content = sample_text(200_000, 3);
    let deflate = miniz_oxide::deflate::compress_to_vec(&content, 1);

    let mut data = b"header".to_vec();
    data.extend_from_slice(&deflate);
    data.extend_from_slice(b"footer");

    let whole = [BitExtent::new(6 * 8, deflate.len() as u64 * 8)];
    let by_stream = find_puff_locations(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &whole,
    )
    .unwrap();
    assert_eq!(
        by_stream.puffs,
        [ByteExtent::new(6, puff_size_of(&deflate))]
    );
    assert_eq!(by_stream.puff_size, 12 + puff_size_of(&deflate));

    let blocks = find_deflate_sub_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &[ByteExtent::new(6, deflate.len() as u64)],
    )
    .unwrap();
    let by_block = find_puff_locations(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &blocks,
    )
    .unwrap();

    verify_layout(data.len() as u64, &blocks, &by_block);
    assert_eq!(by_block.puffs[0].offset, 6);
}

#[test]
fn gzip_file_to_puff_locations() {
    let mut data = Vec::new();
    let mut expected = Vec::new();
    for seed in 0..3 {
        let content = sample_text(20_000 + seed * 7_000, seed as u32 + 10);
        let deflate = miniz_oxide::deflate::compress_to_vec(&content, 6);

        data.extend_from_slice(&[0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 3]);
        expected.push(ByteExtent::new(data.len() as u64, deflate.len() as u64));
        data.extend_from_slice(&deflate);
        data.extend_from_slice(&crc32fast::hash(&content).to_le_bytes());
        data.extend_from_slice(&(content.len() as u32).to_le_bytes());
    }

    let deflates = locate_deflates_in_gzip(&data, &MinizInflateProbe).unwrap();
    assert_eq!(deflates, expected);

    let mut puffer = Puffer::new();
    let blocks =
        find_deflate_sub_blocks(&mut puffer, &mut MemoryStream::for_read(&data), &deflates)
            .unwrap();
    let locations =
        find_puff_locations(&mut puffer, &mut MemoryStream::for_read(&data), &blocks).unwrap();
    verify_layout(data.len() as u64, &blocks, &locations);
}

#[test]
fn zlib_streams_in_file() {
    let first = miniz_oxide::deflate::compress_to_vec_zlib(&sample_text(50_000, 4), 6);
    let second = miniz_oxide::deflate::compress_to_vec_zlib(&sample_text(100, 5), 6);

    let mut data = vec![0xEEu8; 7];
    data.extend_from_slice(&first);
    data.extend_from_slice(&second);

    let zlibs = [
        ByteExtent::new(7, first.len() as u64),
        ByteExtent::new(7 + first.len() as u64, second.len() as u64),
    ];

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streams.bin");
    std::fs::write(&path, &data).unwrap();

    let mut puffer = Puffer::new();
    let from_file = locate_deflates_in_zlib_file(&mut puffer, &path, &zlibs).unwrap();
    let from_memory =
        locate_deflates_in_zlib_blocks(&mut puffer, &mut MemoryStream::for_read(&data), &zlibs)
            .unwrap();
    assert_eq!(from_file, from_memory);
    assert_eq!(from_file[0].offset, 9 * 8);

    let mut src = FileStream::open(&path, true, false).unwrap();
    assert_eq!(src.size().unwrap(), data.len() as u64);
    let locations = find_puff_locations(&mut puffer, &mut src, &from_file).unwrap();
    verify_layout(data.len() as u64, &from_file, &locations);
    src.close().unwrap();

    // a corrupt header anywhere in the batch fails everything
    let mut corrupt = data.clone();
    corrupt[7 + first.len()] = 0x79;
    assert_eq!(
        locate_deflates_in_zlib_blocks(&mut puffer, &mut MemoryStream::for_read(&corrupt), &zlibs)
            .unwrap_err()
            .exit_code(),
        ExitCode::InvalidZlibHeader
    );
}
