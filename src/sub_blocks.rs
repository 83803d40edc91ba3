/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::{
    bit_reader::BitReader,
    extent::{BitExtent, ByteExtent},
    puff_error::{AddContext, ExitCode, Result, err_exit_code},
    puff_writer::PuffWriter,
    puffer::PuffTransform,
    stream::PuffStream,
};

/// Splits each deflate stream into its deflate blocks.
///
/// Every byte extent must hold exactly one complete deflate stream. The returned
/// bit extents are relative to the start of `src`, in the same order as the input.
pub fn find_deflate_sub_blocks(
    transform: &mut impl PuffTransform,
    src: &mut impl PuffStream,
    deflates: &[ByteExtent],
) -> Result<Vec<BitExtent>> {
    let mut sub_block_deflates = Vec::new();
    let mut deflate_buffer = Vec::new();
    let stream_size = src.size().context()?;

    for deflate in deflates {
        if !deflate.checked_end().is_some_and(|end| end <= stream_size) {
            return err_exit_code(
                ExitCode::OutOfBounds,
                "deflate extent runs past the end of the stream",
            );
        }

        src.seek(deflate.offset).context()?;

        deflate_buffer.resize(deflate.length as usize, 0);
        src.read(&mut deflate_buffer).context()?;

        let mut bit_reader = BitReader::new(&deflate_buffer);
        let mut puff_writer = PuffWriter::counting();
        let mut sub_blocks = Vec::new();

        transform
            .puff_deflate(&mut bit_reader, &mut puff_writer, Some(&mut sub_blocks))
            .context()?;

        if bit_reader.offset_in_bits() != deflate.length * 8 {
            log::error!(
                "deflate at {} of {} bytes ended after {} bits",
                deflate.offset,
                deflate.length,
                bit_reader.offset_in_bits()
            );
            return err_exit_code(
                ExitCode::ConsistencyCheck,
                "deflate stream did not consume the whole extent",
            );
        }

        sub_block_deflates.extend(
            sub_blocks
                .iter()
                .map(|b| BitExtent::new(b.offset + deflate.offset * 8, b.length)),
        );
    }

    Ok(sub_block_deflates)
}

#[cfg(test)]
use crate::{memory_stream::MemoryStream, puffer::FixedSizeTransform};

#[test]
fn sub_blocks_are_anchored_to_the_stream() {
    use crate::{bit_writer::BitWriter, puffer::Puffer, puffer::write_fixed_block};

    let mut w = BitWriter::default();
    write_fixed_block(&mut w, b"abc", false);
    write_fixed_block(&mut w, b"d", true);
    let deflate = w.finish();

    let mut data = vec![0u8; 5];
    data.extend_from_slice(&deflate);
    data.extend_from_slice(&[0xEE; 3]);
    data.extend_from_slice(&deflate);

    let extents = [
        ByteExtent::new(5, deflate.len() as u64),
        ByteExtent::new(8 + deflate.len() as u64, deflate.len() as u64),
    ];

    let r = find_deflate_sub_blocks(
        &mut Puffer::new(),
        &mut MemoryStream::for_read(&data),
        &extents,
    )
    .unwrap();

    // 3 + 3 * 8 + 7 = 34 bits for the first block
    let second_start = 8 + deflate.len() as u64;
    assert_eq!(
        r,
        [
            BitExtent::new(40, 34),
            BitExtent::new(74, deflate.len() as u64 * 8 - 34),
            BitExtent::new(second_start * 8, 34),
            BitExtent::new(second_start * 8 + 34, deflate.len() as u64 * 8 - 34),
        ]
    );
}

#[test]
fn sub_blocks_need_exact_consumption() {
    let data = [0u8; 32];
    let extents = [ByteExtent::new(0, 10), ByteExtent::new(10, 10)];

    let r = find_deflate_sub_blocks(
        &mut FixedSizeTransform::new(&[4]),
        &mut MemoryStream::for_read(&data),
        &extents,
    )
    .unwrap();
    assert_eq!(r, [BitExtent::new(0, 80), BitExtent::new(80, 80)]);

    // a transform that stops one bit early is rejected
    let mut short = FixedSizeTransform::new(&[4]);
    short.bits_short = 1;
    let e = find_deflate_sub_blocks(&mut short, &mut MemoryStream::for_read(&data), &extents)
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::ConsistencyCheck);
    assert_eq!(short.calls, 1);
}

#[test]
fn sub_blocks_past_end_of_stream() {
    let data = [0u8; 8];

    for extent in [
        ByteExtent::new(4, 10),
        ByteExtent::new(0, 1 << 62),
        ByteExtent::new(u64::MAX, 2),
    ] {
        let mut transform = FixedSizeTransform::new(&[4]);
        let e = find_deflate_sub_blocks(
            &mut transform,
            &mut MemoryStream::for_read(&data),
            &[ByteExtent::new(0, 8), extent],
        )
        .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::OutOfBounds, "{:?}", extent);
        assert_eq!(transform.calls, 1);
    }
}
