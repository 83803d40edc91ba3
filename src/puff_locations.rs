/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Maps deflate locations in a source stream to the matching locations in the puff stream.
//!
//! The puff stream is the source stream with every deflate extent replaced by its puff.
//! Deflate extents are bit precise while puffs are whole bytes, so the bytes that are only
//! partially covered by a deflate are handled as follows:
//!
//! * a byte holding the last bits of a deflate belongs to that deflate, its puff already
//!   contains those bits;
//! * a byte holding the first bits of a deflate stays in the puff stream as is, unless the
//!   previous deflate ends exactly where this one starts. In that case the two deflates share
//!   the byte, and one extra "gap" byte is written before the second puff.

use crate::{
    bit_reader::BitReader,
    extent::{BitExtent, ByteExtent},
    puff_error::{AddContext, ExitCode, Result, err_exit_code},
    puff_writer::PuffWriter,
    puffer::PuffTransform,
    stream::PuffStream,
};

/// Where the puffs end up in the puff stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PuffLocations {
    pub puffs: Vec<ByteExtent>,
    /// size of the whole puff stream in bytes
    pub puff_size: u64,
}

/// Finds the location of each puff in the puff stream, given the bit extent of each deflate
/// in `src`. The deflates have to be in order and can't overlap.
pub fn find_puff_locations(
    transform: &mut impl PuffTransform,
    src: &mut impl PuffStream,
    deflates: &[BitExtent],
) -> Result<PuffLocations> {
    let mut puffs = Vec::with_capacity(deflates.len());
    let mut deflate_buffer = Vec::new();

    // size difference between the puffs and the deflates they replace so far. Puffs can be
    // smaller than the deflate, so this can go negative.
    let mut total_size_difference: i64 = 0;

    let mut prev_deflate: Option<&BitExtent> = None;
    let stream_size = src.size().context()?;

    for deflate in deflates {
        let Some(end_byte) = deflate
            .checked_end()
            .map(|end| end.div_ceil(8))
            .filter(|&end_byte| end_byte <= stream_size)
        else {
            return err_exit_code(
                ExitCode::OutOfBounds,
                "deflate extent runs past the end of the stream",
            );
        };

        if let Some(prev) = prev_deflate {
            if deflate.offset < prev.end() {
                return err_exit_code(
                    ExitCode::InvalidParameter,
                    "deflates have to be ordered and not overlap",
                );
            }
        }

        let start_byte = deflate.offset / 8;
        deflate_buffer.resize((end_byte - start_byte) as usize, 0);
        src.seek(start_byte).context()?;
        src.read(&mut deflate_buffer).context()?;

        let mut bit_reader = BitReader::new(&deflate_buffer);
        bit_reader.skip(deflate.offset % 8)?;

        let mut puff_writer = PuffWriter::counting();
        transform
            .puff_deflate(&mut bit_reader, &mut puff_writer, None)
            .context()?;

        if bit_reader.offset() != deflate_buffer.len() {
            log::error!(
                "deflate at bit {} of {} bits ended after {} bytes instead of {}",
                deflate.offset,
                deflate.length,
                bit_reader.offset(),
                deflate_buffer.len()
            );
            return err_exit_code(
                ExitCode::ConsistencyCheck,
                "deflate did not end in the last byte of its extent",
            );
        }

        // the two deflates share a byte, which is written as its own byte in the puff stream
        let gap: i64 = match prev_deflate {
            Some(prev) if prev.end() == deflate.offset && deflate.offset % 8 != 0 => 1,
            _ => 0,
        };

        // whole bytes of the source that are covered by the deflate alone
        let first_whole_byte = deflate.offset.div_ceil(8) as i64;
        let deflate_length_in_bytes = (deflate.end() / 8) as i64 - first_whole_byte;

        let puff_offset = first_whole_byte - gap + total_size_difference;
        if puff_offset < 0 {
            return err_exit_code(ExitCode::ConsistencyCheck, "negative puff offset");
        }

        let puff_size = puff_writer.size() as i64;
        puffs.push(ByteExtent::new(puff_offset as u64, puff_size as u64));

        total_size_difference += puff_size - deflate_length_in_bytes - gap;
        prev_deflate = Some(deflate);
    }

    let final_size = stream_size as i64 + total_size_difference;
    if final_size < 0 {
        return err_exit_code(ExitCode::ConsistencyCheck, "negative puff stream size");
    }

    Ok(PuffLocations {
        puffs,
        puff_size: final_size as u64,
    })
}

#[cfg(test)]
use crate::{memory_stream::MemoryStream, puffer::FixedSizeTransform};

/// every source byte outside of the deflates is carried over to the puff stream unchanged
#[cfg(test)]
fn check_layout(source_size: u64, deflates: &[BitExtent], locations: &PuffLocations) {
    let puffs = &locations.puffs;
    assert_eq!(puffs[0].offset, deflates[0].offset.div_ceil(8));

    for i in 1..deflates.len() {
        let gap = u64::from(
            deflates[i - 1].end() == deflates[i].offset && deflates[i].offset % 8 != 0,
        );
        let between_in_source = deflates[i].offset.div_ceil(8) - deflates[i - 1].end() / 8;
        assert_eq!(
            puffs[i].offset - puffs[i - 1].end(),
            between_in_source - gap,
            "puff {}",
            i
        );
    }

    let last = deflates.last().unwrap();
    assert_eq!(
        locations.puff_size - puffs.last().unwrap().end(),
        source_size - last.end() / 8
    );
}

#[test]
fn puff_locations_with_gap() {
    let data = [0u8; 40];
    let deflates = [BitExtent::new(0, 100), BitExtent::new(100, 50)];

    let r = find_puff_locations(
        &mut FixedSizeTransform::new(&[20, 10]),
        &mut MemoryStream::for_read(&data),
        &deflates,
    )
    .unwrap();

    assert_eq!(r.puffs, [ByteExtent::new(0, 20), ByteExtent::new(20, 10)]);
    assert_eq!(r.puff_size, 52);
    check_layout(40, &deflates, &r);
}

#[test]
fn puff_locations_byte_aligned() {
    let data = [0u8; 40];
    let deflates = [BitExtent::new(0, 96), BitExtent::new(96, 50)];

    let r = find_puff_locations(
        &mut FixedSizeTransform::new(&[20, 10]),
        &mut MemoryStream::for_read(&data),
        &deflates,
    )
    .unwrap();

    // no gap byte on a byte boundary
    assert_eq!(r.puffs, [ByteExtent::new(0, 20), ByteExtent::new(20, 10)]);
    assert_eq!(r.puff_size, 52);
    check_layout(40, &deflates, &r);
}

#[test]
fn puff_locations_apart() {
    let data = [0u8; 40];
    let deflates = [BitExtent::new(0, 100), BitExtent::new(120, 50)];

    let r = find_puff_locations(
        &mut FixedSizeTransform::new(&[20, 10]),
        &mut MemoryStream::for_read(&data),
        &deflates,
    )
    .unwrap();

    assert_eq!(r.puffs, [ByteExtent::new(0, 20), ByteExtent::new(23, 10)]);
    assert_eq!(r.puff_size, 52);
    check_layout(40, &deflates, &r);
}

#[test]
fn puff_locations_smaller_puffs() {
    let data = [0u8; 100];
    let deflates = [
        BitExtent::new(13, 200),
        BitExtent::new(213, 203),
        BitExtent::new(500, 64),
    ];

    let r = find_puff_locations(
        &mut FixedSizeTransform::new(&[2]),
        &mut MemoryStream::for_read(&data),
        &deflates,
    )
    .unwrap();

    check_layout(100, &deflates, &r);
    assert!(r.puff_size < 100);

    assert_eq!(
        find_puff_locations(
            &mut FixedSizeTransform::new(&[2]),
            &mut MemoryStream::for_read(&data),
            &[],
        )
        .unwrap(),
        PuffLocations {
            puffs: Vec::new(),
            puff_size: 100
        }
    );
}

#[test]
fn puff_locations_bad_input() {
    let data = [0u8; 40];

    let e = find_puff_locations(
        &mut FixedSizeTransform::new(&[20]),
        &mut MemoryStream::for_read(&data),
        &[BitExtent::new(0, 100), BitExtent::new(99, 50)],
    )
    .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::InvalidParameter);

    // stops a whole byte early
    let mut short = FixedSizeTransform::new(&[20]);
    short.bits_short = 8;
    let e = find_puff_locations(
        &mut short,
        &mut MemoryStream::for_read(&data),
        &[BitExtent::new(0, 100)],
    )
    .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::ConsistencyCheck);

    // past the end of the source, or not even addressable
    for extent in [
        BitExtent::new(300, 100),
        BitExtent::new(0, 1 << 62),
        BitExtent::new(u64::MAX - 3, 10),
    ] {
        let mut transform = FixedSizeTransform::new(&[20]);
        let e = find_puff_locations(
            &mut transform,
            &mut MemoryStream::for_read(&data),
            &[BitExtent::new(0, 100), extent],
        )
        .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::OutOfBounds, "{:?}", extent);
        assert_eq!(transform.calls, 1);
    }

    // ending in the last byte of the source is fine
    find_puff_locations(
        &mut FixedSizeTransform::new(&[20]),
        &mut MemoryStream::for_read(&data),
        &[BitExtent::new(0, 100), BitExtent::new(100, 220)],
    )
    .unwrap();
}
