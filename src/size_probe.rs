/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use miniz_oxide::{
    DataFormat, MZError, MZFlush, MZStatus,
    inflate::stream::{InflateState, inflate},
};

use crate::puff_error::{ExitCode, Result, err_exit_code};

/// size of the scratch buffer the uncompressed output is written to and then discarded
const SCRATCH_SIZE: usize = 32 * 1024;

/// The result of decoding a raw deflate stream to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeflateSizes {
    /// bytes of compressed input consumed, including the partial last byte
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// CRC-32 of the uncompressed output
    pub crc32: u32,
}

/// Measures how large a deflate stream really is by decoding it.
pub trait InflateProbe {
    fn probe(&self, data: &[u8], start: usize) -> Result<DeflateSizes>;
}

/// Probe that drives the miniz_oxide raw inflater
#[derive(Debug, Default, Clone, Copy)]
pub struct MinizInflateProbe;

impl InflateProbe for MinizInflateProbe {
    fn probe(&self, data: &[u8], start: usize) -> Result<DeflateSizes> {
        calculate_size_of_deflate_block(data, start)
    }
}

/// Decodes the raw deflate stream that begins at `start` and returns how many
/// compressed bytes it occupies and how many bytes it decompresses to.
///
/// The output is thrown away, only its length and CRC-32 are kept.
pub fn calculate_size_of_deflate_block(data: &[u8], start: usize) -> Result<DeflateSizes> {
    if start >= data.len() {
        return err_exit_code(ExitCode::OutOfBounds, "deflate start is past the end of the data");
    }

    let mut state = InflateState::new_boxed(DataFormat::Raw);
    let mut scratch = vec![0u8; SCRATCH_SIZE];
    let mut crc = crc32fast::Hasher::new();

    let mut input = &data[start..];
    let mut sizes = DeflateSizes::default();

    loop {
        let result = inflate(&mut state, input, &mut scratch, MZFlush::None);

        input = &input[result.bytes_consumed..];
        sizes.compressed_size += result.bytes_consumed as u64;
        sizes.uncompressed_size += result.bytes_written as u64;
        crc.update(&scratch[..result.bytes_written]);

        match result.status {
            Ok(MZStatus::StreamEnd) => break,
            Ok(MZStatus::Ok) => {
                if result.bytes_consumed == 0 && result.bytes_written == 0 {
                    return err_exit_code(
                        ExitCode::InflateFailed,
                        "deflate stream ended before the final block",
                    );
                }
            }
            Ok(MZStatus::NeedDict) => {
                return err_exit_code(ExitCode::InflateFailed, "preset dictionary not supported");
            }
            Err(MZError::Buf) => {
                return err_exit_code(
                    ExitCode::InflateFailed,
                    "deflate stream ended before the final block",
                );
            }
            Err(e) => {
                log::debug!("inflate failed at {} with {:?}", start, e);
                return err_exit_code(ExitCode::InflateFailed, "inflate failed");
            }
        }
    }

    sizes.crc32 = crc.finalize();
    Ok(sizes)
}

#[test]
fn probe_measures_stream() {
    let input: Vec<u8> = (0..100_000u32).map(|i| (i * 7 / 13) as u8).collect();
    let compressed = miniz_oxide::deflate::compress_to_vec(&input, 6);

    // put some junk on both sides of the stream
    let mut data = vec![0xAAu8; 17];
    data.extend_from_slice(&compressed);
    data.extend_from_slice(&[0x55u8; 40]);

    let sizes = calculate_size_of_deflate_block(&data, 17).unwrap();
    assert_eq!(sizes.compressed_size, compressed.len() as u64);
    assert_eq!(sizes.uncompressed_size, input.len() as u64);
    assert_eq!(sizes.crc32, crc32fast::hash(&input));

    assert_eq!(MinizInflateProbe.probe(&data, 17).unwrap(), sizes);
}

#[test]
fn probe_empty_stream() {
    let compressed = miniz_oxide::deflate::compress_to_vec(&[], 6);
    let sizes = calculate_size_of_deflate_block(&compressed, 0).unwrap();
    assert_eq!(sizes.compressed_size, compressed.len() as u64);
    assert_eq!(sizes.uncompressed_size, 0);
}

#[test]
fn probe_failures() {
    let compressed = miniz_oxide::deflate::compress_to_vec(b"hello hello hello hello", 6);

    assert_eq!(
        calculate_size_of_deflate_block(&compressed, compressed.len())
            .unwrap_err()
            .exit_code(),
        ExitCode::OutOfBounds
    );

    // truncated
    assert_eq!(
        calculate_size_of_deflate_block(&compressed[..compressed.len() - 3], 0)
            .unwrap_err()
            .exit_code(),
        ExitCode::InflateFailed
    );

    // reserved block type
    assert_eq!(
        calculate_size_of_deflate_block(&[0xff, 0xff, 0xff, 0xff], 0)
            .unwrap_err()
            .exit_code(),
        ExitCode::InflateFailed
    );
}
