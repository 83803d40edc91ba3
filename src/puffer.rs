/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::{
    bit_reader::BitReader,
    deflate_constants,
    extent::BitExtent,
    huffman::{DynamicTable, HuffmanDecoder},
    puff_error::{AddContext, ExitCode, Result, err_exit_code},
    puff_writer::{PuffBlockType, PuffWriter},
};

/// Transforms deflate data into its puff representation.
///
/// The reader must be positioned at the start of a deflate block. On success the reader
/// has consumed exactly the bits of one or more complete deflate blocks, the writer holds
/// the puff bytes, and if `sub_blocks` was given, one extent per deflate block has been
/// appended to it, in bits relative to the start of the reader's buffer.
pub trait PuffTransform {
    fn puff_deflate(
        &mut self,
        bit_reader: &mut BitReader,
        puff_writer: &mut PuffWriter,
        sub_blocks: Option<&mut Vec<BitExtent>>,
    ) -> Result<()>;
}

impl<T: PuffTransform + ?Sized> PuffTransform for &mut T {
    fn puff_deflate(
        &mut self,
        bit_reader: &mut BitReader,
        puff_writer: &mut PuffWriter,
        sub_blocks: Option<&mut Vec<BitExtent>>,
    ) -> Result<()> {
        (**self).puff_deflate(bit_reader, puff_writer, sub_blocks)
    }
}

/// Deflate to puff transform. Reads blocks up to and including the final block, or until
/// fewer than 8 bits are left in the reader, since those can't hold another block.
#[derive(Default)]
pub struct Puffer {
    /// scratch space for stored blocks, kept between calls
    stored_buffer: Vec<u8>,
}

impl Puffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn puff_block(
        &mut self,
        bit_reader: &mut BitReader,
        puff_writer: &mut PuffWriter,
    ) -> Result<bool> {
        let last = bit_reader.get(1)? != 0;
        let mode = bit_reader.get(2)?;

        match mode {
            0 => {
                puff_writer.insert_block_header(PuffBlockType::Stored, last);

                let padding_bits = bit_reader.read_padding_bits();

                let len = bit_reader.get(16)?;
                let ilen = bit_reader.get(16)?;
                if (len ^ ilen) != 0xffff {
                    return err_exit_code(ExitCode::InvalidDeflate, "Block length mismatch");
                }

                if u64::from(len) * 8 > bit_reader.bits_remaining() {
                    return err_exit_code(ExitCode::ShortRead, "Stored block past end of data");
                }

                self.stored_buffer.clear();
                for _i in 0..len {
                    self.stored_buffer.push(bit_reader.read_byte()?);
                }

                puff_writer.insert_stored_block(padding_bits, &self.stored_buffer);
            }
            1 => {
                puff_writer.insert_block_header(PuffBlockType::Fixed, last);

                let decoder = HuffmanDecoder::fixed()?;
                puff_tokens(&decoder, bit_reader, puff_writer).context()?;
            }
            2 => {
                puff_writer.insert_block_header(PuffBlockType::Dynamic, last);

                let table = DynamicTable::read(bit_reader)?;
                let decoder = HuffmanDecoder::from_dynamic_table(&table)?;

                puff_writer.insert_dynamic_table(&table);
                puff_tokens(&decoder, bit_reader, puff_writer).context()?;
            }
            _ => return err_exit_code(ExitCode::InvalidDeflate, "Invalid block type"),
        }

        if last {
            // the final block owns the bits up to the next byte boundary
            let padding_bits = bit_reader.read_padding_bits();
            puff_writer.insert_final_padding(padding_bits);
        }

        Ok(last)
    }
}

impl PuffTransform for Puffer {
    fn puff_deflate(
        &mut self,
        bit_reader: &mut BitReader,
        puff_writer: &mut PuffWriter,
        mut sub_blocks: Option<&mut Vec<BitExtent>>,
    ) -> Result<()> {
        while bit_reader.bits_remaining() >= 8 {
            let start = bit_reader.offset_in_bits();

            let last = self.puff_block(bit_reader, puff_writer)?;

            if let Some(sub_blocks) = sub_blocks.as_deref_mut() {
                sub_blocks.push(BitExtent::new(start, bit_reader.offset_in_bits() - start));
            }

            log::trace!(
                "deflate block at bit {} to {} (last={})",
                start,
                bit_reader.offset_in_bits(),
                last
            );

            if last {
                break;
            }
        }

        puff_writer.flush();
        Ok(())
    }
}

fn puff_tokens(
    decoder: &HuffmanDecoder,
    bit_reader: &mut BitReader,
    puff_writer: &mut PuffWriter,
) -> Result<()> {
    loop {
        let lit_len: u32 = decoder.decode_literal(bit_reader)?.into();
        if lit_len < 256 {
            puff_writer.insert_literal(lit_len as u8);
        } else if lit_len == u32::from(deflate_constants::END_OF_BLOCK) {
            puff_writer.insert_end_of_block();
            return Ok(());
        } else {
            let lcode: u32 = lit_len - u32::from(deflate_constants::NONLEN_CODE_COUNT);
            if lcode >= deflate_constants::LEN_CODE_COUNT as u32 {
                return err_exit_code(ExitCode::InvalidDeflate, "Invalid length code");
            }
            let len: u32 = u32::from(deflate_constants::LENGTH_BASE_TABLE[lcode as usize])
                + bit_reader.get(deflate_constants::LENGTH_EXTRA_TABLE[lcode as usize].into())?;

            // length of 258 can be encoded two ways: 284 with 5 one bits (non-standard) or as 285 with 0 extra bits (standard)
            let irregular258 = len == deflate_constants::MAX_MATCH
                && lcode != deflate_constants::LEN_CODE_COUNT as u32 - 1;

            let dcode = u32::from(decoder.decode_distance(bit_reader)?);
            if dcode >= deflate_constants::DIST_CODE_COUNT as u32 {
                return err_exit_code(ExitCode::InvalidDeflate, "Invalid distance code");
            }

            let dist = u32::from(deflate_constants::DIST_BASE_TABLE[dcode as usize])
                + bit_reader.get(deflate_constants::DIST_EXTRA_TABLE[dcode as usize].into())?;

            puff_writer.insert_reference(len, dist, irregular258);
        }
    }
}

#[cfg(test)]
mod test_support {
    //! hand-built deflate blocks so that block boundaries fall on known bit positions,
    //! and a stand-in transform for testing the offset arithmetic

    use crate::{
        bit_reader::BitReader, bit_writer::BitWriter, extent::BitExtent, puff_error::Result,
        puff_writer::PuffWriter,
    };

    use super::PuffTransform;

    /// Consumes everything it is given (minus `bits_short`) as one block and
    /// produces the next size from `puff_sizes`.
    pub struct FixedSizeTransform {
        pub puff_sizes: Vec<usize>,
        pub bits_short: u64,
        pub calls: usize,
    }

    impl FixedSizeTransform {
        pub fn new(puff_sizes: &[usize]) -> Self {
            FixedSizeTransform {
                puff_sizes: puff_sizes.to_vec(),
                bits_short: 0,
                calls: 0,
            }
        }
    }

    impl PuffTransform for FixedSizeTransform {
        fn puff_deflate(
            &mut self,
            bit_reader: &mut BitReader,
            puff_writer: &mut PuffWriter,
            sub_blocks: Option<&mut Vec<BitExtent>>,
        ) -> Result<()> {
            let start = bit_reader.offset_in_bits();
            bit_reader.skip(bit_reader.bits_remaining().saturating_sub(self.bits_short))?;

            if let Some(sub_blocks) = sub_blocks {
                sub_blocks.push(BitExtent::new(start, bit_reader.offset_in_bits() - start));
            }

            // a run of n literals takes n + 1 bytes
            let size = self.puff_sizes[self.calls % self.puff_sizes.len()];
            for _i in 1..size {
                puff_writer.insert_literal(0);
            }
            puff_writer.flush();
            self.calls += 1;
            Ok(())
        }
    }

    fn write_fixed_symbol(w: &mut BitWriter, symbol: u16) {
        // RFC1951 3.2.6
        let (code, len) = match symbol {
            0..=143 => (0x30 + u32::from(symbol), 8),
            144..=255 => (0x190 + u32::from(symbol) - 144, 9),
            256..=279 => (u32::from(symbol) - 256, 7),
            _ => (0xc0 + u32::from(symbol) - 280, 8),
        };
        w.write_code(code, len);
    }

    /// writes a fixed huffman block containing the literals
    pub fn write_fixed_block(w: &mut BitWriter, literals: &[u8], last: bool) {
        w.write(u32::from(last), 1);
        w.write(1, 2);
        for &l in literals {
            write_fixed_symbol(w, l.into());
        }
        write_fixed_symbol(w, 256);
    }

    /// writes a fixed huffman block with a single literal followed by a reference
    pub fn write_fixed_block_with_reference(w: &mut BitWriter, last: bool) {
        w.write(u32::from(last), 1);
        w.write(1, 2);
        write_fixed_symbol(w, u16::from(b'x'));
        // length 3 is code 257, distance 1 is distance code 0
        write_fixed_symbol(w, 257);
        w.write_code(0, 5);
        write_fixed_symbol(w, 256);
    }

    pub fn write_stored_block(w: &mut BitWriter, data: &[u8], last: bool) {
        w.write(u32::from(last), 1);
        w.write(0, 2);
        w.pad();
        w.write(data.len() as u32, 16);
        w.write(!(data.len() as u32) & 0xffff, 16);
        for &b in data {
            w.write(b.into(), 8);
        }
    }

    #[test]
    fn fixed_lengths_match_codes() {
        // make sure the hand written fixed codes agree with the canonical codes
        use crate::huffman::{HuffmanDecoder, fixed_lengths};

        let mut w = BitWriter::default();
        for s in [0u16, 143, 144, 255, 256, 279, 280, 285] {
            write_fixed_symbol(&mut w, s);
        }
        let data = w.finish();

        let decoder = HuffmanDecoder::fixed().unwrap();
        let mut br = BitReader::new(&data);
        for s in [0u16, 143, 144, 255, 256, 279, 280, 285] {
            assert_eq!(decoder.decode_literal(&mut br).unwrap(), s);
        }

        let (lit, _) = fixed_lengths();
        assert_eq!(lit.len(), 288);
    }
}

#[cfg(test)]
pub use test_support::{
    FixedSizeTransform, write_fixed_block, write_fixed_block_with_reference, write_stored_block,
};

#[test]
fn puff_reports_unaligned_blocks() {
    use crate::bit_writer::BitWriter;

    let mut w = BitWriter::default();
    write_fixed_block(&mut w, b"ab", false);
    let first_end = w.bit_position();
    write_fixed_block_with_reference(&mut w, false);
    let second_end = w.bit_position();
    write_fixed_block(&mut w, b"c", true);
    let third_end = w.bit_position();
    let data = w.finish();

    // 3 + 8 + 8 + 7 = 26 bits, so the second block is unaligned
    assert_eq!(first_end, 26);

    let mut sub_blocks = Vec::new();
    let mut out = Vec::new();
    let mut bit_reader = BitReader::new(&data);
    let mut puff_writer = PuffWriter::new(&mut out);
    Puffer::new()
        .puff_deflate(&mut bit_reader, &mut puff_writer, Some(&mut sub_blocks))
        .unwrap();
    let puff_size = puff_writer.size();

    // the padding after the final block belongs to it
    let padded_end = third_end.div_ceil(8) * 8;
    assert_eq!(
        sub_blocks,
        [
            BitExtent::new(0, first_end),
            BitExtent::new(first_end, second_end - first_end),
            BitExtent::new(second_end, padded_end - second_end),
        ]
    );
    assert_eq!(bit_reader.offset_in_bits(), data.len() as u64 * 8);

    // header, run of 2, eob | header, run of 1, reference, eob | header, run of 1, eob, padding
    assert_eq!(puff_size, (1 + 3 + 1) + (1 + 2 + 4 + 1) + (1 + 2 + 1 + 1));
    assert_eq!(out.len(), puff_size);
}

#[test]
fn puff_stored_block() {
    use crate::bit_writer::BitWriter;

    let mut w = BitWriter::default();
    write_fixed_block(&mut w, b"z", false);
    write_stored_block(&mut w, b"stored", true);
    let data = w.finish();

    let mut sub_blocks = Vec::new();
    let mut out = Vec::new();
    let mut bit_reader = BitReader::new(&data);
    Puffer::new()
        .puff_deflate(
            &mut bit_reader,
            &mut PuffWriter::new(&mut out),
            Some(&mut sub_blocks),
        )
        .unwrap();

    assert_eq!(sub_blocks.len(), 2);
    assert_eq!(sub_blocks[1].end(), data.len() as u64 * 8);

    // stored block: header, padding bits, length, data, final padding
    let stored = &out[out.len() - (1 + 1 + 2 + 6 + 1)..];
    assert_eq!(stored[0], 0b0010_0000);
    assert_eq!(&stored[2..4], &[6, 0]);
    assert_eq!(&stored[4..10], b"stored");
}

#[test]
fn puff_real_deflate_stream() {
    let input: Vec<u8> = (0..20000u32)
        .map(|i| (i % 251) as u8 ^ (i / 97) as u8)
        .collect();

    for level in [1, 6, 9] {
        let compressed = miniz_oxide::deflate::compress_to_vec(&input, level);

        let mut sub_blocks = Vec::new();
        let mut bit_reader = BitReader::new(&compressed);
        let mut puff_writer = PuffWriter::counting();
        Puffer::new()
            .puff_deflate(&mut bit_reader, &mut puff_writer, Some(&mut sub_blocks))
            .unwrap();

        assert_eq!(bit_reader.offset_in_bits(), compressed.len() as u64 * 8);
        assert!(puff_writer.size() > 0);

        // the blocks tile the whole stream
        assert_eq!(sub_blocks[0].offset, 0);
        for pair in sub_blocks.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
        }
        assert_eq!(
            sub_blocks.last().unwrap().end(),
            compressed.len() as u64 * 8
        );
    }
}

#[test]
fn puff_rejects_corrupt_data() {
    // block type 3 is reserved
    let data = [0b0000_0111u8, 0, 0];
    let e = Puffer::new()
        .puff_deflate(
            &mut BitReader::new(&data),
            &mut PuffWriter::counting(),
            None,
        )
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::InvalidDeflate);

    // stored block whose length doesn't match its complement
    let data = [0b0000_0001u8, 5, 0, 0, 0, 1, 2, 3, 4, 5];
    let e = Puffer::new()
        .puff_deflate(
            &mut BitReader::new(&data),
            &mut PuffWriter::counting(),
            None,
        )
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::InvalidDeflate);

    // truncated stream
    let compressed = miniz_oxide::deflate::compress_to_vec(&[7u8; 1000], 6);
    let e = Puffer::new()
        .puff_deflate(
            &mut BitReader::new(&compressed[..compressed.len() - 2]),
            &mut PuffWriter::counting(),
            None,
        )
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::ShortRead);
}
