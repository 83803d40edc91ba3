/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::{
    bit_reader::ReadBits,
    deflate_constants::{END_OF_BLOCK, TREE_CODE_ORDER_TABLE},
    puff_error::{ExitCode, Result, err_exit_code},
};

const MAX_CODE_LENGTH: usize = 15;

/// number of literal/length codes in the fixed block alphabet
const FIXED_LITERAL_CODES: usize = 288;

/// Canonical codes (RFC1951 3.2.2) for the given code lengths. Symbols with a zero
/// length get no code. The codes are bit reversed so they can be written LSB first.
pub fn calc_huffman_codes(code_lengths: &[u8]) -> Vec<u16> {
    let mut length_count = [0u16; MAX_CODE_LENGTH + 1];
    for &len in code_lengths {
        length_count[usize::from(len)] += 1;
    }
    length_count[0] = 0;

    let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
    for len in 1..=MAX_CODE_LENGTH {
        next_code[len] = (next_code[len - 1] + length_count[len - 1]) << 1;
    }

    code_lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let code = next_code[usize::from(len)];
            next_code[usize::from(len)] += 1;
            code.reverse_bits() >> (16 - u32::from(len))
        })
        .collect()
}

/// Canonical Huffman decoding table.
///
/// Symbols whose code fits in a byte are resolved with a single lookup in `fast_decode`,
/// everything else walks the canonical code one bit at a time using the per-length counts.
#[derive(Debug)]
struct HuffmanTable {
    /// number of codes of each length
    counts: [u16; MAX_CODE_LENGTH + 1],

    /// symbols ordered by code length, then by symbol value
    symbols: Vec<u16>,

    /// indexed by the next 8 bits of input: (bits used, symbol), 0 bits if not resolvable
    fast_decode: [(u8, u16); 256],
}

impl HuffmanTable {
    /// Builds the table. Over-subscribed codes are always rejected. Incomplete codes are
    /// only accepted for the degenerate cases allowed by RFC 1951: no codes at all, or a single
    /// code of one bit.
    fn new(code_lengths: &[u8], allow_incomplete: bool) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in code_lengths {
            if len as usize > MAX_CODE_LENGTH {
                return err_exit_code(ExitCode::InvalidDeflate, "Invalid Huffman code length");
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for &c in &counts[1..] {
            left <<= 1;
            left -= i32::from(c);
            if left < 0 {
                return err_exit_code(ExitCode::InvalidDeflate, "Over-subscribed Huffman code");
            }
        }

        let num_codes: u16 = counts.iter().sum();
        if left > 0 {
            let degenerate = num_codes == 0 || (num_codes == 1 && counts[1] == 1);
            if !allow_incomplete || !degenerate {
                return err_exit_code(ExitCode::InvalidDeflate, "Incomplete Huffman code");
            }
        }

        let mut symbols = Vec::with_capacity(num_codes as usize);
        for len in 1..=MAX_CODE_LENGTH {
            for (symbol, &l) in code_lengths.iter().enumerate() {
                if l as usize == len {
                    symbols.push(symbol as u16);
                }
            }
        }

        let codes = calc_huffman_codes(code_lengths);
        let mut fast_decode = [(0u8, 0u16); 256];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len == 0 || len > 8 {
                continue;
            }
            let mut index = codes[symbol] as usize;
            while index < 256 {
                fast_decode[index] = (len, symbol as u16);
                index += 1 << len;
            }
        }

        Ok(HuffmanTable {
            counts,
            symbols,
            fast_decode,
        })
    }

    #[inline(always)]
    fn decode_symbol(&self, bit_reader: &mut impl ReadBits) -> Result<u16> {
        if bit_reader.bits_left() < 8 {
            bit_reader.refill();
        }

        if bit_reader.bits_left() >= 8 {
            let (num_bits, symbol) = self.fast_decode[bit_reader.peek_byte() as usize];
            if num_bits != 0 {
                bit_reader.consume(num_bits.into());
                return Ok(symbol);
            }
        }

        self.decode_symbol_slow(bit_reader)
    }

    #[cold]
    fn decode_symbol_slow(&self, bit_reader: &mut impl ReadBits) -> Result<u16> {
        // canonical decoding, codes are sent MSB first
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_LENGTH {
            code |= bit_reader.get(1)? as i32;
            let count = i32::from(self.counts[len]);
            if code - count < first {
                return Ok(self.symbols[(index + (code - first)) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }

        err_exit_code(ExitCode::InvalidDeflate, "Invalid Huffman code")
    }
}

/// One entry of the run-length coded code lengths of a dynamic block. The value
/// is the symbol used for it in the code length alphabet.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LengthRun {
    /// a single code length of 0 - 15
    Length = 0,
    /// the previous length, 3 - 6 times
    CopyPrevious = 16,
    /// zero, 3 - 10 times
    ZerosShort = 17,
    /// zero, 11 - 138 times
    ZerosLong = 18,
}

impl LengthRun {
    /// (smallest repeat count, extra bits for the count)
    const fn repeat_encoding(self) -> (u8, u32) {
        match self {
            LengthRun::Length => (0, 0),
            LengthRun::CopyPrevious => (3, 2),
            LengthRun::ZerosShort => (3, 3),
            LengthRun::ZerosLong => (11, 7),
        }
    }
}

/// The code length table of a dynamic block, kept the way it was coded in the stream
/// so that it can be written back bit for bit.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct DynamicTable {
    /// literal/length and distance code lengths as run-length coded in the stream
    pub runs: Vec<(LengthRun, u8)>,

    /// code lengths of the code length alphabet, indexed by symbol
    pub code_length_lengths: [u8; 19],

    /// literal/length codes (257 - 286)
    pub hlit: usize,

    /// distance codes (1 - 30)
    pub hdist: usize,

    /// code length codes transmitted (4 - 19)
    pub hclen: usize,
}

impl DynamicTable {
    pub fn read(bit_reader: &mut impl ReadBits) -> Result<DynamicTable> {
        let hlit = bit_reader.get(5)? as usize + 257;
        let hdist = bit_reader.get(5)? as usize + 1;
        let hclen = bit_reader.get(4)? as usize + 4;

        if hlit > 286 || hdist > 30 {
            return err_exit_code(ExitCode::InvalidDeflate, "Too many length or distance codes");
        }

        let mut code_length_lengths = [0u8; 19];
        for &symbol in &TREE_CODE_ORDER_TABLE[..hclen] {
            code_length_lengths[symbol] = bit_reader.get(3)? as u8;
        }

        let length_decoder = HuffmanTable::new(&code_length_lengths, false)?;

        let total = hlit + hdist;
        let mut runs = Vec::new();
        let mut lengths_coded: usize = 0;

        while lengths_coded < total {
            let run = match length_decoder.decode_symbol(bit_reader)? {
                len @ 0..=15 => {
                    runs.push((LengthRun::Length, len as u8));
                    lengths_coded += 1;
                    continue;
                }
                16 if lengths_coded == 0 => {
                    return err_exit_code(
                        ExitCode::InvalidDeflate,
                        "Repeat code without previous length",
                    );
                }
                16 => LengthRun::CopyPrevious,
                17 => LengthRun::ZerosShort,
                18 => LengthRun::ZerosLong,
                _ => return err_exit_code(ExitCode::InvalidDeflate, "Invalid code length symbol"),
            };

            let (min_count, extra_bits) = run.repeat_encoding();
            let count = bit_reader.get(extra_bits)? as u8 + min_count;
            runs.push((run, count));
            lengths_coded += usize::from(count);
        }

        if lengths_coded != total {
            return err_exit_code(
                ExitCode::InvalidDeflate,
                "Code lengths overrun the literal and distance counts",
            );
        }

        Ok(DynamicTable {
            runs,
            code_length_lengths,
            hlit,
            hdist,
            hclen,
        })
    }

    /// literal/length and distance code lengths with the runs expanded
    pub fn expanded_lengths(&self) -> (Vec<u8>, Vec<u8>) {
        let mut lengths = Vec::with_capacity(self.hlit + self.hdist);

        for &(run, value) in &self.runs {
            match run {
                LengthRun::Length => lengths.push(value),
                LengthRun::CopyPrevious => {
                    let previous = lengths.last().copied().unwrap_or_default();
                    lengths.resize(lengths.len() + usize::from(value), previous);
                }
                LengthRun::ZerosShort | LengthRun::ZerosLong => {
                    lengths.resize(lengths.len() + usize::from(value), 0);
                }
            }
        }

        let distances = lengths.split_off(self.hlit);
        (lengths, distances)
    }
}

/// code lengths of the fixed literal/length and distance codes (RFC1951 3.2.6)
pub fn fixed_lengths() -> (Vec<u8>, Vec<u8>) {
    let literals = (0..FIXED_LITERAL_CODES)
        .map(|symbol| match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        })
        .collect();

    (literals, vec![5; 32])
}

/// Decodes the literal/length and distance symbols of one compressed block
pub struct HuffmanDecoder {
    literals: HuffmanTable,
    distances: HuffmanTable,
}

impl HuffmanDecoder {
    pub fn fixed() -> Result<Self> {
        let (literals, distances) = fixed_lengths();

        Ok(HuffmanDecoder {
            literals: HuffmanTable::new(&literals, false)?,
            distances: HuffmanTable::new(&distances, false)?,
        })
    }

    pub fn from_dynamic_table(table: &DynamicTable) -> Result<Self> {
        let (literals, distances) = table.expanded_lengths();

        if literals[usize::from(END_OF_BLOCK)] == 0 {
            return err_exit_code(ExitCode::InvalidDeflate, "Missing end of block code");
        }

        Ok(HuffmanDecoder {
            literals: HuffmanTable::new(&literals, true)?,
            distances: HuffmanTable::new(&distances, true)?,
        })
    }

    pub fn decode_literal(&self, bit_reader: &mut impl ReadBits) -> Result<u16> {
        self.literals.decode_symbol(bit_reader)
    }

    pub fn decode_distance(&self, bit_reader: &mut impl ReadBits) -> Result<u16> {
        self.distances.decode_symbol(bit_reader)
    }
}

/// writes every code and reads it back through the table
#[cfg(test)]
fn decode_all_codes(code_lengths: &[u8]) {
    use crate::{bit_reader::BitReader, bit_writer::BitWriter};

    let codes = calc_huffman_codes(code_lengths);
    let table = HuffmanTable::new(code_lengths, false).unwrap();

    let mut w = BitWriter::default();
    for (&code, &len) in codes.iter().zip(code_lengths) {
        if len != 0 {
            w.write(code.into(), len.into());
        }
    }
    // marker after the codes to catch decoding that reads too much or too little
    w.write(0xbeef, 16);
    let data = w.finish();

    let mut r = BitReader::new(&data);
    for (symbol, &len) in code_lengths.iter().enumerate() {
        if len != 0 {
            assert_eq!(table.decode_symbol(&mut r).unwrap(), symbol as u16);
        }
    }
    assert_eq!(r.get(16).unwrap(), 0xbeef);
}

#[test]
fn canonical_codes() {
    // example from RFC1951 3.2.2
    let codes = calc_huffman_codes(&[3, 3, 3, 3, 3, 2, 4, 4]);
    let msb_first: Vec<u16> = codes
        .iter()
        .zip([3u32, 3, 3, 3, 3, 2, 4, 4])
        .map(|(&c, len)| c.reverse_bits() >> (16 - len))
        .collect();
    assert_eq!(msb_first, [2, 3, 4, 5, 6, 0, 14, 15]);
}

#[test]
fn decode_tables() {
    decode_all_codes(&[1, 0, 3, 3, 4, 4, 3, 0]);
    decode_all_codes(&[2, 2, 2, 2]);

    // codes longer than 8 bits go through the slow path
    decode_all_codes(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15]);

    let (literals, distances) = fixed_lengths();
    decode_all_codes(&literals);
    decode_all_codes(&distances);
}

#[test]
fn reject_bad_code_lengths() {
    // over-subscribed
    assert_eq!(
        HuffmanTable::new(&[1, 1, 1], true).unwrap_err().exit_code(),
        ExitCode::InvalidDeflate
    );

    // incomplete with more than one code
    assert!(HuffmanTable::new(&[1, 2, 0], true).is_err());

    // a single one bit code is allowed for distances, but not for the code length alphabet
    assert!(HuffmanTable::new(&[0, 1, 0], true).is_ok());
    assert!(HuffmanTable::new(&[0, 1, 0], false).is_err());
    assert!(HuffmanTable::new(&[0, 0, 0], true).is_ok());
}

#[test]
fn unused_code_is_an_error() {
    use crate::bit_reader::BitReader;

    // only symbol 1 has a code ("0"), so a "1" bit can't be decoded
    let table = HuffmanTable::new(&[0, 1], true).unwrap();

    // enough bits for the decoder to try every code length
    let data = [0b10u8, 0];
    let mut reader = BitReader::new(&data);
    assert_eq!(table.decode_symbol(&mut reader).unwrap(), 1);
    assert_eq!(
        table.decode_symbol(&mut reader).unwrap_err().exit_code(),
        ExitCode::InvalidDeflate
    );
}

#[test]
fn dynamic_table_from_stream() {
    use crate::bit_reader::BitReader;

    // skewed symbol frequencies make a dynamic block the smallest choice
    let text: Vec<u8> = (0..2000usize).map(|i| b"etaoinshrdlu"[(i * i / 7) % 12]).collect();
    let compressed = miniz_oxide::deflate::compress_to_vec(&text, 9);

    let mut r = BitReader::new(&compressed);
    let _bfinal = r.get(1).unwrap();
    assert_eq!(r.get(2).unwrap(), 2, "expected a dynamic block");

    let table = DynamicTable::read(&mut r).unwrap();
    let (literals, distances) = table.expanded_lengths();
    assert_eq!(literals.len(), table.hlit);
    assert_eq!(distances.len(), table.hdist);
    assert_ne!(literals[usize::from(END_OF_BLOCK)], 0);

    HuffmanDecoder::from_dynamic_table(&table).unwrap();
}
