/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! LSB-first bit writer used by the tests to build deflate streams with
//! blocks at arbitrary bit positions.

#[derive(Default)]
pub struct BitWriter {
    bit_buffer: u64,
    bits_in: u32,
    output: Vec<u8>,
    total_bits: u64,
}

impl BitWriter {
    pub fn write(&mut self, bits: u32, len: u32) {
        debug_assert!(len <= 32 && u64::from(bits) < (1u64 << len));
        self.bit_buffer |= u64::from(bits) << self.bits_in;
        self.bits_in += len;
        self.total_bits += u64::from(len);

        while self.bits_in >= 8 {
            self.output.push(self.bit_buffer as u8);
            self.bit_buffer >>= 8;
            self.bits_in -= 8;
        }
    }

    /// writes a huffman code, which is stored MSB first in the stream
    pub fn write_code(&mut self, code: u32, len: u32) {
        let mut rev = 0;
        for i in 0..len {
            rev |= ((code >> i) & 1) << (len - 1 - i);
        }
        self.write(rev, len);
    }

    /// bits written so far
    pub fn bit_position(&self) -> u64 {
        self.total_bits
    }

    /// pads with zero bits up to the next byte boundary
    pub fn pad(&mut self) {
        let pad = (8 - (self.bits_in & 7)) & 7;
        self.write(0, pad);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.output
    }
}

#[test]
fn write_simple() {
    let mut b = BitWriter::default();

    b.write(1, 4);
    b.write(2, 4);
    b.write(3, 4);
    b.write(4, 4);
    b.write(4, 4);
    b.write(0x56, 8);
    b.write(0x78, 8);
    b.write(0x9f, 8);
    b.write(0xfe, 8);
    b.write(0xe, 4);

    assert_eq!(b.bit_position(), 56);
    assert_eq!(b.finish(), [0x21, 0x43, 0x64, 0x85, 0xf7, 0xe9, 0xef]);
}

/// write various bit patterns and see if the result matches the input
#[test]
fn write_roundtrip() {
    use crate::bit_reader::BitReader;

    let mut b = BitWriter::default();

    let pattern = [
        (0, 1),
        (1, 1),
        (1, 2),
        (2, 3),
        (3, 4),
        (4, 5),
        (4, 6),
        (0x156, 9),
        (0x78, 8),
        (0x9f, 8),
        (0xfe, 8),
        (0x7fff, 15),
        (0xffff, 16),
        (0xe, 4),
    ];

    for &(bits, len) in pattern.iter() {
        b.write(bits, len);
    }

    let data = b.finish();
    let mut reader = BitReader::new(&data);

    for &(bits, len) in pattern.iter() {
        assert_eq!(reader.get(len).unwrap(), bits);
    }
}
