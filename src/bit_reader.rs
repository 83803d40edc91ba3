/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::puff_error::{ExitCode, Result, err_exit_code};

pub trait ReadBits {
    fn get(&mut self, cbit: u32) -> Result<u32>;
    fn peek_byte(&self) -> u8;
    fn bits_left(&self) -> u32;
    fn consume(&mut self, cbit: u32);
    fn refill(&mut self);
}

/// BitReader reads a variable number of bits (LSB first) from a byte slice
/// and keeps track of exactly how many bits have been consumed.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// next byte of data to load into the bit buffer
    position: usize,
    bits_read: u64,
    bit_count: u32,
}

impl ReadBits for BitReader<'_> {
    fn get(&mut self, cbit: u32) -> Result<u32> {
        BitReader::get(self, cbit)
    }

    fn peek_byte(&self) -> u8 {
        self.bits_read as u8
    }

    fn bits_left(&self) -> u32 {
        self.bit_count
    }

    fn consume(&mut self, cbit: u32) {
        debug_assert!(cbit <= self.bit_count);
        self.bits_read >>= cbit;
        self.bit_count -= cbit;
    }

    fn refill(&mut self) {
        while self.bit_count <= 56 && self.position < self.data.len() {
            self.bits_read |= u64::from(self.data[self.position]) << self.bit_count;
            self.position += 1;
            self.bit_count += 8;
        }
    }
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            position: 0,
            bits_read: 0,
            bit_count: 0,
        }
    }

    /// number of bits consumed since the start of the buffer
    pub fn offset_in_bits(&self) -> u64 {
        self.position as u64 * 8 - u64::from(self.bit_count)
    }

    /// number of bytes touched so far, a partially consumed byte counts as a whole one
    pub fn offset(&self) -> usize {
        self.offset_in_bits().div_ceil(8) as usize
    }

    /// number of bits that can still be read
    pub fn bits_remaining(&self) -> u64 {
        (self.data.len() as u64 * 8) - self.offset_in_bits()
    }

    /// reads the bits until the next byte boundary
    pub fn read_padding_bits(&mut self) -> u8 {
        let cbit = self.bit_count & 7;

        let wret = self.bits_read & ((1 << cbit) - 1);

        self.bits_read >>= cbit;
        self.bit_count -= cbit;

        wret as u8
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        debug_assert!(
            self.bit_count & 7 == 0,
            "BitReader Error: Attempt to read bytes without first calling read_padding_bits"
        );

        if self.bit_count > 0 {
            return Ok(self.get(8)? as u8);
        }

        if self.position >= self.data.len() {
            return err_exit_code(ExitCode::ShortRead, "BitReader: end of buffer");
        }
        let b = self.data[self.position];
        self.position += 1;
        Ok(b)
    }

    /// skips cbit bits, which can be more than 32
    pub fn skip(&mut self, mut cbit: u64) -> Result<()> {
        if cbit > self.bits_remaining() {
            return err_exit_code(ExitCode::ShortRead, "BitReader: skip past end of buffer");
        }

        while cbit > 0 {
            let amount = cbit.min(32) as u32;
            self.get(amount)?;
            cbit -= u64::from(amount);
        }
        Ok(())
    }

    /// Read cbit bits from the input stream return
    /// Only supports read of 1 to 32 bits.
    pub fn get(&mut self, cbit: u32) -> Result<u32> {
        if cbit == 0 {
            return Ok(0);
        }

        if cbit > 32 {
            return err_exit_code(
                ExitCode::InvalidParameter,
                "BitReader Error: Attempt to read more than 32 bits",
            );
        }

        if self.bit_count < cbit {
            self.refill();
            if self.bit_count < cbit {
                return err_exit_code(ExitCode::ShortRead, "BitReader: end of buffer");
            }
        }

        let wret = (self.bits_read & ((1u64 << cbit) - 1)) as u32;

        self.bits_read >>= cbit;
        self.bit_count -= cbit;

        Ok(wret)
    }
}

#[test]
fn read_lsb_first() {
    let data = [0b1010_0110u8, 0xff, 0x01];
    let mut r = BitReader::new(&data);

    assert_eq!(r.get(1).unwrap(), 0);
    assert_eq!(r.get(2).unwrap(), 0b11);
    assert_eq!(r.offset_in_bits(), 3);
    assert_eq!(r.offset(), 1);

    assert_eq!(r.get(5).unwrap(), 0b10100);
    assert_eq!(r.offset(), 1);

    assert_eq!(r.get(9).unwrap(), 0x1ff);
    assert_eq!(r.offset_in_bits(), 17);
    assert_eq!(r.bits_remaining(), 7);

    assert_eq!(r.get(8).unwrap_err().exit_code(), ExitCode::ShortRead);

    // a failed read doesn't consume anything
    assert_eq!(r.bits_remaining(), 7);
}

#[test]
fn padding_and_bytes() {
    let data = [0b1110_1101u8, 0x42, 0x43];
    let mut r = BitReader::new(&data);

    assert_eq!(r.get(3).unwrap(), 0b101);
    assert_eq!(r.read_padding_bits(), 0b11101);
    assert_eq!(r.offset_in_bits(), 8);

    assert_eq!(r.read_byte().unwrap(), 0x42);
    assert_eq!(r.read_byte().unwrap(), 0x43);
    assert_eq!(r.read_byte().unwrap_err().exit_code(), ExitCode::ShortRead);
}

#[test]
fn skip_bits() {
    let data = [0u8; 10];
    let mut r = BitReader::new(&data);

    r.skip(3).unwrap();
    assert_eq!(r.offset_in_bits(), 3);
    r.skip(70).unwrap();
    assert_eq!(r.offset_in_bits(), 73);
    assert_eq!(r.offset(), 10);
    assert_eq!(r.skip(8).unwrap_err().exit_code(), ExitCode::ShortRead);
    r.skip(7).unwrap();
    assert_eq!(r.bits_remaining(), 0);
}
