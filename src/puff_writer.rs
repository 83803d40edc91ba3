/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Byte-aligned writer for the puff representation of a deflate stream.
//!
//! Every deflate symbol becomes a whole number of bytes so that a small change in
//! the uncompressed data only produces a small, local change in the puff output:
//!
//! | record            | bytes                                                       |
//! |-------------------|-------------------------------------------------------------|
//! | block header      | `type << 6 \| final << 5`                                   |
//! | stored block      | header, padding bits, LEN (u16 LE), raw bytes               |
//! | dynamic table     | HLIT-257, HDIST-1, HCLEN-4, code length code lengths, RLE entries |
//! | literal run       | `n - 1` (0..=127), then `n` literal bytes                   |
//! | reference         | `0x80` (`0x81` for the irregular 258), length - 3, distance - 1 (u16 BE) |
//! | end of block      | `0xFF`                                                      |
//! | final padding     | one byte after the end of block of the final block         |

use crate::{
    deflate_constants::{MAX_MATCH, MIN_MATCH, TREE_CODE_ORDER_TABLE},
    huffman::{DynamicTable, LengthRun},
};

const MAX_LITERAL_RUN: usize = 128;

const REFERENCE_MARKER: u8 = 0x80;
const IRREGULAR_258_MARKER: u8 = 0x81;
const END_OF_BLOCK_MARKER: u8 = 0xFF;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PuffBlockType {
    Stored = 0,
    Fixed = 1,
    Dynamic = 2,
}

/// Destination of the puff transform. Either appends to a buffer, or only counts
/// the bytes when just the size of the puff stream is needed.
pub struct PuffWriter<'a> {
    output: Option<&'a mut Vec<u8>>,
    size: usize,
    pending_literals: Vec<u8>,
}

impl<'a> PuffWriter<'a> {
    pub fn new(output: &'a mut Vec<u8>) -> Self {
        PuffWriter {
            output: Some(output),
            size: 0,
            pending_literals: Vec::with_capacity(MAX_LITERAL_RUN),
        }
    }

    /// writer that discards the output and only keeps track of its size
    pub fn counting() -> Self {
        PuffWriter {
            output: None,
            size: 0,
            pending_literals: Vec::with_capacity(MAX_LITERAL_RUN),
        }
    }

    /// number of bytes produced so far, including literals that are still pending
    pub fn size(&self) -> usize {
        self.size + Self::literal_run_size(self.pending_literals.len())
    }

    fn literal_run_size(len: usize) -> usize {
        if len == 0 { 0 } else { len + 1 }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if let Some(output) = &mut self.output {
            output.extend_from_slice(bytes);
        }
        self.size += bytes.len();
    }

    fn flush_literals(&mut self) {
        if self.pending_literals.is_empty() {
            return;
        }

        let run = std::mem::take(&mut self.pending_literals);
        self.write_bytes(&[(run.len() - 1) as u8]);
        self.write_bytes(&run);

        self.pending_literals = run;
        self.pending_literals.clear();
    }

    pub fn insert_block_header(&mut self, block_type: PuffBlockType, last: bool) {
        self.flush_literals();
        self.write_bytes(&[(block_type as u8) << 6 | u8::from(last) << 5]);
    }

    pub fn insert_stored_block(&mut self, padding_bits: u8, uncompressed: &[u8]) {
        debug_assert!(uncompressed.len() <= usize::from(u16::MAX));

        self.flush_literals();
        self.write_bytes(&[padding_bits]);
        self.write_bytes(&(uncompressed.len() as u16).to_le_bytes());
        self.write_bytes(uncompressed);
    }

    pub fn insert_dynamic_table(&mut self, table: &DynamicTable) {
        self.flush_literals();
        self.write_bytes(&[
            (table.hlit - 257) as u8,
            (table.hdist - 1) as u8,
            (table.hclen - 4) as u8,
        ]);

        for &symbol in &TREE_CODE_ORDER_TABLE[..table.hclen] {
            self.write_bytes(&[table.code_length_lengths[symbol]]);
        }

        for &(run, value) in &table.runs {
            match run {
                LengthRun::Length => self.write_bytes(&[value]),
                _ => self.write_bytes(&[run as u8, value]),
            }
        }
    }

    pub fn insert_literal(&mut self, literal: u8) {
        self.pending_literals.push(literal);
        if self.pending_literals.len() == MAX_LITERAL_RUN {
            self.flush_literals();
        }
    }

    pub fn insert_reference(&mut self, len: u32, dist: u32, irregular258: bool) {
        debug_assert!((MIN_MATCH..=MAX_MATCH).contains(&len) && (1..=32768).contains(&dist));

        self.flush_literals();
        let marker = if irregular258 {
            IRREGULAR_258_MARKER
        } else {
            REFERENCE_MARKER
        };
        self.write_bytes(&[marker, (len - MIN_MATCH) as u8]);
        self.write_bytes(&((dist - 1) as u16).to_be_bytes());
    }

    pub fn insert_end_of_block(&mut self) {
        self.flush_literals();
        self.write_bytes(&[END_OF_BLOCK_MARKER]);
    }

    /// the bits after the final block up to the byte boundary
    pub fn insert_final_padding(&mut self, padding_bits: u8) {
        self.flush_literals();
        self.write_bytes(&[padding_bits]);
    }

    /// writes out any literals that are still pending
    pub fn flush(&mut self) {
        self.flush_literals();
    }
}

#[test]
fn literal_runs() {
    let mut out = Vec::new();
    let mut w = PuffWriter::new(&mut out);

    w.insert_block_header(PuffBlockType::Fixed, true);
    for i in 0..130u32 {
        w.insert_literal(i as u8);
    }
    assert_eq!(w.size(), 1 + 129 + 3);
    w.insert_reference(258, 1, true);
    w.insert_end_of_block();
    w.insert_final_padding(0);
    assert_eq!(w.size(), 1 + 129 + 3 + 4 + 1 + 1);

    assert_eq!(out[0], 0b0110_0000);
    assert_eq!(out[1], 127);
    assert_eq!(out[2..130], (0..128u8).collect::<Vec<_>>()[..]);
    assert_eq!(out[130..133], [1, 128, 129]);
    assert_eq!(out[133..137], [IRREGULAR_258_MARKER, 255, 0, 0]);
    assert_eq!(out[137..], [END_OF_BLOCK_MARKER, 0]);
}

#[test]
fn counting_matches_buffered() {
    fn fill(w: &mut PuffWriter) {
        w.insert_block_header(PuffBlockType::Stored, false);
        w.insert_stored_block(3, b"hello");
        w.insert_block_header(PuffBlockType::Fixed, true);
        w.insert_literal(b'a');
        w.insert_reference(10, 300, false);
        w.insert_literal(b'b');
        w.insert_end_of_block();
        w.flush();
    }

    let mut out = Vec::new();
    let mut buffered = PuffWriter::new(&mut out);
    fill(&mut buffered);
    let buffered_size = buffered.size();

    let mut counting = PuffWriter::counting();
    fill(&mut counting);

    assert_eq!(counting.size(), buffered_size);
    assert_eq!(out.len(), buffered_size);
    assert_eq!(out[..9], [0x00, 3, 5, 0, b'h', b'e', b'l', b'l', b'o']);
}
