/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Spans inside a stream, addressed either in bytes or in bits.

/// A span of a byte stream. Both fields are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ByteExtent {
    pub offset: u64,
    pub length: u64,
}

impl ByteExtent {
    pub const fn new(offset: u64, length: u64) -> Self {
        ByteExtent { offset, length }
    }

    /// first byte after the extent
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// first byte after the extent, or None if that doesn't fit in a u64
    pub const fn checked_end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// A span of a stream with bit precision. `offset` counts bits from the start
/// of the stream, so bit `b` lives in byte `b / 8` at position `b % 8` (LSB first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BitExtent {
    pub offset: u64,
    pub length: u64,
}

impl BitExtent {
    pub const fn new(offset: u64, length: u64) -> Self {
        BitExtent { offset, length }
    }

    /// first bit after the extent
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// first bit after the extent, or None if that doesn't fit in a u64
    pub const fn checked_end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// total number of bytes covered by the extents
pub fn bytes_in_byte_extents(extents: &[ByteExtent]) -> u64 {
    extents.iter().map(|e| e.length).sum()
}

#[test]
fn extent_ends() {
    assert_eq!(ByteExtent::new(10, 5).end(), 15);
    assert_eq!(BitExtent::new(100, 50).end(), 150);

    assert_eq!(ByteExtent::new(10, 5).checked_end(), Some(15));
    assert_eq!(ByteExtent::new(u64::MAX, 1).checked_end(), None);
    assert_eq!(BitExtent::new(u64::MAX - 3, 10).checked_end(), None);
}

#[test]
fn sum_of_byte_extents() {
    assert_eq!(bytes_in_byte_extents(&[]), 0);
    assert_eq!(
        bytes_in_byte_extents(&[
            ByteExtent::new(0, 10),
            ByteExtent::new(20, 7),
            ByteExtent::new(100, 1)
        ]),
        18
    );
}
