/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Tables from RFC1951 section 3.2.5 and 3.2.7

pub const END_OF_BLOCK: u16 = 256;

/// first length code, codes below this are literals
pub const NONLEN_CODE_COUNT: u16 = 257;

pub const LEN_CODE_COUNT: usize = 29;
pub const DIST_CODE_COUNT: usize = 30;

pub const MIN_MATCH: u32 = 3;
pub const MAX_MATCH: u32 = 258;

pub const LENGTH_BASE_TABLE: [u16; LEN_CODE_COUNT] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

pub const LENGTH_EXTRA_TABLE: [u8; LEN_CODE_COUNT] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

pub const DIST_BASE_TABLE: [u16; DIST_CODE_COUNT] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

pub const DIST_EXTRA_TABLE: [u8; DIST_CODE_COUNT] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// order in which the code length code lengths are transmitted
pub const TREE_CODE_ORDER_TABLE: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];
