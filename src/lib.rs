/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

// forbid lints that we already have eliminated from the codebase so they don't show up in the future
#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]
#![forbid(unused_extern_crates)]
#![forbid(unused_import_braces)]
#![forbid(redundant_lifetimes)]
#![forbid(unused_lifetimes)]
#![forbid(unused_macro_rules)]
#![forbid(macro_use_extern_crate)]

mod bit_reader;
#[cfg(test)]
mod bit_writer;
mod deflate_constants;
mod extent;
mod file_stream;
mod gzip;
mod huffman;
mod memory_stream;
mod puff_error;
mod puff_locations;
mod puff_writer;
mod puffer;
mod size_probe;
mod stream;
mod sub_blocks;
mod zip;
mod zlib;

pub use bit_reader::BitReader;
pub use extent::{BitExtent, ByteExtent, bytes_in_byte_extents};
pub use file_stream::FileStream;
pub use gzip::locate_deflates_in_gzip;
pub use memory_stream::MemoryStream;
pub use puff_error::ExitCode;
pub use puff_error::{AddContext, PuffError, Result, err_exit_code};
pub use puff_locations::{PuffLocations, find_puff_locations};
pub use puff_writer::{PuffBlockType, PuffWriter};
pub use puffer::{PuffTransform, Puffer};
pub use size_probe::{
    DeflateSizes, InflateProbe, MinizInflateProbe, calculate_size_of_deflate_block,
};
pub use stream::PuffStream;
pub use sub_blocks::find_deflate_sub_blocks;
pub use zip::{
    ZipLocalFileHeader, locate_deflate_sub_blocks_in_zip_archive, locate_deflates_in_zip_archive,
};
pub use zlib::{
    ZlibHeader, locate_deflates_in_zlib_blocks, locate_deflates_in_zlib_file, zlib_deflate_extent,
};

#[cfg(test)]
static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize the logger for tests. This is a no-op if the logger is already initialized.
#[cfg(test)]
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
