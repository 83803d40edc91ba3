/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;

use puff_locate::{
    BitExtent, ByteExtent, MemoryStream, MinizInflateProbe, PuffError, PuffLocations, Puffer,
    Result, bytes_in_byte_extents, find_deflate_sub_blocks, find_puff_locations,
    locate_deflates_in_gzip, locate_deflates_in_zip_archive, zlib_deflate_extent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Container {
    /// scan for zip local file headers
    Zip,
    /// one or more gzip members
    Gzip,
    /// the whole file is a single zlib stream
    Zlib,
}

#[derive(Parser)]
#[command(name = "puff_locate_util")]
#[command(about = "Prints the deflate streams in a file and where their puffs would go", long_about = None)]
struct Cli {
    /// File to scan
    input: PathBuf,

    /// Container format. Defaults to gzip if the file starts with the gzip magic, zip otherwise.
    #[arg(value_enum)]
    container: Option<Container>,

    /// level of logging to use
    #[arg(long, default_value = "warn")]
    loglevel: LevelFilter,
}

/// deflate extents, their blocks and the resulting puff locations
fn locate(
    data: &[u8],
    container: Container,
) -> Result<(Vec<ByteExtent>, Vec<BitExtent>, PuffLocations)> {
    let mut puffer = Puffer::new();

    let deflates = match container {
        Container::Zip => locate_deflates_in_zip_archive(data, &MinizInflateProbe),
        Container::Gzip => locate_deflates_in_gzip(data, &MinizInflateProbe)?,
        Container::Zlib => vec![zlib_deflate_extent(
            &mut MemoryStream::for_read(data),
            &ByteExtent::new(0, data.len() as u64),
        )?],
    };

    let sub_blocks =
        find_deflate_sub_blocks(&mut puffer, &mut MemoryStream::for_read(data), &deflates)?;

    let locations =
        find_puff_locations(&mut puffer, &mut MemoryStream::for_read(data), &sub_blocks)?;

    Ok((deflates, sub_blocks, locations))
}

fn main() {
    let cli = Cli::parse();

    Builder::new().filter_level(cli.loglevel).init();

    let data = match std::fs::read(&cli.input) {
        Ok(data) => data,
        Err(e) => {
            let e: PuffError = e.into();
            eprintln!("{}: {}", cli.input.display(), e);
            std::process::exit(e.exit_code().as_integer_error_code());
        }
    };

    let container = cli.container.unwrap_or(if data.starts_with(&[0x1f, 0x8b]) {
        Container::Gzip
    } else {
        Container::Zip
    });

    match locate(&data, container) {
        Ok((deflates, sub_blocks, locations)) => {
            println!("{:?} file of {} bytes", container, data.len());
            for d in &deflates {
                println!("deflate {}..{} ({} bytes)", d.offset, d.end(), d.length);
            }
            println!(
                "{} deflate blocks in {} bytes of deflate data",
                sub_blocks.len(),
                bytes_in_byte_extents(&deflates)
            );
            for p in &locations.puffs {
                println!("puff {}..{} ({} bytes)", p.offset, p.end(), p.length);
            }
            println!("puff size {}", locations.puff_size);
        }
        Err(e) => {
            eprintln!("{}: {}", cli.input.display(), e);
            std::process::exit(e.exit_code().as_integer_error_code());
        }
    }
}
