/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::puff_error::Result;

/// Seekable source or sink of bytes used by the locating functions. Reads and
/// writes are all-or-nothing: a read that cannot be satisfied completely fails.
pub trait PuffStream {
    /// total size of the stream in bytes
    fn size(&self) -> Result<u64>;

    /// current position in bytes
    fn offset(&self) -> Result<u64>;

    /// moves to an absolute position, which may not be past the end of the stream
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// fills the whole buffer from the current position
    fn read(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// writes the whole buffer at the current position
    fn write(&mut self, buffer: &[u8]) -> Result<()>;

    /// releases the stream, after which every other call fails
    fn close(&mut self) -> Result<()>;
}

impl<S: PuffStream + ?Sized> PuffStream for &mut S {
    fn size(&self) -> Result<u64> {
        (**self).size()
    }

    fn offset(&self) -> Result<u64> {
        (**self).offset()
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        (**self).read(buffer)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        (**self).write(buffer)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
