/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::{
    puff_error::{ExitCode, Result, err_exit_code},
    stream::PuffStream,
};

enum Memory<'a> {
    Read(&'a [u8]),
    Write(&'a mut Vec<u8>),
}

impl Memory<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Memory::Read(m) => m,
            Memory::Write(m) => m.as_slice(),
        }
    }
}

/// A stream over a buffer in memory. Does not own the buffer.
pub struct MemoryStream<'a> {
    memory: Memory<'a>,
    offset: usize,
    open: bool,
}

impl<'a> MemoryStream<'a> {
    /// creates a read-only stream, writes will fail
    pub fn for_read(memory: &'a [u8]) -> Self {
        MemoryStream {
            memory: Memory::Read(memory),
            offset: 0,
            open: true,
        }
    }

    /// creates a stream that overwrites the buffer from the start and grows it
    /// as needed. Existing content beyond what is written is kept.
    pub fn for_write(memory: &'a mut Vec<u8>) -> Self {
        MemoryStream {
            memory: Memory::Write(memory),
            offset: 0,
            open: true,
        }
    }

    fn check_open(&self) -> Result<()> {
        if !self.open {
            return err_exit_code(ExitCode::StreamClosed, "memory stream is closed");
        }
        Ok(())
    }
}

impl PuffStream for MemoryStream<'_> {
    fn size(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.memory.as_slice().len() as u64)
    }

    fn offset(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.offset as u64)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.check_open()?;
        if offset > self.memory.as_slice().len() as u64 {
            return err_exit_code(ExitCode::OutOfBounds, "seek past end of memory stream");
        }
        self.offset = offset as usize;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.check_open()?;
        let memory = self.memory.as_slice();
        let end = self.offset + buffer.len();
        if end > memory.len() {
            return err_exit_code(ExitCode::ShortRead, "read past end of memory stream");
        }
        buffer.copy_from_slice(&memory[self.offset..end]);
        self.offset = end;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        self.check_open()?;
        match &mut self.memory {
            Memory::Read(_) => {
                err_exit_code(ExitCode::InvalidParameter, "memory stream is read-only")
            }
            Memory::Write(memory) => {
                let end = self.offset + buffer.len();
                if end > memory.len() {
                    memory.resize(end, 0);
                }
                memory[self.offset..end].copy_from_slice(buffer);
                self.offset = end;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.open = false;
        Ok(())
    }
}

#[test]
fn read_stream() {
    let data = [1u8, 2, 3, 4, 5, 6];
    let mut s = MemoryStream::for_read(&data);

    assert_eq!(s.size().unwrap(), 6);

    let mut buf = [0u8; 2];
    s.seek(3).unwrap();
    s.read(&mut buf).unwrap();
    assert_eq!(buf, [4, 5]);
    assert_eq!(s.offset().unwrap(), 5);

    // only one byte left
    assert_eq!(s.read(&mut buf).unwrap_err().exit_code(), ExitCode::ShortRead);
    assert_eq!(s.offset().unwrap(), 5);

    // seeking to the very end is fine, past it is not
    s.seek(6).unwrap();
    assert_eq!(s.seek(7).unwrap_err().exit_code(), ExitCode::OutOfBounds);

    assert_eq!(
        s.write(&[1]).unwrap_err().exit_code(),
        ExitCode::InvalidParameter
    );
}

#[test]
fn write_stream_grows() {
    let mut memory = vec![9u8; 4];
    {
        let mut s = MemoryStream::for_write(&mut memory);
        s.write(&[1, 2]).unwrap();
        s.seek(3).unwrap();
        s.write(&[3, 4, 5]).unwrap();
        assert_eq!(s.size().unwrap(), 6);
        assert_eq!(s.offset().unwrap(), 6);
    }
    assert_eq!(memory, [1, 2, 9, 3, 4, 5]);
}

#[test]
fn closed_stream_fails() {
    let data = [0u8; 4];
    let mut s = MemoryStream::for_read(&data);
    s.close().unwrap();

    assert_eq!(s.size().unwrap_err().exit_code(), ExitCode::StreamClosed);
    assert_eq!(s.seek(0).unwrap_err().exit_code(), ExitCode::StreamClosed);
    assert_eq!(s.close().unwrap_err().exit_code(), ExitCode::StreamClosed);
}
