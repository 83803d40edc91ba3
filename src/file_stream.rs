/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    puff_error::{AddContext, ExitCode, Result, err_exit_code},
    stream::PuffStream,
};

/// A stream backed by a file on disk.
pub struct FileStream {
    file: Option<File>,
}

impl FileStream {
    /// opens the file for reading and/or writing. Opening for write creates
    /// the file if it doesn't exist but never truncates it.
    pub fn open(path: impl AsRef<Path>, read: bool, write: bool) -> Result<Self> {
        if !read && !write {
            return err_exit_code(
                ExitCode::InvalidParameter,
                "file stream must be opened for read or write",
            );
        }

        let file = OpenOptions::new()
            .read(read)
            .write(write)
            .create(write)
            .truncate(false)
            .open(path)
            .context()?;

        Ok(FileStream { file: Some(file) })
    }

    fn file(&self) -> Result<&File> {
        match &self.file {
            Some(f) => Ok(f),
            None => err_exit_code(ExitCode::StreamClosed, "file stream is closed"),
        }
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        match &mut self.file {
            Some(f) => Ok(f),
            None => err_exit_code(ExitCode::StreamClosed, "file stream is closed"),
        }
    }
}

impl PuffStream for FileStream {
    fn size(&self) -> Result<u64> {
        Ok(self.file()?.metadata().context()?.len())
    }

    fn offset(&self) -> Result<u64> {
        // Seek is implemented for &File, so the position can be queried without &mut self
        let mut f = self.file()?;
        f.stream_position().context()
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.size()? {
            return err_exit_code(ExitCode::OutOfBounds, "seek past end of file stream");
        }
        self.file_mut()?.seek(SeekFrom::Start(offset)).context()?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        let file = self.file_mut()?;
        let start = file.stream_position().context()?;

        if let Err(e) = file.read_exact(buffer) {
            // a failed read leaves the position where it was
            file.seek(SeekFrom::Start(start)).context()?;
            return Err::<(), _>(e).context();
        }
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        self.file_mut()?.write_all(buffer).context()
    }

    fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(mut f) => f.flush().context(),
            None => err_exit_code(ExitCode::StreamClosed, "file stream is closed"),
        }
    }
}

#[test]
fn file_stream_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");

    let mut w = FileStream::open(&path, false, true).unwrap();
    w.write(&[10, 20, 30, 40, 50]).unwrap();
    assert_eq!(w.offset().unwrap(), 5);
    w.close().unwrap();
    assert_eq!(w.write(&[1]).unwrap_err().exit_code(), ExitCode::StreamClosed);

    let mut r = FileStream::open(&path, true, false).unwrap();
    assert_eq!(r.size().unwrap(), 5);

    let mut buf = [0u8; 3];
    r.seek(2).unwrap();
    r.read(&mut buf).unwrap();
    assert_eq!(buf, [30, 40, 50]);

    assert_eq!(r.read(&mut buf).unwrap_err().exit_code(), ExitCode::ShortRead);
    assert_eq!(r.seek(6).unwrap_err().exit_code(), ExitCode::OutOfBounds);
}

#[test]
fn short_read_keeps_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();

    let mut r = FileStream::open(&path, true, false).unwrap();
    r.seek(6).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(r.read(&mut buf).unwrap_err().exit_code(), ExitCode::ShortRead);
    assert_eq!(r.offset().unwrap(), 6);

    let mut buf = [0u8; 4];
    r.read(&mut buf).unwrap();
    assert_eq!(buf, [7, 8, 9, 10]);
}

#[test]
fn missing_file_is_os_error() {
    let dir = tempfile::tempdir().unwrap();
    let e = FileStream::open(dir.path().join("missing.bin"), true, false)
        .err()
        .unwrap();
    assert_eq!(e.exit_code(), ExitCode::OsError);
}
