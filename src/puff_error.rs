/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::{fmt::Display, io::ErrorKind};

#[derive(Debug, Clone)]
pub struct PuffError {
    /// standard error code
    exit_code: ExitCode,

    /// diagnostic message including location. Content should not be relied on.
    message: String,
}

pub type Result<T> = std::result::Result<T, PuffError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExitCode {
    /// zlib header violates RFC1950 (method, window size or FCHECK)
    InvalidZlibHeader = 1,
    /// gzip member header violates RFC1952
    InvalidGzipHeader = 3,
    /// an extent or offset lies outside of the buffer or stream
    OutOfBounds = 4,
    /// the puff transform found corrupt deflate data
    InvalidDeflate = 5,
    /// the inflate probe failed to decode the data
    InflateFailed = 6,
    /// an internal post-condition did not hold
    ConsistencyCheck = 7,
    /// caller supplied arguments that break a precondition
    InvalidParameter = 8,
    /// operation on a stream that was already closed
    StreamClosed = 9,
    ShortRead = 16,
    OsError = 17,
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ExitCode {
    /// the numeric value used as the process exit code of the utility
    pub fn as_integer_error_code(self) -> i32 {
        self as i32
    }
}

impl Display for PuffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}: {1}", self.exit_code, self.message)
    }
}

impl PuffError {
    pub fn new(exit_code: ExitCode, message: &str) -> PuffError {
        PuffError {
            exit_code,
            message: message.to_owned(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    #[cold]
    #[track_caller]
    pub fn add_context(&mut self) {
        self.add_location(std::panic::Location::caller());
    }

    fn add_location(&mut self, caller: &std::panic::Location<'_>) {
        self.message
            .push_str(&format!("\n at {}:{}", caller.file(), caller.line()));
    }
}

/// returns an error with the given exit code and message, tagged with the caller location
#[cold]
#[track_caller]
pub fn err_exit_code<T>(exit_code: ExitCode, message: &str) -> Result<T> {
    let mut e = PuffError::new(exit_code, message);
    e.add_location(std::panic::Location::caller());
    Err(e)
}

pub trait AddContext<T> {
    #[track_caller]
    fn context(self) -> Result<T>;
}

/// converts any error that can become a PuffError, appending the location
/// of the caller so that the path of the error can be followed in the message
impl<T, E: Into<PuffError>> AddContext<T> for core::result::Result<T, E> {
    #[track_caller]
    fn context(self) -> Result<T> {
        match self {
            Ok(x) => Ok(x),
            Err(e) => {
                let mut e: PuffError = e.into();
                e.add_location(std::panic::Location::caller());
                Err(e)
            }
        }
    }
}

/// translates std::io::Error into PuffError
impl From<std::io::Error> for PuffError {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        match e.downcast::<PuffError>() {
            Ok(pe) => pe,
            Err(e) => {
                let caller = std::panic::Location::caller();
                PuffError {
                    exit_code: get_io_error_exit_code(&e),
                    message: format!("error {} at {}", e, caller),
                }
            }
        }
    }
}

fn get_io_error_exit_code(e: &std::io::Error) -> ExitCode {
    if e.kind() == ErrorKind::UnexpectedEof {
        ExitCode::ShortRead
    } else {
        ExitCode::OsError
    }
}

/// translates PuffError into std::io::Error, which involves putting into a Box and using Other
impl From<PuffError> for std::io::Error {
    fn from(e: PuffError) -> Self {
        std::io::Error::other(e)
    }
}

impl std::error::Error for PuffError {}

#[test]
fn test_error_translation() {
    // test wrapping inside an io error
    fn my_std_error() -> core::result::Result<(), std::io::Error> {
        Err(PuffError::new(ExitCode::InvalidDeflate, "test error").into())
    }

    let e: PuffError = my_std_error().unwrap_err().into();
    assert_eq!(e.exit_code, ExitCode::InvalidDeflate);
    assert_eq!(e.message, "test error");

    // an IO error should be translated into an OsError
    let e: PuffError =
        std::io::Error::new(std::io::ErrorKind::NotFound, "file not found").into();
    assert_eq!(e.exit_code, ExitCode::OsError);

    // running out of data is a short read
    let e: PuffError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
    assert_eq!(e.exit_code, ExitCode::ShortRead);
}

#[test]
fn test_context_appends_location() {
    fn fails() -> Result<()> {
        err_exit_code(ExitCode::ConsistencyCheck, "bits consumed mismatch")
    }

    let e = fails().context().unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::ConsistencyCheck);
    assert!(e.message().starts_with("bits consumed mismatch"));
    assert_eq!(e.message().matches("puff_error.rs").count(), 2);
    assert_eq!(
        e.to_string().split(':').next(),
        Some("ConsistencyCheck")
    );
}
