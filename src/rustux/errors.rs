// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common error types used throughout the kernel

use crate::rustux::types::*;

/// Result type for operations that can fail
pub type Result<T = ()> = core::result::Result<T, Error>;

/// Common error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Error {
    InvalidArgs = -2,
    BadState = -4,
    NotSupported = -5,
    NoMemory = -6,
    NotFound = -8,
    AlreadyExists = -9,
    NoResources = -13,
    Internal = -12,
}

impl Error {
    /// Convert error to status code
    pub fn to_status(self) -> Status {
        self as Status
    }

    /// Convert status code to error
    ///
    /// Unknown codes collapse to [`Error::Internal`].
    pub fn from_status(status: Status) -> Self {
        match status {
            -2 => Error::InvalidArgs,
            -4 => Error::BadState,
            -5 => Error::NotSupported,
            -6 => Error::NoMemory,
            -8 => Error::NotFound,
            -9 => Error::AlreadyExists,
            -13 => Error::NoResources,
            _ => Error::Internal,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        err.to_status()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Error::InvalidArgs => "invalid arguments",
            Error::BadState => "bad state",
            Error::NotSupported => "not supported",
            Error::NoMemory => "out of memory",
            Error::NotFound => "not found",
            Error::AlreadyExists => "already exists",
            Error::NoResources => "no resources",
            Error::Internal => "internal error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(Error::from_status(Error::NoMemory.to_status()), Error::NoMemory);
        assert_eq!(Status::from(Error::NotFound), -8);
    }

    #[test]
    fn test_unknown_status_is_internal() {
        assert_eq!(Error::from_status(-1000), Error::Internal);
        assert_eq!(Error::from_status(0), Error::Internal);
    }
}
