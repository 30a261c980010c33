//! The closed error taxonomy this crate returns.
//!
//! Numeric identities are stable and match the source's enum ordering
//! (`UFAT_OK`, `UFAT_ERR_IO`, ...); functions that follow the C-shaped
//! lifecycle API in [`crate::bindings`] return `-code` on failure, a
//! non-negative value (sometimes a slot index) on success.

use core::fmt;

/// Stable numeric identity of an [`Error`], independent of the device's
/// own error type. Mirrors `enum ufat_error_t` in the source 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Io = 1,
    BlockSize = 2,
    InvalidBpb = 3,
    BlockAlignment = 4,
    InvalidCluster = 5,
    NameTooLong = 6,
    NotDirectory = 7,
    NotFile = 8,
}

impl ErrorCode {
    const MAX: i32 = 9;

    /// Maps a code (either sign convention, since callers return `-code`
    /// on failure) to its stable string. Unknown codes map to
    /// `"Invalid error code"`, never panic.
    pub fn strerror(mut code: i32) -> &'static str {
        if code < 0 {
            code = -code;
        }

        match code {
            0 => "No error",
            1 => "IO error",
            2 => "Invalid block size",
            3 => "Invalid BPB",
            4 => "Filesystem is not aligned for this block size",
            5 => "Invalid cluster index",
            6 => "Filename too long",
            7 => "Not a directory",
            8 => "Not a file",
            c if c >= Self::MAX => "Invalid error code",
            _ => "Invalid error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::strerror(*self as i32))
    }
}

/// A failure from any operation in this crate.
///
/// Generic over the device's error type `E` so that I/O failures retain
/// their original detail for `Debug`/local handling, while
/// [`Display`](fmt::Display) and [`code`](Self::code) surface only the
/// stable taxonomy below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<E> {
    /// The underlying device's `read` or `write` failed. Propagated
    /// verbatim, except mirror-FAT writes, which swallow this.
    Io(E),
    /// The device's block size is impossibly small, or the derived
    /// cache would be empty.
    BlockSize,
    /// Structural inconsistency in block 0 (non-power-of-two sector
    /// sizes, missing `0xAA55` signature, zero FAT count, non-exact-
    /// power-of-two `sectors_per_cluster`).
    InvalidBpb,
    /// The BPB is valid but its geometry cannot be re-expressed in the
    /// host's block units without remainder.
    BlockAlignment,
    /// A cluster index outside `[0, num_clusters)` was passed to the
    /// FAT decoder.
    InvalidCluster,
    /// Reserved for the directory/file layer; out of scope here.
    NameTooLong,
    /// Reserved for the directory/file layer; out of scope here.
    NotDirectory,
    /// Reserved for the directory/file layer; out of scope here.
    NotFile,
}

impl<E> Error<E> {
    /// The stable numeric identity of this error, independent of `E`.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Io(_) => ErrorCode::Io,
            Error::BlockSize => ErrorCode::BlockSize,
            Error::InvalidBpb => ErrorCode::InvalidBpb,
            Error::BlockAlignment => ErrorCode::BlockAlignment,
            Error::InvalidCluster => ErrorCode::InvalidCluster,
            Error::NameTooLong => ErrorCode::NameTooLong,
            Error::NotDirectory => ErrorCode::NotDirectory,
            Error::NotFile => ErrorCode::NotFile,
        }
    }

    /// The negated numeric identity, as returned by the C-shaped
    /// lifecycle functions in [`crate::bindings`].
    pub fn to_negative(&self) -> i32 {
        -(self.code() as i32)
    }
}

impl<E> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.code(), f)
    }
}

using_std! {
    impl<E: fmt::Debug> std::error::Error for Error<E> { }
}
