//! The WASI preview-1 `errno` universe and conversions from the crate's
//! internal error taxonomies.

use crate::memory::MarshalError;
use crate::volume::VolumeError;

/// A WASI preview-1 errno, returned as a `u16` result code from (almost)
/// every syscall.
///
/// Variant names follow the `__WASI_ERRNO_*` spelling from the witx
/// definitions, lower-cased to normal Rust enum style.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    Success = 0,
    Access = 2,
    Again = 6,
    Badf = 8,
    Busy = 10,
    Exist = 20,
    Fault = 21,
    Inval = 28,
    Io = 29,
    Isdir = 31,
    Mfile = 33,
    NameTooLong = 37,
    Noent = 44,
    Nosys = 52,
    Notcapable = 76,
    Notdir = 54,
    Notempty = 55,
    Notsup = 58,
    Overflow = 61,
    Perm = 63,
    Intr = 27,
    Spipe = 70,
    Xdev = 75,
}

impl Errno {
    /// Numeric WASI errno code written into the guest's return value.
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl From<VolumeError> for Errno {
    fn from(err: VolumeError) -> Self {
        match err {
            VolumeError::NotFound => Errno::Noent,
            VolumeError::AlreadyExists => Errno::Exist,
            VolumeError::NotADirectory => Errno::Notdir,
            VolumeError::IsADirectory => Errno::Isdir,
            VolumeError::DirectoryNotEmpty => Errno::Notempty,
            VolumeError::PathEscape => Errno::Notcapable,
            VolumeError::InvalidName => Errno::Inval,
            VolumeError::CrossDevice => Errno::Xdev,
        }
    }
}

impl From<MarshalError> for Errno {
    fn from(err: MarshalError) -> Self {
        match err {
            MarshalError::OutOfBounds { .. } => Errno::Fault,
            MarshalError::Utf8 => Errno::Inval,
            MarshalError::Overflow => Errno::Overflow,
        }
    }
}
