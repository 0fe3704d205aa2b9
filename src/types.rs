//! WASI preview-1 value types shared across the marshalling and dispatch
//! layers: file descriptors, rights, flags, and the small value types that
//! appear in more than one syscall signature.

use bitflags::bitflags;

/// A guest-visible file descriptor.
pub type Fd = u32;

/// Nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// An opaque cursor into a directory's entry stream, produced by
/// `fd_readdir` and round-tripped back by the guest to resume enumeration.
pub type DirCookie = u64;

/// `whence` argument to `fd_seek`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl TryFrom<u8> for Whence {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(()),
        }
    }
}

/// `clock_id` argument to `clock_res_get`/`clock_time_get`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockId {
    Realtime,
    Monotonic,
    ProcessCputimeId,
    ThreadCputimeId,
}

impl TryFrom<u32> for ClockId {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClockId::Realtime),
            1 => Ok(ClockId::Monotonic),
            2 => Ok(ClockId::ProcessCputimeId),
            3 => Ok(ClockId::ThreadCputimeId),
            _ => Err(()),
        }
    }
}

/// `filetype` as reported in `fdstat`/`filestat`/`dirent`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

bitflags! {
    /// `lookupflags`: modifiers to path resolution.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct LookupFlags: u32 {
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

bitflags! {
    /// `oflags`: modifiers to `path_open`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct OFlags: u16 {
        const CREAT = 1 << 0;
        const DIRECTORY = 1 << 1;
        const EXCL = 1 << 2;
        const TRUNC = 1 << 3;
    }
}

bitflags! {
    /// `fdflags`: status flags attached to an open file descriptor.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FdFlags: u16 {
        const APPEND = 1 << 0;
        const DSYNC = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC = 1 << 3;
        const SYNC = 1 << 4;
    }
}

bitflags! {
    /// `fstflags`: which timestamp fields a `*filestat_set_times` call
    /// should update, and whether to use "now" or the supplied value.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FstFlags: u16 {
        const ATIM = 1 << 0;
        const ATIM_NOW = 1 << 1;
        const MTIM = 1 << 2;
        const MTIM_NOW = 1 << 3;
    }
}

bitflags! {
    /// `rights`: the capability bits attached to a file descriptor. Only the
    /// subset relevant to the file/directory operations this host supports
    /// is enumerated; socket-only bits are kept for ABI completeness but are
    /// never granted (sockets are a non-goal, see SPEC_FULL.md §1).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Rights: u64 {
        const FD_DATASYNC = 1 << 0;
        const FD_READ = 1 << 1;
        const FD_SEEK = 1 << 2;
        const FD_FDSTAT_SET_FLAGS = 1 << 3;
        const FD_SYNC = 1 << 4;
        const FD_TELL = 1 << 5;
        const FD_WRITE = 1 << 6;
        const FD_ADVISE = 1 << 7;
        const FD_ALLOCATE = 1 << 8;
        const PATH_CREATE_DIRECTORY = 1 << 9;
        const PATH_CREATE_FILE = 1 << 10;
        const PATH_LINK_SOURCE = 1 << 11;
        const PATH_LINK_TARGET = 1 << 12;
        const PATH_OPEN = 1 << 13;
        const FD_READDIR = 1 << 14;
        const PATH_READLINK = 1 << 15;
        const PATH_RENAME_SOURCE = 1 << 16;
        const PATH_RENAME_TARGET = 1 << 17;
        const PATH_FILESTAT_GET = 1 << 18;
        const PATH_FILESTAT_SET_SIZE = 1 << 19;
        const PATH_FILESTAT_SET_TIMES = 1 << 20;
        const FD_FILESTAT_GET = 1 << 21;
        const FD_FILESTAT_SET_SIZE = 1 << 22;
        const FD_FILESTAT_SET_TIMES = 1 << 23;
        const PATH_SYMLINK = 1 << 24;
        const PATH_REMOVE_DIRECTORY = 1 << 25;
        const PATH_UNLINK_FILE = 1 << 26;
        const POLL_FD_READWRITE = 1 << 27;
        const SOCK_SHUTDOWN = 1 << 28;
    }
}

/// Per-filetype default rights, grounded on the `RightsExt` tables that
/// `wasi-common` attaches to freshly-opened descriptors.
pub trait RightsExt: Sized {
    fn directory_base() -> Self;
    fn directory_inheriting() -> Self;
    fn regular_file_base() -> Self;
    fn regular_file_inheriting() -> Self;
    fn tty_base() -> Self;
    fn tty_inheriting() -> Self;
}

impl RightsExt for Rights {
    fn directory_base() -> Self {
        Self::FD_FDSTAT_SET_FLAGS
            | Self::FD_SYNC
            | Self::FD_ADVISE
            | Self::PATH_CREATE_DIRECTORY
            | Self::PATH_CREATE_FILE
            | Self::PATH_OPEN
            | Self::FD_READDIR
            | Self::PATH_RENAME_SOURCE
            | Self::PATH_RENAME_TARGET
            | Self::PATH_FILESTAT_GET
            | Self::PATH_FILESTAT_SET_SIZE
            | Self::PATH_FILESTAT_SET_TIMES
            | Self::FD_FILESTAT_GET
            | Self::FD_FILESTAT_SET_TIMES
            | Self::PATH_UNLINK_FILE
            | Self::PATH_REMOVE_DIRECTORY
            | Self::POLL_FD_READWRITE
    }

    fn directory_inheriting() -> Self {
        Self::all() ^ (Self::SOCK_SHUTDOWN | Self::PATH_SYMLINK | Self::PATH_READLINK)
    }

    fn regular_file_base() -> Self {
        Self::FD_DATASYNC
            | Self::FD_READ
            | Self::FD_SEEK
            | Self::FD_FDSTAT_SET_FLAGS
            | Self::FD_SYNC
            | Self::FD_TELL
            | Self::FD_WRITE
            | Self::FD_ADVISE
            | Self::FD_ALLOCATE
            | Self::FD_FILESTAT_GET
            | Self::FD_FILESTAT_SET_SIZE
            | Self::FD_FILESTAT_SET_TIMES
            | Self::POLL_FD_READWRITE
    }

    fn regular_file_inheriting() -> Self {
        Self::empty()
    }

    fn tty_base() -> Self {
        Self::FD_READ | Self::FD_FDSTAT_SET_FLAGS | Self::FD_WRITE | Self::FD_FILESTAT_GET
    }

    fn tty_inheriting() -> Self {
        Self::empty()
    }
}
