//! Reading and writing WASI structs, iovecs, and little-endian integers at
//! exact byte offsets into the guest's linear memory (SPEC_FULL.md §4.5).

use crate::types::{Rights, Timestamp};

/// A guest pointer or length fell outside the current memory, or a value
/// could not be represented in the target encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("guest pointer {offset}+{len} out of bounds")]
    OutOfBounds { offset: u32, len: u32 },
    #[error("byte range is not valid UTF-8")]
    Utf8,
    #[error("value does not fit its target width")]
    Overflow,
}

/// A single contiguous view of guest linear memory. The dispatcher fetches
/// a fresh one on every call since the guest may grow its memory between
/// syscalls; no reference is held across a suspension point.
pub trait GuestMemory {
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>, MarshalError>;

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), MarshalError>;

    fn read_u8(&self, offset: u32) -> Result<u8, MarshalError> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    fn read_u16(&self, offset: u32) -> Result<u16, MarshalError> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, offset: u32) -> Result<u32, MarshalError> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&self, offset: u32) -> Result<u64, MarshalError> {
        let b = self.read_bytes(offset, 8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap_or([0; 8])))
    }

    fn write_u8(&mut self, offset: u32, value: u8) -> Result<(), MarshalError> {
        self.write_bytes(offset, &[value])
    }

    fn write_u16(&mut self, offset: u32, value: u16) -> Result<(), MarshalError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    fn write_u32(&mut self, offset: u32, value: u32) -> Result<(), MarshalError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    fn write_u64(&mut self, offset: u32, value: u64) -> Result<(), MarshalError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Reads a raw byte run — used for path and environment-string
    /// arguments, which WASI defines as byte strings rather than guaranteed
    /// UTF-8 (SPEC_FULL.md §4.5).
    fn read_path(&self, offset: u32, len: u32) -> Result<String, MarshalError> {
        String::from_utf8(self.read_bytes(offset, len)?).map_err(|_| MarshalError::Utf8)
    }
}

/// Adapts a `wasmi::Memory`'s borrowed byte slice to [`GuestMemory`].
/// Dropped (and re-fetched) every syscall rather than held across one, so it
/// never outlives the slice it borrows.
pub struct WasmiGuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> WasmiGuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }
}

impl GuestMemory for WasmiGuestMemory<'_> {
    fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>, MarshalError> {
        let (start, end) = bounds(offset, len, self.bytes.len())?;
        Ok(self.bytes[start..end].to_vec())
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), MarshalError> {
        let (start, end) = bounds(offset, bytes.len() as u32, self.bytes.len())?;
        self.bytes[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

fn bounds(offset: u32, len: u32, mem_len: usize) -> Result<(usize, usize), MarshalError> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or(MarshalError::OutOfBounds { offset, len })?;
    if end > mem_len {
        return Err(MarshalError::OutOfBounds { offset, len });
    }
    Ok((start, end))
}

/// A decoded `iovec`/`ciovec`: `{ buf: ptr32, len: u32 }`, 8 bytes.
#[derive(Debug, Copy, Clone)]
pub struct IoVec {
    pub buf: u32,
    pub len: u32,
}

pub const IOVEC_SIZE: u32 = 8;

pub fn read_iovec(mem: &dyn GuestMemory, offset: u32) -> Result<IoVec, MarshalError> {
    Ok(IoVec {
        buf: mem.read_u32(offset)?,
        len: mem.read_u32(offset + 4)?,
    })
}

/// Reads `count` consecutive `iovec`s starting at `offset`.
pub fn read_iovec_array(
    mem: &dyn GuestMemory,
    offset: u32,
    count: u32,
) -> Result<Vec<IoVec>, MarshalError> {
    (0..count)
        .map(|i| read_iovec(mem, offset + i * IOVEC_SIZE))
        .collect()
}

pub const FDSTAT_SIZE: u32 = 24;

pub struct FdStat {
    pub filetype: u8,
    pub flags: u16,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}

pub fn write_fdstat(
    mem: &mut dyn GuestMemory,
    offset: u32,
    stat: &FdStat,
) -> Result<(), MarshalError> {
    mem.write_u8(offset, stat.filetype)?;
    mem.write_u16(offset + 2, stat.flags)?;
    mem.write_u64(offset + 8, stat.rights_base.bits())?;
    mem.write_u64(offset + 16, stat.rights_inheriting.bits())?;
    Ok(())
}

pub const FILESTAT_SIZE: u32 = 64;

pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub filetype: u8,
    pub nlink: u64,
    pub size: u64,
    pub atim: Timestamp,
    pub mtim: Timestamp,
    pub ctim: Timestamp,
}

pub fn write_filestat(
    mem: &mut dyn GuestMemory,
    offset: u32,
    stat: &FileStat,
) -> Result<(), MarshalError> {
    mem.write_u64(offset, stat.dev)?;
    mem.write_u64(offset + 8, stat.ino)?;
    mem.write_u8(offset + 16, stat.filetype)?;
    mem.write_u64(offset + 24, stat.nlink)?;
    mem.write_u64(offset + 32, stat.size)?;
    mem.write_u64(offset + 40, stat.atim)?;
    mem.write_u64(offset + 48, stat.mtim)?;
    mem.write_u64(offset + 56, stat.ctim)?;
    Ok(())
}

pub const DIRENT_HEADER_SIZE: u32 = 24;

pub struct Dirent {
    pub d_next: u64,
    pub d_ino: u64,
    pub d_namlen: u32,
    pub d_type: u8,
}

/// Writes a `dirent` header followed by the raw (non-NUL-terminated) name
/// bytes, truncating to whatever fits in the remaining guest buffer space —
/// callers are expected to have already checked how many bytes are left.
pub fn write_dirent(
    mem: &mut dyn GuestMemory,
    offset: u32,
    dirent: &Dirent,
    name: &[u8],
    max_len: u32,
) -> Result<u32, MarshalError> {
    let header_fits = max_len.min(DIRENT_HEADER_SIZE);
    if header_fits > 0 {
        let mut buf = [0u8; DIRENT_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&dirent.d_next.to_le_bytes());
        buf[8..16].copy_from_slice(&dirent.d_ino.to_le_bytes());
        buf[16..20].copy_from_slice(&dirent.d_namlen.to_le_bytes());
        buf[20] = dirent.d_type;
        mem.write_bytes(offset, &buf[..header_fits as usize])?;
    }
    let remaining = max_len.saturating_sub(DIRENT_HEADER_SIZE);
    let name_len = (name.len() as u32).min(remaining);
    if name_len > 0 {
        mem.write_bytes(offset + DIRENT_HEADER_SIZE, &name[..name_len as usize])?;
    }
    Ok(header_fits + name_len)
}

/// Writes length-prefixed argv/environ byte strings: a pointer array
/// (`count` little-endian `u32`s) into `argv_offset`, then the NUL
/// terminated bytes themselves into `buf_offset`, matching `args_get`'s and
/// `environ_get`'s layout (SPEC_FULL.md §4.6).
pub fn write_ptr_array_and_bytes(
    mem: &mut dyn GuestMemory,
    argv_offset: u32,
    buf_offset: u32,
    entries: &[Vec<u8>],
) -> Result<(), MarshalError> {
    let mut cursor = buf_offset;
    for (i, entry) in entries.iter().enumerate() {
        mem.write_u32(argv_offset + (i as u32) * 4, cursor)?;
        mem.write_bytes(cursor, entry)?;
        mem.write_u8(cursor + entry.len() as u32, 0)?;
        cursor += entry.len() as u32 + 1;
    }
    Ok(())
}

/// Sizes needed by `args_sizes_get`/`environ_sizes_get`: entry count and the
/// total buffer size including one NUL terminator per entry.
pub fn sizes_of(entries: &[Vec<u8>]) -> (u32, u32) {
    let count = entries.len() as u32;
    let total: u32 = entries.iter().map(|e| e.len() as u32 + 1).sum();
    (count, total)
}

pub const SUBSCRIPTION_SIZE: u32 = 48;
pub const EVENT_SIZE: u32 = 32;

/// `eventtype`: which union arm a `subscription`/`event` carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventType {
    Clock,
    FdRead,
    FdWrite,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Clock),
            1 => Ok(EventType::FdRead),
            2 => Ok(EventType::FdWrite),
            _ => Err(()),
        }
    }
}

/// A decoded `subscription`: `{ userdata: u64, tag: u8, ... }` at the
/// standardized preview-1 offsets (userdata@0, tag@8, and for the clock
/// variant: clock_id@16 as u32, timeout@24, precision@32, flags@40 as u16;
/// for the fd_read/fd_write variant: fd@16 as u32).
#[derive(Debug, Copy, Clone)]
pub struct Subscription {
    pub userdata: u64,
    pub event_type: EventType,
    pub clock_id: u32,
    pub timeout: u64,
    pub precision: u64,
    pub subscription_clock_abstime: bool,
    pub fd: u32,
}

pub fn read_subscription(mem: &dyn GuestMemory, offset: u32) -> Result<Subscription, MarshalError> {
    let userdata = mem.read_u64(offset)?;
    let tag = mem.read_u8(offset + 8)?;
    let event_type = EventType::try_from(tag).map_err(|_| MarshalError::Overflow)?;
    let (clock_id, timeout, precision, abstime, fd) = match event_type {
        EventType::Clock => {
            let clock_id = mem.read_u32(offset + 16)?;
            let timeout = mem.read_u64(offset + 24)?;
            let precision = mem.read_u64(offset + 32)?;
            let flags = mem.read_u16(offset + 40)?;
            (clock_id, timeout, precision, flags & 1 != 0, 0)
        }
        EventType::FdRead | EventType::FdWrite => {
            let fd = mem.read_u32(offset + 16)?;
            (0, 0, 0, false, fd)
        }
    };
    Ok(Subscription {
        userdata,
        event_type,
        clock_id,
        timeout,
        precision,
        subscription_clock_abstime: abstime,
        fd,
    })
}

/// An `event` to hand back to the guest: `userdata@0 u64, error@8 u16,
/// type@10 u8`, and for fd_read/fd_write, `nbytes@16 u64, flags@24 u16`.
pub struct Event {
    pub userdata: u64,
    pub error: u16,
    pub event_type: EventType,
    pub fd_readwrite_nbytes: u64,
    pub fd_readwrite_flags: u16,
}

pub fn write_event(mem: &mut dyn GuestMemory, offset: u32, event: &Event) -> Result<(), MarshalError> {
    mem.write_u64(offset, event.userdata)?;
    mem.write_u16(offset + 8, event.error)?;
    let tag = match event.event_type {
        EventType::Clock => 0u8,
        EventType::FdRead => 1,
        EventType::FdWrite => 2,
    };
    mem.write_u8(offset + 10, tag)?;
    mem.write_u64(offset + 16, event.fd_readwrite_nbytes)?;
    mem.write_u16(offset + 24, event.fd_readwrite_flags)?;
    Ok(())
}
