//! The per-guest file-descriptor table: allocation, preopen enumeration,
//! fd→resource lookup, renumbering, and directory iteration state
//! (SPEC_FULL.md §4.4).

use std::collections::BTreeMap;

use crate::errno::Errno;
use crate::handle::HandleRights;
use crate::types::{Fd, FdFlags};
use crate::volume::Node;
use crate::writable::WritableStream;

pub const FIRST_PREOPEN_FD: Fd = 3;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum StdioKind {
    In,
    Out,
    Err,
}

/// An open regular file: a handle to its node plus, when opened writable, a
/// buffered stream that publishes on close (SPEC_FULL.md §4.3).
pub struct FileState {
    pub node: Node,
    pub writer: Option<WritableStream>,
    pub cursor: u64,
    pub flags: FdFlags,
    pub rights: HandleRights,
}

impl FileState {
    pub fn current_len(&self) -> u64 {
        match &self.writer {
            Some(w) => w.len(),
            None => self.node.size(),
        }
    }
}

/// An open directory: identity plus the guest-visible path it was opened
/// under (used by `fd_prestat_dir_name` when this is a preopen root).
pub struct DirState {
    pub node: Node,
    pub guest_path: String,
    pub rights: HandleRights,
    pub volume: std::sync::Arc<crate::volume::MemVolume>,
}

pub enum OpenFile {
    File(FileState),
    Dir(DirState),
    Stdio(StdioKind),
}

impl OpenFile {
    pub fn as_file(&self) -> Result<&FileState, Errno> {
        match self {
            OpenFile::File(f) => Ok(f),
            _ => Err(Errno::Badf),
        }
    }

    pub fn as_file_mut(&mut self) -> Result<&mut FileState, Errno> {
        match self {
            OpenFile::File(f) => Ok(f),
            _ => Err(Errno::Badf),
        }
    }

    pub fn as_dir(&self) -> Result<&DirState, Errno> {
        match self {
            OpenFile::Dir(d) => Ok(d),
            _ => Err(Errno::Badf),
        }
    }

    pub fn rights(&self) -> HandleRights {
        match self {
            OpenFile::File(f) => f.rights,
            OpenFile::Dir(d) => d.rights,
            OpenFile::Stdio(_) => HandleRights::empty(),
        }
    }
}

/// Descriptor table: 0/1/2 are always stdio, 3..3+N are preopens at start,
/// and further descriptors are allocated at the lowest free slot ≥ 3.
pub struct OpenFiles {
    table: BTreeMap<Fd, OpenFile>,
    next_candidate: Fd,
    preopens: Vec<Fd>,
}

impl OpenFiles {
    pub fn new() -> Self {
        let mut table = BTreeMap::new();
        table.insert(0, OpenFile::Stdio(StdioKind::In));
        table.insert(1, OpenFile::Stdio(StdioKind::Out));
        table.insert(2, OpenFile::Stdio(StdioKind::Err));
        Self {
            table,
            next_candidate: FIRST_PREOPEN_FD,
            preopens: Vec::new(),
        }
    }

    pub fn insert_preopen(&mut self, dir: DirState) -> Fd {
        let fd = self.allocate();
        self.table.insert(fd, OpenFile::Dir(dir));
        self.preopens.push(fd);
        fd
    }

    fn allocate(&mut self) -> Fd {
        let mut candidate = self.next_candidate;
        while self.table.contains_key(&candidate) {
            candidate += 1;
        }
        self.next_candidate = candidate + 1;
        candidate
    }

    pub fn insert(&mut self, open: OpenFile) -> Fd {
        let fd = self.allocate();
        self.table.insert(fd, open);
        fd
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile, Errno> {
        self.table.get(&fd).ok_or(Errno::Badf)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile, Errno> {
        self.table.get_mut(&fd).ok_or(Errno::Badf)
    }

    /// Closes `fd`, flushing any pending writable stream first. Idempotent
    /// on an already-closed or never-open descriptor only in the sense that
    /// a missing fd reports `BADF`, matching the guest-visible contract.
    pub fn close(&mut self, fd: Fd) -> Result<(), Errno> {
        let mut open = self.table.remove(&fd).ok_or(Errno::Badf)?;
        if let OpenFile::File(FileState {
            writer: Some(writer),
            ..
        }) = &mut open
        {
            writer.close().map_err(|_| Errno::Io)?;
        }
        if self.next_candidate > fd {
            self.next_candidate = fd;
        }
        Ok(())
    }

    /// Closes `to` if open, then moves `from`'s resource onto `to`, freeing
    /// `from`.
    pub fn renumber(&mut self, from: Fd, to: Fd) -> Result<(), Errno> {
        if !self.table.contains_key(&from) {
            return Err(Errno::Badf);
        }
        if from == to {
            return Ok(());
        }
        if self.table.contains_key(&to) {
            self.close(to)?;
        }
        let moved = self.table.remove(&from).ok_or(Errno::Badf)?;
        self.table.insert(to, moved);
        Ok(())
    }

    /// Closes every still-open non-stdio descriptor, flushing writable
    /// streams. Called once at `run` termination (SPEC_FULL.md §5,
    /// "Resources"); stdio fds 0/1/2 are not descriptors this table owns the
    /// lifecycle of and must survive.
    pub fn close_all(&mut self) {
        for fd in self.table.keys().copied().collect::<Vec<_>>() {
            if fd < FIRST_PREOPEN_FD {
                continue;
            }
            let _ = self.close(fd);
        }
    }

    /// Preopen descriptors in ascending order, as the guest enumerates them
    /// starting at 3.
    pub fn preopen_fds(&self) -> Vec<Fd> {
        let mut fds: Vec<Fd> = self
            .preopens
            .iter()
            .copied()
            .filter(|fd| self.table.contains_key(fd))
            .collect();
        fds.sort_unstable();
        fds
    }

    /// Whether `fd` was registered via [`OpenFiles::insert_preopen`], as
    /// opposed to a directory opened later via `path_open`.
    pub fn is_preopen(&self, fd: Fd) -> bool {
        self.preopens.contains(&fd)
    }
}

impl Default for OpenFiles {
    fn default() -> Self {
        Self::new()
    }
}
