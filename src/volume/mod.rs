//! `MemVolume`: an in-memory, POSIX-flavored file system with no symlinks or
//! hard links (SPEC_FULL.md §3, §4.1).

mod node;

pub use node::Node;
use node::NodeKind;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{FileType, Timestamp};
use thiserror::Error;

/// Failure conditions a [`MemVolume`] call can raise. Translated to a WASI
/// [`crate::errno::Errno`] at the syscall dispatch boundary only — this type
/// carries no WASI-specific vocabulary (SPEC_FULL.md §7).
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum VolumeError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file or directory already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("path escapes its root")]
    PathEscape,
    #[error("invalid path component")]
    InvalidName,
    #[error("rename target is on a different volume")]
    CrossDevice,
}

/// `stat`-style metadata returned by [`MemVolume::stat`] and by directory
/// iteration.
#[derive(Debug, Copy, Clone)]
pub struct Metadata {
    pub file_type: FileType,
    pub size: u64,
    pub inode: u64,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

/// One entry yielded by [`MemVolume::readdir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
    pub inode: u64,
    pub cookie: u64,
}

/// An in-memory directory tree. Every mutating call advances the volume's
/// logical clock so two successive mutations never report identical
/// timestamps even when the OS clock's resolution is coarser than a
/// nanosecond (SPEC_FULL.md §9, Open Question 1).
pub struct MemVolume {
    root: Node,
    clock: AtomicU64,
}

impl Default for MemVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl MemVolume {
    pub fn new() -> Self {
        let now = unix_nanos_now();
        Self {
            root: Node::new_dir(now),
            clock: AtomicU64::new(now),
        }
    }

    /// The volume's root directory node, used by the embedder to construct
    /// preopens (SPEC_FULL.md §3, "Preopens").
    pub fn root(&self) -> Node {
        self.root.clone()
    }

    fn tick(&self) -> Timestamp {
        let wall = unix_nanos_now();
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self.clock.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn resolve(&self, components: &[&str]) -> Result<Node, VolumeError> {
        let mut cur = self.root.clone();
        for comp in components {
            if !cur.is_dir() {
                return Err(VolumeError::NotADirectory);
            }
            cur = cur.child(comp).ok_or(VolumeError::NotFound)?;
        }
        Ok(cur)
    }

    fn resolve_parent<'a>(
        &self,
        components: &'a [&str],
    ) -> Result<(Node, &'a str), VolumeError> {
        let (last, dirs) = components
            .split_last()
            .ok_or(VolumeError::InvalidName)?;
        let parent = self.resolve(dirs)?;
        if !parent.is_dir() {
            return Err(VolumeError::NotADirectory);
        }
        Ok((parent, last))
    }

    /// The live node a path currently resolves to, for callers (the
    /// descriptor table) that need to hold onto it independent of future
    /// path lookups — e.g. across an unlink (SPEC_FULL.md §3).
    pub fn node_at(&self, components: &[&str]) -> Result<Node, VolumeError> {
        self.resolve(components)
    }

    pub fn stat(&self, components: &[&str]) -> Result<Metadata, VolumeError> {
        let node = self.resolve(components)?;
        let data = node.lock();
        Ok(Metadata {
            file_type: node.file_type(),
            size: Node::size_locked(&data),
            inode: node.inode(),
            atime: data.atime,
            mtime: data.mtime,
            ctime: data.ctime,
        })
    }

    pub fn read_file(&self, components: &[&str]) -> Result<Vec<u8>, VolumeError> {
        let node = self.resolve(components)?;
        let data = node.lock();
        match &data.kind {
            NodeKind::File(bytes) => Ok(bytes.clone()),
            NodeKind::Dir(_) => Err(VolumeError::IsADirectory),
        }
    }

    /// Replaces the contents of the file at `components`, creating it (and,
    /// if `create_parents`, any missing intermediate directories) when
    /// absent.
    pub fn write_file(
        &self,
        components: &[&str],
        bytes: Vec<u8>,
        create_parents: bool,
    ) -> Result<(), VolumeError> {
        let (parent, name) = self.ensure_parent(components, create_parents)?;
        let now = self.tick();
        if let Some(existing) = parent.child(name) {
            let mut data = existing.lock();
            match &mut data.kind {
                NodeKind::File(buf) => {
                    *buf = bytes;
                }
                NodeKind::Dir(_) => return Err(VolumeError::IsADirectory),
            }
            data.mtime = now;
            data.ctime = now;
        } else {
            parent.insert(name, Node::new_file(bytes, now))?;
        }
        parent.touch(now);
        tracing::debug!(path = ?components, "write_file");
        Ok(())
    }

    fn ensure_parent<'a>(
        &self,
        components: &'a [&str],
        create_parents: bool,
    ) -> Result<(Node, &'a str), VolumeError> {
        let (last, dirs) = components
            .split_last()
            .ok_or(VolumeError::InvalidName)?;
        if !create_parents {
            let parent = self.resolve(dirs)?;
            if !parent.is_dir() {
                return Err(VolumeError::NotADirectory);
            }
            return Ok((parent, last));
        }
        let mut cur = self.root.clone();
        for comp in dirs {
            if !cur.is_dir() {
                return Err(VolumeError::NotADirectory);
            }
            cur = match cur.child(comp) {
                Some(node) => node,
                None => {
                    let now = self.tick();
                    let created = Node::new_dir(now);
                    cur.insert(comp, created.clone())?;
                    created
                }
            };
        }
        Ok((cur, last))
    }

    pub fn mkdir(&self, components: &[&str], recursive: bool) -> Result<(), VolumeError> {
        if components.is_empty() {
            return Err(VolumeError::AlreadyExists);
        }
        if recursive {
            let mut cur = self.root.clone();
            for comp in components {
                if !cur.is_dir() {
                    return Err(VolumeError::NotADirectory);
                }
                cur = match cur.child(comp) {
                    Some(existing) => existing,
                    None => {
                        let now = self.tick();
                        let created = Node::new_dir(now);
                        cur.insert(comp, created.clone())?;
                        cur.touch(now);
                        created
                    }
                };
            }
            return Ok(());
        }
        let (parent, name) = self.resolve_parent(components)?;
        if parent.child(name).is_some() {
            return Err(VolumeError::AlreadyExists);
        }
        let now = self.tick();
        parent.insert(name, Node::new_dir(now))?;
        parent.touch(now);
        tracing::debug!(path = ?components, "mkdir");
        Ok(())
    }

    /// Entries in insertion order, stable across back-to-back calls with no
    /// intervening mutation (SPEC_FULL.md §4.1).
    pub fn readdir(&self, components: &[&str]) -> Result<Vec<DirEntry>, VolumeError> {
        let node = self.resolve(components)?;
        Ok(node
            .dir_entries_with_cookies()?
            .into_iter()
            .map(|(name, child, cookie)| DirEntry {
                name,
                file_type: child.file_type(),
                inode: child.inode(),
                cookie,
            })
            .collect())
    }

    pub fn unlink(&self, components: &[&str]) -> Result<(), VolumeError> {
        let (parent, name) = self.resolve_parent(components)?;
        let target = parent.child(name).ok_or(VolumeError::NotFound)?;
        if target.is_dir() {
            return Err(VolumeError::IsADirectory);
        }
        parent.remove(name)?;
        parent.touch(self.tick());
        tracing::debug!(path = ?components, "unlink");
        Ok(())
    }

    pub fn rmdir(&self, components: &[&str]) -> Result<(), VolumeError> {
        let (parent, name) = self.resolve_parent(components)?;
        let target = parent.child(name).ok_or(VolumeError::NotFound)?;
        if !target.is_dir() {
            return Err(VolumeError::NotADirectory);
        }
        if target.size() != 0 {
            return Err(VolumeError::DirectoryNotEmpty);
        }
        parent.remove(name)?;
        parent.touch(self.tick());
        tracing::debug!(path = ?components, "rmdir");
        Ok(())
    }

    pub fn truncate(&self, components: &[&str], size: u64) -> Result<(), VolumeError> {
        let node = self.resolve(components)?;
        let mut data = node.lock();
        match &mut data.kind {
            NodeKind::File(bytes) => {
                bytes.resize(size as usize, 0);
            }
            NodeKind::Dir(_) => return Err(VolumeError::IsADirectory),
        }
        let now = self.tick();
        data.mtime = now;
        data.ctime = now;
        Ok(())
    }

    pub fn set_times(
        &self,
        components: &[&str],
        atime: Option<Timestamp>,
        mtime: Option<Timestamp>,
    ) -> Result<(), VolumeError> {
        let node = self.resolve(components)?;
        let mut data = node.lock();
        if let Some(a) = atime {
            data.atime = a;
        }
        if let Some(m) = mtime {
            data.mtime = m;
        }
        data.ctime = self.tick();
        Ok(())
    }

    /// Renames `src` to `dst` atomically within this volume. Overwrites an
    /// existing file at `dst`; refuses to overwrite a non-empty directory or
    /// to cross the file/directory kind boundary (SPEC_FULL.md §4.1).
    pub fn rename(&self, src: &[&str], dst: &[&str]) -> Result<(), VolumeError> {
        if src == dst {
            self.resolve(src)?;
            return Ok(());
        }
        let (src_parent, src_name) = self.resolve_parent(src)?;
        let src_node = src_parent.child(src_name).ok_or(VolumeError::NotFound)?;
        let (dst_parent, dst_name) = self.resolve_parent(dst)?;

        if let Some(existing) = dst_parent.child(dst_name) {
            match (src_node.is_dir(), existing.is_dir()) {
                (true, false) => return Err(VolumeError::NotADirectory),
                (false, true) => return Err(VolumeError::IsADirectory),
                (true, true) => {
                    if existing.size() != 0 {
                        return Err(VolumeError::DirectoryNotEmpty);
                    }
                }
                (false, false) => {}
            }
            dst_parent.remove(dst_name)?;
        }

        src_parent.remove(src_name)?;
        dst_parent.insert(dst_name, src_node)?;
        let now = self.tick();
        src_parent.touch(now);
        dst_parent.touch(now);
        tracing::debug!(src = ?src, dst = ?dst, "rename");
        Ok(())
    }
}

fn unix_nanos_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
