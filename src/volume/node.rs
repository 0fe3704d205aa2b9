//! The node tree backing a [`super::MemVolume`]: files hold a resizable byte
//! buffer, directories hold an insertion-ordered mapping from name to child
//! node.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{FileType, Timestamp};

use super::VolumeError;

/// A directory or file node, shared by every descriptor and directory entry
/// that currently reaches it. Unlinking a node removes it from its parent's
/// entry list but does not invalidate descriptors already holding a clone of
/// this handle (POSIX open-but-unlinked semantics, SPEC_FULL.md §3).
#[derive(Clone)]
pub struct Node(Arc<Mutex<NodeData>>);

pub struct NodeData {
    pub kind: NodeKind,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

pub enum NodeKind {
    File(Vec<u8>),
    Dir(DirEntries),
}

/// A directory's children, each tagged with the monotonic sequence number it
/// was inserted under. Readdir cookies are derived from this sequence
/// rather than from Vec position, so a cookie stays meaningful even after
/// earlier entries are removed (SPEC_FULL.md §4.4, §9).
#[derive(Default)]
pub struct DirEntries {
    pub items: Vec<(Box<str>, Node, u64)>,
    next_seq: u64,
}

impl DirEntries {
    fn push(&mut self, name: &str, child: Node) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push((name.into(), child, seq));
    }
}

impl Node {
    pub fn new_file(bytes: Vec<u8>, now: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(NodeData {
            kind: NodeKind::File(bytes),
            atime: now,
            mtime: now,
            ctime: now,
        })))
    }

    pub fn new_dir(now: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(NodeData {
            kind: NodeKind::Dir(DirEntries::default()),
            atime: now,
            mtime: now,
            ctime: now,
        })))
    }

    pub fn lock(&self) -> MutexGuard<'_, NodeData> {
        self.0.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// A stable identity for this node, usable as a WASI inode number: two
    /// clones of the same `Node` always report the same id, and no other
    /// live node does (SPEC_FULL.md §3, "Inode numbers").
    pub fn inode(&self) -> u64 {
        Arc::as_ptr(&self.0) as usize as u64
    }

    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn file_type(&self) -> FileType {
        match self.lock().kind {
            NodeKind::File(_) => FileType::RegularFile,
            NodeKind::Dir(_) => FileType::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.lock().kind, NodeKind::Dir(_))
    }

    pub fn size(&self) -> u64 {
        Self::size_locked(&self.lock())
    }

    /// Same as [`Node::size`] but for a guard the caller already holds, to
    /// avoid re-entering this node's mutex.
    pub fn size_locked(data: &NodeData) -> u64 {
        match &data.kind {
            NodeKind::File(bytes) => bytes.len() as u64,
            NodeKind::Dir(entries) => entries.items.len() as u64,
        }
    }

    /// Look up a direct child by name. `None` if this node is a file or the
    /// name is absent.
    pub fn child(&self, name: &str) -> Option<Node> {
        match &self.lock().kind {
            NodeKind::Dir(entries) => entries
                .items
                .iter()
                .find(|(n, _, _)| n.as_ref() == name)
                .map(|(_, node, _)| node.clone()),
            NodeKind::File(_) => None,
        }
    }

    pub fn touch(&self, now: Timestamp) {
        let mut data = self.lock();
        data.mtime = now;
        data.ctime = now;
    }

    /// Appends `name -> child` to this directory's entry list under a fresh
    /// sequence number. The caller is responsible for checking for a
    /// pre-existing entry of that name first.
    pub fn insert(&self, name: &str, child: Node) -> Result<(), VolumeError> {
        match &mut self.lock().kind {
            NodeKind::Dir(entries) => {
                entries.push(name, child);
                Ok(())
            }
            NodeKind::File(_) => Err(VolumeError::NotADirectory),
        }
    }

    /// Removes and returns the named entry, preserving the order of the
    /// remaining entries (SPEC_FULL.md §4.1, directory ordering).
    pub fn remove(&self, name: &str) -> Result<Node, VolumeError> {
        match &mut self.lock().kind {
            NodeKind::Dir(entries) => {
                let index = entries
                    .items
                    .iter()
                    .position(|(n, _, _)| n.as_ref() == name)
                    .ok_or(VolumeError::NotFound)?;
                Ok(entries.items.remove(index).1)
            }
            NodeKind::File(_) => Err(VolumeError::NotADirectory),
        }
    }

    /// Reads this node's bytes directly, independent of any path lookup —
    /// valid even after the node has been unlinked from its parent
    /// directory (SPEC_FULL.md §3, open-but-unlinked semantics).
    pub fn read_bytes(&self) -> Result<Vec<u8>, VolumeError> {
        match &self.lock().kind {
            NodeKind::File(bytes) => Ok(bytes.clone()),
            NodeKind::Dir(_) => Err(VolumeError::IsADirectory),
        }
    }

    /// Snapshot of `(name, child, cookie)` triples in insertion order, where
    /// `cookie` is strictly greater for every entry inserted after another
    /// (SPEC_FULL.md §4.4).
    pub fn dir_entries_with_cookies(&self) -> Result<Vec<(String, Node, u64)>, VolumeError> {
        match &self.lock().kind {
            NodeKind::Dir(entries) => Ok(entries
                .items
                .iter()
                .map(|(name, node, seq)| (name.to_string(), node.clone(), seq + 1))
                .collect()),
            NodeKind::File(_) => Err(VolumeError::NotADirectory),
        }
    }
}
