//! Typed handles for files and directories, and the path resolver that maps
//! a guest-visible absolute path onto a preopen and a volume-relative
//! component sequence (SPEC_FULL.md §4.2).

use std::fmt;
use std::sync::Arc;

use crate::errno::Errno;
use crate::types::Rights;
use crate::volume::{MemVolume, Metadata};
use crate::writable::WritableStream;

/// A directory the embedder has exposed to the guest under a fixed
/// guest-visible path, e.g. `/sandbox`. Each preopen owns its own volume, so
/// resolving a path never needs to cross from one preopen's tree into
/// another's.
pub struct Preopen {
    pub guest_path: String,
    pub volume: Arc<MemVolume>,
}

impl Preopen {
    pub fn new(guest_path: impl Into<String>, volume: Arc<MemVolume>) -> Self {
        let guest_path = guest_path.into();
        debug_assert!(guest_path.starts_with('/'));
        debug_assert!(guest_path == "/" || !guest_path.ends_with('/'));
        Self { guest_path, volume }
    }
}

/// Base and inheriting rights attached to an open descriptor, grounded on
/// the same two-tier rights model `wasi-common` uses.
#[derive(Debug, Copy, Clone)]
pub struct HandleRights {
    base: Rights,
    inheriting: Rights,
}

impl HandleRights {
    pub fn new(base: Rights, inheriting: Rights) -> Self {
        Self { base, inheriting }
    }

    pub fn empty() -> Self {
        Self {
            base: Rights::empty(),
            inheriting: Rights::empty(),
        }
    }

    pub fn contains(&self, other: Self) -> bool {
        self.base.contains(other.base) && self.inheriting.contains(other.inheriting)
    }

    pub fn base(&self) -> Rights {
        self.base
    }

    pub fn inheriting(&self) -> Rights {
        self.inheriting
    }

    /// Narrows `self` to at most `other`, as `fd_fdstat_set_rights` requires
    /// — a descriptor may only lose rights, never gain them.
    pub fn narrow_to(&self, other: Self) -> Option<Self> {
        if other.base.contains(self.base.intersection(other.base))
            && self.base.contains(other.base)
            && self.inheriting.contains(other.inheriting)
        {
            Some(other)
        } else {
            None
        }
    }
}

impl fmt::Display for HandleRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base={:?} inheriting={:?}", self.base, self.inheriting)
    }
}

/// A resolved path within a single preopen: the volume it belongs to, the
/// sequence of components from that volume's root, and the full guest
/// string (kept around so a further relative `path_open` can be resolved by
/// joining and re-running [`find_rel_path`]).
#[derive(Clone)]
pub struct ResolvedPath {
    pub preopen_index: usize,
    pub volume: Arc<MemVolume>,
    pub components: Vec<String>,
    pub abs_guest_path: String,
}

impl ResolvedPath {
    pub fn component_refs(&self) -> Vec<&str> {
        self.components.iter().map(|s| s.as_str()).collect()
    }

    pub fn stat(&self) -> Result<Metadata, Errno> {
        Ok(self.volume.stat(&self.component_refs())?)
    }

    pub fn get_file(&self) -> Result<Vec<u8>, Errno> {
        Ok(self.volume.read_file(&self.component_refs())?)
    }

    pub fn readdir(&self) -> Result<Vec<crate::volume::DirEntry>, Errno> {
        Ok(self.volume.readdir(&self.component_refs())?)
    }

    /// Opens a buffered writer over this path. `keep_existing` selects
    /// append-style semantics (the existing bytes seed the buffer) versus
    /// truncate-on-open.
    pub fn create_writable(&self, keep_existing: bool) -> Result<WritableStream, Errno> {
        let initial = if keep_existing {
            self.volume
                .read_file(&self.component_refs())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(WritableStream::new(
            self.volume.clone(),
            self.components.clone(),
            initial,
        ))
    }

    /// Joins a further guest-supplied relative (or absolute) path onto this
    /// one and resolves it against the full preopen table.
    pub fn join(&self, preopens: &[Preopen], path: &str) -> Result<ResolvedPath, Errno> {
        join_path(preopens, &self.abs_guest_path, path)
    }
}

/// Resolves `path` (relative or absolute) against `base_abs_path`, the
/// guest-visible absolute path of the directory `path` is relative to.
pub fn join_path(
    preopens: &[Preopen],
    base_abs_path: &str,
    path: &str,
) -> Result<ResolvedPath, Errno> {
    if path.starts_with('/') {
        return find_rel_path(preopens, path);
    }
    let joined = if base_abs_path.ends_with('/') {
        format!("{base_abs_path}{path}")
    } else {
        format!("{base_abs_path}/{path}")
    };
    find_rel_path(preopens, &joined)
}

/// Resolves an absolute guest path against the preopen whose visible prefix
/// is the longest match, normalizing `.`/`..` along the way. `..` popping
/// past the chosen preopen's root yields [`Errno::Notcapable`].
pub fn find_rel_path(preopens: &[Preopen], path: &str) -> Result<ResolvedPath, Errno> {
    if !path.starts_with('/') {
        return Err(Errno::Inval);
    }
    let (preopen_index, prefix_len) = preopens
        .iter()
        .enumerate()
        .filter(|(_, p)| is_prefix(&p.guest_path, path))
        .max_by_key(|(_, p)| p.guest_path.len())
        .map(|(i, p)| (i, p.guest_path.len()))
        .ok_or(Errno::Notcapable)?;

    let rest = &path[prefix_len..];
    let mut components: Vec<String> = Vec::new();
    for comp in rest.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                components.pop().ok_or(Errno::Notcapable)?;
            }
            other => components.push(other.to_string()),
        }
    }

    let preopen = &preopens[preopen_index];
    let abs_guest_path = if components.is_empty() {
        preopen.guest_path.clone()
    } else {
        format!("{}/{}", preopen.guest_path.trim_end_matches('/'), components.join("/"))
    };

    Ok(ResolvedPath {
        preopen_index,
        volume: preopen.volume.clone(),
        components,
        abs_guest_path,
    })
}

/// Checks whether `path` falls under the directory named by `prefix`,
/// i.e. equals it exactly or continues with a `/` boundary. A bare string
/// prefix check would wrongly match `/sandboxed` under `/sandbox`.
fn is_prefix(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preopens() -> Vec<Preopen> {
        vec![
            Preopen::new("/", Arc::new(MemVolume::new())),
            Preopen::new("/sandbox", Arc::new(MemVolume::new())),
        ]
    }

    #[test]
    fn longest_prefix_wins() {
        let pre = preopens();
        let resolved = find_rel_path(&pre, "/sandbox/foo").unwrap();
        assert_eq!(resolved.preopen_index, 1);
        assert_eq!(resolved.components, vec!["foo".to_string()]);
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let pre = preopens();
        assert_eq!(
            find_rel_path(&pre, "/sandbox/..").unwrap_err(),
            Errno::Notcapable
        );
    }

    #[test]
    fn dotdot_within_root_is_fine() {
        let pre = preopens();
        let resolved = find_rel_path(&pre, "/sandbox/a/../b").unwrap();
        assert_eq!(resolved.components, vec!["b".to_string()]);
    }

    #[test]
    fn sibling_prefix_is_not_matched() {
        let pre = preopens();
        let resolved = find_rel_path(&pre, "/sandboxed/foo").unwrap();
        assert_eq!(resolved.preopen_index, 0);
    }
}
