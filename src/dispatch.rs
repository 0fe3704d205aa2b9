//! One handler per WASI preview-1 function. Each handler validates and
//! decodes its arguments from linear memory, calls into [`OpenFiles`] /
//! [`MemVolume`], writes results back, and returns a numeric errno
//! (SPEC_FULL.md §4.6).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::ctx::WasiCtx;
use crate::errno::Errno;
use crate::fd_table::{DirState, FileState, OpenFile};
use crate::handle::{join_path, HandleRights};
use crate::memory::{
    self, read_iovec_array, write_dirent, write_fdstat, write_filestat, Dirent, FdStat, FileStat,
    GuestMemory, DIRENT_HEADER_SIZE,
};
use crate::types::{ClockId, Fd, FdFlags, FileType, FstFlags, OFlags, Rights, RightsExt, Whence};

fn run(f: impl FnOnce() -> Result<(), Errno>) -> Errno {
    match f() {
        Ok(()) => Errno::Success,
        Err(e) => e,
    }
}

fn resolve_from_fd(ctx: &WasiCtx, fd: Fd, path: &str) -> Result<crate::handle::ResolvedPath, Errno> {
    let dir = ctx.files.get(fd)?.as_dir()?;
    join_path(&ctx.preopens, &dir.guest_path, path)
}

// ---------------------------------------------------------------------
// Process environment
// ---------------------------------------------------------------------

#[tracing::instrument(skip(ctx, mem))]
pub fn args_sizes_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, argc_out: u32, size_out: u32) -> Errno {
    run(|| {
        let (count, total) = memory::sizes_of(&ctx.args);
        mem.write_u32(argc_out, count).map_err(Errno::from)?;
        mem.write_u32(size_out, total).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn args_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, argv: u32, argv_buf: u32) -> Errno {
    run(|| {
        memory::write_ptr_array_and_bytes(mem, argv, argv_buf, &ctx.args).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn environ_sizes_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, count_out: u32, size_out: u32) -> Errno {
    run(|| {
        let (count, total) = memory::sizes_of(&ctx.env);
        mem.write_u32(count_out, count).map_err(Errno::from)?;
        mem.write_u32(size_out, total).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn environ_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, environ: u32, environ_buf: u32) -> Errno {
    run(|| {
        memory::write_ptr_array_and_bytes(mem, environ, environ_buf, &ctx.env).map_err(Errno::from)
    })
}

// ---------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------

pub fn clock_res_get(mem: &mut dyn GuestMemory, _clock_id: u32, resolution_out: u32) -> Errno {
    run(|| mem.write_u64(resolution_out, 1_000).map_err(Errno::from))
}

pub fn clock_time_get(
    ctx: &WasiCtx,
    mem: &mut dyn GuestMemory,
    clock_id: u32,
    _precision: u64,
    time_out: u32,
) -> Errno {
    run(|| {
        let id = ClockId::try_from(clock_id).map_err(|_| Errno::Inval)?;
        let nanos = match id {
            ClockId::Realtime => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|_| Errno::Io)?
                .as_nanos() as u64,
            ClockId::Monotonic | ClockId::ProcessCputimeId | ClockId::ThreadCputimeId => {
                ctx.start.elapsed().as_nanos() as u64
            }
        };
        mem.write_u64(time_out, nanos).map_err(Errno::from)
    })
}

// ---------------------------------------------------------------------
// Descriptor metadata
// ---------------------------------------------------------------------

pub fn fd_advise(ctx: &WasiCtx, fd: Fd, _offset: u64, _len: u64, _advice: u32) -> Errno {
    run(|| {
        ctx.files.get(fd)?;
        Ok(())
    })
}

pub fn fd_allocate(ctx: &WasiCtx, fd: Fd, _offset: u64, _len: u64) -> Errno {
    run(|| {
        ctx.files.get(fd)?;
        Ok(())
    })
}

#[tracing::instrument(skip(ctx))]
pub fn fd_close(ctx: &mut WasiCtx, fd: Fd) -> Errno {
    run(|| ctx.files.close(fd))
}

pub fn fd_datasync(ctx: &WasiCtx, fd: Fd) -> Errno {
    run(|| {
        ctx.files.get(fd)?;
        Ok(())
    })
}

pub fn fd_sync(ctx: &WasiCtx, fd: Fd) -> Errno {
    fd_datasync(ctx, fd)
}

pub fn fd_fdstat_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, stat_out: u32) -> Errno {
    run(|| {
        let open = ctx.files.get(fd)?;
        let (filetype, flags, rights) = match open {
            OpenFile::File(f) => (f.node.file_type(), f.flags.bits(), f.rights),
            OpenFile::Dir(d) => (FileType::Directory, 0, d.rights),
            OpenFile::Stdio(_) => (
                FileType::CharacterDevice,
                0,
                HandleRights::new(Rights::tty_base(), Rights::tty_inheriting()),
            ),
        };
        write_fdstat(
            mem,
            stat_out,
            &FdStat {
                filetype: filetype as u8,
                flags,
                rights_base: rights.base(),
                rights_inheriting: rights.inheriting(),
            },
        )
        .map_err(Errno::from)
    })
}

pub fn fd_fdstat_set_flags(ctx: &mut WasiCtx, fd: Fd, flags: u16) -> Errno {
    run(|| {
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        file.flags = FdFlags::from_bits_truncate(flags);
        Ok(())
    })
}

pub fn fd_fdstat_set_rights(ctx: &mut WasiCtx, fd: Fd, base: u64, inheriting: u64) -> Errno {
    run(|| {
        let requested = HandleRights::new(
            Rights::from_bits_truncate(base),
            Rights::from_bits_truncate(inheriting),
        );
        let open = ctx.files.get_mut(fd)?;
        let current = open.rights();
        let narrowed = current.narrow_to(requested).ok_or(Errno::Notcapable)?;
        match open {
            OpenFile::File(f) => f.rights = narrowed,
            OpenFile::Dir(d) => d.rights = narrowed,
            OpenFile::Stdio(_) => return Err(Errno::Notsup),
        }
        Ok(())
    })
}

fn filestat_of(node: &crate::volume::Node) -> FileStat {
    let meta_size = node.size();
    let data = node.lock();
    FileStat {
        dev: 0,
        ino: node.inode(),
        filetype: node.file_type() as u8,
        nlink: 1,
        size: meta_size,
        atim: data.atime,
        mtim: data.mtime,
        ctim: data.ctime,
    }
}

pub fn fd_filestat_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, stat_out: u32) -> Errno {
    run(|| {
        let open = ctx.files.get(fd)?;
        let node = match open {
            OpenFile::File(f) => &f.node,
            OpenFile::Dir(d) => &d.node,
            OpenFile::Stdio(_) => return Err(Errno::Badf),
        };
        let mut stat = filestat_of(node);
        if let OpenFile::File(f) = open {
            stat.size = f.current_len();
        }
        write_filestat(mem, stat_out, &stat).map_err(Errno::from)
    })
}

pub fn fd_filestat_set_size(ctx: &mut WasiCtx, fd: Fd, size: u64) -> Errno {
    run(|| {
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        match &mut file.writer {
            Some(w) => w.truncate(size).map_err(|_| Errno::Badf),
            None => Err(Errno::Badf),
        }
    })
}

pub fn fd_filestat_set_times(
    ctx: &mut WasiCtx,
    fd: Fd,
    atim: u64,
    mtim: u64,
    fst_flags: u16,
) -> Errno {
    run(|| {
        let open = ctx.files.get(fd)?;
        let node = match open {
            OpenFile::File(f) => f.node.clone(),
            OpenFile::Dir(d) => d.node.clone(),
            OpenFile::Stdio(_) => return Err(Errno::Badf),
        };
        apply_times(&node, atim, mtim, fst_flags);
        Ok(())
    })
}

fn apply_times(node: &crate::volume::Node, atim: u64, mtim: u64, fst_flags: u16) {
    let flags = FstFlags::from_bits_truncate(fst_flags);
    let mut data = node.lock();
    if flags.contains(FstFlags::ATIM) {
        data.atime = atim;
    } else if flags.contains(FstFlags::ATIM_NOW) {
        data.atime = now_nanos();
    }
    if flags.contains(FstFlags::MTIM) {
        data.mtime = mtim;
    } else if flags.contains(FstFlags::MTIM_NOW) {
        data.mtime = now_nanos();
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------
// Reads and writes
// ---------------------------------------------------------------------

pub fn fd_read(ctx: &mut WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, iovs: u32, iovs_len: u32, nread_out: u32) -> Errno {
    run(|| {
        if fd == 0 {
            return read_stdin(ctx, mem, iovs, iovs_len, nread_out);
        }
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        let pos = file.cursor;
        let n = read_file_into_iovecs(file, mem, iovs, iovs_len, pos)?;
        file.cursor += n as u64;
        mem.write_u32(nread_out, n as u32).map_err(Errno::from)
    })
}

pub fn fd_pread(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, iovs: u32, iovs_len: u32, offset: u64, nread_out: u32) -> Errno {
    run(|| {
        let file = ctx.files.get(fd)?.as_file()?;
        let n = read_file_into_iovecs(file, mem, iovs, iovs_len, offset)?;
        mem.write_u32(nread_out, n as u32).map_err(Errno::from)
    })
}

fn read_file_into_iovecs(
    file: &FileState,
    mem: &mut dyn GuestMemory,
    iovs: u32,
    iovs_len: u32,
    offset: u64,
) -> Result<usize, Errno> {
    let whole = match &file.writer {
        Some(w) => w.read_at(0, w.len() as usize),
        None => file.node.read_bytes().map_err(Errno::from)?,
    };
    let vecs = read_iovec_array(mem, iovs, iovs_len).map_err(Errno::from)?;
    let mut pos = offset as usize;
    let mut total = 0usize;
    for v in vecs {
        if pos >= whole.len() {
            break;
        }
        let end = (pos + v.len as usize).min(whole.len());
        let chunk = &whole[pos..end];
        mem.write_bytes(v.buf, chunk).map_err(Errno::from)?;
        total += chunk.len();
        pos = end;
    }
    Ok(total)
}

fn read_stdin(ctx: &mut WasiCtx, mem: &mut dyn GuestMemory, iovs: u32, iovs_len: u32, nread_out: u32) -> Result<(), Errno> {
    let vecs = read_iovec_array(mem, iovs, iovs_len).map_err(Errno::from)?;
    let total_len: u32 = vecs.iter().map(|v| v.len).sum();
    let bytes = ctx
        .stdin
        .read(total_len as usize, ctx.abort.as_ref())
        .map_err(|_| Errno::Intr)?;
    let mut pos = 0usize;
    for v in vecs {
        if pos >= bytes.len() {
            break;
        }
        let end = (pos + v.len as usize).min(bytes.len());
        mem.write_bytes(v.buf, &bytes[pos..end]).map_err(Errno::from)?;
        pos = end;
    }
    mem.write_u32(nread_out, bytes.len() as u32).map_err(Errno::from)
}

pub fn fd_write(ctx: &mut WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, iovs: u32, iovs_len: u32, nwritten_out: u32) -> Errno {
    run(|| {
        if fd == 1 || fd == 2 {
            return write_stdio(ctx, mem, fd, iovs, iovs_len, nwritten_out);
        }
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        let append = file.flags.contains(FdFlags::APPEND);
        let cursor = file.cursor;
        let n = write_iovecs_to_file(file, mem, iovs, iovs_len, append, cursor)?;
        file.cursor += n as u64;
        mem.write_u32(nwritten_out, n as u32).map_err(Errno::from)
    })
}

pub fn fd_pwrite(ctx: &mut WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, iovs: u32, iovs_len: u32, offset: u64, nwritten_out: u32) -> Errno {
    run(|| {
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        let n = write_iovecs_to_file(file, mem, iovs, iovs_len, false, offset)?;
        mem.write_u32(nwritten_out, n as u32).map_err(Errno::from)
    })
}

fn write_iovecs_to_file(
    file: &mut FileState,
    mem: &dyn GuestMemory,
    iovs: u32,
    iovs_len: u32,
    append: bool,
    at: u64,
) -> Result<usize, Errno> {
    let writer = file.writer.as_mut().ok_or(Errno::Badf)?;
    let vecs = read_iovec_array(mem, iovs, iovs_len).map_err(Errno::from)?;
    let mut total = 0usize;
    let mut pos = if append { writer.len() } else { at };
    for v in vecs {
        let bytes = mem.read_bytes(v.buf, v.len).map_err(Errno::from)?;
        writer.write(&bytes, Some(pos)).map_err(|_| Errno::Badf)?;
        pos += bytes.len() as u64;
        total += bytes.len();
    }
    Ok(total)
}

fn write_stdio(
    ctx: &mut WasiCtx,
    mem: &mut dyn GuestMemory,
    fd: Fd,
    iovs: u32,
    iovs_len: u32,
    nwritten_out: u32,
) -> Result<(), Errno> {
    let vecs = read_iovec_array(mem, iovs, iovs_len).map_err(Errno::from)?;
    let mut total = 0usize;
    for v in vecs {
        let bytes = mem.read_bytes(v.buf, v.len).map_err(Errno::from)?;
        let sink: &mut dyn crate::ctx::OutputSink = if fd == 1 {
            ctx.stdout.as_mut()
        } else {
            ctx.stderr.as_mut()
        };
        sink.write(&bytes);
        total += bytes.len();
    }
    mem.write_u32(nwritten_out, total as u32).map_err(Errno::from)
}

// ---------------------------------------------------------------------
// Seek / tell
// ---------------------------------------------------------------------

pub fn fd_seek(ctx: &mut WasiCtx, fd: Fd, offset: i64, whence: u8, newoffset_out: u32, mem: &mut dyn GuestMemory) -> Errno {
    run(|| {
        let file = ctx.files.get_mut(fd)?.as_file_mut()?;
        let whence = Whence::try_from(whence).map_err(|_| Errno::Inval)?;
        let size = file.current_len() as i64;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.cursor as i64,
            Whence::End => size,
        };
        let new_pos = base.checked_add(offset).ok_or(Errno::Inval)?;
        if new_pos < 0 {
            return Err(Errno::Inval);
        }
        file.cursor = new_pos as u64;
        if let Some(w) = &mut file.writer {
            w.seek(file.cursor).map_err(|_| Errno::Badf)?;
        }
        mem.write_u64(newoffset_out, file.cursor).map_err(Errno::from)
    })
}

pub fn fd_tell(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, offset_out: u32) -> Errno {
    run(|| {
        let file = ctx.files.get(fd)?.as_file()?;
        mem.write_u64(offset_out, file.cursor).map_err(Errno::from)
    })
}

// ---------------------------------------------------------------------
// Preopens and renumbering
// ---------------------------------------------------------------------

pub fn fd_prestat_get(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, prestat_out: u32) -> Errno {
    run(|| {
        if !ctx.files.is_preopen(fd) {
            return Err(Errno::Badf);
        }
        let dir = ctx.files.get(fd)?.as_dir()?;
        mem.write_u8(prestat_out, 0).map_err(Errno::from)?;
        mem.write_u32(prestat_out + 4, dir.guest_path.len() as u32)
            .map_err(Errno::from)
    })
}

pub fn fd_prestat_dir_name(ctx: &WasiCtx, mem: &mut dyn GuestMemory, fd: Fd, path_out: u32, path_len: u32) -> Errno {
    run(|| {
        let dir = ctx.files.get(fd)?.as_dir()?;
        let name = dir.guest_path.as_bytes();
        if path_len as usize != name.len() {
            return Err(Errno::Inval);
        }
        mem.write_bytes(path_out, name).map_err(Errno::from)
    })
}

pub fn fd_renumber(ctx: &mut WasiCtx, from: Fd, to: Fd) -> Errno {
    run(|| ctx.files.renumber(from, to))
}

// ---------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------

pub fn fd_readdir(
    ctx: &WasiCtx,
    mem: &mut dyn GuestMemory,
    fd: Fd,
    buf: u32,
    buf_len: u32,
    cookie: u64,
    bufused_out: u32,
) -> Errno {
    run(|| {
        let dir = ctx.files.get(fd)?.as_dir()?;
        let entries = dir.node.dir_entries_with_cookies().map_err(Errno::from)?;
        let mut remaining = buf_len;
        let mut cursor = buf;
        let mut used = 0u32;
        for (name, child, entry_cookie) in entries.into_iter().filter(|(_, _, c)| *c > cookie) {
            if remaining == 0 {
                break;
            }
            let dirent = Dirent {
                d_next: entry_cookie,
                d_ino: child.inode(),
                d_namlen: name.len() as u32,
                d_type: child.file_type() as u8,
            };
            let wrote = write_dirent(mem, cursor, &dirent, name.as_bytes(), remaining)
                .map_err(Errno::from)?;
            cursor += wrote;
            used += wrote;
            remaining = remaining.saturating_sub(wrote);
            if wrote < DIRENT_HEADER_SIZE + name.len() as u32 {
                break;
            }
        }
        mem.write_u32(bufused_out, used).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn path_create_directory(ctx: &WasiCtx, fd: Fd, mem: &dyn GuestMemory, path: u32, path_len: u32) -> Errno {
    run(|| {
        let path = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path)?;
        resolved
            .volume
            .mkdir(&resolved.component_refs(), false)
            .map_err(Errno::from)
    })
}

pub fn path_remove_directory(ctx: &WasiCtx, fd: Fd, mem: &dyn GuestMemory, path: u32, path_len: u32) -> Errno {
    run(|| {
        let path = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path)?;
        resolved.volume.rmdir(&resolved.component_refs()).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn path_unlink_file(ctx: &WasiCtx, fd: Fd, mem: &dyn GuestMemory, path: u32, path_len: u32) -> Errno {
    run(|| {
        let path = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path)?;
        resolved.volume.unlink(&resolved.component_refs()).map_err(Errno::from)
    })
}

#[tracing::instrument(skip(ctx, mem))]
pub fn path_rename(
    ctx: &WasiCtx,
    fd: Fd,
    mem: &dyn GuestMemory,
    old_path: u32,
    old_path_len: u32,
    new_fd: Fd,
    new_path: u32,
    new_path_len: u32,
) -> Errno {
    run(|| {
        let old = mem.read_path(old_path, old_path_len).map_err(Errno::from)?;
        let new = mem.read_path(new_path, new_path_len).map_err(Errno::from)?;
        let src = resolve_from_fd(ctx, fd, &old)?;
        let dst = resolve_from_fd(ctx, new_fd, &new)?;
        if !std::sync::Arc::ptr_eq(&src.volume, &dst.volume) {
            return Err(Errno::Xdev);
        }
        src.volume
            .rename(&src.component_refs(), &dst.component_refs())
            .map_err(Errno::from)
    })
}

pub fn path_filestat_get(
    ctx: &WasiCtx,
    mem: &mut dyn GuestMemory,
    fd: Fd,
    _flags: u32,
    path: u32,
    path_len: u32,
    stat_out: u32,
) -> Errno {
    run(|| {
        let path_str = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path_str)?;
        let node = resolved.volume.node_at(&resolved.component_refs()).map_err(Errno::from)?;
        write_filestat(mem, stat_out, &filestat_of(&node)).map_err(Errno::from)
    })
}

pub fn path_filestat_set_times(
    ctx: &WasiCtx,
    mem: &dyn GuestMemory,
    fd: Fd,
    _flags: u32,
    path: u32,
    path_len: u32,
    atim: u64,
    mtim: u64,
    fst_flags: u16,
) -> Errno {
    run(|| {
        let path_str = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path_str)?;
        let node = resolved.volume.node_at(&resolved.component_refs()).map_err(Errno::from)?;
        apply_times(&node, atim, mtim, fst_flags);
        Ok(())
    })
}

pub fn path_link() -> Errno {
    Errno::Notsup
}

pub fn path_symlink() -> Errno {
    Errno::Notsup
}

pub fn path_readlink() -> Errno {
    Errno::Notsup
}

pub fn proc_raise() -> Errno {
    Errno::Notsup
}

// ---------------------------------------------------------------------
// path_open
// ---------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(ctx, mem))]
pub fn path_open(
    ctx: &mut WasiCtx,
    mem: &mut dyn GuestMemory,
    fd: Fd,
    _dirflags: u32,
    path: u32,
    path_len: u32,
    oflags: u16,
    fs_rights_base: u64,
    fs_rights_inheriting: u64,
    _fdflags: u16,
    opened_fd_out: u32,
) -> Errno {
    run(|| {
        let path_str = mem.read_path(path, path_len).map_err(Errno::from)?;
        let resolved = resolve_from_fd(ctx, fd, &path_str)?;
        let oflags = OFlags::from_bits_truncate(oflags);
        let fdflags = FdFlags::from_bits_truncate(_fdflags);

        let dir_rights = ctx.files.get(fd)?.as_dir()?.rights;
        let requested = HandleRights::new(
            Rights::from_bits_truncate(fs_rights_base),
            Rights::from_bits_truncate(fs_rights_inheriting),
        );
        if !dir_rights.inheriting().contains(requested.base()) {
            return Err(Errno::Notcapable);
        }

        let existing = resolved.stat();
        let file_type = match &existing {
            Ok(meta) => Some(meta.file_type),
            Err(Errno::Noent) => None,
            Err(e) => return Err(*e),
        };

        if oflags.contains(OFlags::EXCL) && oflags.contains(OFlags::CREAT) && file_type.is_some() {
            return Err(Errno::Exist);
        }
        if oflags.contains(OFlags::DIRECTORY) && file_type == Some(FileType::RegularFile) {
            return Err(Errno::Notdir);
        }
        if file_type.is_none() && !oflags.contains(OFlags::CREAT) {
            return Err(Errno::Noent);
        }
        if file_type.is_none() && oflags.contains(OFlags::DIRECTORY) {
            return Err(Errno::Noent);
        }

        let opens_dir = file_type == Some(FileType::Directory);
        if opens_dir {
            let node = resolved.volume.node_at(&resolved.component_refs()).map_err(Errno::from)?;
            let fd_out = ctx.files.insert(OpenFile::Dir(DirState {
                node,
                guest_path: resolved.abs_guest_path.clone(),
                rights: HandleRights::new(Rights::directory_base(), Rights::directory_inheriting())
                    .narrow_to(requested)
                    .unwrap_or(requested),
                volume: resolved.volume.clone(),
            }));
            mem.write_u32(opened_fd_out, fd_out).map_err(Errno::from)?;
            return Ok(());
        }

        if file_type.is_none() {
            resolved
                .volume
                .write_file(&resolved.component_refs(), Vec::new(), false)
                .map_err(Errno::from)?;
        }

        let wants_write = requested.base().intersects(Rights::FD_WRITE | Rights::FD_ALLOCATE);
        let truncate_on_open = oflags.contains(OFlags::TRUNC);
        let writer = if wants_write {
            Some(resolved.create_writable(!truncate_on_open)?)
        } else {
            None
        };
        let node = resolved.volume.node_at(&resolved.component_refs()).map_err(Errno::from)?;
        let fd_out = ctx.files.insert(OpenFile::File(FileState {
            node,
            writer,
            cursor: 0,
            flags: fdflags,
            rights: HandleRights::new(Rights::regular_file_base(), Rights::regular_file_inheriting())
                .narrow_to(requested)
                .unwrap_or(requested),
        }));
        mem.write_u32(opened_fd_out, fd_out).map_err(Errno::from)
    })
}

// ---------------------------------------------------------------------
// Process-level
// ---------------------------------------------------------------------

pub fn random_get(mem: &mut dyn GuestMemory, buf: u32, len: u32) -> Errno {
    run(|| {
        let mut bytes = vec![0u8; len as usize];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        mem.write_bytes(buf, &bytes).map_err(Errno::from)
    })
}

pub fn sched_yield(ctx: &WasiCtx) -> Errno {
    if ctx.abort.is_cancelled() {
        Errno::Intr
    } else {
        Errno::Success
    }
}

// ---------------------------------------------------------------------
// poll_oneoff
// ---------------------------------------------------------------------

/// A minimal `poll_oneoff`: clock subscriptions sleep (in short slices, so
/// cancellation is noticed promptly) until the earliest deadline elapses;
/// `fd_read`/`fd_write` subscriptions report ready immediately, since
/// [`crate::ctx::StdinSource`] has no non-consuming readiness check and
/// regular files never block (SPEC_FULL.md §4.6, `poll_oneoff`).
pub fn poll_oneoff(
    ctx: &WasiCtx,
    mem: &mut dyn GuestMemory,
    subs: u32,
    events: u32,
    nsubscriptions: u32,
    nevents_out: u32,
) -> Errno {
    run(|| {
        if nsubscriptions == 0 {
            return Err(Errno::Inval);
        }
        let subscriptions: Vec<memory::Subscription> = (0..nsubscriptions)
            .map(|i| memory::read_subscription(mem, subs + i * memory::SUBSCRIPTION_SIZE))
            .collect::<Result<_, _>>()
            .map_err(Errno::from)?;

        let earliest_clock = subscriptions
            .iter()
            .filter(|s| s.event_type == memory::EventType::Clock)
            .map(|s| clock_deadline_nanos(ctx, s))
            .min();

        if let Some(deadline) = earliest_clock {
            wait_until(ctx, deadline)?;
        }

        let mut out_events = Vec::new();
        for sub in &subscriptions {
            match sub.event_type {
                memory::EventType::Clock => out_events.push(memory::Event {
                    userdata: sub.userdata,
                    error: Errno::Success.code(),
                    event_type: memory::EventType::Clock,
                    fd_readwrite_nbytes: 0,
                    fd_readwrite_flags: 0,
                }),
                memory::EventType::FdRead | memory::EventType::FdWrite => {
                    let error = if ctx.files.get(sub.fd).is_ok() {
                        Errno::Success.code()
                    } else {
                        Errno::Badf.code()
                    };
                    out_events.push(memory::Event {
                        userdata: sub.userdata,
                        error,
                        event_type: sub.event_type,
                        fd_readwrite_nbytes: 0,
                        fd_readwrite_flags: 0,
                    });
                }
            }
        }

        for (i, event) in out_events.iter().enumerate() {
            memory::write_event(mem, events + (i as u32) * memory::EVENT_SIZE, event)
                .map_err(Errno::from)?;
        }
        mem.write_u32(nevents_out, out_events.len() as u32)
            .map_err(Errno::from)
    })
}

/// Converts a clock subscription's timeout into a deadline expressed in
/// nanoseconds since `ctx.start`, the basis [`wait_until`] polls against —
/// a relative timeout is simply added to the elapsed time, but an absolute
/// realtime deadline (epoch nanoseconds) must first be translated via the
/// wall clock, mirroring [`clock_time_get`]'s own realtime/monotonic split.
fn clock_deadline_nanos(ctx: &WasiCtx, sub: &memory::Subscription) -> u64 {
    let elapsed_now = ctx.start.elapsed().as_nanos() as u64;
    if !sub.subscription_clock_abstime {
        return elapsed_now.saturating_add(sub.timeout);
    }
    match ClockId::try_from(sub.clock_id) {
        Ok(ClockId::Realtime) => {
            let epoch_now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            let remaining = sub.timeout.saturating_sub(epoch_now);
            elapsed_now.saturating_add(remaining)
        }
        _ => sub.timeout,
    }
}

const POLL_SLICE: std::time::Duration = std::time::Duration::from_millis(20);

fn wait_until(ctx: &WasiCtx, deadline_nanos: u64) -> Result<(), Errno> {
    loop {
        if ctx.abort.is_cancelled() {
            return Err(Errno::Intr);
        }
        let now = ctx.start.elapsed().as_nanos() as u64;
        if now >= deadline_nanos {
            return Ok(());
        }
        let remaining = std::time::Duration::from_nanos(deadline_nanos - now);
        std::thread::sleep(remaining.min(POLL_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::WasiCtxBuilder;
    use crate::fd_table::FIRST_PREOPEN_FD;
    use crate::memory::WasmiGuestMemory;
    use crate::volume::MemVolume;
    use std::sync::Arc;

    fn ctx_with_preopen() -> (WasiCtx, Arc<MemVolume>) {
        let volume = Arc::new(MemVolume::new());
        let mut builder = WasiCtxBuilder::new();
        builder.preopened_dir(volume.clone(), "/sandbox").unwrap();
        (builder.build(), volume)
    }

    fn backing(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    const RW_RIGHTS: u64 = Rights::FD_READ.bits() | Rights::FD_SEEK.bits() | Rights::FD_WRITE.bits();

    #[test]
    fn path_open_create_write_read_round_trip() {
        let (mut ctx, _vol) = ctx_with_preopen();
        let mut raw = backing(256);
        let path_offset = 0u32;
        let path = b"hello.txt";
        {
            let mut mem = WasmiGuestMemory::new(&mut raw);
            mem.write_bytes(path_offset, path).unwrap();
        }
        let mut mem = WasmiGuestMemory::new(&mut raw);
        let errno = path_open(
            &mut ctx,
            &mut mem,
            FIRST_PREOPEN_FD,
            0,
            path_offset,
            path.len() as u32,
            OFlags::CREAT.bits(),
            RW_RIGHTS,
            0,
            0,
            100,
        );
        assert_eq!(errno, Errno::Success);
        let opened_fd = mem.read_u32(100).unwrap();

        mem.write_bytes(120, b"hi").unwrap();
        mem.write_u32(128, 120).unwrap();
        mem.write_u32(132, 2).unwrap();
        let errno = fd_write(&mut ctx, &mut mem, opened_fd, 128, 1, 140);
        assert_eq!(errno, Errno::Success);
        assert_eq!(mem.read_u32(140).unwrap(), 2);

        assert_eq!(fd_close(&mut ctx, opened_fd), Errno::Success);
        assert_eq!(_vol.read_file(&["hello.txt"]).unwrap(), b"hi");
    }

    #[test]
    fn path_open_requires_base_rights_to_be_a_subset_of_dir_inheriting() {
        let (mut ctx, _vol) = ctx_with_preopen();
        let mut raw = backing(64);
        let path = b"x";
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_bytes(0, path).unwrap();
        let requested = Rights::all().bits();
        let errno = path_open(
            &mut ctx,
            &mut mem,
            FIRST_PREOPEN_FD,
            0,
            0,
            path.len() as u32,
            OFlags::CREAT.bits(),
            requested,
            0,
            0,
            40,
        );
        assert_eq!(errno, Errno::Notcapable);
    }

    #[test]
    fn path_open_missing_file_without_creat_is_noent() {
        let (mut ctx, _vol) = ctx_with_preopen();
        let mut raw = backing(64);
        let path = b"missing";
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_bytes(0, path).unwrap();
        let errno = path_open(
            &mut ctx, &mut mem, FIRST_PREOPEN_FD, 0, 0, path.len() as u32, 0, RW_RIGHTS, 0, 0, 40,
        );
        assert_eq!(errno, Errno::Noent);
    }

    #[test]
    fn path_remove_directory_refuses_non_empty() {
        let (ctx, vol) = ctx_with_preopen();
        vol.mkdir(&["d"], false).unwrap();
        vol.write_file(&["d", "f"], Vec::new(), false).unwrap();
        let mut raw = backing(16);
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_bytes(0, b"d").unwrap();
        let errno = path_remove_directory(&ctx, FIRST_PREOPEN_FD, &mem, 0, 1);
        assert_eq!(errno, Errno::Notempty);
    }

    #[test]
    fn path_rename_across_distinct_preopens_is_xdev() {
        let vol_a = Arc::new(MemVolume::new());
        let vol_b = Arc::new(MemVolume::new());
        vol_a.write_file(&["a"], b"x".to_vec(), false).unwrap();
        let mut builder = WasiCtxBuilder::new();
        builder.preopened_dir(vol_a.clone(), "/a").unwrap();
        builder.preopened_dir(vol_b.clone(), "/b").unwrap();
        let ctx = builder.build();
        let mut raw = backing(16);
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_bytes(0, b"a").unwrap();
        mem.write_bytes(8, b"a").unwrap();
        let errno = path_rename(&ctx, FIRST_PREOPEN_FD, &mem, 0, 1, FIRST_PREOPEN_FD + 1, 8, 1);
        assert_eq!(errno, Errno::Xdev);
    }

    #[test]
    fn fd_readdir_resumes_after_supplied_cookie() {
        let (ctx, vol) = ctx_with_preopen();
        vol.write_file(&["a"], Vec::new(), false).unwrap();
        vol.write_file(&["b"], Vec::new(), false).unwrap();
        let mut raw = backing(256);
        let mut mem = WasmiGuestMemory::new(&mut raw);
        let errno = fd_readdir(&ctx, &mut mem, FIRST_PREOPEN_FD, 0, 256, 0, 200);
        assert_eq!(errno, Errno::Success);
        let used_full = mem.read_u32(200).unwrap();
        assert!(used_full > 0);

        let first_cookie = mem.read_u64(0).unwrap();
        let mut raw2 = backing(256);
        let mut mem2 = WasmiGuestMemory::new(&mut raw2);
        let errno = fd_readdir(&ctx, &mut mem2, FIRST_PREOPEN_FD, 0, 256, first_cookie, 200);
        assert_eq!(errno, Errno::Success);
        let used_partial = mem2.read_u32(200).unwrap();
        assert!(used_partial < used_full);
    }

    #[test]
    fn sched_yield_reports_intr_once_cancelled() {
        let flag = Arc::new(crate::ctx::CancelFlag::new());
        let mut builder = WasiCtxBuilder::new();
        builder.abort_signal(flag.clone());
        let ctx = builder.build();
        assert_eq!(sched_yield(&ctx), Errno::Success);
        flag.cancel();
        assert_eq!(sched_yield(&ctx), Errno::Intr);
    }

    #[test]
    fn poll_oneoff_reports_fd_read_ready_immediately() {
        let (ctx, _vol) = ctx_with_preopen();
        let mut raw = backing(128);
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_u64(0, 42).unwrap();
        mem.write_u8(8, 1).unwrap();
        mem.write_u32(16, 0).unwrap();
        let errno = poll_oneoff(&ctx, &mut mem, 0, 64, 1, 120);
        assert_eq!(errno, Errno::Success);
        assert_eq!(mem.read_u32(120).unwrap(), 1);
        assert_eq!(mem.read_u64(64).unwrap(), 42);
    }

    #[test]
    fn fd_filestat_get_and_path_filestat_get_agree() {
        let (mut ctx, vol) = ctx_with_preopen();
        vol.write_file(&["hello.txt"], b"hi".to_vec(), false).unwrap();
        let mut raw = backing(256);
        let mut mem = WasmiGuestMemory::new(&mut raw);
        mem.write_bytes(0, b"hello.txt").unwrap();
        let errno = path_open(
            &mut ctx, &mut mem, FIRST_PREOPEN_FD, 0, 0, 9, 0, RW_RIGHTS, 0, 0, 100,
        );
        assert_eq!(errno, Errno::Success);
        let opened_fd = mem.read_u32(100).unwrap();

        assert_eq!(fd_filestat_get(&ctx, &mut mem, opened_fd, 128), Errno::Success);
        assert_eq!(path_filestat_get(&ctx, &mut mem, FIRST_PREOPEN_FD, 0, 0, 9, 192), Errno::Success);
        assert_eq!(mem.read_bytes(128, 64).unwrap(), mem.read_bytes(192, 64).unwrap());
    }

    // Randomized invariants below use a seeded RNG so a failure is
    // reproducible from the logged seed rather than from a one-off fixture.

    #[test]
    fn write_then_seek_to_start_then_read_yields_the_same_bytes() {
        use rand::{Rng, SeedableRng};

        for seed in 0..20u64 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let (mut ctx, _vol) = ctx_with_preopen();
            let mut raw = backing(4096);
            let mut mem = WasmiGuestMemory::new(&mut raw);
            let path = format!("f{seed}");
            mem.write_bytes(0, path.as_bytes()).unwrap();
            let errno = path_open(
                &mut ctx,
                &mut mem,
                FIRST_PREOPEN_FD,
                0,
                0,
                path.len() as u32,
                OFlags::CREAT.bits(),
                RW_RIGHTS,
                0,
                0,
                200,
            );
            assert_eq!(errno, Errno::Success, "seed {seed}");
            let fd = mem.read_u32(200).unwrap();

            let len = rng.gen_range(0..256usize);
            let written: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            mem.write_bytes(512, &written).unwrap();
            mem.write_u32(600, 512).unwrap();
            mem.write_u32(604, len as u32).unwrap();
            let errno = fd_write(&mut ctx, &mut mem, fd, 600, 1, 608);
            assert_eq!(errno, Errno::Success, "seed {seed}");
            assert_eq!(mem.read_u32(608).unwrap() as usize, len, "seed {seed}");

            let errno = fd_seek(&mut ctx, fd, 0, Whence::Set as u8, 620, &mut mem);
            assert_eq!(errno, Errno::Success, "seed {seed}");

            mem.write_u32(600, 1024);
            mem.write_u32(604, len as u32);
            let errno = fd_read(&mut ctx, &mut mem, fd, 600, 1, 628);
            assert_eq!(errno, Errno::Success, "seed {seed}");
            assert_eq!(mem.read_u32(628).unwrap() as usize, len, "seed {seed}");
            assert_eq!(mem.read_bytes(1024, len).unwrap(), written, "seed {seed}");
        }
    }

    #[test]
    fn dotdot_paths_never_escape_their_preopen() {
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};

        for seed in 0..20u64 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let (mut ctx, _vol) = ctx_with_preopen();
            let hops = rng.gen_range(1..6);
            let mut components: Vec<&str> = (0..hops).map(|_| "..").collect();
            let extra = ["a", "b", "."];
            for _ in 0..rng.gen_range(0..3) {
                components.push(*extra.choose(&mut rng).unwrap());
            }
            let path = components.join("/");

            let mut raw = backing(256);
            let mut mem = WasmiGuestMemory::new(&mut raw);
            mem.write_bytes(0, path.as_bytes()).unwrap();
            let errno = path_open(
                &mut ctx,
                &mut mem,
                FIRST_PREOPEN_FD,
                0,
                0,
                path.len() as u32,
                OFlags::CREAT.bits(),
                RW_RIGHTS,
                0,
                0,
                200,
            );
            assert_eq!(errno, Errno::Notcapable, "seed {seed}, path {path:?}");
        }
    }
}
