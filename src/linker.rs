//! Registers every `wasi_snapshot_preview1` import onto a [`wasmi::Linker`],
//! wiring each one to the matching [`crate::dispatch`] function. Grounded on
//! the teacher's own `add_wasi_snapshot_preview1_to_linker` (sync snapshot
//! bindings), simplified to a single concrete [`WasiCtx`] instead of a
//! generic `WasiSnapshotPreview1` trait object, since this host has no async
//! runtime to bridge through.

use wasmi::{Caller, Extern, Linker};

use crate::ctx::WasiCtx;
use crate::dispatch;
use crate::errno::Errno;
use crate::memory::WasmiGuestMemory;

fn guest_memory<T>(caller: &mut Caller<'_, T>) -> Result<wasmi::Memory, wasmi::Error> {
    match caller.get_export("memory") {
        Some(Extern::Memory(m)) => Ok(m),
        _ => Err(wasmi::Error::new("missing required WASI memory export")),
    }
}

/// Adds the `wasi_snapshot_preview1` module to `linker`. `get_ctx` extracts
/// the [`WasiCtx`] from the store data `T` the embedder's [`wasmi::Store`]
/// carries.
pub fn add_wasi_snapshot_preview1_to_linker<T>(
    linker: &mut Linker<T>,
    get_ctx: impl Fn(&mut T) -> &mut WasiCtx + Send + Sync + Copy + 'static,
) -> anyhow::Result<()> {
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "args_get",
        move |mut caller: Caller<'_, T>, argv: i32, argv_buf: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::args_get(ctx, &mut mem, argv as u32, argv_buf as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "args_sizes_get",
        move |mut caller: Caller<'_, T>, argc_out: i32, size_out: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::args_sizes_get(ctx, &mut mem, argc_out as u32, size_out as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "environ_get",
        move |mut caller: Caller<'_, T>, environ: i32, environ_buf: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::environ_get(ctx, &mut mem, environ as u32, environ_buf as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "environ_sizes_get",
        move |mut caller: Caller<'_, T>, count_out: i32, size_out: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::environ_sizes_get(ctx, &mut mem, count_out as u32, size_out as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "clock_res_get",
        move |mut caller: Caller<'_, T>, id: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, _store) = memory.data_and_store_mut(&mut caller);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::clock_res_get(&mut mem, id as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "clock_time_get",
        move |mut caller: Caller<'_, T>, id: i32, precision: i64, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::clock_time_get(ctx, &mut mem, id as u32, precision as u64, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_advise",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i64, len: i64, advice: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_advise(ctx, fd as u32, offset as u64, len as u64, advice as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_allocate",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i64, len: i64| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_allocate(ctx, fd as u32, offset as u64, len as u64);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_close",
        move |mut caller: Caller<'_, T>, fd: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_close(ctx, fd as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_datasync",
        move |mut caller: Caller<'_, T>, fd: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_datasync(ctx, fd as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_sync",
        move |mut caller: Caller<'_, T>, fd: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_sync(ctx, fd as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_fdstat_get",
        move |mut caller: Caller<'_, T>, fd: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_fdstat_get(ctx, &mut mem, fd as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_fdstat_set_flags",
        move |mut caller: Caller<'_, T>, fd: i32, flags: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_fdstat_set_flags(ctx, fd as u32, flags as u16);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_fdstat_set_rights",
        move |mut caller: Caller<'_, T>, fd: i32, fs_rights_base: i64, fs_rights_inheriting: i64| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_fdstat_set_rights(ctx, fd as u32, fs_rights_base as u64, fs_rights_inheriting as u64);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_filestat_get",
        move |mut caller: Caller<'_, T>, fd: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_filestat_get(ctx, &mut mem, fd as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_filestat_set_size",
        move |mut caller: Caller<'_, T>, fd: i32, size: i64| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_filestat_set_size(ctx, fd as u32, size as u64);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_filestat_set_times",
        move |mut caller: Caller<'_, T>, fd: i32, atim: i64, mtim: i64, fst_flags: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_filestat_set_times(ctx, fd as u32, atim as u64, mtim as u64, fst_flags as u16);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_pread",
        move |mut caller: Caller<'_, T>, fd: i32, iov_buf: i32, iov_buf_len: i32, offset: i64, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_pread(ctx, &mut mem, fd as u32, iov_buf as u32, iov_buf_len as u32, offset as u64, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_pwrite",
        move |mut caller: Caller<'_, T>, fd: i32, ciov_buf: i32, ciov_buf_len: i32, offset: i64, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_pwrite(ctx, &mut mem, fd as u32, ciov_buf as u32, ciov_buf_len as u32, offset as u64, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_read",
        move |mut caller: Caller<'_, T>, fd: i32, iov_buf: i32, iov_buf_len: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_read(ctx, &mut mem, fd as u32, iov_buf as u32, iov_buf_len as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_readdir",
        move |mut caller: Caller<'_, T>, fd: i32, buf: i32, buf_len: i32, cookie: i64, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_readdir(ctx, &mut mem, fd as u32, buf as u32, buf_len as u32, cookie as u64, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_renumber",
        move |mut caller: Caller<'_, T>, fd: i32, to: i32| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let errno = dispatch::fd_renumber(ctx, fd as u32, to as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_seek",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i64, whence: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_seek(ctx, fd as u32, offset, whence as u8, offset0 as u32, &mut mem);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_tell",
        move |mut caller: Caller<'_, T>, fd: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_tell(ctx, &mut mem, fd as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_write",
        move |mut caller: Caller<'_, T>, fd: i32, ciov_buf: i32, ciov_buf_len: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_write(ctx, &mut mem, fd as u32, ciov_buf as u32, ciov_buf_len as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_prestat_get",
        move |mut caller: Caller<'_, T>, fd: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_prestat_get(ctx, &mut mem, fd as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_prestat_dir_name",
        move |mut caller: Caller<'_, T>, fd: i32, path: i32, path_len: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::fd_prestat_dir_name(ctx, &mut mem, fd as u32, path as u32, path_len as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_create_directory",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i32, length: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_create_directory(ctx, fd as u32, &mem, offset as u32, length as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_filestat_get",
        move |mut caller: Caller<'_, T>, fd: i32, flags: i32, offset: i32, length: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_filestat_get(ctx, &mut mem, fd as u32, flags as u32, offset as u32, length as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_filestat_set_times",
        move |mut caller: Caller<'_, T>,
              fd: i32,
              flags: i32,
              offset: i32,
              length: i32,
              atim: i64,
              mtim: i64,
              fst_flags: i32|
              -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_filestat_set_times(
                ctx,
                &mem,
                fd as u32,
                flags as u32,
                offset as u32,
                length as u32,
                atim as u64,
                mtim as u64,
                fst_flags as u16,
            );
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_link",
        move |mut caller: Caller<'_, T>,
              _old_fd: i32,
              _old_flags: i32,
              _old_offset: i32,
              _old_length: i32,
              _new_fd: i32,
              _new_offset: i32,
              _new_length: i32|
              -> Result<i32, wasmi::Error> {
            let _ = guest_memory(&mut caller)?;
            Ok(dispatch::path_link().code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_open",
        move |mut caller: Caller<'_, T>,
              fd: i32,
              dirflags: i32,
              offset: i32,
              length: i32,
              oflags: i32,
              fs_rights_base: i64,
              fs_rights_inheriting: i64,
              fdflags: i32,
              offset0: i32|
              -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_open(
                ctx,
                &mut mem,
                fd as u32,
                dirflags as u32,
                offset as u32,
                length as u32,
                oflags as u16,
                fs_rights_base as u64,
                fs_rights_inheriting as u64,
                fdflags as u16,
                offset0 as u32,
            );
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_readlink",
        move |mut caller: Caller<'_, T>, _fd: i32, _offset: i32, _length: i32, _buf: i32, _buf_len: i32, _offset0: i32| -> Result<i32, wasmi::Error> {
            let _ = guest_memory(&mut caller)?;
            Ok(dispatch::path_readlink().code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_remove_directory",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i32, length: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_remove_directory(ctx, fd as u32, &mem, offset as u32, length as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_rename",
        move |mut caller: Caller<'_, T>, fd: i32, old_offset: i32, old_length: i32, new_fd: i32, new_offset: i32, new_length: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_rename(
                ctx,
                fd as u32,
                &mem,
                old_offset as u32,
                old_length as u32,
                new_fd as u32,
                new_offset as u32,
                new_length as u32,
            );
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_symlink",
        move |mut caller: Caller<'_, T>, _old_offset: i32, _old_length: i32, _fd: i32, _new_offset: i32, _new_length: i32| -> Result<i32, wasmi::Error> {
            let _ = guest_memory(&mut caller)?;
            Ok(dispatch::path_symlink().code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "path_unlink_file",
        move |mut caller: Caller<'_, T>, fd: i32, offset: i32, length: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::path_unlink_file(ctx, fd as u32, &mem, offset as u32, length as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "poll_oneoff",
        move |mut caller: Caller<'_, T>, in_: i32, out: i32, nsubscriptions: i32, offset0: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, store) = memory.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::poll_oneoff(ctx, &mut mem, in_ as u32, out as u32, nsubscriptions as u32, offset0 as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "proc_exit",
        move |_caller: Caller<'_, T>, rval: i32| -> Result<(), wasmi::Error> {
            Err(wasmi::Error::i32_exit(rval))
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "proc_raise",
        move |_caller: Caller<'_, T>, _sig: i32| -> Result<i32, wasmi::Error> { Ok(dispatch::proc_raise().code() as i32) },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "sched_yield",
        move |mut caller: Caller<'_, T>| -> Result<i32, wasmi::Error> {
            let (_, store) = guest_memory(&mut caller)?.data_and_store_mut(&mut caller);
            let ctx = get_ctx(store);
            Ok(dispatch::sched_yield(ctx).code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "random_get",
        move |mut caller: Caller<'_, T>, buf: i32, buf_len: i32| -> Result<i32, wasmi::Error> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, _store) = memory.data_and_store_mut(&mut caller);
            let mut mem = WasmiGuestMemory::new(bytes);
            let errno = dispatch::random_get(&mut mem, buf as u32, buf_len as u32);
            Ok(errno.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "sock_accept",
        move |_caller: Caller<'_, T>, _fd: i32, _flags: i32, _offset0: i32| -> Result<i32, wasmi::Error> {
            Ok(Errno::Notsup.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "sock_recv",
        move |_caller: Caller<'_, T>, _fd: i32, _iov_buf: i32, _iov_buf_len: i32, _ri_flags: i32, _offset0: i32, _offset1: i32| -> Result<i32, wasmi::Error> {
            Ok(Errno::Notsup.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "sock_send",
        move |_caller: Caller<'_, T>, _fd: i32, _ciov_buf: i32, _ciov_buf_len: i32, _si_flags: i32, _offset0: i32| -> Result<i32, wasmi::Error> {
            Ok(Errno::Notsup.code() as i32)
        },
    )?;

    linker.func_wrap(
        "wasi_snapshot_preview1",
        "sock_shutdown",
        move |_caller: Caller<'_, T>, _fd: i32, _how: i32| -> Result<i32, wasmi::Error> {
            Ok(Errno::Notsup.code() as i32)
        },
    )?;

    Ok(())
}
