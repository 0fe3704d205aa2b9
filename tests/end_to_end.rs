//! Black-box guest-facing scenarios: a hand-authored WAT module is linked
//! against the real WASI import surface and run to completion, with
//! assertions made only on the observables a guest can see (stdout bytes,
//! exit code) — never on internal `MemVolume` state. Grounded on the
//! teacher's own `load_instance_from_wat` test harness
//! (`crates/wasi/tests/wasi_wat.rs`).

mod common;

use std::sync::Arc;
use std::time::Duration;

use wasmi::Engine;

use wasi_vfs_host::{CancelFlag, MemVolume, CANCELLED_EXIT_CODE};

const CAT_FILE_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "input.txt")
  (func $start (export "_start")
    (local $errno i32)
    (local $nread i32)

    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 9)
        (i32.const 0) (i64.const 70) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (i32.store (i32.const 64) (i32.const 128))
    (i32.store (i32.const 68) (i32.const 100))

    (local.set $errno
      (call $fd_read (i32.load (i32.const 0)) (i32.const 64) (i32.const 1) (i32.const 4)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (local.set $nread (i32.load (i32.const 4)))
    (i32.store (i32.const 68) (local.get $nread))

    (local.set $errno
      (call $fd_write (i32.const 1) (i32.const 64) (i32.const 1) (i32.const 96)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 12)) (unreachable)))

    (call $proc_exit (i32.const 0))
  )
)
"#;

#[test]
fn cat_a_pre_populated_file() {
    let volume = Arc::new(MemVolume::new());
    volume
        .write_file(&["input.txt"], b"hello from input.txt\n".to_vec(), false)
        .unwrap();

    let (mut builder, stdout) = common::ctx_builder_with_stdout(volume, "/sandbox");
    let ctx = builder.build();

    let engine = Engine::default();
    let wasm = common::wat2wasm(CAT_FILE_WAT);
    let exit = wasi_vfs_host::run(&engine, &wasm, ctx).unwrap();

    assert_eq!(exit.0, 0);
    assert_eq!(stdout.contents(), b"hello from input.txt\n");
}

const ESCAPE_ATTEMPT_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "../..")
  (func $start (export "_start")
    (local $errno i32)
    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 1) (i32.const 16) (i32.const 5)
        (i32.const 2) (i64.const 0) (i64.const 0) (i32.const 0) (i32.const 0)))
    (call $proc_exit (local.get $errno))
  )
)
"#;

#[test]
fn path_escape_past_preopen_root_is_rejected() {
    let volume = Arc::new(MemVolume::new());
    let (mut builder, _stdout) = common::ctx_builder_with_stdout(volume, "/sandbox");
    let ctx = builder.build();

    let engine = Engine::default();
    let wasm = common::wat2wasm(ESCAPE_ATTEMPT_WAT);
    let exit = wasi_vfs_host::run(&engine, &wasm, ctx).unwrap();

    assert_eq!(exit.0, wasi_vfs_host::Errno::Notcapable.code() as i32);
}

const BLOCKING_READ_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func $start (export "_start")
    (i32.store (i32.const 64) (i32.const 128))
    (i32.store (i32.const 68) (i32.const 16))
    (drop (call $fd_read (i32.const 0) (i32.const 64) (i32.const 1) (i32.const 4)))
    (unreachable)
  )
)
"#;

const APPEND_FIRST_WRITE_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close"
    (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "out.txt")
  (data (i32.const 128) "a\0a")
  (func $start (export "_start")
    (local $errno i32)
    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 7)
        (i32.const 1) (i64.const 70) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (i32.store (i32.const 64) (i32.const 128))
    (i32.store (i32.const 68) (i32.const 2))

    (local.set $errno
      (call $fd_write (i32.load (i32.const 0)) (i32.const 64) (i32.const 1) (i32.const 96)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (drop (call $fd_close (i32.load (i32.const 0))))
    (call $proc_exit (i32.const 0))
  )
)
"#;

const APPEND_SECOND_WRITE_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_seek"
    (func $fd_seek (param i32 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close"
    (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "out.txt")
  (data (i32.const 128) "b\0a")
  (func $start (export "_start")
    (local $errno i32)
    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 7)
        (i32.const 1) (i64.const 70) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (local.set $errno
      (call $fd_seek (i32.load (i32.const 0)) (i64.const 0) (i32.const 2) (i32.const 4)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (i32.store (i32.const 64) (i32.const 128))
    (i32.store (i32.const 68) (i32.const 2))

    (local.set $errno
      (call $fd_write (i32.load (i32.const 0)) (i32.const 64) (i32.const 1) (i32.const 96)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 12)) (unreachable)))

    (drop (call $fd_close (i32.load (i32.const 0))))
    (call $proc_exit (i32.const 0))
  )
)
"#;

const READ_BACK_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "out.txt")
  (func $start (export "_start")
    (local $errno i32)
    (local $nread i32)
    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 7)
        (i32.const 0) (i64.const 70) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (i32.store (i32.const 64) (i32.const 256))
    (i32.store (i32.const 68) (i32.const 64))

    (local.set $errno
      (call $fd_read (i32.load (i32.const 0)) (i32.const 64) (i32.const 1) (i32.const 4)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (local.set $nread (i32.load (i32.const 4)))
    (i32.store (i32.const 68) (local.get $nread))

    (local.set $errno
      (call $fd_write (i32.const 1) (i32.const 64) (i32.const 1) (i32.const 96)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 12)) (unreachable)))

    (call $proc_exit (i32.const 0))
  )
)
"#;

#[test]
fn append_across_two_runs_yields_concatenated_content() {
    let volume = Arc::new(MemVolume::new());

    let (mut builder, _stdout) = common::ctx_builder_with_stdout(volume.clone(), "/sandbox");
    let ctx = builder.build();
    let engine = Engine::default();
    let exit = wasi_vfs_host::run(&engine, &common::wat2wasm(APPEND_FIRST_WRITE_WAT), ctx).unwrap();
    assert_eq!(exit.0, 0);

    let (mut builder, _stdout) = common::ctx_builder_with_stdout(volume.clone(), "/sandbox");
    let ctx = builder.build();
    let exit = wasi_vfs_host::run(&engine, &common::wat2wasm(APPEND_SECOND_WRITE_WAT), ctx).unwrap();
    assert_eq!(exit.0, 0);

    let (mut builder, stdout) = common::ctx_builder_with_stdout(volume, "/sandbox");
    let ctx = builder.build();
    let exit = wasi_vfs_host::run(&engine, &common::wat2wasm(READ_BACK_WAT), ctx).unwrap();
    assert_eq!(exit.0, 0);
    assert_eq!(stdout.contents(), b"a\nb\n");
}

const LIST_DIR_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_readdir"
    (func $fd_readdir (param i32 i32 i32 i64 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func $start (export "_start")
    (local $errno i32)
    (local $used i32)
    (local.set $errno
      (call $fd_readdir (i32.const 3) (i32.const 256) (i32.const 200) (i64.const 0) (i32.const 16)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (local.set $used (i32.load (i32.const 16)))
    (i32.store (i32.const 64) (i32.const 256))
    (i32.store (i32.const 68) (local.get $used))

    (local.set $errno
      (call $fd_write (i32.const 1) (i32.const 64) (i32.const 1) (i32.const 96)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (call $proc_exit (i32.const 0))
  )
)
"#;

#[test]
fn directory_listing_preserves_insertion_order_and_types() {
    let volume = Arc::new(MemVolume::new());
    volume.mkdir(&["d1"], false).unwrap();
    volume.write_file(&["f1"], Vec::new(), false).unwrap();
    volume.write_file(&["f2"], Vec::new(), false).unwrap();

    let (mut builder, stdout) = common::ctx_builder_with_stdout(volume, "/sandbox");
    let ctx = builder.build();
    let engine = Engine::default();
    let exit = wasi_vfs_host::run(&engine, &common::wat2wasm(LIST_DIR_WAT), ctx).unwrap();
    assert_eq!(exit.0, 0);

    let raw = stdout.contents();
    let mut offset = 0usize;
    let mut entries = Vec::new();
    while offset < raw.len() {
        let namlen = u32::from_le_bytes(raw[offset + 16..offset + 20].try_into().unwrap()) as usize;
        let file_type = raw[offset + 20];
        let name_start = offset + 24;
        let name = String::from_utf8(raw[name_start..name_start + namlen].to_vec()).unwrap();
        entries.push((name, file_type));
        offset = name_start + namlen;
    }

    assert_eq!(
        entries,
        vec![
            ("d1".to_string(), 3u8),
            ("f1".to_string(), 4u8),
            ("f2".to_string(), 4u8),
        ]
    );
}

const RMDIR_NON_EMPTY_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_create_directory"
    (func $path_create_directory (param i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "path_remove_directory"
    (func $path_remove_directory (param i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "d")
  (data (i32.const 32) "d/x")
  (func $start (export "_start")
    (local $errno i32)
    (local.set $errno
      (call $path_create_directory (i32.const 3) (i32.const 16) (i32.const 1)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 10)) (unreachable)))

    (local.set $errno
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 32) (i32.const 3)
        (i32.const 1) (i64.const 70) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (i32.ne (local.get $errno) (i32.const 0))
      (then (call $proc_exit (i32.const 11)) (unreachable)))

    (local.set $errno
      (call $path_remove_directory (i32.const 3) (i32.const 16) (i32.const 1)))
    (call $proc_exit (local.get $errno))
  )
)
"#;

#[test]
fn removing_a_non_empty_directory_is_rejected() {
    let volume = Arc::new(MemVolume::new());
    let (mut builder, _stdout) = common::ctx_builder_with_stdout(volume.clone(), "/sandbox");
    let ctx = builder.build();
    let engine = Engine::default();
    let exit = wasi_vfs_host::run(&engine, &common::wat2wasm(RMDIR_NON_EMPTY_WAT), ctx).unwrap();

    assert_eq!(exit.0, wasi_vfs_host::Errno::Notempty.code() as i32);
    assert!(volume.stat(&["d"]).is_ok());
    assert!(volume.stat(&["d", "x"]).is_ok());
}

#[test]
fn cancellation_during_blocked_stdin_read_yields_130() {
    let volume = Arc::new(MemVolume::new());
    let mut builder = wasi_vfs_host::WasiCtxBuilder::new();
    builder
        .preopened_dir(volume, "/sandbox")
        .unwrap()
        .stdin(Box::new(common::BlockingStdin));
    let cancel = Arc::new(CancelFlag::new());
    builder.abort_signal(cancel.clone());
    let ctx = builder.build();

    let engine = Engine::default();
    let wasm = common::wat2wasm(BLOCKING_READ_WAT);

    let handle = std::thread::spawn(move || wasi_vfs_host::run(&engine, &wasm, ctx));
    std::thread::sleep(Duration::from_millis(30));
    cancel.cancel();

    let exit = handle.join().unwrap().unwrap();
    assert_eq!(exit.0, CANCELLED_EXIT_CODE);
}
