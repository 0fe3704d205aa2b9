//! A WASI `preview1` host-binding layer for the Wasmi interpreter, backed by
//! an in-memory virtual file system instead of the real operating system.
//!
//! Build a [`ctx::WasiCtx`] with [`ctx::WasiCtxBuilder`], register it with a
//! guest module's imports via [`linker::add_wasi_snapshot_preview1_to_linker`],
//! then run the module to completion with [`runtime::run`].

mod ctx;
mod dispatch;
mod errno;
mod fd_table;
mod handle;
mod linker;
mod memory;
mod runtime;
mod types;
mod volume;
mod writable;

pub use ctx::{
    AbortSignal, CancelFlag, Cancelled, NeverCancelled, OutputSink, StdinSource, WasiCtx, WasiCtxBuilder,
};
pub use errno::Errno;
pub use linker::add_wasi_snapshot_preview1_to_linker;
pub use runtime::{run, ExitCode, CANCELLED_EXIT_CODE};
pub use volume::MemVolume;
