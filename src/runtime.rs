//! Instantiates a guest module, links it against `wasi_snapshot_preview1`,
//! and runs its `_start` export to completion. Grounded on the teacher's own
//! `load_instance_from_wat` test helper (`crates/wasi/tests/wasi_wat.rs`):
//! build an `Engine`, compile a `Module`, add WASI to a `Linker`,
//! instantiate, then call `_start`.

use wasmi::{Engine, Extern, Instance, Linker, Module, Store};

use crate::ctx::WasiCtx;
use crate::linker::add_wasi_snapshot_preview1_to_linker;

/// The process exit code a completed or trapped guest run produced.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExitCode(pub i32);

/// Exit code used when cancellation interrupted the guest mid-run, matching
/// the POSIX convention of 128 + SIGINT.
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Compiles `wasm_bytes`, links the WASI imports against `ctx`, and runs the
/// module's `_start` export. Returns the guest's exit code: 0 on a normal
/// return, the value passed to `proc_exit`, or [`CANCELLED_EXIT_CODE`] if the
/// [`crate::ctx::AbortSignal`] fired mid-run.
pub fn run(engine: &Engine, wasm_bytes: &[u8], ctx: WasiCtx) -> anyhow::Result<ExitCode> {
    let module = Module::new(engine, wasm_bytes)?;
    let mut linker = <Linker<WasiCtx>>::new(engine);
    add_wasi_snapshot_preview1_to_linker(&mut linker, |ctx| ctx)?;

    let mut store = Store::new(engine, ctx);
    let instance = instantiate(&linker, &mut store, &module)?;

    let start = instance
        .get_export(&store, "_start")
        .and_then(Extern::into_func)
        .ok_or_else(|| anyhow::anyhow!("module has no `_start` export"))?;

    let result = match start.call(&mut store, &[], &mut []) {
        Ok(()) => Ok(ExitCode(0)),
        Err(err) => exit_code_of(&store, err),
    };
    // Every still-open descriptor (in particular, any writable stream the
    // guest never explicitly closed) is flushed at run termination rather
    // than left to `Drop` order (SPEC_FULL.md §5, "Resources").
    store.data_mut().files.close_all();
    result
}

fn instantiate(
    linker: &Linker<WasiCtx>,
    store: &mut Store<WasiCtx>,
    module: &Module,
) -> anyhow::Result<Instance> {
    let pre = linker.instantiate(&mut *store, module)?;
    Ok(pre.start(store)?)
}

/// Translates a trapped call into its exit code: `i32_exit` traps (raised by
/// `proc_exit`) carry the guest's requested status; cancellation observed at
/// a suspension point reports [`CANCELLED_EXIT_CODE`]; any other trap is
/// propagated as an error.
fn exit_code_of(store: &Store<WasiCtx>, err: wasmi::Error) -> anyhow::Result<ExitCode> {
    if let Some(status) = err.i32_exit_status() {
        return Ok(ExitCode(status));
    }
    if store.data().abort.is_cancelled() {
        return Ok(ExitCode(CANCELLED_EXIT_CODE));
    }
    Err(err.into())
}
