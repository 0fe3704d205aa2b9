//! Shared helpers for the black-box guest tests: compiling inline WAT, and a
//! capturing stdout/stderr sink so assertions can check exactly what a guest
//! wrote without touching the process's real standard streams. Grounded on
//! the teacher's own `load_instance_from_wat`/`wat2wasm` test helpers
//! (`crates/wasi/tests/wasi_wat.rs`).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wasi_vfs_host::{AbortSignal, Cancelled, OutputSink, StdinSource, WasiCtxBuilder};

/// Converts inline WAT text into `.wasm` bytes.
pub fn wat2wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).unwrap()
}

/// An [`OutputSink`] that appends every write to a shared buffer, so a test
/// can assert on a guest's stdout/stderr after the run completes.
#[derive(Clone, Default)]
pub struct CaptureSink(Arc<Mutex<Vec<u8>>>);

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl OutputSink for CaptureSink {
    fn write(&mut self, bytes: &[u8]) {
        self.0.lock().unwrap().extend_from_slice(bytes);
    }
}

/// Builds a context with a single preopen at `guest_path` and a captured
/// stdout, returning the builder (still mutable, for further setup) and the
/// sink to inspect afterward.
pub fn ctx_builder_with_stdout(
    volume: Arc<wasi_vfs_host::MemVolume>,
    guest_path: &str,
) -> (WasiCtxBuilder, CaptureSink) {
    let sink = CaptureSink::new();
    let mut builder = WasiCtxBuilder::new();
    builder
        .preopened_dir(volume, guest_path)
        .unwrap()
        .stdout(Box::new(sink.clone()));
    (builder, sink)
}

/// A stdin source that never produces bytes and instead polls `cancel` in
/// short slices, standing in for a real blocking read an embedder cannot
/// interrupt mid-syscall.
pub struct BlockingStdin;

impl StdinSource for BlockingStdin {
    fn read(&mut self, _max_len: usize, cancel: &dyn AbortSignal) -> Result<Vec<u8>, Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
