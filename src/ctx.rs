//! The guest's ambient environment: argv, environment variables, preopened
//! directories, standard streams, and the cancellation signal (SPEC_FULL.md
//! §6). Assembled with a builder in the same style as the teacher's own
//! `WasiCtxBuilder::new()...build()` usage.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::fd_table::{DirState, OpenFiles};
use crate::handle::{HandleRights, Preopen};
use crate::types::RightsExt;
use crate::types::Rights;
use crate::volume::MemVolume;

/// Polled at every suspension point and between syscalls (SPEC_FULL.md §5).
pub trait AbortSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// An `AbortSignal` that never fires, used when the embedder does not wire
/// up cancellation.
pub struct NeverCancelled;

impl AbortSignal for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A one-shot flag an embedder can hand a guest run and flip from another
/// thread to request cancellation.
#[derive(Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl AbortSignal for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raised by a [`StdinSource`] when cancellation fires before any bytes
/// arrived.
pub struct Cancelled;

/// A byte-oriented stdin source. `read` may suspend the guest; an empty
/// return signals EOF for that call only (SPEC_FULL.md §6).
pub trait StdinSource: Send {
    fn read(&mut self, max_len: usize, cancel: &dyn AbortSignal) -> Result<Vec<u8>, Cancelled>;
}

/// A byte-oriented stdout/stderr sink.
pub trait OutputSink: Send {
    fn write(&mut self, bytes: &[u8]);
}

/// An always-EOF stdin, used when the embedder supplies none.
struct EmptyStdin;

impl StdinSource for EmptyStdin {
    fn read(&mut self, _max_len: usize, _cancel: &dyn AbortSignal) -> Result<Vec<u8>, Cancelled> {
        Ok(Vec::new())
    }
}

/// Wraps the process's real stdin. Cancellation is only checked before the
/// blocking read begins — std's `Read` gives no way to interrupt a read
/// already in flight, so a cancellation that arrives mid-read is observed
/// only on the *next* syscall instead of immediately.
struct InheritedStdin(std::io::Stdin);

impl StdinSource for InheritedStdin {
    fn read(&mut self, max_len: usize, cancel: &dyn AbortSignal) -> Result<Vec<u8>, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let mut buf = vec![0u8; max_len];
        let n = self.0.read(&mut buf).unwrap_or(0);
        buf.truncate(n);
        Ok(buf)
    }
}

struct WriterSink<W>(W);

impl<W: Write + Send> OutputSink for WriterSink<W> {
    fn write(&mut self, bytes: &[u8]) {
        let _ = self.0.write_all(bytes);
    }
}

/// Everything a `run` invocation needs from the embedder, plus the live
/// descriptor table it mutates while the guest executes.
pub struct WasiCtx {
    pub args: Vec<Vec<u8>>,
    pub env: Vec<Vec<u8>>,
    pub preopens: Vec<Preopen>,
    pub files: OpenFiles,
    pub stdin: Box<dyn StdinSource>,
    pub stdout: Box<dyn OutputSink>,
    pub stderr: Box<dyn OutputSink>,
    pub abort: Arc<dyn AbortSignal>,
    /// Baseline for the monotonic and CPU-time clocks (SPEC_FULL.md §4.6,
    /// `clock_time_get`). Stamped once, at `build()`.
    pub start: std::time::Instant,
}

#[derive(Default)]
pub struct WasiCtxBuilder {
    args: Vec<Vec<u8>>,
    env: Vec<Vec<u8>>,
    preopens: Vec<Preopen>,
    stdin: Option<Box<dyn StdinSource>>,
    stdout: Option<Box<dyn OutputSink>>,
    stderr: Option<Box<dyn OutputSink>>,
    abort: Option<Arc<dyn AbortSignal>>,
}

impl WasiCtxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(&mut self, arg: impl AsRef<[u8]>) -> Result<&mut Self> {
        let bytes = arg.as_ref();
        if bytes.contains(&0) {
            bail!("argument contains a NUL byte");
        }
        self.args.push(bytes.to_vec());
        Ok(self)
    }

    pub fn args<I, A>(&mut self, args: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        for arg in args {
            self.arg(arg)?;
        }
        Ok(self)
    }

    pub fn env(&mut self, key: &str, value: &str) -> Result<&mut Self> {
        if key.contains('=') || key.is_empty() {
            bail!("environment key must be non-empty and must not contain '='");
        }
        if key.contains('\0') || value.contains('\0') {
            bail!("environment entry contains a NUL byte");
        }
        self.env.push(format!("{key}={value}").into_bytes());
        Ok(self)
    }

    pub fn inherit_stdio(&mut self) -> &mut Self {
        self.stdin = Some(Box::new(InheritedStdin(std::io::stdin())));
        self.stdout = Some(Box::new(WriterSink(std::io::stdout())));
        self.stderr = Some(Box::new(WriterSink(std::io::stderr())));
        self
    }

    pub fn stdin(&mut self, source: Box<dyn StdinSource>) -> &mut Self {
        self.stdin = Some(source);
        self
    }

    pub fn stdout(&mut self, sink: Box<dyn OutputSink>) -> &mut Self {
        self.stdout = Some(sink);
        self
    }

    pub fn stderr(&mut self, sink: Box<dyn OutputSink>) -> &mut Self {
        self.stderr = Some(sink);
        self
    }

    pub fn abort_signal(&mut self, abort: Arc<dyn AbortSignal>) -> &mut Self {
        self.abort = Some(abort);
        self
    }

    /// Registers `volume` as a preopen visible to the guest at
    /// `guest_path`, an absolute path with no trailing slash.
    pub fn preopened_dir(
        &mut self,
        volume: Arc<MemVolume>,
        guest_path: impl Into<String>,
    ) -> Result<&mut Self> {
        let guest_path = guest_path.into();
        if !guest_path.starts_with('/') || (guest_path != "/" && guest_path.ends_with('/')) {
            bail!("preopen path must be absolute with no trailing slash: {guest_path}");
        }
        self.preopens.push(Preopen::new(guest_path, volume));
        Ok(self)
    }

    pub fn build(&mut self) -> WasiCtx {
        let mut files = OpenFiles::new();
        for preopen in &self.preopens {
            files.insert_preopen(DirState {
                node: preopen.volume.root(),
                guest_path: preopen.guest_path.clone(),
                rights: HandleRights::new(
                    Rights::directory_base(),
                    Rights::directory_inheriting(),
                ),
                volume: preopen.volume.clone(),
            });
        }
        WasiCtx {
            args: std::mem::take(&mut self.args),
            env: std::mem::take(&mut self.env),
            preopens: std::mem::take(&mut self.preopens),
            files,
            stdin: self.stdin.take().unwrap_or_else(|| Box::new(EmptyStdin)),
            stdout: self
                .stdout
                .take()
                .unwrap_or_else(|| Box::new(WriterSink(std::io::sink()))),
            stderr: self
                .stderr
                .take()
                .unwrap_or_else(|| Box::new(WriterSink(std::io::sink()))),
            abort: self.abort.take().unwrap_or_else(|| Arc::new(NeverCancelled)),
            start: std::time::Instant::now(),
        }
    }
}
