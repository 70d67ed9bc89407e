use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use os_pipe::PipeReader;
use tracing::{debug, debug_span};

use crate::generation::GenerationId;
use crate::idle::WakeEvent;

/// Completion marker for an asynchronous popen.
///
/// The script coroutine polls `is_ready` before reading the spooled output;
/// `generation` tells it which request cycle the command belongs to.
#[derive(Clone, Debug)]
pub struct YieldGuard {
    inner: Arc<GuardState>,
}

#[derive(Debug)]
struct GuardState {
    command: String,
    generation: Option<GenerationId>,
    ready: Mutex<bool>,
    cond: Condvar,
    canceled: AtomicBool,
}

impl YieldGuard {
    pub(super) fn new(command: &str, generation: Option<GenerationId>) -> Self {
        Self {
            inner: Arc::new(GuardState {
                command: command.to_owned(),
                generation,
                ready: Mutex::new(false),
                cond: Condvar::new(),
                canceled: AtomicBool::new(false),
            }),
        }
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn generation(&self) -> Option<GenerationId> {
        self.inner.generation
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the relay to finish.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .cond
            .wait_timeout_while(guard, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Ask the relay to stop after its current chunk.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    fn mark_ready(&self) {
        *self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.inner.cond.notify_all();
    }
}

/// Wake event shared by a registry and all of its relays. Relays read it
/// when they finish, so a replacement installed mid-flight is the one set.
#[derive(Clone, Debug, Default)]
pub(super) struct WakeTarget(Arc<Mutex<Option<Arc<WakeEvent>>>>);

impl WakeTarget {
    pub(super) fn replace(&self, event: Option<Arc<WakeEvent>>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = event;
    }

    fn signal(&self) {
        let event = self.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(event) = event {
            event.set();
        }
    }
}

/// Spawn the relay thread copying `reader` into `spool`.
pub(super) fn start(
    reader: PipeReader,
    spool: File,
    guard: YieldGuard,
    buffer_size: usize,
    wake: WakeTarget,
) -> io::Result<()> {
    thread::Builder::new()
        .name("recline-popen-relay".into())
        .spawn(move || run(reader, spool, guard, buffer_size, wake))
        .map(drop)
}

fn run(
    mut reader: PipeReader,
    mut spool: File,
    guard: YieldGuard,
    buffer_size: usize,
    wake: WakeTarget,
) {
    let _span = debug_span!("popen_relay", command = guard.command()).entered();
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0usize;

    while !guard.is_canceled() {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "relay read failed");
                break;
            }
        };
        if let Err(e) = spool.write_all(&buf[..n]) {
            debug!(error = %e, "relay write failed");
            break;
        }
        total += n;
    }

    // The read handle shares this file position; rewind so the consumer
    // starts at the beginning.
    if let Err(e) = spool.flush().and_then(|_| spool.seek(SeekFrom::Start(0))) {
        debug!(error = %e, "relay rewind failed");
    }
    drop(spool);
    drop(reader);

    debug!(bytes = total, canceled = guard.is_canceled(), "relay finished");
    guard.mark_ready();
    wake.signal();
}
