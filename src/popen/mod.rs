//! Process spawning for script code.
//!
//! - `popen_yield`: child stdout is relayed by a worker thread into an
//!   auto-deleting temp file; the caller gets the temp file's read handle at
//!   once plus a [`YieldGuard`] that turns ready when the relay finishes.
//! - `popen_rw`: child stdin/stdout are plain pipes, no relay thread. The
//!   caller must avoid filling one pipe while the child blocks on the other;
//!   that deadlock is inherent to blocking two-pipe I/O.
//!
//! Every open stream is tracked by [`HandleId`]. Closing the last stream of
//! a process removes its entry and waits for the process: blocking for
//! `popen_rw`, non-blocking for `popen_yield`.

mod relay;
mod spawn;


pub use relay::YieldGuard;

use relay::WakeTarget;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::{Child, Stdio};
use std::sync::Arc;

use os_pipe::{PipeReader, PipeWriter};
use tracing::{debug, debug_span};

use crate::generation::GenerationId;
use crate::idle::WakeEvent;
use crate::settings::PopenSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PopenError {
    #[error("invalid mode '{0}'")]
    InvalidMode(String),
    #[error("{command}: cannot create temporary file: {source}")]
    TempFile { command: String, source: io::Error },
    #[error("{command}: cannot create pipe: {source}")]
    Pipe { command: String, source: io::Error },
    #[error("{command}: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("{command}: cannot start relay thread: {source}")]
    Thread { command: String, source: io::Error },
    #[error("{command}: wait failed: {source}")]
    Wait { command: String, source: io::Error },
    #[error("unknown popen handle {0}")]
    UnknownHandle(HandleId),
}

impl PopenError {
    /// Platform error code, or -1 when there is none.
    pub fn code(&self) -> i32 {
        match self {
            PopenError::TempFile { source, .. }
            | PopenError::Pipe { source, .. }
            | PopenError::Spawn { source, .. }
            | PopenError::Thread { source, .. }
            | PopenError::Wait { source, .. } => source.raw_os_error().unwrap_or(-1),
            PopenError::InvalidMode(_) | PopenError::UnknownHandle(_) => -1,
        }
    }

    /// `(message, code)` for script callers that report failures as
    /// `nil, message, code`.
    pub fn file_result(&self) -> (String, i32) {
        (self.to_string(), self.code())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeMode {
    Text,
    Binary,
}

impl PipeMode {
    /// `popen_rw` modes: `t`, `b`, or empty for text.
    pub fn parse_rw(mode: &str) -> Result<Self, PopenError> {
        match mode {
            "" | "t" => Ok(PipeMode::Text),
            "b" => Ok(PipeMode::Binary),
            _ => Err(PopenError::InvalidMode(mode.to_owned())),
        }
    }

    /// `popen_yield` modes: `r?[bt]?`.
    pub fn parse_yield(mode: &str) -> Result<Self, PopenError> {
        match mode.strip_prefix('r').unwrap_or(mode) {
            "" | "t" => Ok(PipeMode::Text),
            "b" => Ok(PipeMode::Binary),
            _ => Err(PopenError::InvalidMode(mode.to_owned())),
        }
    }
}

/// Read side handed to script code.
#[derive(Debug)]
pub enum PopenReader {
    /// Temp file filled by the relay thread.
    Spool(File),
    Pipe(PipeReader),
}

impl Read for PopenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PopenReader::Spool(f) => f.read(buf),
            PopenReader::Pipe(p) => p.read(buf),
        }
    }
}

/// Write side (child stdin) handed to script code.
#[derive(Debug)]
pub struct PopenWriter(PipeWriter);

impl Write for PopenWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[derive(Debug)]
enum Stream {
    Read(PopenReader),
    Write(PopenWriter),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ProcessKey(u64);

#[derive(Debug)]
struct ProcessEntry {
    command: String,
    read: Option<HandleId>,
    write: Option<HandleId>,
    child: Child,
    mode: PipeMode,
    /// Set for `popen_yield`; cancelled when the read side closes.
    guard: Option<YieldGuard>,
}

/// Result of closing one popen stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseStatus {
    /// The process still has another open stream.
    Closed,
    /// Process exited with this code.
    Exited(i32),
    /// Asynchronous process still running; reaped later by `reap`.
    Detached,
}

/// Owns every popen stream and the processes behind them.
///
/// Main-thread only: registration and close take `&mut self`.
pub struct PopenRegistry {
    settings: PopenSettings,
    wake: WakeTarget,
    next_id: u64,
    streams: HashMap<HandleId, (Stream, ProcessKey)>,
    entries: HashMap<ProcessKey, ProcessEntry>,
    detached: Vec<Child>,
}

impl PopenRegistry {
    pub fn new(settings: PopenSettings) -> Self {
        Self {
            settings,
            wake: WakeTarget::default(),
            next_id: 0,
            streams: HashMap::new(),
            entries: HashMap::new(),
            detached: Vec::new(),
        }
    }

    /// Event set by relay threads when their output is complete. Relays
    /// already running switch to the new event too.
    pub fn set_wake_event(&mut self, event: Option<Arc<WakeEvent>>) {
        self.wake.replace(event);
    }

    /// Spawn `command` with its output spooled by a relay thread.
    pub fn popen_yield(
        &mut self,
        command: &str,
        mode: &str,
        generation: Option<GenerationId>,
    ) -> Result<(HandleId, YieldGuard), PopenError> {
        let mode = PipeMode::parse_yield(mode)?;
        let _span = debug_span!("popen_yield", command).entered();

        let temp_err = |source: io::Error| PopenError::TempFile {
            command: command.to_owned(),
            source,
        };
        let spool = tempfile::tempfile().map_err(temp_err)?;
        let spool_write = spool.try_clone().map_err(temp_err)?;
        let (pipe_read, pipe_write) = os_pipe::pipe().map_err(|source| PopenError::Pipe {
            command: command.to_owned(),
            source,
        })?;

        let child = {
            let mut cmd = spawn::shell_command(command, &self.settings);
            cmd.stdin(Stdio::null())
                .stdout(pipe_write)
                .stderr(Stdio::inherit());
            // `cmd` drops at the end of this block, closing our copy of the
            // pipe's write end so the relay sees EOF when the child exits.
            cmd.spawn().map_err(|source| PopenError::Spawn {
                command: command.to_owned(),
                source,
            })?
        };

        let guard = YieldGuard::new(command, generation);
        if let Err(source) = relay::start(
            pipe_read,
            spool_write,
            guard.clone(),
            self.settings.relay_buffer_size,
            self.wake.clone(),
        ) {
            spawn::kill_and_wait(child);
            return Err(PopenError::Thread {
                command: command.to_owned(),
                source,
            });
        }

        let key = self.next_key();
        let read = self.insert_stream(Stream::Read(PopenReader::Spool(spool)), key);
        self.entries.insert(
            key,
            ProcessEntry {
                command: command.to_owned(),
                read: Some(read),
                write: None,
                child,
                mode,
                guard: Some(guard.clone()),
            },
        );
        debug!(handle = %read, "popen_yield started");
        Ok((read, guard))
    }

    /// Spawn `command` with direct stdin/stdout pipes. Returns
    /// `(read, write)` handles.
    pub fn popen_rw(&mut self, command: &str, mode: &str) -> Result<(HandleId, HandleId), PopenError> {
        let mode = PipeMode::parse_rw(mode)?;
        let _span = debug_span!("popen_rw", command).entered();

        let pipe_err = |source: io::Error| PopenError::Pipe {
            command: command.to_owned(),
            source,
        };
        let (child_stdin, our_stdin) = os_pipe::pipe().map_err(pipe_err)?;
        let (our_stdout, child_stdout) = os_pipe::pipe().map_err(pipe_err)?;

        let child = {
            let mut cmd = spawn::shell_command(command, &self.settings);
            cmd.stdin(child_stdin)
                .stdout(child_stdout)
                .stderr(Stdio::inherit());
            cmd.spawn().map_err(|source| PopenError::Spawn {
                command: command.to_owned(),
                source,
            })?
        };

        let key = self.next_key();
        let read = self.insert_stream(Stream::Read(PopenReader::Pipe(our_stdout)), key);
        let write = self.insert_stream(Stream::Write(PopenWriter(our_stdin)), key);
        self.entries.insert(
            key,
            ProcessEntry {
                command: command.to_owned(),
                read: Some(read),
                write: Some(write),
                child,
                mode,
                guard: None,
            },
        );
        Ok((read, write))
    }

    pub fn reader(&mut self, id: HandleId) -> Option<&mut PopenReader> {
        match self.streams.get_mut(&id) {
            Some((Stream::Read(r), _)) => Some(r),
            _ => None,
        }
    }

    pub fn writer(&mut self, id: HandleId) -> Option<&mut PopenWriter> {
        match self.streams.get_mut(&id) {
            Some((Stream::Write(w), _)) => Some(w),
            _ => None,
        }
    }

    /// Mode the stream's process was opened with.
    pub fn mode(&self, id: HandleId) -> Option<PipeMode> {
        let (_, key) = self.streams.get(&id)?;
        self.entries.get(key).map(|e| e.mode)
    }

    /// Close one stream; waits for the process once no stream remains.
    pub fn close(&mut self, id: HandleId) -> Result<CloseStatus, PopenError> {
        let (stream, key) = self
            .streams
            .remove(&id)
            .ok_or(PopenError::UnknownHandle(id))?;
        drop(stream);

        let Some(entry) = self.entries.get_mut(&key) else {
            return Ok(CloseStatus::Closed);
        };
        if entry.read == Some(id) {
            entry.read = None;
            if let Some(guard) = &entry.guard {
                guard.cancel();
            }
        }
        if entry.write == Some(id) {
            entry.write = None;
        }
        if entry.read.is_some() || entry.write.is_some() {
            return Ok(CloseStatus::Closed);
        }

        let Some(mut entry) = self.entries.remove(&key) else {
            return Ok(CloseStatus::Closed);
        };
        if entry.guard.is_some() {
            return Ok(match entry.child.try_wait() {
                Ok(Some(status)) => CloseStatus::Exited(spawn::exit_code(status)),
                _ => {
                    debug!(command = %entry.command, "detaching running process");
                    self.detached.push(entry.child);
                    CloseStatus::Detached
                }
            });
        }

        let status = entry.child.wait().map_err(|source| PopenError::Wait {
            command: entry.command.clone(),
            source,
        })?;
        Ok(CloseStatus::Exited(spawn::exit_code(status)))
    }

    /// Collect detached processes that have exited. Returns how many are
    /// still running.
    pub fn reap(&mut self) -> usize {
        self.detached
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_)) | Err(_)));
        self.detached.len()
    }

    /// Processes with at least one open stream.
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    fn next_key(&mut self) -> ProcessKey {
        self.next_id += 1;
        ProcessKey(self.next_id)
    }

    fn insert_stream(&mut self, stream: Stream, key: ProcessKey) -> HandleId {
        self.next_id += 1;
        let id = HandleId(self.next_id);
        self.streams.insert(id, (stream, key));
        id
    }
}

impl Drop for PopenRegistry {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            if let Some(guard) = &entry.guard {
                guard.cancel();
            }
        }
        if !self.entries.is_empty() || !self.detached.is_empty() {
            debug!(
                live = self.entries.len(),
                detached = self.detached.len(),
                "popen registry dropped with running processes"
            );
        }
    }
}
