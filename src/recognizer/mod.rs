//! Background command recognizer.
//!
//! Classifies typed words as recognized commands without blocking the
//! editing thread. Results are cached for one input line: `clear` drops
//! everything and resets the key arena.
//!
//! Layout:
//! - `confirmed` and `pending` tables share one [`LinearArena`]
//! - one work slot; a new request overwrites an undispatched one
//! - one lazily started worker thread, joined on shutdown

mod cache;
mod resolve;
mod worker;

#[cfg(test)]
mod tests;

pub use resolve::{CommandResolver, PathResolver};

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::arena::LinearArena;
use crate::idle::WakeEvent;
use crate::settings::RecognizerSettings;

use cache::ClassTable;

/// Classification of one word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recognition {
    /// Resolution is queued or in progress.
    Unknown,
    NotRecognized,
    Recognized,
    /// The word names a directory (typing it changes directory).
    Directory,
}

impl Recognition {
    /// One-byte code handed to display code.
    pub fn code(self) -> i8 {
        match self {
            Recognition::Unknown => 0,
            Recognition::NotRecognized => -1,
            Recognition::Recognized => 1,
            Recognition::Directory => 2,
        }
    }

    pub fn is_final(self) -> bool {
        self != Recognition::Unknown
    }
}

struct WorkItem {
    key: String,
    word: String,
}

struct State {
    arena: LinearArena,
    confirmed: ClassTable,
    pending: ClassTable,
    slot: Option<WorkItem>,
    /// Worker is resolving a dequeued item.
    busy: bool,
    /// Bumped by `clear`; results computed under an older epoch are dropped.
    epoch: u64,
    zombie: bool,
    started: bool,
    wake: Option<Arc<WakeEvent>>,
}

struct Shared {
    state: Mutex<State>,
    /// Signaled when the slot is filled or on shutdown.
    work: Condvar,
    /// Signaled when a result is stored or the worker goes idle.
    ready: Condvar,
    resolver: Arc<dyn CommandResolver>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Recognizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    fold_case: bool,
}

impl Recognizer {
    pub fn new(resolver: Arc<dyn CommandResolver>, settings: &RecognizerSettings) -> Self {
        let state = State {
            arena: LinearArena::new(settings.arena_page_size, settings.arena_max_pages),
            confirmed: ClassTable::new(),
            pending: ClassTable::new(),
            slot: None,
            busy: false,
            epoch: 0,
            zombie: false,
            started: false,
            wake: None,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                work: Condvar::new(),
                ready: Condvar::new(),
                resolver,
            }),
            worker: Mutex::new(None),
            fold_case: settings.folds_case(),
        }
    }

    /// Recognizer backed by a [`PathResolver`] built from the same settings.
    pub fn with_path_resolver(settings: &RecognizerSettings) -> Self {
        Self::new(Arc::new(PathResolver::from_settings(settings)), settings)
    }

    /// Event signaled whenever new results are available.
    pub fn set_wake_event(&self, event: Option<Arc<WakeEvent>>) {
        self.shared.lock().wake = event;
    }

    /// Cached classification: confirmed first, then pending.
    pub fn find(&self, key: &str) -> Option<Recognition> {
        let state = self.shared.lock();
        if state.zombie {
            return None;
        }
        state
            .confirmed
            .get(&state.arena, key)
            .or_else(|| state.pending.get(&state.arena, key))
    }

    /// Queue `word` for resolution under `key`.
    ///
    /// Returns `false` when the recognizer is unusable or the key could not
    /// be stored; the word then stays unresolved.
    pub fn enqueue(&self, key: &str, word: &str) -> bool {
        let mut state = self.shared.lock();
        if state.zombie {
            return false;
        }

        let State {
            arena,
            confirmed,
            pending,
            ..
        } = &mut *state;
        if confirmed.get(arena, key).is_some() {
            return true;
        }
        if !pending.insert(arena, key, Recognition::Unknown) {
            debug!(key, "recognizer arena exhausted");
            return false;
        }

        if state.slot.is_some() {
            debug!(key, "replacing undispatched recognizer request");
        }
        state.slot = Some(WorkItem {
            key: key.to_owned(),
            word: word.to_owned(),
        });

        if !state.started && !self.start_worker(&mut state) {
            return false;
        }

        drop(state);
        self.shared.work.notify_one();
        thread::yield_now();
        true
    }

    /// Per-keystroke query from the editor. Never blocks on resolution:
    /// unknown words are queued and reported as [`Recognition::Unknown`].
    pub fn recognize(&self, word: &str) -> Recognition {
        let word = word.trim().trim_matches('"');
        if word.is_empty() {
            return Recognition::NotRecognized;
        }
        let key = self.normalize(word);
        if let Some(found) = self.find(&key) {
            return found;
        }
        self.enqueue(&key, word);
        Recognition::Unknown
    }

    /// Like [`recognize`](Self::recognize), but waits up to `timeout` for a
    /// final result, re-queuing the word if a newer request displaced it.
    pub fn recognize_wait(&self, word: &str, timeout: Duration) -> Recognition {
        let word = word.trim().trim_matches('"');
        if word.is_empty() {
            return Recognition::NotRecognized;
        }
        let key = self.normalize(word);
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(&key) {
                Some(found) if found.is_final() => return found,
                Some(_) => {}
                None if !self.enqueue(&key, word) => return Recognition::Unknown,
                None => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Recognition::Unknown;
            }
            self.wait_until_idle(deadline - now);
        }
    }

    /// Drop every cached entry and any undispatched request.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.confirmed.clear();
        state.pending.clear();
        state.arena.reset();
        state.slot = None;
        state.epoch += 1;
        drop(state);
        self.shared.ready.notify_all();
    }

    /// Wait until the worker has nothing queued or in flight.
    ///
    /// Returns `false` if `timeout` elapsed first; callers proceed with
    /// whatever is cached.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.zombie || (state.slot.is_none() && !state.busy) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("recognizer wait timed out");
                return false;
            }
            state = self
                .shared
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Enter the zombie state and join the worker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.zombie = true;
            state.slot = None;
        }
        self.shared.work.notify_all();
        self.shared.ready.notify_all();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("recognizer worker panicked");
            }
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.shared.lock().zombie
    }

    /// Cache key for a word: case folded where the filesystem folds case.
    pub fn normalize(&self, word: &str) -> String {
        let key = if cfg!(windows) {
            word.replace('/', "\\")
        } else {
            word.to_owned()
        };
        if self.fold_case {
            key.to_lowercase()
        } else {
            key
        }
    }

    fn start_worker(&self, state: &mut State) -> bool {
        state.started = true;
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("recline-recognizer".into())
            .spawn(move || worker::run(shared));
        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn recognizer worker");
                state.zombie = true;
                state.slot = None;
                state.pending.clear();
                false
            }
        }
    }

    #[cfg(test)]
    fn shared_refs(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
