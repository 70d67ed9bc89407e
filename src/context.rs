//! Engine context: owns the recognizer, suggester, idle driver and popen
//! registry for one editing session.
//!
//! Only one context may be alive per process. The recognizer's wake event is
//! rewired to the idle driver's fresh event at the start of every line.

use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::classify::Classifications;
use crate::generation::GenerationId;
use crate::idle::{CoroutineHost, IdleDriver, IdleOutcome};
use crate::popen::{CloseStatus, HandleId, PopenError, PopenRegistry, YieldGuard};
use crate::recognizer::{CommandResolver, Recognition, Recognizer};
use crate::settings::Settings;
use crate::suggest::{MatchToolkit, SuggestionSource, Suggester};

static ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("an engine context is already active")]
    AlreadyActive,
    #[error(transparent)]
    Popen(#[from] PopenError),
}

pub struct EngineContext<H: CoroutineHost> {
    recognizer: Arc<Recognizer>,
    suggester: Suggester,
    idle: IdleDriver<H>,
    popen: PopenRegistry,
    end_of_line_wait: Duration,
}

impl<H: CoroutineHost> EngineContext<H> {
    /// Context resolving commands against `PATH`.
    pub fn new(host: H, settings: &Settings) -> Result<Self, EngineError> {
        Self::acquire()?;
        let recognizer = Recognizer::with_path_resolver(&settings.recognizer);
        Ok(Self::assemble(recognizer, host, settings))
    }

    pub fn with_resolver(
        host: H,
        settings: &Settings,
        resolver: Arc<dyn CommandResolver>,
    ) -> Result<Self, EngineError> {
        Self::acquire()?;
        let recognizer = Recognizer::new(resolver, &settings.recognizer);
        Ok(Self::assemble(recognizer, host, settings))
    }

    fn acquire() -> Result<(), EngineError> {
        ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(|_| EngineError::AlreadyActive)
    }

    fn assemble(recognizer: Recognizer, host: H, settings: &Settings) -> Self {
        let mut ctx = Self {
            recognizer: Arc::new(recognizer),
            suggester: Suggester::new(),
            idle: IdleDriver::new(host, &settings.idle),
            popen: PopenRegistry::new(settings.popen.clone()),
            end_of_line_wait: settings.recognizer.end_of_line_wait(),
        };
        ctx.wire_wake_event();
        ctx
    }

    fn wire_wake_event(&mut self) {
        let wake = self.idle.wake_event();
        self.recognizer.set_wake_event(Some(Arc::clone(&wake)));
        self.popen.set_wake_event(Some(wake));
    }

    /// Start of a new input line.
    pub fn begin_line(&mut self) {
        debug!("begin line");
        self.recognizer.clear();
        self.suggester.reset();
        self.idle.reset();
        self.wire_wake_event();
    }

    pub fn recognize_word(&self, word: &str) -> Recognition {
        self.recognizer.recognize(word)
    }

    /// Classifications for one command, with its command word classified
    /// from the recognizer when a result is available.
    pub fn classify_command(&self, line: &str, words: &[Range<usize>]) -> Classifications {
        let mut classifications = Classifications::new(line.len());
        let first = classifications.add_command(words);
        let class = words
            .first()
            .and_then(|span| line.get(span.clone()))
            .and_then(|word| self.recognize_word(word).word_class());
        if let Some(class) = class {
            if let Err(e) = classifications.classify_word(first, class, false) {
                debug!(error = %e, "command word not classified");
            }
        }
        classifications
    }

    /// Wait, bounded, for outstanding recognitions before the line is
    /// accepted.
    pub fn end_line_wait(&self) -> bool {
        self.recognizer.wait_until_idle(self.end_of_line_wait)
    }

    pub fn suggest(
        &mut self,
        line: &str,
        end_word_offset: usize,
        source: &mut dyn SuggestionSource,
    ) -> bool {
        self.suggester.suggest(line, end_word_offset, source)
    }

    pub fn get_if_current(&self, generation: GenerationId) -> Option<Rc<MatchToolkit>> {
        self.suggester.get_if_current(generation)
    }

    /// Asynchronous popen tagged with the current generation. Kicks the idle
    /// driver so the waiting coroutine gets resumed.
    pub fn popen_yield(
        &mut self,
        command: &str,
        mode: &str,
    ) -> Result<(HandleId, YieldGuard), EngineError> {
        let generation = self.suggester.current_generation();
        let opened = self.popen.popen_yield(command, mode, generation)?;
        self.idle.kick();
        Ok(opened)
    }

    pub fn popen_rw(&mut self, command: &str, mode: &str) -> Result<(HandleId, HandleId), EngineError> {
        Ok(self.popen.popen_rw(command, mode)?)
    }

    pub fn close(&mut self, id: HandleId) -> Result<CloseStatus, EngineError> {
        Ok(self.popen.close(id)?)
    }

    /// One idle step between key presses; also reaps detached processes.
    pub fn idle_step(&mut self, key_available: impl Fn() -> bool) -> IdleOutcome {
        self.popen.reap();
        self.idle.wait_idle(key_available)
    }

    pub fn recognizer(&self) -> &Arc<Recognizer> {
        &self.recognizer
    }

    pub fn suggester(&self) -> &Suggester {
        &self.suggester
    }

    pub fn suggester_mut(&mut self) -> &mut Suggester {
        &mut self.suggester
    }

    pub fn idle(&self) -> &IdleDriver<H> {
        &self.idle
    }

    pub fn idle_mut(&mut self) -> &mut IdleDriver<H> {
        &mut self.idle
    }

    pub fn popen(&mut self) -> &mut PopenRegistry {
        &mut self.popen
    }
}

impl<H: CoroutineHost> Drop for EngineContext<H> {
    fn drop(&mut self) {
        self.recognizer.shutdown();
        ACTIVE.store(false, Ordering::Release);
    }
}
