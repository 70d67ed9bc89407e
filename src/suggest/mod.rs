//! Generation-tagged suggestion and match toolkit.
//!
//! Each request cycle gets a new [`GenerationId`] and a fresh
//! [`MatchToolkit`]. Deferred work (a script coroutine) keeps its own `Rc` to
//! the toolkit it started with and checks `get_if_current` before publishing;
//! a stale result is dropped silently.

mod builder;


pub use builder::{Match, MatchBatch, MatchBuilder, MatchFlags, MatchKind, MatchToolkit};

use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::generation::{GenerationCounter, GenerationId};
use crate::idle::HostError;

/// Suggestion text shown after the cursor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub generation: GenerationId,
    pub line: String,
    pub end_word_offset: usize,
    pub text: String,
    /// Byte offset in `line` where `text` replaces the input.
    pub offset: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SuggestOutcome {
    /// Suggestion available right away.
    Suggestion { text: String, offset: usize },
    /// A coroutine kept the toolkit and will publish later.
    Deferred,
    NoSuggestion,
    /// Stop; no further suggestion processing for this input.
    Cancelled,
}

/// Script-side suggester.
pub trait SuggestionSource {
    fn suggest(
        &mut self,
        toolkit: Rc<MatchToolkit>,
        generation: GenerationId,
    ) -> Result<SuggestOutcome, HostError>;
}

#[derive(Debug, Default)]
pub struct Suggester {
    counter: GenerationCounter,
    active: Option<Rc<MatchToolkit>>,
    suggestion: Option<Suggestion>,
}

impl Suggester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire the active toolkit and start a new generation.
    pub fn begin_request(
        &mut self,
        line: &str,
        end_word_offset: usize,
    ) -> (Rc<MatchToolkit>, GenerationId) {
        let generation = self.counter.next();
        let toolkit = Rc::new(MatchToolkit::new(generation, line, end_word_offset));
        if let Some(old) = self.active.replace(Rc::clone(&toolkit)) {
            debug!(
                retired = %old.generation(),
                outstanding = Rc::strong_count(&old) - 1,
                "retiring toolkit"
            );
        }
        (toolkit, generation)
    }

    /// The active toolkit, only if `generation` is still current.
    pub fn get_if_current(&self, generation: GenerationId) -> Option<Rc<MatchToolkit>> {
        self.active
            .as_ref()
            .filter(|t| t.generation() == generation)
            .cloned()
    }

    /// Generation of the active toolkit; `None` once it has been retired.
    pub fn current_generation(&self) -> Option<GenerationId> {
        self.active.as_ref().map(|t| t.generation())
    }

    /// Pass a batch through only if it belongs to the active toolkit.
    pub fn accept_matches(&self, batch: MatchBatch) -> Option<MatchBatch> {
        if self.get_if_current(batch.generation).is_some() {
            Some(batch)
        } else {
            debug!(stale = %batch.generation, "dropping stale matches");
            None
        }
    }

    /// Publish a suggestion computed under `generation`. Returns `false` if
    /// the generation is stale.
    pub fn set_suggestion(&mut self, generation: GenerationId, text: &str, offset: usize) -> bool {
        let Some(toolkit) = self.get_if_current(generation) else {
            debug!(stale = %generation, "dropping stale suggestion");
            return false;
        };
        self.suggestion = Some(Suggestion {
            generation,
            line: toolkit.line().to_owned(),
            end_word_offset: toolkit.end_word_offset(),
            text: text.to_owned(),
            offset: offset.min(toolkit.line().len()),
        });
        true
    }

    pub fn suggestion(&self) -> Option<&Suggestion> {
        self.suggestion.as_ref()
    }

    pub fn clear_suggestion(&mut self) {
        self.suggestion = None;
    }

    /// Retire the active toolkit and clear the suggestion.
    pub fn reset(&mut self) {
        self.active = None;
        self.suggestion = None;
    }

    /// Run one suggestion request through `source`.
    ///
    /// Returns `false` when the source cancelled further processing.
    pub fn suggest(
        &mut self,
        line: &str,
        end_word_offset: usize,
        source: &mut dyn SuggestionSource,
    ) -> bool {
        self.active = None;
        self.suggestion = None;
        if line.is_empty() {
            return true;
        }

        let (toolkit, generation) = self.begin_request(line, end_word_offset);
        match source.suggest(toolkit, generation) {
            Ok(SuggestOutcome::Suggestion { text, offset }) => {
                self.set_suggestion(generation, &text, offset);
                true
            }
            Ok(SuggestOutcome::Deferred | SuggestOutcome::NoSuggestion) => true,
            Ok(SuggestOutcome::Cancelled) => false,
            Err(e) => {
                warn!(error = %e, "suggester failed");
                true
            }
        }
    }
}
