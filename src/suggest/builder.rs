use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;

use serde::Serialize;

use crate::generation::GenerationId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Word,
    Arg,
    Command,
    Alias,
    File,
    Dir,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Match {
    pub text: String,
    pub kind: MatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Match {
    pub fn new(text: impl Into<String>, kind: MatchKind) -> Self {
        Self {
            text: text.into(),
            kind,
            display: None,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Presentation flags collected alongside the matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchFlags {
    pub append_char: Option<char>,
    pub suppress_append: bool,
    pub suppress_quoting: bool,
    pub matches_are_files: bool,
}

#[derive(Debug, Default)]
pub struct MatchBuilder {
    matches: Vec<Match>,
    seen: HashSet<String>,
    flags: MatchFlags,
}

impl MatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one match. Empty and duplicate texts are rejected.
    pub fn add_match(&mut self, m: Match) -> bool {
        if m.text.is_empty() || !self.seen.insert(m.text.clone()) {
            return false;
        }
        if matches!(m.kind, MatchKind::File | MatchKind::Dir) {
            self.flags.matches_are_files = true;
        }
        self.matches.push(m);
        true
    }

    /// Returns how many were added.
    pub fn add_matches(&mut self, matches: impl IntoIterator<Item = Match>) -> usize {
        let mut added = 0;
        for m in matches {
            if self.add_match(m) {
                added += 1;
            }
        }
        added
    }

    pub fn set_append_character(&mut self, c: Option<char>) {
        self.flags.append_char = c;
    }

    pub fn set_suppress_append(&mut self, suppress: bool) {
        self.flags.suppress_append = suppress;
    }

    pub fn set_suppress_quoting(&mut self, suppress: bool) {
        self.flags.suppress_quoting = suppress;
    }

    pub fn set_matches_are_files(&mut self, files: bool) {
        self.flags.matches_are_files = files;
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn flags(&self) -> MatchFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Match-generation state for one request, tagged with its generation.
#[derive(Debug)]
pub struct MatchToolkit {
    generation: GenerationId,
    line: String,
    end_word_offset: usize,
    builder: RefCell<MatchBuilder>,
}

impl MatchToolkit {
    pub(super) fn new(generation: GenerationId, line: &str, end_word_offset: usize) -> Self {
        Self {
            generation,
            line: line.to_owned(),
            end_word_offset: end_word_offset.min(line.len()),
            builder: RefCell::new(MatchBuilder::new()),
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Snapshot of the line taken when the request began.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn end_word_offset(&self) -> usize {
        self.end_word_offset
    }

    /// The word being completed (from the end-word offset to the end).
    pub fn end_word(&self) -> &str {
        self.line.get(self.end_word_offset..).unwrap_or("")
    }

    pub fn builder(&self) -> Ref<'_, MatchBuilder> {
        self.builder.borrow()
    }

    pub fn builder_mut(&self) -> RefMut<'_, MatchBuilder> {
        self.builder.borrow_mut()
    }

    pub fn add_match(&self, m: Match) -> bool {
        self.builder.borrow_mut().add_match(m)
    }

    /// Snapshot of everything generated so far, tagged for staleness checks.
    pub fn finish(&self) -> MatchBatch {
        let builder = self.builder.borrow();
        MatchBatch {
            generation: self.generation,
            end_word_offset: self.end_word_offset,
            matches: builder.matches().to_vec(),
            flags: builder.flags(),
        }
    }
}

/// Matches handed to the renderer. The generation must survive the trip so
/// the consumer can discard stale batches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchBatch {
    pub generation: GenerationId,
    pub end_word_offset: usize,
    pub matches: Vec<Match>,
    pub flags: MatchFlags,
}
