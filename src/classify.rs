//! Per-line word classifications rendered as one face byte per line byte.
//!
//! A face byte of `b' '` means unclassified. Word classes map to the ASCII
//! codes below; `b'm'` marks a command that has an argmatcher. Custom SGR
//! faces registered through [`Classifications::ensure_face`] use bytes from
//! 128 upwards.

use std::collections::HashMap;
use std::ops::Range;

use crate::recognizer::Recognition;

pub const UNCLASSIFIED: u8 = b' ';
pub const ARGMATCHER_FACE: u8 = b'm';
const FIRST_CUSTOM_FACE: u8 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordClass {
    Other,
    Command,
    Doskey,
    Arg,
    Flag,
    None,
    Executable,
    Unrecognized,
}

impl WordClass {
    pub fn face(self) -> u8 {
        match self {
            WordClass::Other => b'o',
            WordClass::Command => b'c',
            WordClass::Doskey => b'd',
            WordClass::Arg => b'a',
            WordClass::Flag => b'f',
            WordClass::None => b'n',
            WordClass::Executable => b'x',
            WordClass::Unrecognized => b'u',
        }
    }

    /// Parse a script classification code such as `"a"` or `"mc"`.
    ///
    /// Returns the class and whether the `m` (argmatcher) prefix was present.
    /// Unknown codes classify as `Other`.
    pub fn parse_code(code: &str) -> (WordClass, bool) {
        let (argmatcher, rest) = match code.strip_prefix('m') {
            Some(rest) => (true, rest),
            None => (false, code),
        };
        let class = match rest.bytes().next() {
            Some(b'c') => WordClass::Command,
            Some(b'd') => WordClass::Doskey,
            Some(b'a') => WordClass::Arg,
            Some(b'f') => WordClass::Flag,
            Some(b'n') => WordClass::None,
            Some(b'x') => WordClass::Executable,
            Some(b'u') => WordClass::Unrecognized,
            _ => WordClass::Other,
        };
        (class, argmatcher)
    }
}

impl Recognition {
    /// Class for a command word, or `None` while recognition is pending.
    pub fn word_class(self) -> Option<WordClass> {
        match self {
            Recognition::Recognized => Some(WordClass::Executable),
            Recognition::NotRecognized => Some(WordClass::Unrecognized),
            Recognition::Directory => Some(WordClass::Other),
            Recognition::Unknown => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("word index {index} out of bounds ({words} words)")]
    WordIndexOutOfBounds { index: usize, words: usize },
}

#[derive(Clone, Debug)]
struct WordInfo {
    span: Range<usize>,
    class: Option<WordClass>,
    argmatcher: bool,
    command_word: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Classifications {
    words: Vec<WordInfo>,
    faces: Vec<u8>,
    face_definitions: Vec<String>,
    face_map: HashMap<String, u8>,
}

impl Classifications {
    pub fn new(line_len: usize) -> Self {
        Self {
            faces: vec![UNCLASSIFIED; line_len],
            ..Self::default()
        }
    }

    /// Append the words of one command; its first word is the command word.
    /// Returns the index of that first word.
    pub fn add_command(&mut self, words: &[Range<usize>]) -> usize {
        let first = self.words.len();
        self.words.extend(words.iter().enumerate().map(|(i, span)| WordInfo {
            span: span.clone(),
            class: None,
            argmatcher: false,
            command_word: i == 0,
        }));
        first
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn classify_word(
        &mut self,
        index: usize,
        class: WordClass,
        overwrite: bool,
    ) -> Result<(), ClassifyError> {
        let words = self.words.len();
        let info = self
            .words
            .get_mut(index)
            .ok_or(ClassifyError::WordIndexOutOfBounds { index, words })?;
        if overwrite || info.class.is_none() {
            info.class = Some(class);
        }
        Ok(())
    }

    /// Classify from a script code; the `m` prefix only sticks to a command
    /// word.
    pub fn classify_code(
        &mut self,
        index: usize,
        code: &str,
        overwrite: bool,
    ) -> Result<(), ClassifyError> {
        let (class, argmatcher) = WordClass::parse_code(code);
        self.classify_word(index, class, overwrite)?;
        if argmatcher && self.words[index].command_word {
            self.set_word_has_argmatcher(index);
        }
        Ok(())
    }

    pub fn set_word_has_argmatcher(&mut self, index: usize) {
        if let Some(info) = self.words.get_mut(index) {
            info.argmatcher = true;
        }
    }

    pub fn word_class(&self, index: usize) -> Option<WordClass> {
        self.words.get(index).and_then(|w| w.class)
    }

    pub fn is_word_classified(&self, index: usize) -> bool {
        self.word_class(index).is_some()
    }

    /// Paint `len` bytes from `start`; without `overwrite` only unclassified
    /// bytes change.
    pub fn apply_face(&mut self, start: usize, len: usize, face: u8, overwrite: bool) {
        let end = start.saturating_add(len).min(self.faces.len());
        for slot in self.faces.iter_mut().take(end).skip(start) {
            if overwrite || *slot == UNCLASSIFIED {
                *slot = face;
            }
        }
    }

    /// Face byte for an SGR parameter string, allocating one if needed.
    /// `None` once the custom face range is used up.
    pub fn ensure_face(&mut self, sgr: &str) -> Option<u8> {
        if let Some(&face) = self.face_map.get(sgr) {
            return Some(face);
        }
        let face = u8::try_from(usize::from(FIRST_CUSTOM_FACE) + self.face_definitions.len()).ok()?;
        self.face_definitions.push(sgr.to_owned());
        self.face_map.insert(sgr.to_owned(), face);
        Some(face)
    }

    /// SGR parameters behind a custom face byte.
    pub fn face_output(&self, face: u8) -> Option<&str> {
        let index = face.checked_sub(FIRST_CUSTOM_FACE)?;
        self.face_definitions.get(usize::from(index)).map(String::as_str)
    }

    /// Fold word classes into the face bytes. Explicitly applied faces win
    /// over word classes; argmatcher marking wins over both when shown.
    pub fn finish(&mut self, show_argmatchers: bool) {
        let len = self.faces.len();
        for info in &self.words {
            let end = info.span.end.min(len);
            for pos in info.span.start.min(end)..end {
                if info.argmatcher && show_argmatchers {
                    self.faces[pos] = ARGMATCHER_FACE;
                } else if let (UNCLASSIFIED, Some(class)) = (self.faces[pos], info.class) {
                    self.faces[pos] = class.face();
                }
            }
        }
    }

    pub fn faces(&self) -> &[u8] {
        &self.faces
    }

    pub fn face_at(&self, pos: usize) -> u8 {
        self.faces.get(pos).copied().unwrap_or(UNCLASSIFIED)
    }
}

/// Two classifications render the same when their faces and custom face
/// definitions match.
impl PartialEq for Classifications {
    fn eq(&self, other: &Self) -> bool {
        self.faces == other.faces && self.face_definitions == other.face_definitions
    }
}

impl Eq for Classifications {}

#[cfg(test)]
mod tests {
    use super::*;

    // "git checkout -b main"
    fn sample() -> Classifications {
        let mut c = Classifications::new(20);
        c.add_command(&[0..3, 4..12, 13..15, 16..20]);
        c
    }

    fn faces(c: &Classifications) -> &str {
        std::str::from_utf8(c.faces()).unwrap()
    }

    #[test]
    fn codes_parse() {
        assert_eq!(WordClass::parse_code("c"), (WordClass::Command, false));
        assert_eq!(WordClass::parse_code("mc"), (WordClass::Command, true));
        assert_eq!(WordClass::parse_code("md"), (WordClass::Doskey, true));
        assert_eq!(WordClass::parse_code("x"), (WordClass::Executable, false));
        assert_eq!(WordClass::parse_code("z"), (WordClass::Other, false));
        assert_eq!(WordClass::parse_code(""), (WordClass::Other, false));
        assert_eq!(WordClass::parse_code("m"), (WordClass::Other, true));
    }

    #[test]
    fn sample_line_faces() {
        let mut c = sample();
        c.classify_code(0, "mc", true).unwrap();
        c.classify_code(1, "a", true).unwrap();
        c.classify_code(2, "f", true).unwrap();
        c.finish(false);
        assert_eq!(faces(&c), "ccc aaaaaaaa ff     ");
        assert_eq!(c.face_at(19), b' ');
        assert_eq!(c.face_at(100), b' ');
    }

    #[test]
    fn argmatcher_marking() {
        let mut c = sample();
        c.classify_code(0, "mc", true).unwrap();
        // `m` only applies to the command word.
        c.classify_code(1, "ma", true).unwrap();
        c.finish(true);
        assert_eq!(&faces(&c)[..12], "mmm aaaaaaaa");
    }

    #[test]
    fn overwrite_rules() {
        let mut c = sample();
        c.classify_word(1, WordClass::Arg, true).unwrap();
        c.classify_word(1, WordClass::Flag, false).unwrap();
        assert_eq!(c.word_class(1), Some(WordClass::Arg));
        c.classify_word(1, WordClass::Flag, true).unwrap();
        assert_eq!(c.word_class(1), Some(WordClass::Flag));
        assert!(!c.is_word_classified(3));
    }

    #[test]
    fn applied_faces_take_precedence() {
        let mut c = sample();
        c.classify_word(3, WordClass::Arg, true).unwrap();
        let face = c.ensure_face("7").unwrap();
        assert_eq!(face, 128);
        assert_eq!(c.ensure_face("7"), Some(128));
        assert_eq!(c.face_output(face), Some("7"));
        assert_eq!(c.face_output(b'a'), None);

        c.apply_face(16, 2, face, true);
        c.apply_face(17, 10, b'n', false);
        c.finish(false);
        assert_eq!(&c.faces()[16..], &[128, 128, b'n', b'n']);
    }

    #[test]
    fn out_of_bounds_index() {
        let mut c = sample();
        let err = c.classify_word(4, WordClass::Arg, true).unwrap_err();
        assert!(matches!(err, ClassifyError::WordIndexOutOfBounds { index: 4, words: 4 }));
        c.set_word_has_argmatcher(9);
    }

    #[test]
    fn recognition_classes() {
        assert_eq!(Recognition::Recognized.word_class(), Some(WordClass::Executable));
        assert_eq!(Recognition::NotRecognized.word_class(), Some(WordClass::Unrecognized));
        assert_eq!(Recognition::Directory.word_class(), Some(WordClass::Other));
        assert_eq!(Recognition::Unknown.word_class(), None);
    }

    #[test]
    fn equality_ignores_word_info() {
        let mut a = sample();
        let mut b = Classifications::new(20);
        a.apply_face(0, 3, b'c', true);
        b.apply_face(0, 3, b'c', true);
        assert_eq!(a, b);
        b.ensure_face("1");
        assert_ne!(a, b);
    }
}
