//! Page-based linear arena for short-lived strings.
//!
//! Strings are appended to the current page and never freed individually;
//! `reset` drops everything at once. Handles are plain indices, so they stay
//! `Copy` and never borrow the arena.

use tracing::debug;

/// Index handle to a string stored in a [`LinearArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaStr {
    page: u32,
    start: u32,
    len: u32,
}

impl ArenaStr {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
pub struct LinearArena {
    pages: Vec<String>,
    /// Page currently receiving small allocations.
    current: Option<usize>,
    page_size: usize,
    max_pages: usize,
}

impl LinearArena {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            pages: Vec::new(),
            current: None,
            page_size,
            max_pages,
        }
    }

    /// Copy `s` into the arena. Returns `None` when the page budget is spent.
    pub fn store(&mut self, s: &str) -> Option<ArenaStr> {
        if s.len() > self.page_size {
            // Oversized strings get a dedicated page; the current page keeps
            // receiving small allocations.
            let page = self.new_page(s.len())?;
            return Some(self.push(page, s));
        }

        let page = match self.current {
            Some(idx) if self.fits(idx, s.len()) => idx,
            _ => {
                let idx = self.new_page(self.page_size)?;
                self.current = Some(idx);
                idx
            }
        };
        Some(self.push(page, s))
    }

    pub fn get(&self, handle: ArenaStr) -> &str {
        let start = handle.start as usize;
        &self.pages[handle.page as usize][start..start + handle.len as usize]
    }

    /// Drop every stored string. Handles issued before the reset are invalid.
    pub fn reset(&mut self) {
        if !self.pages.is_empty() {
            debug!(pages = self.pages.len(), "arena reset");
        }
        self.pages.clear();
        self.current = None;
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn fits(&self, page: usize, len: usize) -> bool {
        let p = &self.pages[page];
        p.capacity() - p.len() >= len
    }

    fn new_page(&mut self, capacity: usize) -> Option<usize> {
        if self.pages.len() >= self.max_pages {
            return None;
        }
        self.pages.push(String::with_capacity(capacity));
        Some(self.pages.len() - 1)
    }

    fn push(&mut self, page: usize, s: &str) -> ArenaStr {
        let buf = &mut self.pages[page];
        let start = buf.len();
        buf.push_str(s);
        ArenaStr {
            page: page as u32,
            start: start as u32,
            len: s.len() as u32,
        }
    }
}
