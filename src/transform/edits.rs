// src/transform/edits.rs
//! Offset-based edit buffer
//!
//! Rewrites never move original text; they only insert around it or replace
//! short operator spans. Edits at the same offset are ordered so that
//! wrappers nest correctly:
//!
//! ```text
//! closes (innermost first) → replacements → points → opens (outermost first)
//! ```

use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Close(Reverse<usize>),
    Replace,
    Point,
    Open(usize),
}

#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    slot: Slot,
    seq: usize,
    text: String,
}

#[derive(Debug, Default)]
pub(crate) struct EditBuffer {
    edits: Vec<Edit>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text opening a wrapper around a node at nesting `depth`
    pub fn open(&mut self, at: usize, depth: usize, text: impl Into<String>) {
        self.push(at, at, Slot::Open(depth), text.into());
    }

    /// Text closing a wrapper around a node at nesting `depth`
    pub fn close(&mut self, at: usize, depth: usize, text: impl Into<String>) {
        self.push(at, at, Slot::Close(Reverse(depth)), text.into());
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.push(at, at, Slot::Point, text.into());
    }

    pub fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.push(start, end.max(start), Slot::Replace, text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn push(&mut self, start: usize, end: usize, slot: Slot, text: String) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            start,
            end,
            slot,
            seq,
            text,
        });
    }

    /// Produce the rewritten source
    ///
    /// Edits starting inside an already replaced span are dropped.
    pub fn apply(mut self, source: &str) -> String {
        self.edits
            .sort_by(|a, b| (a.start, a.slot, a.seq).cmp(&(b.start, b.slot, b.seq)));

        let extra: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(source.len() + extra);
        let mut cursor = 0;

        for edit in &self.edits {
            if edit.start < cursor || edit.end > source.len() {
                continue;
            }
            out.push_str(&source[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }

        out.push_str(&source[cursor..]);
        out
    }
}
