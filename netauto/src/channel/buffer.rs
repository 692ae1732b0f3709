//! Accumulating output buffer with tail-only prompt search.
//!
//! Prompts always sit at the end of device output, so only the last
//! `search_depth` bytes are scanned. Large outputs (full routing tables,
//! running configs) stay cheap to match against.

use regex::bytes::Regex;

/// Buffer for device output, searched from the tail.
#[derive(Debug)]
pub struct PatternBuffer {
    buffer: Vec<u8>,
    search_depth: usize,
}

impl PatternBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
        }
    }

    /// Append data with ANSI escape sequences removed.
    pub fn extend(&mut self, data: &[u8]) {
        let cleaned = strip_ansi_escapes::strip(data);
        self.buffer.extend_from_slice(&cleaned);
    }

    fn tail_start(&self) -> usize {
        self.buffer.len().saturating_sub(self.search_depth)
    }

    /// Whether the tail of the buffer matches `pattern`.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.buffer[self.tail_start()..])
    }

    /// Absolute offset of the last match of `pattern` in the tail.
    pub fn last_match_in_tail(&self, pattern: &Regex) -> Option<(usize, usize)> {
        let start = self.tail_start();
        pattern
            .find_iter(&self.buffer[start..])
            .last()
            .map(|m| (start + m.start(), start + m.end()))
    }

    /// Take the buffer contents, leaving it empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
