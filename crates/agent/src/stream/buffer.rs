//! Accumulates raw fragments and releases only text that can no longer
//! change meaning when the next fragment arrives.

/// A FIFO text buffer with a held-back tail.
///
/// The buffer never drops or duplicates input: every byte passed to
/// [`append`](Self::append) is returned exactly once, either by
/// [`drain_stable`](Self::drain_stable) or by the final
/// [`flush_all`](Self::flush_all).
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    pending: String,
    bytes_appended: usize,
    bytes_returned: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw fragment.
    pub fn append(&mut self, fragment: &str) {
        self.bytes_appended += fragment.len();
        self.pending.push_str(fragment);
    }

    /// Return everything except the last `reserve_tail` characters and
    /// remove it from the buffer.
    ///
    /// When fewer than `reserve_tail` characters are buffered nothing is
    /// returned.
    pub fn drain_stable(&mut self, reserve_tail: usize) -> String {
        let split = if reserve_tail == 0 {
            self.pending.len()
        } else {
            match self.pending.char_indices().rev().nth(reserve_tail - 1) {
                Some((idx, _)) => idx,
                None => 0,
            }
        };

        let stable: String = self.pending.drain(..split).collect();
        self.bytes_returned += stable.len();
        stable
    }

    /// Return the whole buffer, reserved tail included, and clear it.
    pub fn flush_all(&mut self) -> String {
        let all = std::mem::take(&mut self.pending);
        self.bytes_returned += all.len();
        all
    }

    /// Text currently held back.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn bytes_appended(&self) -> usize {
        self.bytes_appended
    }

    pub fn bytes_returned(&self) -> usize {
        self.bytes_returned
    }
}
