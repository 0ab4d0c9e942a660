//! Bounded, numbered log of past input lines.

use std::io::{self, Write};

/// How many lines [`History`] retains.
pub const HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity circular buffer addressed by lifetime sequence numbers.
///
/// The n-th value ever pushed gets sequence number `n` (starting at 1). Only the most recent
/// `capacity` values stay resident; older ones are evicted for good.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<Option<T>>,
    cursor: usize,
    lifetime: usize,
}

impl<T> Ring<T> {
    /// Create an empty ring. A zero capacity is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            cursor: 0,
            lifetime: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total number of values ever pushed.
    pub fn lifetime(&self) -> usize {
        self.lifetime
    }

    /// Number of resident values, `min(lifetime, capacity)`.
    pub fn len(&self) -> usize {
        self.lifetime.min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.lifetime == 0
    }

    /// Store `value` under the next sequence number, returning the evicted value if any.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = self.slots[self.cursor].replace(value);
        self.cursor = (self.cursor + 1) % self.capacity();
        self.lifetime += 1;
        evicted
    }

    /// Whether `seq` lies in `(lifetime - len, lifetime]`.
    pub fn is_resident(&self, seq: usize) -> bool {
        seq > self.lifetime - self.len() && seq <= self.lifetime
    }

    pub fn get(&self, seq: usize) -> Option<&T> {
        if !self.is_resident(seq) {
            return None;
        }
        // Sequence number s was written into slot (s - 1) % capacity.
        self.slots[(seq - 1) % self.capacity()].as_ref()
    }

    /// Resident values with their sequence numbers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let first = self.lifetime - self.len() + 1;
        (first..=self.lifetime).filter_map(move |seq| self.get(seq).map(|v| (seq, v)))
    }
}

/// The session's command history: a [`Ring`] of lines with capacity [`HISTORY_CAPACITY`].
#[derive(Debug, Clone)]
pub struct History {
    lines: Ring<String>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            lines: Ring::with_capacity(HISTORY_CAPACITY),
        }
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a copy of `line`, evicting the oldest entry once the buffer is full.
    pub fn add(&mut self, line: &str) {
        if let Some(old) = self.lines.push(line.to_string()) {
            tracing::trace!(evicted = %old, "history slot reused");
        }
    }

    /// Text stored for sequence number `n`, if it is still resident.
    pub fn lookup(&self, n: usize) -> Option<&str> {
        self.lines.get(n).map(String::as_str)
    }

    pub fn lifetime_count(&self) -> usize {
        self.lines.lifetime()
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lines.iter().map(|(n, s)| (n, s.as_str()))
    }

    /// Write the resident entries, oldest first, as `"<n> <line>"`.
    pub fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        for (n, line) in self.entries() {
            writeln!(out, "{} {}", n, line)?;
        }
        Ok(())
    }
}
