//! Bounded rolling log written by a running service and drained by pollers.
//!
//! Capacity is fixed at construction and never exceeded; writes evict the
//! oldest entry instead of blocking. One service task writes while UI/CLI
//! pollers flush concurrently, so the ring sits behind a mutex. The lock
//! is never held across an await point.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One captured line of service output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub message: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct OutputBuffer {
    ring: Mutex<VecDeque<OutputEntry>>,
    capacity: usize,
}

pub const DEFAULT_CAPACITY: usize = 100;

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OutputBuffer {
    /// Zero capacities are rejected during config validation; a stray
    /// zero here is clamped to 1 rather than panicking.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write(&self, message: impl Into<String>) {
        let entry = OutputEntry {
            message: message.into(),
            captured_at: Utc::now(),
        };
        let mut ring = self.ring.lock().expect("output buffer lock poisoned");
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    pub fn writelines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.write(line);
        }
    }

    /// Drains the buffer, returning entries most-recent-first. An empty
    /// buffer yields an empty Vec.
    pub fn flush(&self) -> Vec<OutputEntry> {
        let mut ring = self.ring.lock().expect("output buffer lock poisoned");
        let mut entries: Vec<OutputEntry> = ring.drain(..).collect();
        entries.reverse();
        entries
    }

    pub fn len(&self) -> usize {
        self.ring.lock().expect("output buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn full(&self) -> bool {
        self.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_newest_at_capacity() {
        let buf = OutputBuffer::new(3);
        for i in 0..7 {
            buf.write(format!("line-{i}"));
        }
        assert!(buf.full());

        let entries = buf.flush();
        assert_eq!(entries.len(), 3);
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        // Most recent first.
        assert_eq!(messages, vec!["line-6", "line-5", "line-4"]);
    }

    #[test]
    fn flush_drains() {
        let buf = OutputBuffer::new(4);
        buf.writelines(["a", "b"]);
        assert_eq!(buf.flush().len(), 2);
        assert!(buf.is_empty());
        assert!(buf.flush().is_empty());
    }

    #[test]
    fn zero_capacity_does_not_panic() {
        let buf = OutputBuffer::new(0);
        buf.write("a");
        buf.write("b");
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.flush()[0].message, "b");
    }

    #[test]
    fn write_never_grows_past_capacity() {
        let buf = OutputBuffer::new(1);
        buf.write("first");
        buf.write("second");
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.flush()[0].message, "second");
    }
}
