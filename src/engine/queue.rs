//! Bounded wait queue for runs that found the pool saturated.

use std::collections::VecDeque;

use crate::task::Task;

/// A run waiting for a slot. Callers wait on the gate's in-flight table,
/// keyed by `run_id`, not on the entry itself.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub run_id: u64,
    pub task: Task,
    pub is_manual: bool,
}

pub struct RunQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl RunQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append an entry, handing it back when the queue is full.
    pub fn push(&mut self, entry: QueueEntry) -> Result<(), QueueEntry> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// The oldest manual entry if any, otherwise the oldest entry.
    ///
    /// Background entries can starve under a steady stream of manual ones.
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        match self.entries.iter().position(|e| e.is_manual) {
            Some(idx) => self.entries.remove(idx),
            None => self.entries.pop_front(),
        }
    }

    /// Mark a waiting run as manual so it is taken ahead of background
    /// entries. Returns false when the run is not queued.
    pub fn promote(&mut self, run_id: u64) -> bool {
        match self.entries.iter_mut().find(|e| e.run_id == run_id) {
            Some(entry) => {
                entry.is_manual = true;
                true
            }
            None => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every waiting entry.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }
}
