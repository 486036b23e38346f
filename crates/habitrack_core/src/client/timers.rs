//! Single-shot timer queue driven by the session event loop.

use std::collections::BTreeMap;

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Timers ordered by due time, then scheduling order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(i64, TimerId), T>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: i64, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert((due_ms, id), task);
        id
    }

    /// Returns the task if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let key = self.entries.keys().find(|(_, entry_id)| *entry_id == id).copied()?;
        self.entries.remove(&key)
    }

    /// Removes and returns every task due at or before `now_ms`, in order.
    pub fn pop_due(&mut self, now_ms: i64) -> Vec<T> {
        let later = self.entries.split_off(&(now_ms.saturating_add(1), TimerId(0)));
        let due = std::mem::replace(&mut self.entries, later);
        due.into_values().collect()
    }

    pub fn next_due(&self) -> Option<i64> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
