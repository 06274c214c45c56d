//! Rule timer queue.
//!
//! Backs the `setTimer()` rule function.  The main loop advances the queue
//! once per second and drains expired entries into
//! [`Trigger::Timer`](crate::app::commands::Trigger) values; the engine then
//! runs the rule named `timer=<id>`.
//!
//! ```text
//!  setTimer(3, 60) ──▶ TimerQueue::insert ──(60 s)──▶ pop() ──▶ Trigger::Timer(3)
//!                                                              │
//!                                                              ▼
//!                                                   on timer=3 then … end
//! ```

use log::{debug, warn};

use crate::app::ports::{ExpiredTimer, TimerPort};

/// Maximum number of armed timers (stack-allocated).
pub const MAX_TIMERS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    id: u32,
    /// Absolute queue time (seconds) at which the entry expires.
    due: u64,
    /// Re-arm interval for repeating timers.
    interval: u32,
    repeat: bool,
}

/// Fixed-capacity queue of armed rule timers.
pub struct TimerQueue {
    entries: heapless::Vec<TimerEntry, MAX_TIMERS>,
    now_secs: u64,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
            now_secs: 0,
        }
    }

    /// Move queue time forward.
    pub fn advance(&mut self, secs: u32) {
        self.now_secs = self.now_secs.saturating_add(u64::from(secs));
    }

    pub fn now_secs(&self) -> u64 {
        self.now_secs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

impl TimerPort for TimerQueue {
    fn insert(&mut self, delay_secs: u32, repeat: bool, id: u32) -> bool {
        if let Some(pos) = self.position(id) {
            self.entries.swap_remove(pos);
        }
        let entry = TimerEntry {
            id,
            due: self.now_secs + u64::from(delay_secs),
            interval: delay_secs,
            // A zero interval would re-fire forever within one drain.
            repeat: repeat && delay_secs > 0,
        };
        if self.entries.push(entry).is_err() {
            warn!("TimerQueue: full, timer {} dropped", id);
            return false;
        }
        debug!("TimerQueue: timer {} armed for {}s", id, delay_secs);
        true
    }

    fn pop(&mut self) -> Option<ExpiredTimer> {
        let now = self.now_secs;
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| e.due)
            .map(|(i, _)| i)?;

        let mut entry = self.entries.swap_remove(pos);
        if entry.repeat {
            entry.due += u64::from(entry.interval);
            // Capacity was just freed by the removal.
            let _ = self.entries.push(entry);
        }
        Some(ExpiredTimer {
            id: entry.id,
            repeat: entry.repeat,
        })
    }

    fn remaining(&self, id: u32) -> Option<u32> {
        let entry = self.entries.iter().find(|e| e.id == id)?;
        let left = entry.due.saturating_sub(self.now_secs);
        Some(u32::try_from(left).unwrap_or(u32::MAX))
    }

    fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("TimerQueue: cleared {} timers", self.entries.len());
        }
        self.entries.clear();
    }
}
