//! Trigger queue.
//!
//! Every entry point into the rule engine is serialized through one bounded
//! single-producer/single-consumer queue:
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌──────────────┐
//! │ Timer tick       │────▶│               │     │              │
//! │ Telemetry decode │────▶│ TriggerQueue  │────▶│  Main loop   │
//! │ Web / console    │────▶│  (lock-free)  │     │ RuleService  │
//! └──────────────────┘     └───────────────┘     └──────────────┘
//! ```
//!
//! Producers that live on other tasks funnel through one forwarding task, so
//! the queue only ever sees one writer and one reader.

use heapless::spsc::{Consumer, Producer, Queue};
use log::warn;

use crate::app::commands::Trigger;

/// Backing array size.  One slot stays free, so 31 triggers fit.
pub const TRIGGER_QUEUE_CAP: usize = 32;

pub struct TriggerQueue {
    queue: Queue<Trigger, TRIGGER_QUEUE_CAP>,
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerQueue {
    pub const fn new() -> Self {
        Self { queue: Queue::new() }
    }

    /// Split into the writer half (timer / decoder / web side) and the reader
    /// half (main loop).
    pub fn split(&mut self) -> (TriggerProducer<'_>, TriggerConsumer<'_>) {
        let (producer, consumer) = self.queue.split();
        (
            TriggerProducer {
                inner: producer,
                dropped: 0,
            },
            TriggerConsumer { inner: consumer },
        )
    }
}

pub struct TriggerProducer<'q> {
    inner: Producer<'q, Trigger, TRIGGER_QUEUE_CAP>,
    dropped: u32,
}

impl TriggerProducer<'_> {
    /// Queue a trigger.  Returns `false` (and counts the drop) if full.
    pub fn push(&mut self, trigger: Trigger) -> bool {
        match self.inner.enqueue(trigger) {
            Ok(()) => true,
            Err(t) => {
                self.dropped = self.dropped.wrapping_add(1);
                warn!("TriggerQueue: full, dropped {:?}", t);
                false
            }
        }
    }

    /// Triggers lost to a full queue since start.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

pub struct TriggerConsumer<'q> {
    inner: Consumer<'q, Trigger, TRIGGER_QUEUE_CAP>,
}

impl TriggerConsumer<'_> {
    pub fn pop(&mut self) -> Option<Trigger> {
        self.inner.dequeue()
    }

    /// Hand every pending trigger to `handler`, in FIFO order.
    pub fn drain(&mut self, mut handler: impl FnMut(Trigger)) {
        while let Some(trigger) = self.pop() {
            handler(trigger);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
