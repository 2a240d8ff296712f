use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{CandidateSignal, Priority};
use tokio::sync::mpsc;

/// An admitted candidate waiting for downstream sizing/execution
#[derive(Debug, Clone)]
struct QueueEntry {
    candidate: CandidateSignal,
    priority: Priority,
    enqueued_at: DateTime<Utc>,
}

/// A candidate handed to the consumer, with its queue latency
#[derive(Debug, Clone)]
pub struct Delivery {
    pub candidate: CandidateSignal,
    pub priority: Priority,
    pub waited_ms: i64,
}

/// Depths and counters for reporting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub high_depth: usize,
    pub medium_depth: usize,
    pub dropped_high: u64,
    pub dropped_medium: u64,
    pub delivered: u64,
    pub total_wait_ms: i64,
}

impl QueueStats {
    pub fn avg_wait_ms(&self) -> f64 {
        if self.delivered == 0 {
            return 0.0;
        }
        self.total_wait_ms as f64 / self.delivered as f64
    }
}

/// Two bounded FIFO lists with strict priority: HIGH always drains before
/// MEDIUM. Enqueue past capacity drops the oldest entry in that list. With a
/// registered consumer the queue becomes a bounded hand-off: entries are
/// pushed to the consumer's channel on enqueue, and a backlogged consumer
/// sheds the newest delivery instead of growing without bound.
pub struct SignalQueue {
    high: VecDeque<QueueEntry>,
    medium: VecDeque<QueueEntry>,
    capacity: usize,
    stats: QueueStats,
    consumer: Option<mpsc::Sender<Delivery>>,
}

impl SignalQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            high: VecDeque::with_capacity(capacity),
            medium: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            stats: QueueStats::default(),
            consumer: None,
        }
    }

    /// Attach a consumer. Buffered entries are flushed to it immediately,
    /// HIGH first. The channel holds at most both lists' worth of entries.
    pub fn register_consumer(&mut self) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(self.capacity * 2);
        self.consumer = Some(tx);
        while let Some(delivery) = self.pop_next() {
            self.hand_off(delivery);
        }
        rx
    }

    pub fn enqueue(&mut self, candidate: CandidateSignal, priority: Priority) {
        let entry = QueueEntry {
            candidate,
            priority,
            enqueued_at: Utc::now(),
        };

        // Hand-off path: skip buffering while a consumer is attached
        if self.consumer.is_some() {
            let delivery = Self::to_delivery(entry);
            self.hand_off(delivery);
            return;
        }

        let (list, dropped) = match priority {
            Priority::High => (&mut self.high, &mut self.stats.dropped_high),
            Priority::Medium => (&mut self.medium, &mut self.stats.dropped_medium),
        };
        if list.len() >= self.capacity {
            if let Some(oldest) = list.pop_front() {
                *dropped += 1;
                tracing::warn!(
                    symbol = %oldest.candidate.symbol,
                    priority = priority.name(),
                    "Queue full, dropped oldest entry"
                );
            }
        }
        list.push_back(entry);
    }

    /// Take the next entry, HIGH before MEDIUM.
    pub fn dequeue(&mut self) -> Option<Delivery> {
        let delivery = self.pop_next()?;
        self.stats.delivered += 1;
        self.stats.total_wait_ms += delivery.waited_ms;
        Some(delivery)
    }

    /// Take up to `n` entries, still HIGH-first.
    pub fn dequeue_batch(&mut self, n: usize) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.dequeue() {
                Some(delivery) => out.push(delivery),
                None => break,
            }
        }
        out
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            high_depth: self.high.len(),
            medium_depth: self.medium.len(),
            ..self.stats
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty()
    }

    fn pop_next(&mut self) -> Option<Delivery> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .map(Self::to_delivery)
    }

    fn to_delivery(entry: QueueEntry) -> Delivery {
        let waited_ms = (Utc::now() - entry.enqueued_at).num_milliseconds();
        Delivery {
            candidate: entry.candidate,
            priority: entry.priority,
            waited_ms,
        }
    }

    fn hand_off(&mut self, delivery: Delivery) {
        let Some(tx) = &self.consumer else {
            return;
        };
        let waited_ms = delivery.waited_ms;
        match tx.try_send(delivery) {
            Ok(()) => {
                self.stats.delivered += 1;
                self.stats.total_wait_ms += waited_ms;
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                match dropped.priority {
                    Priority::High => self.stats.dropped_high += 1,
                    Priority::Medium => self.stats.dropped_medium += 1,
                }
                tracing::warn!(
                    symbol = %dropped.candidate.symbol,
                    priority = dropped.priority.name(),
                    "Consumer backlog full, dropped delivery"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Queue consumer dropped, reverting to buffered mode");
                self.consumer = None;
            }
        }
    }
}
