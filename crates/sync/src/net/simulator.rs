use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Impairments applied to one direction of a link.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    /// 0..=100.
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkConditions {
    pub fn latency(ms: u32) -> Self {
        Self {
            min_latency_ms: ms,
            max_latency_ms: ms,
            ..Default::default()
        }
    }

    pub fn with_loss(mut self, loss_percent: f32) -> Self {
        self.loss_percent = loss_percent;
        self
    }

    pub fn with_jitter(mut self, jitter_ms: u32) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn is_ideal(&self) -> bool {
        self.loss_percent <= 0.0 && self.max_latency_ms == 0 && self.jitter_ms == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

#[derive(Debug)]
struct DelayedPacket<T> {
    release_ms: f64,
    order: u64,
    payload: T,
}

impl<T> PartialEq for DelayedPacket<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for DelayedPacket<T> {}

impl<T> PartialOrd for DelayedPacket<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DelayedPacket<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_ms
            .total_cmp(&self.release_ms)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Lossy, delaying, reordering link driven by a caller-supplied clock. The
/// same seed and the same call sequence always produce the same deliveries.
#[derive(Debug)]
pub struct NetworkSimulator<T> {
    conditions: LinkConditions,
    rng: StdRng,
    queue: BinaryHeap<DelayedPacket<T>>,
    next_order: u64,
    stats: SimulatorStats,
}

impl<T> NetworkSimulator<T> {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: StdRng::seed_from_u64(seed),
            queue: BinaryHeap::new(),
            next_order: 0,
            stats: SimulatorStats::default(),
        }
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    pub fn should_drop(&mut self) -> bool {
        let loss = self.conditions.loss_percent;
        loss > 0.0 && self.rng.gen_range(0.0f32..100.0) < loss
    }

    pub fn delay_ms(&mut self) -> u32 {
        let min = self.conditions.min_latency_ms;
        let max = self.conditions.max_latency_ms.max(min);
        let base = self.rng.gen_range(min..=max);
        let jitter = match self.conditions.jitter_ms {
            0 => 0,
            j => self.rng.gen_range(0..=j),
        };
        base + jitter
    }

    /// Returns false when the payload was dropped.
    pub fn send(&mut self, payload: T, now_ms: f64) -> bool {
        self.stats.sent += 1;
        if self.should_drop() {
            self.stats.dropped += 1;
            return false;
        }

        let release_ms = now_ms + self.delay_ms() as f64;
        self.queue.push(DelayedPacket {
            release_ms,
            order: self.next_order,
            payload,
        });
        self.next_order += 1;
        true
    }

    /// Everything due at `now_ms`, earliest release first.
    pub fn deliver(&mut self, now_ms: f64) -> Vec<T> {
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|p| p.release_ms <= now_ms) {
            if let Some(delayed) = self.queue.pop() {
                due.push(delayed.payload);
            }
        }
        self.stats.delivered += due.len() as u64;
        due
    }

    pub fn next_release_ms(&self) -> Option<f64> {
        self.queue.peek().map(|p| p.release_ms)
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }
}
