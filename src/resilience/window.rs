//! Bucketed rolling counters for circuit breaker accounting.
//!
//! The window spans `rolling_count_timeout` and is split into
//! `rolling_count_buckets` buckets. Buckets are created on demand and dropped
//! once they fall out of the span; nothing runs on a timer.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one call as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    Rejected,
}

/// Event counters, used both per bucket and for lifetime totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejects: u64,
    pub fallbacks: u64,
}

impl Counters {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure => self.failures += 1,
            Outcome::Timeout => self.timeouts += 1,
            Outcome::Rejected => self.rejects += 1,
        }
    }

    /// Calls that actually executed.
    pub fn volume(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Application failures and timeouts together.
    pub fn errors(&self) -> u64 {
        self.failures + self.timeouts
    }

    /// Error percentage over executed calls, 0 when nothing executed.
    pub fn error_percentage(&self) -> u32 {
        let volume = self.volume();
        if volume == 0 {
            return 0;
        }
        ((self.errors() * 100) / volume) as u32
    }

    fn merge(&mut self, other: &Counters) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.rejects += other.rejects;
        self.fallbacks += other.fallbacks;
    }
}

#[derive(Debug)]
struct Bucket {
    started_at: Instant,
    counts: Counters,
}

#[derive(Debug)]
pub struct RollingWindow {
    span: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    pub fn new(span: Duration, bucket_count: u32) -> Self {
        let bucket_count = bucket_count.max(1);
        let bucket_width = (span / bucket_count).max(Duration::from_millis(1));
        Self {
            span,
            bucket_width,
            buckets: VecDeque::with_capacity(bucket_count as usize),
        }
    }

    /// Drop buckets whose start lies a full span or more in the past.
    fn rotate(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started_at) >= self.span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&mut self, now: Instant) -> &mut Counters {
        self.rotate(now);
        let needs_bucket = match self.buckets.back() {
            Some(back) => now.duration_since(back.started_at) >= self.bucket_width,
            None => true,
        };
        if needs_bucket {
            self.buckets.push_back(Bucket {
                started_at: now,
                counts: Counters::default(),
            });
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last].counts
    }

    pub fn record(&mut self, now: Instant, outcome: Outcome) {
        self.current(now).record(outcome);
    }

    pub fn record_fallback(&mut self, now: Instant) {
        self.current(now).fallbacks += 1;
    }

    /// Sum of all live buckets.
    pub fn totals(&mut self, now: Instant) -> Counters {
        self.rotate(now);
        let mut totals = Counters::default();
        for bucket in &self.buckets {
            totals.merge(&bucket.counts);
        }
        totals
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_old_buckets_fall_out_of_window() {
        let mut window = RollingWindow::new(Duration::from_secs(10), 10);
        window.record(Instant::now(), Outcome::Failure);
        window.record(Instant::now(), Outcome::Failure);

        tokio::time::advance(Duration::from_secs(5)).await;
        window.record(Instant::now(), Outcome::Success);
        assert_eq!(window.totals(Instant::now()).volume(), 3);

        tokio::time::advance(Duration::from_secs(5)).await;
        let totals = window.totals(Instant::now());
        assert_eq!(totals.failures, 0);
        assert_eq!(totals.successes, 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(window.totals(Instant::now()).volume(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_within_one_bucket_share_it() {
        let mut window = RollingWindow::new(Duration::from_secs(10), 10);
        for _ in 0..5 {
            window.record(Instant::now(), Outcome::Success);
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert_eq!(window.buckets.len(), 1);
    }

    #[test]
    fn test_error_percentage_counts_timeouts() {
        let mut counters = Counters::default();
        counters.record(Outcome::Success);
        counters.record(Outcome::Failure);
        counters.record(Outcome::Timeout);
        counters.record(Outcome::Rejected);

        assert_eq!(counters.volume(), 3);
        assert_eq!(counters.error_percentage(), 66);
    }
}
