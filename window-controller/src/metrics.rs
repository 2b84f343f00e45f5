// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Default)]
struct HydrationMetricsInner {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    chunks_dispatched: AtomicU64,
    chunks_failed: AtomicU64,
    chunks_discarded: AtomicU64,
    rows_hydrated: AtomicU64,
    ids_orphaned: AtomicU64,
    ids_capped: AtomicU64,
    window_growths: AtomicU64,
    fetch_latency_total_ns: AtomicU64,
    fetch_latency_samples: AtomicU64,
    fetch_latency_max_ns: AtomicU64,
    fetch_inflight: AtomicI64,
}

/// Counters for the hydration driver. Cheap to clone; clones share counters.
#[derive(Clone, Default)]
pub struct HydrationMetrics {
    inner: Arc<HydrationMetricsInner>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HydrationMetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub chunks_dispatched: u64,
    pub chunks_failed: u64,
    /// Chunks whose results arrived after the ledger was replaced.
    pub chunks_discarded: u64,
    pub rows_hydrated: u64,
    pub ids_orphaned: u64,
    pub ids_capped: u64,
    pub window_growths: u64,
    pub fetch_inflight: i64,
    pub fetch_latency_ms_avg: f64,
    pub fetch_latency_ms_max: f64,
}

impl HydrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle_started(&self) {
        self.inner.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self) {
        self.inner.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_growth(&self) {
        self.inner.window_growths.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.inner.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner.fetch_inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_success(&self, hydrated: usize, orphaned: usize, elapsed: Duration) {
        if hydrated > 0 {
            self.inner
                .rows_hydrated
                .fetch_add(hydrated as u64, Ordering::Relaxed);
        }
        self.record_orphans(orphaned);
        self.observe_latency(elapsed);
        self.finish_inflight();
    }

    pub fn record_chunk_failure(&self, orphaned: usize, elapsed: Duration) {
        self.inner.chunks_failed.fetch_add(1, Ordering::Relaxed);
        self.record_orphans(orphaned);
        self.observe_latency(elapsed);
        self.finish_inflight();
    }

    pub fn record_chunk_discarded(&self) {
        self.inner.chunks_discarded.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn record_capped(&self, count: usize) {
        if count > 0 {
            self.inner
                .ids_capped
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> HydrationMetricsSnapshot {
        let total_ns = self.inner.fetch_latency_total_ns.load(Ordering::Relaxed);
        let samples = self.inner.fetch_latency_samples.load(Ordering::Relaxed);
        let max_ns = self.inner.fetch_latency_max_ns.load(Ordering::Relaxed);
        let avg_ms = if samples == 0 {
            0.0
        } else {
            (total_ns as f64 / samples as f64) / 1_000_000.0
        };
        HydrationMetricsSnapshot {
            cycles_started: self.inner.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.inner.cycles_completed.load(Ordering::Relaxed),
            chunks_dispatched: self.inner.chunks_dispatched.load(Ordering::Relaxed),
            chunks_failed: self.inner.chunks_failed.load(Ordering::Relaxed),
            chunks_discarded: self.inner.chunks_discarded.load(Ordering::Relaxed),
            rows_hydrated: self.inner.rows_hydrated.load(Ordering::Relaxed),
            ids_orphaned: self.inner.ids_orphaned.load(Ordering::Relaxed),
            ids_capped: self.inner.ids_capped.load(Ordering::Relaxed),
            window_growths: self.inner.window_growths.load(Ordering::Relaxed),
            fetch_inflight: self.inner.fetch_inflight.load(Ordering::Relaxed),
            fetch_latency_ms_avg: avg_ms,
            fetch_latency_ms_max: max_ns as f64 / 1_000_000.0,
        }
    }

    fn record_orphans(&self, count: usize) {
        if count > 0 {
            self.inner
                .ids_orphaned
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    fn observe_latency(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.inner
            .fetch_latency_total_ns
            .fetch_add(nanos, Ordering::Relaxed);
        self.inner
            .fetch_latency_samples
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .fetch_latency_max_ns
            .fetch_max(nanos, Ordering::Relaxed);
    }

    fn finish_inflight(&self) {
        self.inner.fetch_inflight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_inflight_and_latency() {
        let metrics = HydrationMetrics::new();
        metrics.record_dispatch();
        metrics.record_dispatch();
        assert_eq!(metrics.snapshot().fetch_inflight, 2);
        metrics.record_chunk_success(90, 10, Duration::from_millis(20));
        metrics.record_chunk_failure(100, Duration::from_millis(40));
        let snap = metrics.snapshot();
        assert_eq!(snap.fetch_inflight, 0);
        assert_eq!(snap.rows_hydrated, 90);
        assert_eq!(snap.ids_orphaned, 110);
        assert_eq!(snap.chunks_failed, 1);
        assert!((snap.fetch_latency_ms_avg - 30.0).abs() < 1e-6);
        assert!((snap.fetch_latency_ms_max - 40.0).abs() < 1e-6);
    }
}
