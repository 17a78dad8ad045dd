//! Lightweight global metrics for SegStore.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Page cache (hits/misses/evictions)
//! - Paged store I/O (write-backs, flush)
//! - Output materialization (rows)
//! - Teardown (steps run / failed)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Page cache -----
static PAGE_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static PAGE_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static PAGE_CACHE_EVICTIONS: AtomicU64 = AtomicU64::new(0);

// ----- Store I/O -----
static PAGES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static STORE_FLUSHES: AtomicU64 = AtomicU64::new(0);

// ----- Output -----
static ROWS_MATERIALIZED: AtomicU64 = AtomicU64::new(0);
static NULL_CELLS_WRITTEN: AtomicU64 = AtomicU64::new(0);

// ----- Teardown -----
static TEARDOWN_STEPS: AtomicU64 = AtomicU64::new(0);
static TEARDOWN_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub page_cache_hits: u64,
    pub page_cache_misses: u64,
    pub page_cache_evictions: u64,

    pub pages_written: u64,
    pub store_flushes: u64,

    pub rows_materialized: u64,
    pub null_cells_written: u64,

    pub teardown_steps: u64,
    pub teardown_failures: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.page_cache_hits + self.page_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.page_cache_hits as f64 / total as f64
        }
    }
}

// ----- Recorders (Page cache) -----
pub fn record_cache_hit() {
    PAGE_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_miss() {
    PAGE_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_eviction() {
    PAGE_CACHE_EVICTIONS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Store I/O) -----
pub fn record_page_written() {
    PAGES_WRITTEN.fetch_add(1, Ordering::Relaxed);
}
pub fn record_store_flush() {
    STORE_FLUSHES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Output) -----
pub fn record_rows_materialized(rows: u64, null_cells: u64) {
    ROWS_MATERIALIZED.fetch_add(rows, Ordering::Relaxed);
    NULL_CELLS_WRITTEN.fetch_add(null_cells, Ordering::Relaxed);
}

// ----- Recorders (Teardown) -----
pub fn record_teardown_step(failed: bool) {
    TEARDOWN_STEPS.fetch_add(1, Ordering::Relaxed);
    if failed {
        TEARDOWN_FAILURES.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        page_cache_hits: PAGE_CACHE_HITS.load(Ordering::Relaxed),
        page_cache_misses: PAGE_CACHE_MISSES.load(Ordering::Relaxed),
        page_cache_evictions: PAGE_CACHE_EVICTIONS.load(Ordering::Relaxed),
        pages_written: PAGES_WRITTEN.load(Ordering::Relaxed),
        store_flushes: STORE_FLUSHES.load(Ordering::Relaxed),
        rows_materialized: ROWS_MATERIALIZED.load(Ordering::Relaxed),
        null_cells_written: NULL_CELLS_WRITTEN.load(Ordering::Relaxed),
        teardown_steps: TEARDOWN_STEPS.load(Ordering::Relaxed),
        teardown_failures: TEARDOWN_FAILURES.load(Ordering::Relaxed),
    }
}

pub fn metrics_reset() {
    for c in [
        &PAGE_CACHE_HITS,
        &PAGE_CACHE_MISSES,
        &PAGE_CACHE_EVICTIONS,
        &PAGES_WRITTEN,
        &STORE_FLUSHES,
        &ROWS_MATERIALIZED,
        &NULL_CELLS_WRITTEN,
        &TEARDOWN_STEPS,
        &TEARDOWN_FAILURES,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}
