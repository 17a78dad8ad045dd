//! progress: one-way progress signal (row index, total rows).
//!
//! Fire-and-forget: report() ничего не возвращает и не может прервать материализацию.

use log::info;
use std::cell::Cell;

pub trait ProgressSink {
    fn report(&self, row: usize, total: usize);
}

/// Discards every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _row: usize, _total: usize) {}
}

impl<F: Fn(usize, usize)> ProgressSink for F {
    fn report(&self, row: usize, total: usize) {
        self(row, total)
    }
}

/// Logs at `info` each time progress crosses another `step_pct` percent.
pub struct LogProgress {
    label: String,
    step_pct: u32,
    last: Cell<Option<u32>>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>, step_pct: u32) -> Self {
        Self {
            label: label.into(),
            step_pct: step_pct.clamp(1, 100),
            last: Cell::new(None),
        }
    }

    /// Percent value to log for this report, if any.
    fn next_mark(&self, row: usize, total: usize) -> Option<u32> {
        if total == 0 {
            return None;
        }
        let pct = ((row as u128 * 100) / total as u128).min(100) as u32;
        let mark = pct - pct % self.step_pct;
        match self.last.get() {
            Some(prev) if prev >= mark => None,
            _ => {
                self.last.set(Some(mark));
                Some(mark)
            }
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new("materialize", 1)
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, row: usize, total: usize) {
        if let Some(pct) = self.next_mark(row, total) {
            info!("{}: {:3}% ({}/{})", self.label, pct, row, total);
        }
    }
}
