//! teardown: ordered, best-effort release of everything a `Files` context owns.
//!
//! Порядок фиксирован: bands -> bounds (если есть) -> скретч-буферы -> labels ->
//! флаги -> merge token. Ошибка одного шага попадает в отчёт и не останавливает
//! следующие. Повторный вызов безопасен: всё уже освобождённое даёт AlreadyReleased.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

use crate::files::Files;
use crate::metrics::record_teardown_step;
use crate::pager::PagedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TeardownStep {
    BandsStore,
    BoundsStore,
    ScratchBuffers,
    LabelStore,
    Flags,
    MergeToken,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeardownStep::BandsStore => "bands store",
            TeardownStep::BoundsStore => "bounds store",
            TeardownStep::ScratchBuffers => "scratch buffers",
            TeardownStep::LabelStore => "label store",
            TeardownStep::Flags => "flag sets",
            TeardownStep::MergeToken => "merge token",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Released,
    /// Resource was never configured.
    Skipped,
    AlreadyReleased,
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub steps: Vec<(TeardownStep, StepOutcome)>,
    /// Count returned by the merge token, if it was released in this call.
    pub links_released: Option<usize>,
}

impl TeardownReport {
    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn failures(&self) -> Vec<(TeardownStep, &str)> {
        self.steps
            .iter()
            .filter_map(|(s, o)| match o {
                StepOutcome::Failed(msg) => Some((*s, msg.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Turn failed steps into one error.
    pub fn ensure_clean(&self) -> Result<()> {
        let fails = self.failures();
        if fails.is_empty() {
            return Ok(());
        }
        let list: Vec<String> = fails.iter().map(|(s, m)| format!("{}: {}", s, m)).collect();
        Err(anyhow!("teardown failed: {}", list.join("; ")))
    }
}

/// Release every resource of `files` in the fixed order.
pub fn close_files(files: &mut Files) -> TeardownReport {
    let mut report = TeardownReport::default();

    run_step(&mut report, TeardownStep::BandsStore, || close_store(&mut files.bands));

    run_step(&mut report, TeardownStep::BoundsStore, || match files.bounds.as_mut() {
        Some(b) => close_store(b),
        None => Ok(StepOutcome::Skipped),
    });

    run_step(&mut report, TeardownStep::ScratchBuffers, || {
        let a = files.bands_val.take();
        let b = files.second_val.take();
        Ok(if a.is_none() && b.is_none() {
            StepOutcome::AlreadyReleased
        } else {
            StepOutcome::Released
        })
    });

    run_step(&mut report, TeardownStep::LabelStore, || close_store(&mut files.labels));

    run_step(&mut report, TeardownStep::Flags, || {
        // без short-circuit: уничтожаем все три
        let destroyed = [
            files.null_flag.destroy(),
            files.candidate_flag.destroy(),
            files.seeds_flag.destroy(),
        ];
        Ok(if destroyed.iter().any(|d| *d) {
            StepOutcome::Released
        } else {
            StepOutcome::AlreadyReleased
        })
    });

    let mut links = None;
    run_step(&mut report, TeardownStep::MergeToken, || match files.token.take() {
        None => Ok(StepOutcome::Skipped),
        Some(tok) if tok.is_released() => Ok(StepOutcome::AlreadyReleased),
        Some(tok) => {
            let n = tok.release()?;
            links = Some(n);
            Ok(StepOutcome::Released)
        }
    });
    report.links_released = links;

    if report.is_clean() {
        debug!("teardown: done, {} step(s)", report.steps.len());
    } else {
        warn!("teardown: {} step(s) failed", report.failures().len());
    }
    report
}

fn close_store(store: &mut PagedStore) -> Result<StepOutcome> {
    Ok(if store.close()? {
        StepOutcome::Released
    } else {
        StepOutcome::AlreadyReleased
    })
}

fn run_step<F>(report: &mut TeardownReport, step: TeardownStep, f: F)
where
    F: FnOnce() -> Result<StepOutcome>,
{
    debug!("teardown: {} ...", step);
    let outcome = match f() {
        Ok(o) => o,
        Err(e) => {
            warn!("teardown: {} failed: {:#}", step, e);
            StepOutcome::Failed(format!("{:#}", e))
        }
    };
    debug!("teardown: {} -> {:?}", step, outcome);
    record_teardown_step(matches!(outcome, StepOutcome::Failed(_)));
    report.steps.push((step, outcome));
}
