//! output/materialize: stream paged stores into the final rasters.
//!
//! Порядок: check_extent/check_outputs -> flush(bands, labels) -> открыть writers ->
//! построчный проход -> finish всех растров -> commit -> color table -> history.
//! Цвета и history пишутся только после того, как все строки легли на диск. Любая
//! ошибка после первого commit удаляет уже появившиеся .sgr/.colr/.hist.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::ColorRange;
use crate::consts::CELL_NULL;
use crate::files::Files;
use crate::metrics::record_rows_materialized;
use crate::progress::{LogProgress, ProgressSink};

use super::colors::ColorTable;
use super::history::History;
use super::raster::{CellType, RasterWriter};

/// What one materialization produced.
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub rows: u32,
    pub cols: u32,
    pub output: PathBuf,
    pub mean_output: Option<PathBuf>,
    pub colors: PathBuf,
    pub history: PathBuf,
    pub null_cells: u64,
    /// Largest label seen outside the excluded set.
    pub max_label: Option<i32>,
    pub color_seed: u64,
}

/// Materialize with progress logged at `info`.
pub fn materialize(files: &mut Files) -> Result<OutputReport> {
    write_output(files, &LogProgress::default())
}

pub fn write_output(files: &mut Files, progress: &dyn ProgressSink) -> Result<OutputReport> {
    // Несовпадение геометрии: до создания любых файлов
    files.check_extent()?;
    files.check_outputs()?;
    if files.bands_val.is_none() {
        return Err(anyhow!("files context already torn down"));
    }

    files.bands.flush()?;
    files.labels.flush()?;

    let rows = files.rows;
    let cols = files.cols;
    let compress = files.cfg.raster_compress;

    let mut out = RasterWriter::create(
        &files.out_dir,
        &files.out_name,
        CellType::Cell,
        rows,
        cols,
        compress,
    )?;
    let mut mean = match files.mean_name.as_deref() {
        Some(name) => Some(RasterWriter::create(
            &files.out_dir,
            name,
            CellType::DCell,
            rows,
            cols,
            compress,
        )?),
        None => None,
    };
    debug!(
        "materialize: {}x{} -> <{}>{}",
        rows,
        cols,
        files.out_name,
        files
            .mean_name
            .as_deref()
            .map(|m| format!(" + mean <{}>", m))
            .unwrap_or_default()
    );

    let mut out_row = vec![CELL_NULL; cols as usize];
    let mut mean_row = vec![f64::NAN; if mean.is_some() { cols as usize } else { 0 }];
    let mut null_cells = 0u64;
    let mut max_label: Option<i32> = None;

    for row in 0..rows {
        out_row.fill(CELL_NULL);
        mean_row.fill(f64::NAN);

        for col in 0..cols {
            let c = col as usize;
            let bands_val = files
                .bands_val
                .as_mut()
                .ok_or_else(|| anyhow!("band scratch buffer released"))?;
            // Чтение каналов безусловное, вне проверки маски
            files.bands.get_f64s(row, col, bands_val)?;

            if files.null_flag.get(row, col)? {
                null_cells += 1;
                continue;
            }
            let label = files.labels.get_i32(row, col)?;
            out_row[c] = label;
            if label != CELL_NULL {
                max_label = Some(max_label.map_or(label, |m| m.max(label)));
            }
            if mean.is_some() {
                mean_row[c] = bands_val[0];
            }
        }

        out.put_row_i32(&out_row)?;
        if let Some(w) = mean.as_mut() {
            w.put_row_f64(&mean_row)?;
        }
        progress.report(row as usize, rows as usize);
    }

    // Оба растра целиком на диске до первого rename
    out.finish()?;
    if let Some(w) = mean.as_mut() {
        w.finish()?;
    }

    let output = out.commit()?;
    let mean_output = match mean.take().map(RasterWriter::commit).transpose() {
        Ok(p) => p,
        Err(e) => {
            discard_outputs(&[output]);
            return Err(e);
        }
    };

    let (colors, color_seed, history) = match stamp_output(files, max_label) {
        Ok(v) => v,
        Err(e) => {
            // Растр без цветов/history не считается готовым
            let mut partial = vec![output];
            partial.extend(mean_output);
            partial.push(ColorTable::path_for(&files.out_dir, &files.out_name));
            partial.push(History::path_for(&files.out_dir, &files.out_name));
            discard_outputs(&partial);
            return Err(e);
        }
    };

    record_rows_materialized(rows as u64, null_cells);
    info!(
        "materialize: wrote <{}> {}x{} ({} null cells, max label {:?}){}",
        files.out_name,
        rows,
        cols,
        null_cells,
        max_label,
        mean_output
            .as_ref()
            .map(|p| format!(", mean {}", p.display()))
            .unwrap_or_default()
    );

    Ok(OutputReport {
        rows,
        cols,
        output,
        mean_output,
        colors,
        history,
        null_cells,
        max_label,
        color_seed,
    })
}

fn discard_outputs(paths: &[PathBuf]) {
    for p in paths.iter().filter(|p| p.is_file()) {
        if let Err(e) = std::fs::remove_file(p) {
            warn!("materialize: failed to remove {}: {}", p.display(), e);
        }
    }
}

/// Upper bound of the color table range.
fn color_max(files: &Files, max_label: Option<i32>) -> i32 {
    match files.cfg.color_range {
        ColorRange::Observed => max_label.unwrap_or(1).max(1),
        ColorRange::Pixels => {
            let n = files.rows as u64 * files.cols as u64;
            n.clamp(1, i32::MAX as u64) as i32
        }
    }
}

fn stamp_output(files: &Files, max_label: Option<i32>) -> Result<(PathBuf, u64, PathBuf)> {
    let max = color_max(files, max_label);
    let table = match files.cfg.color_seed {
        Some(seed) => ColorTable::random(1, max, seed)?,
        None => ColorTable::random_unseeded(1, max)?,
    };
    let colors = table.write(&files.out_dir, &files.out_name)?;

    let mut hist = History::short(&files.out_name, "raster");
    hist.command(&files.command_line);
    if let Some(m) = files.mean_name.as_deref() {
        hist.add_comment(format!("mean of band 1: <{}>", m));
    }
    let history = hist.write(&files.out_dir)?;
    Ok((colors, table.seed, history))
}
