use anyhow::Result;
use std::path::PathBuf;

use SegStore::config::SegConfig;
use SegStore::workspace::Workspace;

pub fn exec(
    path: PathBuf,
    row: u32,
    col: u32,
    label: i32,
    bands: Vec<f64>,
    null: bool,
) -> Result<()> {
    let cfg = SegConfig::from_env();
    let mut ws = Workspace::open(&path, &cfg)?;
    ws.put_pixel(row, col, label, &bands, null)?;
    ws.flush()?;
    println!(
        "OK ({}, {}) label={} bands={:?}{}",
        row,
        col,
        label,
        bands,
        if null { " [null]" } else { "" }
    );
    Ok(())
}
