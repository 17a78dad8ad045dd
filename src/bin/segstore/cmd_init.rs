use anyhow::Result;
use std::path::PathBuf;

use SegStore::config::SegConfig;
use SegStore::workspace::Workspace;

pub fn exec(path: PathBuf, rows: u32, cols: u32, bands: usize, bounds: bool) -> Result<()> {
    let cfg = SegConfig::from_env();
    let mut ws = Workspace::init(&path, rows, cols, bands, bounds, &cfg)?;
    ws.flush()?;
    println!(
        "Initialized workspace at {} ({}x{}, {} band(s), bounds={})",
        path.display(),
        rows,
        cols,
        bands,
        bounds
    );
    Ok(())
}
