use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use SegStore::flags::FlagSet;
use SegStore::meta::{read_meta, StoreMeta};
use SegStore::workspace::Workspace;

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let labels = read_meta(&Workspace::labels_dir(&path))?;
    let bands = read_meta(&Workspace::bands_dir(&path))?;
    let bounds_dir = Workspace::bounds_dir(&path);
    let bounds = if bounds_dir.exists() {
        Some(read_meta(&bounds_dir)?)
    } else {
        None
    };
    let nulls = FlagSet::load(&Workspace::null_flags_path(&path))?.count_set()?;

    if json {
        let store = |m: &StoreMeta| {
            json!({
                "rows": m.rows,
                "cols": m.cols,
                "cell_size": m.cell_size,
                "tile_rows": m.tile_rows,
                "tile_cols": m.tile_cols,
                "page_size": m.page_size(),
                "pages": m.page_count(),
                "clean_shutdown": m.clean_shutdown,
            })
        };
        let obj = json!({
            "path": path.display().to_string(),
            "rows": labels.rows,
            "cols": labels.cols,
            "bands": bands.cell_size / 8,
            "null_cells": nulls,
            "labels": store(&labels),
            "band_values": store(&bands),
            "bounds": bounds.as_ref().map(store),
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("SegStore status at {}", path.display());
    println!("  extent        = {}x{}", labels.rows, labels.cols);
    println!("  bands         = {}", bands.cell_size / 8);
    println!("  null cells    = {}", nulls);
    print_store("labels", &labels);
    print_store("bands", &bands);
    match bounds.as_ref() {
        Some(m) => print_store("bounds", m),
        None => println!("  bounds        = (none)"),
    }
    Ok(())
}

fn print_store(name: &str, m: &StoreMeta) {
    println!(
        "  {:<13} = cell {} B, tile {}x{}, {} page(s) of {} B, clean_shutdown={}",
        name,
        m.cell_size,
        m.tile_rows,
        m.tile_cols,
        m.page_count(),
        m.page_size(),
        m.clean_shutdown
    );
}
