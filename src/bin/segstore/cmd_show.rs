use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use SegStore::output::raster::{is_null_cell, CellType, RasterReader};

pub fn exec(raster: PathBuf, json: bool) -> Result<()> {
    let mut r = RasterReader::open(&raster)?;

    match r.cell_type {
        CellType::Cell => {
            let rows = r.read_all_i32()?;
            if json {
                // null -> JSON null
                let cells: Vec<Vec<Option<i32>>> = rows
                    .iter()
                    .map(|row| row.iter().map(|v| (!is_null_cell(*v)).then_some(*v)).collect())
                    .collect();
                let obj = json!({
                    "cell_type": r.cell_type,
                    "rows": r.rows,
                    "cols": r.cols,
                    "compressed": r.compressed,
                    "cells": cells,
                });
                println!("{}", serde_json::to_string_pretty(&obj)?);
            } else {
                print_header(&r);
                for row in rows {
                    let line: Vec<String> = row
                        .iter()
                        .map(|v| if is_null_cell(*v) { "*".to_string() } else { v.to_string() })
                        .collect();
                    println!("{}", line.join(" "));
                }
            }
        }
        CellType::DCell => {
            let rows = r.read_all_f64()?;
            if json {
                let cells: Vec<Vec<Option<f64>>> = rows
                    .iter()
                    .map(|row| row.iter().map(|v| (!v.is_nan()).then_some(*v)).collect())
                    .collect();
                let obj = json!({
                    "cell_type": r.cell_type,
                    "rows": r.rows,
                    "cols": r.cols,
                    "compressed": r.compressed,
                    "cells": cells,
                });
                println!("{}", serde_json::to_string_pretty(&obj)?);
            } else {
                print_header(&r);
                for row in rows {
                    let line: Vec<String> = row
                        .iter()
                        .map(|v| if v.is_nan() { "*".to_string() } else { v.to_string() })
                        .collect();
                    println!("{}", line.join(" "));
                }
            }
        }
    }
    Ok(())
}

fn print_header(r: &RasterReader) {
    println!(
        "# {:?} {}x{} compressed={}",
        r.cell_type, r.rows, r.cols, r.compressed
    );
}
