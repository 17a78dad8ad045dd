use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI рабочего пространства сегментации: ввод пикселей, материализация, просмотр.
#[derive(Parser, Debug)]
#[command(name = "segstore", version, about = "SegStore CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create a workspace (bands/, labels/, optional bounds/, null.flags)
    Init {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        rows: u32,
        #[arg(long)]
        cols: u32,
        /// Number of f64 band values per pixel
        #[arg(long, default_value_t = 1)]
        bands: usize,
        /// Also create the boundary store
        #[arg(long, default_value_t = false)]
        bounds: bool,
    },
    /// Write one pixel (label + band values), optionally marking it excluded
    Put {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        row: u32,
        #[arg(long)]
        col: u32,
        #[arg(long, allow_hyphen_values = true)]
        label: i32,
        /// Comma-separated band values, e.g. 5,0.25
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        bands: Vec<f64>,
        /// Mark the pixel as excluded (no-data in outputs)
        #[arg(long, default_value_t = false)]
        null: bool,
    },
    /// Write the label raster (and optional mean raster), then release the workspace
    Materialize {
        #[arg(long)]
        path: PathBuf,
        /// Output raster name
        #[arg(long)]
        output: String,
        /// Mean-of-band-1 raster name (disabled when absent)
        #[arg(long)]
        mean: Option<String>,
        /// Directory for rasters; defaults to the workspace
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Replace existing rasters of the same name
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print a produced raster
    Show {
        #[arg(long)]
        raster: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print workspace geometry and store meta
    Status {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
