//! output: final rasters, color tables and history records.

pub mod colors;
pub mod history;
pub mod materialize;
pub mod raster;

pub use colors::ColorTable;
pub use history::History;
pub use materialize::{materialize, write_output, OutputReport};
pub use raster::{CellType, RasterReader, RasterWriter};
