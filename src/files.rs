//! files: Files context: aggregate root of one segmentation run.
//!
//! Владеет всеми PagedStore (каналы, метки, опционально границы), тремя FlagSet,
//! скретч-буферами одной ячейки и ссылкой на MergeToken. Создаётся один раз в начале
//! конвейера (FilesBuilder), передаётся по `&mut` в материализацию и закрывается
//! ровно один раз через `teardown::close_files`.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SegConfig;
use crate::flags::FlagSet;
use crate::link::MergeToken;
use crate::output::raster::{raster_path, validate_map_name};
use crate::pager::PagedStore;

pub struct Files {
    pub rows: u32,
    pub cols: u32,
    pub nbands: usize,

    /// Band values, `nbands` x f64 per cell.
    pub bands: PagedStore,
    /// Current segment label per pixel, i32 per cell.
    pub labels: PagedStore,
    /// Optional boundary/constraint values, i32 per cell.
    pub bounds: Option<PagedStore>,

    pub null_flag: FlagSet,
    pub candidate_flag: FlagSet,
    pub seeds_flag: FlagSet,

    // Скретч одной ячейки; None после teardown.
    pub bands_val: Option<Vec<f64>>,
    pub second_val: Option<Vec<f64>>,

    pub token: Option<Arc<dyn MergeToken>>,

    pub out_name: String,
    /// Mean-output raster name; None disables that output.
    pub mean_name: Option<String>,
    pub out_dir: PathBuf,
    pub overwrite: bool,
    pub command_line: Vec<String>,

    pub cfg: SegConfig,
}

impl Files {
    pub fn builder() -> FilesBuilder {
        FilesBuilder::new()
    }

    #[inline]
    pub fn has_bounds(&self) -> bool {
        self.bounds.is_some()
    }

    /// Every store and flag set must cover exactly rows x cols, with the
    /// expected cell sizes.
    pub fn check_extent(&self) -> Result<()> {
        let want = (self.rows, self.cols);
        let mut stores: Vec<(&str, &PagedStore, usize)> = vec![
            ("bands", &self.bands, self.nbands * 8),
            ("labels", &self.labels, 4),
        ];
        if let Some(b) = self.bounds.as_ref() {
            stores.push(("bounds", b, 4));
        }
        for (what, s, cell) in stores {
            if (s.rows(), s.cols()) != want {
                return Err(anyhow!(
                    "{} store is {}x{}, expected {}x{}",
                    what,
                    s.rows(),
                    s.cols(),
                    want.0,
                    want.1
                ));
            }
            if s.cell_size() != cell {
                return Err(anyhow!(
                    "{} store has {}-byte cells, expected {}",
                    what,
                    s.cell_size(),
                    cell
                ));
            }
        }
        for (what, f) in [
            ("null", &self.null_flag),
            ("candidate", &self.candidate_flag),
            ("seeds", &self.seeds_flag),
        ] {
            if (f.rows(), f.cols()) != want {
                return Err(anyhow!(
                    "{} flags are {}x{}, expected {}x{}",
                    what,
                    f.rows(),
                    f.cols(),
                    want.0,
                    want.1
                ));
            }
        }
        Ok(())
    }

    /// Output names are legal and, unless overwriting, not taken yet.
    pub fn check_outputs(&self) -> Result<()> {
        validate_map_name(&self.out_name)?;
        if let Some(m) = self.mean_name.as_deref() {
            validate_map_name(m)?;
            if m == self.out_name {
                return Err(anyhow!("mean output must differ from output <{}>", m));
            }
        }
        if !self.overwrite {
            for name in std::iter::once(self.out_name.as_str()).chain(self.mean_name.as_deref()) {
                let p = raster_path(&self.out_dir, name);
                if p.exists() {
                    return Err(anyhow!(
                        "raster <{}> already exists at {} (use overwrite)",
                        name,
                        p.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Assembles a `Files` context; `build()` validates extents and outputs.
pub struct FilesBuilder {
    bands: Option<PagedStore>,
    labels: Option<PagedStore>,
    bounds: Option<PagedStore>,
    null_flag: Option<FlagSet>,
    candidate_flag: Option<FlagSet>,
    seeds_flag: Option<FlagSet>,
    token: Option<Arc<dyn MergeToken>>,
    out_name: Option<String>,
    mean_name: Option<String>,
    out_dir: PathBuf,
    overwrite: bool,
    command_line: Option<Vec<String>>,
    cfg: SegConfig,
}

impl Default for FilesBuilder {
    fn default() -> Self {
        Self {
            bands: None,
            labels: None,
            bounds: None,
            null_flag: None,
            candidate_flag: None,
            seeds_flag: None,
            token: None,
            out_name: None,
            mean_name: None,
            out_dir: PathBuf::from("."),
            overwrite: false,
            command_line: None,
            cfg: SegConfig::default(),
        }
    }
}

impl FilesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bands(mut self, store: PagedStore) -> Self {
        self.bands = Some(store);
        self
    }

    pub fn labels(mut self, store: PagedStore) -> Self {
        self.labels = Some(store);
        self
    }

    pub fn bounds(mut self, store: Option<PagedStore>) -> Self {
        self.bounds = store;
        self
    }

    pub fn null_flag(mut self, f: FlagSet) -> Self {
        self.null_flag = Some(f);
        self
    }

    pub fn candidate_flag(mut self, f: FlagSet) -> Self {
        self.candidate_flag = Some(f);
        self
    }

    pub fn seeds_flag(mut self, f: FlagSet) -> Self {
        self.seeds_flag = Some(f);
        self
    }

    pub fn token(mut self, token: Arc<dyn MergeToken>) -> Self {
        self.token = Some(token);
        self
    }

    pub fn output<S: Into<String>>(mut self, name: S) -> Self {
        self.out_name = Some(name.into());
        self
    }

    pub fn mean_output<S: Into<String>>(mut self, name: Option<S>) -> Self {
        self.mean_name = name.map(Into::into);
        self
    }

    pub fn out_dir(mut self, dir: &Path) -> Self {
        self.out_dir = dir.to_path_buf();
        self
    }

    pub fn overwrite(mut self, on: bool) -> Self {
        self.overwrite = on;
        self
    }

    /// Defaults to the process arguments.
    pub fn command_line(mut self, args: Vec<String>) -> Self {
        self.command_line = Some(args);
        self
    }

    pub fn config(mut self, cfg: SegConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn build(self) -> Result<Files> {
        let labels = self.labels.ok_or_else(|| anyhow!("label store is required"))?;
        let bands = self.bands.ok_or_else(|| anyhow!("band-value store is required"))?;
        let out_name = self.out_name.ok_or_else(|| anyhow!("output raster name is required"))?;

        let rows = labels.rows();
        let cols = labels.cols();
        let cs = bands.cell_size();
        if cs == 0 || cs % 8 != 0 {
            return Err(anyhow!(
                "band store cell size {} is not a whole number of f64 values",
                cs
            ));
        }
        let nbands = cs / 8;

        let files = Files {
            rows,
            cols,
            nbands,
            bands,
            labels,
            bounds: self.bounds,
            null_flag: self.null_flag.unwrap_or_else(|| FlagSet::new(rows, cols)),
            candidate_flag: self.candidate_flag.unwrap_or_else(|| FlagSet::new(rows, cols)),
            seeds_flag: self.seeds_flag.unwrap_or_else(|| FlagSet::new(rows, cols)),
            bands_val: Some(vec![0.0; nbands]),
            second_val: Some(vec![0.0; nbands]),
            token: self.token,
            out_name,
            mean_name: self.mean_name,
            out_dir: self.out_dir,
            overwrite: self.overwrite,
            command_line: self
                .command_line
                .unwrap_or_else(|| std::env::args().collect()),
            cfg: self.cfg,
        };
        files.check_extent()?;
        files.check_outputs()?;
        Ok(files)
    }
}
