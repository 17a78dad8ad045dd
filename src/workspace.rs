//! workspace: on-disk layout of one run's inputs.
//!
//! ```text
//! <root>/
//!   bands/      PagedStore, nbands x f64 per cell
//!   labels/     PagedStore, i32 per cell
//!   bounds/     PagedStore, i32 per cell (optional)
//!   null.flags  FlagSet of excluded pixels
//! ```

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::config::SegConfig;
use crate::consts::{WS_BANDS_DIR, WS_BOUNDS_DIR, WS_LABELS_DIR, WS_NULL_FLAGS};
use crate::files::FilesBuilder;
use crate::flags::FlagSet;
use crate::pager::PagedStore;

pub struct Workspace {
    pub root: PathBuf,
    pub rows: u32,
    pub cols: u32,
    pub nbands: usize,
    pub bands: PagedStore,
    pub labels: PagedStore,
    pub bounds: Option<PagedStore>,
    pub null_flag: FlagSet,
}

impl Workspace {
    pub fn bands_dir(root: &Path) -> PathBuf {
        root.join(WS_BANDS_DIR)
    }

    pub fn labels_dir(root: &Path) -> PathBuf {
        root.join(WS_LABELS_DIR)
    }

    pub fn bounds_dir(root: &Path) -> PathBuf {
        root.join(WS_BOUNDS_DIR)
    }

    pub fn null_flags_path(root: &Path) -> PathBuf {
        root.join(WS_NULL_FLAGS)
    }

    /// Create an empty workspace. Fails if `root` already holds one.
    pub fn init(
        root: &Path,
        rows: u32,
        cols: u32,
        nbands: usize,
        with_bounds: bool,
        cfg: &SegConfig,
    ) -> Result<Self> {
        if nbands == 0 {
            return Err(anyhow!("workspace needs at least one band"));
        }
        if Self::labels_dir(root).exists() {
            return Err(anyhow!("workspace already exists at {}", root.display()));
        }
        std::fs::create_dir_all(root)
            .with_context(|| format!("create workspace dir {}", root.display()))?;

        let band_cell = u32::try_from(nbands * 8)
            .map_err(|_| anyhow!("too many bands: {}", nbands))?;
        let bands = PagedStore::create(&Self::bands_dir(root), rows, cols, band_cell, cfg)?;
        let labels = PagedStore::create(&Self::labels_dir(root), rows, cols, 4, cfg)?;
        let bounds = if with_bounds {
            Some(PagedStore::create(&Self::bounds_dir(root), rows, cols, 4, cfg)?)
        } else {
            None
        };
        let null_flag = FlagSet::new(rows, cols);
        null_flag.save(&Self::null_flags_path(root))?;

        info!(
            "workspace initialized at {}: {}x{}, {} band(s), bounds={}",
            root.display(),
            rows,
            cols,
            nbands,
            with_bounds
        );
        Ok(Self {
            root: root.to_path_buf(),
            rows,
            cols,
            nbands,
            bands,
            labels,
            bounds,
            null_flag,
        })
    }

    pub fn open(root: &Path, cfg: &SegConfig) -> Result<Self> {
        let labels = PagedStore::open(&Self::labels_dir(root), cfg)
            .with_context(|| format!("open workspace {}", root.display()))?;
        let bands = PagedStore::open(&Self::bands_dir(root), cfg)?;
        let bounds = if Self::bounds_dir(root).exists() {
            Some(PagedStore::open(&Self::bounds_dir(root), cfg)?)
        } else {
            None
        };
        let null_flag = FlagSet::load(&Self::null_flags_path(root))?;
        let nbands = bands.cell_size() / 8;
        debug!(
            "workspace opened at {}: {}x{}, {} band(s)",
            root.display(),
            labels.rows(),
            labels.cols(),
            nbands
        );
        Ok(Self {
            root: root.to_path_buf(),
            rows: labels.rows(),
            cols: labels.cols(),
            nbands,
            bands,
            labels,
            bounds,
            null_flag,
        })
    }

    #[inline]
    pub fn has_bounds(&self) -> bool {
        self.bounds.is_some()
    }

    /// Write one pixel: label, band values and the excluded flag.
    pub fn put_pixel(
        &mut self,
        row: u32,
        col: u32,
        label: i32,
        band_vals: &[f64],
        excluded: bool,
    ) -> Result<()> {
        if band_vals.len() != self.nbands {
            return Err(anyhow!(
                "pixel ({}, {}): {} band value(s), workspace has {}",
                row,
                col,
                band_vals.len(),
                self.nbands
            ));
        }
        self.labels.put_i32(row, col, label)?;
        self.bands.put_f64s(row, col, band_vals)?;
        if excluded {
            self.null_flag.set(row, col)?;
        } else {
            self.null_flag.unset(row, col)?;
        }
        Ok(())
    }

    /// Flush all stores and persist the excluded flags.
    pub fn flush(&mut self) -> Result<()> {
        self.bands.flush()?;
        self.labels.flush()?;
        if let Some(b) = self.bounds.as_mut() {
            b.flush()?;
        }
        self.null_flag.save(&Self::null_flags_path(&self.root))
    }

    /// Hand the stores over to a `FilesBuilder`. Candidate and seed flags start empty.
    pub fn into_builder(mut self, cfg: SegConfig) -> Result<FilesBuilder> {
        self.flush()?;
        let Workspace {
            root,
            rows,
            cols,
            bands,
            labels,
            bounds,
            null_flag,
            ..
        } = self;
        Ok(FilesBuilder::new()
            .bands(bands)
            .labels(labels)
            .bounds(bounds)
            .null_flag(null_flag)
            .candidate_flag(FlagSet::new(rows, cols))
            .seeds_flag(FlagSet::new(rows, cols))
            .out_dir(&root)
            .config(cfg))
    }
}
