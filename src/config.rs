//! Centralized configuration for SegStore.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SegConfig::from_env() reads SEG_* variables on top of the defaults.
//! - Fluent with_* setters so tests and the CLI can override specific fields.
//!
//! Defaults:
//! - page_cache_pages = 64 (per store; 0 = write-through, no cache)
//! - tile 64x64 cells per page
//! - data_fsync = true (flush() must leave the store durable for any later reader)
//! - page_checksum = true (CRC32C trailer verified on read)
//! - raster_compress = true (zlib rows in output rasters)
//! - color_seed = None (random per run), color_range = Observed

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::consts::MAX_TILE_DIM;
use crate::util::env_flag;

/// How the random color table bounds its category range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorRange {
    /// `[1, max label seen during the scan]`.
    Observed,
    /// `[1, rows * cols]`: theoretical upper bound on the number of segments.
    Pixels,
}

impl FromStr for ColorRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observed" | "max" => Ok(ColorRange::Observed),
            "pixels" | "cells" => Ok(ColorRange::Pixels),
            other => Err(anyhow!("unknown color range '{}' (expected observed|pixels)", other)),
        }
    }
}

impl fmt::Display for ColorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorRange::Observed => write!(f, "observed"),
            ColorRange::Pixels => write!(f, "pixels"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SegConfig {
    /// Page cache size in pages, per store (0 disables).
    /// Env: SEG_PAGE_CACHE_PAGES (default 64)
    pub page_cache_pages: usize,

    /// Tile geometry of one page.
    /// Env: SEG_TILE_ROWS / SEG_TILE_COLS (default 64, at most MAX_TILE_DIM)
    pub tile_rows: u32,
    pub tile_cols: u32,

    /// fsync segment files on flush().
    /// Env: SEG_DATA_FSYNC (default true)
    pub data_fsync: bool,

    /// Verify CRC32C page trailers on read.
    /// Env: SEG_PAGE_CHECKSUM (default true)
    pub page_checksum: bool,

    /// zlib-compress output raster rows.
    /// Env: SEG_RASTER_COMPRESS (default true)
    pub raster_compress: bool,

    /// Fixed seed for the random color table. None = fresh seed per run.
    /// Env: SEG_COLOR_SEED
    pub color_seed: Option<u64>,

    /// Env: SEG_COLOR_RANGE = observed|pixels (default observed)
    pub color_range: ColorRange,
}

impl Default for SegConfig {
    fn default() -> Self {
        Self {
            page_cache_pages: 64,
            tile_rows: 64,
            tile_cols: 64,
            data_fsync: true,
            page_checksum: true,
            raster_compress: true,
            color_seed: None,
            color_range: ColorRange::Observed,
        }
    }
}

impl SegConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SEG_PAGE_CACHE_PAGES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.page_cache_pages = n;
            }
        }
        if let Ok(v) = std::env::var("SEG_TILE_ROWS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                if (1..=MAX_TILE_DIM).contains(&n) {
                    cfg.tile_rows = n;
                }
            }
        }
        if let Ok(v) = std::env::var("SEG_TILE_COLS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                if (1..=MAX_TILE_DIM).contains(&n) {
                    cfg.tile_cols = n;
                }
            }
        }
        if let Some(on) = env_flag("SEG_DATA_FSYNC") {
            cfg.data_fsync = on;
        }
        if let Some(on) = env_flag("SEG_PAGE_CHECKSUM") {
            cfg.page_checksum = on;
        }
        if let Some(on) = env_flag("SEG_RASTER_COMPRESS") {
            cfg.raster_compress = on;
        }
        if let Ok(v) = std::env::var("SEG_COLOR_SEED") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.color_seed = Some(n);
            }
        }
        if let Ok(v) = std::env::var("SEG_COLOR_RANGE") {
            if let Ok(r) = v.parse::<ColorRange>() {
                cfg.color_range = r;
            }
        }

        cfg
    }

    pub fn with_page_cache_pages(mut self, pages: usize) -> Self {
        self.page_cache_pages = pages;
        self
    }

    /// Each value is clamped to `1..=MAX_TILE_DIM`.
    pub fn with_tile(mut self, tile_rows: u32, tile_cols: u32) -> Self {
        self.tile_rows = tile_rows.clamp(1, MAX_TILE_DIM);
        self.tile_cols = tile_cols.clamp(1, MAX_TILE_DIM);
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn with_page_checksum(mut self, on: bool) -> Self {
        self.page_checksum = on;
        self
    }

    pub fn with_raster_compress(mut self, on: bool) -> Self {
        self.raster_compress = on;
        self
    }

    pub fn with_color_seed(mut self, seed: Option<u64>) -> Self {
        self.color_seed = seed;
        self
    }

    pub fn with_color_range(mut self, range: ColorRange) -> Self {
        self.color_range = range;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for SegConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SegConfig {{ \
             page_cache_pages: {}, \
             tile: {}x{}, \
             data_fsync: {}, \
             page_checksum: {}, \
             raster_compress: {}, \
             color_seed: {}, \
             color_range: {} \
             }}",
            self.page_cache_pages,
            self.tile_rows,
            self.tile_cols,
            self.data_fsync,
            self.page_checksum,
            self.raster_compress,
            self.color_seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "random".to_string()),
            self.color_range,
        )
    }
}
