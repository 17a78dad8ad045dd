//! pager/core: структура PagedStore, create()/open() и геометрия страниц.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::config::SegConfig;
use crate::consts::{SEGMENT_SIZE, SEG_FILE_EXT, SEG_FILE_PREFIX};
use crate::meta::{read_meta, write_meta_new, StoreMeta};

use super::cache::PageCache;

/// External-memory 2-D array of fixed-size cells.
///
/// The grid is cut into `tile_rows x tile_cols` tiles, one tile per page.
/// Pages live in segment files under `root`; a bounded LRU cache keeps the
/// hot ones in memory and writes dirty pages back on eviction and on `flush()`.
///
/// Single writer, then many readers: после `flush()` любой PagedStore, открытый
/// на том же каталоге позже, видит последние `put`. Уже открытый экземпляр может
/// держать в кэше старые страницы: для него нужен `refresh()`.
pub struct PagedStore {
    pub root: PathBuf,
    pub meta: StoreMeta,
    // None = кэш выключен (write-through).
    pub(crate) cache: Option<PageCache>,
    pub(crate) cache_cap: usize,
    pub(crate) data_fsync: bool,
    pub(crate) page_checksum: bool,
    pub(crate) closed: bool,
    // meta.clean_shutdown=false уже записан с момента последнего flush
    pub(crate) dirty_marked: bool,
    // сегменты, записанные с последнего flush (для fsync)
    pub(crate) touched_segs: BTreeSet<u64>,
    // буфер одной ячейки для типизированных обёрток
    pub(crate) cell_buf: Vec<u8>,
}

impl PagedStore {
    /// Create a new store under `root` (directory is created if missing).
    /// All pages are pre-allocated as zero-filled (sparse) segment space.
    pub fn create(root: &Path, rows: u32, cols: u32, cell_size: u32, cfg: &SegConfig) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create store dir {}", root.display()))?;

        let meta = StoreMeta::new(rows, cols, cell_size, cfg.tile_rows, cfg.tile_cols);
        meta.validate()?;
        write_meta_new(root, &meta)?;

        let store = Self::from_meta(root, meta, cfg);
        store.allocate_all()?;
        debug!(
            "paged store created at {}: {}x{} cells of {} B, tile {}x{}, {} page(s)",
            root.display(),
            rows,
            cols,
            cell_size,
            store.meta.tile_rows,
            store.meta.tile_cols,
            store.meta.page_count()
        );
        Ok(store)
    }

    /// Open an existing store. Tile geometry comes from the store meta, not from `cfg`.
    pub fn open(root: &Path, cfg: &SegConfig) -> Result<Self> {
        let meta = read_meta(root)?;
        if !meta.clean_shutdown {
            warn!(
                "paged store {} was not flushed after its last put; unflushed cells are lost",
                root.display()
            );
        }
        Ok(Self::from_meta(root, meta, cfg))
    }

    fn from_meta(root: &Path, meta: StoreMeta, cfg: &SegConfig) -> Self {
        let cache_cap = cfg.page_cache_pages;
        let cache = if cache_cap > 0 { Some(PageCache::new(cache_cap)) } else { None };
        let cell_buf = vec![0u8; meta.cell_size as usize];
        Self {
            root: root.to_path_buf(),
            meta,
            cache,
            cache_cap,
            data_fsync: cfg.data_fsync,
            page_checksum: cfg.page_checksum,
            closed: false,
            dirty_marked: false,
            touched_segs: BTreeSet::new(),
            cell_buf,
        }
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.meta.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.meta.cols
    }

    #[inline]
    pub fn cell_size(&self) -> usize {
        self.meta.cell_size as usize
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Configured cache capacity in pages (0 = write-through).
    pub fn cache_capacity(&self) -> usize {
        self.cache_cap
    }

    /// Pages currently held in memory.
    pub fn cached_pages(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    // ---------------- internal helpers ----------------

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(anyhow!("paged store {} is closed", self.root.display()));
        }
        Ok(())
    }

    /// (row, col) -> (page_id, байтовое смещение ячейки внутри payload страницы).
    pub(crate) fn cell_addr(&self, row: u32, col: u32) -> Result<(u64, usize)> {
        if row >= self.meta.rows || col >= self.meta.cols {
            return Err(anyhow!(
                "cell ({}, {}) out of range {}x{} in store {}",
                row,
                col,
                self.meta.rows,
                self.meta.cols,
                self.root.display()
            ));
        }
        let tr = self.meta.tile_rows;
        let tc = self.meta.tile_cols;
        let page_id = (row / tr) as u64 * self.meta.tiles_across() as u64 + (col / tc) as u64;
        let idx = (row % tr) as usize * tc as usize + (col % tc) as usize;
        Ok((page_id, idx * self.cell_size()))
    }

    /// Сколько страниц помещается в один сегмент.
    pub(crate) fn pages_per_seg(&self) -> u64 {
        (SEGMENT_SIZE / self.meta.page_size() as u64).max(1)
    }

    /// page_id -> (номер сегмента, смещение внутри сегмента).
    pub(crate) fn locate(&self, page_id: u64) -> (u64, u64) {
        let pps = self.pages_per_seg();
        let seg_no = (page_id / pps) + 1;
        let off_in_seg = (page_id % pps) * self.meta.page_size() as u64;
        (seg_no, off_in_seg)
    }

    pub(crate) fn seg_path(&self, seg_no: u64) -> PathBuf {
        self.root
            .join(format!("{}{:06}.{}", SEG_FILE_PREFIX, seg_no, SEG_FILE_EXT))
    }

    pub(crate) fn open_seg_rw(&self, seg_no: u64, create: bool) -> Result<std::fs::File> {
        let path = self.seg_path(seg_no);
        let mut opts = OpenOptions::new();
        opts.read(true).write(true);
        if create {
            opts.create(true);
        }
        opts.open(&path)
            .with_context(|| format!("open segment {}", path.display()))
    }

    /// Растянуть сегменты под все страницы (один set_len на сегмент).
    fn allocate_all(&self) -> Result<()> {
        let total = self.meta.page_count();
        let mut need_per_seg: BTreeMap<u64, u64> = BTreeMap::new();
        for pid in 0..total {
            let (seg_no, off) = self.locate(pid);
            let need_len = off + self.meta.page_size() as u64;
            need_per_seg
                .entry(seg_no)
                .and_modify(|mx| *mx = (*mx).max(need_len))
                .or_insert(need_len);
        }

        for (seg_no, need_len) in need_per_seg {
            let f = self.open_seg_rw(seg_no, true)?;
            let cur_len = f.metadata()?.len();
            if cur_len < need_len {
                f.set_len(need_len)
                    .with_context(|| format!("extend segment {}", self.seg_path(seg_no).display()))?;
                if self.data_fsync {
                    f.sync_all()?;
                }
            }
        }
        Ok(())
    }
}
