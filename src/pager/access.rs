//! pager/access: get/put/flush/close по ячейкам и типизированные обёртки.
//!
//! Правила:
//! - get/put работают через LRU-кэш страниц; промах читает страницу с диска,
//!   вытеснение грязной страницы сразу пишет её обратно.
//! - При cap=0 кэша нет: get читает страницу с диска, put делает read-modify-write.
//! - Первый put после flush ставит meta.clean_shutdown=false; flush возвращает true.
//! - close() идемпотентен: повторный вызов: no-op (Ok(false)).
//! - Кэш не следит за диском: чужой flush виден после refresh() или в новом open().
//! - Любая I/O ошибка фатальна и возвращается вызывающему коду.

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::meta::set_clean_shutdown;
use crate::metrics::{record_cache_eviction, record_cache_hit, record_cache_miss, record_store_flush};

use super::cache::PageCache;
use super::core::PagedStore;

impl PagedStore {
    /// Copy cell (row, col) into `out` (`out.len()` must equal the cell size).
    pub fn get(&mut self, row: u32, col: u32, out: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let cs = self.cell_size();
        if out.len() != cs {
            return Err(anyhow!("cell buffer size {} != cell_size {}", out.len(), cs));
        }
        let (pid, off) = self.cell_addr(row, col)?;

        if self.cache.is_none() {
            let mut page = vec![0u8; self.meta.page_size()];
            self.read_page_disk(pid, &mut page)?;
            out.copy_from_slice(&page[off..off + cs]);
            return Ok(());
        }

        self.ensure_cached(pid)?;
        let page = self
            .cache
            .as_mut()
            .and_then(|c| c.get(pid))
            .ok_or_else(|| anyhow!("page {} missing from cache after load", pid))?;
        out.copy_from_slice(&page[off..off + cs]);
        Ok(())
    }

    /// Write `cell` at (row, col). Durable only after `flush()`.
    pub fn put(&mut self, row: u32, col: u32, cell: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let cs = self.cell_size();
        if cell.len() != cs {
            return Err(anyhow!("cell buffer size {} != cell_size {}", cell.len(), cs));
        }
        let (pid, off) = self.cell_addr(row, col)?;
        self.mark_dirty_meta()?;

        if self.cache.is_none() {
            // write-through
            let mut page = vec![0u8; self.meta.page_size()];
            self.read_page_disk(pid, &mut page)?;
            page[off..off + cs].copy_from_slice(cell);
            return self.write_page_disk(pid, &mut page);
        }

        self.ensure_cached(pid)?;
        let page = self
            .cache
            .as_mut()
            .and_then(|c| c.get_mut(pid))
            .ok_or_else(|| anyhow!("page {} missing from cache after load", pid))?;
        page[off..off + cs].copy_from_slice(cell);
        Ok(())
    }

    /// Force every dirty page to its segment and fsync (per config).
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_inner()
            .with_context(|| format!("flush paged store {}", self.root.display()))
    }

    /// Flush own dirty pages, then drop every cached page so the next `get`
    /// re-reads the segments. Needed to see another store's `flush()` once
    /// this store has already cached the affected pages.
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_inner()
            .with_context(|| format!("refresh paged store {}", self.root.display()))?;
        if let Some(c) = self.cache.as_mut() {
            let dropped = c.len();
            *c = PageCache::new(self.cache_cap);
            debug!("paged store {}: refresh dropped {} cached page(s)", self.root.display(), dropped);
        }
        Ok(())
    }

    /// Flush and release the page cache. Returns false if the store was already closed.
    ///
    /// The store counts as closed even when the final flush fails; the error is
    /// still returned.
    pub fn close(&mut self) -> Result<bool> {
        if self.closed {
            debug!("paged store {} already closed", self.root.display());
            return Ok(false);
        }
        let res = self.flush_inner();
        self.closed = true;
        self.cache = None;
        self.cell_buf = Vec::new();
        res.with_context(|| format!("close paged store {}", self.root.display()))?;
        debug!("paged store {} closed", self.root.display());
        Ok(true)
    }

    // ---------------- typed wrappers ----------------

    /// Read a 4-byte LE integer cell (label/boundary stores).
    pub fn get_i32(&mut self, row: u32, col: u32) -> Result<i32> {
        self.expect_cell_size(4)?;
        let mut buf = std::mem::take(&mut self.cell_buf);
        let res = self.get(row, col, &mut buf);
        let v = LittleEndian::read_i32(&buf[..4]);
        self.cell_buf = buf;
        res.map(|_| v)
    }

    pub fn put_i32(&mut self, row: u32, col: u32, v: i32) -> Result<()> {
        self.expect_cell_size(4)?;
        let mut buf = [0u8; 4];
        LittleEndian::write_i32(&mut buf, v);
        self.put(row, col, &buf)
    }

    /// Read an N x f64 LE cell (band-value store); `out.len()` is N.
    pub fn get_f64s(&mut self, row: u32, col: u32, out: &mut [f64]) -> Result<()> {
        self.expect_cell_size(out.len() * 8)?;
        let mut buf = std::mem::take(&mut self.cell_buf);
        let res = self.get(row, col, &mut buf);
        if res.is_ok() {
            LittleEndian::read_f64_into(&buf, out);
        }
        self.cell_buf = buf;
        res
    }

    pub fn put_f64s(&mut self, row: u32, col: u32, vals: &[f64]) -> Result<()> {
        self.expect_cell_size(vals.len() * 8)?;
        let mut buf = vec![0u8; vals.len() * 8];
        LittleEndian::write_f64_into(vals, &mut buf);
        self.put(row, col, &buf)
    }

    // ---------------- internal helpers ----------------

    fn expect_cell_size(&self, want: usize) -> Result<()> {
        self.ensure_open()?;
        if self.cell_size() != want {
            return Err(anyhow!(
                "store {} has {}-byte cells, typed access expects {}",
                self.root.display(),
                self.cell_size(),
                want
            ));
        }
        Ok(())
    }

    /// Гарантировать, что страница в кэше; промах читает её с диска,
    /// грязная жертва вытеснения пишется обратно.
    fn ensure_cached(&mut self, page_id: u64) -> Result<()> {
        let hit = self.cache.as_ref().map(|c| c.contains(page_id)).unwrap_or(false);
        if hit {
            record_cache_hit();
            return Ok(());
        }
        record_cache_miss();

        let mut page = vec![0u8; self.meta.page_size()];
        self.read_page_disk(page_id, &mut page)?;

        let evicted = self.cache.as_mut().and_then(|c| c.insert(page_id, page, false));
        if let Some(mut ev) = evicted {
            record_cache_eviction();
            if ev.dirty {
                self.write_page_disk(ev.page_id, &mut ev.data)?;
            }
        }
        Ok(())
    }

    fn mark_dirty_meta(&mut self) -> Result<()> {
        if !self.dirty_marked {
            set_clean_shutdown(&self.root, false)?;
            self.meta.clean_shutdown = false;
            self.dirty_marked = true;
        }
        Ok(())
    }

    pub(crate) fn flush_inner(&mut self) -> Result<()> {
        let dirty = self.cache.as_ref().map(|c| c.dirty_pages()).unwrap_or_default();
        for pid in dirty {
            let mut page = match self.cache.as_ref().and_then(|c| c.peek(pid)) {
                Some(p) => p.to_vec(),
                None => continue,
            };
            self.write_page_disk(pid, &mut page)?;
            if let Some(c) = self.cache.as_mut() {
                c.mark_clean(pid);
            }
        }

        self.sync_touched_segments()?;

        if self.dirty_marked {
            set_clean_shutdown(&self.root, true)?;
            self.meta.clean_shutdown = true;
            self.dirty_marked = false;
        }
        record_store_flush();
        Ok(())
    }
}

impl Drop for PagedStore {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // best-effort: в Drop ошибку можно только залогировать
        if let Err(e) = self.flush_inner() {
            warn!("paged store {}: flush on drop failed: {:#}", self.root.display(), e);
        }
    }
}
