//! pager/io: низкоуровневые операции ввода/вывода страниц:
//! - read_page_disk: чтение страницы из сегмента + проверка трейлера CRC32C
//! - write_page_disk: обновление трейлера + запись в сегмент (fsync откладывается до flush)
//!
//! Трейлер (16 B): trailer[0..4]: CRC32C (LE) по payload страницы, trailer[4..16]: нули.
//! stored == 0 допустим: так выглядит никогда не записанная (предвыделенная) страница.

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::consts::PAGE_TRAILER_LEN;
use crate::metrics::record_page_written;

use super::core::PagedStore;

#[inline]
fn payload_crc(page: &[u8]) -> u32 {
    crc32c::crc32c(&page[..page.len() - PAGE_TRAILER_LEN])
}

/// Записать CRC32C payload'а в трейлер страницы.
pub(crate) fn page_update_checksum(page: &mut [u8]) -> Result<()> {
    if page.len() < PAGE_TRAILER_LEN {
        return Err(anyhow!("page buffer too small for trailer"));
    }
    let crc = payload_crc(page);
    let ps = page.len();
    let trailer = &mut page[ps - PAGE_TRAILER_LEN..];
    trailer.fill(0);
    LittleEndian::write_u32(&mut trailer[0..4], crc);
    Ok(())
}

/// Проверить трейлер. Нулевой трейлер считается валидным (пустая страница).
pub(crate) fn page_verify_checksum(page: &[u8]) -> Result<bool> {
    if page.len() < PAGE_TRAILER_LEN {
        return Err(anyhow!("page buffer too small for trailer"));
    }
    let ps = page.len();
    let stored = LittleEndian::read_u32(&page[ps - PAGE_TRAILER_LEN..ps - PAGE_TRAILER_LEN + 4]);
    if stored == 0 {
        return Ok(true);
    }
    Ok(stored == payload_crc(page))
}

impl PagedStore {
    /// Прочитать страницу с диска (минуя кэш).
    pub(crate) fn read_page_disk(&self, page_id: u64, buf: &mut [u8]) -> Result<()> {
        let ps = self.meta.page_size();
        if buf.len() != ps {
            return Err(anyhow!("buffer size {} != page_size {}", buf.len(), ps));
        }
        if page_id >= self.meta.page_count() {
            return Err(anyhow!(
                "page {} out of range (page_count={}) in store {}",
                page_id,
                self.meta.page_count(),
                self.root.display()
            ));
        }

        let (seg_no, off) = self.locate(page_id);
        let mut f = self.open_seg_rw(seg_no, false)?;
        f.seek(SeekFrom::Start(off))?;
        f.read_exact(buf).with_context(|| {
            format!("read page {} from {}", page_id, self.seg_path(seg_no).display())
        })?;

        if self.page_checksum && !page_verify_checksum(buf)? {
            return Err(anyhow!(
                "page {} checksum mismatch in store {}",
                page_id,
                self.root.display()
            ));
        }
        Ok(())
    }

    /// Записать страницу «как есть» (трейлер пересчитывается). fsync: в flush().
    pub(crate) fn write_page_disk(&mut self, page_id: u64, buf: &mut [u8]) -> Result<()> {
        let ps = self.meta.page_size();
        if buf.len() != ps {
            return Err(anyhow!("buffer size {} != page_size {}", buf.len(), ps));
        }
        page_update_checksum(buf)?;

        let (seg_no, off) = self.locate(page_id);
        let mut f = self.open_seg_rw(seg_no, false)?;
        f.seek(SeekFrom::Start(off))?;
        f.write_all(buf).with_context(|| {
            format!("write page {} to {}", page_id, self.seg_path(seg_no).display())
        })?;

        self.touched_segs.insert(seg_no);
        record_page_written();
        Ok(())
    }

    /// fsync всех сегментов, записанных с прошлого flush.
    pub(crate) fn sync_touched_segments(&mut self) -> Result<()> {
        let segs = std::mem::take(&mut self.touched_segs);
        if !self.data_fsync {
            return Ok(());
        }
        for seg_no in segs {
            let f = self.open_seg_rw(seg_no, false)?;
            f.sync_all()
                .with_context(|| format!("fsync segment {}", self.seg_path(seg_no).display()))?;
        }
        Ok(())
    }
}
