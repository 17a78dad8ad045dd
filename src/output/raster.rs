//! output/raster: write-once sequential raster files and their reader.
//!
//! Формат <dir>/<name>.sgr (LE):
//! - Header (24 B): [magic8="SGRASTER"][ver u32=1][cell_type u8][compressed u8][pad u16][rows u32][cols u32]
//! - Rows: по одной записи на строку, сырые LE значения или zlib (flate2) поток.
//! - Index: (rows + 1) x u64: смещения начала каждой строки + конец данных.
//! - Footer (16 B): [index_off u64][magic8="SGRINDEX"]
//!
//! Политика:
//! - Пишем в <name>.sgr.tmp. finish() проверяет, что записаны все строки, дописывает
//!   индекс/футер и делает fsync; commit() переименовывает в <name>.sgr. Между ними
//!   несколько растров можно довести до диска и только потом переименовать все.
//! - Writer без commit() удаляет tmp в Drop, так что оборванный проход никогда не
//!   оставляет «готовый» растр.
//! - No-data: CELL_NULL (i32::MIN) для целых, NaN для f64.

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consts::{
    CELL_NULL, RASTER_EXT, RASTER_FOOTER_MAGIC, RASTER_FOOTER_SIZE, RASTER_HDR_SIZE, RASTER_MAGIC,
    RASTER_VERSION,
};
use crate::util::{fsync_dir, tmp_path_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellType {
    /// 32-bit signed integer cells (labels).
    Cell,
    /// 64-bit float cells (band means).
    DCell,
}

impl CellType {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            CellType::Cell => 4,
            CellType::DCell => 8,
        }
    }

    fn code(self) -> u8 {
        match self {
            CellType::Cell => 1,
            CellType::DCell => 2,
        }
    }

    fn from_code(c: u8) -> Result<Self> {
        match c {
            1 => Ok(CellType::Cell),
            2 => Ok(CellType::DCell),
            other => Err(anyhow!("unknown raster cell type code {}", other)),
        }
    }
}

#[inline]
pub fn is_null_cell(v: i32) -> bool {
    v == CELL_NULL
}

#[inline]
pub fn is_null_dcell(v: f64) -> bool {
    v.is_nan()
}

/// Map names become file names: no separators, no leading dot, printable ASCII.
pub fn validate_map_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("raster name is empty"));
    }
    if name.starts_with('.') {
        return Err(anyhow!("raster name '{}' must not start with '.'", name));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_graphic() || matches!(c, '/' | '\\' | '@' | '"' | '\''))
    {
        return Err(anyhow!("illegal character {:?} in raster name '{}'", bad, name));
    }
    Ok(())
}

pub fn raster_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, RASTER_EXT))
}

pub struct RasterWriter {
    name: String,
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: Option<BufWriter<File>>,
    /// `<name>.sgr.tmp` exists and belongs to this writer.
    tmp_live: bool,
    cell_type: CellType,
    rows: u32,
    cols: u32,
    compress: bool,
    offsets: Vec<u64>,
    pos: u64,
    raw: Vec<u8>,
}

impl RasterWriter {
    /// Open a new raster for sequential row writes.
    pub fn create(
        dir: &Path,
        name: &str,
        cell_type: CellType,
        rows: u32,
        cols: u32,
        compress: bool,
    ) -> Result<Self> {
        validate_map_name(name)?;
        fs::create_dir_all(dir)
            .with_context(|| format!("create output dir {}", dir.display()))?;

        let final_path = raster_path(dir, name);
        let tmp_path = tmp_path_for(&final_path);
        let f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("open raster <{}> for writing at {}", name, tmp_path.display()))?;
        let mut file = BufWriter::new(f);

        file.write_all(RASTER_MAGIC)?;
        file.write_u32::<LittleEndian>(RASTER_VERSION)?;
        file.write_u8(cell_type.code())?;
        file.write_u8(if compress { 1 } else { 0 })?;
        file.write_u16::<LittleEndian>(0)?;
        file.write_u32::<LittleEndian>(rows)?;
        file.write_u32::<LittleEndian>(cols)?;

        debug!(
            "raster <{}> opened: {}x{} {:?}, compress={}",
            name, rows, cols, cell_type, compress
        );

        Ok(Self {
            name: name.to_string(),
            final_path,
            tmp_path,
            file: Some(file),
            tmp_live: true,
            cell_type,
            rows,
            cols,
            compress,
            offsets: Vec::with_capacity(rows as usize + 1),
            pos: RASTER_HDR_SIZE,
            raw: vec![0u8; cols as usize * cell_type.bytes()],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows_written(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub fn put_row_i32(&mut self, row: &[i32]) -> Result<()> {
        self.check_row(CellType::Cell, row.len())?;
        LittleEndian::write_i32_into(row, &mut self.raw);
        self.put_raw_row()
    }

    pub fn put_row_f64(&mut self, row: &[f64]) -> Result<()> {
        self.check_row(CellType::DCell, row.len())?;
        LittleEndian::write_f64_into(row, &mut self.raw);
        self.put_raw_row()
    }

    /// Finish the raster: index + footer, fsync of `<name>.sgr.tmp`.
    /// The file is complete but stays under its tmp name until `commit()`.
    pub fn finish(&mut self) -> Result<()> {
        if self.offsets.len() != self.rows as usize {
            return Err(anyhow!(
                "raster <{}>: only {} of {} rows written",
                self.name,
                self.offsets.len(),
                self.rows
            ));
        }
        let file = self
            .file
            .take()
            .ok_or_else(|| anyhow!("raster <{}> already finished", self.name))?;

        if let Err(e) = self.write_index(file) {
            self.discard_tmp();
            return Err(e);
        }
        debug!("raster <{}> finished: {}", self.name, self.tmp_path.display());
        Ok(())
    }

    /// Rename the finished tmp file to `<name>.sgr`.
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.file.is_some() {
            return Err(anyhow!("raster <{}>: commit before finish", self.name));
        }
        if !self.tmp_live {
            return Err(anyhow!("raster <{}>: nothing to commit", self.name));
        }
        let renamed = fs::rename(&self.tmp_path, &self.final_path).with_context(|| {
            format!(
                "rename {} -> {}",
                self.tmp_path.display(),
                self.final_path.display()
            )
        });
        if let Err(e) = renamed {
            self.discard_tmp();
            return Err(e);
        }
        self.tmp_live = false;
        let _ = fsync_dir(&self.final_path);
        debug!("raster <{}> committed: {}", self.name, self.final_path.display());
        Ok(self.final_path.clone())
    }

    /// `finish()` + `commit()`.
    pub fn close(mut self) -> Result<PathBuf> {
        self.finish()?;
        self.commit()
    }

    // ---------------- internal helpers ----------------

    fn write_index(&self, mut file: BufWriter<File>) -> Result<()> {
        let index_off = self.pos;
        for off in &self.offsets {
            file.write_u64::<LittleEndian>(*off)?;
        }
        file.write_u64::<LittleEndian>(index_off)?; // конец данных строк
        // footer
        file.write_u64::<LittleEndian>(index_off)?;
        file.write_all(RASTER_FOOTER_MAGIC)?;

        let f = file
            .into_inner()
            .map_err(|e| anyhow!("flush raster <{}>: {}", self.name, e.error()))?;
        f.sync_all()
            .with_context(|| format!("fsync raster {}", self.tmp_path.display()))?;
        Ok(())
    }

    fn discard_tmp(&mut self) {
        self.file = None;
        if !self.tmp_live {
            return;
        }
        self.tmp_live = false;
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            warn!(
                "raster <{}>: failed to remove incomplete {}: {}",
                self.name,
                self.tmp_path.display(),
                e
            );
        } else {
            debug!("raster <{}>: incomplete output discarded", self.name);
        }
    }

    fn check_row(&self, want: CellType, len: usize) -> Result<()> {
        if self.cell_type != want {
            return Err(anyhow!(
                "raster <{}> holds {:?} cells, got a {:?} row",
                self.name,
                self.cell_type,
                want
            ));
        }
        if len != self.cols as usize {
            return Err(anyhow!(
                "raster <{}>: row has {} cells, expected {}",
                self.name,
                len,
                self.cols
            ));
        }
        if self.offsets.len() >= self.rows as usize {
            return Err(anyhow!("raster <{}>: all {} rows already written", self.name, self.rows));
        }
        Ok(())
    }

    fn put_raw_row(&mut self) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| anyhow!("raster <{}> already closed", self.name))?;

        let written = if self.compress {
            let mut enc = ZlibEncoder::new(Vec::with_capacity(self.raw.len() / 2), Compression::default());
            enc.write_all(&self.raw)?;
            let z = enc.finish()?;
            file.write_all(&z)?;
            z.len()
        } else {
            file.write_all(&self.raw)?;
            self.raw.len()
        };

        self.offsets.push(self.pos);
        self.pos += written as u64;
        Ok(())
    }
}

impl Drop for RasterWriter {
    fn drop(&mut self) {
        // commit() не дошёл до rename: проход оборван, убираем tmp
        self.discard_tmp();
    }
}

/// Random-access reader for finished rasters.
pub struct RasterReader {
    path: PathBuf,
    file: File,
    pub cell_type: CellType,
    pub rows: u32,
    pub cols: u32,
    pub compressed: bool,
    offsets: Vec<u64>,
}

impl RasterReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("open raster {}", path.display()))?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != RASTER_MAGIC {
            return Err(anyhow!("bad raster magic in {}", path.display()));
        }
        let ver = file.read_u32::<LittleEndian>()?;
        if ver != RASTER_VERSION {
            return Err(anyhow!("unsupported raster version {} in {}", ver, path.display()));
        }
        let cell_type = CellType::from_code(file.read_u8()?)?;
        let compressed = file.read_u8()? != 0;
        let _pad = file.read_u16::<LittleEndian>()?;
        let rows = file.read_u32::<LittleEndian>()?;
        let cols = file.read_u32::<LittleEndian>()?;

        let len = file.metadata()?.len();
        if len < RASTER_HDR_SIZE + RASTER_FOOTER_SIZE {
            return Err(anyhow!("raster {} truncated ({} B)", path.display(), len));
        }
        file.seek(SeekFrom::Start(len - RASTER_FOOTER_SIZE))?;
        let index_off = file.read_u64::<LittleEndian>()?;
        let mut fmagic = [0u8; 8];
        file.read_exact(&mut fmagic)?;
        if &fmagic != RASTER_FOOTER_MAGIC {
            return Err(anyhow!("bad raster footer in {}", path.display()));
        }

        file.seek(SeekFrom::Start(index_off))?;
        let mut offsets = vec![0u64; rows as usize + 1];
        file.read_u64_into::<LittleEndian>(&mut offsets)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            cell_type,
            rows,
            cols,
            compressed,
            offsets,
        })
    }

    pub fn read_row_i32(&mut self, row: u32) -> Result<Vec<i32>> {
        self.expect_type(CellType::Cell)?;
        let raw = self.row_bytes(row)?;
        let mut out = vec![0i32; self.cols as usize];
        LittleEndian::read_i32_into(&raw, &mut out);
        Ok(out)
    }

    pub fn read_row_f64(&mut self, row: u32) -> Result<Vec<f64>> {
        self.expect_type(CellType::DCell)?;
        let raw = self.row_bytes(row)?;
        let mut out = vec![0f64; self.cols as usize];
        LittleEndian::read_f64_into(&raw, &mut out);
        Ok(out)
    }

    pub fn read_all_i32(&mut self) -> Result<Vec<Vec<i32>>> {
        (0..self.rows).map(|r| self.read_row_i32(r)).collect()
    }

    pub fn read_all_f64(&mut self) -> Result<Vec<Vec<f64>>> {
        (0..self.rows).map(|r| self.read_row_f64(r)).collect()
    }

    fn expect_type(&self, want: CellType) -> Result<()> {
        if self.cell_type != want {
            return Err(anyhow!(
                "raster {} holds {:?} cells, not {:?}",
                self.path.display(),
                self.cell_type,
                want
            ));
        }
        Ok(())
    }

    fn row_bytes(&mut self, row: u32) -> Result<Vec<u8>> {
        if row >= self.rows {
            return Err(anyhow!("row {} out of range (rows={})", row, self.rows));
        }
        let start = self.offsets[row as usize];
        let end = self.offsets[row as usize + 1];
        if end < start {
            return Err(anyhow!("corrupt row index at row {} in {}", row, self.path.display()));
        }
        let mut stored = vec![0u8; (end - start) as usize];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut stored)?;

        let raw = if self.compressed {
            let mut out = Vec::with_capacity(self.cols as usize * self.cell_type.bytes());
            ZlibDecoder::new(stored.as_slice())
                .read_to_end(&mut out)
                .with_context(|| format!("inflate row {} of {}", row, self.path.display()))?;
            out
        } else {
            stored
        };

        let want = self.cols as usize * self.cell_type.bytes();
        if raw.len() != want {
            return Err(anyhow!(
                "row {} of {} has {} B, expected {}",
                row,
                self.path.display(),
                raw.len(),
                want
            ));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_names() {
        assert!(validate_map_name("segments").is_ok());
        assert!(validate_map_name("seg_1.v2").is_ok());
        assert!(validate_map_name("").is_err());
        assert!(validate_map_name(".hidden").is_err());
        assert!(validate_map_name("a/b").is_err());
        assert!(validate_map_name("with space").is_err());
        assert!(validate_map_name("map@PERMANENT").is_err());
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("segtest-raster-{}-{}-{}", tag, std::process::id(), t))
    }

    #[test]
    fn finished_raster_is_not_visible_until_commit() -> Result<()> {
        let dir = scratch_dir("commit");
        let mut w = RasterWriter::create(&dir, "lbl", CellType::Cell, 2, 2, false)?;
        w.put_row_i32(&[1, 2])?;
        w.put_row_i32(&[3, CELL_NULL])?;
        w.finish()?;

        let final_path = raster_path(&dir, "lbl");
        assert!(!final_path.exists());
        assert!(tmp_path_for(&final_path).exists());
        assert!(w.finish().is_err());

        assert_eq!(w.commit()?, final_path);
        assert!(!tmp_path_for(&final_path).exists());
        let mut r = RasterReader::open(&final_path)?;
        assert_eq!(r.read_all_i32()?, vec![vec![1, 2], vec![3, CELL_NULL]]);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn finished_but_uncommitted_writer_leaves_nothing() -> Result<()> {
        let dir = scratch_dir("drop");
        let mut w = RasterWriter::create(&dir, "m", CellType::DCell, 1, 1, true)?;
        w.put_row_f64(&[0.5])?;
        w.finish()?;
        drop(w);

        assert_eq!(fs::read_dir(&dir)?.count(), 0);

        let w = RasterWriter::create(&dir, "early", CellType::Cell, 1, 1, false)?;
        assert!(w.commit().is_err());
        assert_eq!(fs::read_dir(&dir)?.count(), 0);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn failed_commit_removes_tmp() -> Result<()> {
        let dir = scratch_dir("blocked");
        // непустой каталог на месте <name>.sgr: rename падает
        fs::create_dir_all(raster_path(&dir, "blk").join("x"))?;
        let mut w = RasterWriter::create(&dir, "blk", CellType::Cell, 1, 1, false)?;
        w.put_row_i32(&[4])?;
        w.finish()?;

        assert!(w.commit().is_err());
        assert!(!tmp_path_for(&raster_path(&dir, "blk")).exists());

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn null_sentinels() {
        assert!(is_null_cell(CELL_NULL));
        assert!(!is_null_cell(0));
        assert!(is_null_dcell(f64::NAN));
        assert!(!is_null_dcell(0.0));
    }
}
