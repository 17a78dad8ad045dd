// src/meta.rs: SegStore paged store header
//
// Формат <store_root>/meta (LE):
// MAGIC8 = "SGSTMETA"
// u32 version        = 1
// u32 rows
// u32 cols
// u32 cell_size      (байт на ячейку)
// u32 tile_rows      (строк ячеек в одной странице)
// u32 tile_cols      (столбцов ячеек в одной странице)
// u8  clean_shutdown (1 = все грязные страницы сброшены, 0 = были put без flush)
//
// Политика:
// - Атомарная запись: tmp+rename, затем fsync родительского каталога.
// - page_size = tile_rows * tile_cols * cell_size + PAGE_TRAILER_LEN (не хранится, выводится).

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consts::{PAGE_TRAILER_LEN, SEGMENT_SIZE, STORE_META_FILE, STORE_META_MAGIC, STORE_META_VERSION};
use crate::util::fsync_dir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMeta {
    pub version: u32,
    pub rows: u32,
    pub cols: u32,
    pub cell_size: u32,
    pub tile_rows: u32,
    pub tile_cols: u32,
    pub clean_shutdown: bool,
}

impl StoreMeta {
    pub fn new(rows: u32, cols: u32, cell_size: u32, tile_rows: u32, tile_cols: u32) -> Self {
        Self {
            version: STORE_META_VERSION,
            rows,
            cols,
            cell_size,
            tile_rows,
            tile_cols,
            clean_shutdown: true,
        }
    }

    /// Полный размер страницы вместе с трейлером.
    /// Saturates on absurd geometry; `validate()` rejects such headers first.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.payload_size().saturating_add(PAGE_TRAILER_LEN)
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        (self.tile_rows as usize)
            .saturating_mul(self.tile_cols as usize)
            .saturating_mul(self.cell_size as usize)
    }

    /// Page size, or None if it does not fit in `usize`.
    pub fn checked_page_size(&self) -> Option<usize> {
        (self.tile_rows as usize)
            .checked_mul(self.tile_cols as usize)?
            .checked_mul(self.cell_size as usize)?
            .checked_add(PAGE_TRAILER_LEN)
    }

    #[inline]
    pub fn tiles_across(&self) -> u32 {
        self.cols.div_ceil(self.tile_cols)
    }

    #[inline]
    pub fn tiles_down(&self) -> u32 {
        self.rows.div_ceil(self.tile_rows)
    }

    pub fn page_count(&self) -> u64 {
        self.tiles_across() as u64 * self.tiles_down() as u64
    }

    /// Проверка геометрии: ненулевые размеры, страница помещается в сегмент.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(anyhow!("store extent must be non-empty, got {}x{}", self.rows, self.cols));
        }
        if self.cell_size == 0 {
            return Err(anyhow!("cell_size must be > 0"));
        }
        if self.tile_rows == 0 || self.tile_cols == 0 {
            return Err(anyhow!(
                "tile geometry must be non-empty, got {}x{}",
                self.tile_rows,
                self.tile_cols
            ));
        }
        let page_size = self.checked_page_size().ok_or_else(|| {
            anyhow!(
                "page size overflows (tile {}x{}, cell {} B)",
                self.tile_rows,
                self.tile_cols,
                self.cell_size
            )
        })?;
        if page_size as u64 > SEGMENT_SIZE {
            return Err(anyhow!(
                "page size {} exceeds segment size {} (tile {}x{}, cell {} B)",
                page_size,
                SEGMENT_SIZE,
                self.tile_rows,
                self.tile_cols,
                self.cell_size
            ));
        }
        Ok(())
    }
}

#[inline]
fn meta_path(root: &Path) -> PathBuf {
    root.join(STORE_META_FILE)
}

/// Создать новый meta. Ошибка, если уже существует.
pub fn write_meta_new(root: &Path, m: &StoreMeta) -> Result<()> {
    let path = meta_path(root);
    if path.exists() {
        return Err(anyhow!("store meta already exists at {}", path.display()));
    }
    write_meta_overwrite(root, m)
}

/// Перезаписать meta через tmp+rename.
pub fn write_meta_overwrite(root: &Path, m: &StoreMeta) -> Result<()> {
    m.validate()?;

    let path = meta_path(root);
    let tmp = root.join(format!("{}.tmp", STORE_META_FILE));
    let _ = fs::remove_file(&tmp);

    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("open meta tmp {}", tmp.display()))?;

    write_meta_contents(&mut f, m)?;
    f.sync_all()?;

    fs::rename(&tmp, &path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    let _ = fsync_dir(&path);
    Ok(())
}

fn write_meta_contents(f: &mut std::fs::File, m: &StoreMeta) -> Result<()> {
    f.seek(SeekFrom::Start(0))?;
    f.write_all(STORE_META_MAGIC)?;
    f.write_u32::<LittleEndian>(m.version)?;
    f.write_u32::<LittleEndian>(m.rows)?;
    f.write_u32::<LittleEndian>(m.cols)?;
    f.write_u32::<LittleEndian>(m.cell_size)?;
    f.write_u32::<LittleEndian>(m.tile_rows)?;
    f.write_u32::<LittleEndian>(m.tile_cols)?;
    f.write_u8(if m.clean_shutdown { 1 } else { 0 })?;
    Ok(())
}

pub fn read_meta(root: &Path) -> Result<StoreMeta> {
    let path = meta_path(root);
    let mut f = OpenOptions::new()
        .read(true)
        .open(&path)
        .with_context(|| format!("open store meta {}", path.display()))?;

    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)?;
    if &magic != STORE_META_MAGIC {
        return Err(anyhow!(
            "bad store meta magic at {} (expected {:?}, got {:?})",
            path.display(),
            STORE_META_MAGIC,
            magic
        ));
    }

    let version = f.read_u32::<LittleEndian>()?;
    if version != STORE_META_VERSION {
        return Err(anyhow!(
            "unsupported store meta version {} at {} (expected {})",
            version,
            path.display(),
            STORE_META_VERSION
        ));
    }

    let m = StoreMeta {
        version,
        rows: f.read_u32::<LittleEndian>()?,
        cols: f.read_u32::<LittleEndian>()?,
        cell_size: f.read_u32::<LittleEndian>()?,
        tile_rows: f.read_u32::<LittleEndian>()?,
        tile_cols: f.read_u32::<LittleEndian>()?,
        clean_shutdown: f.read_u8()? != 0,
    };
    m.validate()
        .with_context(|| format!("store meta {}", path.display()))?;
    Ok(m)
}

/// Пометить meta.clean_shutdown (только при изменении).
pub fn set_clean_shutdown(root: &Path, clean: bool) -> Result<()> {
    let mut m = read_meta(root)?;
    if m.clean_shutdown != clean {
        m.clean_shutdown = clean;
        write_meta_overwrite(root, &m)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_meta_roundtrip_and_clean_flag() {
        let root = std::env::temp_dir().join(format!("sgst-meta-{}", nanos_for_test()));
        fs::create_dir_all(&root).unwrap();

        let m0 = StoreMeta::new(1000, 700, 24, 32, 16);
        write_meta_new(&root, &m0).unwrap();
        assert!(write_meta_new(&root, &m0).is_err(), "second create must fail");

        let m1 = read_meta(&root).unwrap();
        assert_eq!(m1, m0);
        assert_eq!(m1.tiles_down(), 32); // ceil(1000/32)
        assert_eq!(m1.tiles_across(), 44); // ceil(700/16)
        assert_eq!(m1.page_size(), 32 * 16 * 24 + PAGE_TRAILER_LEN);

        set_clean_shutdown(&root, false).unwrap();
        assert!(!read_meta(&root).unwrap().clean_shutdown);
    }

    #[test]
    fn validate_rejects_empty_geometry() {
        assert!(StoreMeta::new(0, 10, 4, 8, 8).validate().is_err());
        assert!(StoreMeta::new(10, 10, 0, 8, 8).validate().is_err());
        assert!(StoreMeta::new(10, 10, 4, 0, 8).validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_pages_without_overflow() {
        let huge = StoreMeta::new(10, 10, u32::MAX, u32::MAX, u32::MAX);
        assert!(huge.checked_page_size().is_none());
        let err = huge.validate().unwrap_err();
        assert!(format!("{}", err).contains("overflows"), "got: {}", err);

        // помещается в usize, но не в сегмент
        let big = StoreMeta::new(10, 10, 8, 4096, 4096);
        let err = big.validate().unwrap_err();
        assert!(format!("{}", err).contains("exceeds segment size"), "got: {}", err);
    }

    #[test]
    fn corrupt_header_with_huge_tiles_is_an_error() {
        let root = std::env::temp_dir().join(format!("sgst-meta-huge-{}", nanos_for_test()));
        fs::create_dir_all(&root).unwrap();
        write_meta_new(&root, &StoreMeta::new(10, 10, 4, 2, 2)).unwrap();

        // tile_rows/tile_cols лежат сразу после magic, version, rows, cols, cell_size
        let path = meta_path(&root);
        let mut bytes = fs::read(&path).unwrap();
        bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes[28..32].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        assert!(read_meta(&root).is_err());
        let _ = fs::remove_dir_all(&root);
    }

    fn nanos_for_test() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }
}
