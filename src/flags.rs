//! flags: плотная битовая маска по экстенту растра (один бит на пиксель).
//!
//! Используется в трёх экземплярах: исключённые (null) пиксели, кандидаты на рост, семена.
//! Заполняется на этапе инициализации, при материализации только читается.
//!
//! Формат файла (LE), для сохранения маски в рабочем каталоге:
//! - Header (16 B): [magic8="SGFLAG01"][rows u32][cols u32]
//! - Tail: ceil(rows*cols/64) слов u64, бит i = пиксель (i / cols, i % cols).

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;

use crate::consts::{FLAG_HDR_SIZE, FLAG_MAGIC};
use crate::util::write_file_atomic;

#[derive(Debug, Clone)]
pub struct FlagSet {
    rows: u32,
    cols: u32,
    // None после destroy()
    words: Option<Vec<u64>>,
}

impl FlagSet {
    /// All flags start unset.
    pub fn new(rows: u32, cols: u32) -> Self {
        let nbits = rows as usize * cols as usize;
        Self {
            rows,
            cols,
            words: Some(vec![0u64; nbits.div_ceil(64)]),
        }
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.words.is_none()
    }

    pub fn get(&self, row: u32, col: u32) -> Result<bool> {
        let (w, bit) = self.index(row, col)?;
        let words = self.words()?;
        Ok(words[w] & (1u64 << bit) != 0)
    }

    pub fn set(&mut self, row: u32, col: u32) -> Result<()> {
        let (w, bit) = self.index(row, col)?;
        self.words_mut()?[w] |= 1u64 << bit;
        Ok(())
    }

    pub fn unset(&mut self, row: u32, col: u32) -> Result<()> {
        let (w, bit) = self.index(row, col)?;
        self.words_mut()?[w] &= !(1u64 << bit);
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.words_mut()?.fill(0);
        Ok(())
    }

    /// Number of set flags.
    pub fn count_set(&self) -> Result<u64> {
        Ok(self.words()?.iter().map(|w| w.count_ones() as u64).sum())
    }

    /// Release the bit storage. Returns false if already destroyed.
    pub fn destroy(&mut self) -> bool {
        self.words.take().is_some()
    }

    /// Persist the mask (tmp + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let words = self.words()?;
        let mut buf = vec![0u8; FLAG_HDR_SIZE as usize + words.len() * 8];
        buf[0..8].copy_from_slice(FLAG_MAGIC);
        LittleEndian::write_u32(&mut buf[8..12], self.rows);
        LittleEndian::write_u32(&mut buf[12..16], self.cols);
        LittleEndian::write_u64_into(words, &mut buf[FLAG_HDR_SIZE as usize..]);
        write_file_atomic(path, &buf)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read(path).with_context(|| format!("read flags {}", path.display()))?;
        if buf.len() < FLAG_HDR_SIZE as usize || &buf[0..8] != FLAG_MAGIC {
            return Err(anyhow!("bad flag file header in {}", path.display()));
        }
        let rows = LittleEndian::read_u32(&buf[8..12]);
        let cols = LittleEndian::read_u32(&buf[12..16]);
        let nwords = (rows as usize * cols as usize).div_ceil(64);
        let tail = &buf[FLAG_HDR_SIZE as usize..];
        if tail.len() != nwords * 8 {
            return Err(anyhow!(
                "flag file {} has {} payload bytes, expected {} for {}x{}",
                path.display(),
                tail.len(),
                nwords * 8,
                rows,
                cols
            ));
        }
        let mut words = vec![0u64; nwords];
        LittleEndian::read_u64_into(tail, &mut words);
        Ok(Self {
            rows,
            cols,
            words: Some(words),
        })
    }

    // ---------------- internal helpers ----------------

    fn index(&self, row: u32, col: u32) -> Result<(usize, u32)> {
        if row >= self.rows || col >= self.cols {
            return Err(anyhow!(
                "flag ({}, {}) out of range {}x{}",
                row,
                col,
                self.rows,
                self.cols
            ));
        }
        let i = row as usize * self.cols as usize + col as usize;
        Ok((i / 64, (i % 64) as u32))
    }

    fn words(&self) -> Result<&[u64]> {
        self.words
            .as_deref()
            .ok_or_else(|| anyhow!("flag set {}x{} is destroyed", self.rows, self.cols))
    }

    fn words_mut(&mut self) -> Result<&mut [u64]> {
        let (rows, cols) = (self.rows, self.cols);
        self.words
            .as_deref_mut()
            .ok_or_else(|| anyhow!("flag set {}x{} is destroyed", rows, cols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_unset_across_word_boundary() {
        let mut f = FlagSet::new(3, 50); // 150 bits -> 3 words
        f.set(1, 13).unwrap(); // bit 63
        f.set(1, 14).unwrap(); // bit 64
        f.set(2, 49).unwrap(); // last bit
        assert!(f.get(1, 13).unwrap());
        assert!(f.get(1, 14).unwrap());
        assert!(f.get(2, 49).unwrap());
        assert!(!f.get(0, 0).unwrap());
        assert_eq!(f.count_set().unwrap(), 3);

        f.unset(1, 14).unwrap();
        assert!(!f.get(1, 14).unwrap());
        assert_eq!(f.count_set().unwrap(), 2);

        f.clear_all().unwrap();
        assert_eq!(f.count_set().unwrap(), 0);
    }

    #[test]
    fn out_of_range_is_error() {
        let f = FlagSet::new(2, 2);
        assert!(f.get(2, 0).is_err());
        assert!(f.get(0, 2).is_err());
    }

    #[test]
    fn destroy_is_idempotent_and_blocks_queries() {
        let mut f = FlagSet::new(4, 4);
        assert!(f.destroy());
        assert!(!f.destroy());
        assert!(f.is_destroyed());
        assert!(f.get(0, 0).is_err());
        assert!(f.set(0, 0).is_err());
    }

    #[test]
    fn save_load_preserves_bits() {
        let dir = std::env::temp_dir().join(format!(
            "sgst-flags-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("null.flags");

        let mut f = FlagSet::new(7, 11);
        f.set(0, 1).unwrap();
        f.set(6, 10).unwrap();
        f.save(&path).unwrap();

        let g = FlagSet::load(&path).unwrap();
        assert_eq!((g.rows(), g.cols()), (7, 11));
        assert!(g.get(0, 1).unwrap());
        assert!(g.get(6, 10).unwrap());
        assert_eq!(g.count_set().unwrap(), 2);
    }
}
