//! output/colors: random color table for label rasters.
//!
//! Таблица не хранит по цвету на категорию: цвет категории выводится из
//! XxHash64(seed, cat), поэтому размер файла не зависит от диапазона.
//! Seed записывается в `<name>.colr`, так что раскраска воспроизводима для прогона.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use crate::consts::COLORS_EXT;
use crate::util::write_file_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTable {
    pub kind: String,
    pub min: i32,
    pub max: i32,
    pub seed: u64,
    /// Color for no-data cells.
    pub null_rgb: [u8; 3],
    /// Color for categories outside [min, max].
    pub default_rgb: [u8; 3],
}

impl ColorTable {
    /// Random colors for categories `min..=max` derived from `seed`.
    pub fn random(min: i32, max: i32, seed: u64) -> Result<Self> {
        if min > max {
            return Err(anyhow!("color range [{}, {}] is empty", min, max));
        }
        Ok(Self {
            kind: "random".to_string(),
            min,
            max,
            seed,
            null_rgb: [255, 255, 255],
            default_rgb: [255, 255, 255],
        })
    }

    /// Same as `random` with a fresh seed.
    pub fn random_unseeded(min: i32, max: i32) -> Result<Self> {
        Self::random(min, max, rand::random::<u64>())
    }

    /// Number of categories covered.
    pub fn len(&self) -> u64 {
        (self.max as i64 - self.min as i64 + 1) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    pub fn lookup(&self, cat: i32) -> [u8; 3] {
        if cat < self.min || cat > self.max {
            return self.default_rgb;
        }
        let mut h = twox_hash::XxHash64::with_seed(self.seed);
        h.write_i32(cat);
        let v = h.finish();
        [(v >> 16) as u8, (v >> 8) as u8, v as u8]
    }

    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, COLORS_EXT))
    }

    /// Persist as JSON next to the raster `name`.
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = Self::path_for(dir, name);
        let body = serde_json::to_vec_pretty(self)?;
        write_file_atomic(&path, &body)
            .with_context(|| format!("write color table for <{}>", name))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let body = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let ct: ColorTable = serde_json::from_slice(&body)
            .with_context(|| format!("parse color table {}", path.display()))?;
        Ok(ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_reproducible_per_seed() {
        let a = ColorTable::random(1, 1000, 42).unwrap();
        let b = ColorTable::random(1, 1000, 42).unwrap();
        let c = ColorTable::random(1, 1000, 43).unwrap();
        let same = (1..=1000).all(|k| a.lookup(k) == b.lookup(k));
        assert!(same);
        let differs = (1..=1000).any(|k| a.lookup(k) != c.lookup(k));
        assert!(differs, "another seed must change at least one color");
        assert_eq!(a.len(), 1000);
    }

    #[test]
    fn out_of_range_uses_default() {
        let t = ColorTable::random(1, 4, 7).unwrap();
        assert_eq!(t.lookup(0), t.default_rgb);
        assert_eq!(t.lookup(5), t.default_rgb);
        assert!(ColorTable::random(5, 4, 0).is_err());
    }
}
