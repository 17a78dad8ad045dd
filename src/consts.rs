//! Общие константы форматов (store meta, segments, pages, flags, rasters).

// -------- Paged store meta --------
pub const STORE_META_MAGIC: &[u8; 8] = b"SGSTMETA";
pub const STORE_META_FILE: &str = "meta";
pub const STORE_META_VERSION: u32 = 1;

// -------- Data segments --------
pub const SEG_FILE_PREFIX: &str = "seg-";
pub const SEG_FILE_EXT: &str = "sgseg";
/// Верхняя граница размера одного сегмента (байт). Страница целиком лежит в одном сегменте.
pub const SEGMENT_SIZE: u64 = 32 * 1024 * 1024;

// -------- Pages --------
/// Трейлер страницы: [crc32c u32][reserved 12].
pub const PAGE_TRAILER_LEN: usize = 16;
/// Верхняя граница tile_rows / tile_cols в конфигурации.
pub const MAX_TILE_DIM: u32 = 4096;

// -------- Flag sets --------
pub const FLAG_MAGIC: &[u8; 8] = b"SGFLAG01";
pub const FLAG_HDR_SIZE: u64 = 16; // [magic8][rows u32][cols u32]

// -------- Rasters --------
pub const RASTER_MAGIC: &[u8; 8] = b"SGRASTER";
pub const RASTER_VERSION: u32 = 1;
pub const RASTER_EXT: &str = "sgr";
pub const RASTER_HDR_SIZE: u64 = 24; // [magic8][ver u32][cell_type u8][compressed u8][pad u16][rows u32][cols u32]
pub const RASTER_FOOTER_MAGIC: &[u8; 8] = b"SGRINDEX";
pub const RASTER_FOOTER_SIZE: u64 = 16; // [index_off u64][magic8]
pub const COLORS_EXT: &str = "colr";
pub const HISTORY_EXT: &str = "hist";

/// No-data sentinel for integer (label) cells.
pub const CELL_NULL: i32 = i32::MIN;

// -------- Workspace layout --------
pub const WS_BANDS_DIR: &str = "bands";
pub const WS_LABELS_DIR: &str = "labels";
pub const WS_BOUNDS_DIR: &str = "bounds";
pub const WS_NULL_FLAGS: &str = "null.flags";
