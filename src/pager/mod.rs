//! pager: paged external-memory store (rows x cols fixed-size cells).
//!
//! Подмодули:
//! - core.rs  : структура PagedStore, create()/open(), геометрия тайлов и сегментов.
//! - io.rs    : чтение/запись страниц в сегменты + CRC32C трейлер.
//! - cache.rs : LRU кэш страниц с dirty-битом (вытеснение грязной страницы = write-back).
//! - access.rs: get/put/flush/close и типизированные обёртки (i32 метки, f64 каналы).
//!
//! Layout on disk:
//!   <root>/meta             : StoreMeta (see crate::meta)
//!   <root>/seg-000001.sgseg : pages, one tile per page, SEGMENT_SIZE max per file

pub mod core;
pub mod io;
pub mod access;
pub mod cache;

pub use self::core::PagedStore;
