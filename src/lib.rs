#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod meta;
pub mod metrics;
pub mod config;

// Хранилище и маски
pub mod pager;  // src/pager/{mod,core,io,access,cache}.rs
pub mod flags;
pub mod link;

// Контекст прогона, выход и освобождение ресурсов
pub mod files;
pub mod workspace;
pub mod output; // src/output/{mod,raster,colors,history,materialize}.rs
pub mod progress;
pub mod teardown;

// Утилиты (now_secs, env_flag, write_file_atomic, ...)
pub mod util;   // src/util/mod.rs

// Удобные реэкспорты
pub use config::{ColorRange, SegConfig};
pub use files::{Files, FilesBuilder};
pub use flags::FlagSet;
pub use link::{LinkId, LinkPool, MergeToken};
pub use meta::{read_meta, set_clean_shutdown, write_meta_new, write_meta_overwrite, StoreMeta};
pub use output::{materialize, write_output, OutputReport, RasterReader};
pub use pager::PagedStore;
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use teardown::{close_files, StepOutcome, TeardownReport, TeardownStep};
pub use workspace::Workspace;
