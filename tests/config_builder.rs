use anyhow::Result;

use SegStore::config::{ColorRange, SegConfig};
use SegStore::consts::MAX_TILE_DIM;

#[test]
fn builder_overrides_defaults() -> Result<()> {
    let cfg = SegConfig::default()
        .with_page_cache_pages(0)
        .with_tile(0, 16)
        .with_data_fsync(false)
        .with_page_checksum(false)
        .with_raster_compress(false)
        .with_color_seed(Some(99))
        .with_color_range(ColorRange::Pixels)
        .build();

    assert_eq!(cfg.page_cache_pages, 0);
    // нулевой тайл поднимается до 1
    assert_eq!((cfg.tile_rows, cfg.tile_cols), (1, 16));
    assert!(!cfg.data_fsync);
    assert!(!cfg.page_checksum);
    assert!(!cfg.raster_compress);
    assert_eq!(cfg.color_seed, Some(99));
    assert_eq!(cfg.color_range, ColorRange::Pixels);

    let shown = cfg.to_string();
    assert!(shown.contains("tile: 1x16"), "{shown}");
    Ok(())
}

#[test]
fn tile_geometry_is_capped() -> Result<()> {
    let cfg = SegConfig::default().with_tile(u32::MAX, MAX_TILE_DIM + 1);
    assert_eq!((cfg.tile_rows, cfg.tile_cols), (MAX_TILE_DIM, MAX_TILE_DIM));
    Ok(())
}

#[test]
fn color_range_parses_aliases() -> Result<()> {
    assert_eq!("observed".parse::<ColorRange>()?, ColorRange::Observed);
    assert_eq!(" Pixels ".parse::<ColorRange>()?, ColorRange::Pixels);
    assert!("everything".parse::<ColorRange>().is_err());
    Ok(())
}

#[test]
fn from_env_reads_seg_variables() -> Result<()> {
    // единственный тест, трогающий SEG_* в этом бинаре
    std::env::set_var("SEG_PAGE_CACHE_PAGES", "3");
    std::env::set_var("SEG_TILE_ROWS", "8");
    // вне 1..=MAX_TILE_DIM: остаётся значение по умолчанию
    std::env::set_var("SEG_TILE_COLS", "4294967295");
    std::env::set_var("SEG_DATA_FSYNC", "0");
    std::env::set_var("SEG_COLOR_SEED", "1234");
    std::env::set_var("SEG_COLOR_RANGE", "pixels");

    let cfg = SegConfig::from_env();
    assert_eq!(cfg.page_cache_pages, 3);
    assert_eq!(cfg.tile_rows, 8);
    assert_eq!(cfg.tile_cols, 64);
    assert!(!cfg.data_fsync);
    assert_eq!(cfg.color_seed, Some(1234));
    assert_eq!(cfg.color_range, ColorRange::Pixels);

    for k in [
        "SEG_PAGE_CACHE_PAGES",
        "SEG_TILE_ROWS",
        "SEG_TILE_COLS",
        "SEG_DATA_FSYNC",
        "SEG_COLOR_SEED",
        "SEG_COLOR_RANGE",
    ] {
        std::env::remove_var(k);
    }
    Ok(())
}
