use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use SegStore::config::{ColorRange, SegConfig};
use SegStore::consts::CELL_NULL;
use SegStore::files::{Files, FilesBuilder};
use SegStore::flags::FlagSet;
use SegStore::link::{LinkPool, MergeToken};
use SegStore::output::{write_output, ColorTable, History, RasterReader};
use SegStore::pager::PagedStore;
use SegStore::progress::NoProgress;
use SegStore::teardown::close_files;
use SegStore::workspace::Workspace;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("segtest-out-{prefix}-{pid}-{t}-{id}"))
}

fn test_cfg() -> SegConfig {
    SegConfig::default()
        .with_tile(1, 2)
        .with_data_fsync(false)
        .with_color_seed(Some(7))
}

/// labels [[1,1],[2,2]], bands [[5,5],[9,9]], (0,1) excluded.
fn two_by_two(root: &Path, cfg: &SegConfig) -> Result<Workspace> {
    let mut ws = Workspace::init(root, 2, 2, 1, false, cfg)?;
    ws.put_pixel(0, 0, 1, &[5.0], false)?;
    ws.put_pixel(0, 1, 1, &[5.0], true)?;
    ws.put_pixel(1, 0, 2, &[9.0], false)?;
    ws.put_pixel(1, 1, 2, &[9.0], false)?;
    ws.flush()?;
    Ok(ws)
}

fn entries(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

#[test]
fn masked_pixels_get_nodata_and_mean_is_written() -> Result<()> {
    let root = unique_root("2x2-mean");
    let out_dir = root.join("out");
    let cfg = test_cfg();
    let ws = two_by_two(&root, &cfg)?;

    let pool = Arc::new(LinkPool::new(16));
    pool.new_link()?;
    let mut files = ws
        .into_builder(cfg.clone())?
        .output("seg")
        .mean_output(Some("seg_mean"))
        .out_dir(&out_dir)
        .command_line(vec!["segstore".into(), "materialize".into(), "--output".into(), "seg".into()])
        .token(pool.clone())
        .build()?;

    let seen = std::cell::RefCell::new(Vec::new());
    let report = write_output(&mut files, &|r: usize, t: usize| seen.borrow_mut().push((r, t)))?;

    assert_eq!(*seen.borrow(), vec![(0, 2), (1, 2)]);
    assert_eq!(report.null_cells, 1);
    assert_eq!(report.max_label, Some(2));
    assert_eq!(report.color_seed, 7);

    let mut labels = RasterReader::open(&report.output)?;
    assert_eq!(labels.read_all_i32()?, vec![vec![1, CELL_NULL], vec![2, 2]]);

    let mean_path = report.mean_output.clone().expect("mean raster configured");
    let mean = RasterReader::open(&mean_path)?.read_all_f64()?;
    assert_eq!(mean[0][0], 5.0);
    assert!(mean[0][1].is_nan());
    assert_eq!(mean[1], vec![9.0, 9.0]);

    let colors = ColorTable::read(&report.colors)?;
    assert_eq!((colors.min, colors.max, colors.seed), (1, 2, 7));

    let hist = History::read(&report.history)?;
    assert_eq!(hist.map_name, "seg");
    assert_eq!(hist.map_type, "raster");
    assert_eq!(hist.command_line, "segstore materialize --output seg");

    assert_eq!(
        entries(&out_dir)?,
        vec!["seg.colr", "seg.hist", "seg.sgr", "seg_mean.sgr"]
    );

    let td = close_files(&mut files);
    td.ensure_clean()?;
    assert_eq!(td.links_released, Some(16));
    assert!(pool.is_released());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn no_mean_name_means_no_mean_file() -> Result<()> {
    let root = unique_root("2x2-nomean");
    let out_dir = root.join("out");
    let cfg = test_cfg().with_raster_compress(false);
    let ws = two_by_two(&root, &cfg)?;

    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .out_dir(&out_dir)
        .command_line(vec!["segstore".into()])
        .build()?;
    let report = write_output(&mut files, &NoProgress)?;

    assert!(report.mean_output.is_none());
    let mut r = RasterReader::open(&report.output)?;
    assert!(!r.compressed);
    assert_eq!(r.read_all_i32()?, vec![vec![1, CELL_NULL], vec![2, 2]]);
    assert_eq!(entries(&out_dir)?, vec!["seg.colr", "seg.hist", "seg.sgr"]);

    close_files(&mut files).ensure_clean()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn pixels_color_range_covers_every_cell() -> Result<()> {
    let root = unique_root("pixels");
    let out_dir = root.join("out");
    let cfg = test_cfg().with_color_range(ColorRange::Pixels);
    let ws = two_by_two(&root, &cfg)?;

    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .out_dir(&out_dir)
        .command_line(vec!["segstore".into()])
        .build()?;
    let report = write_output(&mut files, &NoProgress)?;
    let colors = ColorTable::read(&report.colors)?;
    assert_eq!((colors.min, colors.max), (1, 4));

    close_files(&mut files);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn extent_mismatch_fails_before_any_output() -> Result<()> {
    let root = unique_root("extent");
    let out_dir = root.join("out");
    let cfg = test_cfg();

    let bands = PagedStore::create(&root.join("bands"), 2, 2, 8, &cfg)?;
    let labels = PagedStore::create(&root.join("labels"), 2, 2, 4, &cfg)?;
    let res = FilesBuilder::new()
        .bands(bands)
        .labels(labels)
        .null_flag(FlagSet::new(3, 2))
        .output("seg")
        .out_dir(&out_dir)
        .build();
    assert!(res.is_err(), "3x2 flags against 2x2 stores must be rejected");

    // то же через уже собранный контекст: check_extent до открытия растров
    let bands = PagedStore::create(&root.join("bands2"), 2, 2, 8, &cfg)?;
    let labels = PagedStore::create(&root.join("labels2"), 2, 2, 4, &cfg)?;
    let mut files = Files::builder()
        .bands(bands)
        .labels(labels)
        .output("seg")
        .out_dir(&out_dir)
        .build()?;
    files.bounds = Some(PagedStore::create(&root.join("bounds2"), 2, 3, 4, &cfg)?);

    assert!(write_output(&mut files, &NoProgress).is_err());
    assert!(!out_dir.exists(), "no output directory or file may be created");

    close_files(&mut files);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn existing_output_requires_overwrite() -> Result<()> {
    let root = unique_root("exists");
    let cfg = test_cfg();
    let ws = two_by_two(&root, &cfg)?;
    fs::write(root.join("seg.sgr"), b"old")?;

    let builder = ws.into_builder(cfg)?.output("seg");
    assert!(builder.build().is_err());

    let ws = Workspace::open(&root, &test_cfg())?;
    let mut files = ws
        .into_builder(test_cfg())?
        .output("seg")
        .overwrite(true)
        .command_line(vec!["segstore".into()])
        .build()?;
    let report = write_output(&mut files, &NoProgress)?;
    assert_eq!(RasterReader::open(&report.output)?.rows, 2);

    close_files(&mut files);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn aborted_scan_leaves_no_finished_artifacts() -> Result<()> {
    let root = unique_root("abort");
    let out_dir = root.join("out");
    let cfg = test_cfg();
    drop(two_by_two(&root, &cfg)?);

    // label store: тайл 1x2 -> страница 8 B payload + 16 B трейлер; строка 1: с 24-го байта
    let seg = Workspace::labels_dir(&root).join("seg-000001.sgseg");
    let mut bytes = fs::read(&seg)?;
    bytes[24] ^= 0x5A;
    fs::write(&seg, &bytes)?;

    let ws = Workspace::open(&root, &cfg)?;
    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .mean_output(Some("seg_mean"))
        .out_dir(&out_dir)
        .command_line(vec!["segstore".into()])
        .build()?;

    let err = write_output(&mut files, &NoProgress).unwrap_err();
    assert!(format!("{:#}", err).contains("checksum"), "got: {:#}", err);
    assert!(entries(&out_dir)?.is_empty(), "left behind: {:?}", entries(&out_dir)?);

    // teardown после оборванного прохода всё равно отрабатывает
    close_files(&mut files).ensure_clean()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn failed_mean_commit_leaves_no_label_raster() -> Result<()> {
    let root = unique_root("mean-blocked");
    let out_dir = root.join("out");
    let cfg = test_cfg();
    let ws = two_by_two(&root, &cfg)?;

    // непустой каталог на месте seg_mean.sgr: rename среднего падает
    fs::create_dir_all(out_dir.join("seg_mean.sgr").join("x"))?;

    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .mean_output(Some("seg_mean"))
        .out_dir(&out_dir)
        .overwrite(true)
        .command_line(vec!["segstore".into()])
        .build()?;

    let err = write_output(&mut files, &NoProgress).unwrap_err();
    assert!(format!("{:#}", err).contains("seg_mean"), "got: {:#}", err);
    assert!(!out_dir.join("seg.sgr").exists());
    assert!(entries(&out_dir)?.is_empty(), "left behind: {:?}", entries(&out_dir)?);

    close_files(&mut files).ensure_clean()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn failed_history_write_removes_rasters_and_colors() -> Result<()> {
    let root = unique_root("hist-blocked");
    let out_dir = root.join("out");
    let cfg = test_cfg();
    let ws = two_by_two(&root, &cfg)?;

    // цвета пишутся, history упирается в каталог seg.hist
    fs::create_dir_all(out_dir.join("seg.hist").join("x"))?;

    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .mean_output(Some("seg_mean"))
        .out_dir(&out_dir)
        .overwrite(true)
        .command_line(vec!["segstore".into()])
        .build()?;

    let err = write_output(&mut files, &NoProgress).unwrap_err();
    assert!(format!("{:#}", err).contains("history"), "got: {:#}", err);
    assert!(!out_dir.join("seg.sgr").exists());
    assert!(!out_dir.join("seg_mean.sgr").exists());
    assert!(!ColorTable::path_for(&out_dir, "seg").exists());
    assert!(entries(&out_dir)?.is_empty(), "left behind: {:?}", entries(&out_dir)?);
    assert!(History::path_for(&out_dir, "seg").is_dir());

    close_files(&mut files).ensure_clean()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn materialize_after_teardown_is_rejected() -> Result<()> {
    let root = unique_root("after-td");
    let cfg = test_cfg();
    let ws = two_by_two(&root, &cfg)?;
    let mut files = ws
        .into_builder(cfg)?
        .output("seg")
        .command_line(vec!["segstore".into()])
        .build()?;
    close_files(&mut files);

    assert!(write_output(&mut files, &NoProgress).is_err());
    assert!(!root.join("seg.sgr").exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
