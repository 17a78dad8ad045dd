use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use SegStore::config::SegConfig;
use SegStore::link::LinkPool;
use SegStore::metrics::metrics_snapshot;
use SegStore::output::materialize;
use SegStore::teardown::close_files;
use SegStore::workspace::Workspace;

pub fn exec(
    path: PathBuf,
    output: String,
    mean: Option<String>,
    out_dir: Option<PathBuf>,
    overwrite: bool,
    json: bool,
) -> Result<()> {
    let cfg = SegConfig::from_env();
    let ws = Workspace::open(&path, &cfg)?;
    let mut builder = ws
        .into_builder(cfg)?
        .output(output)
        .mean_output(mean)
        .overwrite(overwrite)
        .token(Arc::new(LinkPool::new(1024)));
    if let Some(d) = out_dir.as_deref() {
        builder = builder.out_dir(d);
    }
    let mut files = builder.build()?;

    // teardown выполняется и после неудачной материализации
    let res = materialize(&mut files);
    let teardown = close_files(&mut files);
    let report = res?;
    teardown.ensure_clean()?;

    if json {
        let m = metrics_snapshot();
        let obj = json!({
            "output": report,
            "teardown": teardown,
            "metrics": {
                "cache_hits": m.page_cache_hits,
                "cache_misses": m.page_cache_misses,
                "cache_hit_ratio": m.cache_hit_ratio(),
                "pages_written": m.pages_written,
                "rows_materialized": m.rows_materialized,
                "null_cells_written": m.null_cells_written,
            },
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("Output:   {}", report.output.display());
    if let Some(p) = report.mean_output.as_ref() {
        println!("Mean:     {}", p.display());
    }
    println!("Colors:   {} (seed {})", report.colors.display(), report.color_seed);
    println!("History:  {}", report.history.display());
    println!("Extent:   {}x{}", report.rows, report.cols);
    println!("Null:     {} cell(s)", report.null_cells);
    match report.max_label {
        Some(l) => println!("MaxLabel: {}", l),
        None => println!("MaxLabel: -"),
    }
    for (step, outcome) in &teardown.steps {
        println!("Teardown: {:<16} {:?}", step.to_string(), outcome);
    }
    Ok(())
}
