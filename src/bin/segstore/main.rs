use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod cmd_init;
mod cmd_put;
mod cmd_materialize;
mod cmd_show;
mod cmd_status;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт: info.
    // Пример: RUST_LOG=debug ./segstore materialize ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Init { path, rows, cols, bands, bounds } =>
            cmd_init::exec(path, rows, cols, bands, bounds),

        cli::Cmd::Put { path, row, col, label, bands, null } =>
            cmd_put::exec(path, row, col, label, bands, null),

        cli::Cmd::Materialize { path, output, mean, out_dir, overwrite, json } =>
            cmd_materialize::exec(path, output, mean, out_dir, overwrite, json),

        cli::Cmd::Show { raster, json } =>
            cmd_show::exec(raster, json),

        cli::Cmd::Status { path, json } =>
            cmd_status::exec(path, json),
    }
}
