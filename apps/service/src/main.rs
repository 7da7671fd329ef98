//! rangepull service entry point.
//!
//! Usage: `rangepull-service [JOBS_FILE]`. Job messages are read from
//! stdin when no file is given.

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries outcome events.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rangepull=debug")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting rangepull service"
    );

    let config = config::Config::load()?;
    tracing::info!(
        part_size = config.engine.part_size_bytes,
        max_jobs = config.service.max_concurrent_jobs,
        gate = config.engine.free_space_percentage_threshold.is_some()
            && config.engine.free_space_filesystem.is_some(),
        "configuration loaded"
    );

    let input = std::env::args_os().nth(1).map(PathBuf::from);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, input))?;

    tracing::info!("service shut down cleanly");
    Ok(())
}
