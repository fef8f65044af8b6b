use anyhow::{Context, Result};
use clap::Parser;
use trendtap_common::observability::{init_logging, LogConfig};
use trendtap_config::TrendtapConfigLoader;

mod bootstrap;
mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    // Load config (env wins over the file, flags win over both)
    let mut cfg = TrendtapConfigLoader::new()
        .with_file(&args.config)
        .load()
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    args.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let log_path = init_logging(LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
        ..LogConfig::default()
    })?;
    tracing::info!(
        log = %log_path.display(),
        config = %args.config.display(),
        version = cfg.version.as_deref().unwrap_or("-"),
        "trendtap.start"
    );

    let ingest = bootstrap::build_from_config(&cfg).await?;
    let summary = ingest.run(&bootstrap::query(&cfg)).await?;

    tracing::info!(
        fetched = summary.fetched,
        stored = summary.stored,
        dropped = summary.dropped,
        "trendtap.done"
    );
    Ok(())
}
