//! `bkreaper` is the reaping daemon for boxkeeper.
//!
//! # Overview
//!
//! Runs the reaper on a fixed interval, independent of any user request.
//! Each tick lists every managed box, terminates the ones whose ttl has
//! elapsed, and logs the pass summary.
//!
//! ## Usage
//!
//! ```bash
//! bkreaper --config boxkeeper.yaml
//! ```
//!
//! Run a single pass and exit (for external schedulers):
//!
//! ```bash
//! bkreaper --config boxkeeper.yaml --once
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use boxkeeper::{
    config::{BoxkeeperConfig, DEFAULT_CONFIG_FILENAME},
    provider::RestComputeProvider,
    reaper::Reaper,
    utils, BoxkeeperResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Arguments for the `bkreaper` daemon.
#[derive(Debug, Parser)]
#[command(name = "bkreaper", author, about, version)]
struct BkreaperArgs {
    /// Path to the boxkeeper config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    /// Override the reap interval in seconds.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Run a single reaping pass and exit.
    #[arg(long)]
    once: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> BoxkeeperResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = BkreaperArgs::parse();

    let mut config = BoxkeeperConfig::load(&args.config).await?;
    utils::apply_env_overrides(&mut config);
    if let Some(interval_secs) = args.interval_secs {
        config.set_reap_interval_secs(interval_secs);
    }
    config.validate()?;

    let provider = Arc::new(RestComputeProvider::new(
        config.get_provider_endpoint(),
        config.get_provider_token().clone(),
    ));
    let reaper = Reaper::new(provider, &config);

    if args.once {
        run_pass(&reaper).await;
        return Ok(());
    }

    tracing::info!(
        "reaping every {} seconds",
        config.get_reap_interval_secs()
    );
    let mut ticker = tokio::time::interval(config.reap_interval());
    loop {
        ticker.tick().await;
        run_pass(&reaper).await;
    }
}

/// Runs one reaping pass, logging the summary instead of exiting on failure.
async fn run_pass(reaper: &Reaper) {
    match reaper.reap().await {
        Ok(report) => match report.into_result() {
            Ok(reaped) if reaped.is_empty() => {}
            Ok(reaped) => tracing::info!("reaped boxes: {}", reaped.join(", ")),
            Err(partial) => tracing::warn!("{}", partial),
        },
        Err(e) => tracing::error!("reaping pass failed: {}", e),
    }
}
