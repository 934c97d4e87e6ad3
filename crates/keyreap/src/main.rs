use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use keyreap::cli::Cli;
use keyreap::{reap, StopReason, StopToken, TracingReporter};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // The store client is chatty at info; keep it at warn unless RUST_LOG says otherwise.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keyreap_store=warn"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve()?;

    info!("Using the following options:");
    for line in toml::to_string(&config)?.lines() {
        info!("  {}", line);
    }

    let stop = StopToken::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current row");
            on_interrupt.stop(StopReason::Interrupted);
        }
    });

    match reap(&config, Arc::new(TracingReporter), stop).await {
        Ok(report) => {
            if cli.report_json {
                println!("{}", serde_json::to_string(&report)?);
            }
            Ok(())
        }
        Err(aborted) => {
            error!("Partial count: {}", aborted.report);
            if cli.report_json {
                println!("{}", serde_json::to_string(&aborted.report)?);
            }
            Err(aborted.into())
        }
    }
}
