//! kcm-e2e - management-cluster bootstrap for the kcm end-to-end suite

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kcm_e2e::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Cli::parse().run().await?;
    Ok(())
}
