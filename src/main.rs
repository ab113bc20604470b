mod config;
mod error;
mod layers;

use crate::config::{Args, Config};
use crate::layers::batch::BatchDownloader;
use crate::layers::discovery::fetch_papers;
use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 0. Load Configuration
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::try_from(Args::parse())?;
    tracing::info!("Setting up config {:?}", config);

    // 1. Discovery
    println!("--- Step 1: Discovery ---");
    let papers = fetch_papers(&config).await;
    println!("Found {} {} papers.", papers.len(), config.venue);

    // 2. Download
    println!("\n--- Step 2: Download ---");
    let report = BatchDownloader::from_config(&config).run(&papers).await?;
    report.log_summary();
    println!("\n{report}");

    Ok(())
}
