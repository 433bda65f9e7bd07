mod runner;
mod scanner;
#[cfg(test)]
mod test_support;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rsi_scanner_providers::binance::{BinanceFuturesProvider, Credentials};
use rsi_scanner_providers::provider::MarketDataProvider;
use tracing::{debug, info};

use crate::runner::{RunSettings, Runner};
use crate::scanner::SystemClock;

#[derive(Parser)]
#[command(
    name = "rsi-scanner",
    about = "Scan perpetual futures for 5-minute RSI swings and render an HTML report"
)]
struct Cli {
    /// HTML report path, overwritten after every successful scan
    #[arg(long, default_value = "rsi_report.html")]
    output: PathBuf,

    /// Seconds to wait after a successful scan
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Seconds to wait before retrying a failed scan
    #[arg(long, default_value_t = 5)]
    retry_secs: u64,

    /// Maximum number of symbols fetched at once (1 = sequential)
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Quote asset of the perpetual contracts to scan
    #[arg(long, default_value = "USDT")]
    quote_asset: String,

    /// Override the Binance futures REST base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run a single scan, write the report and exit
    #[arg(long)]
    once: bool,

    /// Never draw the progress bar, even on a terminal
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn settings(&self) -> RunSettings {
        RunSettings {
            output: self.output.clone(),
            interval: Duration::from_secs(self.interval_secs),
            retry_delay: Duration::from_secs(self.retry_secs),
            concurrency: usize::from(self.concurrency),
            progress: !self.no_progress && std::io::stderr().is_terminal(),
        }
    }
}

fn create_provider(cli: &Cli) -> Result<BinanceFuturesProvider> {
    let credentials = Credentials::from_env().context("failed to read Binance credentials")?;
    let provider = BinanceFuturesProvider::new(credentials, cli.base_url.clone())
        .context("failed to create Binance provider")?
        .with_quote_asset(&cli.quote_asset);
    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let provider = create_provider(&cli)?;
    info!(
        "Using provider: {} ({} perpetuals)",
        provider.name(),
        provider.quote_asset()
    );
    debug!("credentials: {:?}", provider.credentials());

    let settings = cli.settings();
    info!(
        "Report: {}, interval {}s, retry {}s, concurrency {}",
        settings.output.display(),
        settings.interval.as_secs(),
        settings.retry_delay.as_secs(),
        settings.concurrency
    );

    let runner = Runner::new(Box::new(provider), Box::new(SystemClock), settings);

    if cli.once {
        let outcome = runner.run_cycle().await?;
        let counts = outcome.report.counts();
        info!(
            "{} long, {} short, {} total, {} failed",
            counts.long,
            counts.short,
            counts.total,
            outcome.failures.len()
        );
        return Ok(());
    }

    runner.run_forever().await;
    Ok(())
}
