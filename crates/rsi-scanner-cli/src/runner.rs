use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rsi_scanner_core::render::write_report;
use rsi_scanner_providers::provider::MarketDataProvider;
use tracing::{error, info};

use crate::scanner::{Clock, ScanOutcome, scan_markets};

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Report destination, replaced after every successful cycle.
    pub output: PathBuf,
    /// Pause after a successful cycle, measured from the end of the cycle.
    pub interval: Duration,
    /// Pause after a failed cycle.
    pub retry_delay: Duration,
    /// Maximum symbols fetched at once.
    pub concurrency: usize,
    /// Draw a progress bar while scanning.
    pub progress: bool,
}

/// Drives scan-and-render cycles.
pub struct Runner {
    provider: Box<dyn MarketDataProvider>,
    clock: Box<dyn Clock>,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        provider: Box<dyn MarketDataProvider>,
        clock: Box<dyn Clock>,
        settings: RunSettings,
    ) -> Self {
        Self {
            provider,
            clock,
            settings,
        }
    }

    /// Scan all symbols and write the report. The report file is left
    /// untouched if the scan fails.
    pub async fn run_cycle(&self) -> Result<ScanOutcome> {
        let outcome = scan_markets(
            self.provider.as_ref(),
            self.clock.as_ref(),
            self.settings.concurrency,
            self.settings.progress,
        )
        .await
        .with_context(|| format!("failed to list symbols from {}", self.provider.name()))?;

        write_report(&self.settings.output, &outcome.report).with_context(|| {
            format!(
                "failed to write report to {}",
                self.settings.output.display()
            )
        })?;

        Ok(outcome)
    }

    /// Run one cycle and return how long to wait before the next one.
    pub async fn tick(&self) -> Duration {
        info!("starting scan");
        let started = Instant::now();

        match self.run_cycle().await {
            Ok(outcome) => {
                info!(
                    "scan completed in {:.2}s, {} result(s) written to {}",
                    started.elapsed().as_secs_f64(),
                    outcome.report.results().len(),
                    self.settings.output.display()
                );
                self.settings.interval
            }
            Err(e) => {
                error!(
                    "scan failed after {:.2}s: {e:#}",
                    started.elapsed().as_secs_f64()
                );
                self.settings.retry_delay
            }
        }
    }

    /// Run cycles until the process is terminated.
    pub async fn run_forever(&self) {
        loop {
            let delay = self.tick().await;
            info!("next scan in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }
}
