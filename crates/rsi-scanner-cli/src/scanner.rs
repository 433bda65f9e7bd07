use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use rsi_scanner_core::error::ScanError;
use rsi_scanner_core::indicator::{IndicatorResult, compute_indicators};
use rsi_scanner_core::report::ScanReport;
use rsi_scanner_providers::error::ProviderError;
use rsi_scanner_providers::provider::MarketDataProvider;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Candle interval requested for every symbol.
pub const TIMEFRAME: &str = "5m";

/// Number of most recent candles requested per symbol.
pub const CANDLE_LIMIT: u16 = 100;

const PROGRESS_EVERY: usize = 50;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} symbols ({eta})";

/// Source of the report timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why a single symbol was left out of a scan.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("indicator failed: {0}")]
    Indicator(#[from] ScanError),
}

#[derive(Debug)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: SymbolError,
}

/// A ranked report plus the symbols that could not be scanned.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub failures: Vec<SymbolFailure>,
}

/// Terminal progress bar over `total` symbols. Hidden unless `visible`.
pub fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        bar.set_style(style.progress_chars("##-"));
    }
    bar
}

/// Fetch recent candles for one symbol and compute its indicators.
pub async fn scan_symbol(
    provider: &dyn MarketDataProvider,
    symbol: &str,
) -> Result<IndicatorResult, SymbolError> {
    let candles = provider
        .fetch_candles(symbol, TIMEFRAME, CANDLE_LIMIT)
        .await?;
    Ok(compute_indicators(symbol, &candles)?)
}

/// Scan every symbol the provider lists and build a ranked report.
///
/// Only a failure to list symbols fails the scan. A symbol whose fetch or
/// indicator computation fails is logged, recorded in
/// [`ScanOutcome::failures`] and excluded from the report. At most
/// `concurrency` symbols are fetched at once. With `show_progress` a
/// progress bar is drawn on stderr alongside the periodic progress log.
pub async fn scan_markets(
    provider: &dyn MarketDataProvider,
    clock: &dyn Clock,
    concurrency: usize,
    show_progress: bool,
) -> Result<ScanOutcome, ProviderError> {
    let symbols = provider.list_symbols().await?;
    let total = symbols.len();
    info!("{}: {total} symbol(s) to scan", provider.name());

    let mut pending = stream::iter(symbols)
        .map(|symbol| async move {
            let result = scan_symbol(provider, &symbol).await;
            (symbol, result)
        })
        .buffer_unordered(concurrency.max(1));
    let bar = progress_bar(total, show_progress);

    let mut results = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut processed = 0;

    while let Some((symbol, result)) = pending.next().await {
        processed += 1;
        bar.inc(1);
        match result {
            Ok(result) => {
                debug!(
                    "{symbol}: rsi {:.2} -> {:.2} ({:+.2}), {}",
                    result.previous_rsi, result.current_rsi, result.rsi_diff, result.signal
                );
                results.push(result);
            }
            Err(error) => {
                let failure = SymbolFailure { symbol, error };
                bar.suspend(|| warn!("{}: skipped: {}", failure.symbol, failure.error));
                failures.push(failure);
            }
        }
        if processed % PROGRESS_EVERY == 0 {
            bar.suspend(|| info!("processed {processed}/{total} symbol(s)"));
        }
    }

    bar.finish_and_clear();

    let report = ScanReport::new(clock.now(), results);
    let counts = report.counts();
    info!(
        "scanned {total} symbol(s): {} result(s), {} failure(s), {} long, {} short",
        counts.total,
        failures.len(),
        counts.long,
        counts.short
    );

    Ok(ScanOutcome { report, failures })
}
