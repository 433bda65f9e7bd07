use async_trait::async_trait;
use rsi_scanner_core::candle::Candle;

use crate::error::ProviderError;

/// Source of tradable symbols and recent candles.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name (for logging/display).
    fn name(&self) -> &str;

    /// List actively traded perpetual contracts quoted in the provider's
    /// configured quote asset, sorted by symbol.
    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError>;

    /// Fetch the `limit` most recent candles of the given interval (e.g. `5m`).
    /// Returns candles sorted by timestamp, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ProviderError>;
}
