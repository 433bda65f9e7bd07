//! In-memory provider and clock for scanner and runner tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rsi_scanner_core::candle::Candle;
use rsi_scanner_providers::error::ProviderError;
use rsi_scanner_providers::provider::MarketDataProvider;
use rust_decimal::Decimal;

use crate::scanner::Clock;

pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 100 five-minute candles: 99 closes alternating 100/101, then a final
/// close moved by `last_move`. Every volume is `volume` except the last.
pub fn zigzag_candles(last_move: i64, volume: Decimal, last_volume: Decimal) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 6, 10, 0).unwrap();
    let mut closes: Vec<i64> = (0..99).map(|i| 100 + i % 2).collect();
    closes.push(closes[98] + last_move);

    let last = closes.len() - 1;
    closes
        .into_iter()
        .enumerate()
        .map(|(i, close)| {
            let close = Decimal::from(close);
            Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: if i == last { last_volume } else { volume },
            }
        })
        .collect()
}

#[derive(Default)]
pub struct MockProvider {
    candles: BTreeMap<String, Option<Vec<Candle>>>,
    list_failures: AtomicUsize,
    requests: Mutex<Vec<(String, String, u16)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(symbol.to_string(), Some(candles));
        self
    }

    /// List `symbol` but fail every candle fetch for it.
    pub fn with_failing_symbol(mut self, symbol: &str) -> Self {
        self.candles.insert(symbol.to_string(), None);
        self
    }

    /// Fail the next `times` calls to `list_symbols`.
    pub fn failing_list(self, times: usize) -> Self {
        self.list_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<(String, String, u16)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let should_fail = self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ProviderError::Api {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(self.candles.keys().cloned().collect())
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((symbol.to_string(), interval.to_string(), limit));

        match self.candles.get(symbol) {
            Some(Some(candles)) => Ok(candles.clone()),
            _ => Err(ProviderError::Api {
                status: 400,
                message: "Invalid symbol. (code -1121)".to_string(),
            }),
        }
    }
}
