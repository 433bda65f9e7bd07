use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use rsi_scanner_core::candle::Candle;
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::MarketDataProvider;

const BINANCE_FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_QUOTE_ASSET: &str = "USDT";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Binance API key pair. `Debug` never prints either value in full.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `BINANCE_API_KEY` and `BINANCE_API_SECRET` from the environment.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| ProviderError::Config("BINANCE_API_KEY not set".into()))?;
        let api_secret = std::env::var("BINANCE_API_SECRET")
            .map_err(|_| ProviderError::Config("BINANCE_API_SECRET not set".into()))?;
        Ok(Self::new(api_key, api_secret))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &format_args!("<{} chars>", self.api_secret.len()))
            .finish()
    }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Binance USDⓈ-M futures market data provider.
/// Sends the API key in the `X-MBX-APIKEY` header.
pub struct BinanceFuturesProvider {
    client: Client,
    credentials: Credentials,
    base_url: String,
    quote_asset: String,
}

impl BinanceFuturesProvider {
    /// Create with explicit credentials and optional base URL override.
    pub fn new(credentials: Credentials, base_url: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| BINANCE_FUTURES_BASE_URL.to_string());

        Ok(Self {
            client,
            credentials,
            base_url,
            quote_asset: DEFAULT_QUOTE_ASSET.to_string(),
        })
    }

    /// Restrict [`MarketDataProvider::list_symbols`] to contracts quoted in `quote_asset`.
    pub fn with_quote_asset(mut self, quote_asset: &str) -> Self {
        self.quote_asset = quote_asset.to_uppercase();
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url} {query:?}");

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .query(query)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("failed to parse response from {path}: {e}")))
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();

    // 418 means the IP has been banned after ignoring 429s.
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        return Err(ProviderError::RateLimited {
            retry_after_secs: retry_after_secs(response.headers()),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: api_error_message(&body),
        });
    }

    Ok(response)
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60)
}

/// Binance error payload: `{"code": -1121, "msg": "Invalid symbol."}`.
#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<BinanceErrorBody>(body) {
        Ok(err) => format!("{} (code {})", err.msg, err.code),
        Err(_) => body.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    quote_asset: String,
}

impl ExchangeInfo {
    fn perpetual_symbols(self, quote_asset: &str) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .symbols
            .into_iter()
            .filter(|s| {
                s.status == "TRADING"
                    && s.contract_type == "PERPETUAL"
                    && s.quote_asset == quote_asset
            })
            .map(|s| s.symbol)
            .collect();
        symbols.sort();
        symbols
    }
}

/// Leading fields of one kline row:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume, ...]`.
/// Columns after `volume` are skipped, however many there are.
#[derive(Debug)]
struct BinanceKline {
    open_time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

const KLINE_FIELDS: usize = 6;

impl<'de> Deserialize<'de> for BinanceKline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(KlineVisitor)
    }
}

struct KlineVisitor;

impl<'de> Visitor<'de> for KlineVisitor {
    type Value = BinanceKline;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a kline array with at least {KLINE_FIELDS} elements")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BinanceKline, A::Error> {
        let kline = BinanceKline {
            open_time: next_field(&mut seq, 0)?,
            open: next_field(&mut seq, 1)?,
            high: next_field(&mut seq, 2)?,
            low: next_field(&mut seq, 3)?,
            close: next_field(&mut seq, 4)?,
            volume: next_field(&mut seq, 5)?,
        };
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(kline)
    }
}

fn next_field<'de, A, T>(seq: &mut A, index: usize) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &KlineVisitor))
}

impl BinanceKline {
    fn to_candle(&self) -> Result<Candle, ProviderError> {
        let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(self.open_time)
            .ok_or_else(|| {
                ProviderError::Parse(format!("invalid open time: {}", self.open_time))
            })?;

        Ok(Candle {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesProvider {
    fn name(&self) -> &str {
        "binance-futures"
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let info: ExchangeInfo = self.get_json("/fapi/v1/exchangeInfo", &[]).await?;
        Ok(info.perpetual_symbols(&self.quote_asset))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ProviderError> {
        let limit = limit.to_string();
        let klines: Vec<BinanceKline> = self
            .get_json(
                "/fapi/v1/klines",
                &[("symbol", symbol), ("interval", interval), ("limit", &limit)],
            )
            .await?;

        let mut candles = klines
            .iter()
            .map(BinanceKline::to_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_kline_row() {
        let json = r#"[
            1736951400000, "97150.10", "97310.00", "97100.50", "97250.50", "812.345",
            1736951699999, "78954321.12", 15432, "401.200", "38990000.00", "0"
        ]"#;

        let kline: BinanceKline = serde_json::from_str(json).unwrap();
        let candle = kline.to_candle().unwrap();
        assert_eq!(
            candle.timestamp,
            Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(candle.open, dec!(97150.10));
        assert_eq!(candle.high, dec!(97310.00));
        assert_eq!(candle.low, dec!(97100.50));
        assert_eq!(candle.close, dec!(97250.50));
        assert_eq!(candle.volume, dec!(812.345));
    }

    #[test]
    fn parse_kline_response() {
        let json = r#"[
            [1736951400000, "1.0", "1.2", "0.9", "1.1", "100", 1736951699999, "110", 10, "50", "55", "0"],
            [1736951700000, "1.1", "1.3", "1.0", "1.2", "0", 1736951999999, "0", 0, "0", "0", "0"]
        ]"#;

        let klines: Vec<BinanceKline> = serde_json::from_str(json).unwrap();
        assert_eq!(klines.len(), 2);
        let candles: Vec<Candle> = klines.iter().map(|k| k.to_candle().unwrap()).collect();
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[1].volume, dec!(0));
    }

    #[test]
    fn extra_kline_columns_are_ignored() {
        let json = r#"[
            1736951400000, "97150.10", "97310.00", "97100.50", "97250.50", "812.345",
            1736951699999, "78954321.12", 15432, "401.200", "38990000.00", "0", {"new": [1, 2]}
        ]"#;

        let kline: BinanceKline = serde_json::from_str(json).unwrap();
        assert_eq!(kline.close, dec!(97250.50));
        assert_eq!(kline.volume, dec!(812.345));
    }

    #[test]
    fn six_column_kline_is_enough() {
        let json = r#"[1736951400000, "1.0", "1.2", "0.9", "1.1", "100"]"#;
        let kline: BinanceKline = serde_json::from_str(json).unwrap();
        assert_eq!(kline.to_candle().unwrap().volume, dec!(100));
    }

    #[test]
    fn truncated_kline_is_rejected() {
        let json = r#"[1736951400000, "1.0", "1.2", "0.9", "1.1"]"#;
        let err = serde_json::from_str::<BinanceKline>(json).unwrap_err();
        assert!(err.to_string().contains("invalid length 5"), "got {err}");

        assert!(serde_json::from_str::<BinanceKline>(r#"{"open": "1.0"}"#).is_err());
    }

    #[test]
    fn invalid_open_time_is_parse_error() {
        let kline = BinanceKline {
            open_time: i64::MAX,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
        };
        assert!(matches!(kline.to_candle(), Err(ProviderError::Parse(_))));
    }

    #[test]
    fn exchange_info_keeps_trading_perpetuals_in_quote_asset() {
        let json = r#"{
            "timezone": "UTC",
            "symbols": [
                {"symbol": "ETHUSDT", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDT"},
                {"symbol": "BTCUSDT", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDT"},
                {"symbol": "BTCUSDT_250328", "status": "TRADING", "contractType": "CURRENT_QUARTER", "quoteAsset": "USDT"},
                {"symbol": "LUNAUSDT", "status": "SETTLING", "contractType": "PERPETUAL", "quoteAsset": "USDT"},
                {"symbol": "BTCUSDC", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDC"},
                {"symbol": "OLDUSDT", "status": "TRADING"}
            ]
        }"#;

        let info: ExchangeInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.perpetual_symbols("USDT"), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn exchange_info_filters_by_other_quote() {
        let json = r#"{"symbols": [
            {"symbol": "BTCUSDC", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDC"},
            {"symbol": "BTCUSDT", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDT"}
        ]}"#;

        let info: ExchangeInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.perpetual_symbols("USDC"), vec!["BTCUSDC"]);
    }

    #[test]
    fn api_error_message_uses_binance_payload() {
        assert_eq!(
            api_error_message(r#"{"code": -1121, "msg": "Invalid symbol."}"#),
            "Invalid symbol. (code -1121)"
        );
        assert_eq!(api_error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
    }

    #[test]
    fn retry_after_header_defaults_to_sixty() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), 60);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        assert_eq!(retry_after_secs(&headers), 17);
    }

    #[test]
    fn credentials_debug_is_masked() {
        let creds = Credentials::new("abcdefgh12345678", "supersecretvalue");
        let debug = format!("{creds:?}");
        assert!(debug.contains("****5678"));
        assert!(debug.contains("<16 chars>"));
        assert!(!debug.contains("abcdefgh"));
        assert!(!debug.contains("supersecret"));
    }

    #[test]
    fn new_applies_defaults_and_overrides() {
        let provider = BinanceFuturesProvider::new(Credentials::new("k", "s"), None).unwrap();
        assert_eq!(provider.base_url, BINANCE_FUTURES_BASE_URL);
        assert_eq!(provider.quote_asset(), "USDT");
        assert_eq!(provider.name(), "binance-futures");

        let provider = BinanceFuturesProvider::new(
            Credentials::new("k", "s"),
            Some("http://127.0.0.1:8080/".to_string()),
        )
        .unwrap()
        .with_quote_asset("usdc");
        assert_eq!(provider.base_url, "http://127.0.0.1:8080");
        assert_eq!(provider.quote_asset(), "USDC");
    }
}
