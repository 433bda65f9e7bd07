//! RSI and volume-change computation for one symbol's candle window.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::error::ScanError;
use crate::signal::Signal;

/// Lookback used for RSI.
pub const RSI_PERIOD: usize = 14;

/// Minimum candles needed to produce a current and a previous RSI value.
pub const MIN_CANDLES: usize = RSI_PERIOD + 1;

/// Momentum snapshot for a single symbol. Values are unrounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub symbol: String,
    pub current_price: Decimal,
    pub current_rsi: f64,
    pub previous_rsi: f64,
    pub rsi_diff: f64,
    /// Percent change between the last two candle volumes.
    /// `None` when the previous volume is zero.
    pub volume_change: Option<f64>,
    pub signal: Signal,
}

/// Wilder's RSI over a close series.
///
/// Gains and losses are smoothed with an exponential average of weight
/// `1 / period`, starting from a zero change at the first close. Values are
/// emitted once `period` closes have been seen, so element `i` of the output
/// corresponds to `closes[i + period - 1]`. Returns an empty vec when there
/// are fewer than `period` closes.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut values = Vec::with_capacity(closes.len() + 1 - period);

    if period == 1 {
        values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    for (i, pair) in closes.windows(2).enumerate() {
        let change = pair[1] - pair[0];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain += alpha * (gain - avg_gain);
        avg_loss += alpha * (loss - avg_loss);

        if i + 2 >= period {
            values.push(rsi_from_averages(avg_gain, avg_loss));
        }
    }

    values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // A flat window has no momentum in either direction.
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Percent change from `previous` to `current` volume.
/// Returns `None` if `previous` is zero or the arithmetic overflows.
pub fn volume_change(previous: Decimal, current: Decimal) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    current
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_f64()
}

/// Compute RSI(14), the one-step RSI change and the volume change for a symbol.
/// `candles` must be ordered oldest to newest.
pub fn compute_indicators(symbol: &str, candles: &[Candle]) -> Result<IndicatorResult, ScanError> {
    let [.., previous_candle, current_candle] = candles else {
        return Err(insufficient(symbol, candles.len()));
    };

    let closes = candles
        .iter()
        .map(|c| {
            c.close.to_f64().ok_or_else(|| {
                ScanError::InvalidData(format!(
                    "{symbol}: close {} is not representable",
                    c.close
                ))
            })
        })
        .collect::<Result<Vec<f64>, ScanError>>()?;

    let rsi = rsi_series(&closes, RSI_PERIOD);
    let [.., previous_rsi, current_rsi] = rsi.as_slice() else {
        return Err(insufficient(symbol, candles.len()));
    };
    let (current_rsi, previous_rsi) = (*current_rsi, *previous_rsi);
    let rsi_diff = current_rsi - previous_rsi;

    Ok(IndicatorResult {
        symbol: symbol.to_string(),
        current_price: current_candle.close,
        current_rsi,
        previous_rsi,
        rsi_diff,
        volume_change: volume_change(previous_candle.volume, current_candle.volume),
        signal: Signal::classify(rsi_diff),
    })
}

fn insufficient(symbol: &str, actual: usize) -> ScanError {
    ScanError::InsufficientData {
        symbol: symbol.to_string(),
        required: MIN_CANDLES,
        actual,
    }
}
