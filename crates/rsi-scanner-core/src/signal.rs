use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum one-step RSI swing (in RSI points) that produces a directional signal.
pub const SIGNAL_THRESHOLD: f64 = 20.0;

/// Trade signal derived from the one-step RSI change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Long,
    Short,
    Neutral,
}

impl Signal {
    /// Classify an RSI difference. Both thresholds are inclusive.
    pub fn classify(rsi_diff: f64) -> Self {
        if rsi_diff >= SIGNAL_THRESHOLD {
            Signal::Long
        } else if rsi_diff <= -SIGNAL_THRESHOLD {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }

    pub fn is_directional(self) -> bool {
        self != Signal::Neutral
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
