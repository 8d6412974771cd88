//! Candle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::OHLCV;

/// One OHLCV bar of an instrument at a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start of the bar, UTC
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp.timestamp())
    }
}

/// Higher-timeframe candle with bookkeeping about how it was built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCandle {
    pub candle: Candle,
    /// Number of base candles rolled into this one
    pub base_count: usize,
    /// False only for a trailing bucket that is still filling up
    pub complete: bool,
}

impl OHLCV for AggregatedCandle {
    fn open(&self) -> f64 {
        self.candle.open
    }

    fn high(&self) -> f64 {
        self.candle.high
    }

    fn low(&self) -> f64 {
        self.candle.low
    }

    fn close(&self) -> f64 {
        self.candle.close
    }

    fn volume(&self) -> f64 {
        self.candle.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.candle.timestamp.timestamp())
    }
}
