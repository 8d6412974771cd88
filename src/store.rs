//! Candle sources.
//!
//! Only one base timeframe is ever stored; every other timeframe is derived on
//! load by [`TimeframeLoader`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    aggregate::{aggregate, complete_only, into_candles},
    candle::Candle,
    timeframe::Timeframe,
    PatternError, Result,
};

/// Read access to persisted base candles
pub trait CandleStore: Send + Sync {
    fn base_timeframe(&self) -> Timeframe;

    /// Base candles with `start <= timestamp <= end`, ascending and unique.
    ///
    /// Asking for any timeframe other than the base one is `InvalidTimeframe`.
    fn fetch_candles(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

impl<S: CandleStore + ?Sized> CandleStore for &S {
    fn base_timeframe(&self) -> Timeframe {
        (**self).base_timeframe()
    }

    fn fetch_candles(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        (**self).fetch_candles(instrument_id, timeframe, start, end)
    }
}

/// Map-backed store, deduplicated by timestamp
#[derive(Debug, Clone)]
pub struct InMemoryCandleStore {
    base: Timeframe,
    series: HashMap<String, BTreeMap<DateTime<Utc>, Candle>>,
}

impl InMemoryCandleStore {
    pub fn new(base: Timeframe) -> Self {
        Self {
            base,
            series: HashMap::new(),
        }
    }

    /// Add candles; a timestamp already present is overwritten.
    pub fn insert(&mut self, instrument_id: impl Into<String>, candles: impl IntoIterator<Item = Candle>) {
        let series = self.series.entry(instrument_id.into()).or_default();
        for candle in candles {
            series.insert(candle.timestamp, candle);
        }
    }

    pub fn len(&self, instrument_id: &str) -> usize {
        self.series.get(instrument_id).map_or(0, BTreeMap::len)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl CandleStore for InMemoryCandleStore {
    fn base_timeframe(&self) -> Timeframe {
        self.base
    }

    fn fetch_candles(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if timeframe != self.base {
            return Err(PatternError::InvalidTimeframe(format!(
                "store holds {} candles only, {timeframe} must be aggregated",
                self.base
            )));
        }
        let series = self
            .series
            .get(instrument_id)
            .ok_or_else(|| PatternError::Store(format!("unknown instrument {instrument_id}")))?;
        if end < start {
            return Ok(Vec::new());
        }
        Ok(series.range(start..=end).map(|(_, c)| *c).collect())
    }
}

// ============================================================
// LOADER
// ============================================================

/// Loads any timeframe at or above the store's base one.
pub struct TimeframeLoader<'a, S: ?Sized> {
    store: &'a S,
    drop_incomplete: bool,
}

impl<S: ?Sized> Clone for TimeframeLoader<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for TimeframeLoader<'_, S> {}

impl<'a, S: CandleStore + ?Sized> TimeframeLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            drop_incomplete: true,
        }
    }

    /// Keep a still-filling trailing bucket.
    pub fn keep_incomplete(mut self) -> Self {
        self.drop_incomplete = false;
        self
    }

    pub fn drop_incomplete(mut self, drop: bool) -> Self {
        self.drop_incomplete = drop;
        self
    }

    /// Candles of `timeframe` whose buckets start in `[start, end]`.
    ///
    /// `start` is moved back to its bucket boundary so the first bucket is
    /// whole. A range without base candles is `AlignmentMismatch`.
    pub fn load(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let base_tf = self.store.base_timeframe();
        if timeframe < base_tf {
            return Err(PatternError::InvalidTimeframe(format!(
                "{timeframe} is below the stored {base_tf}"
            )));
        }
        let aligned = timeframe.bucket_start(start);
        let base = self.store.fetch_candles(instrument_id, base_tf, aligned, end)?;
        if base.is_empty() {
            return Err(PatternError::AlignmentMismatch { timeframe });
        }

        let buckets = aggregate(&base, base_tf, timeframe)?;
        let kept = if self.drop_incomplete {
            complete_only(&buckets)
        } else {
            &buckets[..]
        };
        debug!(
            instrument_id,
            %timeframe,
            base = base.len(),
            loaded = kept.len(),
            "loaded candles"
        );
        Ok(into_candles(kept))
    }
}
