//! Cross-timeframe confirmation.
//!
//! A formation found on a primary timeframe is re-scanned one step down and
//! one step up. Each neighbour that independently reports the same formation
//! raises the confirmation level and feeds the alignment score.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::{
    candle::Candle,
    candlestick::CandlestickScanner,
    config::{DetectionConfig, FusionConfig},
    geometry::GeometricScanner,
    record::{DetectedPattern, ScannerKind},
    store::{CandleStore, TimeframeLoader},
    timeframe::Timeframe,
    ContextProvider, PatternError, Result,
};

// ============================================================
// CANCELLATION
// ============================================================

/// Shared cancel flag with an optional deadline.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PatternError::Cancelled);
        }
        Ok(())
    }
}

// ============================================================
// STATE
// ============================================================

/// Lifecycle of one formation's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationState {
    Detected,
    Checking { neighbors: Vec<Timeframe> },
    Confirmed { level: u8 },
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed { .. })
    }

    pub fn level(&self) -> Option<u8> {
        match self {
            ConfirmationState::Confirmed { level } => Some(*level),
            _ => None,
        }
    }
}

/// Boost `confidence` by the confirmation level, capped.
///
/// `min(c × (1 + boost × (level − 1)), cap)`
pub fn fuse_confidence(confidence: f64, level: u8, config: &FusionConfig) -> f64 {
    let extra = f64::from(level.saturating_sub(1));
    (confidence * (1.0 + config.boost_per_timeframe * extra)).min(config.cap)
}

// ============================================================
// ENGINE
// ============================================================

/// Re-runs a formation's scanner on the neighbouring timeframes.
pub struct ConfirmationEngine<'a, S: ?Sized, C: ContextProvider> {
    loader: TimeframeLoader<'a, S>,
    geometric: &'a GeometricScanner,
    candlestick: &'a CandlestickScanner<C>,
    config: &'a DetectionConfig,
    min_pattern_length: usize,
}

impl<'a, S, C> ConfirmationEngine<'a, S, C>
where
    S: CandleStore + ?Sized,
    C: ContextProvider,
{
    pub fn new(
        store: &'a S,
        geometric: &'a GeometricScanner,
        candlestick: &'a CandlestickScanner<C>,
        config: &'a DetectionConfig,
        min_pattern_length: usize,
    ) -> Self {
        Self {
            loader: TimeframeLoader::new(store).drop_incomplete(config.drop_incomplete),
            geometric,
            candlestick,
            config,
            min_pattern_length,
        }
    }

    /// Confirm every pattern; patterns are processed in parallel.
    pub fn confirm_all(
        &self,
        instrument_id: &str,
        patterns: Vec<DetectedPattern>,
        token: &CancellationToken,
    ) -> Result<Vec<DetectedPattern>> {
        patterns
            .into_par_iter()
            .map(|p| self.confirm(instrument_id, p, token))
            .collect()
    }

    /// Drive one pattern from `Detected` to `Confirmed`.
    pub fn confirm(
        &self,
        instrument_id: &str,
        mut pattern: DetectedPattern,
        token: &CancellationToken,
    ) -> Result<DetectedPattern> {
        let mut state = ConfirmationState::Detected;
        trace!(pattern = %pattern.pattern_name, ?state);

        let neighbors = pattern.primary_timeframe.neighbors();
        state = ConfirmationState::Checking {
            neighbors: neighbors.clone(),
        };
        trace!(pattern = %pattern.pattern_name, ?state);

        let checks = neighbors
            .par_iter()
            .map(|&tf| self.check_neighbor(instrument_id, &pattern, tf, token))
            .collect::<Result<Vec<_>>>()?;
        let confirming: Vec<(Timeframe, f64)> = checks.into_iter().flatten().collect();

        let level = (1 + confirming.len()).min(usize::from(self.config.fusion.max_level)) as u8;
        let prior = pattern.confidence_score;
        let total: f64 = prior + confirming.iter().map(|(_, c)| c).sum::<f64>();

        pattern
            .detected_on_timeframes
            .extend(confirming.iter().map(|(tf, _)| *tf));
        pattern.alignment_score = total / (1 + confirming.len()) as f64;
        pattern.confirmation_level = level;
        pattern.confidence_score = fuse_confidence(prior, level, &self.config.fusion);

        state = ConfirmationState::Confirmed { level };
        debug!(
            pattern = %pattern.pattern_name,
            timeframe = %pattern.primary_timeframe,
            ?state,
            confidence = pattern.confidence_score,
            "confirmed"
        );
        Ok(pattern)
    }

    /// Best confidence of a matching formation on `tf`, or `None` when the
    /// neighbour does not confirm.
    fn check_neighbor(
        &self,
        instrument_id: &str,
        pattern: &DetectedPattern,
        tf: Timeframe,
        token: &CancellationToken,
    ) -> Result<Option<(Timeframe, f64)>> {
        token.check()?;

        let pad = tf.duration() * self.config.window_padding as i32;
        let start = shift(pattern.start_date, -pad);
        let end = shift(pattern.end_date, pad);

        let candles = match self.loader.load(instrument_id, tf, start, end) {
            Ok(c) => c,
            Err(e) if e.is_non_confirming() => {
                trace!(%tf, error = %e, "neighbour skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if candles.len() < self.min_pattern_length {
            trace!(%tf, candles = candles.len(), "neighbour window too short");
            return Ok(None);
        }

        let found = match self.rescan(pattern.source, &candles, tf) {
            Ok(found) => found,
            Err(e) if e.is_non_confirming() => return Ok(None),
            Err(e) => return Err(e),
        };
        let best = found
            .iter()
            .filter(|p| p.same_formation(pattern))
            .map(|p| p.confidence_score)
            .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))));
        Ok(best.map(|c| (tf, c)))
    }

    fn rescan(&self, source: ScannerKind, candles: &[Candle], tf: Timeframe) -> Result<Vec<DetectedPattern>> {
        match source {
            ScannerKind::Geometric => self.geometric.detect(candles, tf, self.min_pattern_length),
            ScannerKind::Candlestick => self.candlestick.detect(candles, tf),
        }
    }
}

fn shift(ts: DateTime<Utc>, by: TimeDelta) -> DateTime<Utc> {
    ts.checked_add_signed(by).unwrap_or(if by < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
