//! Top-level detection entry point.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, info_span};

use crate::{
    candlestick::{CandlestickScanner, ScannerBuilder},
    config::DetectionConfig,
    confirm::{CancellationToken, ConfirmationEngine},
    geometry::GeometricScanner,
    record::DetectedPattern,
    store::{CandleStore, TimeframeLoader},
    timeframe::Timeframe,
    ContextProvider, DefaultContextProvider, PatternError, Result,
};

/// One instrument and timeframe to scan
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub instrument_id: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Falls back to the service's configured minimum
    pub min_pattern_length: Option<usize>,
}

impl DetectionRequest {
    pub fn new(
        instrument_id: impl Into<String>,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timeframe,
            start,
            end,
            min_pattern_length: None,
        }
    }

    pub fn min_pattern_length(mut self, len: usize) -> Self {
        self.min_pattern_length = Some(len);
        self
    }
}

/// Patterns of one successful request
#[derive(Debug)]
pub struct ScanResult {
    pub request: DetectionRequest,
    pub patterns: Vec<DetectedPattern>,
}

/// Failure of one request
#[derive(Debug)]
pub struct ScanError {
    pub request: DetectionRequest,
    pub error: PatternError,
}

/// Loads candles, runs both scanners and confirms their findings.
pub struct DetectionService<S: CandleStore, C: ContextProvider = DefaultContextProvider> {
    store: S,
    config: DetectionConfig,
    geometric: GeometricScanner,
    candlestick: CandlestickScanner<C>,
}

impl<S: CandleStore> DetectionService<S> {
    /// Service with every builtin formation enabled.
    pub fn new(store: S, config: DetectionConfig) -> Result<Self> {
        let candlestick = ScannerBuilder::from_config(config.candlestick.clone())
            .with_all_defaults()
            .window_padding(config.window_padding)
            .build()?;
        Self::with_scanner(store, config, candlestick)
    }
}

impl<S: CandleStore, C: ContextProvider> DetectionService<S, C> {
    /// Service around a custom candlestick scanner.
    pub fn with_scanner(store: S, config: DetectionConfig, candlestick: CandlestickScanner<C>) -> Result<Self> {
        config.validate()?;
        let geometric = GeometricScanner::new(config.geometry.clone())?.with_padding(config.window_padding);
        Ok(Self {
            store,
            config,
            geometric,
            candlestick,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Detect and confirm formations of `instrument_id` on `timeframe`.
    ///
    /// Fewer candles than `min_pattern_length` yields an empty list. Results are
    /// ordered by start date, then by name.
    pub fn detect_patterns(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_pattern_length: usize,
    ) -> Result<Vec<DetectedPattern>> {
        self.detect_patterns_with(
            instrument_id,
            timeframe,
            start,
            end,
            min_pattern_length,
            &CancellationToken::new(),
        )
    }

    /// [`detect_patterns`](Self::detect_patterns) that aborts with `Cancelled`
    /// once `token` fires.
    pub fn detect_patterns_with(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_pattern_length: usize,
        token: &CancellationToken,
    ) -> Result<Vec<DetectedPattern>> {
        let span = info_span!("detect_patterns", instrument_id, %timeframe);
        let _guard = span.enter();
        token.check()?;

        let base = self.store.base_timeframe();
        if timeframe < base {
            return Err(PatternError::InvalidTimeframe(format!(
                "{timeframe} is below the stored {base}"
            )));
        }

        let loader = TimeframeLoader::new(&self.store).drop_incomplete(self.config.drop_incomplete);
        let candles = match loader.load(instrument_id, timeframe, start, end) {
            Ok(candles) => candles,
            Err(PatternError::AlignmentMismatch { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        if candles.len() < min_pattern_length {
            debug!(candles = candles.len(), min_pattern_length, "too few candles");
            return Ok(Vec::new());
        }

        let (geometric, candlestick) = rayon::join(
            || tolerate_short(self.geometric.detect(&candles, timeframe, min_pattern_length)),
            || tolerate_short(self.candlestick.detect(&candles, timeframe)),
        );
        let mut found = geometric?;
        found.extend(candlestick?);
        debug!(found = found.len(), "primary scan");

        token.check()?;
        let engine = ConfirmationEngine::new(
            &self.store,
            &self.geometric,
            &self.candlestick,
            &self.config,
            min_pattern_length,
        );
        let mut confirmed = engine.confirm_all(instrument_id, found, token)?;

        for pattern in &mut confirmed {
            pattern.instrument_id = instrument_id.to_string();
        }
        confirmed.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.pattern_name.cmp(&b.pattern_name))
        });
        info!(patterns = confirmed.len(), "detection complete");
        Ok(confirmed)
    }

    /// Run one detection per request on the rayon pool.
    pub fn detect_parallel(&self, requests: Vec<DetectionRequest>) -> (Vec<ScanResult>, Vec<ScanError>) {
        let results: Vec<_> = requests
            .into_par_iter()
            .map(|request| {
                let min = request
                    .min_pattern_length
                    .unwrap_or(self.config.min_pattern_length);
                match self.detect_patterns(&request.instrument_id, request.timeframe, request.start, request.end, min) {
                    Ok(patterns) => Ok(ScanResult { request, patterns }),
                    Err(error) => Err(ScanError { request, error }),
                }
            })
            .collect();

        let mut successes = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(r) => successes.push(r),
                Err(e) => errors.push(e),
            }
        }
        (successes, errors)
    }
}

/// A scanner that needs more candles than the series has finds nothing.
fn tolerate_short(result: Result<Vec<DetectedPattern>>) -> Result<Vec<DetectedPattern>> {
    match result {
        Err(PatternError::InsufficientData { .. }) => Ok(Vec::new()),
        other => other,
    }
}
