//! Candlestick scanning with volume confirmation.
//!
//! Builtin detectors go through enum dispatch, custom ones through the
//! object-safe [`DynPatternDetector`]. Raw matches carry the formation's fixed
//! base confidence; [`CandlestickScanner::detect`] then scales it by the volume
//! band of the completing candle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    candle::Candle,
    config::CandlestickConfig,
    record::{DetectedPattern, PatternDetail, PatternDraft, PatternWindow, RecordBuilder, ScannerKind},
    timeframe::Timeframe,
    BuiltinDetector, ContextProvider, DefaultContextProvider, DynPatternDetector, MarketContext,
    OHLCVExt, PatternError, PatternId, PatternMatch, Result, OHLCV,
};

// ============================================================
// VOLUME BANDS
// ============================================================

/// Volume of the completing candle relative to its trailing average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeBand {
    Excellent,
    Good,
    Average,
    Weak,
}

impl VolumeBand {
    /// Band for a volume ratio. Without trailing history the band is `Average`.
    pub fn classify(ratio: Option<f64>, config: &CandlestickConfig) -> Self {
        match ratio {
            None => VolumeBand::Average,
            Some(r) if r >= config.excellent_ratio => VolumeBand::Excellent,
            Some(r) if r >= config.good_ratio => VolumeBand::Good,
            Some(r) if r >= config.average_ratio => VolumeBand::Average,
            Some(_) => VolumeBand::Weak,
        }
    }

    pub fn multiplier(self, config: &CandlestickConfig) -> f64 {
        match self {
            VolumeBand::Excellent => config.excellent_multiplier,
            VolumeBand::Good => config.good_multiplier,
            VolumeBand::Average => config.average_multiplier,
            VolumeBand::Weak => config.weak_multiplier,
        }
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Candlestick formation scanner
pub struct CandlestickScanner<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    context_provider: C,
    config: CandlestickConfig,
    pattern_filter: Option<Vec<PatternId>>,
    window_padding: usize,
}

impl CandlestickScanner<DefaultContextProvider> {
    /// Every builtin formation with the given settings.
    pub fn with_config(config: CandlestickConfig) -> Result<Self> {
        ScannerBuilder::from_config(config).with_all_defaults().build()
    }
}

impl<C: ContextProvider> CandlestickScanner<C> {
    pub fn config(&self) -> &CandlestickConfig {
        &self.config
    }

    /// Precompute contexts for all bars.
    #[inline]
    pub fn compute_contexts<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext> {
        self.context_provider.compute_all(bars)
    }

    /// Raw matches at a single bar index.
    pub fn scan_at<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Vec<PatternMatch> {
        if self.custom.is_empty() {
            self.scan_at_internal(bars, &[], index, ctx)
        } else {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            self.scan_at_internal(bars, &bar_refs, index, ctx)
        }
    }

    /// Raw matches over every bar, without volume adjustment.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<PatternMatch>> {
        self.check_input(bars)?;
        let contexts = self.compute_contexts(bars);
        Ok(self.scan_all(bars, &contexts))
    }

    /// Volume-confirmed drafts for any OHLCV series.
    pub fn drafts<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<PatternDraft>> {
        self.check_input(bars)?;
        let contexts = self.compute_contexts(bars);
        let drafts: Vec<PatternDraft> = self
            .scan_all(bars, &contexts)
            .into_iter()
            .map(|m| self.confirm_volume(bars, &contexts, m))
            .collect();
        Ok(drafts)
    }

    /// Full records for one timeframe's candles.
    pub fn detect(&self, candles: &[Candle], timeframe: Timeframe) -> Result<Vec<DetectedPattern>> {
        let drafts = self.drafts(candles)?;
        let builder = RecordBuilder::new(candles, timeframe);
        let records = drafts
            .into_iter()
            .map(|draft| builder.build(draft))
            .collect::<Result<Vec<_>>>()?;
        debug!(%timeframe, candles = candles.len(), found = records.len(), "candlestick scan");
        Ok(records)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn check_input<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        if bars.len() < self.config.min_candles {
            return Err(PatternError::InsufficientData {
                need: self.config.min_candles,
                got: bars.len(),
            });
        }
        if self.config.validate_data {
            for (i, bar) in bars.iter().enumerate() {
                bar.validate().map_err(|e| match e {
                    PatternError::InvalidOHLCV { reason, .. } => {
                        PatternError::InvalidOHLCV { index: i, reason }
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    fn scan_all<T: OHLCV>(&self, bars: &[T], contexts: &[MarketContext]) -> Vec<PatternMatch> {
        let bar_refs: Vec<&dyn OHLCV> = if self.custom.is_empty() {
            Vec::new()
        } else {
            bars.iter().map(|b| b as &dyn OHLCV).collect()
        };
        contexts
            .iter()
            .enumerate()
            .flat_map(|(i, ctx)| self.scan_at_internal(bars, &bar_refs, i, ctx))
            .collect()
    }

    fn scan_at_internal<T: OHLCV>(
        &self,
        bars: &[T],
        bar_refs: &[&dyn OHLCV],
        index: usize,
        ctx: &MarketContext,
    ) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        for detector in &self.builtin {
            if index + 1 >= detector.min_bars() {
                if let Some(m) = detector.detect(bars, index, ctx) {
                    if self.should_include(&m) {
                        results.push(m);
                    }
                }
            }
        }

        if !bar_refs.is_empty() {
            for detector in &self.custom {
                if index + 1 >= detector.min_bars() {
                    if let Some(m) = detector.detect(bar_refs, index, ctx) {
                        if self.should_include(&m) {
                            results.push(m);
                        }
                    }
                }
            }
        }

        results
    }

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(min) = self.config.min_strength {
            if m.strength < min {
                return false;
            }
        }
        if let Some(ref filter) = self.pattern_filter {
            if !filter.contains(&m.pattern_id) {
                return false;
            }
        }
        true
    }

    fn confirm_volume<T: OHLCV>(
        &self,
        bars: &[T],
        contexts: &[MarketContext],
        m: PatternMatch,
    ) -> PatternDraft {
        let avg = contexts
            .get(m.end_index)
            .map(|c| c.avg_volume)
            .unwrap_or(0.0);
        let volume_ratio = match bars.get(m.end_index) {
            Some(bar) if avg > 0.0 => Some(bar.volume() / avg),
            _ => None,
        };
        let band = VolumeBand::classify(volume_ratio, &self.config);
        let confidence = (m.strength * band.multiplier(&self.config)).min(self.config.confidence_cap);

        let (target_price, stop_loss) = protective_levels(bars, &m);

        PatternDraft {
            name: m.pattern_id.as_str(),
            kind: m.pattern_id.kind(),
            signal: m.direction,
            source: ScannerKind::Candlestick,
            window: PatternWindow::new(m.start_index, m.end_index).with_padding(self.window_padding),
            base_confidence: m.strength,
            confidence,
            breakout_price: None,
            target_price,
            stop_loss,
            detail: PatternDetail::Candlestick {
                candle_count: m.candle_count(),
                volume_ratio,
                volume_band: band,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

/// Project the formation's height from its close; stop beyond its far extreme.
fn protective_levels<T: OHLCV>(bars: &[T], m: &PatternMatch) -> (Option<f64>, Option<f64>) {
    let Some(span) = bars.get(m.start_index..=m.end_index) else {
        return (None, None);
    };
    let high = span.iter().map(|b| b.high()).fold(f64::MIN, f64::max);
    let low = span.iter().map(|b| b.low()).fold(f64::MAX, f64::min);
    let height = high - low;
    let close = span.last().map(|b| b.close()).unwrap_or(0.0);
    match m.direction {
        crate::Direction::Bullish => (Some(close + height), Some(low)),
        crate::Direction::Bearish => (Some(close - height), Some(high)),
        crate::Direction::Neutral => (None, None),
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`CandlestickScanner`]
pub struct ScannerBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    config: CandlestickConfig,
    pattern_filter: Option<Vec<PatternId>>,
    window_padding: usize,
}

impl Default for ScannerBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self::from_config(CandlestickConfig::default())
    }

    /// Start from settings; the context periods follow the config.
    pub fn from_config(config: CandlestickConfig) -> Self {
        Self {
            context_provider: DefaultContextProvider {
                trend_period: config.trend_period,
                volume_period: config.volume_period,
                candle_period: config.candle_period,
            },
            builtin: Vec::new(),
            custom: Vec::new(),
            config,
            pattern_filter: None,
            window_padding: PatternWindow::DEFAULT_PADDING,
        }
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl<C: ContextProvider> ScannerBuilder<C> {
    /// Swap the context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> ScannerBuilder<C2> {
        ScannerBuilder {
            context_provider: provider,
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
            pattern_filter: self.pattern_filter,
            window_padding: self.window_padding,
        }
    }

    pub fn with_all_defaults(self) -> Self {
        self.with_single_bar_defaults()
            .with_two_bar_defaults()
            .with_three_bar_defaults()
    }

    /// Single-candle formations (16)
    pub fn with_single_bar_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Doji,
            DragonflyDoji,
            GravestoneDoji,
            LongLeggedDoji,
            RickshawMan,
            Hammer,
            HangingMan,
            InvertedHammer,
            ShootingStar,
            Takuri,
            Marubozu,
            SpinningTop,
            HighWave,
            BeltHold,
            LongLine,
            ShortLine,
        ]);
        self
    }

    /// Two-candle formations (16)
    pub fn with_two_bar_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Engulfing,
            Harami,
            HaramiCross,
            Piercing,
            DarkCloudCover,
            DojiStar,
            TweezerTop,
            TweezerBottom,
            Kicking,
            Counterattack,
            MatchingLow,
            HomingPigeon,
            OnNeck,
            InNeck,
            Thrusting,
            SeparatingLines,
        ]);
        self
    }

    /// Three-candle formations (11)
    pub fn with_three_bar_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            MorningStar,
            EveningStar,
            MorningDojiStar,
            EveningDojiStar,
            AbandonedBaby,
            ThreeWhiteSoldiers,
            ThreeBlackCrows,
            ThreeInside,
            ThreeOutside,
            UpsideGapTwoCrows,
            IdenticalThreeCrows,
        ]);
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (vtable path)
    pub fn add_custom<D: DynPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    pub fn min_strength(mut self, strength: f64) -> Self {
        self.config.min_strength = Some(strength);
        self
    }

    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Keep only the listed formations
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    pub fn window_padding(mut self, padding: usize) -> Self {
        self.window_padding = padding;
        self
    }

    pub fn build(self) -> Result<CandlestickScanner<C>> {
        let scanner = CandlestickScanner {
            builtin: self.builtin,
            custom: self.custom,
            context_provider: self.context_provider,
            config: self.config,
            pattern_filter: self.pattern_filter,
            window_padding: self.window_padding,
        };
        scanner.validate()?;
        Ok(scanner)
    }
}
