//! # MTFPD - Multi-Timeframe Pattern Detector
//!
//! Chart and candlestick pattern detection across aggregated timeframes, with
//! cross-timeframe confirmation and confidence fusion.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use mtfpd::prelude::*;
//!
//! let mut store = InMemoryCandleStore::new(Timeframe::H1);
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let candles: Vec<Candle> = (0..48)
//!     .map(|i| {
//!         let ts = start + chrono::TimeDelta::hours(i);
//!         let p = 100.0 + i as f64 * 0.1;
//!         Candle::new(ts, p, p + 0.5, p - 0.5, p + 0.05, 1_000.0)
//!     })
//!     .collect();
//! store.insert("ACME", candles);
//!
//! let service = DetectionService::new(store, DetectionConfig::default()).unwrap();
//! let end = start + chrono::TimeDelta::hours(47);
//! let patterns = service
//!     .detect_patterns("ACME", Timeframe::H4, start, end, 20)
//!     .unwrap();
//! assert!(patterns.iter().all(|p| p.confirmation_level >= 1));
//! ```

pub mod aggregate;
pub mod candle;
pub mod candlestick;
pub mod config;
pub mod confirm;
pub mod detectors;
pub mod geometry;
pub mod logging;
pub mod params;
pub mod record;
pub mod registry;
pub mod service;
pub mod store;
pub mod timeframe;

pub mod prelude {
    pub use crate::{
        // Aggregation
        aggregate::{aggregate, complete_only, into_candles},
        // Data
        candle::{AggregatedCandle, Candle},
        // Candlestick scanning
        candlestick::{CandlestickScanner, ScannerBuilder, VolumeBand},
        // Configuration
        config::{CandlestickConfig, DetectionConfig, FusionConfig, GeometryConfig},
        // Confirmation
        confirm::{fuse_confidence, CancellationToken, ConfirmationEngine, ConfirmationState},
        // Detectors
        detectors::*,
        // Geometry
        geometry::{ChartFamily, ChartFormation, GeometricScanner},
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Records
        record::{
            DetectedPattern, KeyPoint, PatternDetail, PatternDraft, PatternWindow, PivotPoint,
            RecordBuilder, ScannerKind, TrendlineRecord,
        },
        // Strategies
        registry::{Signal, SignalStrategy, StrategyRegistry},
        // Service
        service::{DetectionRequest, DetectionService, ScanError, ScanResult},
        // Store
        store::{CandleStore, InMemoryCandleStore, TimeframeLoader},
        timeframe::Timeframe,
        BuiltinDetector,
        ContextProvider,
        DefaultContextProvider,
        Direction,
        DynPatternDetector,
        MarketContext,
        OHLCVExt,
        PatternDetector,
        // Errors
        PatternError,
        PatternId,
        PatternKind,
        PatternMatch,
        Period,
        Ratio,
        Result,
        Trend,
        OHLCV,
    };
}

use timeframe::Timeframe;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during aggregation, scanning and confirmation
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Malformed candle sequence at index {index}: {reason}")]
    MalformedSequence { index: usize, reason: &'static str },

    #[error("No candles overlap the requested window on {timeframe}")]
    AlignmentMismatch { timeframe: Timeframe },

    #[error("Detection cancelled")]
    Cancelled,

    #[error("Candle store error: {0}")]
    Store(String),
}

impl PatternError {
    /// Errors a neighbour-timeframe check swallows as "not confirming".
    pub fn is_non_confirming(&self) -> bool {
        matches!(
            self,
            PatternError::InsufficientData { .. }
                | PatternError::AlignmentMismatch { .. }
                | PatternError::InvalidTimeframe(_)
        )
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

/// Period in candles (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

/// Serialize as the bare number; deserialize through the validating constructor.
macro_rules! validated_serde {
    ($($ty:ident($inner:ty)),* $(,)?) => {
        $(
            impl serde::Serialize for $ty {
                fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                    serde::Serialize::serialize(&self.0, s)
                }
            }

            impl<'de> serde::Deserialize<'de> for $ty {
                fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                    $ty::new(<$inner as serde::Deserialize>::deserialize(d)?).map_err(serde::de::Error::custom)
                }
            }
        )*
    };
}

validated_serde!(Ratio(f64), Period(usize));

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Unix seconds of the bar open, when known
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (*self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn midpoint(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.high() < self.open().max(self.close()) || self.low() > self.open().min(self.close())
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "open/close outside high-low range",
            });
        }
        if self.volume() < 0.0 {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// PATTERN MATCH - result of candlestick detection (Copy)
// ============================================================

/// Identifier of a candlestick formation, also its display name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Returns the typical/expected direction of this formation.
    ///
    /// `None` means the formation is bidirectional and the detector decides
    /// the direction from the candles.
    pub fn typical_direction(&self) -> Option<Direction> {
        match self.0 {
            "Dragonfly Doji"
            | "Hammer"
            | "Inverted Hammer"
            | "Takuri"
            | "Piercing Line"
            | "Tweezer Bottom"
            | "Matching Low"
            | "Homing Pigeon"
            | "Morning Star"
            | "Morning Doji Star"
            | "Three White Soldiers" => Some(Direction::Bullish),
            "Gravestone Doji"
            | "Hanging Man"
            | "Shooting Star"
            | "Dark Cloud Cover"
            | "Tweezer Top"
            | "On Neck"
            | "In Neck"
            | "Thrusting"
            | "Evening Star"
            | "Evening Doji Star"
            | "Three Black Crows"
            | "Upside Gap Two Crows"
            | "Identical Three Crows" => Some(Direction::Bearish),
            "Doji" | "Long-Legged Doji" | "Rickshaw Man" | "Spinning Top" | "High Wave"
            | "Short Line" => Some(Direction::Neutral),
            _ => None,
        }
    }

    /// Reversal or continuation character of the formation
    pub fn kind(&self) -> PatternKind {
        match self.0 {
            "Marubozu" | "Long Line" | "Short Line" | "Spinning Top" | "High Wave" | "On Neck"
            | "In Neck" | "Thrusting" | "Separating Lines" => PatternKind::Continuation,
            _ => PatternKind::Reversal,
        }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.typical_direction().is_none()
    }
}

/// Direction/bias of a pattern (the record's `signal`)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Neutral => "neutral",
            Direction::Bearish => "bearish",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a formation anticipates a turn or a resumption of the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Reversal,
    Continuation,
}

/// Result of candlestick detection
#[derive(Debug, Clone, Copy)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub direction: Direction,
    /// Fixed base confidence of the formation, 0.0..=1.0
    pub strength: f64,
    pub start_index: usize,
    pub end_index: usize,
}

impl PatternMatch {
    #[inline]
    pub fn new(
        pattern_id: PatternId,
        direction: Direction,
        strength: f64,
        start_index: usize,
        end_index: usize,
    ) -> Self {
        Self {
            pattern_id,
            direction,
            strength,
            start_index,
            end_index,
        }
    }

    #[inline]
    pub fn candle_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    StrongUp,
    WeakUp,
    #[default]
    Sideways,
    WeakDown,
    StrongDown,
}

impl Trend {
    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::WeakDown | Trend::StrongDown)
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::WeakUp | Trend::StrongUp)
    }
}

/// Market context at a specific bar
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketContext {
    pub trend: Trend,
    /// Mean volume of the bars *before* this one; 0.0 without history
    pub avg_volume: f64,
    /// Mean body of the trailing `candle_period` bars
    pub avg_body: f64,
    /// Mean high-low range of the trailing `candle_period` bars
    pub avg_range: f64,
}

/// Provider of market context - precomputes context for all bars
pub trait ContextProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext>;
}

/// Default context provider using trailing simple averages
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub trend_period: Period,
    pub volume_period: Period,
    pub candle_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            trend_period: Period::new_const(14),
            volume_period: Period::new_const(20),
            candle_period: Period::new_const(10),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext> {
        let mut contexts = Vec::with_capacity(bars.len());

        for i in 0..bars.len() {
            // Trailing averages exclude bar i itself
            let (avg_body, avg_range) = if i == 0 {
                (bars[0].body(), bars[0].range())
            } else {
                let trail = &bars[i.saturating_sub(self.candle_period.get())..i];
                let n = trail.len() as f64;
                let (body, range) = trail
                    .iter()
                    .fold((0.0, 0.0), |(b, r), bar| (b + bar.body(), r + bar.range()));
                (body / n, range / n)
            };

            contexts.push(MarketContext {
                trend: self.compute_trend(bars, i),
                avg_volume: self.compute_avg_volume(bars, i),
                avg_body,
                avg_range,
            });
        }

        contexts
    }
}

impl DefaultContextProvider {
    fn compute_trend<T: OHLCV>(&self, bars: &[T], index: usize) -> Trend {
        let period = self.trend_period.get();
        if index < period {
            return Trend::Sideways;
        }

        let first_close = bars[index - period].close();
        let last_close = bars[index].close();

        if first_close <= f64::EPSILON {
            return Trend::Sideways;
        }

        let change = (last_close - first_close) / first_close;

        match change {
            c if c > 0.05 => Trend::StrongUp,
            c if c > 0.02 => Trend::WeakUp,
            c if c < -0.05 => Trend::StrongDown,
            c if c < -0.02 => Trend::WeakDown,
            _ => Trend::Sideways,
        }
    }

    fn compute_avg_volume<T: OHLCV>(&self, bars: &[T], index: usize) -> f64 {
        if index == 0 {
            return 0.0;
        }
        let start = index.saturating_sub(self.volume_period.get());
        let sum: f64 = bars[start..index].iter().map(|b| b.volume()).sum();
        sum / (index - start) as f64
    }
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Generic candlestick detector trait - for concrete types
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe detector trait - for custom detectors
pub trait DynPatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn min_bars(&self) -> usize;
    fn detect(
        &self,
        bars: &[&dyn OHLCV],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: PatternDetector> DynPatternDetector for D {
    fn id(&self) -> PatternId {
        PatternDetector::id(self)
    }

    fn min_bars(&self) -> usize {
        PatternDetector::min_bars(self)
    }

    fn detect(
        &self,
        bars: &[&dyn OHLCV],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        PatternDetector::detect(self, bars, index, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        PatternDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin candlestick detectors - enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                index: usize,
                ctx: &MarketContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, index, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar (16)
    Doji(DojiDetector),
    DragonflyDoji(DragonflyDojiDetector),
    GravestoneDoji(GravestoneDojiDetector),
    LongLeggedDoji(LongLeggedDojiDetector),
    RickshawMan(RickshawManDetector),
    Hammer(HammerDetector),
    HangingMan(HangingManDetector),
    InvertedHammer(InvertedHammerDetector),
    ShootingStar(ShootingStarDetector),
    Takuri(TakuriDetector),
    Marubozu(MarubozuDetector),
    SpinningTop(SpinningTopDetector),
    HighWave(HighWaveDetector),
    BeltHold(BeltHoldDetector),
    LongLine(LongLineDetector),
    ShortLine(ShortLineDetector),

    // Two bar (16)
    Engulfing(EngulfingDetector),
    Harami(HaramiDetector),
    HaramiCross(HaramiCrossDetector),
    Piercing(PiercingDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    DojiStar(DojiStarDetector),
    TweezerTop(TweezerTopDetector),
    TweezerBottom(TweezerBottomDetector),
    Kicking(KickingDetector),
    Counterattack(CounterattackDetector),
    MatchingLow(MatchingLowDetector),
    HomingPigeon(HomingPigeonDetector),
    OnNeck(OnNeckDetector),
    InNeck(InNeckDetector),
    Thrusting(ThrustingDetector),
    SeparatingLines(SeparatingLinesDetector),

    // Three bar (11)
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),
    MorningDojiStar(MorningDojiStarDetector),
    EveningDojiStar(EveningDojiStarDetector),
    AbandonedBaby(AbandonedBabyDetector),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    ThreeBlackCrows(ThreeBlackCrowsDetector),
    ThreeInside(ThreeInsideDetector),
    ThreeOutside(ThreeOutsideDetector),
    UpsideGapTwoCrows(UpsideGapTwoCrowsDetector),
    IdenticalThreeCrows(IdenticalThreeCrowsDetector),
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Bar {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
        v: f64,
    }

    impl Bar {
        fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
            Self {
                o,
                h,
                l,
                c,
                v: 1000.0,
            }
        }
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.o
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            self.v
        }
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(100.0, 110.0, 90.0, 105.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.body_top(), 105.0);
        assert_eq!(bar.lower_shadow(), 10.0);
        assert!(bar.is_bullish());
        assert!((bar.body_ratio().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_close_above_high() {
        let bar = Bar::new(100.0, 101.0, 99.0, 102.0);
        assert!(matches!(
            bar.validate(),
            Err(PatternError::InvalidOHLCV { .. })
        ));
    }

    #[test]
    fn test_avg_volume_excludes_current_bar() {
        let mut bars: Vec<Bar> = (0..25).map(|_| Bar::new(10.0, 11.0, 9.0, 10.5)).collect();
        bars[24].v = 5000.0;
        let ctx = DefaultContextProvider::default().compute_all(&bars);
        assert_eq!(ctx[0].avg_volume, 0.0);
        assert!((ctx[24].avg_volume - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_detection() {
        let bars: Vec<Bar> = (0..20)
            .map(|i| {
                let base = 100.0 - i as f64 * 2.0;
                Bar::new(base, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect();
        let ctx = DefaultContextProvider::default().compute_all(&bars);
        assert_eq!(ctx[5].trend, Trend::Sideways);
        assert!(ctx[19].trend.is_down());
    }

    #[test]
    fn test_pattern_id_tables() {
        assert_eq!(
            PatternId("Hammer").typical_direction(),
            Some(Direction::Bullish)
        );
        assert!(PatternId("Engulfing").is_bidirectional());
        assert_eq!(PatternId("On Neck").kind(), PatternKind::Continuation);
        assert_eq!(PatternId("Morning Star").kind(), PatternKind::Reversal);
    }

    #[test]
    fn test_non_confirming_errors() {
        assert!(PatternError::InsufficientData { need: 20, got: 3 }.is_non_confirming());
        assert!(PatternError::AlignmentMismatch {
            timeframe: Timeframe::D1
        }
        .is_non_confirming());
        assert!(!PatternError::Cancelled.is_non_confirming());
    }
}
