//! Single-candle formations
//!
//! Doji family, hammer family, marubozu, spinning top, high wave, belt hold and
//! the long/short line candles.

use std::collections::HashMap;

use super::helpers::{
    self, is_doji, is_hammer_shape, is_inverted_hammer_shape, is_long_body, is_marubozu,
    is_short_body, is_tiny_lower, is_tiny_upper,
};
use super::validate_confidence;
use crate::{
    params::{get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternId, PatternMatch, Result, OHLCV,
};

impl_with_defaults!(
    DojiDetector,
    DragonflyDojiDetector,
    GravestoneDojiDetector,
    LongLeggedDojiDetector,
    RickshawManDetector,
    HammerDetector,
    HangingManDetector,
    InvertedHammerDetector,
    ShootingStarDetector,
    TakuriDetector,
    MarubozuDetector,
    SpinningTopDetector,
    HighWaveDetector,
    BeltHoldDetector,
    LongLineDetector,
    ShortLineDetector,
);

#[inline]
fn single(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch::new(id, direction, strength, index, index)
}

// ============================================================
// DOJI FAMILY
// ============================================================

/// Doji - open and close practically equal
#[derive(Debug, Clone, Copy)]
pub struct DojiDetector {
    pub body_ratio: f64,
    pub confidence: f64,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::DOJI_BODY_RATIO,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId("Doji")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        is_doji(bar, self.body_ratio)
            .then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)?;
        if !(0.0..=0.3).contains(&self.body_ratio) {
            return Err(crate::PatternError::OutOfRange {
                field: "body_ratio",
                value: self.body_ratio,
                min: 0.0,
                max: 0.3,
            });
        }
        Ok(())
    }
}

/// Dragonfly Doji - doji at the top of a long lower shadow
#[derive(Debug, Clone, Copy)]
pub struct DragonflyDojiDetector {
    pub body_ratio: f64,
    pub min_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for DragonflyDojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::DOJI_BODY_RATIO,
            min_shadow_ratio: 0.6,
            confidence: 0.6,
        }
    }
}

impl PatternDetector for DragonflyDojiDetector {
    fn id(&self) -> PatternId {
        PatternId("Dragonfly Doji")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let hit = is_doji(bar, self.body_ratio)
            && is_tiny_upper(bar, helpers::TINY_SHADOW_RATIO)
            && bar.lower_shadow() >= bar.range() * self.min_shadow_ratio;
        hit.then(|| single(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Gravestone Doji - doji at the bottom of a long upper shadow
#[derive(Debug, Clone, Copy)]
pub struct GravestoneDojiDetector {
    pub body_ratio: f64,
    pub min_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for GravestoneDojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::DOJI_BODY_RATIO,
            min_shadow_ratio: 0.6,
            confidence: 0.6,
        }
    }
}

impl PatternDetector for GravestoneDojiDetector {
    fn id(&self) -> PatternId {
        PatternId("Gravestone Doji")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let hit = is_doji(bar, self.body_ratio)
            && is_tiny_lower(bar, helpers::TINY_SHADOW_RATIO)
            && bar.upper_shadow() >= bar.range() * self.min_shadow_ratio;
        hit.then(|| single(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Long-Legged Doji - doji with long shadows on both sides, wider than usual
#[derive(Debug, Clone, Copy)]
pub struct LongLeggedDojiDetector {
    pub body_ratio: f64,
    pub min_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for LongLeggedDojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::DOJI_BODY_RATIO,
            min_shadow_ratio: 0.3,
            confidence: 0.55,
        }
    }
}

impl LongLeggedDojiDetector {
    fn matches<T: OHLCV>(&self, bar: &T, ctx: &MarketContext) -> bool {
        let range = bar.range();
        is_doji(bar, self.body_ratio)
            && bar.upper_shadow() >= range * self.min_shadow_ratio
            && bar.lower_shadow() >= range * self.min_shadow_ratio
            && (ctx.avg_range <= 0.0 || range >= ctx.avg_range)
    }
}

impl PatternDetector for LongLeggedDojiDetector {
    fn id(&self) -> PatternId {
        PatternId("Long-Legged Doji")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        self.matches(bar, ctx)
            .then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Rickshaw Man - long-legged doji whose body sits mid-range
#[derive(Debug, Clone, Copy)]
pub struct RickshawManDetector {
    pub legs: LongLeggedDojiDetector,
    pub center_tolerance: f64,
    pub confidence: f64,
}

impl Default for RickshawManDetector {
    fn default() -> Self {
        Self {
            legs: LongLeggedDojiDetector::default(),
            center_tolerance: 0.1,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for RickshawManDetector {
    fn id(&self) -> PatternId {
        PatternId("Rickshaw Man")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let center = (bar.high() + bar.low()) / 2.0;
        let hit = self.legs.matches(bar, ctx)
            && (bar.midpoint() - center).abs() <= bar.range() * self.center_tolerance;
        hit.then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Hammer - small body, long lower shadow, after a decline
#[derive(Debug, Clone, Copy)]
pub struct HammerDetector {
    pub shadow_factor: f64,
    pub confidence: f64,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_FACTOR,
            confidence: 0.6,
        }
    }
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId("Hammer")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (ctx.trend.is_down() && is_hammer_shape(bar, self.shadow_factor))
            .then(|| single(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Hanging Man - hammer shape at the end of an advance
#[derive(Debug, Clone, Copy)]
pub struct HangingManDetector {
    pub shadow_factor: f64,
    pub confidence: f64,
}

impl Default for HangingManDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_FACTOR,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for HangingManDetector {
    fn id(&self) -> PatternId {
        PatternId("Hanging Man")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (ctx.trend.is_up() && is_hammer_shape(bar, self.shadow_factor))
            .then(|| single(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Inverted Hammer - small body, long upper shadow, after a decline
#[derive(Debug, Clone, Copy)]
pub struct InvertedHammerDetector {
    pub shadow_factor: f64,
    pub confidence: f64,
}

impl Default for InvertedHammerDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_FACTOR,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for InvertedHammerDetector {
    fn id(&self) -> PatternId {
        PatternId("Inverted Hammer")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (ctx.trend.is_down() && is_inverted_hammer_shape(bar, self.shadow_factor))
            .then(|| single(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Shooting Star - inverted hammer shape at the end of an advance
#[derive(Debug, Clone, Copy)]
pub struct ShootingStarDetector {
    pub shadow_factor: f64,
    pub confidence: f64,
}

impl Default for ShootingStarDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_FACTOR,
            confidence: 0.6,
        }
    }
}

impl PatternDetector for ShootingStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Shooting Star")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (ctx.trend.is_up() && is_inverted_hammer_shape(bar, self.shadow_factor))
            .then(|| single(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Takuri - dragonfly with an extra long lower shadow after a decline
#[derive(Debug, Clone, Copy)]
pub struct TakuriDetector {
    pub shadow_factor: f64,
    pub min_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for TakuriDetector {
    fn default() -> Self {
        Self {
            shadow_factor: 3.0,
            min_shadow_ratio: 0.75,
            confidence: 0.6,
        }
    }
}

impl PatternDetector for TakuriDetector {
    fn id(&self) -> PatternId {
        PatternId("Takuri")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let hit = ctx.trend.is_down()
            && is_short_body(bar, helpers::SHORT_BODY_RATIO)
            && is_tiny_upper(bar, helpers::TINY_SHADOW_RATIO)
            && bar.lower_shadow() >= bar.body() * self.shadow_factor
            && bar.lower_shadow() >= bar.range() * self.min_shadow_ratio;
        hit.then(|| single(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// BODY-DOMINATED CANDLES
// ============================================================

/// Marubozu - full body, next to no shadows. Direction follows the color.
#[derive(Debug, Clone, Copy)]
pub struct MarubozuDetector {
    pub confidence: f64,
}

impl Default for MarubozuDetector {
    fn default() -> Self {
        Self { confidence: 0.6 }
    }
}

impl PatternDetector for MarubozuDetector {
    fn id(&self) -> PatternId {
        PatternId("Marubozu")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        if !is_marubozu(bar) {
            return None;
        }
        let direction = if bar.is_bullish() {
            Direction::Bullish
        } else {
            Direction::Bearish
        };
        Some(single(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Belt Hold - long candle opening on its extreme, against the prevailing trend
#[derive(Debug, Clone, Copy)]
pub struct BeltHoldDetector {
    pub open_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for BeltHoldDetector {
    fn default() -> Self {
        Self {
            open_shadow_ratio: 0.05,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for BeltHoldDetector {
    fn id(&self) -> PatternId {
        PatternId("Belt Hold")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        if !is_long_body(bar, helpers::LONG_BODY_RATIO, ctx.avg_body) {
            return None;
        }

        let direction = if bar.is_bullish()
            && ctx.trend.is_down()
            && is_tiny_lower(bar, self.open_shadow_ratio)
        {
            Direction::Bullish
        } else if bar.is_bearish() && ctx.trend.is_up() && is_tiny_upper(bar, self.open_shadow_ratio)
        {
            Direction::Bearish
        } else {
            return None;
        };

        Some(single(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Long Line - unusually long body relative to recent candles
#[derive(Debug, Clone, Copy)]
pub struct LongLineDetector {
    pub body_ratio: f64,
    pub avg_body_factor: f64,
    pub confidence: f64,
}

impl Default for LongLineDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::LONG_LINE_BODY_RATIO,
            avg_body_factor: 1.3,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for LongLineDetector {
    fn id(&self) -> PatternId {
        PatternId("Long Line")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        if ctx.avg_body <= 0.0
            || !is_long_body(bar, self.body_ratio, ctx.avg_body * self.avg_body_factor)
        {
            return None;
        }
        let direction = if bar.is_bullish() {
            Direction::Bullish
        } else {
            Direction::Bearish
        };
        Some(single(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Short Line - compact candle, much narrower than recent ranges
#[derive(Debug, Clone, Copy)]
pub struct ShortLineDetector {
    pub max_range_factor: f64,
    pub confidence: f64,
}

impl Default for ShortLineDetector {
    fn default() -> Self {
        Self {
            max_range_factor: 0.5,
            confidence: 0.35,
        }
    }
}

impl PatternDetector for ShortLineDetector {
    fn id(&self) -> PatternId {
        PatternId("Short Line")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let range = bar.range();
        let hit = ctx.avg_range > 0.0
            && range > f64::EPSILON
            && range <= ctx.avg_range * self.max_range_factor
            && bar.body() >= range * helpers::SHORT_BODY_RATIO;
        hit.then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// INDECISION CANDLES
// ============================================================

/// Spinning Top - small body with shadows longer than the body on both sides
#[derive(Debug, Clone, Copy)]
pub struct SpinningTopDetector {
    pub body_ratio: f64,
    pub confidence: f64,
}

impl Default for SpinningTopDetector {
    fn default() -> Self {
        Self {
            body_ratio: helpers::SHORT_BODY_RATIO,
            confidence: 0.4,
        }
    }
}

impl PatternDetector for SpinningTopDetector {
    fn id(&self) -> PatternId {
        PatternId("Spinning Top")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let body = bar.body();
        let hit = is_short_body(bar, self.body_ratio)
            && !is_doji(bar, helpers::DOJI_BODY_RATIO)
            && bar.upper_shadow() > body
            && bar.lower_shadow() > body;
        hit.then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// High Wave - small body dwarfed by very long shadows on both sides
#[derive(Debug, Clone, Copy)]
pub struct HighWaveDetector {
    pub min_shadow_ratio: f64,
    pub confidence: f64,
}

impl Default for HighWaveDetector {
    fn default() -> Self {
        Self {
            min_shadow_ratio: 0.35,
            confidence: 0.45,
        }
    }
}

impl PatternDetector for HighWaveDetector {
    fn id(&self) -> PatternId {
        PatternId("High Wave")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let range = bar.range();
        let hit = is_short_body(bar, helpers::SHORT_BODY_RATIO)
            && !is_doji(bar, helpers::DOJI_BODY_RATIO)
            && bar.upper_shadow() >= range * self.min_shadow_ratio
            && bar.lower_shadow() >= range * self.min_shadow_ratio;
        hit.then(|| single(PatternDetector::id(self), Direction::Neutral, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static DOJI_PARAMS: &[ParamMeta] = &[ParamMeta {
    name: "body_ratio",
    param_type: ParamType::Ratio,
    default: 0.1,
    range: (0.02, 0.2, 0.02),
    description: "Maximum body as a fraction of the range",
}];

static HAMMER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "shadow_factor",
        2.0,
        (1.5, 3.5, 0.5),
        "Minimum lower shadow as a multiple of the body",
    ),
    ParamMeta::ratio("confidence", 0.6, (0.4, 0.8, 0.1), "Base confidence"),
];

impl ParameterizedDetector for DojiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOJI_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_ratio: get_ratio(params, "body_ratio", 0.1)?.get(),
            ..Self::default()
        })
    }

    fn pattern_id_str() -> &'static str {
        "Doji"
    }
}

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let shadow_factor = params.get("shadow_factor").copied().unwrap_or(2.0);
        HAMMER_PARAMS[0].validate(shadow_factor)?;
        Ok(Self {
            shadow_factor,
            confidence: get_ratio(params, "confidence", 0.6)?.get(),
        })
    }

    fn pattern_id_str() -> &'static str {
        "Hammer"
    }
}
