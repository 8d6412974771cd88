//! Two-candle formations
//!
//! Each detector looks at the candle at `index` and its predecessor.

use std::collections::HashMap;

use super::helpers::{
    self, body_engulfs, body_gap_down, body_gap_up, body_inside, is_doji, is_long_body,
    is_marubozu, prices_equal,
};
use super::validate_confidence;
use crate::{
    params::{get_ratio, ParamMeta, ParameterizedDetector},
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternId, PatternMatch, Result, OHLCV,
};

impl_with_defaults!(
    EngulfingDetector,
    HaramiDetector,
    HaramiCrossDetector,
    PiercingDetector,
    DarkCloudCoverDetector,
    DojiStarDetector,
    TweezerTopDetector,
    TweezerBottomDetector,
    KickingDetector,
    CounterattackDetector,
    MatchingLowDetector,
    HomingPigeonDetector,
    OnNeckDetector,
    InNeckDetector,
    ThrustingDetector,
    SeparatingLinesDetector,
);

/// Predecessor and current candle, or None at the start of the series.
#[inline]
fn pair<T>(bars: &[T], index: usize) -> Option<(&T, &T)> {
    if index < 1 {
        return None;
    }
    Some((bars.get(index - 1)?, bars.get(index)?))
}

#[inline]
fn two(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch::new(id, direction, strength, index - 1, index)
}

#[inline]
fn color<T: OHLCV>(bar: &T) -> Direction {
    if bar.is_bullish() {
        Direction::Bullish
    } else if bar.is_bearish() {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

// ============================================================
// ENGULFING / HARAMI
// ============================================================

/// Engulfing - second body swallows the opposite-colored first body
#[derive(Debug, Clone, Copy)]
pub struct EngulfingDetector {
    pub confidence: f64,
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self { confidence: 0.7 }
    }
}

impl PatternDetector for EngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId("Engulfing")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if prev.body() <= f64::EPSILON || !body_engulfs(cur, prev) {
            return None;
        }
        let direction = match (color(prev), color(cur)) {
            (Direction::Bearish, Direction::Bullish) => Direction::Bullish,
            (Direction::Bullish, Direction::Bearish) => Direction::Bearish,
            _ => return None,
        };
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Harami - small body held inside a long opposite body
#[derive(Debug, Clone, Copy)]
pub struct HaramiDetector {
    pub max_body_ratio: f64,
    pub confidence: f64,
}

impl Default for HaramiDetector {
    fn default() -> Self {
        Self {
            max_body_ratio: 0.5,
            confidence: 0.55,
        }
    }
}

/// Shared harami geometry: long first body, second body contained and smaller.
fn harami_direction<T: OHLCV>(
    prev: &T,
    cur: &T,
    avg_body: f64,
    max_body_ratio: f64,
) -> Option<Direction> {
    if !is_long_body(prev, helpers::LONG_BODY_RATIO, avg_body)
        || !body_inside(prev, cur)
        || cur.body() > prev.body() * max_body_ratio
    {
        return None;
    }
    match color(prev) {
        Direction::Bearish => Some(Direction::Bullish),
        Direction::Bullish => Some(Direction::Bearish),
        Direction::Neutral => None,
    }
}

impl PatternDetector for HaramiDetector {
    fn id(&self) -> PatternId {
        PatternId("Harami")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if is_doji(cur, helpers::DOJI_BODY_RATIO) {
            return None;
        }
        let direction = harami_direction(prev, cur, ctx.avg_body, self.max_body_ratio)?;
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Harami Cross - harami whose inside candle is a doji
#[derive(Debug, Clone, Copy)]
pub struct HaramiCrossDetector {
    pub confidence: f64,
}

impl Default for HaramiCrossDetector {
    fn default() -> Self {
        Self { confidence: 0.6 }
    }
}

impl PatternDetector for HaramiCrossDetector {
    fn id(&self) -> PatternId {
        PatternId("Harami Cross")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if !is_doji(cur, helpers::DOJI_BODY_RATIO) {
            return None;
        }
        let direction = harami_direction(prev, cur, ctx.avg_body, 0.5)?;
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// PENETRATION PATTERNS
// ============================================================

/// Piercing Line - gap lower then close above the prior body's midpoint
#[derive(Debug, Clone, Copy)]
pub struct PiercingDetector {
    pub confidence: f64,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self { confidence: 0.65 }
    }
}

impl PatternDetector for PiercingDetector {
    fn id(&self) -> PatternId {
        PatternId("Piercing Line")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = prev.is_bearish()
            && is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && cur.is_bullish()
            && cur.open() < prev.close()
            && cur.close() > prev.midpoint()
            && cur.close() < prev.open();
        hit.then(|| two(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Dark Cloud Cover - gap higher then close below the prior body's midpoint
#[derive(Debug, Clone, Copy)]
pub struct DarkCloudCoverDetector {
    pub confidence: f64,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self { confidence: 0.65 }
    }
}

impl PatternDetector for DarkCloudCoverDetector {
    fn id(&self) -> PatternId {
        PatternId("Dark Cloud Cover")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = prev.is_bullish()
            && is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && cur.is_bearish()
            && cur.open() > prev.close()
            && cur.close() < prev.midpoint()
            && cur.close() > prev.open();
        hit.then(|| two(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Doji Star - doji gapping away from a long body; signals a possible turn
#[derive(Debug, Clone, Copy)]
pub struct DojiStarDetector {
    pub confidence: f64,
}

impl Default for DojiStarDetector {
    fn default() -> Self {
        Self { confidence: 0.5 }
    }
}

impl PatternDetector for DojiStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Doji Star")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if !is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            || !is_doji(cur, helpers::DOJI_BODY_RATIO)
        {
            return None;
        }
        let direction = if prev.is_bullish() && body_gap_up(prev, cur) {
            Direction::Bearish
        } else if prev.is_bearish() && body_gap_down(prev, cur) {
            Direction::Bullish
        } else {
            return None;
        };
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// TWEEZERS
// ============================================================

/// Tweezer Top - matching highs after an advance, second candle turns down
#[derive(Debug, Clone, Copy)]
pub struct TweezerTopDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for TweezerTopDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for TweezerTopDetector {
    fn id(&self) -> PatternId {
        PatternId("Tweezer Top")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = ctx.trend.is_up()
            && prev.is_bullish()
            && cur.is_bearish()
            && prices_equal(prev.high(), cur.high(), self.tolerance);
        hit.then(|| two(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Tweezer Bottom - matching lows after a decline, second candle turns up
#[derive(Debug, Clone, Copy)]
pub struct TweezerBottomDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for TweezerBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for TweezerBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("Tweezer Bottom")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = ctx.trend.is_down()
            && prev.is_bearish()
            && cur.is_bullish()
            && prices_equal(prev.low(), cur.low(), self.tolerance);
        hit.then(|| two(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// GAPS AND MATCHING CLOSES
// ============================================================

/// Kicking - two opposite marubozu separated by a full gap
#[derive(Debug, Clone, Copy)]
pub struct KickingDetector {
    pub confidence: f64,
}

impl Default for KickingDetector {
    fn default() -> Self {
        Self { confidence: 0.75 }
    }
}

impl PatternDetector for KickingDetector {
    fn id(&self) -> PatternId {
        PatternId("Kicking")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if !is_marubozu(prev) || !is_marubozu(cur) {
            return None;
        }
        let direction = if prev.is_bearish() && cur.is_bullish() && cur.low() > prev.high() {
            Direction::Bullish
        } else if prev.is_bullish() && cur.is_bearish() && cur.high() < prev.low() {
            Direction::Bearish
        } else {
            return None;
        };
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Counterattack - opposite long candles closing at the same price
#[derive(Debug, Clone, Copy)]
pub struct CounterattackDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for CounterattackDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for CounterattackDetector {
    fn id(&self) -> PatternId {
        PatternId("Counterattack")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let opposite = (prev.is_bearish() && cur.is_bullish()) || (prev.is_bullish() && cur.is_bearish());
        let hit = opposite
            && is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && is_long_body(cur, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && prices_equal(prev.close(), cur.close(), self.tolerance);
        hit.then(|| two(PatternDetector::id(self), color(cur), self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Matching Low - two declining candles closing at the same low price
#[derive(Debug, Clone, Copy)]
pub struct MatchingLowDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for MatchingLowDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.55,
        }
    }
}

impl PatternDetector for MatchingLowDetector {
    fn id(&self) -> PatternId {
        PatternId("Matching Low")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = prev.is_bearish()
            && cur.is_bearish()
            && is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && prices_equal(prev.close(), cur.close(), self.tolerance);
        hit.then(|| two(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Homing Pigeon - bearish harami where both candles are bearish
#[derive(Debug, Clone, Copy)]
pub struct HomingPigeonDetector {
    pub confidence: f64,
}

impl Default for HomingPigeonDetector {
    fn default() -> Self {
        Self { confidence: 0.5 }
    }
}

impl PatternDetector for HomingPigeonDetector {
    fn id(&self) -> PatternId {
        PatternId("Homing Pigeon")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = prev.is_bearish()
            && cur.is_bearish()
            && is_long_body(prev, helpers::LONG_BODY_RATIO, ctx.avg_body)
            && body_inside(prev, cur)
            && cur.body() < prev.body();
        hit.then(|| two(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// NECK LINES (bearish continuation)
// ============================================================

/// Shared first-leg geometry of the neck-line family: long bearish candle,
/// then a bullish candle opening below its low.
fn neck_setup<T: OHLCV>(prev: &T, cur: &T, avg_body: f64) -> bool {
    prev.is_bearish()
        && is_long_body(prev, helpers::LONG_BODY_RATIO, avg_body)
        && cur.is_bullish()
        && cur.open() < prev.low()
}

/// On Neck - rebound closes right at the prior low
#[derive(Debug, Clone, Copy)]
pub struct OnNeckDetector {
    pub range_tolerance: f64,
    pub confidence: f64,
}

impl Default for OnNeckDetector {
    fn default() -> Self {
        Self {
            range_tolerance: 0.05,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for OnNeckDetector {
    fn id(&self) -> PatternId {
        PatternId("On Neck")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = neck_setup(prev, cur, ctx.avg_body)
            && (cur.close() - prev.low()).abs() <= prev.range() * self.range_tolerance;
        hit.then(|| two(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// In Neck - rebound closes just inside the prior body
#[derive(Debug, Clone, Copy)]
pub struct InNeckDetector {
    pub max_penetration: f64,
    pub confidence: f64,
}

impl Default for InNeckDetector {
    fn default() -> Self {
        Self {
            max_penetration: 0.1,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for InNeckDetector {
    fn id(&self) -> PatternId {
        PatternId("In Neck")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = neck_setup(prev, cur, ctx.avg_body)
            && cur.close() >= prev.close()
            && cur.close() <= prev.close() + prev.body() * self.max_penetration;
        hit.then(|| two(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Thrusting - rebound closes well inside the prior body but below its midpoint
#[derive(Debug, Clone, Copy)]
pub struct ThrustingDetector {
    pub min_penetration: f64,
    pub confidence: f64,
}

impl Default for ThrustingDetector {
    fn default() -> Self {
        Self {
            min_penetration: 0.1,
            confidence: 0.45,
        }
    }
}

impl PatternDetector for ThrustingDetector {
    fn id(&self) -> PatternId {
        PatternId("Thrusting")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        let hit = neck_setup(prev, cur, ctx.avg_body)
            && cur.close() > prev.close() + prev.body() * self.min_penetration
            && cur.close() < prev.midpoint();
        hit.then(|| two(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Separating Lines - opposite candles sharing an open, resuming the trend
#[derive(Debug, Clone, Copy)]
pub struct SeparatingLinesDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for SeparatingLinesDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.5,
        }
    }
}

impl PatternDetector for SeparatingLinesDetector {
    fn id(&self) -> PatternId {
        PatternId("Separating Lines")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (prev, cur) = pair(bars, index)?;
        if !prices_equal(prev.open(), cur.open(), self.tolerance)
            || !is_long_body(cur, helpers::LONG_BODY_RATIO, ctx.avg_body)
        {
            return None;
        }
        let direction = if prev.is_bearish() && cur.is_bullish() && ctx.trend.is_up() {
            Direction::Bullish
        } else if prev.is_bullish() && cur.is_bearish() && ctx.trend.is_down() {
            Direction::Bearish
        } else {
            return None;
        };
        Some(two(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static ENGULFING_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
    "confidence",
    0.7,
    (0.5, 0.9, 0.1),
    "Base confidence reported for an engulfing pair",
)];

impl ParameterizedDetector for EngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            confidence: get_ratio(params, "confidence", 0.7)?.get(),
        })
    }

    fn pattern_id_str() -> &'static str {
        "Engulfing"
    }
}
