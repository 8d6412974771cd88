//! Three-candle formations
//!
//! `a`, `b`, `c` name the candles at `index - 2`, `index - 1` and `index`.

use std::collections::HashMap;

use super::helpers::{
    self, body_engulfs, body_gap_down, body_gap_up, body_inside, is_doji, is_long_body,
    is_short_body, prices_equal, trailing_avg_body,
};
use super::validate_confidence;
use crate::{
    params::{get_ratio, ParamMeta, ParameterizedDetector},
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternId, PatternMatch, Result, OHLCV,
};

impl_with_defaults!(
    MorningStarDetector,
    EveningStarDetector,
    MorningDojiStarDetector,
    EveningDojiStarDetector,
    AbandonedBabyDetector,
    ThreeWhiteSoldiersDetector,
    ThreeBlackCrowsDetector,
    ThreeInsideDetector,
    ThreeOutsideDetector,
    UpsideGapTwoCrowsDetector,
    IdenticalThreeCrowsDetector,
);

/// Lookback used for the average body at the first candle of the formation
const FIRST_BAR_AVG_PERIOD: usize = 10;

#[inline]
fn triple<T>(bars: &[T], index: usize) -> Option<(&T, &T, &T)> {
    if index < 2 {
        return None;
    }
    Some((bars.get(index - 2)?, bars.get(index - 1)?, bars.get(index)?))
}

#[inline]
fn three(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch::new(id, direction, strength, index - 2, index)
}

// ============================================================
// STARS
// ============================================================

/// Which star variant the middle candle must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StarBody {
    Small,
    Doji,
}

/// Bullish star: long bearish `a`, star gapping below it, bullish `c` closing
/// past the midpoint of `a`.
fn morning_star<T: OHLCV>(bars: &[T], index: usize, star: StarBody, max_star_ratio: f64) -> bool {
    let Some((a, b, c)) = triple(bars, index) else {
        return false;
    };
    let avg = trailing_avg_body(bars, index - 2, FIRST_BAR_AVG_PERIOD);
    let star_ok = match star {
        StarBody::Small => b.body() <= a.body() * max_star_ratio,
        StarBody::Doji => is_doji(b, helpers::DOJI_BODY_RATIO),
    };
    a.is_bearish()
        && is_long_body(a, helpers::LONG_BODY_RATIO, avg)
        && star_ok
        && body_gap_down(a, b)
        && c.is_bullish()
        && c.close() > a.midpoint()
}

/// Mirror of [`morning_star`].
fn evening_star<T: OHLCV>(bars: &[T], index: usize, star: StarBody, max_star_ratio: f64) -> bool {
    let Some((a, b, c)) = triple(bars, index) else {
        return false;
    };
    let avg = trailing_avg_body(bars, index - 2, FIRST_BAR_AVG_PERIOD);
    let star_ok = match star {
        StarBody::Small => b.body() <= a.body() * max_star_ratio,
        StarBody::Doji => is_doji(b, helpers::DOJI_BODY_RATIO),
    };
    a.is_bullish()
        && is_long_body(a, helpers::LONG_BODY_RATIO, avg)
        && star_ok
        && body_gap_up(a, b)
        && c.is_bearish()
        && c.close() < a.midpoint()
}

/// Morning Star - bullish three-candle reversal around a small gapped body
#[derive(Debug, Clone, Copy)]
pub struct MorningStarDetector {
    pub max_star_ratio: f64,
    pub confidence: f64,
}

impl Default for MorningStarDetector {
    fn default() -> Self {
        Self {
            max_star_ratio: 0.3,
            confidence: 0.75,
        }
    }
}

impl PatternDetector for MorningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Morning Star")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        morning_star(bars, index, StarBody::Small, self.max_star_ratio)
            .then(|| three(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Evening Star - bearish mirror of the morning star
#[derive(Debug, Clone, Copy)]
pub struct EveningStarDetector {
    pub max_star_ratio: f64,
    pub confidence: f64,
}

impl Default for EveningStarDetector {
    fn default() -> Self {
        Self {
            max_star_ratio: 0.3,
            confidence: 0.75,
        }
    }
}

impl PatternDetector for EveningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Evening Star")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        evening_star(bars, index, StarBody::Small, self.max_star_ratio)
            .then(|| three(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Morning Doji Star - morning star whose middle candle is a doji
#[derive(Debug, Clone, Copy)]
pub struct MorningDojiStarDetector {
    pub confidence: f64,
}

impl Default for MorningDojiStarDetector {
    fn default() -> Self {
        Self { confidence: 0.8 }
    }
}

impl PatternDetector for MorningDojiStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Morning Doji Star")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        morning_star(bars, index, StarBody::Doji, 0.0)
            .then(|| three(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Evening Doji Star - evening star whose middle candle is a doji
#[derive(Debug, Clone, Copy)]
pub struct EveningDojiStarDetector {
    pub confidence: f64,
}

impl Default for EveningDojiStarDetector {
    fn default() -> Self {
        Self { confidence: 0.8 }
    }
}

impl PatternDetector for EveningDojiStarDetector {
    fn id(&self) -> PatternId {
        PatternId("Evening Doji Star")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        evening_star(bars, index, StarBody::Doji, 0.0)
            .then(|| three(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Abandoned Baby - doji isolated by full shadow gaps on both sides
#[derive(Debug, Clone, Copy)]
pub struct AbandonedBabyDetector {
    pub confidence: f64,
}

impl Default for AbandonedBabyDetector {
    fn default() -> Self {
        Self { confidence: 0.85 }
    }
}

impl PatternDetector for AbandonedBabyDetector {
    fn id(&self) -> PatternId {
        PatternId("Abandoned Baby")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        if !is_doji(b, helpers::DOJI_BODY_RATIO) {
            return None;
        }
        let direction = if a.is_bearish()
            && b.high() < a.low()
            && c.is_bullish()
            && c.low() > b.high()
            && c.close() > a.midpoint()
        {
            Direction::Bullish
        } else if a.is_bullish()
            && b.low() > a.high()
            && c.is_bearish()
            && c.high() < b.low()
            && c.close() < a.midpoint()
        {
            Direction::Bearish
        } else {
            return None;
        };
        Some(three(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// SOLDIERS AND CROWS
// ============================================================

/// Three White Soldiers - three long bullish candles stepping higher
#[derive(Debug, Clone, Copy)]
pub struct ThreeWhiteSoldiersDetector {
    pub max_upper_shadow: f64,
    pub confidence: f64,
}

impl Default for ThreeWhiteSoldiersDetector {
    fn default() -> Self {
        Self {
            max_upper_shadow: 0.2,
            confidence: 0.7,
        }
    }
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
    fn id(&self) -> PatternId {
        PatternId("Three White Soldiers")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        let soldier = |bar: &T| {
            bar.is_bullish()
                && is_long_body(bar, helpers::LONG_BODY_RATIO, 0.0)
                && bar.upper_shadow() <= bar.range() * self.max_upper_shadow
        };
        let hit = soldier(a)
            && soldier(b)
            && soldier(c)
            && b.close() > a.close()
            && c.close() > b.close()
            && b.open() > a.open()
            && b.open() <= a.close()
            && c.open() > b.open()
            && c.open() <= b.close();
        hit.then(|| three(PatternDetector::id(self), Direction::Bullish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Three Black Crows - three long bearish candles stepping lower
#[derive(Debug, Clone, Copy)]
pub struct ThreeBlackCrowsDetector {
    pub max_lower_shadow: f64,
    pub confidence: f64,
}

impl Default for ThreeBlackCrowsDetector {
    fn default() -> Self {
        Self {
            max_lower_shadow: 0.2,
            confidence: 0.7,
        }
    }
}

impl PatternDetector for ThreeBlackCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("Three Black Crows")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        let crow = |bar: &T| {
            bar.is_bearish()
                && is_long_body(bar, helpers::LONG_BODY_RATIO, 0.0)
                && bar.lower_shadow() <= bar.range() * self.max_lower_shadow
        };
        let hit = crow(a)
            && crow(b)
            && crow(c)
            && b.close() < a.close()
            && c.close() < b.close()
            && b.open() < a.open()
            && b.open() >= a.close()
            && c.open() < b.open()
            && c.open() >= b.close();
        hit.then(|| three(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Identical Three Crows - each crow opens at the previous close
#[derive(Debug, Clone, Copy)]
pub struct IdenticalThreeCrowsDetector {
    pub tolerance: f64,
    pub confidence: f64,
}

impl Default for IdenticalThreeCrowsDetector {
    fn default() -> Self {
        Self {
            tolerance: helpers::EQUAL_PRICE_TOLERANCE,
            confidence: 0.75,
        }
    }
}

impl PatternDetector for IdenticalThreeCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("Identical Three Crows")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        let crow = |bar: &T| bar.is_bearish() && is_long_body(bar, helpers::LONG_BODY_RATIO, 0.0);
        let hit = crow(a)
            && crow(b)
            && crow(c)
            && prices_equal(b.open(), a.close(), self.tolerance)
            && prices_equal(c.open(), b.close(), self.tolerance)
            && c.close() < b.close()
            && b.close() < a.close();
        hit.then(|| three(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// CONFIRMED HARAMI / ENGULFING
// ============================================================

/// Three Inside - harami confirmed by a close beyond the first candle's open
#[derive(Debug, Clone, Copy)]
pub struct ThreeInsideDetector {
    pub confidence: f64,
}

impl Default for ThreeInsideDetector {
    fn default() -> Self {
        Self { confidence: 0.65 }
    }
}

impl PatternDetector for ThreeInsideDetector {
    fn id(&self) -> PatternId {
        PatternId("Three Inside")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        let avg = trailing_avg_body(bars, index - 2, FIRST_BAR_AVG_PERIOD);
        if !is_long_body(a, helpers::LONG_BODY_RATIO, avg)
            || !body_inside(a, b)
            || b.body() > a.body() * 0.5
        {
            return None;
        }
        let direction = if a.is_bearish() && b.is_bullish() && c.close() > a.open() {
            Direction::Bullish
        } else if a.is_bullish() && b.is_bearish() && c.close() < a.open() {
            Direction::Bearish
        } else {
            return None;
        };
        Some(three(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Three Outside - engulfing pair followed by a continuation close
#[derive(Debug, Clone, Copy)]
pub struct ThreeOutsideDetector {
    pub confidence: f64,
}

impl Default for ThreeOutsideDetector {
    fn default() -> Self {
        Self { confidence: 0.7 }
    }
}

impl PatternDetector for ThreeOutsideDetector {
    fn id(&self) -> PatternId {
        PatternId("Three Outside")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        if a.body() <= f64::EPSILON || !body_engulfs(b, a) {
            return None;
        }
        let direction = if a.is_bearish() && b.is_bullish() && c.close() > b.close() {
            Direction::Bullish
        } else if a.is_bullish() && b.is_bearish() && c.close() < b.close() {
            Direction::Bearish
        } else {
            return None;
        };
        Some(three(PatternDetector::id(self), direction, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

/// Upside Gap Two Crows - two bearish candles above a gap that has not filled
#[derive(Debug, Clone, Copy)]
pub struct UpsideGapTwoCrowsDetector {
    pub confidence: f64,
}

impl Default for UpsideGapTwoCrowsDetector {
    fn default() -> Self {
        Self { confidence: 0.55 }
    }
}

impl PatternDetector for UpsideGapTwoCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("Upside Gap Two Crows")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let (a, b, c) = triple(bars, index)?;
        let avg = trailing_avg_body(bars, index - 2, FIRST_BAR_AVG_PERIOD);
        let hit = a.is_bullish()
            && is_long_body(a, helpers::LONG_BODY_RATIO, avg)
            && b.is_bearish()
            && is_short_body(b, 0.5)
            && body_gap_up(a, b)
            && c.is_bearish()
            && c.open() > b.open()
            && c.close() < b.close()
            && c.close() > a.close();
        hit.then(|| three(PatternDetector::id(self), Direction::Bearish, self.confidence, index))
    }

    fn validate_config(&self) -> Result<()> {
        validate_confidence(self.confidence)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static MORNING_STAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "max_star_ratio",
        0.3,
        (0.1, 0.5, 0.1),
        "Largest star body as a fraction of the first body",
    ),
    ParamMeta::ratio("confidence", 0.75, (0.5, 0.9, 0.05), "Base confidence"),
];

impl ParameterizedDetector for MorningStarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        MORNING_STAR_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            max_star_ratio: get_ratio(params, "max_star_ratio", 0.3)?.get(),
            confidence: get_ratio(params, "confidence", 0.75)?.get(),
        })
    }

    fn pattern_id_str() -> &'static str {
        "Morning Star"
    }
}
