//! Shared predicates for candlestick detectors
//!
//! Everything here is expressed as a ratio of the candle's own high-low range
//! or as a relative price tolerance, so the predicates hold on any price scale.

use crate::{OHLCVExt, OHLCV};

// ============================================================
// THRESHOLDS
// ============================================================

/// Body is doji-like: body <= range * DOJI_BODY_RATIO
pub const DOJI_BODY_RATIO: f64 = 0.1;
/// Body is short: body <= range * SHORT_BODY_RATIO
pub const SHORT_BODY_RATIO: f64 = 0.3;
/// Body is long: body >= range * LONG_BODY_RATIO
pub const LONG_BODY_RATIO: f64 = 0.6;
/// Long line body ratio, stricter than a plain long body
pub const LONG_LINE_BODY_RATIO: f64 = 0.7;
/// Marubozu body ratio (shadows together at most 10% of range)
pub const MARUBOZU_BODY_RATIO: f64 = 0.9;
/// Hammer-family shadow must be at least this multiple of the body
pub const SHADOW_FACTOR: f64 = 2.0;
/// Shadow counts as absent: shadow <= range * TINY_SHADOW_RATIO
pub const TINY_SHADOW_RATIO: f64 = 0.1;
/// Two prices are equal within this relative tolerance
pub const EQUAL_PRICE_TOLERANCE: f64 = 0.001;

// ============================================================
// SHAPE PREDICATES
// ============================================================

#[inline]
fn has_range<T: OHLCV>(bar: &T) -> bool {
    bar.range() > f64::EPSILON
}

/// Open and close (almost) coincide.
#[inline]
pub fn is_doji<T: OHLCV>(bar: &T, ratio: f64) -> bool {
    has_range(bar) && bar.body() <= bar.range() * ratio
}

/// Body is at most `ratio` of the range.
#[inline]
pub fn is_short_body<T: OHLCV>(bar: &T, ratio: f64) -> bool {
    has_range(bar) && bar.body() <= bar.range() * ratio
}

/// Body dominates the candle and is at least the trailing average body.
///
/// Without a usable average (`avg_body <= 0`) only the ratio is checked.
#[inline]
pub fn is_long_body<T: OHLCV>(bar: &T, ratio: f64, avg_body: f64) -> bool {
    has_range(bar)
        && bar.body() >= bar.range() * ratio
        && (avg_body <= 0.0 || bar.body() >= avg_body)
}

#[inline]
pub fn is_tiny_upper<T: OHLCV>(bar: &T, ratio: f64) -> bool {
    has_range(bar) && bar.upper_shadow() <= bar.range() * ratio
}

#[inline]
pub fn is_tiny_lower<T: OHLCV>(bar: &T, ratio: f64) -> bool {
    has_range(bar) && bar.lower_shadow() <= bar.range() * ratio
}

/// Near-shadowless candle with a real body.
#[inline]
pub fn is_marubozu<T: OHLCV>(bar: &T) -> bool {
    has_range(bar) && bar.body() >= bar.range() * MARUBOZU_BODY_RATIO
}

/// Small body sitting on top of a long lower shadow (hammer / hanging man shape).
#[inline]
pub fn is_hammer_shape<T: OHLCV>(bar: &T, shadow_factor: f64) -> bool {
    has_range(bar)
        && is_short_body(bar, SHORT_BODY_RATIO)
        && bar.lower_shadow() >= bar.body() * shadow_factor
        && bar.lower_shadow() >= bar.range() * 0.5
        && is_tiny_upper(bar, TINY_SHADOW_RATIO)
}

/// Small body hanging under a long upper shadow (inverted hammer / shooting star shape).
#[inline]
pub fn is_inverted_hammer_shape<T: OHLCV>(bar: &T, shadow_factor: f64) -> bool {
    has_range(bar)
        && is_short_body(bar, SHORT_BODY_RATIO)
        && bar.upper_shadow() >= bar.body() * shadow_factor
        && bar.upper_shadow() >= bar.range() * 0.5
        && is_tiny_lower(bar, TINY_SHADOW_RATIO)
}

// ============================================================
// PRICE RELATIONS
// ============================================================

/// `a` and `b` agree within a relative tolerance.
#[inline]
pub fn prices_equal(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale <= f64::EPSILON {
        return true;
    }
    (a - b).abs() <= scale * tolerance
}

/// Body of `cur` lies entirely above the body of `prev`.
#[inline]
pub fn body_gap_up<T: OHLCV>(prev: &T, cur: &T) -> bool {
    cur.body_bottom() > prev.body_top()
}

/// Body of `cur` lies entirely below the body of `prev`.
#[inline]
pub fn body_gap_down<T: OHLCV>(prev: &T, cur: &T) -> bool {
    cur.body_top() < prev.body_bottom()
}

/// Body of `inner` sits inside the body of `outer`.
#[inline]
pub fn body_inside<T: OHLCV>(outer: &T, inner: &T) -> bool {
    inner.body_top() <= outer.body_top() && inner.body_bottom() >= outer.body_bottom()
}

/// Body of `outer` covers the body of `inner` and is larger.
#[inline]
pub fn body_engulfs<T: OHLCV>(outer: &T, inner: &T) -> bool {
    outer.body_top() >= inner.body_top()
        && outer.body_bottom() <= inner.body_bottom()
        && outer.body() > inner.body()
}

/// Trailing average body of the `period` bars before `at`.
#[inline]
pub fn trailing_avg_body<T: OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    if at == 0 {
        return bars.first().map(|b| b.body()).unwrap_or(0.0);
    }
    let window = &bars[at.saturating_sub(period)..at];
    window.iter().map(|b| b.body()).sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    struct B(f64, f64, f64, f64);

    impl OHLCV for B {
        fn open(&self) -> f64 {
            self.0
        }
        fn high(&self) -> f64 {
            self.1
        }
        fn low(&self) -> f64 {
            self.2
        }
        fn close(&self) -> f64 {
            self.3
        }
        fn volume(&self) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_flat_bar_is_nothing() {
        let bar = B(10.0, 10.0, 10.0, 10.0);
        assert!(!is_doji(&bar, DOJI_BODY_RATIO));
        assert!(!is_marubozu(&bar));
        assert!(!is_hammer_shape(&bar, SHADOW_FACTOR));
    }

    #[test]
    fn test_hammer_shape() {
        assert!(is_hammer_shape(&B(79.6, 79.85, 78.6, 79.8), SHADOW_FACTOR));
        assert!(!is_inverted_hammer_shape(&B(79.6, 79.85, 78.6, 79.8), SHADOW_FACTOR));
        assert!(is_inverted_hammer_shape(&B(10.2, 11.2, 10.0, 10.0), SHADOW_FACTOR));
    }

    #[test]
    fn test_prices_equal() {
        assert!(prices_equal(100.0, 100.05, EQUAL_PRICE_TOLERANCE));
        assert!(!prices_equal(100.0, 100.5, EQUAL_PRICE_TOLERANCE));
        assert!(prices_equal(0.0, 0.0, EQUAL_PRICE_TOLERANCE));
    }

    #[test]
    fn test_body_relations() {
        let big = B(10.0, 12.5, 9.5, 12.0);
        let small = B(11.5, 11.8, 10.8, 11.0);
        assert!(body_inside(&big, &small));
        assert!(body_engulfs(&big, &small));
        assert!(!body_engulfs(&small, &big));
    }
}
