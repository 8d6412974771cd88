//! Integration tests for candlestick scanning and volume confirmation.

use chrono::{TimeDelta, TimeZone, Utc};
use mtfpd::prelude::*;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl TestBar {
    fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
        Self { o, h, l, c, v: 1000.0 }
    }

    fn with_volume(mut self, v: f64) -> Self {
        self.v = v;
        self
    }
}

impl OHLCV for TestBar {
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

/// Steady decline of one point per bar with uniform volume
fn make_decline(n: usize) -> Vec<TestBar> {
    (0..n)
        .map(|i| {
            let base = 100.0 - i as f64;
            TestBar::new(base + 0.5, base + 0.8, base - 0.8, base - 0.5)
        })
        .collect()
}

/// Generate downtrend bars
fn make_downtrend(n: usize) -> Vec<TestBar> {
    (0..n)
        .map(|i| {
            let base = 100.0 - (i as f64) * 2.0;
            TestBar::new(base + 1.0, base + 2.0, base - 1.0, base - 0.5)
        })
        .collect()
}

/// Generate sideways bars
fn make_sideways(n: usize) -> Vec<TestBar> {
    (0..n)
        .map(|_| TestBar::new(100.0, 102.0, 98.0, 101.0))
        .collect()
}

/// Decline followed by a hammer printed on the given volume
fn hammer_after_decline(volume: f64) -> Vec<TestBar> {
    let mut bars = make_decline(20);
    bars.push(TestBar::new(79.6, 79.85, 78.6, 79.8).with_volume(volume));
    bars
}

fn hammer_only() -> CandlestickScanner {
    ScannerBuilder::new()
        .add(BuiltinDetector::Hammer(HammerDetector::with_defaults()))
        .build()
        .unwrap()
}

fn band_of(draft: &PatternDraft) -> VolumeBand {
    match draft.detail {
        PatternDetail::Candlestick { volume_band, .. } => volume_band,
        _ => panic!("not a candlestick draft"),
    }
}

// ============================================================
// SINGLE BAR FORMATIONS
// ============================================================

#[test]
fn test_doji_detection() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(80.0, 85.0, 75.0, 80.0));

    let scanner = ScannerBuilder::new()
        .add(BuiltinDetector::Doji(DojiDetector::with_defaults()))
        .build()
        .unwrap();

    let drafts = scanner.drafts(&bars).unwrap();
    assert_eq!(drafts.len(), 1, "Doji should be detected once");
    assert_eq!(drafts[0].name, "Doji");
    assert_eq!(drafts[0].signal, Direction::Neutral);
    assert_eq!(drafts[0].window.end, 10);
    // Same volume as the trailing bars: average band, unchanged confidence
    assert!((drafts[0].confidence - 0.5).abs() < 1e-12);
}

#[test]
fn test_hammer_on_weak_volume() {
    let bars = hammer_after_decline(800.0);
    let drafts = hammer_only().drafts(&bars).unwrap();

    assert_eq!(drafts.len(), 1);
    let hammer = &drafts[0];
    assert_eq!(hammer.name, "Hammer");
    assert_eq!(hammer.signal, Direction::Bullish);
    assert_eq!(hammer.window.start, 20);
    assert_eq!(hammer.window.end, 20);
    assert_eq!(hammer.base_confidence, 0.6);
    assert_eq!(band_of(hammer), VolumeBand::Weak);
    assert!((hammer.confidence - 0.42).abs() < 1e-9);
}

#[test]
fn test_hammer_levels() {
    let bars = hammer_after_decline(800.0);
    let hammer = &hammer_only().drafts(&bars).unwrap()[0];
    // Target projects the candle height above the close, stop sits at its low
    assert!((hammer.target_price.unwrap() - 81.05).abs() < 1e-9);
    assert!((hammer.stop_loss.unwrap() - 78.6).abs() < 1e-9);
}

#[test]
fn test_volume_ratio_of_two_is_excellent() {
    let bars = hammer_after_decline(2000.0);
    let hammer = &hammer_only().drafts(&bars).unwrap()[0];
    assert_eq!(band_of(hammer), VolumeBand::Excellent);
    assert!((hammer.confidence - 0.78).abs() < 1e-9);
}

#[test]
fn test_hammer_requires_downtrend() {
    let mut bars = make_sideways(20);
    bars.push(TestBar::new(100.6, 100.85, 99.6, 100.8));
    assert!(hammer_only().drafts(&bars).unwrap().is_empty());
}

#[test]
fn test_marubozu_direction_follows_color() {
    let mut bars = make_sideways(10);
    bars.push(TestBar::new(105.0, 105.0, 100.0, 100.0));

    let scanner = ScannerBuilder::new()
        .add(BuiltinDetector::Marubozu(MarubozuDetector::with_defaults()))
        .build()
        .unwrap();

    let drafts = scanner.drafts(&bars).unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].signal, Direction::Bearish);
    assert_eq!(drafts[0].kind, PatternKind::Continuation);
}

// ============================================================
// TWO BAR FORMATIONS
// ============================================================

#[test]
fn test_bullish_engulfing() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(81.0, 84.5, 80.5, 84.0));

    let scanner = ScannerBuilder::new()
        .add(BuiltinDetector::Engulfing(EngulfingDetector::with_defaults()))
        .build()
        .unwrap();

    let drafts = scanner.drafts(&bars).unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].signal, Direction::Bullish);
    assert_eq!(drafts[0].window.start, 9);
    assert_eq!(drafts[0].window.end, 10);
    match drafts[0].detail {
        PatternDetail::Candlestick { candle_count, .. } => assert_eq!(candle_count, 2),
        _ => panic!("not a candlestick draft"),
    }
}

fn only(detector: BuiltinDetector) -> CandlestickScanner {
    ScannerBuilder::new().add(detector).build().unwrap()
}

#[test]
fn test_bullish_kicking() {
    let mut bars = make_sideways(10);
    // Bearish marubozu, then a bullish one opening above its high
    bars.push(TestBar::new(100.0, 100.0, 96.0, 96.0));
    bars.push(TestBar::new(101.0, 105.0, 101.0, 105.0));

    let drafts = only(BuiltinDetector::Kicking(KickingDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Kicking");
    assert_eq!(drafts[0].signal, Direction::Bullish);
    assert_eq!((drafts[0].window.start, drafts[0].window.end), (10, 11));
}

#[test]
fn test_kicking_needs_a_full_gap() {
    let mut bars = make_sideways(10);
    bars.push(TestBar::new(100.0, 100.0, 96.0, 96.0));
    bars.push(TestBar::new(99.5, 103.5, 99.5, 103.5));

    let drafts = only(BuiltinDetector::Kicking(KickingDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert!(drafts.is_empty());
}

#[test]
fn test_bullish_doji_star() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(80.0, 80.2, 75.8, 76.0));
    // Doji with its body below the long bearish body
    bars.push(TestBar::new(74.9, 75.3, 74.5, 74.92));

    let drafts = only(BuiltinDetector::DojiStar(DojiStarDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Doji Star");
    assert_eq!(drafts[0].signal, Direction::Bullish);
    assert_eq!(drafts[0].window.end, 11);
}

// ============================================================
// THREE BAR FORMATIONS
// ============================================================

#[test]
fn test_morning_star() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(80.0, 80.2, 75.8, 76.0));
    bars.push(TestBar::new(74.8, 75.3, 74.5, 75.0));
    // Closes above the midpoint of the first body
    bars.push(TestBar::new(75.5, 79.2, 75.3, 79.0));

    let drafts = only(BuiltinDetector::MorningStar(MorningStarDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert_eq!(drafts.len(), 1);
    let star = &drafts[0];
    assert_eq!(star.name, "Morning Star");
    assert_eq!(star.signal, Direction::Bullish);
    assert_eq!((star.window.start, star.window.end), (10, 12));
    assert_eq!(star.base_confidence, 0.75);
    match star.detail {
        PatternDetail::Candlestick { candle_count, .. } => assert_eq!(candle_count, 3),
        _ => panic!("not a candlestick draft"),
    }
}

#[test]
fn test_morning_star_needs_recovery_past_midpoint() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(80.0, 80.2, 75.8, 76.0));
    bars.push(TestBar::new(74.8, 75.3, 74.5, 75.0));
    bars.push(TestBar::new(75.5, 77.9, 75.3, 77.5));

    let drafts = only(BuiltinDetector::MorningStar(MorningStarDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert!(drafts.is_empty());
}

#[test]
fn test_evening_star() {
    let mut bars = make_sideways(10);
    bars.push(TestBar::new(100.0, 104.2, 99.8, 104.0));
    bars.push(TestBar::new(105.0, 105.5, 104.8, 105.2));
    bars.push(TestBar::new(104.5, 104.7, 100.8, 101.0));

    let drafts = only(BuiltinDetector::EveningStar(EveningStarDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Evening Star");
    assert_eq!(drafts[0].signal, Direction::Bearish);
    assert_eq!(drafts[0].window.start, 10);
}

#[test]
fn test_bullish_abandoned_baby() {
    let mut bars = make_downtrend(10);
    bars.push(TestBar::new(80.0, 80.2, 75.8, 76.0));
    // Doji entirely below the first low, third candle entirely above the doji
    bars.push(TestBar::new(74.9, 75.2, 74.6, 74.92));
    bars.push(TestBar::new(76.0, 79.2, 75.6, 79.0));

    let drafts = only(BuiltinDetector::AbandonedBaby(AbandonedBabyDetector::with_defaults()))
        .drafts(&bars)
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Abandoned Baby");
    assert_eq!(drafts[0].signal, Direction::Bullish);
    assert_eq!((drafts[0].window.start, drafts[0].window.end), (10, 12));
    assert_eq!(drafts[0].base_confidence, 0.85);
}

#[test]
fn test_three_white_soldiers() {
    let mut bars = make_sideways(10);
    bars.push(TestBar::new(100.0, 103.1, 99.9, 103.0));
    bars.push(TestBar::new(102.0, 105.1, 101.9, 105.0));
    bars.push(TestBar::new(104.0, 107.1, 103.9, 107.0));

    let drafts = only(BuiltinDetector::ThreeWhiteSoldiers(
        ThreeWhiteSoldiersDetector::with_defaults(),
    ))
    .drafts(&bars)
    .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Three White Soldiers");
    assert_eq!(drafts[0].signal, Direction::Bullish);
    assert_eq!(drafts[0].window.end, 12);
}

// ============================================================
// SCANNER OPTIONS
// ============================================================

#[test]
fn test_min_strength_filter() {
    let bars = hammer_after_decline(1000.0);
    let scanner = ScannerBuilder::new()
        .with_all_defaults()
        .min_strength(0.65)
        .build()
        .unwrap();

    let drafts = scanner.drafts(&bars).unwrap();
    assert!(drafts.iter().all(|d| d.base_confidence >= 0.65));
    assert!(drafts.iter().all(|d| d.name != "Hammer"));
}

#[test]
fn test_only_patterns_filter() {
    let bars = hammer_after_decline(1000.0);
    let scanner = ScannerBuilder::new()
        .with_all_defaults()
        .only_patterns([PatternId("Hammer")])
        .build()
        .unwrap();

    let drafts = scanner.drafts(&bars).unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Hammer");
}

#[test]
fn test_too_few_bars() {
    let bars = make_sideways(2);
    let result = hammer_only().drafts(&bars);
    assert!(matches!(
        result,
        Err(PatternError::InsufficientData { need: 3, got: 2 })
    ));
}

#[test]
fn test_invalid_bar_is_reported_with_index() {
    let mut bars = make_sideways(5);
    bars[3] = TestBar::new(100.0, 99.0, 98.0, 101.0);
    assert!(matches!(
        hammer_only().drafts(&bars),
        Err(PatternError::InvalidOHLCV { index: 3, .. })
    ));
}

#[test]
fn test_invalid_detector_config_is_rejected() {
    let result = ScannerBuilder::new().add_checked(BuiltinDetector::Doji(DojiDetector {
        body_ratio: 0.5,
        confidence: 0.5,
    }));
    assert!(result.is_err());
}

/// Fires on any candle with at least three times the trailing volume.
struct VolumeClimax;

impl PatternDetector for VolumeClimax {
    fn id(&self) -> PatternId {
        PatternId("Volume Climax")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (ctx.avg_volume > 0.0 && bar.volume() >= 3.0 * ctx.avg_volume)
            .then(|| PatternMatch::new(PatternId("Volume Climax"), Direction::Neutral, 0.5, index, index))
    }
}

#[test]
fn test_custom_detector() {
    let mut bars = make_sideways(10);
    bars.push(TestBar::new(100.0, 102.0, 98.0, 101.0).with_volume(4000.0));

    let scanner = ScannerBuilder::new().add_custom(VolumeClimax).build().unwrap();
    let drafts = scanner.drafts(&bars).unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Volume Climax");
    assert_eq!(band_of(&drafts[0]), VolumeBand::Excellent);
    assert!((drafts[0].confidence - 0.65).abs() < 1e-9);
}

// ============================================================
// RECORDS
// ============================================================

#[test]
fn test_detect_builds_dated_records() {
    let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = hammer_after_decline(800.0)
        .iter()
        .enumerate()
        .map(|(i, b)| Candle::new(origin + TimeDelta::days(i as i64), b.o, b.h, b.l, b.c, b.v))
        .collect();

    let records = hammer_only().detect(&candles, Timeframe::D1).unwrap();
    assert_eq!(records.len(), 1);
    let hammer = &records[0];
    assert_eq!(hammer.pattern_name, "Hammer");
    assert_eq!(hammer.start_date, origin + TimeDelta::days(20));
    assert_eq!(hammer.end_date, origin + TimeDelta::days(20));
    assert_eq!(hammer.primary_timeframe, Timeframe::D1);
    assert_eq!(hammer.confirmation_level, 1);
    assert!(hammer.view_start <= hammer.start_date);
    assert!(hammer.view_end >= hammer.end_date);
}
