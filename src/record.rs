//! Detection records.
//!
//! Scanners produce a [`PatternDraft`] in candle-index space. [`RecordBuilder`]
//! turns it into a serializable [`DetectedPattern`] in calendar space.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    candle::Candle, candlestick::VolumeBand, geometry::trendline::Line, timeframe::Timeframe,
    Direction, PatternError, PatternKind, Result,
};

/// Which scanner produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerKind {
    Geometric,
    Candlestick,
}

/// Inclusive candle-index span of a formation plus display padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternWindow {
    pub start: usize,
    pub end: usize,
    /// Extra candles each side shown when visualizing or exporting
    pub padding: usize,
}

impl PatternWindow {
    pub const DEFAULT_PADDING: usize = 20;

    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            padding: Self::DEFAULT_PADDING,
        }
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Number of candles spanned, both ends included
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// A price at a candle index of the scanned series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoint {
    pub index: usize,
    pub price: f64,
}

impl PivotPoint {
    pub fn new(index: usize, price: f64) -> Self {
        Self { index, price }
    }
}

/// Family-specific structure of a formation.
///
/// Line coefficients use the candle index of the scanned series as `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PatternDetail {
    Candlestick {
        candle_count: usize,
        volume_ratio: Option<f64>,
        volume_band: VolumeBand,
    },
    HeadAndShoulders {
        left_shoulder: PivotPoint,
        left_trough: PivotPoint,
        head: PivotPoint,
        right_trough: PivotPoint,
        right_shoulder: PivotPoint,
        neckline: Line,
    },
    Double {
        first: PivotPoint,
        middle: PivotPoint,
        second: PivotPoint,
    },
    Triple {
        first: PivotPoint,
        first_trough: PivotPoint,
        second: PivotPoint,
        second_trough: PivotPoint,
        third: PivotPoint,
    },
    Lines {
        upper: Line,
        lower: Line,
        touches: Vec<PivotPoint>,
    },
    Flag {
        pole_start: PivotPoint,
        pole_end: PivotPoint,
        upper: Line,
        lower: Line,
    },
    Rounding {
        extreme: PivotPoint,
        curvature: f64,
        r_squared: f64,
    },
}

/// Scanner output before calendar mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDraft {
    pub name: &'static str,
    pub kind: PatternKind,
    pub signal: Direction,
    pub source: ScannerKind,
    pub window: PatternWindow,
    /// Fixed confidence of the formation family
    pub base_confidence: f64,
    /// Confidence after fit or volume adjustment
    pub confidence: f64,
    pub breakout_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub detail: PatternDetail,
}

/// Named price location of a formation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Line through a formation; `x` counts candles from `start_date`, so the
/// intercept is the line's price at `start_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendlineRecord {
    pub name: String,
    pub slope: f64,
    pub intercept: f64,
}

/// A detected formation with its cross-timeframe verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub instrument_id: String,
    pub pattern_name: String,
    pub pattern_type: PatternKind,
    pub signal: Direction,
    pub source: ScannerKind,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Padded span for charts and exports
    pub view_start: DateTime<Utc>,
    pub view_end: DateTime<Utc>,
    pub breakout_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub confidence_score: f64,
    pub base_confidence: f64,
    pub alignment_score: f64,
    pub key_points: Vec<KeyPoint>,
    pub trendlines: Vec<TrendlineRecord>,
    pub primary_timeframe: Timeframe,
    pub detected_on_timeframes: BTreeSet<Timeframe>,
    pub confirmation_level: u8,
    pub detail: PatternDetail,
}

impl DetectedPattern {
    /// End of the last candle's bucket. `end_date` is a bucket start, so the
    /// formation covers `[start_date, covered_until)`.
    pub fn covered_until(&self) -> DateTime<Utc> {
        self.primary_timeframe.bucket_end(self.end_date)
    }

    /// Covered intervals intersect. A daily candle at midnight overlaps a
    /// 4h candle stamped later that same day.
    pub fn overlaps(&self, other: &DetectedPattern) -> bool {
        self.start_date < other.covered_until() && other.start_date < self.covered_until()
    }

    /// Same formation as seen by a different timeframe.
    pub fn same_formation(&self, other: &DetectedPattern) -> bool {
        self.pattern_name == other.pattern_name
            && self.signal == other.signal
            && self.source == other.source
            && self.overlaps(other)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Maps drafts onto the candles they were found in.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder<'a> {
    candles: &'a [Candle],
    timeframe: Timeframe,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(candles: &'a [Candle], timeframe: Timeframe) -> Self {
        Self { candles, timeframe }
    }

    pub fn build(&self, draft: PatternDraft) -> Result<DetectedPattern> {
        let PatternDraft {
            name,
            kind,
            signal,
            source,
            window,
            base_confidence,
            confidence,
            breakout_price,
            target_price,
            stop_loss,
            detail,
        } = draft;

        if window.is_empty() {
            return Err(PatternError::InvalidValue("pattern window ends before it starts"));
        }
        let start = self.at(window.start)?;
        let end = self.at(window.end)?;
        let last = self.candles.len() - 1;
        let view_start = self.candles[window.start.saturating_sub(window.padding)].timestamp;
        let view_end = self.candles[(window.end + window.padding).min(last)].timestamp;

        let key_points = self.key_points(&detail, window)?;
        let trendlines = trendlines(&detail, window.start);

        Ok(DetectedPattern {
            instrument_id: String::new(),
            pattern_name: name.to_string(),
            pattern_type: kind,
            signal,
            source,
            start_date: start.timestamp,
            end_date: end.timestamp,
            view_start,
            view_end,
            breakout_price,
            target_price,
            stop_loss,
            confidence_score: confidence,
            base_confidence,
            alignment_score: confidence,
            key_points,
            trendlines,
            primary_timeframe: self.timeframe,
            detected_on_timeframes: BTreeSet::from([self.timeframe]),
            confirmation_level: 1,
            detail,
        })
    }

    fn at(&self, index: usize) -> Result<&'a Candle> {
        self.candles
            .get(index)
            .ok_or(PatternError::InvalidValue("pattern window outside the candle series"))
    }

    fn point(&self, name: &str, p: &PivotPoint) -> Result<KeyPoint> {
        Ok(KeyPoint {
            name: name.to_string(),
            timestamp: self.at(p.index)?.timestamp,
            price: p.price,
        })
    }

    fn key_points(&self, detail: &PatternDetail, window: PatternWindow) -> Result<Vec<KeyPoint>> {
        let named: Vec<(&str, &PivotPoint)> = match detail {
            PatternDetail::Candlestick { .. } => {
                return (window.start..=window.end)
                    .enumerate()
                    .map(|(n, i)| -> Result<KeyPoint> {
                        let candle = self.at(i)?;
                        Ok(KeyPoint {
                            name: format!("candle_{}", n + 1),
                            timestamp: candle.timestamp,
                            price: candle.close,
                        })
                    })
                    .collect();
            }
            PatternDetail::HeadAndShoulders {
                left_shoulder,
                left_trough,
                head,
                right_trough,
                right_shoulder,
                ..
            } => vec![
                ("left_shoulder", left_shoulder),
                ("left_trough", left_trough),
                ("head", head),
                ("right_trough", right_trough),
                ("right_shoulder", right_shoulder),
            ],
            PatternDetail::Double {
                first,
                middle,
                second,
            } => vec![("first", first), ("middle", middle), ("second", second)],
            PatternDetail::Triple {
                first,
                first_trough,
                second,
                second_trough,
                third,
            } => vec![
                ("first", first),
                ("first_trough", first_trough),
                ("second", second),
                ("second_trough", second_trough),
                ("third", third),
            ],
            PatternDetail::Lines { touches, .. } => {
                return touches
                    .iter()
                    .enumerate()
                    .map(|(n, p)| self.point(&format!("touch_{}", n + 1), p))
                    .collect();
            }
            PatternDetail::Flag {
                pole_start,
                pole_end,
                ..
            } => vec![("pole_start", pole_start), ("pole_end", pole_end)],
            PatternDetail::Rounding { extreme, .. } => vec![("extreme", extreme)],
        };
        named.into_iter().map(|(n, p)| self.point(n, p)).collect()
    }
}

/// Re-base line coefficients so `x = 0` is the first candle of the formation.
fn trendlines(detail: &PatternDetail, start: usize) -> Vec<TrendlineRecord> {
    let rebase = |name: &str, line: &Line| TrendlineRecord {
        name: name.to_string(),
        slope: line.slope,
        intercept: line.value_at(start as f64),
    };
    match detail {
        PatternDetail::HeadAndShoulders { neckline, .. } => vec![rebase("neckline", neckline)],
        PatternDetail::Lines { upper, lower, .. } | PatternDetail::Flag { upper, lower, .. } => {
            vec![rebase("upper", upper), rebase("lower", lower)]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let p = 10.0 + i as f64;
                Candle::new(start + TimeDelta::days(i as i64), p, p + 1.0, p - 1.0, p, 1.0)
            })
            .collect()
    }

    fn flag_draft() -> PatternDraft {
        PatternDraft {
            name: "Bull Flag",
            kind: PatternKind::Continuation,
            signal: Direction::Bullish,
            source: ScannerKind::Geometric,
            window: PatternWindow::new(5, 25).with_padding(3),
            base_confidence: 0.65,
            confidence: 0.6,
            breakout_price: None,
            target_price: Some(40.0),
            stop_loss: Some(20.0),
            detail: PatternDetail::Flag {
                pole_start: PivotPoint::new(5, 15.0),
                pole_end: PivotPoint::new(12, 22.0),
                upper: Line {
                    slope: -0.5,
                    intercept: 30.0,
                },
                lower: Line {
                    slope: -0.5,
                    intercept: 27.0,
                },
            },
        }
    }

    #[test]
    fn test_build_maps_dates_and_lines() {
        let series = candles(40);
        let record = RecordBuilder::new(&series, Timeframe::D1)
            .build(flag_draft())
            .unwrap();

        assert_eq!(record.start_date, series[5].timestamp);
        assert_eq!(record.end_date, series[25].timestamp);
        assert_eq!(record.view_start, series[2].timestamp);
        assert_eq!(record.view_end, series[28].timestamp);
        assert_eq!(record.confirmation_level, 1);
        assert_eq!(
            record.detected_on_timeframes,
            BTreeSet::from([Timeframe::D1])
        );
        assert_eq!(record.key_points[1].name, "pole_end");
        assert_eq!(record.key_points[1].timestamp, series[12].timestamp);
        // upper line at candle 5: 30 - 2.5
        assert!((record.trendlines[0].intercept - 27.5).abs() < 1e-9);
        assert_eq!(record.trendlines[0].slope, -0.5);
    }

    #[test]
    fn test_window_outside_series_is_an_error() {
        let series = candles(10);
        assert!(RecordBuilder::new(&series, Timeframe::D1)
            .build(flag_draft())
            .is_err());
    }

    fn hammer_at(timeframe: Timeframe, at: DateTime<Utc>) -> DetectedPattern {
        let series = vec![Candle::new(at, 10.0, 10.1, 8.0, 10.05, 1.0)];
        let draft = PatternDraft {
            name: "Hammer",
            kind: PatternKind::Reversal,
            signal: Direction::Bullish,
            source: ScannerKind::Candlestick,
            window: PatternWindow::new(0, 0),
            base_confidence: 0.6,
            confidence: 0.6,
            breakout_price: None,
            target_price: None,
            stop_loss: None,
            detail: PatternDetail::Candlestick {
                candle_count: 1,
                volume_ratio: Some(1.0),
                volume_band: VolumeBand::Average,
            },
        };
        RecordBuilder::new(&series, timeframe).build(draft).unwrap()
    }

    #[test]
    fn test_overlap_spans_whole_buckets() {
        let day = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let daily = hammer_at(Timeframe::D1, day);
        let morning = hammer_at(Timeframe::H4, day + TimeDelta::hours(8));
        assert!(daily.same_formation(&morning));
        assert!(morning.same_formation(&daily));

        // Adjacent 4h candles touch but do not overlap
        let noon = hammer_at(Timeframe::H4, day + TimeDelta::hours(12));
        assert!(!morning.overlaps(&noon));
        // Next day's candle is outside the daily bucket
        let next = hammer_at(Timeframe::H4, day + TimeDelta::hours(24));
        assert!(!daily.overlaps(&next));
        assert_eq!(daily.covered_until(), day + TimeDelta::days(1));
    }

    #[test]
    fn test_serde_codes() {
        let series = candles(40);
        let record = RecordBuilder::new(&series, Timeframe::D1)
            .build(flag_draft())
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["signal"], "bullish");
        assert_eq!(json["pattern_type"], "continuation");
        assert_eq!(json["source"], "geometric");
        assert_eq!(json["primary_timeframe"], "1d");
        assert_eq!(json["detail"]["family"], "flag");
        let back: DetectedPattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
