//! Formation families over a pivot sequence.
//!
//! Prices of bottoms are mirrored with a sign so one routine covers a family
//! and its inverse: `s = 1.0` for tops, `-1.0` for bottoms.

use super::{
    pivots::Pivot,
    trendline::{fit_line, fit_parabola, fit_series, Line, LineFit},
    ChartFamily, ChartFormation,
};
use crate::{config::GeometryConfig, record::{PatternDetail, PivotPoint}, OHLCV};

pub(crate) struct Context<'a, T> {
    pub bars: &'a [T],
    pub pivots: &'a [Pivot],
    pub config: &'a GeometryConfig,
    pub min_len: usize,
}

impl<T> Context<'_, T> {
    fn spans(&self, start: usize, end: usize) -> bool {
        end >= start && end + 1 - start >= self.min_len
    }
}

pub(crate) fn scan_all<T: OHLCV>(ctx: &Context<'_, T>) -> Vec<ChartFormation> {
    let mut out = Vec::new();
    head_and_shoulders(ctx, &mut out);
    doubles(ctx, &mut out);
    triples(ctx, &mut out);
    converging_and_parallel(ctx, &mut out);
    flags(ctx, &mut out);
    rounding(ctx, &mut out);
    out
}

/// Index and line level of the first close beyond `level` after `after`.
fn first_close_beyond<T: OHLCV>(
    bars: &[T],
    after: usize,
    level: impl Fn(usize) -> f64,
    below: bool,
) -> Option<(usize, f64)> {
    (after + 1..bars.len()).find_map(|i| {
        let lv = level(i);
        let close = bars[i].close();
        let crossed = if below { close < lv } else { close > lv };
        crossed.then_some((i, lv))
    })
}

fn quality(error: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return 0.0;
    }
    (1.0 - error / tolerance).clamp(0.0, 1.0)
}

fn sign(top: bool) -> f64 {
    if top {
        1.0
    } else {
        -1.0
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

fn head_and_shoulders<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let cfg = ctx.config;
    for w in ctx.pivots.windows(5) {
        let top = w[0].is_high();
        let s = sign(top);
        let [ls, lt, head, rt, rs] = [w[0].point, w[1].point, w[2].point, w[3].point, w[4].point];

        if s * head.price <= s * ls.price || s * head.price <= s * rs.price {
            continue;
        }
        let shoulder_mean = (ls.price + rs.price) / 2.0;
        let shoulder_gap = (ls.price - rs.price).abs() / shoulder_mean;
        if shoulder_gap > cfg.shoulder_tolerance {
            continue;
        }
        let Some(neckline) = Line::through(lt, rt) else {
            continue;
        };
        let height = s * (head.price - neckline.at(head.index));
        if height < cfg.min_retracement * head.price.abs() {
            continue;
        }
        if s * (ls.price - neckline.at(ls.index)) <= 0.0 || s * (rs.price - neckline.at(rs.index)) <= 0.0 {
            continue;
        }
        if !ctx.spans(ls.index, rs.index) {
            continue;
        }

        let breakout = first_close_beyond(ctx.bars, rs.index, |i| neckline.at(i), top);
        let level = breakout.map_or(neckline.at(rs.index), |(_, lv)| lv);
        out.push(ChartFormation {
            family: if top {
                ChartFamily::HeadAndShoulders
            } else {
                ChartFamily::InverseHeadAndShoulders
            },
            start: ls.index,
            end: rs.index,
            quality: quality(shoulder_gap, cfg.shoulder_tolerance),
            breakout_price: breakout.map(|(_, lv)| lv),
            target_price: Some(level - s * height),
            stop_loss: Some(rs.price),
            detail: PatternDetail::HeadAndShoulders {
                left_shoulder: ls,
                left_trough: lt,
                head,
                right_trough: rt,
                right_shoulder: rs,
                neckline,
            },
        });
    }
}

// ============================================================
// DOUBLE / TRIPLE
// ============================================================

fn doubles<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let cfg = ctx.config;
    for w in ctx.pivots.windows(3) {
        let top = w[0].is_high();
        let s = sign(top);
        let [first, middle, second] = [w[0].point, w[1].point, w[2].point];

        let mean = (first.price + second.price) / 2.0;
        if mean <= 0.0 {
            continue;
        }
        let gap = (first.price - second.price).abs() / mean;
        if gap > cfg.peak_tolerance {
            continue;
        }
        let height = s * (mean - middle.price);
        if height / mean < cfg.min_retracement {
            continue;
        }
        if !ctx.spans(first.index, second.index) {
            continue;
        }

        let neckline = middle.price;
        let breakout = first_close_beyond(ctx.bars, second.index, |_| neckline, top);
        let extreme = if top {
            first.price.max(second.price)
        } else {
            first.price.min(second.price)
        };
        out.push(ChartFormation {
            family: if top {
                ChartFamily::DoubleTop
            } else {
                ChartFamily::DoubleBottom
            },
            start: first.index,
            end: second.index,
            quality: quality(gap, cfg.peak_tolerance),
            breakout_price: breakout.map(|(_, lv)| lv),
            target_price: Some(neckline - s * height),
            stop_loss: Some(extreme),
            detail: PatternDetail::Double {
                first,
                middle,
                second,
            },
        });
    }
}

fn triples<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let cfg = ctx.config;
    for w in ctx.pivots.windows(5) {
        let top = w[0].is_high();
        let s = sign(top);
        let peaks = [w[0].point, w[2].point, w[4].point];
        let troughs = [w[1].point, w[3].point];

        let mean = peaks.iter().map(|p| p.price).sum::<f64>() / 3.0;
        if mean <= 0.0 {
            continue;
        }
        let spread = peaks
            .iter()
            .map(|p| (p.price - mean).abs() / mean)
            .fold(0.0, f64::max);
        if spread > cfg.peak_tolerance {
            continue;
        }
        if troughs
            .iter()
            .any(|t| s * (mean - t.price) / mean < cfg.min_retracement)
        {
            continue;
        }
        if !ctx.spans(peaks[0].index, peaks[2].index) {
            continue;
        }

        // Neckline sits at the deeper trough
        let neckline = if top {
            troughs[0].price.min(troughs[1].price)
        } else {
            troughs[0].price.max(troughs[1].price)
        };
        let height = s * (mean - neckline);
        let breakout = first_close_beyond(ctx.bars, peaks[2].index, |_| neckline, top);
        let extreme = peaks
            .iter()
            .map(|p| s * p.price)
            .fold(f64::MIN, f64::max)
            * s;
        out.push(ChartFormation {
            family: if top {
                ChartFamily::TripleTop
            } else {
                ChartFamily::TripleBottom
            },
            start: peaks[0].index,
            end: peaks[2].index,
            quality: quality(spread, cfg.peak_tolerance),
            breakout_price: breakout.map(|(_, lv)| lv),
            target_price: Some(neckline - s * height),
            stop_loss: Some(extreme),
            detail: PatternDetail::Triple {
                first: peaks[0],
                first_trough: troughs[0],
                second: peaks[1],
                second_trough: troughs[1],
                third: peaks[2],
            },
        });
    }
}

// ============================================================
// TRIANGLES, WEDGES, CHANNELS
// ============================================================

fn converging_and_parallel<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let n = ctx.config.trendline_pivots.min(ctx.pivots.len());
    if n < 4 {
        return;
    }
    let mut start = 0;
    while start + n <= ctx.pivots.len() {
        match lines_formation(ctx, &ctx.pivots[start..start + n]) {
            Some(formation) => {
                out.push(formation);
                // Windows of one family chain through their shared last pivot
                start += n - 1;
            }
            None => start += 1,
        }
    }
}

fn lines_formation<T: OHLCV>(ctx: &Context<'_, T>, window: &[Pivot]) -> Option<ChartFormation> {
    let cfg = ctx.config;
    let highs: Vec<PivotPoint> = window.iter().filter(|p| p.is_high()).map(|p| p.point).collect();
    let lows: Vec<PivotPoint> = window.iter().filter(|p| !p.is_high()).map(|p| p.point).collect();
    let upper = fit_line(&highs)?;
    let lower = fit_line(&lows)?;
    if upper.relative_rms > cfg.max_fit_residual || lower.relative_rms > cfg.max_fit_residual {
        return None;
    }

    let first = window.first()?.index();
    let last = window.last()?.index();
    if !ctx.spans(first, last) {
        return None;
    }

    let mean = window.iter().map(|p| p.price()).sum::<f64>() / window.len() as f64;
    let su = upper.line.slope / mean;
    let sl = lower.line.slope / mean;
    let gap_start = upper.line.at(first) - lower.line.at(first);
    let gap_end = upper.line.at(last) - lower.line.at(last);
    if gap_start <= 0.0 || gap_end <= 0.0 {
        return None;
    }

    let flat = cfg.flat_slope;
    let converging = gap_end <= gap_start * (1.0 - cfg.min_convergence);
    let parallel = (su - sl).abs() <= cfg.parallel_tolerance;

    let family = if converging {
        if su.abs() < flat && sl >= flat {
            ChartFamily::AscendingTriangle
        } else if sl.abs() < flat && su <= -flat {
            ChartFamily::DescendingTriangle
        } else if su <= -flat && sl >= flat {
            ChartFamily::SymmetricalTriangle
        } else if su >= flat && sl >= flat {
            ChartFamily::RisingWedge
        } else if su <= -flat && sl <= -flat {
            ChartFamily::FallingWedge
        } else {
            return None;
        }
    } else if parallel {
        if su.abs() < flat && sl.abs() < flat {
            ChartFamily::Rectangle
        } else if su >= flat && sl >= flat {
            ChartFamily::AscendingChannel
        } else if su <= -flat && sl <= -flat {
            ChartFamily::DescendingChannel
        } else {
            return None;
        }
    } else {
        return None;
    };

    let (breakout_price, target_price, stop_loss) =
        line_levels(ctx.bars, family, &upper.line, &lower.line, last, gap_start);

    Some(ChartFormation {
        family,
        start: first,
        end: last,
        quality: quality(upper.relative_rms.max(lower.relative_rms), cfg.max_fit_residual),
        breakout_price,
        target_price,
        stop_loss,
        detail: PatternDetail::Lines {
            upper: upper.line,
            lower: lower.line,
            touches: window.iter().map(|p| p.point).collect(),
        },
    })
}

/// Breakout, target and stop for a formation bounded by two lines.
///
/// Neutral families take the direction of whichever line breaks first and
/// have no levels until one does.
fn line_levels<T: OHLCV>(
    bars: &[T],
    family: ChartFamily,
    upper: &Line,
    lower: &Line,
    last: usize,
    height: f64,
) -> (Option<f64>, Option<f64>, Option<f64>) {
    let up = || first_close_beyond(bars, last, |i| upper.at(i), false);
    let down = || first_close_beyond(bars, last, |i| lower.at(i), true);
    let bullish = |b: Option<(usize, f64)>| {
        let level = b.map_or(upper.at(last), |(_, lv)| lv);
        (b.map(|(_, lv)| lv), Some(level + height), Some(lower.at(last)))
    };
    let bearish = |b: Option<(usize, f64)>| {
        let level = b.map_or(lower.at(last), |(_, lv)| lv);
        (b.map(|(_, lv)| lv), Some(level - height), Some(upper.at(last)))
    };

    match family.signal() {
        crate::Direction::Bullish => bullish(up()),
        crate::Direction::Bearish => bearish(down()),
        crate::Direction::Neutral => match (up(), down()) {
            (Some(u), Some(d)) if d.0 < u.0 => bearish(Some(d)),
            (Some(u), _) => bullish(Some(u)),
            (None, Some(d)) => bearish(Some(d)),
            (None, None) => (None, None, None),
        },
    }
}

// ============================================================
// FLAGS AND PENNANTS
// ============================================================

fn flags<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let flag_length = ctx.config.flag_length;
    let mut pole_end = 1;
    while pole_end + flag_length < ctx.bars.len() {
        let found = flag_at(ctx, pole_end, true).or_else(|| flag_at(ctx, pole_end, false));
        match found {
            Some(formation) => {
                out.push(formation);
                pole_end += flag_length;
            }
            None => pole_end += 1,
        }
    }
}

fn flag_at<T: OHLCV>(ctx: &Context<'_, T>, pole_end: usize, bullish: bool) -> Option<ChartFormation> {
    let cfg = ctx.config;
    let bars = ctx.bars;
    let flag_start = pole_end + 1;
    let flag_end = pole_end + cfg.flag_length;
    let lo = pole_end.saturating_sub(cfg.max_pole_length);

    let s = sign(bullish);
    // Pole runs from the opposite extreme to the pole end
    let origin = (lo..pole_end).min_by(|&a, &b| {
        let key = |i: usize| if bullish { bars[i].low() } else { -bars[i].high() };
        key(a).total_cmp(&key(b))
    })?;
    let pole_start = PivotPoint::new(origin, if bullish { bars[origin].low() } else { bars[origin].high() });
    let tip = PivotPoint::new(pole_end, if bullish { bars[pole_end].high() } else { bars[pole_end].low() });
    let height = s * (tip.price - pole_start.price);
    if pole_start.price <= 0.0 || height / pole_start.price < cfg.min_pole_move {
        return None;
    }
    if !ctx.spans(origin, flag_end) {
        return None;
    }

    let flag = &bars[flag_start..=flag_end];
    // The flag never exceeds the pole tip
    let beyond = flag.iter().any(|b| {
        if bullish {
            b.high() > tip.price
        } else {
            b.low() < tip.price
        }
    });
    if beyond {
        return None;
    }
    let flag_low = flag.iter().map(|b| b.low()).fold(f64::MAX, f64::min);
    let flag_high = flag.iter().map(|b| b.high()).fold(f64::MIN, f64::max);
    let retrace = if bullish { tip.price - flag_low } else { flag_high - tip.price };
    if retrace / height > cfg.max_flag_retrace {
        return None;
    }

    let highs: Vec<f64> = flag.iter().map(|b| b.high()).collect();
    let lows: Vec<f64> = flag.iter().map(|b| b.low()).collect();
    let upper: LineFit = fit_series(flag_start, &highs)?;
    let lower: LineFit = fit_series(flag_start, &lows)?;
    if upper.relative_rms > cfg.max_fit_residual || lower.relative_rms > cfg.max_fit_residual {
        return None;
    }

    let su = upper.line.slope / tip.price;
    let sl = lower.line.slope / tip.price;
    let gap_start = upper.line.at(flag_start) - lower.line.at(flag_start);
    let gap_end = upper.line.at(flag_end) - lower.line.at(flag_end);
    if gap_start <= 0.0 || gap_end <= 0.0 {
        return None;
    }
    let converging = gap_end <= gap_start * (1.0 - cfg.min_convergence);
    let parallel = (su - sl).abs() <= cfg.parallel_tolerance;

    let family = if converging && su <= 0.0 && sl >= 0.0 {
        if bullish {
            ChartFamily::BullPennant
        } else {
            ChartFamily::BearPennant
        }
    } else if parallel && s * su < cfg.flat_slope {
        // Flags drift against the pole or sideways
        if bullish {
            ChartFamily::BullFlag
        } else {
            ChartFamily::BearFlag
        }
    } else {
        return None;
    };

    let edge = if bullish { upper.line } else { lower.line };
    let breakout = first_close_beyond(bars, flag_end, |i| edge.at(i), !bullish);
    let level = breakout.map_or(edge.at(flag_end), |(_, lv)| lv);

    Some(ChartFormation {
        family,
        start: origin,
        end: flag_end,
        quality: quality(upper.relative_rms.max(lower.relative_rms), cfg.max_fit_residual),
        breakout_price: breakout.map(|(_, lv)| lv),
        target_price: Some(level + s * height),
        stop_loss: Some(if bullish { flag_low } else { flag_high }),
        detail: PatternDetail::Flag {
            pole_start,
            pole_end: tip,
            upper: upper.line,
            lower: lower.line,
        },
    })
}

// ============================================================
// ROUNDING
// ============================================================

fn rounding<T: OHLCV>(ctx: &Context<'_, T>, out: &mut Vec<ChartFormation>) {
    let width = ctx.config.rounding_window.get();
    let step = (width / 4).max(1);
    let mut start = 0;
    while start + width <= ctx.bars.len() {
        match rounding_at(ctx, start, width) {
            Some(formation) => {
                out.push(formation);
                start += width;
            }
            None => start += step,
        }
    }
}

fn rounding_at<T: OHLCV>(ctx: &Context<'_, T>, start: usize, width: usize) -> Option<ChartFormation> {
    let cfg = ctx.config;
    let end = start + width - 1;
    if !ctx.spans(start, end) {
        return None;
    }
    let span = &ctx.bars[start..=end];
    let closes: Vec<f64> = span.iter().map(|b| b.close()).collect();
    let fit = fit_parabola(start, &closes)?;
    if fit.r_squared < cfg.min_rounding_fit {
        return None;
    }

    // Turning point in the middle half of the window
    let vertex = fit.vertex()?;
    let quarter = width as f64 / 4.0;
    if vertex < start as f64 + quarter || vertex > end as f64 - quarter {
        return None;
    }

    let mean = closes.iter().sum::<f64>() / width as f64;
    let half = width as f64 / 2.0;
    if mean <= 0.0 || fit.a.abs() * half * half / mean < cfg.min_retracement {
        return None;
    }

    let top = fit.a < 0.0;
    let s = sign(top);
    let (offset, extreme_price) = span
        .iter()
        .map(|b| if top { b.high() } else { b.low() })
        .enumerate()
        .max_by(|a, b| (s * a.1).total_cmp(&(s * b.1)))?;
    let extreme = PivotPoint::new(start + offset, extreme_price);

    // Rim: the nearer edge close on the breakout side
    let (first_close, last_close) = (closes[0], closes[width - 1]);
    let rim = if top {
        first_close.min(last_close)
    } else {
        first_close.max(last_close)
    };
    let depth = s * (extreme_price - rim);
    let breakout = first_close_beyond(ctx.bars, end, |_| rim, top);

    Some(ChartFormation {
        family: if top {
            ChartFamily::RoundingTop
        } else {
            ChartFamily::RoundingBottom
        },
        start,
        end,
        quality: ((fit.r_squared - cfg.min_rounding_fit) / (1.0 - cfg.min_rounding_fit)).clamp(0.0, 1.0),
        breakout_price: breakout.map(|(_, lv)| lv),
        target_price: Some(rim - s * depth),
        stop_loss: Some(extreme_price),
        detail: PatternDetail::Rounding {
            extreme,
            curvature: fit.a,
            r_squared: fit.r_squared,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::pivots::find_pivots;

    #[derive(Clone, Copy)]
    struct Bar {
        high: f64,
        low: f64,
        close: f64,
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.close
        }
        fn high(&self) -> f64 {
            self.high
        }
        fn low(&self) -> f64 {
            self.low
        }
        fn close(&self) -> f64 {
            self.close
        }
        fn volume(&self) -> f64 {
            1.0
        }
    }

    /// Piecewise-linear path through `(index, price)` knots.
    fn path(knots: &[(usize, f64)], spread: f64) -> Vec<Bar> {
        let mut bars = Vec::new();
        for pair in knots.windows(2) {
            let ((i0, p0), (i1, p1)) = (pair[0], pair[1]);
            for i in i0..i1 {
                let p = p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64;
                bars.push(Bar {
                    high: p + spread,
                    low: p - spread,
                    close: p,
                });
            }
        }
        let &(_, last) = knots.last().unwrap();
        bars.push(Bar {
            high: last + spread,
            low: last - spread,
            close: last,
        });
        bars
    }

    fn run(bars: &[Bar], config: &GeometryConfig) -> Vec<ChartFormation> {
        let pivots = find_pivots(bars, config.pivot_window.get());
        scan_all(&Context {
            bars,
            pivots: &pivots,
            config,
            min_len: 20,
        })
    }

    fn names(found: &[ChartFormation]) -> Vec<&'static str> {
        found.iter().map(|f| f.family.name()).collect()
    }

    #[test]
    fn test_double_top_and_breakout() {
        let bars = path(&[(0, 80.0), (15, 100.0), (30, 90.0), (45, 100.0), (70, 75.0)], 0.5);
        let found = run(&bars, &GeometryConfig::default());
        let top = found
            .iter()
            .find(|f| f.family == ChartFamily::DoubleTop)
            .expect("double top");
        assert_eq!((top.start, top.end), (15, 45));
        assert_eq!(top.breakout_price, Some(89.5));
        // neckline 89.5, height 11
        assert!((top.target_price.unwrap() - 78.5).abs() < 1e-9);
        assert_eq!(top.stop_loss, Some(100.5));
        assert!((top.quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_double_bottom() {
        let bars = path(&[(0, 120.0), (15, 100.0), (30, 110.0), (45, 100.0), (60, 115.0)], 0.5);
        let found = run(&bars, &GeometryConfig::default());
        assert!(names(&found).contains(&"Double Bottom"));
        assert!(!names(&found).contains(&"Double Top"));
    }

    #[test]
    fn test_unequal_peaks_rejected() {
        let bars = path(&[(0, 80.0), (15, 100.0), (30, 90.0), (45, 104.0), (70, 75.0)], 0.5);
        let found = run(&bars, &GeometryConfig::default());
        assert!(!names(&found).contains(&"Double Top"));
    }

    #[test]
    fn test_head_and_shoulders() {
        let bars = path(
            &[
                (0, 80.0),
                (10, 100.0),
                (20, 90.0),
                (30, 110.0),
                (40, 90.0),
                (50, 100.0),
                (70, 75.0),
            ],
            0.5,
        );
        let found = run(&bars, &GeometryConfig::default());
        let hs = found
            .iter()
            .find(|f| f.family == ChartFamily::HeadAndShoulders)
            .expect("head and shoulders");
        assert_eq!((hs.start, hs.end), (10, 50));
        assert!(hs.breakout_price.is_some());
        assert!(!names(&found).contains(&"Triple Top"));
    }

    #[test]
    fn test_triple_bottom() {
        let bars = path(
            &[
                (0, 120.0),
                (10, 100.0),
                (20, 110.0),
                (30, 100.0),
                (40, 110.0),
                (50, 100.0),
                (65, 118.0),
            ],
            0.5,
        );
        let found = run(&bars, &GeometryConfig::default());
        assert!(names(&found).contains(&"Triple Bottom"));
    }

    #[test]
    fn test_symmetrical_triangle() {
        let bars = path(
            &[
                (0, 100.0),
                (8, 120.0),
                (16, 82.0),
                (24, 116.0),
                (32, 86.0),
                (40, 112.0),
                (48, 90.0),
                (60, 100.0),
            ],
            0.5,
        );
        let found = run(&bars, &GeometryConfig::default());
        assert!(names(&found).contains(&"Symmetrical Triangle"), "{:?}", names(&found));
    }

    #[test]
    fn test_ascending_channel() {
        let bars = path(
            &[
                (0, 100.0),
                (8, 110.0),
                (16, 104.0),
                (24, 114.0),
                (32, 108.0),
                (40, 118.0),
                (48, 112.0),
                (56, 116.0),
            ],
            0.5,
        );
        let found = run(&bars, &GeometryConfig::default());
        assert!(names(&found).contains(&"Ascending Channel"), "{:?}", names(&found));
    }

    #[test]
    fn test_bull_flag() {
        let mut knots = vec![(0, 100.0), (10, 100.0), (20, 130.0)];
        // Gentle down-drifting consolidation
        knots.push((35, 127.0));
        knots.push((45, 140.0));
        let bars = path(&knots, 0.6);
        let found = run(&bars, &GeometryConfig::default());
        let flag = found
            .iter()
            .find(|f| f.family == ChartFamily::BullFlag)
            .expect("bull flag");
        assert_eq!(flag.end, 35);
        assert!(flag.breakout_price.is_some());
    }

    #[test]
    fn test_rounding_bottom() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let x = i as f64 - 30.0;
                let p = 100.0 + 0.02 * x * x;
                Bar {
                    high: p + 0.3,
                    low: p - 0.3,
                    close: p,
                }
            })
            .collect();
        let found = run(&bars, &GeometryConfig::default());
        let bottom = found
            .iter()
            .find(|f| f.family == ChartFamily::RoundingBottom)
            .expect("rounding bottom");
        assert!(bottom.quality > 0.9);
    }

    fn zigzag(knots: &[(usize, f64)]) -> Vec<&'static str> {
        names(&run(&path(knots, 0.5), &GeometryConfig::default()))
    }

    /// Pole from 100 to 130 (or the mirror), then a 15-bar pennant whose
    /// range shrinks around `mid`.
    fn pennant(bullish: bool) -> Vec<Bar> {
        let (base, tip, mid, after) = if bullish {
            (100.0, 130.0, 127.0, 140.0)
        } else {
            (130.0, 100.0, 103.0, 90.0)
        };
        let mut bars = path(&[(0, base), (10, base), (20, tip)], 0.6);
        for k in 0..15 {
            let half = 2.5 - 0.15 * k as f64;
            bars.push(Bar {
                high: mid + half,
                low: mid - half,
                close: mid,
            });
        }
        bars.extend(path(&[(0, mid), (10, after)], 0.6).into_iter().skip(1));
        bars
    }

    #[test]
    fn test_inverse_head_and_shoulders() {
        let found = run(
            &path(
                &[
                    (0, 120.0),
                    (10, 100.0),
                    (20, 110.0),
                    (30, 90.0),
                    (40, 110.0),
                    (50, 100.0),
                    (70, 125.0),
                ],
                0.5,
            ),
            &GeometryConfig::default(),
        );
        let ihs = found
            .iter()
            .find(|f| f.family == ChartFamily::InverseHeadAndShoulders)
            .expect("inverse head and shoulders");
        assert_eq!((ihs.start, ihs.end), (10, 50));
        assert!(ihs.target_price.unwrap() > 110.5);
        assert!(!names(&found).contains(&"Head and Shoulders"));
    }

    #[test]
    fn test_triple_top() {
        let found = zigzag(&[
            (0, 80.0),
            (10, 100.0),
            (20, 90.0),
            (30, 100.0),
            (40, 90.0),
            (50, 100.0),
            (65, 82.0),
        ]);
        assert!(found.contains(&"Triple Top"), "{found:?}");
        assert!(!found.contains(&"Head and Shoulders"));
    }

    #[test]
    fn test_ascending_triangle() {
        // Flat highs, rising lows
        let found = zigzag(&[
            (0, 105.0),
            (8, 120.0),
            (16, 100.0),
            (24, 120.0),
            (32, 106.0),
            (40, 120.0),
            (48, 112.0),
            (56, 115.0),
        ]);
        assert!(found.contains(&"Ascending Triangle"), "{found:?}");
    }

    #[test]
    fn test_descending_triangle() {
        let found = zigzag(&[
            (0, 110.0),
            (8, 120.0),
            (16, 100.0),
            (24, 114.0),
            (32, 100.0),
            (40, 108.0),
            (48, 100.0),
            (56, 104.0),
        ]);
        assert!(found.contains(&"Descending Triangle"), "{found:?}");
    }

    #[test]
    fn test_rising_wedge() {
        // Lows climb twice as fast as highs
        let found = zigzag(&[
            (0, 104.0),
            (8, 110.0),
            (16, 100.0),
            (24, 114.0),
            (32, 108.0),
            (40, 118.0),
            (48, 116.0),
            (56, 120.0),
        ]);
        assert!(found.contains(&"Rising Wedge"), "{found:?}");
    }

    #[test]
    fn test_falling_wedge() {
        let found = zigzag(&[
            (0, 112.0),
            (8, 120.0),
            (16, 104.0),
            (24, 112.0),
            (32, 100.0),
            (40, 104.0),
            (48, 96.0),
            (56, 100.0),
        ]);
        assert!(found.contains(&"Falling Wedge"), "{found:?}");
    }

    #[test]
    fn test_descending_channel() {
        let found = zigzag(&[
            (0, 112.0),
            (8, 118.0),
            (16, 108.0),
            (24, 114.0),
            (32, 104.0),
            (40, 110.0),
            (48, 100.0),
            (56, 104.0),
        ]);
        assert!(found.contains(&"Descending Channel"), "{found:?}");
        assert!(!found.contains(&"Falling Wedge"));
    }

    #[test]
    fn test_rectangle() {
        let found = zigzag(&[
            (0, 105.0),
            (8, 110.0),
            (16, 100.0),
            (24, 110.0),
            (32, 100.0),
            (40, 110.0),
            (48, 100.0),
            (56, 104.0),
        ]);
        assert!(found.contains(&"Rectangle"), "{found:?}");
    }

    #[test]
    fn test_bear_flag() {
        // Mirror of the bull flag: drop, gentle up-drift, continuation
        let bars = path(&[(0, 130.0), (10, 130.0), (20, 100.0), (35, 103.0), (45, 90.0)], 0.6);
        let found = run(&bars, &GeometryConfig::default());
        let flag = found
            .iter()
            .find(|f| f.family == ChartFamily::BearFlag)
            .expect("bear flag");
        assert_eq!(flag.end, 35);
        assert!(flag.target_price.unwrap() < flag.stop_loss.unwrap());
    }

    #[test]
    fn test_bull_pennant() {
        let found = run(&pennant(true), &GeometryConfig::default());
        let p = found
            .iter()
            .find(|f| f.family == ChartFamily::BullPennant)
            .expect("bull pennant");
        assert_eq!(p.end, 35);
        assert!(!names(&found).contains(&"Bull Flag"));
    }

    #[test]
    fn test_bear_pennant() {
        let found = run(&pennant(false), &GeometryConfig::default());
        let p = found
            .iter()
            .find(|f| f.family == ChartFamily::BearPennant)
            .expect("bear pennant");
        assert_eq!(p.end, 35);
    }

    #[test]
    fn test_rounding_top() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let x = i as f64 - 30.0;
                let p = 130.0 - 0.02 * x * x;
                Bar {
                    high: p + 0.3,
                    low: p - 0.3,
                    close: p,
                }
            })
            .collect();
        let found = run(&bars, &GeometryConfig::default());
        assert!(names(&found).contains(&"Rounding Top"), "{:?}", names(&found));
        assert!(!names(&found).contains(&"Rounding Bottom"));
    }

    #[test]
    fn test_short_span_rejected() {
        let bars = path(&[(0, 80.0), (5, 100.0), (10, 90.0), (15, 100.0), (30, 75.0)], 0.5);
        let found = run(&bars, &GeometryConfig::default());
        assert!(!names(&found).contains(&"Double Top"));
    }
}
