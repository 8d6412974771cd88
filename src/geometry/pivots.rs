//! Swing highs and lows.

use crate::{record::PivotPoint, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub kind: PivotKind,
    pub point: PivotPoint,
}

impl Pivot {
    #[inline]
    pub fn index(&self) -> usize {
        self.point.index
    }

    #[inline]
    pub fn price(&self) -> f64 {
        self.point.price
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.kind == PivotKind::High
    }

    /// `self` lies further out than `other` in its own direction.
    fn more_extreme(&self, other: &Pivot) -> bool {
        match self.kind {
            PivotKind::High => self.price() > other.price(),
            PivotKind::Low => self.price() < other.price(),
        }
    }
}

/// Alternating swing points of `bars`.
///
/// A bar is a pivot high when its high is strictly above every other high
/// within `window` bars on either side (pivot lows mirror this). Bars closer
/// than `window` to either edge never qualify. Runs of same-kind pivots are
/// collapsed to their most extreme member.
pub fn find_pivots<T: OHLCV>(bars: &[T], window: usize) -> Vec<Pivot> {
    if window == 0 || bars.len() < 2 * window + 1 {
        return Vec::new();
    }

    let mut raw = Vec::new();
    for i in window..bars.len() - window {
        let neighbours = (i - window..=i + window).filter(|&j| j != i);
        let high = bars[i].high();
        let low = bars[i].low();

        if neighbours.clone().all(|j| bars[j].high() < high) {
            raw.push(Pivot {
                kind: PivotKind::High,
                point: PivotPoint::new(i, high),
            });
        }
        if neighbours.clone().all(|j| bars[j].low() > low) {
            raw.push(Pivot {
                kind: PivotKind::Low,
                point: PivotPoint::new(i, low),
            });
        }
    }

    alternate(raw)
}

fn alternate(raw: Vec<Pivot>) -> Vec<Pivot> {
    let mut out: Vec<Pivot> = Vec::with_capacity(raw.len());
    for pivot in raw {
        match out.last_mut() {
            Some(last) if last.kind == pivot.kind => {
                if pivot.more_extreme(last) {
                    *last = pivot;
                }
            }
            _ => out.push(pivot),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bar(f64, f64);

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            (self.0 + self.1) / 2.0
        }
        fn high(&self) -> f64 {
            self.0
        }
        fn low(&self) -> f64 {
            self.1
        }
        fn close(&self) -> f64 {
            (self.0 + self.1) / 2.0
        }
        fn volume(&self) -> f64 {
            1.0
        }
    }

    fn bars(mids: &[f64]) -> Vec<Bar> {
        mids.iter().map(|&m| Bar(m + 0.5, m - 0.5)).collect()
    }

    #[test]
    fn test_single_peak_and_trough() {
        let series = bars(&[1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0]);
        let pivots = find_pivots(&series, 2);
        assert_eq!(pivots.len(), 2);
        assert_eq!(pivots[0].kind, PivotKind::High);
        assert_eq!(pivots[0].index(), 3);
        assert_eq!(pivots[1].kind, PivotKind::Low);
        assert_eq!(pivots[1].index(), 7);
    }

    #[test]
    fn test_ties_are_not_pivots() {
        let series = bars(&[1.0, 2.0, 5.0, 5.0, 2.0, 1.0, 0.0]);
        assert!(find_pivots(&series, 2).is_empty());
    }

    #[test]
    fn test_edges_excluded() {
        let series = bars(&[9.0, 1.0, 2.0, 3.0, 2.0, 1.0, 9.0]);
        let pivots = find_pivots(&series, 2);
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].index(), 3);
    }

    #[test]
    fn test_same_kind_runs_keep_extreme() {
        let raw = vec![
            Pivot {
                kind: PivotKind::High,
                point: PivotPoint::new(3, 10.0),
            },
            Pivot {
                kind: PivotKind::High,
                point: PivotPoint::new(8, 12.0),
            },
            Pivot {
                kind: PivotKind::Low,
                point: PivotPoint::new(12, 5.0),
            },
        ];
        let out = alternate(raw);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].price(), 12.0);
        assert_eq!(out[1].kind, PivotKind::Low);
    }

    #[test]
    fn test_short_input() {
        assert!(find_pivots(&bars(&[1.0, 2.0, 1.0]), 3).is_empty());
    }
}
