//! Lines and curves through price points.

use serde::{Deserialize, Serialize};

use crate::record::PivotPoint;

/// `price = slope * index + intercept`, with `index` the candle position in
/// the scanned series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    pub fn horizontal(price: f64) -> Self {
        Self {
            slope: 0.0,
            intercept: price,
        }
    }

    /// Line through two points; `None` when they share an index.
    pub fn through(a: PivotPoint, b: PivotPoint) -> Option<Self> {
        if a.index == b.index {
            return None;
        }
        let slope = (b.price - a.price) / (b.index as f64 - a.index as f64);
        Some(Self {
            slope,
            intercept: a.price - slope * a.index as f64,
        })
    }

    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    #[inline]
    pub fn at(&self, index: usize) -> f64 {
        self.value_at(index as f64)
    }
}

/// Least-squares line with its goodness of fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub line: Line,
    /// Root mean square residual in price units
    pub rms: f64,
    /// `rms` divided by the mean price of the fitted points
    pub relative_rms: f64,
}

/// Ordinary least squares over `(index, price)` points.
///
/// Needs two distinct indices and a positive mean price.
pub fn fit_line(points: &[PivotPoint]) -> Option<LineFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.index as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.price).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
        let dx = p.index as f64 - mean_x;
        (sxx + dx * dx, sxy + dx * (p.price - mean_y))
    });
    if sxx <= f64::EPSILON || mean_y <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let line = Line {
        slope,
        intercept: mean_y - slope * mean_x,
    };
    let sse: f64 = points
        .iter()
        .map(|p| (p.price - line.at(p.index)).powi(2))
        .sum();
    let rms = (sse / n).sqrt();
    Some(LineFit {
        line,
        rms,
        relative_rms: rms / mean_y,
    })
}

/// Least-squares fit over consecutive prices, the first at `offset`.
pub fn fit_series(offset: usize, prices: &[f64]) -> Option<LineFit> {
    let points: Vec<PivotPoint> = prices
        .iter()
        .enumerate()
        .map(|(i, &p)| PivotPoint::new(offset + i, p))
        .collect();
    fit_line(&points)
}

// ============================================================
// QUADRATIC
// ============================================================

/// `price = a * (x - center)² + b * (x - center) + c`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Index the polynomial is centred on
    pub center: f64,
    pub r_squared: f64,
}

impl Parabola {
    pub fn value_at(&self, x: f64) -> f64 {
        let d = x - self.center;
        self.a * d * d + self.b * d + self.c
    }

    /// Index of the turning point; `None` for a degenerate curve.
    pub fn vertex(&self) -> Option<f64> {
        if self.a.abs() <= f64::EPSILON {
            return None;
        }
        Some(self.center - self.b / (2.0 * self.a))
    }
}

/// Quadratic least squares over consecutive prices, the first at `offset`.
///
/// `x` is centred before solving the normal equations to keep them well
/// conditioned for long windows.
pub fn fit_parabola(offset: usize, prices: &[f64]) -> Option<Parabola> {
    if prices.len() < 3 {
        return None;
    }
    let n = prices.len() as f64;
    let center = offset as f64 + (n - 1.0) / 2.0;

    let mut s = [0.0_f64; 5];
    let mut t = [0.0_f64; 3];
    for (i, &y) in prices.iter().enumerate() {
        let x = (offset + i) as f64 - center;
        let mut xp = 1.0;
        for k in 0..5 {
            s[k] += xp;
            if k < 3 {
                t[k] += xp * y;
            }
            xp *= x;
        }
    }

    // | s4 s3 s2 | |a|   |t2|
    // | s3 s2 s1 | |b| = |t1|
    // | s2 s1 s0 | |c|   |t0|
    let m = [[s[4], s[3], s[2]], [s[3], s[2], s[1]], [s[2], s[1], s[0]]];
    let rhs = [t[2], t[1], t[0]];
    let det = det3(&m);
    if det.abs() <= f64::EPSILON {
        return None;
    }
    let solve = |col: usize| {
        let mut mc = m;
        for (row, value) in mc.iter_mut().zip(rhs) {
            row[col] = value;
        }
        det3(&mc) / det
    };
    let (a, b, c) = (solve(0), solve(1), solve(2));

    let mean = t[0] / n;
    let (sse, sst) = prices.iter().enumerate().fold((0.0, 0.0), |(sse, sst), (i, &y)| {
        let x = (offset + i) as f64 - center;
        let fitted = a * x * x + b * x + c;
        (sse + (y - fitted).powi(2), sst + (y - mean).powi(2))
    });
    let r_squared = if sst <= f64::EPSILON { 0.0 } else { 1.0 - sse / sst };

    Some(Parabola {
        a,
        b,
        c,
        center,
        r_squared,
    })
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}
