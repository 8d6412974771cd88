//! Geometric chart formations.
//!
//! The scanner extracts alternating swing pivots, then tests each formation
//! family against them with trendline and curve fits. Every accepted formation
//! carries a fit quality in `[0, 1]` that scales the family's base confidence.
//!
//! Formations of different families may overlap; all of them are reported.

pub mod formations;
pub mod pivots;
pub mod trendline;

use tracing::debug;

use crate::{
    candle::Candle,
    config::GeometryConfig,
    record::{DetectedPattern, PatternDetail, PatternDraft, PatternWindow, RecordBuilder, ScannerKind},
    timeframe::Timeframe,
    Direction, PatternError, PatternKind, Result, OHLCV,
};

/// Upper bound of any geometric confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

// ============================================================
// FAMILIES
// ============================================================

/// Every chart formation the scanner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartFamily {
    HeadAndShoulders,
    InverseHeadAndShoulders,
    DoubleTop,
    DoubleBottom,
    TripleTop,
    TripleBottom,
    AscendingTriangle,
    DescendingTriangle,
    SymmetricalTriangle,
    RisingWedge,
    FallingWedge,
    AscendingChannel,
    DescendingChannel,
    Rectangle,
    BullFlag,
    BearFlag,
    BullPennant,
    BearPennant,
    RoundingTop,
    RoundingBottom,
}

impl ChartFamily {
    pub const ALL: [ChartFamily; 20] = [
        ChartFamily::HeadAndShoulders,
        ChartFamily::InverseHeadAndShoulders,
        ChartFamily::DoubleTop,
        ChartFamily::DoubleBottom,
        ChartFamily::TripleTop,
        ChartFamily::TripleBottom,
        ChartFamily::AscendingTriangle,
        ChartFamily::DescendingTriangle,
        ChartFamily::SymmetricalTriangle,
        ChartFamily::RisingWedge,
        ChartFamily::FallingWedge,
        ChartFamily::AscendingChannel,
        ChartFamily::DescendingChannel,
        ChartFamily::Rectangle,
        ChartFamily::BullFlag,
        ChartFamily::BearFlag,
        ChartFamily::BullPennant,
        ChartFamily::BearPennant,
        ChartFamily::RoundingTop,
        ChartFamily::RoundingBottom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartFamily::HeadAndShoulders => "Head and Shoulders",
            ChartFamily::InverseHeadAndShoulders => "Inverse Head and Shoulders",
            ChartFamily::DoubleTop => "Double Top",
            ChartFamily::DoubleBottom => "Double Bottom",
            ChartFamily::TripleTop => "Triple Top",
            ChartFamily::TripleBottom => "Triple Bottom",
            ChartFamily::AscendingTriangle => "Ascending Triangle",
            ChartFamily::DescendingTriangle => "Descending Triangle",
            ChartFamily::SymmetricalTriangle => "Symmetrical Triangle",
            ChartFamily::RisingWedge => "Rising Wedge",
            ChartFamily::FallingWedge => "Falling Wedge",
            ChartFamily::AscendingChannel => "Ascending Channel",
            ChartFamily::DescendingChannel => "Descending Channel",
            ChartFamily::Rectangle => "Rectangle",
            ChartFamily::BullFlag => "Bull Flag",
            ChartFamily::BearFlag => "Bear Flag",
            ChartFamily::BullPennant => "Bull Pennant",
            ChartFamily::BearPennant => "Bear Pennant",
            ChartFamily::RoundingTop => "Rounding Top",
            ChartFamily::RoundingBottom => "Rounding Bottom",
        }
    }

    pub fn kind(self) -> PatternKind {
        use ChartFamily::*;
        match self {
            AscendingTriangle | DescendingTriangle | SymmetricalTriangle | AscendingChannel
            | DescendingChannel | Rectangle | BullFlag | BearFlag | BullPennant | BearPennant => {
                PatternKind::Continuation
            }
            _ => PatternKind::Reversal,
        }
    }

    pub fn signal(self) -> Direction {
        use ChartFamily::*;
        match self {
            InverseHeadAndShoulders | DoubleBottom | TripleBottom | AscendingTriangle
            | FallingWedge | AscendingChannel | BullFlag | BullPennant | RoundingBottom => {
                Direction::Bullish
            }
            SymmetricalTriangle | Rectangle => Direction::Neutral,
            _ => Direction::Bearish,
        }
    }

    pub fn base_confidence(self) -> f64 {
        use ChartFamily::*;
        match self {
            HeadAndShoulders | InverseHeadAndShoulders | TripleTop | TripleBottom => 0.80,
            DoubleTop | DoubleBottom => 0.75,
            AscendingTriangle | DescendingTriangle | RisingWedge | FallingWedge => 0.70,
            SymmetricalTriangle => 0.65,
            AscendingChannel | DescendingChannel | Rectangle => 0.65,
            BullFlag | BearFlag | BullPennant | BearPennant => 0.65,
            RoundingTop | RoundingBottom => 0.60,
        }
    }
}

// ============================================================
// FORMATION
// ============================================================

/// A formation found in one series, in candle-index space.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFormation {
    pub family: ChartFamily,
    pub start: usize,
    pub end: usize,
    /// Fit quality in `[0, 1]`
    pub quality: f64,
    pub breakout_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub detail: PatternDetail,
}

impl ChartFormation {
    /// `base × (0.8 + 0.2 × quality)`, capped.
    pub fn confidence(&self) -> f64 {
        let quality = self.quality.clamp(0.0, 1.0);
        (self.family.base_confidence() * (0.8 + 0.2 * quality)).min(MAX_CONFIDENCE)
    }

    pub fn into_draft(self, padding: usize) -> PatternDraft {
        let confidence = self.confidence();
        PatternDraft {
            name: self.family.name(),
            kind: self.family.kind(),
            signal: self.family.signal(),
            source: ScannerKind::Geometric,
            window: PatternWindow::new(self.start, self.end).with_padding(padding),
            base_confidence: self.family.base_confidence(),
            confidence,
            breakout_price: self.breakout_price,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            detail: self.detail,
        }
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Pivot and trendline based formation scanner
#[derive(Debug, Clone)]
pub struct GeometricScanner {
    config: GeometryConfig,
    window_padding: usize,
}

impl GeometricScanner {
    pub fn new(config: GeometryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            window_padding: PatternWindow::DEFAULT_PADDING,
        })
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.window_padding = padding;
        self
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Raw formations of any OHLCV series.
    pub fn formations<T: OHLCV>(&self, bars: &[T], min_pattern_length: usize) -> Result<Vec<ChartFormation>> {
        if bars.len() < min_pattern_length {
            return Err(PatternError::InsufficientData {
                need: min_pattern_length,
                got: bars.len(),
            });
        }
        let pivots = pivots::find_pivots(bars, self.config.pivot_window.get());
        let ctx = formations::Context {
            bars,
            pivots: &pivots,
            config: &self.config,
            min_len: min_pattern_length,
        };
        Ok(formations::scan_all(&ctx))
    }

    /// Formations as drafts for the record builder.
    pub fn find_formations<T: OHLCV>(&self, bars: &[T], min_pattern_length: usize) -> Result<Vec<PatternDraft>> {
        Ok(self
            .formations(bars, min_pattern_length)?
            .into_iter()
            .map(|f| f.into_draft(self.window_padding))
            .collect())
    }

    /// Full records for one timeframe's candles.
    pub fn detect(
        &self,
        candles: &[Candle],
        timeframe: Timeframe,
        min_pattern_length: usize,
    ) -> Result<Vec<DetectedPattern>> {
        let drafts = self.find_formations(candles, min_pattern_length)?;
        let builder = RecordBuilder::new(candles, timeframe);
        let records = drafts
            .into_iter()
            .map(|draft| builder.build(draft))
            .collect::<Result<Vec<_>>>()?;
        debug!(%timeframe, candles = candles.len(), found = records.len(), "geometric scan");
        Ok(records)
    }
}
