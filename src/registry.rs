//! Named signal strategies.
//!
//! The registry is an ordinary value built at startup and passed to whoever
//! needs it. There is no global table.

use std::collections::BTreeMap;

use crate::{
    candle::Candle,
    candlestick::CandlestickScanner,
    config::{CandlestickConfig, GeometryConfig},
    geometry::GeometricScanner,
    record::PatternDraft,
    Direction, PatternError, Result,
};

/// Directional verdict of a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub direction: Direction,
    pub confidence: f64,
    pub reason: String,
}

impl Signal {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    fn from_draft(draft: &PatternDraft) -> Self {
        Self {
            direction: draft.signal,
            confidence: draft.confidence,
            reason: draft.name.to_string(),
        }
    }
}

/// Turns a candle history into a [`Signal`]
pub trait SignalStrategy: Send + Sync {
    fn analyze(&self, candles: &[Candle]) -> Result<Signal>;
}

/// Most confident candlestick formation completed in the last few candles.
pub struct CandlestickStrategy {
    scanner: CandlestickScanner,
    recent: usize,
}

impl CandlestickStrategy {
    pub fn new(config: CandlestickConfig, recent: usize) -> Result<Self> {
        Ok(Self {
            scanner: CandlestickScanner::with_config(config)?,
            recent,
        })
    }
}

impl SignalStrategy for CandlestickStrategy {
    fn analyze(&self, candles: &[Candle]) -> Result<Signal> {
        let cutoff = candles.len().saturating_sub(self.recent);
        let drafts = self.scanner.drafts(candles)?;
        Ok(strongest(drafts.iter().filter(|d| d.window.end >= cutoff))
            .unwrap_or_else(|| Signal::neutral("no recent candlestick formation")))
    }
}

/// Most confident chart formation ending near the tail.
pub struct ChartStrategy {
    scanner: GeometricScanner,
    min_pattern_length: usize,
    recent: usize,
}

impl ChartStrategy {
    pub fn new(config: GeometryConfig, min_pattern_length: usize, recent: usize) -> Result<Self> {
        Ok(Self {
            scanner: GeometricScanner::new(config)?,
            min_pattern_length,
            recent,
        })
    }
}

impl SignalStrategy for ChartStrategy {
    fn analyze(&self, candles: &[Candle]) -> Result<Signal> {
        let cutoff = candles.len().saturating_sub(self.recent);
        let drafts = self.scanner.find_formations(candles, self.min_pattern_length)?;
        Ok(strongest(drafts.iter().filter(|d| d.window.end >= cutoff))
            .unwrap_or_else(|| Signal::neutral("no recent chart formation")))
    }
}

/// Directional drafts win over neutral ones of equal confidence.
fn strongest<'a>(drafts: impl Iterator<Item = &'a PatternDraft>) -> Option<Signal> {
    drafts
        .max_by(|a, b| {
            a.confidence
                .total_cmp(&b.confidence)
                .then_with(|| (a.signal != Direction::Neutral).cmp(&(b.signal != Direction::Neutral)))
        })
        .map(Signal::from_draft)
}

// ============================================================
// REGISTRY
// ============================================================

/// Strategy id to handler
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Box<dyn SignalStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `candlestick` and `chart` with default settings.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register("candlestick", CandlestickStrategy::new(CandlestickConfig::default(), 3)?)?;
        registry.register("chart", ChartStrategy::new(GeometryConfig::default(), 20, 10)?)?;
        Ok(registry)
    }

    /// Add a handler; an id may only be registered once.
    pub fn register<S: SignalStrategy + 'static>(&mut self, id: impl Into<String>, strategy: S) -> Result<()> {
        let id = id.into();
        if self.strategies.contains_key(&id) {
            return Err(PatternError::InvalidConfig(format!("strategy {id} already registered")));
        }
        self.strategies.insert(id, Box::new(strategy));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn SignalStrategy> {
        self.strategies.get(id).map(|s| s.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Run the strategy registered under `id`.
    pub fn analyze(&self, id: &str, candles: &[Candle]) -> Result<Signal> {
        self.get(id)
            .ok_or_else(|| PatternError::InvalidConfig(format!("unknown strategy {id}")))?
            .analyze(candles)
    }
}
