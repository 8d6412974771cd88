//! Detection settings.
//!
//! Every struct deserializes with `#[serde(default)]`, so a TOML document only
//! needs the keys it overrides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    params::{get_period, ParamMeta},
    PatternError, Period, Result,
};

/// Top-level settings for [`crate::service::DetectionService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum candles a geometric formation must span
    pub min_pattern_length: usize,
    /// Candles of the neighbour timeframe loaded around a formation
    pub window_padding: usize,
    /// Drop a still-filling trailing bucket before scanning
    pub drop_incomplete: bool,
    pub geometry: GeometryConfig,
    pub candlestick: CandlestickConfig,
    pub fusion: FusionConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_pattern_length: 20,
            window_padding: 20,
            drop_incomplete: true,
            geometry: GeometryConfig::default(),
            candlestick: CandlestickConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_pattern_length < 3 {
            return Err(PatternError::InvalidConfig(
                "min_pattern_length must be at least 3".into(),
            ));
        }
        self.geometry.validate()?;
        self.candlestick.validate()?;
        self.fusion.validate()
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PatternError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

// ============================================================
// GEOMETRY
// ============================================================

/// Acceptance tolerances of the geometric scanner.
///
/// Relative values are fractions of the price level they are compared with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Candles on each side a pivot must dominate
    pub pivot_window: Period,
    /// Equal tops/bottoms, relative to their mean
    pub peak_tolerance: f64,
    /// Equal shoulders of a head and shoulders
    pub shoulder_tolerance: f64,
    /// Minimum trough depth between equal tops (and the mirror for bottoms)
    pub min_retracement: f64,
    /// Per-candle slope, relative to mean price, below which a line is flat
    pub flat_slope: f64,
    /// Maximum relative slope difference of parallel lines
    pub parallel_tolerance: f64,
    /// Fraction the gap between converging lines must shrink
    pub min_convergence: f64,
    /// Largest relative RMS residual of a trendline fit
    pub max_fit_residual: f64,
    /// Pivots considered per converging/parallel line window
    pub trendline_pivots: usize,
    pub max_pole_length: usize,
    pub flag_length: usize,
    /// Minimum relative move of a flag pole
    pub min_pole_move: f64,
    /// Largest retracement of the pole by the flag body
    pub max_flag_retrace: f64,
    pub rounding_window: Period,
    /// Minimum R² of the quadratic fit
    pub min_rounding_fit: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            pivot_window: Period::new_const(3),
            peak_tolerance: 0.01,
            shoulder_tolerance: 0.03,
            min_retracement: 0.03,
            flat_slope: 0.0005,
            parallel_tolerance: 0.0005,
            min_convergence: 0.2,
            max_fit_residual: 0.02,
            trendline_pivots: 6,
            max_pole_length: 15,
            flag_length: 15,
            min_pole_move: 0.05,
            max_flag_retrace: 0.5,
            rounding_window: Period::new_const(40),
            min_rounding_fit: 0.85,
        }
    }
}

static GEOMETRY_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("pivot_window", 3.0, (2.0, 6.0, 1.0), "Candles each side a pivot must dominate"),
    ParamMeta::ratio("peak_tolerance", 0.01, (0.005, 0.03, 0.005), "Equal-peak tolerance"),
    ParamMeta::ratio("shoulder_tolerance", 0.03, (0.01, 0.05, 0.01), "Equal-shoulder tolerance"),
    ParamMeta::ratio("min_retracement", 0.03, (0.01, 0.06, 0.01), "Minimum trough depth"),
    ParamMeta::ratio("min_convergence", 0.2, (0.1, 0.5, 0.1), "Required gap shrink"),
    ParamMeta::ratio("max_fit_residual", 0.02, (0.01, 0.05, 0.01), "Largest relative RMS residual"),
    ParamMeta::ratio("min_rounding_fit", 0.85, (0.7, 0.95, 0.05), "Minimum R² of rounding fits"),
];

impl GeometryConfig {
    /// Tunable tolerances for grid search.
    pub fn param_meta() -> &'static [ParamMeta] {
        GEOMETRY_PARAMS
    }

    /// Defaults overridden by `params`; each value is checked against its range.
    pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        for meta in GEOMETRY_PARAMS {
            if let Some(&value) = params.get(meta.name) {
                meta.validate(value)?;
            }
        }
        let base = Self::default();
        let pick = |key: &str, default: f64| params.get(key).copied().unwrap_or(default);
        let config = Self {
            pivot_window: get_period(params, "pivot_window", base.pivot_window.get())?,
            peak_tolerance: pick("peak_tolerance", base.peak_tolerance),
            shoulder_tolerance: pick("shoulder_tolerance", base.shoulder_tolerance),
            min_retracement: pick("min_retracement", base.min_retracement),
            min_convergence: pick("min_convergence", base.min_convergence),
            max_fit_residual: pick("max_fit_residual", base.max_fit_residual),
            min_rounding_fit: pick("min_rounding_fit", base.min_rounding_fit),
            ..base
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("peak_tolerance", self.peak_tolerance)?;
        check_unit("shoulder_tolerance", self.shoulder_tolerance)?;
        check_unit("min_retracement", self.min_retracement)?;
        check_unit("flat_slope", self.flat_slope)?;
        check_unit("parallel_tolerance", self.parallel_tolerance)?;
        check_unit("min_convergence", self.min_convergence)?;
        check_unit("max_fit_residual", self.max_fit_residual)?;
        check_unit("min_pole_move", self.min_pole_move)?;
        check_unit("max_flag_retrace", self.max_flag_retrace)?;
        check_unit("min_rounding_fit", self.min_rounding_fit)?;
        if self.trendline_pivots < 4 {
            return Err(PatternError::InvalidConfig(
                "trendline_pivots must be at least 4".into(),
            ));
        }
        if self.max_pole_length < 2 || self.flag_length < 3 {
            return Err(PatternError::InvalidConfig(
                "flag geometry needs a pole of 2+ and a flag of 3+ candles".into(),
            ));
        }
        if self.rounding_window.get() < 10 {
            return Err(PatternError::InvalidConfig(
                "rounding_window must be at least 10".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// CANDLESTICK
// ============================================================

/// Candlestick scanner settings including the volume bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickConfig {
    /// Fewer candles than this is `InsufficientData`
    pub min_candles: usize,
    pub trend_period: Period,
    pub candle_period: Period,
    /// Trailing candles averaged for the volume ratio
    pub volume_period: Period,
    /// Volume ratio at or above which the band is "excellent"
    pub excellent_ratio: f64,
    pub good_ratio: f64,
    pub average_ratio: f64,
    pub excellent_multiplier: f64,
    pub good_multiplier: f64,
    pub average_multiplier: f64,
    pub weak_multiplier: f64,
    pub confidence_cap: f64,
    /// Drop raw matches below this base confidence
    pub min_strength: Option<f64>,
    pub validate_data: bool,
}

impl Default for CandlestickConfig {
    fn default() -> Self {
        Self {
            min_candles: 3,
            trend_period: Period::new_const(14),
            candle_period: Period::new_const(10),
            volume_period: Period::new_const(20),
            excellent_ratio: 2.0,
            good_ratio: 1.5,
            average_ratio: 1.0,
            excellent_multiplier: 1.30,
            good_multiplier: 1.15,
            average_multiplier: 1.00,
            weak_multiplier: 0.70,
            confidence_cap: 0.95,
            min_strength: None,
            validate_data: true,
        }
    }
}

impl CandlestickConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_candles == 0 {
            return Err(PatternError::InvalidConfig("min_candles must be > 0".into()));
        }
        if !(self.average_ratio <= self.good_ratio && self.good_ratio <= self.excellent_ratio) {
            return Err(PatternError::InvalidConfig(
                "volume band ratios must be ascending".into(),
            ));
        }
        let multipliers = [
            self.excellent_multiplier,
            self.good_multiplier,
            self.average_multiplier,
            self.weak_multiplier,
        ];
        if multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(PatternError::InvalidConfig(
                "volume multipliers must be positive".into(),
            ));
        }
        check_unit("confidence_cap", self.confidence_cap)?;
        if let Some(min) = self.min_strength {
            check_unit("min_strength", min)?;
        }
        Ok(())
    }
}

// ============================================================
// FUSION
// ============================================================

/// Cross-timeframe confidence fusion constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Relative boost per confirming level above 1
    pub boost_per_timeframe: f64,
    pub cap: f64,
    pub max_level: u8,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            boost_per_timeframe: 0.15,
            cap: 0.95,
            max_level: 3,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("boost_per_timeframe", self.boost_per_timeframe)?;
        check_unit("cap", self.cap)?;
        if self.max_level == 0 {
            return Err(PatternError::InvalidConfig("max_level must be > 0".into()));
        }
        Ok(())
    }
}
