//! Tunable parameter metadata
//!
//! Candlestick detectors and the geometric tolerances describe their knobs with
//! [`ParamMeta`], so callers can sweep them in a grid search or validate user
//! overrides before building a scanner.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use mtfpd::prelude::*;
//!
//! for param in HammerDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("shadow_factor", 3.0);
//! let hammer = HammerDetector::with_params(&overrides).unwrap();
//! assert_eq!(hammer.shadow_factor, 3.0);
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Kind of value a parameter holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fractional value; multipliers such as `shadow_factor` may exceed 1.0
  Ratio,
  /// Whole number of candles
  Period,
}

/// Description of one tunable parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Search space: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Every value of the search space, min to max inclusive.
  ///
  /// Values are computed as `min + k * step` so long grids do not drift.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|k| min + k as f64 * step).collect()
  }

  /// Check that `value` lies in the search space and fits the type.
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if !(min..=max).contains(&value) {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    if self.param_type == ParamType::Period && value.fract() != 0.0 {
      return Err(PatternError::InvalidValue("Period must be a whole number of candles"));
    }
    Ok(())
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Detector that can be rebuilt from a parameter map
pub trait ParameterizedDetector: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Missing keys fall back to the defaults.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Display name of the formation the detector reports
  fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(params.get(key).copied().unwrap_or(default))
}

pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a whole number of candles"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generate_grid_is_inclusive() {
    let meta = ParamMeta::ratio("tol", 0.01, (0.005, 0.03, 0.005), "tolerance");
    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 6);
    assert!((grid[0] - 0.005).abs() < 1e-12);
    assert!((grid[5] - 0.03).abs() < 1e-12);
  }

  #[test]
  fn test_validate_period_rejects_fractions() {
    let meta = ParamMeta::period("window", 3.0, (2.0, 6.0, 1.0), "window");
    assert!(meta.validate(4.0).is_ok());
    assert!(meta.validate(4.5).is_err());
    assert!(meta.validate(7.0).is_err());
  }

  #[test]
  fn test_value_helpers() {
    let mut params = HashMap::new();
    params.insert("ratio", 0.8);
    params.insert("window", 20.0);

    assert_eq!(get_ratio(&params, "ratio", 0.5).unwrap().get(), 0.8);
    assert_eq!(get_ratio(&params, "missing", 0.5).unwrap().get(), 0.5);
    assert_eq!(get_period(&params, "window", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "missing", 14).unwrap().get(), 14);

    params.insert("ratio", 1.5);
    assert!(get_ratio(&params, "ratio", 0.5).is_err());
  }
}
