//! Candlestick formation detectors
//!
//! # Formation Categories
//!
//! - **Single-bar (16)**: Doji variants, Hammer family, Marubozu, Belt Hold, etc.
//! - **Two-bar (16)**: Engulfing, Harami, Piercing Line, Tweezers, Kicking, etc.
//! - **Three-bar (11)**: Morning/Evening Star, Soldiers/Crows, Three Inside/Outside, etc.
//!
//! Every detector reports its fixed base confidence as `PatternMatch::strength`;
//! volume confirmation happens later in the scanner.

use crate::{PatternError, Result};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

pub use helpers::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;

/// Base confidences must be usable probabilities.
pub(crate) fn validate_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(PatternError::OutOfRange {
            field: "confidence",
            value: confidence,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}
