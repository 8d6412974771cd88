//! Calendar-aligned roll-up of base candles into a higher timeframe.

use tracing::debug;

use crate::{
    candle::{AggregatedCandle, Candle},
    timeframe::Timeframe,
    OHLCVExt, PatternError, Result,
};

/// Aggregate `base` candles of `base_tf` into `target` candles.
///
/// Input must be strictly ascending, aligned to `base_tf` boundaries and carry
/// sane OHLC values; anything else is rejected, never repaired. Gaps of whole
/// base bars (sessions, weekends, holidays) are legal.
///
/// Only the last bucket may come out incomplete: it is compared with the
/// largest earlier bucket, or with the nominal `target / base` ratio when it is
/// the only bucket.
pub fn aggregate(
    base: &[Candle],
    base_tf: Timeframe,
    target: Timeframe,
) -> Result<Vec<AggregatedCandle>> {
    if target < base_tf {
        return Err(PatternError::InvalidTimeframe(format!(
            "cannot derive {target} from coarser {base_tf}"
        )));
    }
    if !target.is_multiple_of(base_tf) {
        return Err(PatternError::InvalidTimeframe(format!(
            "{target} is not a multiple of {base_tf}"
        )));
    }
    if base.is_empty() {
        return Err(PatternError::InsufficientData { need: 1, got: 0 });
    }

    validate_sequence(base, base_tf)?;

    if target == base_tf {
        return Ok(base
            .iter()
            .map(|&candle| AggregatedCandle {
                candle,
                base_count: 1,
                complete: true,
            })
            .collect());
    }

    let mut out = Vec::with_capacity(base.len() / target.ratio_to(base_tf) + 1);
    let mut current: Option<AggregatedCandle> = None;

    for candle in base {
        let bucket = target.bucket_start(candle.timestamp);
        if let Some(agg) = current.as_mut().filter(|a| a.candle.timestamp == bucket) {
            agg.candle.high = agg.candle.high.max(candle.high);
            agg.candle.low = agg.candle.low.min(candle.low);
            agg.candle.close = candle.close;
            agg.candle.volume += candle.volume;
            agg.base_count += 1;
            continue;
        }
        let opened = AggregatedCandle {
            candle: Candle {
                timestamp: bucket,
                ..*candle
            },
            base_count: 1,
            complete: true,
        };
        if let Some(done) = current.replace(opened) {
            out.push(done);
        }
    }
    if let Some(done) = current {
        out.push(done);
    }

    if let Some((last, earlier)) = out.split_last_mut() {
        let expected = earlier
            .iter()
            .map(|a| a.base_count)
            .max()
            .unwrap_or_else(|| target.ratio_to(base_tf));
        last.complete = last.base_count >= expected;
    }

    debug!(
        base = base.len(),
        buckets = out.len(),
        %base_tf,
        %target,
        "aggregated candles"
    );
    Ok(out)
}

fn validate_sequence(base: &[Candle], base_tf: Timeframe) -> Result<()> {
    for (index, candle) in base.iter().enumerate() {
        if index > 0 && candle.timestamp <= base[index - 1].timestamp {
            return Err(PatternError::MalformedSequence {
                index,
                reason: "timestamps not strictly increasing",
            });
        }
        if !base_tf.is_aligned(candle.timestamp) {
            return Err(PatternError::MalformedSequence {
                index,
                reason: "timestamp off the base timeframe grid",
            });
        }
        if let Err(PatternError::InvalidOHLCV { reason, .. }) = candle.validate() {
            return Err(PatternError::MalformedSequence { index, reason });
        }
    }
    Ok(())
}

/// Drop a trailing incomplete bucket.
pub fn complete_only(candles: &[AggregatedCandle]) -> &[AggregatedCandle] {
    match candles.split_last() {
        Some((last, rest)) if !last.complete => rest,
        _ => candles,
    }
}

/// Strip aggregation metadata.
pub fn into_candles(candles: &[AggregatedCandle]) -> Vec<Candle> {
    candles.iter().map(|a| a.candle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn hourly(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let p = 50.0 + i as f64;
                Candle::new(
                    start + TimeDelta::hours(i as i64),
                    p,
                    p + 2.0,
                    p - 1.0,
                    p + 1.0,
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_four_hour_buckets() {
        let out = aggregate(&hourly(10), Timeframe::H1, Timeframe::H4).unwrap();
        assert_eq!(out.len(), 3);
        let first = out[0].candle;
        assert_eq!(first.open, 50.0);
        assert_eq!(first.close, 54.0);
        assert_eq!(first.high, 55.0);
        assert_eq!(first.low, 49.0);
        assert_eq!(first.volume, 40.0);
        assert!(out[0].complete && out[1].complete);
        assert_eq!(out[2].base_count, 2);
        assert!(!out[2].complete);
        assert_eq!(complete_only(&out).len(), 2);
    }

    #[test]
    fn test_identity() {
        let base = hourly(5);
        let out = aggregate(&base, Timeframe::H1, Timeframe::H1).unwrap();
        assert_eq!(into_candles(&out), base);
        assert!(out.iter().all(|a| a.complete));
    }

    #[test]
    fn test_single_partial_bucket_uses_nominal_ratio() {
        let out = aggregate(&hourly(3), Timeframe::H1, Timeframe::H4).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].complete);
    }

    #[test]
    fn test_rejects_downsampling_and_empty() {
        assert!(matches!(
            aggregate(&hourly(4), Timeframe::H1, Timeframe::M15),
            Err(PatternError::InvalidTimeframe(_))
        ));
        assert!(matches!(
            aggregate(&[], Timeframe::H1, Timeframe::D1),
            Err(PatternError::InsufficientData { need: 1, got: 0 })
        ));
    }

    #[test]
    fn test_rejects_malformed_sequence() {
        let mut dup = hourly(4);
        dup[2].timestamp = dup[1].timestamp;
        assert!(matches!(
            aggregate(&dup, Timeframe::H1, Timeframe::H4),
            Err(PatternError::MalformedSequence { index: 2, .. })
        ));

        let mut skewed = hourly(4);
        skewed[3].timestamp += TimeDelta::minutes(30);
        assert!(matches!(
            aggregate(&skewed, Timeframe::H1, Timeframe::H4),
            Err(PatternError::MalformedSequence { index: 3, .. })
        ));

        let mut broken = hourly(4);
        broken[1].high = broken[1].low - 1.0;
        assert!(matches!(
            aggregate(&broken, Timeframe::H1, Timeframe::H4),
            Err(PatternError::MalformedSequence { index: 1, .. })
        ));
    }

    #[test]
    fn test_session_gaps_are_legal() {
        let mut base = hourly(8);
        for c in base.iter_mut().skip(4) {
            c.timestamp += TimeDelta::hours(24);
        }
        let out = aggregate(&base, Timeframe::H1, Timeframe::D1).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[1].complete);
    }
}
