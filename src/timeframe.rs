//! Timeframe definitions and calendar bucket alignment.
//!
//! The set of timeframes is closed. Variants are declared shortest first, so
//! the derived `Ord` follows duration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::PatternError;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Candle timeframe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1mo")]
    Mo1,
}

impl Timeframe {
    /// Every timeframe, ascending.
    pub const ALL: [Timeframe; 10] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    /// Nominal length in seconds. A month counts as 30 days.
    pub fn as_secs(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H2 => 2 * 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => SECS_PER_DAY,
            Timeframe::W1 => 7 * SECS_PER_DAY,
            Timeframe::Mo1 => 30 * SECS_PER_DAY,
        }
    }

    /// Nominal duration. Exact for fixed spans, approximate for `1mo`.
    pub fn duration(self) -> TimeDelta {
        TimeDelta::seconds(self.as_secs())
    }

    pub fn code(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1mo",
        }
    }

    fn position(self) -> usize {
        self as usize
    }

    /// One step down, `None` for `1m`.
    pub fn lower(self) -> Option<Timeframe> {
        self.position()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// One step up, `None` for `1mo`.
    pub fn higher(self) -> Option<Timeframe> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Adjacent timeframes that exist, lower first.
    pub fn neighbors(self) -> Vec<Timeframe> {
        self.lower().into_iter().chain(self.higher()).collect()
    }

    /// Weeks and months are calendar units rather than fixed spans.
    pub fn is_calendar(self) -> bool {
        matches!(self, Timeframe::W1 | Timeframe::Mo1)
    }

    /// Whether candles of `base` can be rolled up into `self`.
    ///
    /// Fixed-length targets need an integral duration ratio. Calendar targets
    /// accept any base up to one day.
    pub fn is_multiple_of(self, base: Timeframe) -> bool {
        if self == base {
            return true;
        }
        if self < base || base.is_calendar() {
            return false;
        }
        if self.is_calendar() {
            return base <= Timeframe::D1;
        }
        self.as_secs() % base.as_secs() == 0
    }

    /// Nominal number of `base` candles per `self` candle.
    pub fn ratio_to(self, base: Timeframe) -> usize {
        (self.as_secs() / base.as_secs()).max(1) as usize
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Intraday buckets are counted from midnight UTC and `1d` starts at
    /// midnight. `1w` and `1mo` are stamped with the calendar start (Monday
    /// midnight, the first of the month), not with the first traded bar, so a
    /// week whose first candle is a Wednesday still carries Monday's date.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::W1 => {
                let back = Days::new(u64::from(ts.weekday().num_days_from_monday()));
                let monday = ts.date_naive().checked_sub_days(back).unwrap_or(ts.date_naive());
                midnight(monday)
            }
            Timeframe::Mo1 => {
                let first = NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
                    .unwrap_or(ts.date_naive());
                midnight(first)
            }
            _ => {
                let secs = ts.timestamp();
                let step = self.as_secs();
                DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(ts)
            }
        }
    }

    /// Exclusive end of the bucket containing `ts`, i.e. the start of the
    /// next one. Months roll over on the calendar.
    pub fn bucket_end(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.bucket_start(ts);
        let next = match self {
            Timeframe::Mo1 => {
                let (year, month) = match start.month() {
                    12 => (start.year() + 1, 1),
                    m => (start.year(), m + 1),
                };
                NaiveDate::from_ymd_opt(year, month, 1).map(midnight)
            }
            _ => start.checked_add_signed(self.duration()),
        };
        next.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether `ts` sits exactly on a bucket boundary.
    pub fn is_aligned(self, ts: DateTime<Utc>) -> bool {
        self.bucket_start(ts) == ts
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Timeframe {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.code() == s)
            .ok_or_else(|| PatternError::InvalidTimeframe(format!("unknown code '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_order_follows_duration() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].as_secs() < pair[1].as_secs());
        }
    }

    #[test]
    fn test_neighbors() {
        assert_eq!(Timeframe::H4.neighbors(), vec![Timeframe::H2, Timeframe::D1]);
        assert_eq!(Timeframe::M1.neighbors(), vec![Timeframe::M5]);
        assert_eq!(Timeframe::Mo1.neighbors(), vec![Timeframe::W1]);
    }

    #[test]
    fn test_codes_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.code().parse::<Timeframe>().unwrap(), tf);
            let json = serde_json::to_string(&tf).unwrap();
            assert_eq!(json, format!("\"{}\"", tf.code()));
        }
        assert!(matches!(
            "3h".parse::<Timeframe>(),
            Err(PatternError::InvalidTimeframe(_))
        ));
    }

    #[test]
    fn test_is_multiple_of() {
        assert!(Timeframe::H4.is_multiple_of(Timeframe::H1));
        assert!(Timeframe::D1.is_multiple_of(Timeframe::M15));
        assert!(Timeframe::W1.is_multiple_of(Timeframe::D1));
        assert!(Timeframe::Mo1.is_multiple_of(Timeframe::H1));
        assert!(!Timeframe::Mo1.is_multiple_of(Timeframe::W1));
        assert!(!Timeframe::H1.is_multiple_of(Timeframe::H4));
    }

    #[test]
    fn test_bucket_start() {
        // 2024-01-03 is a Wednesday
        let ts = Utc.with_ymd_and_hms(2024, 1, 3, 13, 47, 0).unwrap();
        assert_eq!(
            Timeframe::H4.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::M15.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 1, 3, 13, 45, 0).unwrap()
        );
        assert_eq!(
            Timeframe::D1.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::W1.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::Mo1.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(Timeframe::H1.is_aligned(Utc.with_ymd_and_hms(2024, 1, 3, 13, 0, 0).unwrap()));
        assert!(!Timeframe::H1.is_aligned(ts));
    }

    #[test]
    fn test_bucket_end() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 3, 13, 47, 0).unwrap();
        assert_eq!(
            Timeframe::H4.bucket_end(ts),
            Utc.with_ymd_and_hms(2024, 1, 3, 16, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::D1.bucket_end(ts),
            Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::W1.bucket_end(ts),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );
        // Leap February and the year rollover
        let feb = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(
            Timeframe::Mo1.bucket_end(feb),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        let dec = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            Timeframe::Mo1.bucket_end(dec),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
