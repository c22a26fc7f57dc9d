// 📅 Interval Grouping - 15 minute slots into hourly/daily/monthly buckets
//
// Single left-to-right scan. A slot joins the current bucket when its hour,
// day or month equals that of the slot before it in the source sequence.
// Buckets are new values; the source slice is never touched.

use crate::entities::Interval;
use crate::error::Result;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grouping {
    #[serde(rename = "15m")]
    QuarterHour,
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1m")]
    Month,
}

impl Grouping {
    pub const ALL: [Grouping; 4] = [
        Grouping::QuarterHour,
        Grouping::Hour,
        Grouping::Day,
        Grouping::Month,
    ];

    /// Short code: `15m`, `1h`, `1d`, `1m`
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::QuarterHour => "15m",
            Grouping::Hour => "1h",
            Grouping::Day => "1d",
            Grouping::Month => "1m",
        }
    }

    /// Name used in statistic entity ids
    pub fn name(&self) -> &'static str {
        match self {
            Grouping::QuarterHour => "fluent",
            Grouping::Hour => "hourly",
            Grouping::Day => "daily",
            Grouping::Month => "monthly",
        }
    }

    fn same_bucket(&self, previous: &NaiveDateTime, current: &NaiveDateTime) -> bool {
        match self {
            Grouping::QuarterHour => false,
            Grouping::Hour => previous.hour() == current.hour(),
            Grouping::Day => previous.day() == current.day(),
            Grouping::Month => previous.month() == current.month(),
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Grouping::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("unknown grouping \"{}\" (expected 15m, 1h, 1d or 1m)", s))
    }
}

/// Merge consecutive intervals that share the grouping's calendar field
pub fn group_intervals(intervals: &[Interval], grouping: Grouping) -> Result<Vec<Interval>> {
    let timer = Instant::now();
    let mut buckets: Vec<Interval> = Vec::new();

    for (i, interval) in intervals.iter().enumerate() {
        let joins_previous =
            i > 0 && grouping.same_bucket(&intervals[i - 1].start, &interval.start);

        match buckets.last_mut() {
            Some(bucket) if joins_previous => bucket.accumulate(interval)?,
            _ => buckets.push(interval.clone()),
        }
    }

    debug!(
        grouping = %grouping,
        input = intervals.len(),
        output = buckets.len(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "grouped intervals"
    );

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_quality::{DataWarning, WarningKind};
    use crate::entities::Measurement;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn slots(from: NaiveDateTime, count: i64) -> Vec<Interval> {
        (0..count)
            .map(|i| {
                let before = 0.1 * (i % 7) as f64;
                Interval {
                    start: from + Duration::minutes(15 * i),
                    sum_sharing: before / 2.0,
                    sum_missed: 0.0,
                    sum_production: before,
                    producers: vec![Measurement::new(before, before / 2.0, 0.0)],
                    consumers: vec![
                        Measurement::new(0.3, 0.1, 0.0),
                        Measurement::new(0.2, 0.2, 0.0),
                    ],
                    warnings: vec![],
                }
            })
            .collect()
    }

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_grouping_codes() {
        for grouping in Grouping::ALL {
            assert_eq!(grouping.as_str().parse::<Grouping>().unwrap(), grouping);
        }
        assert!("2h".parse::<Grouping>().is_err());
        assert_eq!(Grouping::QuarterHour.name(), "fluent");
        assert_eq!(Grouping::Month.to_string(), "1m");
    }

    #[test]
    fn test_before_conserved_by_every_grouping() {
        // Crosses an hour, a day and a month boundary
        let source = slots(at(5, 31, 22, 0), 12 * 4);
        let total = |intervals: &[Interval]| -> (f64, f64) {
            intervals.iter().fold((0.0, 0.0), |(p, c), i| {
                (
                    p + i.producers[0].before,
                    c + i.consumers.iter().map(|m| m.before).sum::<f64>(),
                )
            })
        };
        let (producer_total, consumer_total) = total(&source);

        for grouping in Grouping::ALL {
            let grouped = group_intervals(&source, grouping).unwrap();
            let (p, c) = total(&grouped);
            assert_relative_eq!(p, producer_total, epsilon = 1e-9);
            assert_relative_eq!(c, consumer_total, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        let source = slots(at(5, 31, 22, 0), 12 * 4);

        assert_eq!(group_intervals(&source, Grouping::QuarterHour).unwrap().len(), 48);

        let hourly = group_intervals(&source, Grouping::Hour).unwrap();
        assert_eq!(hourly.len(), 12);
        assert_eq!(hourly[2].start, at(6, 1, 0, 0));

        let daily = group_intervals(&source, Grouping::Day).unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].start, at(5, 31, 22, 0));
        assert_eq!(daily[1].start, at(6, 1, 0, 0));
        assert_relative_eq!(daily[0].consumers[0].before, 0.3 * 8.0, epsilon = 1e-9);

        let monthly = group_intervals(&source, Grouping::Month).unwrap();
        assert_eq!(monthly.len(), 2);
    }

    #[test]
    fn test_source_untouched() {
        let source = slots(at(5, 1, 0, 0), 4);
        let copy = source.clone();

        let grouped = group_intervals(&source, Grouping::Hour).unwrap();

        assert_eq!(grouped.len(), 1);
        assert_eq!(source, copy);
    }

    #[test]
    fn test_warning_heavy_month() {
        // A provisional export: every consumer of every slot lacks its after value
        let mut source = slots(at(5, 1, 0, 0), 31 * 96);
        for interval in &mut source {
            for ean in ["1", "2"] {
                interval.warnings.push(DataWarning::new(
                    WarningKind::MissingAfterValue,
                    Some(ean),
                    "after value missing",
                ));
            }
        }

        let timer = Instant::now();
        let monthly = group_intervals(&source, Grouping::Month).unwrap();

        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].warnings.len(), 31 * 96 * 2);
        assert_eq!(source[0].warnings.len(), 2);
        assert!(timer.elapsed().as_secs() < 5);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_intervals(&[], Grouping::Day).unwrap().is_empty());
    }
}
