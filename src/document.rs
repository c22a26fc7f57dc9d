// 📄 CsvDocument - One parsed EDC export
//
// Owns the fine-grained 15 minute intervals and the two EAN lists. Both lists
// are sorted by EAN name at construction and every interval's measurement
// vectors are permuted the same way, so index i always means the same EAN.

use crate::config::DisplaySettings;
use crate::data_quality::WarningSummary;
use crate::entities::{Ean, Interval, Measurement};
use crate::error::{EdcError, Result};
use crate::grouping::{group_intervals, Grouping};
use crate::summary::Summary;
use crate::temporal::{calendar_days, document_end};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct CsvDocument {
    filename: String,
    date_from: NaiveDateTime,
    date_to: NaiveDateTime,
    producer_eans: Vec<Ean>,
    consumer_eans: Vec<Ean>,
    intervals: Vec<Interval>,
}

impl CsvDocument {
    /// Fold parsed intervals into a document.
    ///
    /// Fails on an empty interval list or when any interval's measurement
    /// vectors do not match the EAN lists.
    pub fn new(
        filename: impl Into<String>,
        mut intervals: Vec<Interval>,
        producer_eans: Vec<Ean>,
        consumer_eans: Vec<Ean>,
    ) -> Result<Self> {
        let (first, last) = match (intervals.first(), intervals.last()) {
            (Some(first), Some(last)) => (first.start, last.start),
            _ => return Err(EdcError::NoIntervals),
        };

        for interval in &intervals {
            if interval.producers.len() != producer_eans.len()
                || interval.consumers.len() != consumer_eans.len()
            {
                return Err(EdcError::MisalignedInterval(format!(
                    "{} has {}/{} measurements for {}/{} EANs",
                    interval.start,
                    interval.producers.len(),
                    interval.consumers.len(),
                    producer_eans.len(),
                    consumer_eans.len()
                )));
            }
        }

        let producer_order = sort_order(&producer_eans);
        let consumer_order = sort_order(&consumer_eans);

        if !is_identity(&producer_order) || !is_identity(&consumer_order) {
            debug!("reordering EAN columns by name");
            for interval in intervals.iter_mut() {
                interval.producers = permute(&interval.producers, &producer_order);
                interval.consumers = permute(&interval.consumers, &consumer_order);
            }
        }

        Ok(CsvDocument {
            filename: filename.into(),
            date_from: first,
            date_to: document_end(&last),
            producer_eans: permute(&producer_eans, &producer_order),
            consumer_eans: permute(&consumer_eans, &consumer_order),
            intervals,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Start of the first interval
    pub fn date_from(&self) -> NaiveDateTime {
        self.date_from
    }

    /// Start of the last interval + 14 minutes
    pub fn date_to(&self) -> NaiveDateTime {
        self.date_to
    }

    pub fn producer_eans(&self) -> &[Ean] {
        &self.producer_eans
    }

    pub fn consumer_eans(&self) -> &[Ean] {
        &self.consumer_eans
    }

    /// 15 minute intervals in source order
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn grouped_intervals(&self, grouping: Grouping) -> Result<Vec<Interval>> {
        group_intervals(&self.intervals, grouping)
    }

    /// Intervals inside the configured day window, then grouped
    pub fn grouped_intervals_in_range(
        &self,
        grouping: Grouping,
        settings: &DisplaySettings,
    ) -> Result<Vec<Interval>> {
        match settings.day_filter_range(self.date_from) {
            Some((from, to)) => {
                let in_range: Vec<Interval> = self
                    .intervals
                    .iter()
                    .filter(|interval| interval.start >= from && interval.start <= to)
                    .cloned()
                    .collect();
                group_intervals(&in_range, grouping)
            }
            None => self.grouped_intervals(grouping),
        }
    }

    pub fn calculate_summary(&self, grouping: Grouping) -> Result<Summary> {
        let grouped = self.grouped_intervals(grouping)?;
        Ok(Summary::from_intervals(
            &grouped,
            self.producer_eans.len(),
            self.consumer_eans.len(),
        ))
    }

    /// Calendar days touched by the document, inclusive
    pub fn num_days(&self) -> i64 {
        calendar_days(&self.date_from, &self.date_to)
    }

    pub fn warning_summary(&self) -> WarningSummary {
        WarningSummary::from_intervals(&self.intervals)
    }

    /// Total of every producer's measurements over the whole document
    pub fn producer_totals(&self) -> Measurement {
        self.intervals
            .iter()
            .flat_map(|interval| interval.producers.iter().copied())
            .fold(Measurement::default(), |acc, m| acc + m)
    }
}

/// Stable permutation that sorts EANs by name
fn sort_order(eans: &[Ean]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..eans.len()).collect();
    order.sort_by(|&a, &b| eans[a].name().cmp(eans[b].name()));
    order
}

fn is_identity(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(i, &j)| i == j)
}

fn permute<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| items[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 31)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap()
    }

    fn interval(offset: i64, consumers: Vec<Measurement>) -> Interval {
        Interval {
            start: start() + Duration::minutes(15 * offset),
            sum_sharing: 0.0,
            sum_missed: 0.0,
            sum_production: 1.0,
            producers: vec![Measurement::new(1.0, 1.0, 0.0)],
            consumers,
            warnings: vec![],
        }
    }

    #[test]
    fn test_eans_sorted_and_measurements_permuted() {
        let intervals = vec![interval(
            0,
            vec![Measurement::new(3.0, 3.0, 0.0), Measurement::new(1.0, 1.0, 0.0)],
        )];
        let consumers = vec![Ean::new("C", 3), Ean::new("A", 5)];

        let doc = CsvDocument::new("x.csv", intervals, vec![Ean::new("P", 7)], consumers).unwrap();

        assert_eq!(doc.consumer_eans()[0].name(), "A");
        assert_eq!(doc.consumer_eans()[1].name(), "C");
        assert_eq!(doc.intervals()[0].consumers[0].before, 1.0);
        assert_eq!(doc.intervals()[0].consumers[1].before, 3.0);
    }

    #[test]
    fn test_empty_document_rejected() {
        let err = CsvDocument::new("x.csv", vec![], vec![], vec![]).unwrap_err();
        assert_eq!(err, EdcError::NoIntervals);
    }

    #[test]
    fn test_misaligned_interval_rejected() {
        let intervals = vec![interval(0, vec![Measurement::default()])];
        let err = CsvDocument::new("x.csv", intervals, vec![Ean::new("P", 3)], vec![]).unwrap_err();
        assert!(matches!(err, EdcError::MisalignedInterval(_)));
    }

    #[test]
    fn test_bounds_and_num_days() {
        // 23:30, 23:45, 00:00 -> spans two calendar days
        let intervals = (0..3)
            .map(|i| interval(i, vec![Measurement::default()]))
            .collect();
        let doc = CsvDocument::new("x.csv", intervals, vec![Ean::new("P", 5)], vec![Ean::new("C", 3)])
            .unwrap();

        assert_eq!(doc.date_from(), start());
        assert_eq!(doc.date_to(), start() + Duration::minutes(30 + 14));
        assert_eq!(doc.num_days(), 2);
        assert_eq!(doc.producer_totals().before, 3.0);
    }
}
