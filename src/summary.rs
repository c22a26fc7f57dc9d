// 📊 Summary - Per-EAN balances over a whole document
//
// original = sum of "before", adjusted = sum of "after", missed = energy the
// allocation keys failed to share. Shared energy is original - adjusted.

use crate::config::DisplaySettings;
use crate::entities::{Ean, EanSide, Interval, Measurement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EanStats {
    pub original_balance: f64,
    pub adjusted_balance: f64,
    pub missed_due_to_allocation: f64,
}

impl EanStats {
    pub fn shared(&self) -> f64 {
        self.original_balance - self.adjusted_balance
    }

    fn accumulate(&mut self, measurement: &Measurement) {
        self.original_balance += measurement.before;
        self.adjusted_balance += measurement.after;
        self.missed_due_to_allocation += measurement.missed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub producer_stats: Vec<EanStats>,
    pub consumer_stats: Vec<EanStats>,
}

impl Summary {
    pub fn from_intervals(intervals: &[Interval], producers: usize, consumers: usize) -> Self {
        let mut summary = Summary {
            producer_stats: vec![EanStats::default(); producers],
            consumer_stats: vec![EanStats::default(); consumers],
        };

        for interval in intervals {
            for (stats, m) in summary.producer_stats.iter_mut().zip(&interval.producers) {
                stats.accumulate(m);
            }
            for (stats, m) in summary.consumer_stats.iter_mut().zip(&interval.consumers) {
                stats.accumulate(m);
            }
        }

        summary
    }

    pub fn total_shared(&self) -> f64 {
        self.producer_stats.iter().map(EanStats::shared).sum()
    }

    pub fn total_missed(&self) -> f64 {
        self.consumer_stats.iter().map(|s| s.missed_due_to_allocation).sum()
    }

    /// Visible rows for reporting, producers first
    pub fn rows(
        &self,
        producer_eans: &[Ean],
        consumer_eans: &[Ean],
        settings: &DisplaySettings,
    ) -> Vec<SummaryRow> {
        let producers = producer_eans
            .iter()
            .zip(&self.producer_stats)
            .map(|(ean, stats)| (EanSide::Producer, ean, stats));
        let consumers = consumer_eans
            .iter()
            .zip(&self.consumer_stats)
            .map(|(ean, stats)| (EanSide::Consumer, ean, stats));

        producers
            .chain(consumers)
            .filter(|(_, ean, _)| !settings.is_hidden(ean.name()))
            .map(|(side, ean, stats)| SummaryRow {
                label: settings.ean_label(ean.name()),
                side,
                stats: *stats,
            })
            .collect()
    }
}

/// One labelled line of a rendered summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub side: EanSide,
    pub stats: EanStats,
}
