// ⏱️ Interval - One time slot of the sharing group
//
// Holds one Measurement per producer and per consumer, index-aligned with the
// EAN lists of the owning CsvDocument, plus the warnings recorded while the
// row was reconciled.

use super::Measurement;
use crate::data_quality::DataWarning;
use crate::error::{EdcError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Local wall-clock start of the slot
    pub start: NaiveDateTime,

    /// Energy given away by producers (before any correction)
    pub sum_sharing: f64,

    /// Energy that could have been shared but was not
    pub sum_missed: f64,

    /// Total production before sharing
    pub sum_production: f64,

    pub producers: Vec<Measurement>,
    pub consumers: Vec<Measurement>,
    pub warnings: Vec<DataWarning>,
}

impl Interval {
    /// Fold `other` into this bucket.
    ///
    /// Aggregates and measurements are summed, warnings are appended.
    /// Fails without touching `self` if the measurement vectors do not line up.
    pub fn accumulate(&mut self, other: &Interval) -> Result<()> {
        if self.producers.len() != other.producers.len()
            || self.consumers.len() != other.consumers.len()
        {
            return Err(EdcError::MisalignedInterval(format!(
                "{} has {}/{} measurements, {} has {}/{}",
                self.start,
                self.producers.len(),
                self.consumers.len(),
                other.start,
                other.producers.len(),
                other.consumers.len()
            )));
        }

        self.sum_sharing += other.sum_sharing;
        self.sum_missed += other.sum_missed;
        self.sum_production += other.sum_production;

        for (mine, theirs) in self.producers.iter_mut().zip(&other.producers) {
            *mine += *theirs;
        }
        for (mine, theirs) in self.consumers.iter_mut().zip(&other.consumers) {
            *mine += *theirs;
        }

        self.warnings.extend(other.warnings.iter().cloned());
        Ok(())
    }

    /// Combine two slots into a new bucket starting at `self.start`
    pub fn merged_with(&self, other: &Interval) -> Result<Interval> {
        let mut merged = self.clone();
        merged.accumulate(other)?;
        Ok(merged)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_quality::WarningKind;
    use chrono::NaiveDate;

    fn slot(minute: u32, before: f64) -> Interval {
        Interval {
            start: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            sum_sharing: 0.5,
            sum_missed: 0.1,
            sum_production: before,
            producers: vec![Measurement::new(before, before - 0.5, 0.1)],
            consumers: vec![Measurement::new(0.5, 0.0, 0.0)],
            warnings: vec![],
        }
    }

    #[test]
    fn test_merge_sums_everything() {
        let mut a = slot(0, 1.0);
        a.warnings
            .push(DataWarning::new(WarningKind::NegativeValue, Some("1"), "first"));
        let b = slot(15, 2.0);

        let merged = a.merged_with(&b).unwrap();

        assert_eq!(merged.start, a.start);
        assert_eq!(merged.sum_production, 3.0);
        assert_eq!(merged.sum_sharing, 1.0);
        assert_eq!(merged.producers[0].before, 3.0);
        assert_eq!(merged.consumers[0].before, 1.0);
        assert_eq!(merged.warnings.len(), 1);

        // Inputs are untouched
        assert_eq!(a.sum_production, 1.0);
        assert_eq!(b.producers[0].before, 2.0);
    }

    #[test]
    fn test_merge_rejects_misaligned() {
        let a = slot(0, 1.0);
        let mut b = slot(15, 1.0);
        b.consumers.push(Measurement::default());

        assert!(matches!(
            a.merged_with(&b),
            Err(EdcError::MisalignedInterval(_))
        ));
    }

    #[test]
    fn test_accumulate_in_place() {
        let mut bucket = slot(0, 1.0);
        let mut other = slot(15, 2.0);
        other
            .warnings
            .push(DataWarning::new(WarningKind::MissingAfterValue, Some("2"), "empty"));

        bucket.accumulate(&other).unwrap();
        bucket.accumulate(&other).unwrap();

        assert_eq!(bucket.sum_production, 5.0);
        assert_eq!(bucket.producers[0].before, 5.0);
        assert_eq!(bucket.consumers[0].before, 1.5);
        assert_eq!(bucket.warnings.len(), 2);
        assert_eq!(other.warnings.len(), 1);
    }

    #[test]
    fn test_accumulate_misaligned_leaves_bucket() {
        let mut bucket = slot(0, 1.0);
        let before = bucket.clone();
        let mut other = slot(15, 1.0);
        other.producers.push(Measurement::default());

        assert!(bucket.accumulate(&other).is_err());
        assert_eq!(bucket, before);
    }
}
