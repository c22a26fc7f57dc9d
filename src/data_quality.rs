// ✅ Data Quality - Soft warnings recorded while reconciling the export
//
// The EDC export regularly contains values we can fix ourselves: missing
// "after" values in provisional data, sharing that increased a reading,
// negative readings, producer/consumer totals that do not agree. None of these
// abort the import. Each one becomes a DataWarning attached to its Interval so
// reporting can show the user exactly which slots were corrected.

use crate::entities::Interval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

// ============================================================================
// WARNING KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// "before" present, "after" empty - sharing assumed to be zero
    MissingAfterValue,

    /// Sharing increased the reading - after clamped to before
    AfterExceedsBefore,

    /// Producer consumes or consumer produces - clamped to zero
    NegativeValue,

    /// Producer and consumer sharing totals disagree - larger side corrected
    SharingMismatch,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::MissingAfterValue => "missing_after_value",
            WarningKind::AfterExceedsBefore => "after_exceeds_before",
            WarningKind::NegativeValue => "negative_value",
            WarningKind::SharingMismatch => "sharing_mismatch",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DATA WARNING
// ============================================================================

/// Human-readable correction applied to one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataWarning {
    pub kind: WarningKind,

    /// EAN the warning is about (None for interval-wide checks)
    pub ean: Option<String>,

    pub message: String,
}

impl DataWarning {
    pub fn new(kind: WarningKind, ean: Option<&str>, message: impl Into<String>) -> Self {
        DataWarning {
            kind,
            ean: ean.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Log a warning and attach it to the slot being built
pub(crate) fn record_warning(
    warnings: &mut Vec<DataWarning>,
    kind: WarningKind,
    ean: Option<&str>,
    message: String,
) {
    warn!(kind = %kind, ean = ean.unwrap_or("-"), "{}", message);
    warnings.push(DataWarning::new(kind, ean, message));
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// ============================================================================
// WARNING SUMMARY
// ============================================================================

/// Batch view over all warnings of a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarningSummary {
    pub total_intervals: usize,
    pub affected_intervals: usize,
    pub total_warnings: usize,
    pub by_kind: BTreeMap<WarningKind, usize>,
}

impl WarningSummary {
    pub fn from_intervals(intervals: &[Interval]) -> Self {
        let mut summary = WarningSummary {
            total_intervals: intervals.len(),
            ..Default::default()
        };

        for interval in intervals {
            if interval.has_warnings() {
                summary.affected_intervals += 1;
            }
            for warning in &interval.warnings {
                summary.total_warnings += 1;
                *summary.by_kind.entry(warning.kind).or_insert(0) += 1;
            }
        }

        summary
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.total_warnings == 0
    }

    pub fn summary(&self) -> String {
        let kinds = self
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{} intervals: {} with warnings, {} warnings total [{}]",
            self.total_intervals, self.affected_intervals, self.total_warnings, kinds
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Measurement;
    use chrono::NaiveDate;

    fn interval_with(warnings: Vec<DataWarning>) -> Interval {
        Interval {
            start: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            sum_sharing: 0.0,
            sum_missed: 0.0,
            sum_production: 0.0,
            producers: vec![Measurement::default()],
            consumers: vec![Measurement::default()],
            warnings,
        }
    }

    #[test]
    fn test_summary_counts_per_kind() {
        let intervals = vec![
            interval_with(vec![
                DataWarning::new(WarningKind::NegativeValue, Some("A"), "neg"),
                DataWarning::new(WarningKind::SharingMismatch, None, "mismatch"),
            ]),
            interval_with(vec![]),
            interval_with(vec![DataWarning::new(
                WarningKind::NegativeValue,
                Some("B"),
                "neg",
            )]),
        ];

        let summary = WarningSummary::from_intervals(&intervals);

        assert_eq!(summary.total_intervals, 3);
        assert_eq!(summary.affected_intervals, 2);
        assert_eq!(summary.total_warnings, 3);
        assert_eq!(summary.count(WarningKind::NegativeValue), 2);
        assert_eq!(summary.count(WarningKind::MissingAfterValue), 0);
        assert!(!summary.is_clean());
        assert!(summary.summary().contains("negative_value=2"));
    }

    #[test]
    fn test_warning_display() {
        let warning = DataWarning::new(WarningKind::MissingAfterValue, Some("X"), "no after");
        assert_eq!(warning.to_string(), "[missing_after_value] no after");
        assert_eq!(warning.ean.as_deref(), Some("X"));
    }
}
