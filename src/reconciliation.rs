// ⚖️ Reconciliation Engine - Make one interval internally consistent
//
// Every slot must satisfy:
//   producers (before - after) == consumers (before - after)
//
// The EDC export does not always honour that. Per metering point we clamp
// readings that cannot be right, then per slot we cross-check both sides and
// pull the larger one down to the smaller. Finally we attribute "missed"
// energy: surplus left on producers while consumers still drew from the grid.

use crate::data_quality::{record_warning as record, DataWarning, WarningKind};
use crate::entities::{EanSide, Measurement};
use crate::error::{EdcError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// SLOT TOTALS
// ============================================================================

/// Aggregates of one reconciled slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotTotals {
    /// Producer sharing as reported (before any proportional correction)
    pub sum_sharing: f64,

    /// Energy that could have been shared but was not
    pub sum_missed: f64,

    /// Total producer output before sharing
    pub sum_production: f64,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Allowed difference between producer and consumer sharing (kWh)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.0001 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine { tolerance }
    }

    /// Turn one raw before/after pair into a sane Measurement.
    ///
    /// Consumers are flipped to positive consumption first. Sharing that
    /// increased the reading is dropped (after = before) and negative
    /// readings are clamped to zero; both cases leave a warning.
    pub fn sanitize(
        &self,
        side: EanSide,
        ean: &str,
        raw_before: f64,
        raw_after: f64,
        warnings: &mut Vec<DataWarning>,
    ) -> Measurement {
        let (mut before, mut after) = match side {
            EanSide::Producer => (raw_before, raw_after),
            EanSide::Consumer => (-raw_before, -raw_after),
        };

        if after > before {
            let message = match side {
                EanSide::Producer => format!(
                    "Production of {} is HIGHER by {:.3} kWh after sharing. Sharing for this interval is set to 0.",
                    ean,
                    after - before
                ),
                EanSide::Consumer => format!(
                    "Consumption of {} INCREASED by {:.3} kWh after sharing. Sharing for this interval is set to 0.",
                    ean,
                    after - before
                ),
            };
            record(warnings, WarningKind::AfterExceedsBefore, Some(ean), message);
            after = before;
        }

        if before < 0.0 || after < 0.0 {
            let message = match side {
                EanSide::Producer => format!(
                    "Producer {} draws energy from the grid ({} / {} kWh). Values for this interval are set to 0.",
                    ean, before, after
                ),
                EanSide::Consumer => format!(
                    "Consumer {} supplies energy to the grid ({} / {} kWh). Values for this interval are set to 0.",
                    ean, before, after
                ),
            };
            record(warnings, WarningKind::NegativeValue, Some(ean), message);
            before = before.max(0.0);
            after = after.max(0.0);
        }

        Measurement::new(before, after, 0.0)
    }

    /// Cross-check both sides of a slot and attribute missed energy.
    ///
    /// Mutates the `after` and `missed` fields in place; fails when the
    /// numbers are inconsistent beyond repair.
    pub fn reconcile(
        &self,
        line: usize,
        producers: &mut [Measurement],
        consumers: &mut [Measurement],
        warnings: &mut Vec<DataWarning>,
    ) -> Result<SlotTotals> {
        let sum_production: f64 = producers.iter().map(|p| p.before).sum();
        let sum_shared = sum_production - sum_after(producers);
        if sum_shared < 0.0 {
            return Err(EdcError::NegativeSharing {
                line,
                shared: sum_shared,
            });
        }

        let sum_shared_consumers = consumers.iter().map(|c| c.before).sum::<f64>() - sum_after(consumers);

        if (sum_shared - sum_shared_consumers).abs() > self.tolerance {
            record(
                warnings,
                WarningKind::SharingMismatch,
                None,
                format!(
                    "Energy shared by producers ({:.2} kWh) does not match energy shared to consumers ({:.2} kWh). The lower value is used.",
                    sum_shared, sum_shared_consumers
                ),
            );

            if sum_shared > sum_shared_consumers {
                let factor = correction_factor(sum_shared_consumers, sum_shared, line)?;
                for producer in producers.iter_mut() {
                    producer.after *= factor;
                }
            } else {
                // NOTE: kept compatible with the EDC numbers we have seen; an
                // alternative spreading the shortfall by consumption is still open.
                let factor = correction_factor(sum_shared, sum_shared_consumers, line)?;
                for consumer in consumers.iter_mut() {
                    consumer.after *= factor;
                }
            }
        }

        // Surplus left on a producer while some consumer still drew from the
        // grid is energy the allocation keys failed to share.
        let mut sum_missed = 0.0;
        let residual_consumers = sum_after(consumers);
        let residual_producers = sum_after(producers);

        if any_positive_after(producers) && any_positive_after(consumers) {
            sum_missed = residual_consumers.min(residual_producers);

            for consumer in consumers.iter_mut() {
                consumer.missed = share_of(consumer.after, residual_consumers, sum_missed);
            }
            for producer in producers.iter_mut() {
                producer.missed += share_of(producer.after, residual_producers, sum_missed);
            }
        }

        Ok(SlotTotals {
            sum_sharing: sum_shared,
            sum_missed,
            sum_production,
        })
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn sum_after(measurements: &[Measurement]) -> f64 {
    measurements.iter().map(|m| m.after).sum()
}

fn any_positive_after(measurements: &[Measurement]) -> bool {
    measurements.iter().any(|m| m.after > 0.0)
}

/// `smaller / larger`, which must land in [0, 1]
fn correction_factor(smaller: f64, larger: f64, line: usize) -> Result<f64> {
    let factor = if larger != 0.0 { smaller / larger } else { 0.0 };
    if !(0.0..=1.0).contains(&factor) {
        return Err(EdcError::ReconciliationFactor { line, factor });
    }
    Ok(factor)
}

fn share_of(part: f64, total: f64, amount: f64) -> f64 {
    if total != 0.0 {
        part / total * amount
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sanitize_flips_consumers() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();

        let m = engine.sanitize(EanSide::Consumer, "C1", -0.8, -0.3, &mut warnings);

        assert_eq!(m, Measurement::new(0.8, 0.3, 0.0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sanitize_clamps_after_above_before() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();

        let m = engine.sanitize(EanSide::Producer, "P1", 1.0, 1.2, &mut warnings);

        assert_eq!(m.after, 1.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::AfterExceedsBefore);
        assert_eq!(warnings[0].ean.as_deref(), Some("P1"));
    }

    #[test]
    fn test_sanitize_clamps_negative_consumer() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();

        // Consumer exporting to the grid: raw positive becomes negative after flip
        let m = engine.sanitize(EanSide::Consumer, "C1", 0.4, 0.4, &mut warnings);

        assert_eq!(m, Measurement::new(0.0, 0.0, 0.0));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::NegativeValue);
    }

    #[test]
    fn test_reconcile_consistent_slot() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();
        let mut producers = vec![Measurement::new(1.0, 0.4, 0.0)];
        let mut consumers = vec![
            Measurement::new(0.5, 0.2, 0.0),
            Measurement::new(0.3, 0.0, 0.0),
        ];

        let totals = engine
            .reconcile(1, &mut producers, &mut consumers, &mut warnings)
            .unwrap();

        assert!(warnings.is_empty());
        assert_relative_eq!(totals.sum_sharing, 0.6);
        assert_relative_eq!(totals.sum_production, 1.0);

        // 0.4 left on the producer, 0.2 still drawn by consumer 0
        assert_relative_eq!(totals.sum_missed, 0.2);
        assert_relative_eq!(consumers[0].missed, 0.2);
        assert_eq!(consumers[1].missed, 0.0);
        assert_relative_eq!(producers[0].missed, 0.2);
    }

    #[test]
    fn test_reconcile_scales_producers_down() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();
        let mut producers = vec![Measurement::new(1.0, 0.0, 0.0)];
        let mut consumers = vec![Measurement::new(0.5, 0.0, 0.0)];

        let totals = engine
            .reconcile(1, &mut producers, &mut consumers, &mut warnings)
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::SharingMismatch);
        assert_eq!(totals.sum_sharing, 1.0);
        // factor 0.5 applied to producer "after" (0.0 stays 0.0)
        assert_eq!(producers[0].after, 0.0);
        assert_eq!(totals.sum_missed, 0.0);
    }

    #[test]
    fn test_reconcile_scales_consumers_down() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();
        let mut producers = vec![Measurement::new(1.0, 0.8, 0.0)];
        let mut consumers = vec![
            Measurement::new(0.4, 0.0, 0.0),
            Measurement::new(0.6, 0.4, 0.0),
        ];

        engine
            .reconcile(1, &mut producers, &mut consumers, &mut warnings)
            .unwrap();

        // producers shared 0.2, consumers 0.6 -> consumer "after" scaled by 1/3
        assert_eq!(warnings.len(), 1);
        assert_relative_eq!(consumers[1].after, 0.4 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reconcile_rejects_negative_sharing() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();
        let mut producers = vec![Measurement::new(1.0, 1.5, 0.0)];
        let mut consumers = vec![Measurement::new(0.5, 0.5, 0.0)];

        let err = engine
            .reconcile(12, &mut producers, &mut consumers, &mut warnings)
            .unwrap_err();

        assert!(matches!(err, EdcError::NegativeSharing { line: 12, .. }));
    }

    #[test]
    fn test_no_missed_without_both_sides() {
        let engine = ReconciliationEngine::new();
        let mut warnings = Vec::new();
        let mut producers = vec![Measurement::new(2.0, 1.0, 0.0)];
        let mut consumers = vec![Measurement::new(1.0, 0.0, 0.0)];

        let totals = engine
            .reconcile(1, &mut producers, &mut consumers, &mut warnings)
            .unwrap();

        assert_eq!(totals.sum_missed, 0.0);
        assert_eq!(producers[0].missed, 0.0);
    }

    #[test]
    fn test_correction_factor_bounds() {
        assert_eq!(correction_factor(0.0, 0.0, 1).unwrap(), 0.0);
        assert_eq!(correction_factor(1.0, 2.0, 1).unwrap(), 0.5);
        assert!(correction_factor(3.0, 2.0, 1).is_err());
        assert!(correction_factor(f64::NAN, 2.0, 1).is_err());
    }
}
