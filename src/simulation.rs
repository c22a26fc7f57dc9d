// 🔁 Sharing Simulator - Replay the grid operator's sharing with other keys
//
// The operator splits each 15 minute producer surplus among consumers by
// allocation percentage, in several rounds: every round offers the energy
// left over from the previous one again, with the same percentages. A
// consumer never gets more than it consumed.
//
// All energy is in integer hundredths of a kWh. Rounding the inputs once and
// truncating every offer keeps the result identical to the operator's own
// figures and keeps the optimizer's hot loop free of float drift.

use crate::document::CsvDocument;
use crate::entities::Interval;
use crate::error::{EdcError, Result};
use serde::{Deserialize, Serialize};

/// Energy in hundredths of a kWh
fn to_fixed(kwh: f64) -> i64 {
    (kwh * 100.0).round() as i64
}

fn from_fixed(hundredths: i64) -> f64 {
    hundredths as f64 / 100.0
}

/// Per-consumer outcome of one simulated allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharingSimulationResult {
    /// cost per kWh x shared kWh
    pub profit_per_ean: Vec<f64>,

    /// kWh received by each consumer
    pub sharing_per_ean: Vec<f64>,

    /// kWh received per round, `[round][consumer]`
    pub sharing_per_round_per_ean: Vec<Vec<f64>>,
}

impl SharingSimulationResult {
    pub fn total_profit(&self) -> f64 {
        self.profit_per_ean.iter().sum()
    }

    pub fn total_sharing(&self) -> f64 {
        self.sharing_per_ean.iter().sum()
    }
}

pub struct SharingSimulator {
    consumer_count: usize,

    /// Producer "before" per interval
    surplus: Vec<i64>,

    /// Consumer "before", `consumer_count` entries per interval
    demand: Vec<i64>,
}

impl SharingSimulator {
    /// Build from a document with exactly one producer
    pub fn new(doc: &CsvDocument) -> Result<Self> {
        if doc.producer_eans().len() != 1 {
            return Err(EdcError::Precondition(format!(
                "sharing simulation needs exactly one producer EAN, found {}",
                doc.producer_eans().len()
            )));
        }
        Self::from_intervals(doc.intervals(), doc.consumer_eans().len())
    }

    /// Build from 15 minute intervals with one producer and `consumer_count` consumers
    pub fn from_intervals(intervals: &[Interval], consumer_count: usize) -> Result<Self> {
        if consumer_count == 0 {
            return Err(EdcError::Precondition(
                "sharing simulation needs at least one consumer EAN".to_string(),
            ));
        }

        let mut surplus = Vec::with_capacity(intervals.len());
        let mut demand = Vec::with_capacity(intervals.len() * consumer_count);

        for interval in intervals {
            if interval.producers.len() != 1 || interval.consumers.len() != consumer_count {
                return Err(EdcError::Precondition(format!(
                    "interval {} has {} producers and {} consumers, expected 1 and {}",
                    interval.start,
                    interval.producers.len(),
                    interval.consumers.len(),
                    consumer_count
                )));
            }

            surplus.push(to_fixed(interval.producers[0].before));
            demand.extend(interval.consumers.iter().map(|c| to_fixed(c.before)));
        }

        if let Some(value) = surplus.iter().chain(&demand).find(|v| **v < 0) {
            return Err(EdcError::NegativeFixedPoint(format!(
                "input energy {} hundredths of kWh",
                value
            )));
        }

        Ok(SharingSimulator {
            consumer_count,
            surplus,
            demand,
        })
    }

    pub fn consumer_count(&self) -> usize {
        self.consumer_count
    }

    pub fn interval_count(&self) -> usize {
        self.surplus.len()
    }

    fn check_inputs(&self, allocations: &[f64], costs: &[f64]) -> Result<()> {
        if allocations.len() != self.consumer_count || costs.len() != self.consumer_count {
            return Err(EdcError::Precondition(format!(
                "expected {} allocations and costs, got {} and {}",
                self.consumer_count,
                allocations.len(),
                costs.len()
            )));
        }

        if allocations.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(EdcError::Precondition(format!(
                "allocations must be finite and non-negative: {:?}",
                allocations
            )));
        }

        let total: f64 = allocations.iter().sum();
        if total > 100.0 {
            return Err(EdcError::Precondition(format!(
                "allocations sum to {} %, more than 100 %",
                total
            )));
        }

        Ok(())
    }

    /// Simulate with per-round detail for every consumer
    pub fn simulate(
        &self,
        allocations: &[f64],
        costs: &[f64],
        rounds: usize,
    ) -> Result<SharingSimulationResult> {
        self.check_inputs(allocations, costs)?;

        let n = self.consumer_count;
        let mut per_round = vec![vec![0i64; n]; rounds];
        let mut remaining = vec![0i64; n];

        for (slot, (surplus, demand)) in self
            .surplus
            .iter()
            .zip(self.demand.chunks_exact(n))
            .enumerate()
        {
            let mut to_share = *surplus;
            remaining.copy_from_slice(demand);

            for (round, shared_in_round) in per_round.iter_mut().enumerate() {
                let energy_this_round = to_share;

                for (i, shared_total) in shared_in_round.iter_mut().enumerate() {
                    let offered = (energy_this_round as f64 * (allocations[i] / 100.0)).trunc() as i64;
                    let shared = remaining[i].min(offered);

                    remaining[i] -= shared;
                    to_share -= shared;
                    *shared_total += shared;

                    if shared < 0 || remaining[i] < 0 || to_share < 0 {
                        return Err(EdcError::NegativeFixedPoint(format!(
                            "interval {}, round {}, consumer {}: shared {}, remaining {}, left to share {}",
                            slot, round, i, shared, remaining[i], to_share
                        )));
                    }
                }
            }
        }

        let sharing_per_round_per_ean: Vec<Vec<f64>> = per_round
            .iter()
            .map(|round| round.iter().map(|v| from_fixed(*v)).collect())
            .collect();

        let sharing_per_ean: Vec<f64> = (0..n)
            .map(|i| sharing_per_round_per_ean.iter().map(|round| round[i]).sum())
            .collect();

        let profit_per_ean = sharing_per_ean
            .iter()
            .zip(costs)
            .map(|(shared, cost)| shared * cost)
            .collect();

        Ok(SharingSimulationResult {
            profit_per_ean,
            sharing_per_ean,
            sharing_per_round_per_ean,
        })
    }

    /// Total profit only; one scratch buffer per call
    pub fn simulate_fast(&self, allocations: &[f64], costs: &[f64], rounds: usize) -> Result<f64> {
        self.check_inputs(allocations, costs)?;

        let n = self.consumer_count;
        let mut remaining = vec![0i64; n];
        let mut profit = 0.0;

        for (surplus, demand) in self.surplus.iter().zip(self.demand.chunks_exact(n)) {
            let mut to_share = *surplus;
            remaining.copy_from_slice(demand);

            for _ in 0..rounds {
                let energy_this_round = to_share;

                for i in 0..n {
                    let offered = (energy_this_round as f64 * (allocations[i] / 100.0)).trunc() as i64;
                    let shared = remaining[i].min(offered);

                    remaining[i] -= shared;
                    to_share -= shared;
                    profit += shared as f64 * costs[i];
                }
            }
        }

        Ok(profit / 100.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Ean, Measurement};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn intervals(producer: &[f64], consumers: &[&[f64]]) -> Vec<Interval> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        producer
            .iter()
            .enumerate()
            .map(|(i, &before)| Interval {
                start: start + Duration::minutes(15 * i as i64),
                sum_sharing: 0.0,
                sum_missed: 0.0,
                sum_production: before,
                producers: vec![Measurement::new(before, before, 0.0)],
                consumers: consumers
                    .iter()
                    .map(|c| Measurement::new(c[i], c[i], 0.0))
                    .collect(),
                warnings: vec![],
            })
            .collect()
    }

    #[test]
    fn test_even_split_of_one_kwh() {
        // 4 x 15 min, 1 kWh produced, both consumers want 1 kWh
        let data = intervals(&[1.0; 4], &[&[1.0; 4], &[1.0; 4]]);
        let simulator = SharingSimulator::from_intervals(&data, 2).unwrap();

        let result = simulator.simulate(&[50.0, 50.0], &[1.0, 1.0], 1).unwrap();

        assert_relative_eq!(result.sharing_per_ean[0], 2.0);
        assert_relative_eq!(result.sharing_per_ean[1], 2.0);
        assert_relative_eq!(result.total_profit(), 4.0);
        assert_eq!(result.sharing_per_round_per_ean.len(), 1);
    }

    #[test]
    fn test_demand_caps_even_split() {
        // 1 kWh produced per slot, each consumer only wants 0.5 kWh
        let data = intervals(&[1.0; 4], &[&[0.5; 4], &[0.5; 4]]);
        let costs = [3.0, 2.0];

        // One slot at a time: every consumer gets exactly its demand
        for slot in data.chunks(1) {
            let simulator = SharingSimulator::from_intervals(slot, 2).unwrap();
            let result = simulator.simulate(&[50.0, 50.0], &costs, 1).unwrap();

            assert_relative_eq!(result.sharing_per_ean[0], 0.5);
            assert_relative_eq!(result.sharing_per_ean[1], 0.5);
            assert!(result.total_sharing() <= slot[0].producers[0].before + 1e-9);
        }

        let simulator = SharingSimulator::from_intervals(&data, 2).unwrap();
        let result = simulator.simulate(&[50.0, 50.0], &costs, 1).unwrap();

        assert_relative_eq!(result.sharing_per_ean[0], 2.0);
        assert_relative_eq!(result.sharing_per_ean[1], 2.0);
        assert_relative_eq!(result.profit_per_ean[0], 6.0);
        assert_relative_eq!(result.profit_per_ean[1], 4.0);
        assert_relative_eq!(simulator.simulate_fast(&[50.0, 50.0], &costs, 1).unwrap(), 10.0);
    }

    #[test]
    fn test_later_rounds_share_leftovers() {
        // Consumer 0 only wants 0.2 kWh; round 2 re-offers what it left over
        let data = intervals(&[1.0], &[&[0.2], &[1.0]]);
        let simulator = SharingSimulator::from_intervals(&data, 2).unwrap();

        let result = simulator.simulate(&[50.0, 50.0], &[1.0, 1.0], 2).unwrap();

        // round 1: 0.2 + 0.5, round 2: 0 + trunc(30 * 0.5) = 0.15
        assert_relative_eq!(result.sharing_per_round_per_ean[0][0], 0.2);
        assert_relative_eq!(result.sharing_per_round_per_ean[0][1], 0.5);
        assert_relative_eq!(result.sharing_per_round_per_ean[1][1], 0.15);
        assert_relative_eq!(result.sharing_per_ean[1], 0.65);
    }

    #[test]
    fn test_full_and_fast_agree() {
        let data = intervals(
            &[1.37, 0.0, 2.5, 0.81, 3.3],
            &[&[0.4, 0.2, 1.1, 0.05, 2.0], &[0.9, 0.0, 0.3, 0.6, 0.7], &[0.1, 0.3, 2.2, 0.0, 1.4]],
        );
        let simulator = SharingSimulator::from_intervals(&data, 3).unwrap();
        let costs = [2.5, 1.0, 4.2];

        for allocations in [[33.33, 33.33, 33.33], [10.0, 60.0, 29.99], [0.0, 0.0, 100.0]] {
            for rounds in [1, 3, 5] {
                let full = simulator.simulate(&allocations, &costs, rounds).unwrap();
                let fast = simulator.simulate_fast(&allocations, &costs, rounds).unwrap();
                assert!((full.total_profit() - fast).abs() < 0.01);
            }
        }
    }

    #[test]
    fn test_never_shares_more_than_available() {
        let surplus = [1.37, 0.0, 2.5, 0.81];
        let demand: [&[f64]; 2] = [&[0.4, 0.2, 1.1, 0.05], &[0.9, 0.0, 3.0, 0.6]];
        let data = intervals(&surplus, &demand);
        let simulator = SharingSimulator::from_intervals(&data, 2).unwrap();

        let result = simulator.simulate(&[70.0, 30.0], &[1.0, 1.0], 5).unwrap();

        for (slot, interval) in data.iter().enumerate() {
            let single = SharingSimulator::from_intervals(std::slice::from_ref(interval), 2).unwrap();
            let shared = single.simulate(&[70.0, 30.0], &[1.0, 1.0], 5).unwrap();

            assert!(shared.total_sharing() <= surplus[slot] + 1e-9);
            for (i, amount) in shared.sharing_per_ean.iter().enumerate() {
                assert!(*amount >= 0.0);
                assert!(*amount <= demand[i][slot] + 1e-9);
            }
        }

        for (i, shared) in result.sharing_per_ean.iter().enumerate() {
            let wanted: f64 = demand[i].iter().sum();
            assert!(*shared >= 0.0);
            assert!(*shared <= wanted + 1e-9);
            assert!(result.profit_per_ean[i] >= 0.0);
        }
        assert!(result.total_sharing() <= surplus.iter().sum::<f64>() + 1e-9);
    }

    #[test]
    fn test_preconditions() {
        let data = intervals(&[1.0], &[&[1.0], &[1.0]]);
        let simulator = SharingSimulator::from_intervals(&data, 2).unwrap();

        let bad_inputs: [(&[f64], &[f64]); 5] = [
            (&[50.0], &[1.0, 1.0]),
            (&[50.0, 50.0], &[1.0]),
            (&[60.0, 50.0], &[1.0, 1.0]),
            (&[-1.0, 50.0], &[1.0, 1.0]),
            (&[f64::NAN, 50.0], &[1.0, 1.0]),
        ];
        for (allocations, costs) in bad_inputs {
            assert!(matches!(
                simulator.simulate_fast(allocations, costs, 1),
                Err(EdcError::Precondition(_))
            ));
            assert!(simulator.simulate(allocations, costs, 1).is_err());
        }
    }

    #[test]
    fn test_requires_single_producer() {
        let mut data = intervals(&[1.0], &[&[1.0]]);
        data[0].producers.push(Measurement::default());

        assert!(matches!(
            SharingSimulator::from_intervals(&data, 1),
            Err(EdcError::Precondition(_))
        ));

        let doc = CsvDocument::new(
            "x.csv",
            data,
            vec![Ean::new("P1", 5), Ean::new("P2", 7)],
            vec![Ean::new("C", 3)],
        )
        .unwrap();
        assert!(matches!(SharingSimulator::new(&doc), Err(EdcError::Precondition(_))));
    }
}
