// 🎯 Allocation Optimizer - Search allocation keys that maximize profit
//
// Random-restart local search over the fixed-point simulator:
// 1. Start from random weights summing to 99.99 %
// 2. Nudge one consumer up (others down) and keep the change if profit grows
// 3. Stop after `max_fails` non-improving steps in a row
// 4. Repeat from a new random start, keep the best
//
// Weights are kept at two decimals, the precision the operator accepts.

use crate::config::load_json;
use crate::error::{EdcError, Result};
use crate::simulation::SharingSimulator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Target sum of all weights
pub const WEIGHT_TOTAL: f64 = 99.99;

/// Standard deviation of the random step size (percentage points)
const STEP_STD_DEV: f64 = 5.0;

/// Probe size of the gradient strategy (percentage points)
const GRADIENT_STEP: f64 = 1.0;

/// Full and fast simulation must agree within this many currency units
const CROSS_CHECK_TOLERANCE: f64 = 0.01;

/// Truncate to two decimals
pub fn trunc2(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptimizationAlgorithm {
    #[default]
    Random,
    GradientDescend,
}

impl fmt::Display for OptimizationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationAlgorithm::Random => f.write_str("random"),
            OptimizationAlgorithm::GradientDescend => f.write_str("gradientDescend"),
        }
    }
}

impl FromStr for OptimizationAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(OptimizationAlgorithm::Random),
            "gradientDescend" | "gradient-descend" => Ok(OptimizationAlgorithm::GradientDescend),
            other => Err(format!(
                "unknown algorithm \"{}\" (expected random or gradientDescend)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Sharing rounds the operator runs per interval
    pub sharing_rounds: usize,

    /// Value of one shared kWh, per consumer
    pub costs_per_kwh: Vec<f64>,

    pub algorithm: OptimizationAlgorithm,

    /// Non-improving steps in a row that end one attempt
    pub max_fails: usize,

    /// Independent random starts
    pub restarts: usize,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            sharing_rounds: 5,
            costs_per_kwh: Vec::new(),
            algorithm: OptimizationAlgorithm::Random,
            max_fails: 100,
            restarts: 10,
            seed: None,
        }
    }
}

impl OptimizerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        load_json(path.as_ref(), "optimizer config")
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedAllocation {
    /// Allocation percentage per consumer
    pub weights: Vec<f64>,

    /// kWh shared to each consumer with these weights
    pub sharing: Vec<f64>,

    /// Profit per consumer with these weights
    pub profit: Vec<f64>,
}

impl OptimizedAllocation {
    pub fn total_profit(&self) -> f64 {
        self.profit.iter().sum()
    }

    pub fn total_sharing(&self) -> f64 {
        self.sharing.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationOutcome {
    pub best: OptimizedAllocation,

    /// Attempts actually run
    pub attempts: usize,

    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

// ============================================================================
// CANCELLATION & PROGRESS
// ============================================================================

/// Shared flag checked between optimization attempts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives the best allocation so far after every attempt (1-based index)
pub trait ProgressHook {
    fn on_attempt(&mut self, best: &OptimizedAllocation, attempt: usize);
}

impl<F> ProgressHook for F
where
    F: FnMut(&OptimizedAllocation, usize),
{
    fn on_attempt(&mut self, best: &OptimizedAllocation, attempt: usize) {
        self(best, attempt)
    }
}

/// Progress hook that ignores every update
pub struct NoProgress;

impl ProgressHook for NoProgress {
    fn on_attempt(&mut self, _best: &OptimizedAllocation, _attempt: usize) {}
}

// ============================================================================
// WEIGHT STEP
// ============================================================================

/// Move `amount` percentage points to consumer `index`, taken evenly from the others.
///
/// Others never go below zero; if they cannot give anything the weights are
/// returned unchanged. The result is renormalized to sum to 99.99.
pub fn bump_consumer(weights: &[f64], index: usize, amount: f64) -> Vec<f64> {
    let mut result = weights.to_vec();
    let n = weights.len();

    let up = amount.min(100.0 - weights[index]);
    let down_each = if n > 1 { up / (n - 1) as f64 } else { 0.0 };

    let eligible_down: f64 = weights
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != index)
        .map(|(_, w)| down_each.min(*w))
        .sum();

    let change = up.min(eligible_down);
    if change > 0.0 {
        result[index] = trunc2(result[index] + change);
        for (j, weight) in result.iter_mut().enumerate() {
            if j != index {
                *weight = trunc2(*weight - down_each).max(0.0);
            }
        }

        let total: f64 = result.iter().sum();
        result[index] = trunc2(result[index] + WEIGHT_TOTAL - total);
    }

    result
}

// ============================================================================
// ALLOCATION OPTIMIZER
// ============================================================================

pub struct AllocationOptimizer<'a> {
    simulator: &'a SharingSimulator,
    config: OptimizerConfig,
    rng: StdRng,
    step: Normal<f64>,
}

impl<'a> AllocationOptimizer<'a> {
    pub fn new(simulator: &'a SharingSimulator, config: OptimizerConfig) -> Result<Self> {
        if config.costs_per_kwh.len() != simulator.consumer_count() {
            return Err(EdcError::Precondition(format!(
                "expected {} costs per kWh, got {}",
                simulator.consumer_count(),
                config.costs_per_kwh.len()
            )));
        }

        if config.algorithm == OptimizationAlgorithm::GradientDescend {
            warn!("gradientDescend re-evaluates the unmodified weights and will not improve on the random start");
        }

        let step = Normal::new(0.0, STEP_STD_DEV).map_err(|e| EdcError::Precondition(e.to_string()))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(AllocationOptimizer {
            simulator,
            config,
            rng,
            step,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run `max(restarts, 1)` attempts and keep the most profitable one.
    ///
    /// The token is checked after every attempt, so at least one attempt
    /// always completes.
    pub fn optimize(
        &mut self,
        progress: &mut impl ProgressHook,
        cancel: &CancellationToken,
    ) -> Result<OptimizationOutcome> {
        let planned = self.config.restarts.max(1);
        let mut best: Option<OptimizedAllocation> = None;
        let mut attempts = 0;
        let mut cancelled = false;

        for attempt in 1..=planned {
            let candidate = self.optimize_once()?;
            attempts = attempt;

            info!(
                attempt,
                planned,
                sharing = candidate.total_sharing(),
                profit = candidate.total_profit(),
                "optimization attempt finished"
            );

            let improved = best
                .as_ref()
                .map_or(true, |b| candidate.total_profit() > b.total_profit());
            if improved {
                best = Some(candidate);
            }

            if let Some(best) = &best {
                progress.on_attempt(best, attempt);
            }

            if attempt < planned && cancel.is_cancelled() {
                info!(attempt, "optimization cancelled");
                cancelled = true;
                break;
            }
        }

        let best = best.ok_or_else(|| EdcError::Precondition("no optimization attempt ran".to_string()))?;
        Ok(OptimizationOutcome {
            best,
            attempts,
            cancelled,
        })
    }

    /// One local search from a fresh random start
    pub fn optimize_once(&mut self) -> Result<OptimizedAllocation> {
        let timer = Instant::now();
        let simulator = self.simulator;
        let costs = self.config.costs_per_kwh.clone();
        let rounds = self.config.sharing_rounds;
        let n = simulator.consumer_count();

        let evaluate = |weights: &[f64]| simulator.simulate_fast(weights, &costs, rounds);

        let mut weights = self.initial_weights();
        let mut best_profit = evaluate(&weights)?;
        let mut best_weights = weights.clone();

        let mut fails_in_row = 0;
        let mut steps = 0usize;

        while fails_in_row < self.config.max_fails {
            steps += 1;

            let step_profit = match self.config.algorithm {
                OptimizationAlgorithm::Random => {
                    let index = self.rng.gen_range(0..n);
                    let amount = self.step.sample(&mut self.rng).abs();
                    let proposed = bump_consumer(&weights, index, amount);
                    let profit = evaluate(&proposed)?;
                    if profit > best_profit {
                        weights = proposed;
                    }
                    profit
                }
                OptimizationAlgorithm::GradientDescend => {
                    let mut steepest = 0;
                    let mut steepest_gain = f64::NEG_INFINITY;
                    for i in 0..n {
                        let gain = evaluate(&bump_consumer(&weights, i, GRADIENT_STEP))? - best_profit;
                        if gain > steepest_gain {
                            steepest = i;
                            steepest_gain = gain;
                        }
                    }
                    debug!(steepest, steepest_gain, "gradient probe");
                    // acceptance looks at the current weights, not the probed ones
                    evaluate(&weights)?
                }
            };

            if step_profit > best_profit {
                best_profit = step_profit;
                best_weights = weights.clone();
                fails_in_row = 0;
            } else {
                fails_in_row += 1;
            }
        }

        let full = simulator.simulate(&best_weights, &costs, rounds)?;
        let fast = evaluate(&best_weights)?;
        if (full.total_profit() - fast).abs() >= CROSS_CHECK_TOLERANCE {
            return Err(EdcError::CrossValidation {
                full: full.total_profit(),
                fast,
            });
        }

        debug!(
            steps,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            profit = best_profit,
            "local search converged"
        );

        Ok(OptimizedAllocation {
            weights: best_weights,
            sharing: full.sharing_per_ean,
            profit: full.profit_per_ean,
        })
    }

    /// Uniform random weights scaled to sum to 99.99
    fn initial_weights(&mut self) -> Vec<f64> {
        let n = self.simulator.consumer_count();
        let mut weights: Vec<f64> = (0..n).map(|_| self.rng.gen::<f64>() * 100.0).collect();

        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            let scale = total / WEIGHT_TOTAL;
            for weight in weights.iter_mut() {
                *weight /= scale;
            }
        } else {
            weights.iter_mut().for_each(|w| *w = WEIGHT_TOTAL / n as f64);
        }

        weights
    }
}

// ============================================================================
// TESTS
// ============================================================================
