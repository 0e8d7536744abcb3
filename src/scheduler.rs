//! Offline model of the horizontal message queue's servicing order.
//!
//! The queue shuffles pending messages with ChaCha20 keyed by the parent
//! block hash, then admits them against a weight budget that decays toward
//! the per-block total. Predictions are compared against what the chain
//! reports; a mismatch is surfaced, never reconciled.

use crate::config::SchedulerConfig;
use rand_chacha::{
    rand_core::{RngCore, SeedableRng},
    ChaChaRng,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

const LOG_TARGET: &str = "xcm::scheduler";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Passed the barrier while servicing the queue on initialization.
    ExecutedOnInitialization,
    /// Did not fit the remaining budget on initialization.
    RejectedByBarrier,
    /// Left for the idle hook, which runs with its own budget.
    ExecutedOnIdle,
}

/// Keys the shuffle with `seed`, zero-padded or truncated to 32 bytes.
pub fn seed_from(seed: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = seed.len().min(32);
    padded[..len].copy_from_slice(&seed[..len]);
    padded
}

/// Order in which `len` queued messages are serviced.
pub fn create_shuffle(seed: &[u8], len: usize) -> Vec<usize> {
    let mut shuffle: Vec<usize> = (0..len).collect();
    let mut rng = ChaChaRng::from_seed(seed_from(seed));
    for i in 0..len {
        let j = rng.next_u32() as usize % len;
        shuffle.swap(i, j);
    }
    shuffle
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledMessage {
    /// Position in the serviced order.
    pub position: usize,
    pub outcome: ExecutionOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// Message indices in serviced order.
    pub order: Vec<usize>,
    /// Per message, by injection index.
    pub messages: Vec<ScheduledMessage>,
    /// Available budget after each step serviced on initialization.
    pub available: Vec<u64>,
    pub weight_used: u64,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn outcome(&self, index: usize) -> Option<ExecutionOutcome> {
        self.messages.get(index).map(|m| m.outcome)
    }

    pub fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.messages.iter().map(|m| m.outcome).collect()
    }

    pub fn count(&self, outcome: ExecutionOutcome) -> usize {
        self.messages.iter().filter(|m| m.outcome == outcome).count()
    }

    /// Indices of messages with `outcome`, in serviced order.
    pub fn serviced(&self, outcome: ExecutionOutcome) -> Vec<usize> {
        self.order.iter().copied().filter(|&i| self.messages[i].outcome == outcome).collect()
    }

    /// Compares predictions against observed outcomes, indexed by injection
    /// order.
    pub fn verify(&self, observed: &[ExecutionOutcome]) -> Result<(), ScheduleDivergence> {
        let total = self.len().max(observed.len());
        let mismatches: Vec<Mismatch> = (0..total)
            .filter_map(|index| {
                let predicted = self.outcome(index);
                let seen = observed.get(index).copied();
                (predicted != seen).then_some(Mismatch { index, predicted, observed: seen })
            })
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ScheduleDivergence { total, mismatches })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub predicted: Option<ExecutionOutcome>,
    pub observed: Option<ExecutionOutcome>,
}

/// Predicted and observed outcomes disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleDivergence {
    pub total: usize,
    pub mismatches: Vec<Mismatch>,
}

impl fmt::Display for ScheduleDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schedule diverged on {} of {} messages:", self.mismatches.len(), self.total)?;
        for m in &self.mismatches {
            write!(f, " [#{} predicted {:?}, observed {:?}]", m.index, m.predicted, m.observed)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScheduleDivergence {}

#[derive(Clone, Debug, Default)]
pub struct SchedulerSimulator {
    config: SchedulerConfig,
}

impl SchedulerSimulator {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Predicts the outcome of each message, `weights[i]` being the weight of
    /// the `i`-th injected message.
    pub fn simulate(&self, seed: &[u8], weights: &[u64]) -> Schedule {
        let SchedulerConfig { total_xcmp_weight: total, threshold_weight, decay_rate, .. } = self.config;
        let order = create_shuffle(seed, weights.len());
        let mut messages = vec![
            ScheduledMessage { position: 0, outcome: ExecutionOutcome::ExecutedOnIdle };
            weights.len()
        ];
        let mut available_trace = Vec::new();
        let mut available = 0u64;
        let mut used = 0u64;
        let mut cap = self.config.max_messages_on_initialization;

        for (position, &index) in order.iter().enumerate() {
            let weight = weights[index];
            let outcome = if total.saturating_sub(used) > threshold_weight && cap != Some(0) {
                if available != total {
                    available += (total - available) / decay_rate.saturating_add(1);
                    if available.saturating_add(threshold_weight) > total {
                        available = total;
                    }
                }
                available_trace.push(available);
                cap = cap.map(|c| c - 1);
                if available.saturating_sub(used) < weight {
                    ExecutionOutcome::RejectedByBarrier
                } else {
                    used += weight;
                    ExecutionOutcome::ExecutedOnInitialization
                }
            } else {
                ExecutionOutcome::ExecutedOnIdle
            };
            trace!(target: LOG_TARGET, position, index, weight, available, used, ?outcome, "step");
            messages[index] = ScheduledMessage { position, outcome };
        }

        let schedule = Schedule { order, messages, available: available_trace, weight_used: used };
        debug!(
            target: LOG_TARGET,
            messages = schedule.len(),
            on_initialization = schedule.count(ExecutionOutcome::ExecutedOnInitialization),
            rejected = schedule.count(ExecutionOutcome::RejectedByBarrier),
            on_idle = schedule.count(ExecutionOutcome::ExecutedOnIdle),
            "simulated"
        );
        schedule
    }

    /// As [`Self::simulate`] with every message costing `weight`.
    pub fn simulate_uniform(&self, seed: &[u8], count: usize, weight: u64) -> Schedule {
        self.simulate(seed, &vec![weight; count])
    }
}
