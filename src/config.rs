//! Harness configuration, loadable from JSON.

use crate::weight::WeightBackend;
use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use xcm::v3::Weight;

/// Maximum block reference time of the dev chain (half a second of weight).
pub const MAX_BLOCK_REF_TIME: u64 = 500_000_000_000;

/// Weight a single instruction is assumed to cost on the dev chain. The
/// runtime's benchmarks are the source of truth; this only seeds the mock.
pub const DEFAULT_WEIGHT_PER_INSTRUCTION: u64 = 100_000_000;

/// Budget parameters of the horizontal message queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Reference time reserved for horizontal messages per block.
    pub total_xcmp_weight: u64,
    pub threshold_weight: u64,
    pub decay_rate: u64,
    /// Cap on messages serviced during initialization, `None` for no cap.
    pub max_messages_on_initialization: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let queue = QueueConfigData::default();
        Self::from_max_block_weight(MAX_BLOCK_REF_TIME)
            .with_thresholds(queue.threshold_weight.ref_time(), queue.weight_restrict_decay.ref_time())
    }
}

impl SchedulerConfig {
    /// Reserves a quarter of the block for horizontal messages, as the
    /// runtime does.
    pub fn from_max_block_weight(max_block_ref_time: u64) -> Self {
        Self {
            total_xcmp_weight: max_block_ref_time / 4,
            threshold_weight: 0,
            decay_rate: 0,
            max_messages_on_initialization: None,
        }
    }

    /// Takes threshold and decay from the on-chain queue configuration.
    pub fn from_queue_config(max_block_ref_time: u64, queue: &QueueConfigData) -> Self {
        Self::from_max_block_weight(max_block_ref_time)
            .with_thresholds(queue.threshold_weight.ref_time(), queue.weight_restrict_decay.ref_time())
    }

    pub fn with_thresholds(mut self, threshold_weight: u64, decay_rate: u64) -> Self {
        self.threshold_weight = threshold_weight;
        self.decay_rate = decay_rate;
        self
    }

    pub fn with_initialization_cap(mut self, cap: Option<u32>) -> Self {
        self.max_messages_on_initialization = cap;
        self
    }
}

/// `XcmpQueue.QueueConfig` storage value.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct QueueConfigData {
    pub suspend_threshold: u32,
    pub drop_threshold: u32,
    pub resume_threshold: u32,
    pub threshold_weight: Weight,
    pub weight_restrict_decay: Weight,
    pub xcmp_max_individual_weight: Weight,
}

impl Default for QueueConfigData {
    fn default() -> Self {
        Self {
            suspend_threshold: 2,
            drop_threshold: 5,
            resume_threshold: 1,
            threshold_weight: Weight::from_parts(100_000, 0),
            weight_restrict_decay: Weight::from_parts(2, 0),
            xcmp_max_individual_weight: Weight::from_parts(20 * 1_000_000_000, 64 * 1024),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// WebSocket endpoint of the dev node.
    pub node_url: String,
    /// Whether produced blocks are finalized.
    pub finalize: bool,
    /// Native units charged per unit of reference time.
    pub fee_per_weight: u128,
    pub weight_per_instruction: u64,
    pub weight_backend: WeightBackend,
    pub scheduler: SchedulerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            node_url: "ws://127.0.0.1:9944".into(),
            finalize: true,
            fee_per_weight: 1,
            weight_per_instruction: DEFAULT_WEIGHT_PER_INSTRUCTION,
            weight_backend: WeightBackend::RuntimeApi,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Ok(Self::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_quarter_of_block() {
        let config = SchedulerConfig::from_max_block_weight(MAX_BLOCK_REF_TIME);
        assert_eq!(config.total_xcmp_weight, 125_000_000_000);
        assert_eq!(config.max_messages_on_initialization, None);
    }

    #[test]
    fn queue_config_supplies_thresholds() {
        let queue = QueueConfigData {
            threshold_weight: Weight::from_parts(7, 1),
            weight_restrict_decay: Weight::from_parts(0, 0),
            ..Default::default()
        };
        let config = SchedulerConfig::from_queue_config(4_000, &queue);
        assert_eq!((config.total_xcmp_weight, config.threshold_weight, config.decay_rate), (1_000, 7, 0));
    }

    #[test]
    fn queue_config_round_trips() {
        let queue = QueueConfigData::default();
        let encoded = queue.encode();
        assert_eq!(QueueConfigData::decode(&mut &encoded[..]).unwrap(), queue);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = HarnessConfig::from_json(r#"{"node_url":"ws://node:9944","weight_backend":"precompile","scheduler":{"decay_rate":0}}"#).unwrap();
        assert_eq!(config.node_url, "ws://node:9944");
        assert_eq!(config.weight_backend, WeightBackend::Precompile);
        assert_eq!(config.scheduler.decay_rate, 0);
        assert_eq!(config.scheduler.threshold_weight, 100_000);
        assert_eq!(config.weight_per_instruction, DEFAULT_WEIGHT_PER_INSTRUCTION);
    }
}
