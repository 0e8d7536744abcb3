//! Builds XCM programs, injects them into a dev parachain node as if they
//! arrived from the relay chain or a sibling, and predicts how the node's
//! horizontal message queue will schedule them.

pub mod builder;
pub mod chain;
pub mod config;
mod error;
pub mod identity;
pub mod injector;
pub mod parachains;
pub mod scheduler;
pub mod weight;

#[cfg(test)]
mod tests;

pub use builder::{FragmentAsset, XcmFragment, XcmFragmentConfig};
pub use chain::{BlockOptions, ChainHandle, MockChain, RpcChain};
pub use config::{HarnessConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use scheduler::{ExecutionOutcome, Schedule, ScheduleDivergence, SchedulerSimulator};
