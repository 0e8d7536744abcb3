//! The node under test, seen through the handful of calls the harness makes.

use crate::{
    config::{HarnessConfig, QueueConfigData},
    Result,
};
use async_trait::async_trait;
use codec::{Decode, Encode};
use serde::Deserialize;
use sp_core::{
    hashing::{blake2_128, twox_128},
    H160, H256,
};
use xcm::{v3::Weight, VersionedXcm};

pub mod mock;
pub mod rpc;

pub use mock::{MockChain, XcmpQueueEvent};
pub use rpc::RpcChain;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockOptions {
    pub create_empty: bool,
    pub finalize: bool,
    /// Builds on this block instead of the best one.
    pub parent_hash: Option<H256>,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self { create_empty: true, finalize: true, parent_hash: None }
    }
}

impl BlockOptions {
    /// Options for blocks on top of the best block, finalized as configured.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self { finalize: config.finalize, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreatedBlock {
    pub hash: H256,
    #[serde(default)]
    pub aux: serde_json::Value,
}

#[async_trait]
pub trait ChainHandle: Send + Sync {
    /// Queues a relay-to-chain message for the next block.
    async fn inject_downward(&self, message: Vec<u8>) -> Result<()>;

    /// Queues a horizontal page from parachain `sender` for the next block.
    async fn inject_hrmp(&self, sender: u32, message: Vec<u8>) -> Result<()>;

    async fn produce_block(&self, options: BlockOptions) -> Result<CreatedBlock>;

    async fn query_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Weight `program` would consume, without executing it.
    async fn dry_run_weight(&self, program: &VersionedXcm<()>) -> Result<Weight>;

    async fn parent_hash(&self) -> Result<H256> {
        let value = self.query_storage(&parent_hash_key()).await?;
        Ok(value.map(|v| H256::decode(&mut &v[..])).transpose()?.unwrap_or_default())
    }
}

pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
    [twox_128(pallet.as_bytes()), twox_128(item.as_bytes())].concat()
}

/// `System.Account` key of a 20-byte account (`Blake2_128Concat` hasher).
pub fn account_key(account: H160) -> Vec<u8> {
    let mut key = storage_prefix("System", "Account");
    key.extend(blake2_128(account.as_bytes()));
    key.extend(account.as_bytes());
    key
}

pub fn parent_hash_key() -> Vec<u8> {
    storage_prefix("System", "ParentHash")
}

pub fn queue_config_key() -> Vec<u8> {
    storage_prefix("XcmpQueue", "QueueConfig")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

/// Free balance of `account`, zero when the account does not exist.
pub async fn account_balance<C: ChainHandle + ?Sized>(chain: &C, account: H160) -> Result<u128> {
    let value = chain.query_storage(&account_key(account)).await?;
    let info = value.map(|v| AccountInfo::decode(&mut &v[..])).transpose()?.unwrap_or_default();
    Ok(info.data.free)
}

/// On-chain queue configuration, the pallet default when unset.
pub async fn queue_config<C: ChainHandle + ?Sized>(chain: &C) -> Result<QueueConfigData> {
    let value = chain.query_storage(&queue_config_key()).await?;
    Ok(value.map(|v| QueueConfigData::decode(&mut &v[..])).transpose()?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn well_known_prefixes() {
        assert_eq!(
            storage_prefix("System", "Account"),
            hex!("26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9").to_vec()
        );
        assert_eq!(
            parent_hash_key(),
            hex!("26aa394eea5630e07c48ae0c9558cef78a42f33323cb5ced3b44dd825fda9fcc").to_vec()
        );
    }

    #[test]
    fn account_key_ends_with_account() {
        let account = H160([9u8; 20]);
        let key = account_key(account);
        assert_eq!(key.len(), 32 + 16 + 20);
        assert_eq!(&key[48..], account.as_bytes());
    }

    #[test]
    fn block_options_follow_config() {
        let config = HarnessConfig { finalize: false, ..Default::default() };
        let options = BlockOptions::from_config(&config);
        assert!(!options.finalize);
        assert!(options.create_empty);
        assert_eq!(options.parent_hash, None);
        assert_eq!(BlockOptions::from_config(&HarnessConfig::default()), BlockOptions::default());
    }

    #[test]
    fn account_info_layout() {
        let info = AccountInfo { nonce: 1, data: AccountData { free: 5, ..Default::default() }, ..Default::default() };
        let encoded = info.encode();
        assert_eq!(encoded.len(), 4 * 4 + 16 * 4);
        assert_eq!(encoded[16], 5);
    }
}
