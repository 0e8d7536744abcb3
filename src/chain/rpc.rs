//! [`ChainHandle`] over a dev node's JSON-RPC WebSocket endpoint.

use super::{BlockOptions, ChainHandle, CreatedBlock};
use crate::{
    config::HarnessConfig,
    weight::{self, WeightBackend, QUERY_XCM_WEIGHT, XCM_UTILS_ADDRESS},
    Error, Result,
};
use async_trait::async_trait;
use codec::Encode;
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams, ClientError},
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use serde::de::DeserializeOwned;
use sp_core::Bytes;
use tracing::{debug, trace};
use xcm::{v3::Weight, VersionedXcm};

const LOG_TARGET: &str = "xcm::rpc";

pub struct RpcChain {
    client: WsClient,
    weight_backend: WeightBackend,
}

impl RpcChain {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = WsClientBuilder::default().build(url).await?;
        debug!(target: LOG_TARGET, url, "connected");
        Ok(Self { client, weight_backend: WeightBackend::default() })
    }

    /// Connects to the configured node and weighs through the configured
    /// backend.
    pub async fn from_config(config: &HarnessConfig) -> Result<Self> {
        Ok(Self::connect(&config.node_url).await?.with_weight_backend(config.weight_backend))
    }

    pub fn with_weight_backend(mut self, backend: WeightBackend) -> Self {
        self.weight_backend = backend;
        self
    }

    async fn request<R: DeserializeOwned>(&self, method: &'static str, params: ArrayParams) -> Result<R> {
        trace!(target: LOG_TARGET, method, "request");
        self.client.request(method, params).await.map_err(|e| match e {
            // keep the node's own diagnostic untouched
            ClientError::Call(error) => Error::Node { code: error.code(), message: error.message().to_owned() },
            other => Error::Rpc(other),
        })
    }

    pub async fn state_call(&self, method: &str, data: &[u8]) -> Result<Vec<u8>> {
        let result: Bytes = self.request("state_call", rpc_params![method, Bytes(data.to_vec())]).await?;
        Ok(result.0)
    }

    pub async fn eth_call(&self, to: sp_core::H160, data: Vec<u8>) -> Result<Vec<u8>> {
        let call = serde_json::json!({ "to": to, "data": Bytes(data) });
        let result: Bytes = self.request("eth_call", rpc_params![call, "latest"]).await?;
        Ok(result.0)
    }
}

#[async_trait]
impl ChainHandle for RpcChain {
    async fn inject_downward(&self, message: Vec<u8>) -> Result<()> {
        self.request("xcm_injectDownwardMessage", rpc_params![message]).await
    }

    async fn inject_hrmp(&self, sender: u32, message: Vec<u8>) -> Result<()> {
        self.request("xcm_injectHrmpMessage", rpc_params![sender, message]).await
    }

    async fn produce_block(&self, options: BlockOptions) -> Result<CreatedBlock> {
        let block: CreatedBlock = self
            .request(
                "engine_createBlock",
                rpc_params![options.create_empty, options.finalize, options.parent_hash],
            )
            .await?;
        debug!(target: LOG_TARGET, hash = ?block.hash, "created block");
        Ok(block)
    }

    async fn query_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<Bytes> = self.request("state_getStorage", rpc_params![Bytes(key.to_vec())]).await?;
        Ok(value.map(|v| v.0))
    }

    async fn dry_run_weight(&self, program: &VersionedXcm<()>) -> Result<Weight> {
        match self.weight_backend {
            WeightBackend::RuntimeApi => {
                let output = self.state_call(QUERY_XCM_WEIGHT, &program.encode()).await?;
                weight::decode_query_xcm_weight(&output)
            }
            WeightBackend::Precompile => {
                let output = self.eth_call(XCM_UTILS_ADDRESS, weight::encode_weight_message_call(program)).await?;
                weight::decode_weight_message_output(&output)
            }
        }
    }
}
