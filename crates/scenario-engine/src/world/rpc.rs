//! JSON-RPC world backed by a development node
//!
//! Speaks the `evm_*` / `hardhat_*` control methods exposed by local forking
//! nodes. Each worker must point at its own node; use the `{worker}`
//! placeholder in the base URL to fan out over ports.

use super::{ActingAs, Checkpoint, World, WorldFactory};
use crate::config::{ForkSpec, RuntimeArgs};
use crate::error::WorldError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

/// Parse a `0x`-prefixed hex quantity
///
/// # Errors
/// `WorldError::Rpc` naming `method` if `raw` is not a hex number.
pub fn parse_quantity(method: &str, raw: &str) -> Result<u64, WorldError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|_| WorldError::Rpc {
        method: method.to_string(),
        message: format!("invalid quantity `{raw}`"),
    })
}

/// World speaking JSON-RPC over HTTP
#[derive(Debug)]
pub struct RpcWorld {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcWorld {
    /// Create a world for the node at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Node URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call and decode its result
    ///
    /// # Errors
    /// `WorldError::Transport` if the node is unreachable or replies with
    /// something that is not JSON-RPC, `WorldError::Rpc` for error replies.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WorldError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorldError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| WorldError::Transport(e.to_string()))?;

        decode_response(method, response)
    }
}

fn decode_response<T: DeserializeOwned>(method: &str, response: RpcResponse) -> Result<T, WorldError> {
    if let Some(error) = response.error {
        return Err(WorldError::Rpc {
            method: method.to_string(),
            message: error.message,
        });
    }
    serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(|e| WorldError::Rpc {
        method: method.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl World for RpcWorld {
    async fn snapshot(&self) -> Result<Checkpoint, WorldError> {
        let id: String = self.call("evm_snapshot", json!([])).await?;
        Ok(Checkpoint::new(id))
    }

    async fn revert(&self, checkpoint: Checkpoint) -> Result<(), WorldError> {
        let id = checkpoint.into_id();
        let reverted: bool = self.call("evm_revert", json!([id])).await?;
        if reverted {
            Ok(())
        } else {
            Err(WorldError::UnknownCheckpoint(id))
        }
    }

    async fn increase_time(&self, seconds: u64) -> Result<(), WorldError> {
        let _: Value = self.call("evm_increaseTime", json!([seconds])).await?;
        let _: Value = self.call("evm_mine", json!([])).await?;
        Ok(())
    }

    async fn timestamp(&self) -> Result<u64, WorldError> {
        let block: BlockHeader = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        parse_quantity("eth_getBlockByNumber", &block.timestamp)
    }

    async fn impersonate(&self, identity: &str) -> Result<ActingAs, WorldError> {
        let _: Value = self
            .call("hardhat_impersonateAccount", json!([identity]))
            .await?;
        Ok(ActingAs {
            identity: identity.to_string(),
        })
    }

    async fn chain_id(&self) -> Result<u64, WorldError> {
        let raw: String = self.call("eth_chainId", json!([])).await?;
        parse_quantity("eth_chainId", &raw)
    }
}

/// Connects one [`RpcWorld`] per worker
#[derive(Debug, Clone, Default)]
pub struct RpcWorldFactory {
    fork_source: Option<String>,
}

impl RpcWorldFactory {
    /// Create a factory that uses nodes as they are
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset each node to fork `source` at the base's block number
    #[inline]
    #[must_use]
    pub fn with_fork_source(mut self, source: impl Into<String>) -> Self {
        self.fork_source = Some(source.into());
        self
    }
}

#[async_trait]
impl WorldFactory<RpcWorld> for RpcWorldFactory {
    async fn connect(&self, base: &ForkSpec, args: &RuntimeArgs) -> Result<RpcWorld, WorldError> {
        let url = base
            .url_for(args.worker_index)
            .ok_or_else(|| WorldError::Transport(format!("base `{}` has no url", base.name)))?;
        let world = RpcWorld::new(url);

        if let (Some(source), Some(block)) = (&self.fork_source, base.block_number) {
            let _: Value = world
                .call(
                    "hardhat_reset",
                    json!([{ "forking": { "jsonRpcUrl": source, "blockNumber": block } }]),
                )
                .await?;
        }

        let chain_id = world.chain_id().await?;
        tracing::info!(
            base = %base.name,
            worker = args.worker_index,
            url = world.url(),
            chain_id,
            "connected to node"
        );
        if args.spider {
            tracing::debug!(base = %base.name, "deployment crawl left to the external crawler");
        }
        Ok(world)
    }
}
