//! Chain id probing.
//!
//! A [`ChainProber`] asks an RPC endpoint which chain it serves.
//! [`JsonRpcProber`] does it over HTTP with `eth_chainId`.

use async_trait::async_trait;
use pilot_settings::ProbeSettings;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ProbeError;

/// EVM chain id.
pub type ChainId = u64;

/// Resolves the chain id served by an RPC url.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainProber: Send + Sync {
    /// Chain id served at `url`.
    async fn chain_id(&self, url: &str) -> Result<ChainId, ProbeError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Prober that posts `eth_chainId` to the endpoint.
pub struct JsonRpcProber {
    client: reqwest::Client,
}

impl JsonRpcProber {
    /// Build a prober from settings.
    pub fn new(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Build a prober around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainProber for JsonRpcProber {
    async fn chain_id(&self, url: &str) -> Result<ChainId, ProbeError> {
        let response = self
            .client
            .post(url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_chainId",
                "params": [],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(ProbeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = body
            .result
            .ok_or_else(|| ProbeError::Malformed("missing result".into()))?;
        parse_hex_quantity(&result)
    }
}

/// Parse a `0x`-prefixed JSON-RPC quantity.
pub fn parse_hex_quantity(raw: &str) -> Result<ChainId, ProbeError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| ProbeError::Malformed(format!("not a hex quantity: {raw}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| ProbeError::Malformed(format!("not a hex quantity: {raw}")))
}
