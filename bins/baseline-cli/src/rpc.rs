//! JSON-RPC client for a Baseline node with the address index enabled.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use baseline_core::constants::COIN;
use baseline_core::types::SpendableUtxo;
use baseline_wallet::chain::{ChainSource, FeeEstimate};
use baseline_wallet::WalletError;

use crate::config::RpcConfig;

const REQUEST_ID: &str = "baseline-light";

/// One entry of `getaddressutxos`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressUtxo {
    pub address: String,
    pub txid: String,
    pub output_index: u32,
    pub script: String,
    pub liners: u64,
    #[serde(default)]
    pub height: u64,
}

impl AddressUtxo {
    pub fn into_spendable(self) -> Result<SpendableUtxo> {
        SpendableUtxo::from_hex_parts(&self.txid, self.output_index, self.liners, &self.script, self.address)
            .with_context(|| format!("malformed utxo {}:{}", self.txid, self.output_index))
    }
}

/// Reply of `getaddressbalance`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressBalance {
    pub balance_liners: u64,
    pub received_liners: u64,
}

/// Reply of `estimatesmartfee`; `feerate` is coins per kB.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartFee {
    #[serde(default)]
    pub feerate: Option<f64>,
    #[serde(default)]
    pub blocks: Option<u32>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SmartFee {
    /// The estimate in liners per kB, if the node had one.
    pub fn liners_per_kb(&self) -> Option<u64> {
        self.feerate
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| (f * COIN as f64).round() as u64)
    }
}

/// Reply of `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u64,
    pub headers: u64,
    pub difficulty: f64,
    pub verificationprogress: f64,
    #[serde(default)]
    pub size_on_disk: Option<u64>,
    #[serde(default)]
    pub pruned: Option<bool>,
}

pub struct RpcClient {
    client: Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

impl RpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client")?;
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        };
        Ok(Self {
            client,
            endpoint: config.url.clone(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = request_body(method, params);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        debug!(method, "rpc call");

        let resp = request
            .send()
            .await
            .with_context(|| format!("RPC {method} request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("RPC HTTP {}: {}", status.as_u16(), text);
        }
        let reply: Value = resp
            .json()
            .await
            .with_context(|| format!("RPC {method} returned invalid JSON"))?;
        parse_reply(reply)
    }

    // ── Convenience wrappers ──────────────────────────────────────────────────

    pub async fn get_blockchain_info(&self) -> Result<BlockchainInfo> {
        self.call("getblockchaininfo", json!([])).await
    }

    pub async fn get_address_balance(&self, addresses: &[String]) -> Result<AddressBalance> {
        self.call("getaddressbalance", json!([{ "addresses": addresses }])).await
    }

    pub async fn get_address_utxos(
        &self,
        addresses: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AddressUtxo>> {
        self.call(
            "getaddressutxos",
            json!([{ "addresses": addresses, "limit": limit, "offset": offset }]),
        )
        .await
    }

    pub async fn get_raw_transaction(&self, txid: &str) -> Result<Value> {
        self.call("getrawtransaction", json!([txid, true])).await
    }

    pub async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.call("sendrawtransaction", json!([hex])).await
    }

    pub async fn estimate_smart_fee(&self, target_blocks: u32) -> Result<SmartFee> {
        self.call("estimatesmartfee", json!([target_blocks])).await
    }
}

fn request_body(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": REQUEST_ID,
        "method": method,
        "params": params,
    })
}

fn parse_reply<T: DeserializeOwned>(mut reply: Value) -> Result<T> {
    if let Some(err) = reply.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("RPC error");
        match err.get("code").and_then(Value::as_i64) {
            Some(code) => bail!("RPC error {code}: {message}"),
            None => bail!("RPC error: {message}"),
        }
    }
    let result = reply.get_mut("result").map(Value::take).unwrap_or(Value::Null);
    serde_json::from_value(result).context("unexpected RPC result shape")
}

fn chain_error(e: anyhow::Error) -> WalletError {
    WalletError::Chain(format!("{e:#}"))
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn get_utxos(
        &self,
        addresses: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SpendableUtxo>, WalletError> {
        self.get_address_utxos(addresses, limit, offset)
            .await
            .map_err(chain_error)?
            .into_iter()
            .map(|u| u.into_spendable().map_err(chain_error))
            .collect()
    }

    async fn broadcast_transaction(&self, hex: &str) -> Result<String, WalletError> {
        self.send_raw_transaction(hex).await.map_err(chain_error)
    }

    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<FeeEstimate, WalletError> {
        let fee = self.estimate_smart_fee(target_blocks).await.map_err(chain_error)?;
        Ok(FeeEstimate {
            feerate_liners_per_kb: fee.liners_per_kb(),
            blocks: fee.blocks.unwrap_or(target_blocks),
            errors: fee.errors,
        })
    }
}

/// How long to wait for a node reply.
pub fn effective_timeout(timeout_ms: i64) -> Duration {
    match u64::try_from(timeout_ms) {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => Duration::from_millis(crate::config::DEFAULT_RPC_TIMEOUT_MS),
    }
}
