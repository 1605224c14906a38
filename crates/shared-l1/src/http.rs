//! JSON-RPC client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{decode_hex, parse_address, parse_hash, to_hex, Address, Hash};

use crate::client::EthClient;
use crate::errors::L1Error;
use crate::types::{BlockHeader, BlockTag, CallRequest, Log, LogFilter};

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcHeader {
    number: String,
    hash: String,
    parent_hash: String,
    timestamp: String,
    base_fee_per_gas: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

pub(crate) fn parse_hex_u64(value: &str) -> Result<u64, L1Error> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| L1Error::Decode(format!("invalid quantity {value}: {e}")))
}

fn parse_hex_u256(value: &str) -> Result<U256, L1Error> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    U256::from_str_radix(stripped, 16)
        .map_err(|e| L1Error::Decode(format!("invalid quantity {value}: {e:?}")))
}

fn quantity(value: U256) -> String {
    format!("0x{value:x}")
}

impl TryFrom<RpcHeader> for BlockHeader {
    type Error = L1Error;

    fn try_from(raw: RpcHeader) -> Result<Self, Self::Error> {
        Ok(Self {
            number: parse_hex_u64(&raw.number)?,
            hash: parse_hash(&raw.hash)?,
            parent_hash: parse_hash(&raw.parent_hash)?,
            timestamp: parse_hex_u64(&raw.timestamp)?,
            base_fee_per_gas: raw.base_fee_per_gas.as_deref().map(parse_hex_u256).transpose()?,
        })
    }
}

impl TryFrom<RpcLog> for Log {
    type Error = L1Error;

    fn try_from(raw: RpcLog) -> Result<Self, Self::Error> {
        let pending = || L1Error::Decode("pending log in finalized range".into());
        Ok(Self {
            address: parse_address(&raw.address)?,
            topics: raw
                .topics
                .iter()
                .map(|t| parse_hash(t))
                .collect::<Result<_, _>>()?,
            data: decode_hex(&raw.data)?,
            block_number: parse_hex_u64(raw.block_number.as_deref().ok_or_else(pending)?)?,
            log_index: parse_hex_u64(raw.log_index.as_deref().ok_or_else(pending)?)?,
            transaction_hash: parse_hash(raw.transaction_hash.as_deref().ok_or_else(pending)?)?,
        })
    }
}

fn call_object(request: &CallRequest) -> Value {
    let mut object = json!({
        "to": to_hex(&request.to),
        "data": to_hex(&request.data),
    });
    if let Some(from) = request.from {
        object["from"] = Value::String(to_hex(&from));
    }
    object
}

/// [`EthClient`] over HTTP JSON-RPC 2.0.
pub struct HttpEthClient {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl HttpEthClient {
    /// Client whose every request is bounded by `timeout`.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, L1Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn request<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<R>, L1Error> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response: JsonRpcResponse<R> = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(L1Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn call_method<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, L1Error> {
        self.request(method, params)
            .await?
            .ok_or_else(|| L1Error::MissingResult(method.to_string()))
    }
}

#[async_trait]
impl EthClient for HttpEthClient {
    async fn chain_id(&self) -> Result<u64, L1Error> {
        let result: String = self.call_method("eth_chainId", Vec::<()>::new()).await?;
        parse_hex_u64(&result)
    }

    async fn block_number(&self) -> Result<u64, L1Error> {
        let result: String = self.call_method("eth_blockNumber", Vec::<()>::new()).await?;
        parse_hex_u64(&result)
    }

    async fn header_by_tag(&self, tag: BlockTag) -> Result<BlockHeader, L1Error> {
        let header: Option<RpcHeader> = self
            .request("eth_getBlockByNumber", (tag.to_param(), false))
            .await?;
        header
            .ok_or_else(|| L1Error::BlockNotFound(tag.to_param()))?
            .try_into()
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, L1Error> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| match t {
                Some(hash) => Value::String(to_hex(hash)),
                None => Value::Null,
            })
            .collect();
        let params = [json!({
            "address": to_hex(&filter.address),
            "topics": topics,
            "fromBlock": BlockTag::Number(filter.from_block).to_param(),
            "toBlock": BlockTag::Number(filter.to_block).to_param(),
        })];

        let raw: Vec<RpcLog> = self.call_method("eth_getLogs", params).await?;
        let mut logs = raw
            .into_iter()
            .filter(|log| !log.removed)
            .map(Log::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Vec<u8>, L1Error> {
        let result: String = self
            .call_method("eth_call", (call_object(request), block.to_param()))
            .await?;
        Ok(decode_hex(&result)?)
    }

    async fn transaction_count(&self, address: Address, block: BlockTag) -> Result<u64, L1Error> {
        let result: String = self
            .call_method(
                "eth_getTransactionCount",
                (to_hex(&address), block.to_param()),
            )
            .await?;
        parse_hex_u64(&result)
    }

    async fn gas_price(&self) -> Result<U256, L1Error> {
        let result: String = self.call_method("eth_gasPrice", Vec::<()>::new()).await?;
        parse_hex_u256(&result)
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, L1Error> {
        let result: String = self
            .call_method("eth_maxPriorityFeePerGas", Vec::<()>::new())
            .await?;
        parse_hex_u256(&result)
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, L1Error> {
        let result: String = self
            .call_method("eth_estimateGas", [call_object(request)])
            .await?;
        parse_hex_u64(&result)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, L1Error> {
        let result: String = self
            .call_method("eth_sendRawTransaction", [to_hex(raw)])
            .await?;
        Ok(parse_hash(&result)?)
    }
}

impl std::fmt::Debug for HttpEthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Endpoints often embed API keys.
        f.debug_struct("HttpEthClient").finish_non_exhaustive()
    }
}
