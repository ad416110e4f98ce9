//! Ethereum JSON-RPC chain capability
//!
//! Talks to a development node with unlocked, node-managed accounts (Hardhat,
//! Anvil, Ganache): signers come from `eth_accounts` and transactions are
//! submitted with `eth_sendTransaction`, so no key material is handled here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::abi::{decode_revert, Function};
use super::artifacts::ArtifactStore;
use super::{
    Address, CallOptions, Chain, ChainError, ChainResult, ContractHandle, Deployment, RawLog,
    Receipt, Signer,
};

/// Chain capability backed by a JSON-RPC endpoint
pub struct RpcChain {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
    store: Arc<dyn ArtifactStore>,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChain {
    pub fn new(
        url: impl Into<String>,
        store: Arc<dyn ArtifactStore>,
        request_timeout: Duration,
    ) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
            store,
            receipt_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        })
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> ChainResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::trace!(method, id, "RPC request");

        let response: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(rpc_error(error));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Submit a transaction and wait until it is included
    async fn transact(&self, tx: Value) -> ChainResult<Receipt> {
        let hash = self.request("eth_sendTransaction", vec![tx]).await?;
        let hash = hash
            .as_str()
            .ok_or_else(|| ChainError::Transport(format!("unexpected transaction hash {hash}")))?
            .to_string();
        tracing::debug!(%hash, "Transaction submitted");
        self.wait_for_receipt(&hash).await
    }

    async fn wait_for_receipt(&self, hash: &str) -> ChainResult<Receipt> {
        let started = Instant::now();
        loop {
            let result = self
                .request("eth_getTransactionReceipt", vec![json!(hash)])
                .await?;
            if !result.is_null() {
                return parse_receipt(&result);
            }
            if started.elapsed() >= self.receipt_timeout {
                return Err(ChainError::ReceiptTimeout {
                    hash: hash.to_string(),
                    secs: self.receipt_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn transaction(options: &CallOptions, to: Option<Address>, data: &[u8]) -> Value {
    let mut tx = Map::new();
    tx.insert("from".into(), json!(options.from.to_string()));
    if let Some(to) = to {
        tx.insert("to".into(), json!(to.to_string()));
    }
    tx.insert("data".into(), json!(format!("0x{}", hex::encode(data))));
    if let Some(value) = options.value {
        tx.insert("value".into(), json!(format!("{value:#x}")));
    }
    Value::Object(tx)
}

#[async_trait]
impl Chain for RpcChain {
    async fn signers(&self) -> ChainResult<Vec<Signer>> {
        let accounts = self.request("eth_accounts", Vec::new()).await?;
        let accounts: Vec<Address> = serde_json::from_value(accounts)
            .map_err(|e| ChainError::Transport(format!("invalid eth_accounts response: {e}")))?;
        Ok(accounts.into_iter().map(Signer::new).collect())
    }

    async fn deploy(
        &self,
        artifact: &str,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Deployment> {
        let compiled = self.store.artifact(artifact)?;
        if compiled.bytecode.is_empty() {
            return Err(ChainError::Abi(format!(
                "artifact '{artifact}' has no bytecode (abstract contract or interface?)"
            )));
        }

        let mut data = compiled.bytecode.to_bytes()?;
        match compiled.abi.constructor() {
            Some(constructor) => data.extend(constructor.encode_args(args)?),
            None if args.is_empty() => {}
            None => {
                return Err(ChainError::Abi(format!(
                    "artifact '{artifact}' has no constructor but {} arguments were given",
                    args.len()
                )))
            }
        }

        let receipt = self.transact(transaction(options, None, &data)).await?;
        if receipt.reverted() {
            return Err(ChainError::Reverted {
                reason: None,
                data: None,
            });
        }
        let address = receipt.contract_address.ok_or_else(|| {
            ChainError::Transport(format!(
                "receipt {} carries no contract address",
                receipt.transaction_hash
            ))
        })?;
        tracing::info!(artifact, %address, "Contract deployed");

        Ok(Deployment {
            handle: ContractHandle::new(artifact, address, compiled.abi),
            receipt: Some(receipt),
        })
    }

    async fn call(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Value> {
        let data = function.encode_call(args)?;
        let tx = transaction(options, Some(contract.address), &data);
        let result = self.request("eth_call", vec![tx, json!("latest")]).await?;
        let output = result
            .as_str()
            .map(decode_hex)
            .transpose()?
            .unwrap_or_default();
        function.decode_output(&output)
    }

    async fn send(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Receipt> {
        let data = function.encode_call(args)?;
        self.transact(transaction(options, Some(contract.address), &data))
            .await
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Turn a JSON-RPC error into a revert when it describes one
fn rpc_error(error: JsonRpcError) -> ChainError {
    let data = error.data.as_ref().and_then(revert_data);
    let mentions_revert = error.message.to_lowercase().contains("revert");

    if data.is_none() && !mentions_revert {
        return ChainError::Rpc {
            code: error.code,
            message: error.message,
        };
    }

    let reason = data
        .as_deref()
        .and_then(decode_revert)
        .or_else(|| reason_from_message(&error.message));
    ChainError::Reverted { reason, data }
}

/// Revert payload is either the `data` string itself or nested under `data.data`
fn revert_data(data: &Value) -> Option<Vec<u8>> {
    let hex_str = match data {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("data")?.as_str()?,
        _ => return None,
    };
    let bytes = decode_hex(hex_str).ok()?;
    (!bytes.is_empty()).then_some(bytes)
}

/// Extract the reason from node messages when no revert data came back
fn reason_from_message(message: &str) -> Option<String> {
    const PATTERNS: [&str; 3] = [
        "reverted with reason string '",
        "execution reverted: ",
        "revert ",
    ];
    PATTERNS.iter().find_map(|pattern| {
        let start = message.find(pattern)? + pattern.len();
        let rest = &message[start..];
        let reason = rest.strip_suffix('\'').unwrap_or(rest).trim();
        (!reason.is_empty()).then(|| reason.to_string())
    })
}

fn decode_hex(s: &str) -> ChainResult<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ChainError::Transport(format!("invalid hex '{s}': {e}")))
}

fn parse_quantity(value: Option<&Value>) -> Option<u64> {
    let s = value?.as_str()?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn parse_receipt(value: &Value) -> ChainResult<Receipt> {
    let transaction_hash = value["transactionHash"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let contract_address = value["contractAddress"]
        .as_str()
        .map(str::parse::<Address>)
        .transpose()?;

    let mut logs = Vec::new();
    for log in value["logs"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let address: Address = log["address"].as_str().unwrap_or_default().parse()?;
        let mut topics = Vec::new();
        for topic in log["topics"].as_array().map(Vec::as_slice).unwrap_or_default() {
            let bytes = decode_hex(topic.as_str().unwrap_or_default())?;
            let word: [u8; 32] = bytes
                .try_into()
                .map_err(|_| ChainError::Transport("log topic is not 32 bytes".to_string()))?;
            topics.push(word);
        }
        let data = decode_hex(log["data"].as_str().unwrap_or("0x"))?;
        logs.push(RawLog {
            address,
            topics,
            data,
        });
    }

    Ok(Receipt {
        transaction_hash,
        status: parse_quantity(value.get("status")),
        block_number: parse_quantity(value.get("blockNumber")),
        contract_address,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_from_hardhat_message() {
        let msg = "VM Exception while processing transaction: reverted with reason string 'Only owner can reset'";
        assert_eq!(reason_from_message(msg).as_deref(), Some("Only owner can reset"));
    }

    #[test]
    fn test_reason_from_geth_and_ganache_messages() {
        assert_eq!(
            reason_from_message("execution reverted: Ownable: caller is not the owner").as_deref(),
            Some("Ownable: caller is not the owner")
        );
        assert_eq!(
            reason_from_message("VM Exception while processing transaction: revert Not allowed")
                .as_deref(),
            Some("Not allowed")
        );
        assert_eq!(reason_from_message("execution reverted"), None);
    }

    #[test]
    fn test_rpc_error_with_revert_data_decodes_reason() {
        let data = "0x08c379a0\
            0000000000000000000000000000000000000000000000000000000000000020\
            0000000000000000000000000000000000000000000000000000000000000004\
            6e6f706500000000000000000000000000000000000000000000000000000000";
        let error = JsonRpcError {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(json!({ "data": data })),
        };
        match rpc_error(error) {
            ChainError::Reverted { reason, data } => {
                assert_eq!(reason.as_deref(), Some("nope"));
                assert!(data.is_some());
            }
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[test]
    fn test_non_revert_rpc_error_passes_through() {
        let error = JsonRpcError {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert!(matches!(rpc_error(error), ChainError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn test_parse_receipt() {
        let receipt = parse_receipt(&json!({
            "transactionHash": "0xabc",
            "status": "0x1",
            "blockNumber": "0x10",
            "contractAddress": null,
            "logs": [{
                "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "topics": ["0x0000000000000000000000000000000000000000000000000000000000000001"],
                "data": "0x"
            }]
        }))
        .unwrap();
        assert_eq!(receipt.transaction_hash, "0xabc");
        assert_eq!(receipt.status, Some(1));
        assert_eq!(receipt.block_number, Some(16));
        assert!(receipt.contract_address.is_none());
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].topics[0][31], 1);
        assert!(!receipt.reverted());
    }

    #[test]
    fn test_transaction_shape() {
        let options = CallOptions {
            from: Address::from_low_u64(1),
            value: Some(primitive_types::U256::from(255u64)),
        };
        let tx = transaction(&options, Some(Address::from_low_u64(2)), &[0xde, 0xad]);
        assert_eq!(tx["data"], json!("0xdead"));
        assert_eq!(tx["value"], json!("0xff"));
        assert_eq!(tx["to"], json!(Address::from_low_u64(2).to_string()));
    }
}
