//! Priority relay client (block-engine `sendTransaction` over JSON-RPC).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::{pubkey, pubkey::Pubkey, signature::Signature};
use spl_token::ui_amount_to_amount;
use tracing::debug;

use super::error::{TxError, TxResult};
use super::tx::SignedPayload;

/// Relay tips go to one of these, picked at random per payload.
pub const JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

// JSON-RPC "invalid params", returned for undecodable transactions
const INVALID_PARAMS: i64 = -32602;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(Client::new);

pub fn random_tip_account(accounts: &[Pubkey]) -> Option<Pubkey> {
    accounts.choose(&mut rand::thread_rng()).copied()
}

/// Tip in SOL to lamports.
pub fn tip_lamports(tip_sol: f64) -> u64 {
    ui_amount_to_amount(tip_sol, spl_token::native_mint::DECIMALS)
}

/// Transport that hands a signed payload to a relay and returns its ack.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, payload: &SignedPayload) -> TxResult<Signature>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    endpoint: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, request_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            request_timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn parse_response(body: RpcResponse) -> TxResult<Signature> {
        if let Some(error) = body.error {
            return Err(if error.code == INVALID_PARAMS {
                TxError::MalformedPayload(error.message)
            } else {
                TxError::Rejected(format!("relay error {}: {}", error.code, error.message))
            });
        }

        let signature = body
            .result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| TxError::Rejected("relay returned no signature".to_string()))?;

        Signature::from_str(signature)
            .map_err(|e| TxError::Rejected(format!("relay returned invalid signature: {}", e)))
    }
}

#[async_trait]
impl RelayTransport for RelayClient {
    async fn send(&self, payload: &SignedPayload) -> TxResult<Signature> {
        let encoded = payload.encode_base64()?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendTransaction",
            "params": [encoded, { "encoding": "base64" }],
        });

        let mut request = HTTP_CLIENT
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api-key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TxError::NetworkUnavailable(e.to_string()))?;
        let status = response.status();
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| TxError::Rejected(format!("relay answered {} with unreadable body: {}", status, e)))?;

        debug!(endpoint = %self.endpoint, %status, "relay answered");
        Self::parse_response(parsed)
    }
}
