//! Submission channels for signed transactions.
//!
//! PRIVATE_RELAY chains get a single-transaction `eth_sendBundle` targeted at
//! the next block, authenticated with an `X-Flashbots-Signature` header.
//! Everything else is a fire-and-forget `eth_sendRawTransaction` against the
//! chain's primary endpoint with a short timeout.

use crate::rpc::{ChainRpc, RpcError};
use crate::types::{ChainDescriptor, SubmissionMode};
use alloy::hex;
use alloy::primitives::{keccak256, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("block number unavailable: {0}")]
    Rpc(#[from] RpcError),
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay rejected bundle: {0}")]
    Rejected(String),
    #[error("failed to sign relay payload: {0}")]
    Signing(String),
    #[error("chain has no endpoint to broadcast to")]
    NoEndpoint,
}

#[async_trait]
pub trait TxSubmitter: Send + Sync {
    fn mode(&self) -> SubmissionMode;

    async fn submit(&self, raw_tx: Bytes) -> Result<(), SubmitError>;
}

/// Pick the channel for a chain: relay only when the chain is in private mode
/// and a relay URL is configured.
pub fn channel_for(
    chain: &ChainDescriptor,
    rpc: Arc<dyn ChainRpc>,
    auth_signer: PrivateKeySigner,
    broadcast_timeout: Duration,
) -> Result<Arc<dyn TxSubmitter>, SubmitError> {
    if let Some(relay) = chain.relay() {
        return Ok(Arc::new(BundleRelay::new(relay, auth_signer, rpc)?));
    }
    let endpoint = chain.primary_rpc().ok_or(SubmitError::NoEndpoint)?;
    Ok(Arc::new(PublicBroadcaster::new(endpoint, broadcast_timeout)?))
}

// ── Private relay ────────────────────────────────────────────────────

pub struct BundleRelay {
    client: reqwest::Client,
    url: String,
    auth_signer: PrivateKeySigner,
    rpc: Arc<dyn ChainRpc>,
}

impl BundleRelay {
    pub fn new(url: &str, auth_signer: PrivateKeySigner, rpc: Arc<dyn ChainRpc>) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            auth_signer,
            rpc,
        })
    }

    /// `address:signature` over the EIP-191 hash of the hex body digest
    fn signature_header(&self, body: &str) -> Result<String, SubmitError> {
        let digest = hex::encode_prefixed(keccak256(body.as_bytes()));
        let signature = self
            .auth_signer
            .sign_message_sync(digest.as_bytes())
            .map_err(|e| SubmitError::Signing(e.to_string()))?;
        Ok(format!(
            "{}:{}",
            self.auth_signer.address(),
            hex::encode_prefixed(signature.as_bytes())
        ))
    }
}

pub fn bundle_body(raw_tx: &Bytes, target_block: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": [hex::encode_prefixed(raw_tx)],
            "blockNumber": format!("0x{:x}", target_block),
        }]
    })
}

#[async_trait]
impl TxSubmitter for BundleRelay {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::PrivateRelay
    }

    async fn submit(&self, raw_tx: Bytes) -> Result<(), SubmitError> {
        let target_block = self.rpc.block_number().await? + 1;
        let body = bundle_body(&raw_tx, target_block).to_string();
        let header = self.signature_header(&body)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", header)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let reply: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() || reply.get("error").is_some() {
            return Err(SubmitError::Rejected(format!("status {}, body {}", status, reply)));
        }

        debug!("Bundle accepted for block {}", target_block);
        Ok(())
    }
}

// ── Public broadcast ─────────────────────────────────────────────────

pub struct PublicBroadcaster {
    client: reqwest::Client,
    url: String,
}

impl PublicBroadcaster {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TxSubmitter for PublicBroadcaster {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::PublicBroadcast
    }

    /// Never fails: a slow or rejecting endpoint is simply not waited on.
    async fn submit(&self, raw_tx: Bytes) -> Result<(), SubmitError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendRawTransaction",
            "params": [hex::encode_prefixed(&raw_tx)],
        });

        if let Err(e) = self.client.post(&self.url).json(&body).send().await {
            debug!("Raw broadcast not confirmed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Signature};

    fn chain(mode: SubmissionMode, relay: Option<&str>, rpc_urls: Vec<&str>) -> ChainDescriptor {
        ChainDescriptor {
            chain_id: 1,
            name: "TEST".into(),
            rpc_urls: rpc_urls.into_iter().map(String::from).collect(),
            ws_url: None,
            price_feed: Address::ZERO,
            gas_oracle: None,
            weth: Address::ZERO,
            submission_mode: mode,
            relay_url: relay.map(String::from),
        }
    }

    struct NoRpc;

    #[async_trait]
    impl ChainRpc for NoRpc {
        fn label(&self) -> &str {
            "none"
        }
        async fn call(&self, _r: &crate::rpc::CallRequest) -> Result<Bytes, RpcError> {
            Err(RpcError::NoEndpoints)
        }
        async fn fee_data(&self) -> Result<crate::rpc::FeeData, RpcError> {
            Err(RpcError::NoEndpoints)
        }
        async fn transaction_count(&self, _a: Address) -> Result<u64, RpcError> {
            Err(RpcError::NoEndpoints)
        }
        async fn block_number(&self) -> Result<u64, RpcError> {
            Err(RpcError::NoEndpoints)
        }
        async fn transaction(
            &self,
            _h: alloy::primitives::TxHash,
        ) -> Result<Option<crate::rpc::PendingTransfer>, RpcError> {
            Err(RpcError::NoEndpoints)
        }
    }

    #[test]
    fn test_channel_selection() {
        let signer = PrivateKeySigner::random();
        let timeout = Duration::from_secs(2);

        let private = chain(SubmissionMode::PrivateRelay, Some("https://relay.example"), vec!["https://a"]);
        let ch = channel_for(&private, Arc::new(NoRpc), signer.clone(), timeout).unwrap();
        assert_eq!(ch.mode(), SubmissionMode::PrivateRelay);

        // private mode but no relay configured falls back to broadcast
        let no_relay = chain(SubmissionMode::PrivateRelay, None, vec!["https://a"]);
        let ch = channel_for(&no_relay, Arc::new(NoRpc), signer.clone(), timeout).unwrap();
        assert_eq!(ch.mode(), SubmissionMode::PublicBroadcast);

        let public = chain(SubmissionMode::PublicBroadcast, Some("https://relay.example"), vec!["https://a"]);
        let ch = channel_for(&public, Arc::new(NoRpc), signer.clone(), timeout).unwrap();
        assert_eq!(ch.mode(), SubmissionMode::PublicBroadcast);

        let empty = chain(SubmissionMode::PublicBroadcast, None, vec![]);
        assert!(matches!(
            channel_for(&empty, Arc::new(NoRpc), signer, timeout),
            Err(SubmitError::NoEndpoint)
        ));
    }

    #[test]
    fn test_bundle_body_targets_block() {
        let body = bundle_body(&Bytes::from_static(&[0x02, 0xab]), 0x1234);
        assert_eq!(body["method"], "eth_sendBundle");
        assert_eq!(body["params"][0]["txs"][0], "0x02ab");
        assert_eq!(body["params"][0]["blockNumber"], "0x1234");
    }

    #[test]
    fn test_signature_header_recovers_to_signer() {
        let signer = PrivateKeySigner::random();
        let relay = BundleRelay::new("https://relay.example", signer.clone(), Arc::new(NoRpc)).unwrap();

        let body = r#"{"jsonrpc":"2.0"}"#;
        let header = relay.signature_header(body).unwrap();
        let (address, sig_hex) = header.split_once(':').unwrap();
        assert_eq!(address.parse::<Address>().unwrap(), signer.address());

        let raw = hex::decode(sig_hex).unwrap();
        let signature = Signature::try_from(raw.as_slice()).unwrap();
        let digest = hex::encode_prefixed(keccak256(body.as_bytes()));
        let recovered = signature.recover_address_from_msg(digest.as_bytes()).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn test_relay_aborts_without_block_number() {
        let relay =
            BundleRelay::new("https://relay.example", PrivateKeySigner::random(), Arc::new(NoRpc)).unwrap();
        let err = relay.submit(Bytes::from_static(&[1])).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rpc(_)));
    }

    #[tokio::test]
    async fn test_broadcast_ignores_unreachable_endpoint() {
        let broadcaster = PublicBroadcaster::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(broadcaster.submit(Bytes::from_static(&[1])).await.is_ok());
    }
}
