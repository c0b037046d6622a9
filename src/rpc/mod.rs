//! Connection Manager
//!
//! Purpose:
//!     Per-worker network access for one chain: an ordered pool of
//!     request/response endpoints behind a single failover client, plus one
//!     push (WebSocket) endpoint for pending-tx and log subscriptions.
//!
//! Created: 2026-10-19
//!
//! Architecture:
//!     endpoint.rs  : HttpEndpoint: one alloy HTTP provider implementing ChainRpc
//!     failover.rs  : FailoverClient: priority-ordered pool, first success wins
//!     stream.rs    : WsStream: alloy WS provider implementing ChainStream
//!     reads.rs     : typed contract reads (price reference, L1 data fee)
//!
//! Notes:
//!     - Quorum is 1: the first endpoint to answer wins, answers are not
//!       cross-checked against each other.
//!     - A dropped stream is surfaced to the worker, which rebuilds the whole
//!       connection set after its reconnect delay.

pub mod endpoint;
pub mod failover;
pub mod reads;
pub mod stream;

pub use endpoint::HttpEndpoint;
pub use failover::FailoverClient;
pub use stream::WsStream;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The node answered, but the call reverted. Not retried on other endpoints.
    #[error("simulation failed: {0}")]
    SimulationFailed(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("endpoint `{endpoint}` stalled after {ms}ms")]
    Stalled { endpoint: String, ms: u64 },
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("all {count} endpoints failed, last error: {last}")]
    AllFailed { count: usize, last: String },
    #[error("decode failure: {0}")]
    Decode(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
}

impl RpcError {
    /// Errors that mean "the chain said no" rather than "this endpoint is unwell".
    pub fn is_definitive(&self) -> bool {
        matches!(self, RpcError::SimulationFailed(_))
    }
}

/// JSON-RPC error code nodes attach to a reverted eth_call
const EXECUTION_REVERTED_CODE: i64 = 3;

/// True when a node's error reply means the call itself reverted. Any other
/// error body (rate limit, missing state, unknown method) is an endpoint
/// problem and goes to the next endpoint.
pub fn is_execution_revert(code: i64, message: &str) -> bool {
    code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
}

/// How loudly an operational error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limits, network churn, subscription chatter
    Noise,
    /// Bad RPC credentials
    Auth,
    Unexpected,
}

/// Classify an error message the way the process-level log filter does.
pub fn classify_error(message: &str) -> ErrorClass {
    const NOISE: [&str; 7] = ["200", "405", "429", "network", "coalesce", "subscribe", "infura"];

    if message.contains("401") {
        return ErrorClass::Auth;
    }
    let lower = message.to_lowercase();
    if NOISE.iter().any(|needle| lower.contains(needle)) {
        ErrorClass::Noise
    } else {
        ErrorClass::Unexpected
    }
}

/// Read-only call description (eth_call)
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub from: Option<Address>,
    pub gas_limit: Option<u64>,
}

impl CallRequest {
    /// Plain view call without sender or gas cap
    pub fn view(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            from: None,
            gas_limit: None,
        }
    }
}

/// Network fee quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeData {
    pub gas_price: u128,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeData {
    /// EIP-1559 max fee when quoted, legacy gas price otherwise
    pub fn effective_gas_price(&self) -> u128 {
        self.max_fee_per_gas.unwrap_or(self.gas_price)
    }
}

/// The parts of a pending transaction the detector cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub hash: TxHash,
    pub to: Option<Address>,
    pub value: U256,
}

/// A log matching the swap topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLog {
    pub address: Address,
    pub data: Bytes,
}

/// Request/response access to one chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Short name for logs (host part of the URL, or a mock label)
    fn label(&self) -> &str;

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError>;

    async fn fee_data(&self) -> Result<FeeData, RpcError>;

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn transaction(&self, hash: TxHash) -> Result<Option<PendingTransfer>, RpcError>;
}

/// Push subscriptions on one chain.
#[async_trait]
pub trait ChainStream: Send + Sync {
    async fn subscribe_pending(&self) -> Result<BoxStream<'static, TxHash>, RpcError>;

    async fn subscribe_logs(&self, topic: B256) -> Result<BoxStream<'static, SwapLog>, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_noise() {
        assert_eq!(classify_error("HTTP error 429 Too Many Requests"), ErrorClass::Noise);
        assert_eq!(classify_error("Network connection reset"), ErrorClass::Noise);
        assert_eq!(classify_error("could not coalesce error"), ErrorClass::Noise);
        assert_eq!(classify_error("failed to subscribe"), ErrorClass::Noise);
    }

    #[test]
    fn test_classify_auth_and_unexpected() {
        assert_eq!(classify_error("server returned 401 Unauthorized"), ErrorClass::Auth);
        assert_eq!(classify_error("nonce too low"), ErrorClass::Unexpected);
    }

    #[test]
    fn test_effective_gas_price_prefers_max_fee() {
        let legacy = FeeData { gas_price: 7, ..Default::default() };
        assert_eq!(legacy.effective_gas_price(), 7);

        let eip1559 = FeeData {
            gas_price: 7,
            max_fee_per_gas: Some(30),
            max_priority_fee_per_gas: Some(2),
        };
        assert_eq!(eip1559.effective_gas_price(), 30);
    }

    #[test]
    fn test_only_reverts_are_definitive() {
        assert!(RpcError::SimulationFailed("revert".into()).is_definitive());
        assert!(!RpcError::Transport("reset".into()).is_definitive());
        assert!(!RpcError::Stalled { endpoint: "a".into(), ms: 1 }.is_definitive());
    }

    #[test]
    fn test_execution_revert_detection() {
        assert!(is_execution_revert(3, "execution reverted"));
        assert!(is_execution_revert(-32000, "execution reverted: STF"));
        assert!(is_execution_revert(-32015, "VM Exception while processing transaction: revert"));

        assert!(!is_execution_revert(-32005, "daily request count exceeded, request rate limited"));
        assert!(!is_execution_revert(-32000, "header not found"));
        assert!(!is_execution_revert(-32601, "the method eth_call does not exist/is not available"));
    }
}
