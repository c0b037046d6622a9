//! Priority-ordered endpoint pool.
//!
//! Each call walks the pool in order and returns the first successful answer.
//! An endpoint that errors or stalls past `stall_timeout` is skipped for that
//! call only; there is no health scoring between calls. Reverts are final and
//! are returned immediately instead of being retried elsewhere.

use super::{CallRequest, ChainRpc, FeeData, HttpEndpoint, PendingTransfer, RpcError};
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct FailoverClient {
    endpoints: Vec<Arc<dyn ChainRpc>>,
    stall_timeout: Duration,
}

impl FailoverClient {
    pub fn new(endpoints: Vec<Arc<dyn ChainRpc>>, stall_timeout: Duration) -> Self {
        Self {
            endpoints,
            stall_timeout,
        }
    }

    /// Build the pool from URLs, dropping any that fail to parse.
    pub fn from_urls(urls: &[String], stall_timeout: Duration) -> Result<Self, RpcError> {
        let mut endpoints: Vec<Arc<dyn ChainRpc>> = Vec::with_capacity(urls.len());
        for url in urls {
            match HttpEndpoint::new(url) {
                Ok(ep) => endpoints.push(Arc::new(ep)),
                Err(e) => warn!("Skipping endpoint: {}", e),
            }
        }
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints);
        }
        Ok(Self::new(endpoints, stall_timeout))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    async fn first_success<T, F, Fut>(&self, op: &str, f: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<dyn ChainRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        if self.endpoints.is_empty() {
            return Err(RpcError::NoEndpoints);
        }

        let mut last_error = String::new();
        for (priority, endpoint) in self.endpoints.iter().enumerate() {
            match timeout(self.stall_timeout, f(Arc::clone(endpoint))).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_definitive() => return Err(e),
                Ok(Err(e)) => {
                    debug!("{} failed on #{} {}: {}", op, priority + 1, endpoint.label(), e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    let stalled = RpcError::Stalled {
                        endpoint: endpoint.label().to_string(),
                        ms: self.stall_timeout.as_millis() as u64,
                    };
                    debug!("{} on #{}: {}", op, priority + 1, stalled);
                    last_error = stalled.to_string();
                }
            }
        }

        Err(RpcError::AllFailed {
            count: self.endpoints.len(),
            last: last_error,
        })
    }
}

#[async_trait]
impl ChainRpc for FailoverClient {
    fn label(&self) -> &str {
        "failover"
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        self.first_success("eth_call", |ep| {
            let request = request.clone();
            async move { ep.call(&request).await }
        })
        .await
    }

    async fn fee_data(&self) -> Result<FeeData, RpcError> {
        self.first_success("fee_data", |ep| async move { ep.fee_data().await })
            .await
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        self.first_success("eth_getTransactionCount", |ep| async move {
            ep.transaction_count(address).await
        })
        .await
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.first_success("eth_blockNumber", |ep| async move { ep.block_number().await })
            .await
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<PendingTransfer>, RpcError> {
        self.first_success("eth_getTransactionByHash", |ep| async move {
            ep.transaction(hash).await
        })
        .await
    }
}
