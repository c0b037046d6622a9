//! WebSocket push endpoint.
//!
//! One connection per worker. Both subscriptions share it; when the socket
//! dies the streams end and the worker treats that as a reconnect trigger.

use super::{ChainStream, RpcError, SwapLog};
use alloy::primitives::{TxHash, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Filter;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

pub struct WsStream {
    provider: DynProvider,
}

impl WsStream {
    pub async fn connect(url: &str) -> Result<Self, RpcError> {
        debug!("Opening WebSocket {}", url);
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(url))
            .await
            .map_err(|e| RpcError::Transport(format!("ws connect failed: {}", e)))?;

        Ok(Self {
            provider: provider.erased(),
        })
    }
}

#[async_trait]
impl ChainStream for WsStream {
    async fn subscribe_pending(&self) -> Result<BoxStream<'static, TxHash>, RpcError> {
        let sub = self
            .provider
            .subscribe_pending_transactions()
            .await
            .map_err(|e| RpcError::Subscription(e.to_string()))?;

        Ok(sub.into_stream().boxed())
    }

    async fn subscribe_logs(&self, topic: B256) -> Result<BoxStream<'static, SwapLog>, RpcError> {
        let filter = Filter::new().event_signature(topic);
        let sub = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| RpcError::Subscription(e.to_string()))?;

        Ok(sub
            .into_stream()
            .map(|log| SwapLog {
                address: log.address(),
                data: log.data().data.clone(),
            })
            .boxed())
    }
}
