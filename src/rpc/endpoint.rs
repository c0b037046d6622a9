//! Single HTTP endpoint backed by an alloy RootProvider.

use super::{is_execution_revert, CallRequest, ChainRpc, FeeData, PendingTransfer, RpcError};
use alloy::consensus::Transaction as _;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;

pub struct HttpEndpoint {
    label: String,
    provider: RootProvider,
}

impl HttpEndpoint {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let parsed: reqwest::Url = url
            .parse()
            .map_err(|e| RpcError::Transport(format!("invalid endpoint URL `{}`: {}", url, e)))?;
        let label = parsed.host_str().unwrap_or(url).to_string();

        Ok(Self {
            label,
            provider: RootProvider::new_http(parsed),
        })
    }
}

fn transport(err: TransportError) -> RpcError {
    RpcError::Transport(err.to_string())
}

#[async_trait]
impl ChainRpc for HttpEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        let mut tx = TransactionRequest::default()
            .with_to(request.to)
            .with_input(request.data.clone());
        if let Some(from) = request.from {
            tx = tx.with_from(from);
        }
        if let Some(gas) = request.gas_limit {
            tx = tx.with_gas_limit(gas);
        }

        match self.provider.call(tx).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => match e.as_error_resp() {
                Some(payload) if is_execution_revert(payload.code, &payload.message) => {
                    Err(RpcError::SimulationFailed(e.to_string()))
                }
                _ => Err(transport(e)),
            },
        }
    }

    async fn fee_data(&self) -> Result<FeeData, RpcError> {
        let (gas_price, eip1559) = tokio::join!(
            self.provider.get_gas_price(),
            self.provider.estimate_eip1559_fees()
        );
        let gas_price = gas_price.map_err(transport)?;

        // Pre-London style chains have no 1559 quote; fall back to legacy pricing
        let (max_fee_per_gas, max_priority_fee_per_gas) = match eip1559 {
            Ok(est) => (Some(est.max_fee_per_gas), Some(est.max_priority_fee_per_gas)),
            Err(_) => (None, None),
        };

        Ok(FeeData {
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        self.provider.get_transaction_count(address).await.map_err(transport)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider.get_block_number().await.map_err(transport)
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<PendingTransfer>, RpcError> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(transport)?;

        Ok(tx.map(|tx| PendingTransfer {
            hash,
            to: tx.to(),
            value: tx.value(),
        }))
    }
}
