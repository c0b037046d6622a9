//! Typed contract reads through any `ChainRpc`.

use super::{CallRequest, ChainRpc, RpcError};
use crate::contracts::{IAggregatorV3, IGasPriceOracle};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

/// Aggregator answers carry 8 decimals
const PRICE_DECIMALS: f64 = 1e8;

/// Latest reference price from a Chainlink-style aggregator, in quote units.
pub async fn price_reference(rpc: &dyn ChainRpc, feed: Address) -> Result<f64, RpcError> {
    let data = IAggregatorV3::latestRoundDataCall {}.abi_encode();
    let raw = rpc.call(&CallRequest::view(feed, Bytes::from(data))).await?;

    let round = IAggregatorV3::latestRoundDataCall::abi_decode_returns(&raw)
        .map_err(|e| RpcError::Decode(format!("latestRoundData: {}", e)))?;

    let answer: f64 = round
        .answer
        .to_string()
        .parse()
        .map_err(|e| RpcError::Decode(format!("price answer: {}", e)))?;

    Ok(answer / PRICE_DECIMALS)
}

/// L1 data-availability fee for `tx_data` on an OP-stack chain, in wei.
pub async fn l1_fee(rpc: &dyn ChainRpc, oracle: Address, tx_data: &Bytes) -> Result<U256, RpcError> {
    let data = IGasPriceOracle::getL1FeeCall {
        _data: tx_data.clone(),
    }
    .abi_encode();
    let raw = rpc.call(&CallRequest::view(oracle, Bytes::from(data))).await?;

    IGasPriceOracle::getL1FeeCall::abi_decode_returns(&raw)
        .map_err(|e| RpcError::Decode(format!("getL1Fee: {}", e)))
}
