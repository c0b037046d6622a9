//! Strike pipeline: simulate → price → gate → sign → submit.
//!
//! One call to `strike` is one attempt. Any external failure aborts the
//! attempt and is returned to the caller; nothing is retried here.

use super::gate::{boost_priority_fee, estimate_cost, SafetyPolicy};
use super::submit::{SubmitError, TxSubmitter};
use crate::contracts::IApexExecutor;
use crate::rpc::{reads, CallRequest, ChainRpc, RpcError};
use crate::types::{ChainDescriptor, MarketPulse, SubmissionMode};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StrikeError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("no EIP-1559 priority fee quoted")]
    MissingPriorityFee,
    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

/// How an attempt that did not error ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrikeOutcome {
    /// The executor call reverted
    SimulationReverted,
    /// The executor call returned no data
    EmptySimulation,
    BelowThreshold { gross: U256, threshold: U256 },
    Submitted {
        tx_hash: TxHash,
        channel: SubmissionMode,
        gross: U256,
        cost: U256,
        net: U256,
        bribe_percent: u64,
    },
}

impl fmt::Display for StrikeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StrikeOutcome::SimulationReverted => write!(f, "simulation reverted"),
            StrikeOutcome::EmptySimulation => write!(f, "simulation returned nothing"),
            StrikeOutcome::BelowThreshold { gross, threshold } => write!(
                f,
                "below threshold (gross {} <= {})",
                format_ether(*gross),
                format_ether(*threshold)
            ),
            StrikeOutcome::Submitted { tx_hash, channel, net, bribe_percent, .. } => write!(
                f,
                "submitted {} via {:?} (net {}, bribe {}%)",
                tx_hash,
                channel,
                format_ether(*net),
                bribe_percent
            ),
        }
    }
}

pub struct StrikeEngine {
    chain: Arc<ChainDescriptor>,
    rpc: Arc<dyn ChainRpc>,
    submitter: Arc<dyn TxSubmitter>,
    signer: PrivateKeySigner,
    executor: Address,
    policy: SafetyPolicy,
    gas_limit: u64,
}

impl StrikeEngine {
    pub fn new(
        chain: Arc<ChainDescriptor>,
        rpc: Arc<dyn ChainRpc>,
        submitter: Arc<dyn TxSubmitter>,
        signer: PrivateKeySigner,
        executor: Address,
        policy: SafetyPolicy,
        gas_limit: u64,
    ) -> Self {
        Self {
            chain,
            rpc,
            submitter,
            signer,
            executor,
            policy,
            gas_limit,
        }
    }

    pub async fn strike(&self, target: Address, pulse: MarketPulse) -> Result<StrikeOutcome, StrikeError> {
        let calldata = Bytes::from(
            IApexExecutor::executeFlashArbitrageCall {
                tokenA: self.chain.weth,
                tokenOut: target,
                amount: U256::ZERO,
            }
            .abi_encode(),
        );

        let simulation = CallRequest {
            to: self.executor,
            data: calldata.clone(),
            from: Some(self.signer.address()),
            gas_limit: Some(self.gas_limit),
        };
        let (simulated, fees) = tokio::join!(self.rpc.call(&simulation), self.rpc.fee_data());

        let returned = match simulated {
            Ok(bytes) => bytes,
            Err(RpcError::SimulationFailed(reason)) => {
                debug!("Simulation reverted for {}: {}", target, reason);
                return Ok(StrikeOutcome::SimulationReverted);
            }
            Err(e) => return Err(e.into()),
        };
        if returned.is_empty() {
            return Ok(StrikeOutcome::EmptySimulation);
        }
        let fees = fees?;

        // First return word is taken as the gross profit as-is
        let gross = U256::from_be_slice(&returned[..returned.len().min(32)]);

        let l1_fee = match self.chain.gas_oracle {
            Some(oracle) => reads::l1_fee(self.rpc.as_ref(), oracle, &calldata).await?,
            None => U256::ZERO,
        };
        let cost = estimate_cost(self.gas_limit, &fees, l1_fee);

        let Some(decision) = self.policy.evaluate(gross, cost, pulse.advice) else {
            return Ok(StrikeOutcome::BelowThreshold {
                gross,
                threshold: self.policy.threshold(cost, pulse.advice),
            });
        };

        let priority = fees
            .max_priority_fee_per_gas
            .ok_or(StrikeError::MissingPriorityFee)?;
        let boosted_priority = boost_priority_fee(priority, decision.bribe_percent);
        let max_fee = fees.effective_gas_price().max(boosted_priority);
        let nonce = self.rpc.transaction_count(self.signer.address()).await?;

        let mut tx = TxEip1559 {
            chain_id: self.chain.chain_id,
            nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: boosted_priority,
            to: TxKind::Call(self.executor),
            value: U256::ZERO,
            access_list: Default::default(),
            input: calldata,
        };
        let signature = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| StrikeError::Signing(e.to_string()))?;
        let signed: TxEnvelope = tx.into_signed(signature).into();
        let tx_hash = *signed.tx_hash();

        self.submitter.submit(Bytes::from(signed.encoded_2718())).await?;

        info!(
            "{} strike on {} | gross {} | cost {} | bribe {}%",
            self.chain,
            target,
            format_ether(decision.gross),
            format_ether(decision.cost),
            decision.bribe_percent
        );

        Ok(StrikeOutcome::Submitted {
            tx_hash,
            channel: self.submitter.mode(),
            gross: decision.gross,
            cost: decision.cost,
            net: decision.net,
            bribe_percent: decision.bribe_percent,
        })
    }
}
