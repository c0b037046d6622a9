//! Signal Detector
//!
//! Turns raw chain activity into `WHALE_SIGNAL`s:
//!   - pending transactions moving at least the whale threshold to a known
//!     recipient (hash → eth_getTransactionByHash → value check)
//!   - Swap logs whose payload looks like a large trade (long payload with a
//!     long run of zero nibbles, i.e. an 18-decimal amount)
//!
//! Classification is pure; `Detector::run` only plumbs the two subscriptions
//! into an mpsc channel the worker drains. The worker decides whether a
//! detection is dropped (busy) or forwarded. With a busy gate attached,
//! pending hashes that arrive while the worker is busy are dropped before
//! the tx lookup.
//!
//! Created: 2026-10-19

use crate::bus::BusMessage;
use crate::contracts::SWAP_EVENT_TOPIC;
use crate::execution::Phase;
use crate::rpc::{ChainRpc, ChainStream, PendingTransfer, RpcError, SwapLog};
use alloy::hex;
use alloy::primitives::U256;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Swap payloads at or below this size are ignored
const MIN_SWAP_PAYLOAD_BYTES: usize = 64;

/// 18 zero nibbles ≈ an amount denominated with 18 decimals
const LARGE_AMOUNT_MARKER: &str = "000000000000000000";

/// Concurrent tx lookups per pending-hash stream
const MAX_IN_FLIGHT_LOOKUPS: usize = 16;

pub fn classify_pending(chain_id: u64, tx: &PendingTransfer, threshold: U256) -> Option<BusMessage> {
    let target = tx.to?;
    (tx.value >= threshold).then_some(BusMessage::WhaleSignal { chain_id, target })
}

pub fn classify_swap_log(chain_id: u64, log: &SwapLog) -> Option<BusMessage> {
    if log.data.len() <= MIN_SWAP_PAYLOAD_BYTES {
        return None;
    }
    hex::encode(&log.data)
        .contains(LARGE_AMOUNT_MARKER)
        .then_some(BusMessage::WhaleSignal {
            chain_id,
            target: log.address,
        })
}

pub struct Detector {
    chain_id: u64,
    rpc: Arc<dyn ChainRpc>,
    whale_threshold: U256,
    busy: Option<watch::Receiver<Phase>>,
}

impl Detector {
    pub fn new(chain_id: u64, rpc: Arc<dyn ChainRpc>, whale_threshold: U256) -> Self {
        Self {
            chain_id,
            rpc,
            whale_threshold,
            busy: None,
        }
    }

    /// Skip pending-tx lookups while the watched phase is busy.
    pub fn with_busy_gate(mut self, busy: watch::Receiver<Phase>) -> Self {
        self.busy = Some(busy);
        self
    }

    /// Run until either subscription ends (returned as an error so the worker
    /// reconnects) or the receiving side is dropped (clean return).
    pub async fn run(&self, stream: &dyn ChainStream, out: mpsc::Sender<BusMessage>) -> Result<(), RpcError> {
        let pending = stream.subscribe_pending().await?;
        let logs = stream.subscribe_logs(SWAP_EVENT_TOPIC).await?;
        info!("Detector subscribed (pending txs + swap logs)");

        let chain_id = self.chain_id;
        let threshold = self.whale_threshold;
        let rpc = Arc::clone(&self.rpc);
        let busy = self.busy.clone();

        let mut whales = pending
            .filter(move |_| {
                let idle = busy
                    .as_ref()
                    .map_or(true, |phase| !phase.borrow().is_busy(Instant::now()));
                futures::future::ready(idle)
            })
            .map(move |hash| {
                let rpc = Arc::clone(&rpc);
                async move { rpc.transaction(hash).await }
            })
            .buffer_unordered(MAX_IN_FLIGHT_LOOKUPS)
            .filter_map(move |lookup| async move {
                match lookup {
                    Ok(Some(tx)) => classify_pending(chain_id, &tx, threshold),
                    Ok(None) => None,
                    Err(e) => {
                        debug!("Pending tx lookup failed: {}", e);
                        None
                    }
                }
            })
            .boxed();

        let mut swaps = logs
            .filter_map(move |log| async move { classify_swap_log(chain_id, &log) })
            .boxed();

        loop {
            let signal = tokio::select! {
                next = whales.next() => match next {
                    Some(signal) => signal,
                    None => return Err(RpcError::Subscription("pending stream ended".into())),
                },
                next = swaps.next() => match next {
                    Some(signal) => signal,
                    None => return Err(RpcError::Subscription("log stream ended".into())),
                },
            };

            if out.send(signal).await.is_err() {
                return Ok(());
            }
        }
    }
}
