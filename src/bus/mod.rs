//! Signal Bus
//!
//! Purpose:
//!     Fan-out of worker signals. A message published by one worker reaches
//!     every other worker; the publisher never receives its own message back.
//!
//! Created: 2026-10-19
//!
//! Architecture:
//!     - In the supervisor, `SignalBus` is a tokio broadcast channel of
//!       `Envelope`s tagged with the publishing worker's ordinal.
//!     - Each worker process is bridged to the bus by its stdin/stdout pipes,
//!       carrying one JSON message per line (see `codec`).
//!     - Delivery is best-effort: a lagging subscriber skips what it missed.

pub mod codec;

use crate::types::MarketPulse;
use alloy::primitives::Address;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Default broadcast buffer per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Wire-level signal exchanged between workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusMessage {
    #[serde(rename_all = "camelCase")]
    WhaleSignal { chain_id: u64, target: Address },
    MarketPulse { data: MarketPulse },
}

impl BusMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::WhaleSignal { .. } => "WHALE_SIGNAL",
            BusMessage::MarketPulse { .. } => "MARKET_PULSE",
        }
    }
}

/// A bus message plus the ordinal of the worker that produced it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: u64,
    pub message: BusMessage,
}

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Envelope>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish on behalf of `origin`. Returns the number of subscribers that
    /// will see it (including the origin's own, which filters it out).
    pub fn publish(&self, origin: u64, message: BusMessage) -> usize {
        self.tx.send(Envelope { origin, message }).unwrap_or(0)
    }

    /// Subscribe as worker `me`; messages published by `me` are skipped.
    pub fn subscribe(&self, me: u64) -> BusSubscription {
        BusSubscription {
            me,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

pub struct BusSubscription {
    me: u64,
    rx: broadcast::Receiver<Envelope>,
}

impl BusSubscription {
    /// Next message from another worker, or None once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(env) if env.origin == self.me => continue,
                Ok(env) => return Some(env.message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Bus subscriber {} lagged, {} messages skipped", self.me, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = BusMessage> + Send + 'static {
        let me = self.me;
        BroadcastStream::new(self.rx).filter_map(move |item| async move {
            match item {
                Ok(env) if env.origin == me => None,
                Ok(env) => Some(env.message),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!("Bus subscriber {} lagged, {} messages skipped", me, n);
                    None
                }
            }
        })
    }
}
