//! Core data structures shared by every worker
//!
//! Chain descriptors, worker identity (ordinal → chain × role), and the
//! advisory market signal.
//!
//! Created: 2026-10-19

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a signed transaction leaves the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionMode {
    /// Single-transaction bundle sent to a block-builder relay
    PrivateRelay,
    /// eth_sendRawTransaction against the chain's primary endpoint
    PublicBroadcast,
}

/// Static description of one monitored network.
/// Built once at startup and shared read-only by all workers on that chain.
#[derive(Debug, Clone)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    /// Request/response endpoints, highest priority first
    pub rpc_urls: Vec<String>,
    /// Push endpoint for pending tx + log subscriptions
    pub ws_url: Option<String>,
    /// Chainlink-style aggregator used as the advisory price reference
    pub price_feed: Address,
    /// L1 data-fee oracle (OP-stack chains only)
    pub gas_oracle: Option<Address>,
    /// Wrapped native token (first leg of the flash-arbitrage call)
    pub weth: Address,
    pub submission_mode: SubmissionMode,
    pub relay_url: Option<String>,
}

impl ChainDescriptor {
    /// Endpoint used for fire-and-forget raw broadcast.
    pub fn primary_rpc(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    pub fn relay(&self) -> Option<&str> {
        match self.submission_mode {
            SubmissionMode::PrivateRelay => self.relay_url.as_deref(),
            SubmissionMode::PublicBroadcast => None,
        }
    }
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.chain_id)
    }
}

/// Division of labour inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sniper,
    Decoder,
    Prober,
    Analyst,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Sniper, Role::Decoder, Role::Prober, Role::Analyst];

    pub fn from_ordinal(ordinal: u64) -> Self {
        Self::ALL[(ordinal % Self::ALL.len() as u64) as usize]
    }

    /// SNIPER and DECODER watch the chain
    pub fn runs_detector(&self) -> bool {
        matches!(self, Role::Sniper | Role::Decoder)
    }

    /// ANALYST never executes
    pub fn can_execute(&self) -> bool {
        !matches!(self, Role::Analyst)
    }

    pub fn runs_advisory(&self) -> bool {
        matches!(self, Role::Analyst)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Sniper => write!(f, "SNIPER"),
            Role::Decoder => write!(f, "DECODER"),
            Role::Prober => write!(f, "PROBER"),
            Role::Analyst => write!(f, "ANALYST"),
        }
    }
}

/// A worker's fixed place in the (chain × role) grid.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub ordinal: u64,
    pub chain: Arc<ChainDescriptor>,
    pub role: Role,
}

impl WorkerIdentity {
    /// chain = ordinal mod chain count, role = ordinal mod 4.
    /// Returns None when no chains are configured.
    pub fn assign(ordinal: u64, chains: &[Arc<ChainDescriptor>]) -> Option<Self> {
        if chains.is_empty() {
            return None;
        }
        let chain = Arc::clone(&chains[(ordinal % chains.len() as u64) as usize]);
        Some(Self {
            ordinal,
            chain,
            role: Role::from_ordinal(ordinal),
        })
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "core-{} [{}] on {}", self.ordinal, self.role, self.chain)
    }
}

/// Sentiment classification returned by the advisory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "UPPERCASE")]
pub enum Advice {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl From<String> for Advice {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Advice::Buy,
            "SELL" => Advice::Sell,
            _ => Advice::Hold,
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Advice::Buy => write!(f, "BUY"),
            Advice::Sell => write!(f, "SELL"),
            Advice::Hold => write!(f, "HOLD"),
        }
    }
}

/// Latest advisory snapshot. Each worker keeps its own copy; last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPulse {
    #[serde(default)]
    pub advice: Advice,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_margin_multiplier", alias = "margin_multiplier")]
    pub margin_multiplier: f64,
}

fn default_margin_multiplier() -> f64 {
    1.0
}

impl Default for MarketPulse {
    fn default() -> Self {
        Self {
            advice: Advice::Hold,
            confidence: 0.5,
            margin_multiplier: 1.0,
        }
    }
}
