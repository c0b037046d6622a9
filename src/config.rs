//! Configuration management
//!
//! Secrets and endpoint URLs come from the environment (`.env` loaded via
//! dotenv). Timing and threshold tunables come from an optional TOML file;
//! every field has a default so an empty or missing file is valid.
//!
//! Created: 2026-10-19

use crate::types::{ChainDescriptor, SubmissionMode};
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{address, Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Executor contract used when EXECUTOR_CONTRACT is unset
pub const DEFAULT_EXECUTOR_CONTRACT: Address = address!("83EF5c401fAa5B9674BAfAcFb089b30bAc67C9A0");

/// Placeholder payout destination (never a valid address)
pub const DEFAULT_BENEFICIARY: &str = "0xYOUR_OWN_PUBLIC_WALLET_ADDRESS";

/// Environment variable the supervisor sets on every worker process
pub const WORKER_ID_ENV: &str = "APEX_WORKER_ID";

/// Full runtime configuration, shared by supervisor and workers
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Raw signing key (PRIVATE_KEY, falling back to TREASURY_PRIVATE_KEY)
    pub private_key: Option<String>,
    pub executor_contract: Address,
    /// Payout destination as configured; checked against the denylist verbatim
    pub beneficiary: String,
    pub chains: Vec<Arc<ChainDescriptor>>,
    pub advisory_api_key: Option<String>,
    pub tunables: Tunables,
}

/// Load configuration from `.env` + process environment, and tunables from
/// `tunables_path` when given.
pub fn load_config(tunables_path: Option<&Path>) -> Result<BotConfig> {
    dotenv::dotenv().ok();

    let tunables = match tunables_path {
        Some(path) => Tunables::load(path)?,
        None => Tunables::default(),
    };

    load_config_with(|key| std::env::var(key).ok(), tunables)
}

/// Build the configuration from an arbitrary key lookup.
pub fn load_config_with<F>(env: F, tunables: Tunables) -> Result<BotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let private_key = lookup("PRIVATE_KEY").or_else(|| lookup("TREASURY_PRIVATE_KEY"));

    let executor_contract = match lookup("EXECUTOR_CONTRACT") {
        Some(raw) => Address::from_str(&raw)
            .with_context(|| format!("Invalid EXECUTOR_CONTRACT: {}", raw))?,
        None => DEFAULT_EXECUTOR_CONTRACT,
    };

    let beneficiary = lookup("BENEFICIARY").unwrap_or_else(|| DEFAULT_BENEFICIARY.to_string());

    Ok(BotConfig {
        private_key,
        executor_contract,
        beneficiary,
        chains: build_chains(&lookup).into_iter().map(Arc::new).collect(),
        advisory_api_key: lookup("GEMINI_API_KEY"),
        tunables,
    })
}

/// A signing key is usable when present and not an all-zero placeholder.
pub fn credential_usable(key: Option<&str>) -> bool {
    match key {
        Some(k) => !k.trim().is_empty() && !k.contains("0000000"),
        None => false,
    }
}

/// Keep only URLs with the expected scheme prefix, preserving priority order.
fn endpoint_pool(candidates: Vec<Option<String>>, scheme: &str) -> Vec<String> {
    candidates
        .into_iter()
        .flatten()
        .filter(|url| url.starts_with(scheme))
        .collect()
}

/// Monitored networks: Ethereum mainnet (private relay), Base, Arbitrum.
fn build_chains<F>(lookup: &F) -> Vec<ChainDescriptor>
where
    F: Fn(&str) -> Option<String>,
{
    let fixed = |url: &str| Some(url.to_string());

    vec![
        ChainDescriptor {
            chain_id: 1,
            name: "ETH_MAINNET".to_string(),
            rpc_urls: endpoint_pool(
                vec![lookup("ETH_RPC"), fixed("https://rpc.flashbots.net"), fixed("https://eth.llamarpc.com")],
                "http",
            ),
            ws_url: lookup("ETH_WSS").filter(|u| u.starts_with("ws")),
            price_feed: address!("5f4eC3Df9cbd43714FE2740f5E3616155c5b8419"),
            gas_oracle: None,
            weth: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            submission_mode: SubmissionMode::PrivateRelay,
            relay_url: Some("https://relay.flashbots.net".to_string()),
        },
        ChainDescriptor {
            chain_id: 8453,
            name: "BASE_MAINNET".to_string(),
            rpc_urls: endpoint_pool(
                vec![
                    lookup("QUICKNODE_HTTP"),
                    lookup("BASE_RPC"),
                    fixed("https://mainnet.base.org"),
                    fixed("https://base.llamarpc.com"),
                    fixed("https://1rpc.io/base"),
                ],
                "http",
            ),
            ws_url: lookup("BASE_WSS").filter(|u| u.starts_with("ws")),
            price_feed: address!("71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70"),
            gas_oracle: Some(address!("420000000000000000000000000000000000000F")),
            weth: address!("4200000000000000000000000000000000000006"),
            submission_mode: SubmissionMode::PublicBroadcast,
            relay_url: None,
        },
        ChainDescriptor {
            chain_id: 42161,
            name: "ARBITRUM".to_string(),
            rpc_urls: endpoint_pool(
                vec![lookup("ARB_RPC"), fixed("https://arb1.arbitrum.io/rpc")],
                "http",
            ),
            ws_url: lookup("ARB_WSS").filter(|u| u.starts_with("ws")),
            price_feed: address!("639Fe6ab55C921f74e7fac1ee960C0B6293ba612"),
            gas_oracle: None,
            weth: address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            submission_mode: SubmissionMode::PublicBroadcast,
            relay_url: None,
        },
    ]
}

// ── TOML tunables ───────────────────────────────────────────────────

/// Top-level TOML structure. All sections optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub advisory: AdvisorySettings,
}

impl Tunables {
    /// Load tunables from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let tunables: Self = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        Ok(tunables)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    /// Upper bound on pool size (actual = min(cores, cap))
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Delay between consecutive initial spawns
    #[serde(default = "default_boot_delay")]
    pub worker_boot_delay_ms: u64,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_ms: u64,
    /// Rolling window used for the restart-rate figure
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,
}

fn default_max_workers() -> usize { 12 }
fn default_boot_delay() -> u64 { 15_000 }
fn default_heartbeat() -> u64 { 120_000 }
fn default_restart_window() -> u64 { 60 }

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            worker_boot_delay_ms: default_boot_delay(),
            heartbeat_interval_ms: default_heartbeat(),
            restart_window_secs: default_restart_window(),
        }
    }
}

impl SupervisorSettings {
    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.worker_boot_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Startup stagger = (ordinal mod stagger_slots) × stagger_step_ms
    #[serde(default = "default_stagger_step")]
    pub stagger_step_ms: u64,
    #[serde(default = "default_stagger_slots")]
    pub stagger_slots: u64,
    /// Wait before retrying a failed bootstrap / dropped stream
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Per-endpoint wait before failing over to the next one
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_ms: u64,
    /// Pending transfer value (native units) that counts as a whale
    #[serde(default = "default_whale_threshold")]
    pub whale_threshold_eth: String,
}

fn default_stagger_step() -> u64 { 8_000 }
fn default_stagger_slots() -> u64 { 24 }
fn default_reconnect_delay() -> u64 { 60_000 }
fn default_stall_timeout() -> u64 { 2_500 }
fn default_whale_threshold() -> String { "10.0".to_string() }

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            stagger_step_ms: default_stagger_step(),
            stagger_slots: default_stagger_slots(),
            reconnect_delay_ms: default_reconnect_delay(),
            stall_timeout_ms: default_stall_timeout(),
            whale_threshold_eth: default_whale_threshold(),
        }
    }
}

impl WorkerSettings {
    pub fn startup_delay(&self, ordinal: u64) -> Duration {
        let slot = if self.stagger_slots == 0 { 0 } else { ordinal % self.stagger_slots };
        Duration::from_millis(slot * self.stagger_step_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn whale_threshold_wei(&self) -> Result<U256> {
        parse_ether(&self.whale_threshold_eth)
            .with_context(|| format!("Invalid whale_threshold_eth: {}", self.whale_threshold_eth))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Busy-flag hold time after an attempt completes
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    /// Baseline priority-fee inflation (percent)
    #[serde(default = "default_priority_bribe")]
    pub priority_bribe_percent: u64,
    /// Escalated priority-fee inflation (percent)
    #[serde(default = "default_max_bribe")]
    pub max_bribe_percent: u64,
    /// Net profit (native units) above which the escalated tier applies
    #[serde(default = "default_escalation_cutoff")]
    pub escalation_cutoff_eth: String,
    #[serde(default = "default_broadcast_timeout")]
    pub broadcast_timeout_ms: u64,
}

fn default_gas_limit() -> u64 { 1_400_000 }
fn default_cooldown() -> u64 { 15_000 }
fn default_priority_bribe() -> u64 { 25 }
fn default_max_bribe() -> u64 { 99 }
fn default_escalation_cutoff() -> String { "0.1".to_string() }
fn default_broadcast_timeout() -> u64 { 2_000 }

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            cooldown_ms: default_cooldown(),
            priority_bribe_percent: default_priority_bribe(),
            max_bribe_percent: default_max_bribe(),
            escalation_cutoff_eth: default_escalation_cutoff(),
            broadcast_timeout_ms: default_broadcast_timeout(),
        }
    }
}

impl ExecutionSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn escalation_cutoff_wei(&self) -> Result<U256> {
        parse_ether(&self.escalation_cutoff_eth)
            .with_context(|| format!("Invalid escalation_cutoff_eth: {}", self.escalation_cutoff_eth))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorySettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_advisory_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_poll_interval() -> u64 { 300_000 }
fn default_model() -> String { "gemini-2.5-flash-preview-09-2025".to_string() }
fn default_advisory_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_request_timeout() -> u64 { 10_000 }

impl Default for AdvisorySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            model: default_model(),
            endpoint: default_advisory_endpoint(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl AdvisorySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
