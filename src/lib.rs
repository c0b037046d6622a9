//! Apex Sentinel Library
//!
//! Multi-chain whale watcher: a supervised pool of worker processes, each
//! bound to one (chain, role) pair, sharing detections and advisory signals
//! over a process-wide signal bus, with a profit-gated execution engine.
//!
//! Created: 2026-10-19

pub mod advisory;
pub mod bus;
pub mod config;
pub mod contracts;
pub mod detector;
pub mod execution;
pub mod rpc;
pub mod supervisor;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use bus::{BusMessage, SignalBus};
pub use config::{load_config, BotConfig, Tunables};
pub use supervisor::{Supervisor, SupervisorError};
pub use types::{Advice, ChainDescriptor, MarketPulse, Role, SubmissionMode, WorkerIdentity};
