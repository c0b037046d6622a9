//! Profit Gate & Execution Engine
//!
//! Purpose:
//!     Decide whether a whale signal is worth a transaction and, if so, sign
//!     and submit it through the chain's fastest channel.
//!
//! Created: 2026-10-19
//!
//! Architecture:
//!     gate.rs    : cost estimate, advice-dependent margin, bribe tiers (pure)
//!     state.rs   : busy flag + cooldown (single flight per worker)
//!     submit.rs  : TxSubmitter: private bundle relay / public raw broadcast
//!     engine.rs  : StrikeEngine: the simulate → gate → sign → submit pipeline
//!
//! Notes:
//!     - The simulated return value is used as gross profit without any
//!       sanity check. A contract that returns an inflated number will pass
//!       the gate.
//!     - Only the first 32-byte word of the return is read as the profit;
//!       any trailing words are ignored.

pub mod engine;
pub mod gate;
pub mod state;
pub mod submit;

pub use engine::{StrikeEngine, StrikeError, StrikeOutcome};
pub use gate::{GateDecision, SafetyPolicy};
pub use state::{ExecutionState, Phase};
pub use submit::{channel_for, SubmitError, TxSubmitter};
