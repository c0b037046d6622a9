//! Worker process
//!
//! Purpose:
//!     One (chain, role) cell of the pool. Connects to its chain, runs the
//!     detector and/or advisory poller its role calls for, and executes on
//!     whale signals for its own chain.
//!
//! Created: 2026-10-19
//!
//! Lifecycle:
//!     stagger delay → credential check (fatal) → connect → event loop
//!     Any connection or stream failure ends the session; the worker waits
//!     the reconnect delay and rebuilds every connection. stdin EOF means the
//!     supervisor is gone and the worker exits.
//!
//! Event loop (single-threaded):
//!     - bus inbox (stdin):      MARKET_PULSE → replace pulse
//!                               WHALE_SIGNAL for this chain → strike if idle
//!     - detector (own signals): publish to bus + strike locally if idle
//!     - advisory tick:          poll in background, publish the pulse
//!     - finished strikes:       log outcome, start cooldown
//!
//! ```text
//!     Strikes in flight when a session ends run to completion before the
//!     reconnect delay; they only use the HTTP pool.
//! ```

use crate::advisory::{self, AdvisoryError, AdvisoryService, GeminiAdvisor};
use crate::bus::codec::{read_messages, write_message};
use crate::bus::BusMessage;
use crate::config::{credential_usable, BotConfig};
use crate::detector::Detector;
use crate::execution::{channel_for, ExecutionState, Phase, SafetyPolicy, StrikeEngine, StrikeError, StrikeOutcome};
use crate::rpc::{classify_error, ChainRpc, ChainStream, ErrorClass, FailoverClient, RpcError, WsStream};
use crate::types::{ChainDescriptor, MarketPulse, WorkerIdentity};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use futures::stream::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Detections buffered between the detector and the event loop
const DETECTION_BUFFER: usize = 64;

// ── Decision state ───────────────────────────────────────────────────

/// Everything the event loop decides with, minus the I/O.
#[derive(Debug)]
pub struct WorkerCore {
    identity: WorkerIdentity,
    execution: ExecutionState,
    pulse: MarketPulse,
    /// Mirrors `execution` for the detector's lookup gate
    phase: watch::Sender<Phase>,
}

impl WorkerCore {
    pub fn new(identity: WorkerIdentity, cooldown: Duration) -> Self {
        let execution = ExecutionState::new(cooldown);
        let (phase, _) = watch::channel(execution.phase());
        Self {
            identity,
            execution,
            pulse: MarketPulse::default(),
            phase,
        }
    }

    pub fn busy_gate(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn attempts(&self) -> u64 {
        self.execution.attempts()
    }

    pub fn pulse(&self) -> MarketPulse {
        self.pulse
    }

    pub fn is_busy(&self, now: Instant) -> bool {
        self.execution.is_busy(now)
    }

    /// Apply a bus message. Returns the target to strike when a whale signal
    /// is accepted (own chain, executing role, not busy); the busy flag is
    /// already claimed at that point.
    pub fn on_message(&mut self, message: BusMessage, now: Instant) -> Option<Address> {
        match message {
            BusMessage::MarketPulse { data } => {
                debug!("Market pulse: {} ({:.2})", data.advice, data.confidence);
                self.pulse = data;
                None
            }
            BusMessage::WhaleSignal { chain_id, target } => {
                if chain_id != self.identity.chain.chain_id || !self.identity.role.can_execute() {
                    return None;
                }
                if !self.execution.try_begin(now) {
                    return None;
                }
                self.phase.send_replace(self.execution.phase());
                Some(target)
            }
        }
    }

    pub fn strike_finished(&mut self, now: Instant) {
        self.execution.finish(now);
        self.phase.send_replace(self.execution.phase());
    }
}

// ── Entry point ──────────────────────────────────────────────────────

pub async fn run(ordinal: u64, config: BotConfig) -> Result<()> {
    let identity = WorkerIdentity::assign(ordinal, &config.chains).context("No chains configured")?;
    let span = info_span!(
        "worker",
        worker = ordinal,
        chain = %identity.chain.name,
        role = %identity.role
    );

    async move {
        sleep(config.tunables.worker.startup_delay(ordinal)).await;

        let Some(key) = config.private_key.as_deref().filter(|k| credential_usable(Some(k))) else {
            bail!("No usable signing key (PRIVATE_KEY / TREASURY_PRIVATE_KEY)");
        };
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Signing key is not a valid secp256k1 private key")?;

        let mut worker = Worker::new(identity, config, signer)?;
        let inbox = read_messages(BufReader::new(tokio::io::stdin()));
        tokio::pin!(inbox);
        let mut outbox = tokio::io::stdout();

        worker.run(&mut inbox, &mut outbox).await
    }
    .instrument(span)
    .await
}

// ── Worker ───────────────────────────────────────────────────────────

/// How a session ended without an error
enum SessionEnd {
    /// stdin closed: the supervisor is gone
    BusClosed,
}

struct Worker {
    core: WorkerCore,
    config: BotConfig,
    signer: PrivateKeySigner,
    policy: SafetyPolicy,
    whale_threshold: U256,
    advisor: Option<Arc<dyn AdvisoryService>>,
    strikes: JoinSet<(Address, Result<StrikeOutcome, StrikeError>)>,
    polls: JoinSet<Result<MarketPulse, AdvisoryError>>,
}

impl Worker {
    fn new(identity: WorkerIdentity, config: BotConfig, signer: PrivateKeySigner) -> Result<Self> {
        let policy = SafetyPolicy::from_settings(&config.tunables.execution)?;
        let whale_threshold = config.tunables.worker.whale_threshold_wei()?;

        let advisor: Option<Arc<dyn AdvisoryService>> = if identity.role.runs_advisory() {
            match GeminiAdvisor::new(config.advisory_api_key.as_deref(), &config.tunables.advisory) {
                Ok(a) => Some(Arc::new(a)),
                Err(e) => {
                    warn!("Advisory disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            core: WorkerCore::new(identity, config.tunables.execution.cooldown()),
            config,
            signer,
            policy,
            whale_threshold,
            advisor,
            strikes: JoinSet::new(),
            polls: JoinSet::new(),
        })
    }

    fn chain(&self) -> Arc<ChainDescriptor> {
        Arc::clone(&self.core.identity.chain)
    }

    async fn run<S, W>(&mut self, inbox: &mut S, outbox: &mut W) -> Result<()>
    where
        S: Stream<Item = BusMessage> + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let ended = match self.connect().await {
                Ok((rpc, stream)) => self.session(rpc, &stream, inbox, outbox).await,
                Err(e) => Err(e.into()),
            };

            self.settle_strikes().await;
            self.polls.shutdown().await;

            match ended {
                Ok(SessionEnd::BusClosed) => {
                    info!("Bus closed, worker exiting");
                    return Ok(());
                }
                Err(e) => {
                    report("Connection lost", &e);
                    sleep(self.config.tunables.worker.reconnect_delay()).await;
                }
            }
        }
    }

    async fn connect(&self) -> Result<(Arc<dyn ChainRpc>, WsStream), RpcError> {
        let chain = self.chain();
        let rpc = FailoverClient::from_urls(&chain.rpc_urls, self.config.tunables.worker.stall_timeout())?;
        let block = rpc.block_number().await?;

        let ws_url = chain
            .ws_url
            .as_deref()
            .ok_or_else(|| RpcError::Transport(format!("no streaming endpoint for {}", chain)))?;
        let stream = WsStream::connect(ws_url).await?;

        info!("Core synced at block {} ({} endpoints)", block, rpc.len());
        Ok((Arc::new(rpc), stream))
    }

    fn build_engine(&self, rpc: &Arc<dyn ChainRpc>) -> Result<Option<Arc<StrikeEngine>>> {
        if !self.core.identity.role.can_execute() {
            return Ok(None);
        }
        let chain = self.chain();
        let execution = &self.config.tunables.execution;
        let submitter = channel_for(&chain, Arc::clone(rpc), self.signer.clone(), execution.broadcast_timeout())?;

        Ok(Some(Arc::new(StrikeEngine::new(
            chain,
            Arc::clone(rpc),
            submitter,
            self.signer.clone(),
            self.config.executor_contract,
            self.policy.clone(),
            execution.gas_limit,
        ))))
    }

    async fn session<S, W>(
        &mut self,
        rpc: Arc<dyn ChainRpc>,
        stream: &dyn ChainStream,
        inbox: &mut S,
        outbox: &mut W,
    ) -> Result<SessionEnd>
    where
        S: Stream<Item = BusMessage> + Unpin,
        W: AsyncWrite + Unpin,
    {
        let engine = self.build_engine(&rpc)?;

        let (det_tx, mut det_rx) = mpsc::channel(DETECTION_BUFFER);
        let detector = self
            .core
            .identity
            .role
            .runs_detector()
            .then(|| {
                Detector::new(self.core.identity.chain.chain_id, Arc::clone(&rpc), self.whale_threshold)
                    .with_busy_gate(self.core.busy_gate())
            });
        let detect = async move {
            match detector {
                Some(d) => d.run(stream, det_tx).await,
                None => {
                    let _idle = det_tx;
                    std::future::pending().await
                }
            }
        };
        tokio::pin!(detect);

        let period = self.config.tunables.advisory.poll_interval();
        let mut advisory_tick = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                message = inbox.next() => match message {
                    Some(message) => {
                        if let Some(target) = self.core.on_message(message, Instant::now()) {
                            self.launch_strike(&engine, target);
                        }
                    }
                    None => return Ok(SessionEnd::BusClosed),
                },

                ended = &mut detect => {
                    ended?;
                    bail!("detector stopped");
                }

                Some(signal) = det_rx.recv() => {
                    if self.core.is_busy(Instant::now()) {
                        continue;
                    }
                    write_message(outbox, &signal).await.context("Bus write failed")?;
                    if let Some(target) = self.core.on_message(signal, Instant::now()) {
                        self.launch_strike(&engine, target);
                    }
                }

                _ = advisory_tick.tick(), if self.advisor.is_some() => {
                    self.launch_poll(&rpc);
                }

                Some(joined) = self.strikes.join_next(), if !self.strikes.is_empty() => {
                    self.strike_joined(joined);
                }

                Some(joined) = self.polls.join_next(), if !self.polls.is_empty() => {
                    match joined {
                        Ok(Ok(pulse)) => {
                            info!("Advisory: {} (confidence {:.2})", pulse.advice, pulse.confidence);
                            self.core.pulse = pulse;
                            write_message(outbox, &BusMessage::MarketPulse { data: pulse })
                                .await
                                .context("Bus write failed")?;
                        }
                        Ok(Err(e)) => debug!("Advisory cycle skipped: {}", e),
                        Err(e) => error!("Advisory task failed: {}", e),
                    }
                }
            }
        }
    }

    fn strike_joined(&mut self, joined: Result<(Address, Result<StrikeOutcome, StrikeError>), JoinError>) {
        self.core.strike_finished(Instant::now());
        match joined {
            Ok((target, Ok(outcome))) => log_outcome(target, &outcome),
            Ok((target, Err(e))) => report(&format!("Strike on {} aborted", target), &e),
            Err(e) => error!("Strike task failed: {}", e),
        }
    }

    /// Wait for every strike still in flight.
    async fn settle_strikes(&mut self) {
        while let Some(joined) = self.strikes.join_next().await {
            self.strike_joined(joined);
        }
    }

    fn launch_strike(&mut self, engine: &Option<Arc<StrikeEngine>>, target: Address) {
        let Some(engine) = engine.clone() else {
            self.core.strike_finished(Instant::now());
            return;
        };
        let pulse = self.core.pulse();
        debug!("Strike #{} on {} under {}", self.core.attempts(), target, pulse.advice);
        self.strikes.spawn(async move { (target, engine.strike(target, pulse).await) });
    }

    fn launch_poll(&mut self, rpc: &Arc<dyn ChainRpc>) {
        let Some(advisor) = self.advisor.clone() else {
            return;
        };
        if !self.polls.is_empty() {
            return;
        }
        let chain = self.chain();
        let rpc = Arc::clone(rpc);
        self.polls
            .spawn(async move { advisory::poll_once(&chain, rpc.as_ref(), advisor.as_ref()).await });
    }
}

fn log_outcome(target: Address, outcome: &StrikeOutcome) {
    match outcome {
        StrikeOutcome::Submitted { .. } => info!("Strike on {}: {}", target, outcome),
        _ => debug!("Strike on {}: {}", target, outcome),
    }
}

/// Log an operational error at the level its class deserves.
fn report(context: &str, err: &dyn Display) {
    let message = err.to_string();
    match classify_error(&message) {
        ErrorClass::Noise => debug!("{}: {}", context, message),
        ErrorClass::Auth => error!("{}: RPC authentication failed (401 Unauthorized): {}", context, message),
        ErrorClass::Unexpected => warn!("{}: {}", context, message),
    }
}
