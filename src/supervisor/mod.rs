//! Supervisor
//!
//! Purpose:
//!     Owns the worker pool: pre-flight payout check, staggered initial
//!     spawn, unconditional replacement of any worker that exits, and the
//!     signal bus hub every worker is attached to.
//!
//! Created: 2026-10-19
//!
//! Architecture:
//!     - One keep-alive task per slot. The slot's ordinal never changes, so a
//!       replacement inherits the same chain and role.
//!     - Worker exits are replaced immediately. There is no backoff and no
//!       crash-loop limit; the restart counter in `stats` is the only brake
//!       an operator gets.
//!     - A heartbeat task logs pool health on a fixed interval.

pub mod process;
pub mod stats;

pub use process::ProcessLauncher;
pub use stats::{StatsSnapshot, SupervisorStats};

use crate::bus::SignalBus;
use crate::config::SupervisorSettings;
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{error, info, warn};

/// Payout destinations that abort startup (compared lowercase)
pub const BENEFICIARY_DENYLIST: [&str; 2] = [
    "0x4b8251e7c80f910305bb81547e301dcb8a596918",
    "0x35c3ecffbbdd942a8dba7587424b58f74d6d6d15",
];

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("payout destination {0} is on the denylist")]
    DeniedBeneficiary(String),
    #[error("failed to launch worker {ordinal}: {source}")]
    Launch {
        ordinal: u64,
        #[source]
        source: io::Error,
    },
}

pub fn check_beneficiary(beneficiary: &str) -> Result<(), SupervisorError> {
    let lower = beneficiary.trim().to_lowercase();
    if BENEFICIARY_DENYLIST.contains(&lower.as_str()) {
        return Err(SupervisorError::DeniedBeneficiary(beneficiary.to_string()));
    }
    Ok(())
}

/// How a worker incarnation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// None when killed by a signal
    pub code: Option<i32>,
}

/// Starts one worker attached to the bus and resolves when it exits.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    async fn run_worker(&self, ordinal: u64, bus: SignalBus) -> Result<WorkerExit, SupervisorError>;
}

/// min(available cores, cap), at least one
pub fn default_pool_size(cap: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(cap).max(1)
}

pub struct Supervisor {
    launcher: Arc<dyn WorkerLauncher>,
    bus: SignalBus,
    stats: Arc<SupervisorStats>,
    settings: SupervisorSettings,
    pool_size: usize,
}

impl Supervisor {
    /// Fails on a denylisted beneficiary before anything is launched.
    pub fn new(
        beneficiary: &str,
        settings: SupervisorSettings,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, SupervisorError> {
        check_beneficiary(beneficiary)?;

        Ok(Self {
            launcher,
            bus: SignalBus::default(),
            stats: Arc::new(SupervisorStats::new(settings.restart_window())),
            pool_size: default_pool_size(settings.max_workers),
            settings,
        })
    }

    #[cfg(test)]
    fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.stats)
    }

    /// Run the pool until `shutdown` resolves. Dropping the slot tasks drops
    /// the child handles, which kills the worker processes.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Launching {} worker cores", self.pool_size);

        let mut slots = JoinSet::new();
        slots.spawn(heartbeat(Arc::clone(&self.stats), self.bus.clone(), self.settings.clone()));

        let spawn_all = async {
            for ordinal in 0..self.pool_size as u64 {
                if ordinal > 0 {
                    sleep(self.settings.boot_delay()).await;
                }
                slots.spawn(keep_alive(
                    ordinal,
                    Arc::clone(&self.launcher),
                    self.bus.clone(),
                    Arc::clone(&self.stats),
                    self.settings.clone(),
                ));
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            _ = spawn_all => {}
            _ = shutdown => {
                info!("Shutdown requested, stopping {} workers", self.stats.live_workers());
            }
        }

        slots.shutdown().await;
    }
}

async fn keep_alive(
    ordinal: u64,
    launcher: Arc<dyn WorkerLauncher>,
    bus: SignalBus,
    stats: Arc<SupervisorStats>,
    settings: SupervisorSettings,
) {
    loop {
        stats.worker_started(ordinal, Instant::now());
        let result = launcher.run_worker(ordinal, bus.clone()).await;
        let lived = stats.worker_exited(ordinal, Instant::now());

        match result {
            Ok(exit) => {
                warn!(
                    "Worker {} exited (code {:?}, up {:?}), respawning",
                    ordinal,
                    exit.code,
                    lived.unwrap_or_default()
                );
            }
            Err(e) => {
                // Nothing ran, so an immediate retry would spin
                error!("{}", e);
                sleep(settings.boot_delay()).await;
            }
        }
    }
}

async fn heartbeat(stats: Arc<SupervisorStats>, bus: SignalBus, settings: SupervisorSettings) {
    let period = settings.heartbeat_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let snap = stats.snapshot(Instant::now());
        info!(
            "Pool heartbeat: {} live | {} on bus | {} restarts total | {} in last {}s",
            snap.live_workers,
            bus.subscriber_count(),
            snap.total_restarts,
            snap.restarts_in_window,
            settings.restart_window_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusMessage;
    use alloy::primitives::Address;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn fast_settings() -> SupervisorSettings {
        SupervisorSettings {
            max_workers: 4,
            worker_boot_delay_ms: 0,
            heartbeat_interval_ms: 60_000,
            restart_window_secs: 60,
        }
    }

    /// Ordinal 0 exits immediately `crashes` times, then stays up.
    /// Every other ordinal stays up.
    struct FlakyLauncher {
        crashes: usize,
        launches: DashMap<u64, usize>,
    }

    #[async_trait]
    impl WorkerLauncher for FlakyLauncher {
        async fn run_worker(&self, ordinal: u64, _bus: SignalBus) -> Result<WorkerExit, SupervisorError> {
            let n = {
                let mut entry = self.launches.entry(ordinal).or_insert(0);
                *entry += 1;
                *entry
            };
            if ordinal == 0 && n <= self.crashes {
                return Ok(WorkerExit { code: Some(1) });
            }
            std::future::pending().await
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn test_denylist_is_case_insensitive() {
        assert!(check_beneficiary("0x4B8251E7C80F910305BB81547E301DCB8A596918").is_err());
        assert!(check_beneficiary("0x35c3ecffbbdd942a8dba7587424b58f74d6d6d15").is_err());
        assert!(check_beneficiary("0x1111111111111111111111111111111111111111").is_ok());
        assert!(check_beneficiary("0xYOUR_OWN_PUBLIC_WALLET_ADDRESS").is_ok());
    }

    #[test]
    fn test_denylist_aborts_before_any_launch() {
        let launcher = Arc::new(FlakyLauncher {
            crashes: 0,
            launches: DashMap::new(),
        });
        let result = Supervisor::new(
            "0x4b8251e7c80f910305bb81547e301dcb8a596918",
            fast_settings(),
            launcher.clone(),
        );
        assert!(matches!(result, Err(SupervisorError::DeniedBeneficiary(_))));
        assert!(launcher.launches.is_empty());
    }

    #[test]
    fn test_pool_size_is_capped() {
        assert_eq!(default_pool_size(1), 1);
        assert!(default_pool_size(12) <= 12);
        assert!(default_pool_size(0) >= 1);
    }

    #[tokio::test]
    async fn test_exits_are_replaced_with_same_ordinal() {
        let launcher = Arc::new(FlakyLauncher {
            crashes: 3,
            launches: DashMap::new(),
        });
        let supervisor = Supervisor::new("0xabc", fast_settings(), launcher.clone())
            .unwrap()
            .with_pool_size(2);
        let stats = supervisor.stats();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(supervisor.run(async {
            let _ = stop_rx.await;
        }));

        wait_for(|| stats.total_restarts() == 3 && stats.live_workers() == 2).await;

        assert_eq!(launcher.launches.get(&0).map(|n| *n), Some(4));
        assert_eq!(launcher.launches.get(&1).map(|n| *n), Some(1));
        assert!(stats.is_live(0));

        let _ = stop_tx.send(());
        run.await.unwrap();
    }

    /// Ordinal 0 publishes one whale signal; every worker records what it hears.
    struct ChattyLauncher {
        heard: DashMap<u64, Vec<BusMessage>>,
        subscribed: AtomicUsize,
    }

    #[async_trait]
    impl WorkerLauncher for ChattyLauncher {
        async fn run_worker(&self, ordinal: u64, bus: SignalBus) -> Result<WorkerExit, SupervisorError> {
            let mut sub = bus.subscribe(ordinal);
            self.subscribed.fetch_add(1, Ordering::SeqCst);

            if ordinal == 0 {
                while self.subscribed.load(Ordering::SeqCst) < 3 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                bus.publish(0, BusMessage::WhaleSignal {
                    chain_id: 1,
                    target: Address::repeat_byte(0x77),
                });
            }

            while let Some(message) = sub.recv().await {
                self.heard.entry(ordinal).or_default().push(message);
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_signal_reaches_every_other_worker() {
        let launcher = Arc::new(ChattyLauncher {
            heard: DashMap::new(),
            subscribed: AtomicUsize::new(0),
        });
        let supervisor = Supervisor::new("0xabc", fast_settings(), launcher.clone())
            .unwrap()
            .with_pool_size(3);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(supervisor.run(async {
            let _ = stop_rx.await;
        }));

        wait_for(|| launcher.heard.get(&1).is_some() && launcher.heard.get(&2).is_some()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(launcher.heard.get(&0).is_none());
        assert_eq!(launcher.heard.get(&1).map(|v| v.len()), Some(1));
        assert_eq!(launcher.heard.get(&2).map(|v| v.len()), Some(1));

        let _ = stop_tx.send(());
        run.await.unwrap();
    }
}
