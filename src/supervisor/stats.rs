//! Restart accounting for the worker pool.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view for the heartbeat log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub live_workers: usize,
    pub total_restarts: u64,
    pub restarts_in_window: usize,
}

pub struct SupervisorStats {
    /// ordinal → time the current incarnation started
    live: DashMap<u64, Instant>,
    total_restarts: AtomicU64,
    recent: Mutex<VecDeque<Instant>>,
    window: Duration,
}

impl SupervisorStats {
    pub fn new(window: Duration) -> Self {
        Self {
            live: DashMap::new(),
            total_restarts: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
            window,
        }
    }

    pub fn worker_started(&self, ordinal: u64, now: Instant) {
        self.live.insert(ordinal, now);
    }

    /// Record an exit. Returns how long that incarnation lived.
    pub fn worker_exited(&self, ordinal: u64, now: Instant) -> Option<Duration> {
        let started = self.live.remove(&ordinal).map(|(_, t)| t);

        self.total_restarts.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut recent) = self.recent.lock() {
            recent.push_back(now);
            Self::prune(&mut recent, now, self.window);
        }

        started.map(|t| now.saturating_duration_since(t))
    }

    pub fn total_restarts(&self) -> u64 {
        self.total_restarts.load(Ordering::Relaxed)
    }

    pub fn live_workers(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, ordinal: u64) -> bool {
        self.live.contains_key(&ordinal)
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        let restarts_in_window = match self.recent.lock() {
            Ok(mut recent) => {
                Self::prune(&mut recent, now, self.window);
                recent.len()
            }
            Err(_) => 0,
        };

        StatsSnapshot {
            live_workers: self.live_workers(),
            total_restarts: self.total_restarts(),
            restarts_in_window,
        }
    }

    fn prune(recent: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = recent.front() {
            if now.saturating_duration_since(*front) > window {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_counts_restart_and_lifetime() {
        let t0 = Instant::now();
        let stats = SupervisorStats::new(Duration::from_secs(60));

        stats.worker_started(0, t0);
        stats.worker_started(1, t0);
        assert_eq!(stats.live_workers(), 2);

        let lived = stats.worker_exited(0, t0 + Duration::from_secs(5));
        assert_eq!(lived, Some(Duration::from_secs(5)));
        assert_eq!(stats.total_restarts(), 1);
        assert!(!stats.is_live(0));
        assert!(stats.is_live(1));
    }

    #[test]
    fn test_rolling_window() {
        let t0 = Instant::now();
        let stats = SupervisorStats::new(Duration::from_secs(60));

        for i in 0..3 {
            stats.worker_started(i, t0);
            stats.worker_exited(i, t0 + Duration::from_secs(i * 10));
        }

        let snap = stats.snapshot(t0 + Duration::from_secs(30));
        assert_eq!(snap.restarts_in_window, 3);
        assert_eq!(snap.total_restarts, 3);

        // first two fall out of the window, total is unchanged
        let snap = stats.snapshot(t0 + Duration::from_secs(85));
        assert_eq!(snap.restarts_in_window, 1);
        assert_eq!(snap.total_restarts, 3);
        assert_eq!(snap.live_workers, 0);
    }

    #[test]
    fn test_exit_of_unknown_worker_still_counts() {
        let stats = SupervisorStats::new(Duration::from_secs(60));
        assert_eq!(stats.worker_exited(9, Instant::now()), None);
        assert_eq!(stats.total_restarts(), 1);
    }
}
