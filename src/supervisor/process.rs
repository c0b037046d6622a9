//! Worker processes: this same executable re-launched with `APEX_WORKER_ID`
//! set, bridged to the signal bus through its stdin (inbound) and stdout
//! (outbound). stderr is inherited so worker logs reach the console.

use super::{SupervisorError, WorkerExit, WorkerLauncher};
use crate::bus::codec::{read_messages, write_message};
use crate::bus::SignalBus;
use crate::config::WORKER_ID_ENV;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::Command;
use tracing::debug;

const RELAY_DRAIN: Duration = Duration::from_secs(1);

pub struct ProcessLauncher {
    exe: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(exe: PathBuf, args: Vec<OsString>) -> Self {
        Self { exe, args }
    }

    /// Re-launch the running binary with the same arguments.
    pub fn current() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, std::env::args_os().skip(1).collect()))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn run_worker(&self, ordinal: u64, bus: SignalBus) -> Result<WorkerExit, SupervisorError> {
        let launch_err = |source: io::Error| SupervisorError::Launch { ordinal, source };

        let mut child = Command::new(&self.exe)
            .args(&self.args)
            .env(WORKER_ID_ENV, ordinal.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_err)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_err(io::Error::other("worker stdin not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_err(io::Error::other("worker stdout not piped")))?;

        // bus → worker (everything not published by this worker)
        let inbound = bus.subscribe(ordinal).into_stream();
        let forward = tokio::spawn(async move {
            tokio::pin!(inbound);
            while let Some(message) = inbound.next().await {
                if let Err(e) = write_message(&mut stdin, &message).await {
                    debug!("Worker {} stdin closed: {}", ordinal, e);
                    break;
                }
            }
        });

        // worker → bus
        let relay_bus = bus.clone();
        let mut relay = tokio::spawn(async move {
            let outbound = read_messages(BufReader::new(stdout));
            tokio::pin!(outbound);
            while let Some(message) = outbound.next().await {
                debug!("Worker {} published {}", ordinal, message.kind());
                relay_bus.publish(ordinal, message);
            }
        });

        let status = child.wait().await;
        forward.abort();
        // let the relay drain whatever the worker wrote before exiting
        if tokio::time::timeout(RELAY_DRAIN, &mut relay).await.is_err() {
            relay.abort();
        }

        Ok(WorkerExit {
            code: status.ok().and_then(|s| s.code()),
        })
    }
}
