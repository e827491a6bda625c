//! Storage availability probe
//!
//! A filesystem call against a hung mount (e.g. NFS) can block forever and
//! nothing in-process can interrupt it. The probe therefore runs the check
//! in a child process and kills it when the deadline passes; the child is
//! always reaped before the probe returns.
//!
//! The timeout budget is split evenly across attempts, so the whole probe
//! never takes longer than `timeout`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::constants::{DEFAULT_PROBE_ARGS, DEFAULT_PROBE_PROGRAM};
use crate::metrics::BreakerMetrics;

/// Decides whether a storage path is reachable right now
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// True if `path` could be checked within `timeout`, trying up to `retries` times
    async fn storage_available(&self, path: &str, timeout: Duration, retries: u32) -> bool;
}

fn default_program() -> String {
    DEFAULT_PROBE_PROGRAM.to_string()
}

fn default_args() -> Vec<String> {
    DEFAULT_PROBE_ARGS.iter().map(|arg| arg.to_string()).collect()
}

/// Command spawned for each probe attempt; the path is appended last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Program to run (default: `test`)
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the path (default: `["-e"]`)
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

/// Probe that checks the path in a killable child process
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe {
    config: ProbeConfig,
}

impl ProcessProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// One attempt: spawn, wait up to `timeout`, kill and reap on expiry
    async fn check_once(&self, path: &str, timeout: Duration) -> bool {
        let mut child = match Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    program = %self.config.program,
                    error = %e,
                    "Failed to spawn storage probe"
                );
                return false;
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!(path = %path, error = %e, "Storage probe wait failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    path = %path,
                    timeout_ms = timeout.as_millis() as u64,
                    "Storage probe timed out, killing it"
                );
                // kill() also waits, so the child never lingers as a zombie
                if let Err(e) = child.kill().await {
                    tracing::error!(path = %path, error = %e, "Failed to kill storage probe");
                }
                false
            }
        }
    }
}

#[async_trait]
impl AvailabilityProbe for ProcessProbe {
    async fn storage_available(&self, path: &str, timeout: Duration, retries: u32) -> bool {
        let attempts = retries.max(1);
        let per_attempt = timeout / attempts;
        let _timer = BreakerMetrics::global().start_probe_timer();

        for attempt in 1..=attempts {
            if self.check_once(path, per_attempt).await {
                BreakerMetrics::global().record_probe(true);
                return true;
            }
            tracing::debug!(path = %path, attempt, attempts, "Storage probe attempt failed");
        }

        BreakerMetrics::global().record_probe(false);
        false
    }
}
