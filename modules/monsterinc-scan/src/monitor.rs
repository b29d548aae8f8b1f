//! Resource monitor — advisory sampling of process memory on a ticker and
//! at batch boundaries. It only logs; auto-shutdown is the process entry's
//! decision, never the scan core's.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use monsterinc_common::config::ResourceLimiterConfig;

use crate::cancel::CancelToken;

pub struct ResourceMonitor {
    config: ResourceLimiterConfig,
}

impl ResourceMonitor {
    pub fn new(config: ResourceLimiterConfig) -> Self {
        Self { config }
    }

    /// Current process RSS in MB. 0 when the platform gives no answer.
    pub fn memory_mb() -> u64 {
        read_rss_kb().map(|kb| kb / 1024).unwrap_or(0)
    }

    /// Log a memory snapshot, warning once past the configured threshold.
    pub fn log_memory(&self, context: &str) -> u64 {
        let rss_mb = Self::memory_mb();
        let limit = self.config.max_memory_mb;
        if limit > 0 && rss_mb as f64 >= limit as f64 * self.config.memory_threshold {
            warn!(context, rss_mb, limit_mb = limit, "Memory usage near the configured limit");
        } else {
            info!(context, rss_mb, "Memory snapshot");
        }
        rss_mb
    }

    /// Spawn the periodic sampler; stops when the scan is cancelled.
    pub fn spawn(&self, ctx: CancelToken) -> JoinHandle<()> {
        let monitor = ResourceMonitor {
            config: self.config.clone(),
        };
        let interval_secs = self.config.check_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if ctx.is_cancelled() {
                    break;
                }
                monitor.log_memory("periodic");
            }
        })
    }
}

/// VmRSS from /proc/self/status, in kB.
fn read_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}
