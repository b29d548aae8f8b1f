//! Progress display — one background task formats the two progress records
//! into a single line and emits it through tracing. Wakes on a ticker or on
//! an explicit trigger; redundant triggers are dropped while one is pending.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use monsterinc_common::config::ProgressDisplayConfig;

use super::tracker::{ProgressInfo, ProgressStatus, ProgressTracker};

pub struct ProgressDisplay {
    trigger_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    /// Spawn the display task. A disabled config yields an inert handle.
    pub fn spawn(tracker: Arc<ProgressTracker>, config: &ProgressDisplayConfig) -> Self {
        if !config.enabled {
            return Self {
                trigger_tx: None,
                handle: None,
            };
        }

        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let interval_secs = config.interval_secs.max(1);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_line = String::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    received = trigger_rx.recv() => {
                        if received.is_none() {
                            break;
                        }
                    }
                }
                let line = format_line(&tracker.scan().info(), &tracker.monitor().info());
                if line != last_line {
                    info!(target: "monsterinc::progress", "{line}");
                    last_line = line;
                }
            }
        });

        Self {
            trigger_tx: Some(trigger_tx),
            handle: Some(handle),
        }
    }

    /// Request an immediate refresh. Never blocks: if a trigger is already
    /// pending this one is dropped.
    pub fn trigger(&self) {
        if let Some(tx) = &self.trigger_tx {
            let _ = tx.try_send(());
        }
    }

    /// Stop the display task and wait for it to drain.
    pub async fn shutdown(mut self) {
        self.trigger_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Render both records into the emitted line.
pub fn format_line(scan: &ProgressInfo, monitor: &ProgressInfo) -> String {
    format!("{} | {}", format_record(scan), format_record(monitor))
}

fn format_record(info: &ProgressInfo) -> String {
    let mut line = format!("{} {}", info.kind, info.status);

    if info.status == ProgressStatus::Idle && info.stage.is_empty() {
        return line;
    }
    if !info.stage.is_empty() {
        line.push_str(&format!(" [{}]", info.stage));
    }
    if info.total > 0 {
        line.push_str(&format!(
            " {:.0}% ({}/{})",
            info.percent(),
            info.current,
            info.total
        ));
    }
    if let Some(batch) = &info.batch {
        if batch.total_batches > 0 {
            line.push_str(&format!(" batch {}/{}", batch.current_batch, batch.total_batches));
        }
    }
    if let Some(monitor) = &info.monitor {
        line.push_str(&format!(
            " urls {}/{} changed",
            monitor.changed_urls, monitor.monitored_urls
        ));
    }
    if info.eta_secs > 0 {
        line.push_str(&format!(" eta {}", format_secs(info.eta_secs)));
    }
    if !info.message.is_empty() {
        line.push_str(&format!(" — {}", info.message));
    }
    line
}

fn format_secs(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
