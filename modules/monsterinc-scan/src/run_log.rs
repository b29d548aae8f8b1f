//! Scan run log — persisted JSON timeline of every orchestrator run.
//!
//! Each run produces a single `{DATA_DIR}/scan-runs/{session_id}.json` file
//! containing an ordered list of events with timestamps. Saving is best
//! effort; a failed save never fails the scan.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use monsterinc_common::types::{ScanStatus, ScanSummary};

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

pub struct RunLog {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TargetsLoaded {
        source: String,
        count: usize,
    },
    BatchStarted {
        batch: usize,
        total_batches: usize,
        urls: usize,
    },
    ProbeCompleted {
        total: u32,
        successful: u32,
        failed: u32,
    },
    BatchCompleted {
        batch: usize,
        status: ScanStatus,
        duration_ms: u64,
    },
    MemoryCheckpoint {
        rss_mb: u64,
    },
    ReportWritten {
        paths: Vec<PathBuf>,
    },
    RunInterrupted {
        at_batch: usize,
    },
}

impl RunLog {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, summary: &ScanSummary) -> Result<PathBuf> {
        let dir = data_dir().join("scan-runs");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.session_id));
        let output = SerializedRunLog {
            session_id: &self.session_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Scan run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    session_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    summary: &'a ScanSummary,
    events: &'a [RunEvent],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_sequenced_and_saved_as_json() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path());

        let mut log = RunLog::new("scan-test-1".to_string());
        log.log(EventKind::TargetsLoaded {
            source: "inline list (2 URLs)".to_string(),
            count: 2,
        });
        log.log(EventKind::BatchStarted {
            batch: 1,
            total_batches: 1,
            urls: 2,
        });
        log.log(EventKind::BatchCompleted {
            batch: 1,
            status: ScanStatus::Completed,
            duration_ms: 12,
        });

        let summary = ScanSummary::new("scan-test-1");
        let path = log.save(&summary).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();

        let events = parsed["events"].as_array().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["seq"], 0);
        assert_eq!(events[0]["type"], "targets_loaded");
        assert_eq!(events[2]["type"], "batch_completed");
        assert_eq!(parsed["summary"]["session_id"], "scan-test-1");

        std::env::remove_var("DATA_DIR");
    }
}
