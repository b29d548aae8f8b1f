use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- URL diff status ---

/// Classification of a probed URL against the historical store for its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    New,
    Existing,
    Old,
    Changed,
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlStatus::New => write!(f, "new"),
            UrlStatus::Existing => write!(f, "existing"),
            UrlStatus::Old => write!(f, "old"),
            UrlStatus::Changed => write!(f, "changed"),
        }
    }
}

impl std::str::FromStr for UrlStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "existing" => Ok(Self::Existing),
            "old" => Ok(Self::Old),
            "changed" => Ok(Self::Changed),
            other => Err(format!("unknown UrlStatus: {other}")),
        }
    }
}

// --- Probe result ---

/// One record per probed URL. `url_status` is absent until the diff stage
/// annotates it; every persisted record carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The URL handed to the prober.
    pub input_url: String,
    /// Final URL after redirects. Equals `input_url` when none were followed.
    pub effective_url: String,
    pub status_code: u16,
    /// Selected response headers (content-type, server, etc.).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Body snapshot, captured only when the probe config asks for it.
    #[serde(default)]
    pub body: Option<String>,
    /// Technology detections reported by the prober.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// The seed URL that introduced this URL into the scan.
    pub root_target: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub url_status: Option<UrlStatus>,
}

impl ProbeResult {
    pub fn new(input_url: impl Into<String>, root_target: impl Into<String>) -> Self {
        let input_url = input_url.into();
        Self {
            effective_url: input_url.clone(),
            input_url,
            status_code: 0,
            headers: HashMap::new(),
            body: None,
            technologies: Vec::new(),
            root_target: root_target.into(),
            timestamp: Utc::now(),
            error: None,
            url_status: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// --- Diff result ---

/// Per-hostname diff outcome: counters plus the annotated probe results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlDiffResult {
    pub new: u32,
    pub existing: u32,
    pub old: u32,
    pub changed: u32,
    /// Probe results carrying their assigned `url_status`.
    pub results: Vec<ProbeResult>,
}

impl UrlDiffResult {
    pub fn stats(&self) -> DiffStats {
        DiffStats {
            new: self.new,
            existing: self.existing,
            old: self.old,
            changed: self.changed,
        }
    }
}

// --- Stats ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStats {
    pub total_probed: u32,
    pub successful: u32,
    pub failed: u32,
    /// URLs handed to the prober (discovered by crawl + seeds).
    pub discoverable: u32,
    pub retries: u32,
}

impl ProbeStats {
    /// Component-wise sum, used when aggregating batch summaries.
    pub fn merge(&mut self, other: &ProbeStats) {
        self.total_probed += other.total_probed;
        self.successful += other.successful;
        self.failed += other.failed;
        self.discoverable += other.discoverable;
        self.retries += other.retries;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub new: u32,
    pub existing: u32,
    pub old: u32,
    pub changed: u32,
}

impl DiffStats {
    pub fn merge(&mut self, other: &DiffStats) {
        self.new += other.new;
        self.existing += other.existing;
        self.old += other.old;
        self.changed += other.changed;
    }

    pub fn total(&self) -> u32 {
        self.new + self.existing + self.old + self.changed
    }
}

// --- Scan summary ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    PartialComplete,
    Failed,
    Interrupted,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStatus::Completed => write!(f, "completed"),
            ScanStatus::PartialComplete => write!(f, "partial_complete"),
            ScanStatus::Failed => write!(f, "failed"),
            ScanStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "partial_complete" => Ok(Self::PartialComplete),
            "failed" => Ok(Self::Failed),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(format!("unknown ScanStatus: {other}")),
        }
    }
}

/// Summary of one scan session (or one batch of it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub session_id: String,
    /// Where the targets came from (file path or "inline list").
    pub source: String,
    pub mode: String,
    pub targets: Vec<String>,
    pub total_targets: usize,
    pub probe_stats: ProbeStats,
    pub diff_stats: DiffStats,
    pub duration_ms: u64,
    pub status: ScanStatus,
    /// Human-readable one-liners, suitable for user notification.
    pub error_messages: Vec<String>,
    pub report_paths: Vec<PathBuf>,
}

impl ScanSummary {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            source: String::new(),
            mode: "onetime".to_string(),
            targets: Vec::new(),
            total_targets: 0,
            probe_stats: ProbeStats::default(),
            diff_stats: DiffStats::default(),
            duration_ms: 0,
            status: ScanStatus::Completed,
            error_messages: Vec::new(),
            report_paths: Vec::new(),
        }
    }

    /// Fold a batch summary into this aggregate: stats and durations sum,
    /// error messages concatenate. Status is assigned by the orchestrator's
    /// finalisation step, not here.
    pub fn aggregate(&mut self, batch: &ScanSummary) {
        self.probe_stats.merge(&batch.probe_stats);
        self.diff_stats.merge(&batch.diff_stats);
        self.duration_ms += batch.duration_ms;
        self.error_messages.extend(batch.error_messages.iter().cloned());
    }
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scan {} ===", self.status)?;
        writeln!(f, "Session:     {}", self.session_id)?;
        writeln!(f, "Targets:     {}", self.total_targets)?;
        writeln!(f, "Probed:      {}", self.probe_stats.total_probed)?;
        writeln!(f, "  successful: {}", self.probe_stats.successful)?;
        writeln!(f, "  failed:     {}", self.probe_stats.failed)?;
        writeln!(f, "Diff:        new={} existing={} old={} changed={}",
            self.diff_stats.new, self.diff_stats.existing,
            self.diff_stats.old, self.diff_stats.changed)?;
        writeln!(f, "Duration:    {}ms", self.duration_ms)?;
        for msg in &self.error_messages {
            writeln!(f, "Error:       {msg}")?;
        }
        Ok(())
    }
}
