//! Progress substrate — thread-safe tracking for the two logical tasks
//! (scan, monitor). Mutation goes through a per-record lock; readers get a
//! value copy. Progress never blocks business logic: invalid state
//! transitions are dropped, not surfaced.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Longest ETA we will ever display.
const MAX_ETA_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Scan,
    Monitor,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Scan => write!(f, "SCAN"),
            TaskKind::Monitor => write!(f, "MONITOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStatus {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl ProgressStatus {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressStatus::Complete | ProgressStatus::Error | ProgressStatus::Cancelled
        )
    }

    /// Legal transitions within one batch. `reset_batch` re-enters Running
    /// from anywhere for the next batch.
    fn can_transition(self, to: ProgressStatus) -> bool {
        match (self, to) {
            (a, b) if a == b => true,
            (ProgressStatus::Idle, ProgressStatus::Running) => true,
            (ProgressStatus::Running, ProgressStatus::Idle) => true,
            (ProgressStatus::Running, to) if to.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::Idle => write!(f, "idle"),
            ProgressStatus::Running => write!(f, "running"),
            ProgressStatus::Complete => write!(f, "complete"),
            ProgressStatus::Error => write!(f, "error"),
            ProgressStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchInfo {
    pub current_batch: usize,
    pub total_batches: usize,
    pub current_batch_urls: usize,
    pub total_urls: usize,
    pub processed_urls: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorInfo {
    pub monitored_urls: usize,
    pub changed_urls: usize,
}

/// Value snapshot of one progress record.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub kind: TaskKind,
    pub status: ProgressStatus,
    pub current: u64,
    pub total: u64,
    pub stage: String,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub eta_secs: u64,
    pub batch: Option<BatchInfo>,
    pub monitor: Option<MonitorInfo>,
}

impl ProgressInfo {
    fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            status: ProgressStatus::Idle,
            current: 0,
            total: 0,
            stage: String::new(),
            message: String::new(),
            started_at: None,
            updated_at: Utc::now(),
            eta_secs: 0,
            batch: None,
            monitor: None,
        }
    }

    /// Displayed percentage: 0 when total is unknown, clamped to 100 when
    /// `current` overshoots `total`.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 * 100.0 / self.total as f64).min(100.0)
    }

    fn recompute_eta(&mut self, now: DateTime<Utc>) {
        self.eta_secs = 0;
        if self.status != ProgressStatus::Running || self.total == 0 || self.current == 0 {
            return;
        }
        let Some(started) = self.started_at else {
            return;
        };
        let elapsed = (now - started).num_milliseconds();
        if elapsed < 1000 {
            return;
        }
        let rate = self.current as f64 / (elapsed as f64 / 1000.0);
        let remaining = self.total.saturating_sub(self.current) as f64;
        self.eta_secs = ((remaining / rate) as u64).min(MAX_ETA_SECS);
    }
}

/// One logical task's progress, guarded by its own lock.
pub struct ProgressRecord {
    inner: RwLock<ProgressInfo>,
}

impl ProgressRecord {
    fn new(kind: TaskKind) -> Self {
        Self {
            inner: RwLock::new(ProgressInfo::new(kind)),
        }
    }

    pub fn info(&self) -> ProgressInfo {
        self.inner.read().expect("progress lock poisoned").clone()
    }

    /// Set counters and stage. The first non-zero `current` starts the clock
    /// and moves Idle to Running.
    pub fn update(&self, current: u64, total: u64, stage: &str, message: &str) {
        let now = Utc::now();
        let mut info = self.inner.write().expect("progress lock poisoned");
        info.current = current;
        info.total = total;
        info.stage = stage.to_string();
        info.message = message.to_string();
        info.updated_at = now;
        if current > 0 && info.started_at.is_none() {
            info.started_at = Some(now);
            if info.status == ProgressStatus::Idle {
                info.status = ProgressStatus::Running;
            }
        }
        info.recompute_eta(now);
    }

    /// Transition the status machine. Illegal transitions (anything out of a
    /// terminal state other than `reset_batch`) are dropped.
    pub fn set_status(&self, status: ProgressStatus, message: &str) {
        let mut info = self.inner.write().expect("progress lock poisoned");
        if !info.status.can_transition(status) {
            tracing::debug!(
                from = %info.status,
                to = %status,
                "Dropping illegal progress transition"
            );
            return;
        }
        info.status = status;
        info.message = message.to_string();
        info.updated_at = Utc::now();
        if status.is_terminal() {
            info.eta_secs = 0;
        }
    }

    pub fn update_batch(&self, current_batch: usize, total_batches: usize) {
        let mut info = self.inner.write().expect("progress lock poisoned");
        let batch = info.batch.get_or_insert_with(BatchInfo::default);
        batch.current_batch = current_batch;
        batch.total_batches = total_batches;
        info.updated_at = Utc::now();
    }

    pub fn update_batch_with_urls(
        &self,
        current_batch: usize,
        total_batches: usize,
        current_batch_urls: usize,
        total_urls: usize,
        processed_urls: usize,
    ) {
        let mut info = self.inner.write().expect("progress lock poisoned");
        let batch = info.batch.get_or_insert_with(BatchInfo::default);
        batch.current_batch = current_batch;
        batch.total_batches = total_batches;
        batch.current_batch_urls = current_batch_urls;
        batch.total_urls = total_urls;
        batch.processed_urls = processed_urls;
        info.updated_at = Utc::now();
    }

    /// Start a new batch: zero the counters, restart the clock, install the
    /// batch info, and force Running regardless of the previous state.
    pub fn reset_batch(&self, current_batch: usize, total_batches: usize, stage: &str, message: &str) {
        let now = Utc::now();
        let mut info = self.inner.write().expect("progress lock poisoned");
        info.current = 0;
        info.total = 0;
        info.stage = stage.to_string();
        info.message = message.to_string();
        info.started_at = Some(now);
        info.updated_at = now;
        info.eta_secs = 0;
        info.status = ProgressStatus::Running;
        info.batch = Some(BatchInfo {
            current_batch,
            total_batches,
            ..info.batch.unwrap_or_default()
        });
    }

    /// Workflow-step progress. While a batch is being tracked the batch
    /// counters stay authoritative and only stage/message move; without batch
    /// info this is a plain `update`.
    pub fn update_workflow(&self, current: u64, total: u64, stage: &str, message: &str) {
        {
            let mut info = self.inner.write().expect("progress lock poisoned");
            if info.batch.is_some() {
                info.stage = stage.to_string();
                info.message = message.to_string();
                info.updated_at = Utc::now();
                return;
            }
        }
        self.update(current, total, stage, message);
    }

    pub fn set_monitor_info(&self, monitored_urls: usize, changed_urls: usize) {
        let mut info = self.inner.write().expect("progress lock poisoned");
        info.monitor = Some(MonitorInfo {
            monitored_urls,
            changed_urls,
        });
        info.updated_at = Utc::now();
    }
}

/// The two process-wide progress records.
pub struct ProgressTracker {
    scan: ProgressRecord,
    monitor: ProgressRecord,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            scan: ProgressRecord::new(TaskKind::Scan),
            monitor: ProgressRecord::new(TaskKind::Monitor),
        }
    }

    pub fn scan(&self) -> &ProgressRecord {
        &self.scan
    }

    pub fn monitor(&self) -> &ProgressRecord {
        &self.monitor
    }
}
