//! In-memory mocks for the consumed contracts. Deterministic tests with no
//! network and no store; shared state sits behind plain mutexes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use monsterinc_common::types::{ProbeResult, UrlDiffResult, UrlStatus};
use monsterinc_common::MonsterIncError;

use crate::cancel::CancelToken;
use crate::traits::{Crawler, ProbeRunner, ProbeWriter, ReportRenderer, UrlDiffer};

/// A successful probe result for `url` with no status assigned yet.
pub fn make_probe(url: &str) -> ProbeResult {
    let mut probe = ProbeResult::new(url, "");
    probe.status_code = 200;
    probe
}

// ---------------------------------------------------------------------------
// MockCrawler
// ---------------------------------------------------------------------------

pub struct MockCrawler {
    /// URLs "found" during expansion, appended to the seeds on start.
    extra_urls: Vec<String>,
    root_targets: HashMap<String, String>,
    discovered: Mutex<Vec<String>>,
    fail_on_start: Mutex<Option<String>>,
    /// Cancel the run's token on the Nth `start` call (1-based).
    cancel_on_start_call: Option<usize>,
    reset_count: AtomicUsize,
    start_count: AtomicUsize,
    disable_count: AtomicUsize,
    shutdown_count: AtomicUsize,
}

impl MockCrawler {
    pub fn new(extra_urls: Vec<String>) -> Self {
        Self {
            extra_urls,
            root_targets: HashMap::new(),
            discovered: Mutex::new(Vec::new()),
            fail_on_start: Mutex::new(None),
            cancel_on_start_call: None,
            reset_count: AtomicUsize::new(0),
            start_count: AtomicUsize::new(0),
            disable_count: AtomicUsize::new(0),
            shutdown_count: AtomicUsize::new(0),
        }
    }

    pub fn with_root_targets(mut self, map: HashMap<String, String>) -> Self {
        self.root_targets = map;
        self
    }

    pub fn failing(message: &str) -> Self {
        let crawler = Self::new(Vec::new());
        *crawler.fail_on_start.lock().unwrap() = Some(message.to_string());
        crawler
    }

    /// Simulate an external cancellation arriving during the Nth crawl.
    pub fn cancel_on_start(mut self, nth_call: usize) -> Self {
        self.cancel_on_start_call = Some(nth_call);
        self
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn disable_count(&self) -> usize {
        self.disable_count.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdown_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Crawler for MockCrawler {
    fn reset_for_new_batch(&self, seed_urls: &[String]) {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        *self.discovered.lock().unwrap() = seed_urls.to_vec();
    }

    async fn start(&self, ctx: &CancelToken) -> Result<()> {
        let call = self.start_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cancel_on_start_call == Some(call) {
            ctx.cancel();
            return Err(MonsterIncError::Cancelled.into());
        }
        if let Some(message) = self.fail_on_start.lock().unwrap().clone() {
            return Err(anyhow::anyhow!(message));
        }
        ctx.ensure_active()?;

        let mut discovered = self.discovered.lock().unwrap();
        for url in &self.extra_urls {
            if !discovered.contains(url) {
                discovered.push(url.clone());
            }
        }
        Ok(())
    }

    fn discovered_urls(&self) -> Vec<String> {
        self.discovered.lock().unwrap().clone()
    }

    fn root_target_for(&self, url: &str) -> Option<String> {
        self.root_targets.get(url).cloned()
    }

    fn disable_auto_calibrate(&self) {
        self.disable_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop(&self) {}

    async fn ensure_full_shutdown(&self) {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockProbeRunner
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockProbeRunner {
    results: Mutex<Vec<ProbeResult>>,
    /// Fail `run` after producing results for this many URLs.
    fail_after: Option<usize>,
    fail_message: String,
    run_count: AtomicUsize,
}

impl MockProbeRunner {
    /// Probes every URL successfully with a 200.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Produces partial results for the first `after` URLs, then fails.
    pub fn failing_after(after: usize, message: &str) -> Self {
        Self {
            fail_after: Some(after),
            fail_message: message.to_string(),
            ..Self::default()
        }
    }

    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeRunner for MockProbeRunner {
    async fn run(&self, ctx: &CancelToken, urls: &[String]) -> Result<()> {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        let mut produced = Vec::new();
        for (index, url) in urls.iter().enumerate() {
            if ctx.is_cancelled() {
                *self.results.lock().unwrap() = produced;
                return Err(MonsterIncError::Cancelled.into());
            }
            if self.fail_after == Some(index) {
                *self.results.lock().unwrap() = produced;
                return Err(anyhow::anyhow!(self.fail_message.clone()));
            }
            produced.push(make_probe(url));
        }
        *self.results.lock().unwrap() = produced;
        Ok(())
    }

    fn results(&self) -> Vec<ProbeResult> {
        self.results.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// MockUrlDiffer
// ---------------------------------------------------------------------------

pub struct MockUrlDiffer {
    mode: DifferMode,
    call_count: AtomicUsize,
}

enum DifferMode {
    AllNew,
    FailingFor(String),
    ByPathMarker,
}

impl MockUrlDiffer {
    /// Classifies every probe as NEW.
    pub fn all_new() -> Self {
        Self {
            mode: DifferMode::AllNew,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Errors for one hostname, classifies the rest as NEW.
    pub fn failing_for(hostname: &str) -> Self {
        Self {
            mode: DifferMode::FailingFor(hostname.to_string()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Classifies by path marker (/new/, /changed/, /existing/, /old/).
    pub fn by_path_marker() -> Self {
        Self {
            mode: DifferMode::ByPathMarker,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn classify(&self, probe: &ProbeResult) -> UrlStatus {
        match self.mode {
            DifferMode::ByPathMarker => {
                if probe.input_url.contains("/changed/") {
                    UrlStatus::Changed
                } else if probe.input_url.contains("/existing/") {
                    UrlStatus::Existing
                } else if probe.input_url.contains("/old/") {
                    UrlStatus::Old
                } else {
                    UrlStatus::New
                }
            }
            _ => UrlStatus::New,
        }
    }
}

#[async_trait]
impl UrlDiffer for MockUrlDiffer {
    async fn differentiate(
        &self,
        probes: &[ProbeResult],
        hostname: &str,
        _session_id: &str,
    ) -> Result<UrlDiffResult> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let DifferMode::FailingFor(failing) = &self.mode {
            if failing == hostname {
                return Err(anyhow::anyhow!("no historical data for {hostname}"));
            }
        }

        let mut diff = UrlDiffResult::default();
        for probe in probes {
            let status = self.classify(probe);
            match status {
                UrlStatus::New => diff.new += 1,
                UrlStatus::Existing => diff.existing += 1,
                UrlStatus::Old => diff.old += 1,
                UrlStatus::Changed => diff.changed += 1,
            }
            let mut annotated = probe.clone();
            annotated.url_status = Some(status);
            diff.results.push(annotated);
        }
        Ok(diff)
    }
}

// ---------------------------------------------------------------------------
// MockProbeWriter
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockProbeWriter {
    writes: Mutex<Vec<(String, String, usize)>>,
    fail: bool,
}

impl MockProbeWriter {
    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Recorded `(session_id, hostname, probe_count)` triples.
    pub fn writes(&self) -> Vec<(String, String, usize)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeWriter for MockProbeWriter {
    async fn write(
        &self,
        ctx: &CancelToken,
        probes: &[ProbeResult],
        session_id: &str,
        hostname: &str,
    ) -> Result<()> {
        ctx.ensure_active()?;
        if self.fail {
            return Err(MonsterIncError::Store("disk full".to_string()).into());
        }
        self.writes
            .lock()
            .unwrap()
            .push((session_id.to_string(), hostname.to_string(), probes.len()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReportRenderer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockReportRenderer {
    generated: Mutex<Vec<(String, usize)>>,
    fail: bool,
}

impl MockReportRenderer {
    pub fn failing() -> Self {
        Self {
            generated: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn generate_count(&self) -> usize {
        self.generated.lock().unwrap().len()
    }

    /// Recorded `(session_id, probe_count)` pairs.
    pub fn generated(&self) -> Vec<(String, usize)> {
        self.generated.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportRenderer for MockReportRenderer {
    async fn generate(
        &self,
        probes: &[ProbeResult],
        _diffs: &HashMap<String, UrlDiffResult>,
        session_id: &str,
    ) -> Result<Vec<PathBuf>> {
        if self.fail {
            return Err(MonsterIncError::Report("template error".to_string()).into());
        }
        self.generated
            .lock()
            .unwrap()
            .push((session_id.to_string(), probes.len()));
        Ok(vec![PathBuf::from(format!("reports/{session_id}.html"))])
    }
}
