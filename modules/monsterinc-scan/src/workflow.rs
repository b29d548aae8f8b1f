//! Per-batch scan workflow: preprocess → crawl → probe → diff/store →
//! complete, with step progress reported as x/5 and cancellation honoured
//! between and inside steps. The workflow never renders reports or sends
//! notifications; those belong to the orchestrator and its callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use monsterinc_common::config::MonsterIncConfig;
use monsterinc_common::types::{ProbeResult, ScanStatus, ScanSummary, UrlDiffResult};
use monsterinc_common::MonsterIncError;

use crate::cancel::CancelToken;
use crate::diffstore::DiffStoreProcessor;
use crate::managers::{CrawlerManager, ProbeManager};
use crate::preprocess::UrlPreprocessor;
use crate::progress::{ProgressStatus, ProgressTracker};

const WORKFLOW_STEPS: u64 = 5;

/// What one batch produced. `error` is set for hard failures (including
/// cancellation); partial results are always retained.
pub struct WorkflowOutcome {
    pub probes: Vec<ProbeResult>,
    pub diffs: HashMap<String, UrlDiffResult>,
    pub summary: ScanSummary,
    pub error: Option<anyhow::Error>,
}

pub struct ScanWorkflow {
    config: MonsterIncConfig,
    preprocessor: Arc<UrlPreprocessor>,
    crawler_manager: Arc<CrawlerManager>,
    probe_manager: Arc<ProbeManager>,
    diffstore: Arc<DiffStoreProcessor>,
    progress: Arc<ProgressTracker>,
}

impl ScanWorkflow {
    pub fn new(
        config: MonsterIncConfig,
        preprocessor: Arc<UrlPreprocessor>,
        crawler_manager: Arc<CrawlerManager>,
        probe_manager: Arc<ProbeManager>,
        diffstore: Arc<DiffStoreProcessor>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            config,
            preprocessor,
            crawler_manager,
            probe_manager,
            diffstore,
            progress,
        }
    }

    /// Run the five steps over one batch of seed URLs.
    pub async fn execute(
        &self,
        ctx: &CancelToken,
        seed_urls: &[String],
        session_id: &str,
    ) -> WorkflowOutcome {
        let started = Instant::now();
        let mut summary = ScanSummary::new(session_id);
        summary.targets = seed_urls.to_vec();
        summary.total_targets = seed_urls.len();

        // Step 1: preprocess.
        self.step(1, "preprocess", &format!("{} seed URLs", seed_urls.len()));
        let (processed, pre_stats) = self.preprocessor.process(ctx, seed_urls).await;
        info!(session_id, %pre_stats, "Preprocessing complete");

        if processed.is_empty() {
            return if ctx.is_cancelled() {
                self.finish_interrupted(summary, started, "preprocess")
            } else {
                summary.status = ScanStatus::Failed;
                summary
                    .error_messages
                    .push("no URLs remained after preprocessing".to_string());
                summary.duration_ms = started.elapsed().as_millis() as u64;
                self.progress.scan().set_status(ProgressStatus::Error, "no URLs to scan");
                WorkflowOutcome {
                    probes: Vec::new(),
                    diffs: HashMap::new(),
                    summary,
                    error: Some(MonsterIncError::NoUrlsAfterPreprocess.into()),
                }
            };
        }

        // Step 2: crawl.
        self.step(2, "crawl", &format!("{} URLs after preprocessing", processed.len()));
        let (discovered, crawl_err) = self
            .crawler_manager
            .execute_batch(ctx, &self.config.crawler, &processed, session_id)
            .await;
        if let Some(e) = crawl_err {
            if MonsterIncError::is_cancellation(&e) {
                let mut outcome = self.finish_interrupted(summary, started, "crawl");
                outcome.error = Some(e);
                return outcome;
            }
            summary.status = ScanStatus::Failed;
            summary.error_messages.push(format!("crawler failed: {e:#}"));
            summary.duration_ms = started.elapsed().as_millis() as u64;
            self.progress.scan().set_status(ProgressStatus::Error, "crawler failed");
            return WorkflowOutcome {
                probes: Vec::new(),
                diffs: HashMap::new(),
                summary,
                error: Some(MonsterIncError::stage("crawler", format!("{e:#}")).into()),
            };
        }

        // Step 3: probe, attributing each result to its originating seed.
        self.step(3, "probe", &format!("{} discovered URLs", discovered.len()));
        let root_target = processed.first().cloned().unwrap_or_default();
        let crawler = self.crawler_manager.get_or_create(&self.config.crawler).await.ok();
        let lookup = move |url: &str| {
            crawler.as_ref().and_then(|c| c.root_target_for(url))
        };
        let (mut probes, probe_err) = self
            .probe_manager
            .execute_batch(
                ctx,
                &self.config.probe,
                &root_target,
                &discovered,
                &lookup,
                session_id,
            )
            .await;

        summary.probe_stats.total_probed = probes.len() as u32;
        summary.probe_stats.successful = probes.iter().filter(|p| p.is_success()).count() as u32;
        summary.probe_stats.failed =
            summary.probe_stats.total_probed - summary.probe_stats.successful;
        summary.probe_stats.discoverable = discovered.len() as u32;

        let mut probe_failure: Option<anyhow::Error> = None;
        if let Some(e) = probe_err {
            if MonsterIncError::is_cancellation(&e) {
                let mut outcome = self.finish_interrupted(summary, started, "probe");
                outcome.probes = probes;
                outcome.error = Some(e);
                return outcome;
            }
            summary.error_messages.push(format!("probing failed: {e:#}"));
            probe_failure = Some(e);
        }

        // Step 4: diff and persist. Failures here are logged and swallowed;
        // the batch keeps the other steps' results.
        self.step(4, "diff-store", &format!("{} probe results", probes.len()));
        let (ds_outcome, ds_err) = self.diffstore.process(ctx, &mut probes, session_id).await;
        if let Some(e) = ds_err {
            if MonsterIncError::is_cancellation(&e) {
                let mut outcome = self.finish_interrupted(summary, started, "diff-store");
                outcome.probes = probes;
                outcome.diffs = ds_outcome.diffs;
                outcome.error = Some(e);
                return outcome;
            }
            warn!(session_id, error = %e, "Diff/store failed, keeping scan results");
        }
        for diff in ds_outcome.diffs.values() {
            summary.diff_stats.merge(&diff.stats());
        }

        // Step 5: complete.
        self.step(5, "complete", "");
        summary.duration_ms = started.elapsed().as_millis() as u64;
        if probe_failure.is_some() {
            summary.status = ScanStatus::Failed;
            self.progress.scan().set_status(ProgressStatus::Error, "probing failed");
        } else {
            summary.status = ScanStatus::Completed;
            self.progress.scan().set_status(ProgressStatus::Complete, "batch complete");
        }

        WorkflowOutcome {
            probes,
            diffs: ds_outcome.diffs,
            summary,
            error: probe_failure
                .map(|e| MonsterIncError::stage("probe", format!("{e:#}")).into()),
        }
    }

    fn step(&self, number: u64, stage: &str, message: &str) {
        self.progress
            .scan()
            .update_workflow(number, WORKFLOW_STEPS, stage, message);
    }

    fn finish_interrupted(
        &self,
        mut summary: ScanSummary,
        started: Instant,
        stage: &str,
    ) -> WorkflowOutcome {
        summary.status = ScanStatus::Interrupted;
        summary
            .error_messages
            .push(format!("scan interrupted during {stage}"));
        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.progress
            .scan()
            .set_status(ProgressStatus::Cancelled, &format!("interrupted during {stage}"));
        WorkflowOutcome {
            probes: Vec::new(),
            diffs: HashMap::new(),
            summary,
            error: Some(MonsterIncError::Cancelled.into()),
        }
    }
}
