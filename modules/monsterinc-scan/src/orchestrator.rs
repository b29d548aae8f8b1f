//! Batch orchestrator — loads targets, decides whether to batch, runs the
//! per-batch workflow serially, aggregates summaries, renders one merged
//! report, and finalises the session status. Batches are serialized on
//! purpose: memory pressure, not throughput, is the binding constraint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use monsterinc_common::config::MonsterIncConfig;
use monsterinc_common::types::{ProbeResult, ScanStatus, ScanSummary, UrlDiffResult};
use monsterinc_common::MonsterIncError;

use crate::cancel::CancelToken;
use crate::diffstore::DiffStoreProcessor;
use crate::managers::{CrawlerManager, ProbeManager};
use crate::monitor::ResourceMonitor;
use crate::preprocess::{PreprocessOptions, UrlPreprocessor};
use crate::progress::ProgressTracker;
use crate::run_log::{EventKind, RunLog};
use crate::sources::{self, TargetSource};
use crate::traits::{CrawlerFactory, ProbeRunnerFactory, ProbeWriter, ReportRenderer, UrlDiffer};
use crate::workflow::ScanWorkflow;

/// Concurrency clamps applied when batching engages.
const BATCHED_CRAWLER_CONCURRENCY: usize = 10;
const BATCHED_PROBE_THREADS: usize = 30;

#[derive(Debug)]
pub struct OrchestratorResult {
    pub summary: ScanSummary,
    pub report_paths: Vec<std::path::PathBuf>,
    pub batch_results: Vec<ScanSummary>,
    pub total_batches: usize,
    pub processed_batches: usize,
    pub used_batching: bool,
    /// 1-based index of the batch that was interrupted; 0 when the run
    /// completed the loop.
    pub interrupted_at_batch: usize,
}

pub struct ScanOrchestrator {
    config: MonsterIncConfig,
    crawler_manager: Arc<CrawlerManager>,
    probe_manager: Arc<ProbeManager>,
    differ: Arc<dyn UrlDiffer>,
    writer: Option<Arc<dyn ProbeWriter>>,
    reporter: Option<Arc<dyn ReportRenderer>>,
    progress: Arc<ProgressTracker>,
    monitor: ResourceMonitor,
}

impl ScanOrchestrator {
    pub fn new(
        config: MonsterIncConfig,
        crawler_factory: CrawlerFactory,
        probe_factory: ProbeRunnerFactory,
        differ: Arc<dyn UrlDiffer>,
        writer: Option<Arc<dyn ProbeWriter>>,
        reporter: Option<Arc<dyn ReportRenderer>>,
    ) -> Self {
        let progress = Arc::new(ProgressTracker::new());
        Self {
            crawler_manager: Arc::new(CrawlerManager::new(crawler_factory, progress.clone())),
            probe_manager: Arc::new(ProbeManager::new(probe_factory)),
            monitor: ResourceMonitor::new(config.resource_limiter.clone()),
            config,
            differ,
            writer,
            reporter,
            progress,
        }
    }

    /// The progress records this orchestrator feeds; hand it to a
    /// `ProgressDisplay` to get periodic formatted output.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    /// Run a full scan session over the given target source.
    pub async fn run(
        &self,
        ctx: &CancelToken,
        source: TargetSource,
        session_id: &str,
    ) -> Result<OrchestratorResult> {
        if session_id.trim().is_empty() {
            return Err(MonsterIncError::InvalidInput("empty session id".to_string()).into());
        }
        if source.is_empty() {
            return Err(MonsterIncError::InvalidInput("empty target source".to_string()).into());
        }
        self.config.log_summary();

        let targets = sources::load_targets(&source)?;
        if targets.is_empty() {
            return Err(MonsterIncError::NoTargets.into());
        }

        let mut run_log = RunLog::new(session_id.to_string());
        run_log.log(EventKind::TargetsLoaded {
            source: source.describe(),
            count: targets.len(),
        });

        // Batching decision and memory adaptation. The config is copied
        // before mutation: clamps never leak back into this orchestrator.
        let total_urls = targets.len();
        let used_batching = total_urls > self.config.scan_batch.threshold_size;
        let mut effective = self.config.clone();
        if used_batching {
            effective.crawler.max_concurrent_requests = effective
                .crawler
                .max_concurrent_requests
                .min(BATCHED_CRAWLER_CONCURRENCY);
            effective.probe.threads = effective.probe.threads.min(BATCHED_PROBE_THREADS);
            info!(
                crawler_concurrency = effective.crawler.max_concurrent_requests,
                probe_threads = effective.probe.threads,
                "Batching engaged, concurrency clamped for memory headroom"
            );
        }

        if used_batching && effective.scan_batch.max_concurrent_batch > 1 {
            warn!(
                requested = effective.scan_batch.max_concurrent_batch,
                "Concurrent batches are not supported; batches run serially"
            );
        }

        let batch_size = if used_batching {
            effective.scan_batch.batch_size.max(1)
        } else {
            total_urls
        };
        let batches: Vec<&[String]> = targets.chunks(batch_size).collect();
        let total_batches = batches.len();

        // One preprocessor per run: the fingerprint counts live exactly as
        // long as this invocation.
        let preprocessor = Arc::new(UrlPreprocessor::new(
            effective.crawler.url_normalization.clone(),
            effective.crawler.auto_calibrate.clone(),
            PreprocessOptions {
                max_workers: effective.crawler.max_concurrent_requests.max(1),
                ..PreprocessOptions::default()
            },
        ));
        let workflow = ScanWorkflow::new(
            effective.clone(),
            preprocessor.clone(),
            self.crawler_manager.clone(),
            self.probe_manager.clone(),
            Arc::new(DiffStoreProcessor::new(self.differ.clone(), self.writer.clone())),
            self.progress.clone(),
        );

        let monitor_ctx = CancelToken::new();
        let monitor_task = self.monitor.spawn(monitor_ctx.clone());

        let mut total = ScanSummary::new(session_id);
        total.source = source.describe();
        total.targets = targets.clone();
        total.total_targets = total_urls;

        let mut all_probes: Vec<ProbeResult> = Vec::new();
        let mut all_diffs: HashMap<String, UrlDiffResult> = HashMap::new();
        let mut batch_results: Vec<ScanSummary> = Vec::new();
        let mut processed = 0usize;
        let mut urls_done = 0usize;
        let mut interrupted_at = 0usize;
        let mut last_error: Option<anyhow::Error> = None;
        let run_started = Instant::now();

        for (index, batch) in batches.iter().enumerate() {
            if ctx.is_cancelled() {
                interrupted_at = processed + 1;
                run_log.log(EventKind::RunInterrupted { at_batch: interrupted_at });
                break;
            }

            let batch_number = index + 1;
            self.progress.scan().reset_batch(
                batch_number,
                total_batches,
                "batch-start",
                &format!("starting batch {batch_number}/{total_batches}"),
            );
            self.progress.scan().update_batch_with_urls(
                batch_number,
                total_batches,
                batch.len(),
                total_urls,
                urls_done,
            );
            run_log.log(EventKind::BatchStarted {
                batch: batch_number,
                total_batches,
                urls: batch.len(),
            });

            if effective.crawler.auto_calibrate.reset_between_batches {
                preprocessor.detector().reset();
            }

            let batch_session = if used_batching {
                format!("{session_id}-batch-{index}")
            } else {
                session_id.to_string()
            };
            let outcome = workflow.execute(ctx, batch, &batch_session).await;

            all_probes.extend(outcome.probes);
            for (host, diff) in outcome.diffs {
                let entry = all_diffs.entry(host).or_default();
                entry.new += diff.new;
                entry.existing += diff.existing;
                entry.old += diff.old;
                entry.changed += diff.changed;
                entry.results.extend(diff.results);
            }
            total.aggregate(&outcome.summary);
            run_log.log(EventKind::ProbeCompleted {
                total: outcome.summary.probe_stats.total_probed,
                successful: outcome.summary.probe_stats.successful,
                failed: outcome.summary.probe_stats.failed,
            });
            run_log.log(EventKind::BatchCompleted {
                batch: batch_number,
                status: outcome.summary.status,
                duration_ms: outcome.summary.duration_ms,
            });
            batch_results.push(outcome.summary);
            urls_done += batch.len();

            // Inter-batch checkpoint: batch-local buffers are dropped by the
            // moves above; record the resulting footprint before moving on.
            let rss_mb = self.monitor.log_memory("batch boundary");
            run_log.log(EventKind::MemoryCheckpoint { rss_mb });

            if let Some(e) = outcome.error {
                if MonsterIncError::is_cancellation(&e) {
                    interrupted_at = processed + 1;
                    run_log.log(EventKind::RunInterrupted { at_batch: interrupted_at });
                }
                last_error = Some(e);
                break;
            }
            processed += 1;
        }

        // The sampler sleeps between ticks; abort instead of waiting one out.
        monitor_ctx.cancel();
        monitor_task.abort();

        // Merged report — the one place the empty-report switch is consulted.
        let mut report_paths = Vec::new();
        let should_report = processed > 0
            && (!all_probes.is_empty() || effective.reporter.generate_empty_report);
        if should_report {
            // No lingering crawler request may write while reports render.
            self.crawler_manager.shutdown().await;
            if let Some(reporter) = &self.reporter {
                match reporter.generate(&all_probes, &all_diffs, session_id).await {
                    Ok(paths) => {
                        run_log.log(EventKind::ReportWritten { paths: paths.clone() });
                        report_paths = paths;
                    }
                    Err(e) => {
                        warn!(session_id, error = %e, "Report generation failed");
                    }
                }
            }
        }

        total.status = if interrupted_at > 0 && processed == 0 {
            ScanStatus::Failed
        } else if interrupted_at > 0 {
            ScanStatus::PartialComplete
        } else if last_error.is_some() {
            ScanStatus::Failed
        } else {
            ScanStatus::Completed
        };
        total.report_paths = report_paths.clone();

        if let Err(e) = run_log.save(&total) {
            warn!(session_id, error = %e, "Failed to save scan run log");
        }
        info!(
            session_id,
            status = %total.status,
            batches = total_batches,
            processed,
            wall_ms = run_started.elapsed().as_millis() as u64,
            "Scan session finished"
        );

        Ok(OrchestratorResult {
            summary: total,
            report_paths,
            batch_results,
            total_batches,
            processed_batches: processed,
            used_batching,
            interrupted_at_batch: interrupted_at,
        })
    }

    /// Release the cross-batch singletons. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.crawler_manager.shutdown().await;
        self.probe_manager.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use monsterinc_common::config::{ProbeConfig, ScanBatchConfig};

    use crate::testing::{
        MockCrawler, MockProbeRunner, MockProbeWriter, MockReportRenderer, MockUrlDiffer,
    };
    use crate::traits::{Crawler, ProbeRunner};

    struct Fixture {
        orchestrator: ScanOrchestrator,
        writer: Arc<MockProbeWriter>,
        reporter: Arc<MockReportRenderer>,
        probe_configs: Arc<Mutex<Vec<ProbeConfig>>>,
    }

    fn fixture(config: MonsterIncConfig, crawler: Arc<MockCrawler>) -> Fixture {
        let crawler_factory: CrawlerFactory = {
            let crawler = crawler.clone();
            Arc::new(move |_c| Ok(crawler.clone() as Arc<dyn Crawler>))
        };
        let probe_configs = Arc::new(Mutex::new(Vec::new()));
        let probe_factory: ProbeRunnerFactory = {
            let seen = probe_configs.clone();
            Arc::new(move |config, _root| {
                seen.lock().unwrap().push(config.clone());
                Ok(Arc::new(MockProbeRunner::ok()) as Arc<dyn ProbeRunner>)
            })
        };
        let writer = Arc::new(MockProbeWriter::default());
        let reporter = Arc::new(MockReportRenderer::default());
        let orchestrator = ScanOrchestrator::new(
            config,
            crawler_factory,
            probe_factory,
            Arc::new(MockUrlDiffer::all_new()),
            Some(writer.clone() as Arc<dyn ProbeWriter>),
            Some(reporter.clone() as Arc<dyn ReportRenderer>),
        );
        Fixture {
            orchestrator,
            writer,
            reporter,
            probe_configs,
        }
    }

    fn batched_config() -> MonsterIncConfig {
        MonsterIncConfig {
            scan_batch: ScanBatchConfig {
                threshold_size: 2,
                batch_size: 3,
                ..ScanBatchConfig::default()
            },
            ..MonsterIncConfig::default()
        }
    }

    fn seven_targets() -> TargetSource {
        TargetSource::List((0..7).map(|i| format!("https://host{i}.com/")).collect())
    }

    #[tokio::test]
    async fn batched_scan_all_successful() {
        let f = fixture(batched_config(), Arc::new(MockCrawler::new(vec![])));
        let result = f
            .orchestrator
            .run(&CancelToken::new(), seven_targets(), "scan-1")
            .await
            .unwrap();

        assert!(result.used_batching);
        assert_eq!(result.total_batches, 3);
        assert_eq!(result.processed_batches, 3);
        assert_eq!(result.interrupted_at_batch, 0);
        assert_eq!(result.summary.status, ScanStatus::Completed);
        assert_eq!(result.summary.probe_stats.total_probed, 7);
        // Merged report generated exactly once, for the parent session.
        assert_eq!(f.reporter.generate_count(), 1);
        assert_eq!(f.reporter.generated()[0], ("scan-1".to_string(), 7));
        // Writes were partitioned by derived batch session ids.
        assert!(f.writer.writes().iter().all(|(s, _, _)| s.starts_with("scan-1-batch-")));
    }

    #[tokio::test]
    async fn batched_scan_cancelled_mid_second_batch() {
        // The crawl of batch 2 observes an external cancellation.
        let crawler = Arc::new(MockCrawler::new(vec![]).cancel_on_start(2));
        let f = fixture(batched_config(), crawler);
        let result = f
            .orchestrator
            .run(&CancelToken::new(), seven_targets(), "scan-2")
            .await
            .unwrap();

        assert_eq!(result.interrupted_at_batch, 2);
        assert_eq!(result.processed_batches, 1);
        assert_eq!(result.summary.status, ScanStatus::PartialComplete);
        // Report still generated from batch 1's probes.
        assert_eq!(f.reporter.generate_count(), 1);
        assert_eq!(f.reporter.generated()[0], ("scan-2".to_string(), 3));
    }

    #[tokio::test]
    async fn cancellation_before_any_batch_fails_the_run() {
        let f = fixture(batched_config(), Arc::new(MockCrawler::new(vec![])));
        let ctx = CancelToken::new();
        ctx.cancel();
        let result = f.orchestrator.run(&ctx, seven_targets(), "scan-3").await.unwrap();

        assert_eq!(result.interrupted_at_batch, 1);
        assert_eq!(result.processed_batches, 0);
        assert_eq!(result.summary.status, ScanStatus::Failed);
        assert_eq!(f.reporter.generate_count(), 0);
    }

    #[tokio::test]
    async fn small_target_set_runs_as_a_single_batch() {
        let f = fixture(MonsterIncConfig::default(), Arc::new(MockCrawler::new(vec![])));
        let source = TargetSource::List(vec![
            "https://a.com/".to_string(),
            "https://b.com/".to_string(),
        ]);
        let result = f
            .orchestrator
            .run(&CancelToken::new(), source, "scan-4")
            .await
            .unwrap();

        assert!(!result.used_batching);
        assert_eq!(result.total_batches, 1);
        assert_eq!(result.summary.status, ScanStatus::Completed);
        // No derived session id without batching.
        assert!(f.writer.writes().iter().all(|(s, _, _)| s == "scan-4"));
        // No memory adaptation either: the configured thread count sticks.
        let seen = f.probe_configs.lock().unwrap();
        assert_eq!(seen[0].threads, ProbeConfig::default().threads);
    }

    #[tokio::test]
    async fn memory_adaptation_clamps_concurrency_when_batching() {
        let mut config = batched_config();
        config.crawler.max_concurrent_requests = 50;
        config.probe.threads = 100;
        let f = fixture(config, Arc::new(MockCrawler::new(vec![])));

        f.orchestrator
            .run(&CancelToken::new(), seven_targets(), "scan-5")
            .await
            .unwrap();

        let seen = f.probe_configs.lock().unwrap();
        assert!(seen.iter().all(|c| c.threads <= 30));
    }

    #[tokio::test]
    async fn crawler_failure_stops_the_loop_but_reports_prior_batches() {
        let calls = Arc::new(AtomicUsize::new(0));
        // Fail every crawl from the second one on.
        struct FlakyCrawler {
            inner: MockCrawler,
            calls: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl Crawler for FlakyCrawler {
            fn reset_for_new_batch(&self, seeds: &[String]) {
                self.inner.reset_for_new_batch(seeds);
            }
            async fn start(&self, ctx: &CancelToken) -> Result<()> {
                if self.calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                    anyhow::bail!("dns outage");
                }
                self.inner.start(ctx).await
            }
            fn discovered_urls(&self) -> Vec<String> {
                self.inner.discovered_urls()
            }
            fn root_target_for(&self, url: &str) -> Option<String> {
                self.inner.root_target_for(url)
            }
            fn disable_auto_calibrate(&self) {
                self.inner.disable_auto_calibrate();
            }
            async fn stop(&self) {
                self.inner.stop().await;
            }
            async fn ensure_full_shutdown(&self) {
                self.inner.ensure_full_shutdown().await;
            }
        }

        let crawler = Arc::new(FlakyCrawler {
            inner: MockCrawler::new(vec![]),
            calls,
        });
        let crawler_factory: CrawlerFactory = {
            let crawler = crawler.clone();
            Arc::new(move |_c| Ok(crawler.clone() as Arc<dyn Crawler>))
        };
        let probe_factory: ProbeRunnerFactory =
            Arc::new(|_c, _r| Ok(Arc::new(MockProbeRunner::ok()) as Arc<dyn ProbeRunner>));
        let reporter = Arc::new(MockReportRenderer::default());
        let orchestrator = ScanOrchestrator::new(
            batched_config(),
            crawler_factory,
            probe_factory,
            Arc::new(MockUrlDiffer::all_new()),
            None,
            Some(reporter.clone() as Arc<dyn ReportRenderer>),
        );

        let result = orchestrator
            .run(&CancelToken::new(), seven_targets(), "scan-6")
            .await
            .unwrap();

        assert_eq!(result.summary.status, ScanStatus::Failed);
        assert_eq!(result.processed_batches, 1);
        assert_eq!(result.interrupted_at_batch, 0);
        assert!(!result.summary.error_messages.is_empty());
        // Batch 1 succeeded, so its probes still get reported.
        assert_eq!(reporter.generate_count(), 1);
    }

    #[tokio::test]
    async fn invalid_inputs_fail_at_entry() {
        let f = fixture(MonsterIncConfig::default(), Arc::new(MockCrawler::new(vec![])));

        let err = f
            .orchestrator
            .run(&CancelToken::new(), seven_targets(), "  ")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MonsterIncError>(),
            Some(MonsterIncError::InvalidInput(_))
        ));

        let err = f
            .orchestrator
            .run(&CancelToken::new(), TargetSource::List(vec![]), "scan-7")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MonsterIncError>(),
            Some(MonsterIncError::InvalidInput(_))
        ));

        // A source with only invalid entries loads zero targets.
        let err = f
            .orchestrator
            .run(
                &CancelToken::new(),
                TargetSource::List(vec!["not a url".to_string()]),
                "scan-8",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MonsterIncError>(),
            Some(MonsterIncError::NoTargets)
        ));
    }

    #[tokio::test]
    async fn report_failure_still_returns_the_summary() {
        let crawler = Arc::new(MockCrawler::new(vec![]));
        let crawler_factory: CrawlerFactory = {
            let crawler = crawler.clone();
            Arc::new(move |_c| Ok(crawler.clone() as Arc<dyn Crawler>))
        };
        let probe_factory: ProbeRunnerFactory =
            Arc::new(|_c, _r| Ok(Arc::new(MockProbeRunner::ok()) as Arc<dyn ProbeRunner>));
        let orchestrator = ScanOrchestrator::new(
            MonsterIncConfig::default(),
            crawler_factory,
            probe_factory,
            Arc::new(MockUrlDiffer::all_new()),
            None,
            Some(Arc::new(MockReportRenderer::failing()) as Arc<dyn ReportRenderer>),
        );

        let source = TargetSource::List(vec!["https://a.com/".to_string()]);
        let result = orchestrator
            .run(&CancelToken::new(), source, "scan-9")
            .await
            .unwrap();
        assert_eq!(result.summary.status, ScanStatus::Completed);
        assert!(result.report_paths.is_empty());
    }

    #[tokio::test]
    async fn batch_aggregation_matches_component_sums() {
        let f = fixture(batched_config(), Arc::new(MockCrawler::new(vec![])));
        let result = f
            .orchestrator
            .run(&CancelToken::new(), seven_targets(), "scan-10")
            .await
            .unwrap();

        let mut probe_sum = 0u32;
        let mut diff_sum = 0u32;
        let mut duration_sum = 0u64;
        for batch in &result.batch_results {
            probe_sum += batch.probe_stats.total_probed;
            diff_sum += batch.diff_stats.total();
            duration_sum += batch.duration_ms;
        }
        assert_eq!(result.summary.probe_stats.total_probed, probe_sum);
        assert_eq!(result.summary.diff_stats.total(), diff_sum);
        assert_eq!(result.summary.duration_ms, duration_sum);
    }

    #[tokio::test]
    async fn fingerprint_reset_between_batches_is_configurable() {
        // Seven same-pattern targets, cap 2. With per-batch reset the run
        // admits 2 per batch; with the default persistence batch 2 drains
        // to zero and the workflow fails.
        let targets = TargetSource::List(
            (0..7).map(|i| format!("https://one.com/item/{i}")).collect(),
        );

        let mut config = batched_config();
        config.crawler.auto_calibrate.max_similar_urls = 2;
        config.crawler.auto_calibrate.reset_between_batches = true;
        let f = fixture(config, Arc::new(MockCrawler::new(vec![])));
        let result = f
            .orchestrator
            .run(&CancelToken::new(), targets.clone(), "scan-11")
            .await
            .unwrap();
        assert_eq!(result.summary.status, ScanStatus::Completed);
        // 2 admitted per 3-target batch, 1 in the final 1-target batch.
        assert_eq!(result.summary.probe_stats.total_probed, 5);

        let mut config = batched_config();
        config.crawler.auto_calibrate.max_similar_urls = 2;
        let f = fixture(config, Arc::new(MockCrawler::new(vec![])));
        let result = f
            .orchestrator
            .run(&CancelToken::new(), targets, "scan-12")
            .await
            .unwrap();
        // Batch 1 admits the cap; batch 2 drains and the run fails there.
        assert_eq!(result.summary.status, ScanStatus::Failed);
        assert_eq!(result.processed_batches, 1);
        assert_eq!(result.summary.probe_stats.total_probed, 2);
    }
}
