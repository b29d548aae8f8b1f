//! URL preprocessor — the admission pipeline every seed and discovered URL
//! passes through before crawling: normalize → invocation-wide dedup →
//! pattern cap → admit. Runs sequentially in chunks, or over a bounded
//! worker pool for large inputs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use monsterinc_common::config::{AutoCalibrateConfig, UrlNormalizationConfig};

use super::normalizer::UrlNormalizer;
use super::pattern::PatternDetector;
use crate::cancel::CancelToken;

#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Chunk size for the sequential path.
    pub batch_size: usize,
    /// Worker-pool size for the parallel path.
    pub max_workers: usize,
    pub enable_parallel: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            enable_parallel: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessStats {
    pub total_processed: usize,
    /// Inputs whose normalized form differs from the raw string.
    pub normalized: usize,
    pub skipped_by_pattern: usize,
    pub skipped_duplicate: usize,
    pub invalid: usize,
    pub final_count: usize,
}

impl std::fmt::Display for PreprocessStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} normalized={} dup_skipped={} pattern_skipped={} invalid={} admitted={}",
            self.total_processed,
            self.normalized,
            self.skipped_duplicate,
            self.skipped_by_pattern,
            self.invalid,
            self.final_count
        )
    }
}

/// The per-URL admission chain, cheap to hand to worker tasks.
#[derive(Clone)]
struct Admission {
    normalizer: Arc<UrlNormalizer>,
    detector: Arc<PatternDetector>,
    auto_calibrate: bool,
}

impl Admission {
    /// One URL through normalize → seen-check → pattern cap. The seen-check
    /// and the pattern bump each commit under their own lock; the combined
    /// chain is deliberately not atomic.
    fn admit(
        &self,
        raw: &str,
        seen: &Mutex<HashSet<String>>,
        stats: &Mutex<PreprocessStats>,
    ) -> Option<String> {
        stats.lock().expect("stats lock poisoned").total_processed += 1;

        let normalized = match self.normalizer.normalize(raw) {
            Ok(n) => n,
            Err(e) => {
                warn!(url = raw, error = %e, "Dropping invalid URL");
                stats.lock().expect("stats lock poisoned").invalid += 1;
                return None;
            }
        };
        if normalized != raw {
            stats.lock().expect("stats lock poisoned").normalized += 1;
        }

        if !seen.lock().expect("seen lock poisoned").insert(normalized.clone()) {
            stats.lock().expect("stats lock poisoned").skipped_duplicate += 1;
            return None;
        }

        if self.auto_calibrate && self.detector.should_skip(&normalized) {
            stats.lock().expect("stats lock poisoned").skipped_by_pattern += 1;
            return None;
        }

        Some(normalized)
    }
}

pub struct UrlPreprocessor {
    admission: Admission,
    options: PreprocessOptions,
}

impl UrlPreprocessor {
    pub fn new(
        normalization: UrlNormalizationConfig,
        calibrate: AutoCalibrateConfig,
        options: PreprocessOptions,
    ) -> Self {
        Self {
            admission: Admission {
                normalizer: Arc::new(UrlNormalizer::new(normalization)),
                auto_calibrate: calibrate.enabled,
                detector: Arc::new(PatternDetector::new(calibrate)),
            },
            options,
        }
    }

    /// The shared pattern detector. Counts persist across invocations until
    /// the owner decides to reset them.
    pub fn detector(&self) -> &PatternDetector {
        &self.admission.detector
    }

    /// Run the admission pipeline over `urls`. On cancellation the URLs
    /// admitted so far are returned; preprocessing itself never fails.
    pub async fn process(&self, ctx: &CancelToken, urls: &[String]) -> (Vec<String>, PreprocessStats) {
        let parallel = self.options.enable_parallel
            && self.options.max_workers > 1
            && urls.len() > self.options.max_workers * 10;

        let (admitted, mut stats) = if parallel {
            self.process_parallel(ctx, urls).await
        } else {
            self.process_sequential(ctx, urls)
        };

        stats.final_count = admitted.len();
        debug!(%stats, parallel, "URL preprocessing finished");
        (admitted, stats)
    }

    fn process_sequential(&self, ctx: &CancelToken, urls: &[String]) -> (Vec<String>, PreprocessStats) {
        let seen = Mutex::new(HashSet::new());
        let stats = Mutex::new(PreprocessStats::default());
        let mut admitted = Vec::new();

        'outer: for chunk in urls.chunks(self.options.batch_size.max(1)) {
            for url in chunk {
                if ctx.is_cancelled() {
                    break 'outer;
                }
                if let Some(url) = self.admission.admit(url, &seen, &stats) {
                    admitted.push(url);
                }
            }
        }

        let stats = stats.into_inner().expect("stats lock poisoned");
        (admitted, stats)
    }

    /// Fan URLs out over `max_workers` tasks. The seen-set and the pattern
    /// counts stay shared; because the admission chain is not atomic, a
    /// fingerprint may overshoot its cap by at most `max_workers - 1`.
    async fn process_parallel(&self, ctx: &CancelToken, urls: &[String]) -> (Vec<String>, PreprocessStats) {
        let workers = self.options.max_workers;
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let stats = Arc::new(Mutex::new(PreprocessStats::default()));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<String>();

        let mut feeders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, mut rx) = mpsc::channel::<String>(64);
            feeders.push(tx);

            let admission = self.admission.clone();
            let seen = seen.clone();
            let stats = stats.clone();
            let result_tx = result_tx.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                while let Some(url) = rx.recv().await {
                    if ctx.is_cancelled() {
                        break;
                    }
                    if let Some(url) = admission.admit(&url, &seen, &stats) {
                        let _ = result_tx.send(url);
                    }
                }
            }));
        }
        drop(result_tx);

        // Round-robin feed; a send suspends when that worker's queue is full.
        for (i, url) in urls.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }
            if feeders[i % workers].send(url.clone()).await.is_err() {
                break;
            }
        }
        drop(feeders);

        let mut admitted = Vec::new();
        while let Some(url) = result_rx.recv().await {
            admitted.push(url);
        }
        join_all(handles).await;

        let stats = *stats.lock().expect("stats lock poisoned");
        (admitted, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsterinc_common::config::{AutoCalibrateConfig, UrlNormalizationConfig};

    fn preprocessor(calibrate: AutoCalibrateConfig) -> UrlPreprocessor {
        UrlPreprocessor::new(
            UrlNormalizationConfig::default(),
            calibrate,
            PreprocessOptions::default(),
        )
    }

    fn urls(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn pattern_cap_admits_first_two_of_four_similar() {
        let p = preprocessor(AutoCalibrateConfig {
            max_similar_urls: 2,
            ..AutoCalibrateConfig::default()
        });
        let input = urls(&[
            "https://example.com/item/1",
            "https://example.com/item/2",
            "https://example.com/item/3",
            "https://example.com/item/4",
        ]);
        let (admitted, stats) = p.process(&CancelToken::new(), &input).await;

        assert_eq!(admitted, urls(&["https://example.com/item/1", "https://example.com/item/2"]));
        assert_eq!(stats.skipped_by_pattern, 2);
        assert_eq!(stats.final_count, 2);
    }

    #[tokio::test]
    async fn duplicates_collapse_after_normalization() {
        let p = preprocessor(AutoCalibrateConfig::default());
        let input = urls(&["https://a.com", "HTTPS://A.com/", "https://a.com"]);
        let (admitted, stats) = p.process(&CancelToken::new(), &input).await;

        assert_eq!(admitted, urls(&["https://a.com/"]));
        assert_eq!(stats.skipped_duplicate, 2);
        assert_eq!(stats.final_count, 1);
    }

    #[tokio::test]
    async fn invalid_urls_are_dropped_not_fatal() {
        let p = preprocessor(AutoCalibrateConfig::default());
        let input = urls(&["https://ok.com/a", "https://", ""]);
        let (admitted, stats) = p.process(&CancelToken::new(), &input).await;

        assert_eq!(admitted.len(), 1);
        assert_eq!(stats.invalid, 2);
    }

    #[tokio::test]
    async fn preprocessing_is_idempotent_as_a_set() {
        let input = urls(&[
            "https://a.com/x?utm_source=t",
            "a.com/x",
            "https://b.com/item/1",
            "https://b.com/item/2",
        ]);
        let p1 = preprocessor(AutoCalibrateConfig::default());
        let (once, _) = p1.process(&CancelToken::new(), &input).await;

        // Fresh detector: counts reset between orchestrator invocations.
        let p2 = preprocessor(AutoCalibrateConfig::default());
        let (twice, _) = p2.process(&CancelToken::new(), &once).await;

        let a: HashSet<_> = once.iter().cloned().collect();
        let b: HashSet<_> = twice.iter().cloned().collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cancellation_returns_admitted_so_far() {
        let p = preprocessor(AutoCalibrateConfig::default());
        let ctx = CancelToken::new();
        ctx.cancel();
        let (admitted, stats) = p.process(&ctx, &urls(&["https://a.com", "https://b.com"])).await;
        assert!(admitted.is_empty());
        assert_eq!(stats.total_processed, 0);
    }

    #[tokio::test]
    async fn parallel_mode_matches_sequential_as_a_set() {
        // 4 workers * 10 = 40; 120 inputs forces the parallel path.
        let mut input = Vec::new();
        for i in 0..60 {
            input.push(format!("https://host{i}.com/page"));
            input.push(format!("https://host{i}.com/page")); // duplicate
        }

        let parallel = UrlPreprocessor::new(
            UrlNormalizationConfig::default(),
            AutoCalibrateConfig::default(),
            PreprocessOptions {
                batch_size: 1000,
                max_workers: 4,
                enable_parallel: true,
            },
        );
        let (out_par, stats_par) = parallel.process(&CancelToken::new(), &input).await;

        let sequential = UrlPreprocessor::new(
            UrlNormalizationConfig::default(),
            AutoCalibrateConfig::default(),
            PreprocessOptions {
                batch_size: 1000,
                max_workers: 4,
                enable_parallel: false,
            },
        );
        let (out_seq, stats_seq) = sequential.process(&CancelToken::new(), &input).await;

        let par: HashSet<_> = out_par.into_iter().collect();
        let seq: HashSet<_> = out_seq.into_iter().collect();
        assert_eq!(par, seq);
        assert_eq!(stats_par.total_processed, stats_seq.total_processed);
        assert_eq!(stats_par.skipped_duplicate, stats_seq.skipped_duplicate);
    }

    #[tokio::test]
    async fn parallel_pattern_cap_overshoot_is_bounded() {
        let max_workers = 4;
        let max_similar = 3;
        let input: Vec<String> =
            (0..200).map(|i| format!("https://example.com/item/{i}")).collect();

        let p = UrlPreprocessor::new(
            UrlNormalizationConfig::default(),
            AutoCalibrateConfig {
                max_similar_urls: max_similar,
                ..AutoCalibrateConfig::default()
            },
            PreprocessOptions {
                batch_size: 1000,
                max_workers,
                enable_parallel: true,
            },
        );
        let (admitted, _) = p.process(&CancelToken::new(), &input).await;
        assert!(
            admitted.len() <= max_similar + max_workers - 1,
            "admitted {} exceeds cap slack",
            admitted.len()
        );
        assert!(admitted.len() >= max_similar);
    }
}
