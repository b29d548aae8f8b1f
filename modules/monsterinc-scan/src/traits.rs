// Contracts for the collaborators the scan core drives but does not
// implement: crawler engine, HTTP probe runner, URL differ, columnar
// writer, and report renderer.
//
// Everything is object-safe and Send + Sync so the managers can hold
// singletons across batches, and so tests can swap in the mocks from
// `testing.rs`: no network, no store, `cargo test` in seconds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use monsterinc_common::config::{CrawlerConfig, ProbeConfig};
use monsterinc_common::types::{ProbeResult, UrlDiffResult};

use crate::cancel::CancelToken;

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Clear per-batch caches and install the new seed set.
    fn reset_for_new_batch(&self, seed_urls: &[String]);

    /// Run the seed-bounded expansion until exhaustion or cancellation.
    async fn start(&self, ctx: &CancelToken) -> Result<()>;

    /// Every URL discovered in the current batch, seeds included.
    fn discovered_urls(&self) -> Vec<String>;

    /// The seed URL a discovered URL is attributed to.
    fn root_target_for(&self, url: &str) -> Option<String>;

    /// Turn off the crawler's own near-duplicate suppression; the
    /// preprocessor already capped the seed set.
    fn disable_auto_calibrate(&self);

    async fn stop(&self);

    /// Stop and wait until no request is still in flight.
    async fn ensure_full_shutdown(&self);
}

/// Builds a crawler from config. Called once per scan process; the manager
/// keeps the instance alive across batches.
pub type CrawlerFactory = Arc<dyn Fn(&CrawlerConfig) -> Result<Arc<dyn Crawler>> + Send + Sync>;

// ---------------------------------------------------------------------------
// Probe runner
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Probe the given URLs. Partial results are retained on failure and
    /// readable through `results`.
    async fn run(&self, ctx: &CancelToken, urls: &[String]) -> Result<()>;

    /// Results of the most recent `run`.
    fn results(&self) -> Vec<ProbeResult>;
}

/// Builds a probe runner for (config, root target). The manager recreates
/// the runner when either changes materially.
pub type ProbeRunnerFactory =
    Arc<dyn Fn(&ProbeConfig, &str) -> Result<Arc<dyn ProbeRunner>> + Send + Sync>;

// ---------------------------------------------------------------------------
// Differ
// ---------------------------------------------------------------------------

#[async_trait]
pub trait UrlDiffer: Send + Sync {
    /// Compare current probes for one hostname against the historical store
    /// and classify each URL. Returned probes carry their `url_status`.
    async fn differentiate(
        &self,
        probes: &[ProbeResult],
        hostname: &str,
        session_id: &str,
    ) -> Result<UrlDiffResult>;
}

// ---------------------------------------------------------------------------
// Columnar writer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProbeWriter: Send + Sync {
    /// Persist annotated probes for `(session_id, hostname)`. Partitioning
    /// is the writer's concern; the core calls once per hostname per batch.
    async fn write(
        &self,
        ctx: &CancelToken,
        probes: &[ProbeResult],
        session_id: &str,
        hostname: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Report renderer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the HTML report(s) for a finished session; returns the paths
    /// written.
    async fn generate(
        &self,
        probes: &[ProbeResult],
        diffs: &HashMap<String, UrlDiffResult>,
        session_id: &str,
    ) -> Result<Vec<PathBuf>>;
}
