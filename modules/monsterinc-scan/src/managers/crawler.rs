//! Crawler manager — owns the one crawler instance for the whole scan
//! process. Batches reuse it through `reset_for_new_batch`; a background
//! ticker feeds discovery counts into the progress substrate while a
//! crawl is running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use monsterinc_common::config::CrawlerConfig;

use crate::cancel::CancelToken;
use crate::progress::ProgressTracker;
use crate::traits::{Crawler, CrawlerFactory};

const MONITOR_INTERVAL: Duration = Duration::from_secs(3);

pub struct CrawlerManager {
    factory: CrawlerFactory,
    instance: Mutex<Option<Arc<dyn Crawler>>>,
    progress: Arc<ProgressTracker>,
}

impl CrawlerManager {
    pub fn new(factory: CrawlerFactory, progress: Arc<ProgressTracker>) -> Self {
        Self {
            factory,
            instance: Mutex::new(None),
            progress,
        }
    }

    /// First call constructs the crawler; later calls return the same one.
    pub async fn get_or_create(&self, config: &CrawlerConfig) -> Result<Arc<dyn Crawler>> {
        let mut guard = self.instance.lock().await;
        if let Some(crawler) = guard.as_ref() {
            return Ok(crawler.clone());
        }
        let crawler = (self.factory)(config).context("constructing crawler")?;
        // The preprocessor already capped near-duplicates for the seed set.
        crawler.disable_auto_calibrate();
        *guard = Some(crawler.clone());
        info!(
            concurrency = config.max_concurrent_requests,
            max_depth = config.max_depth,
            "Crawler created"
        );
        Ok(crawler)
    }

    /// Run one batch of seed-bounded discovery. Returns whatever was
    /// discovered plus the failure, if any — cancellation included.
    pub async fn execute_batch(
        &self,
        ctx: &CancelToken,
        config: &CrawlerConfig,
        seed_urls: &[String],
        session_id: &str,
    ) -> (Vec<String>, Option<anyhow::Error>) {
        let crawler = match self.get_or_create(config).await {
            Ok(c) => c,
            Err(e) => return (Vec::new(), Some(e)),
        };
        crawler.reset_for_new_batch(seed_urls);

        if seed_urls.is_empty() {
            return (Vec::new(), None);
        }
        if let Err(e) = ctx.ensure_active() {
            return (Vec::new(), Some(e));
        }

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let monitor = tokio::spawn(monitor_discovery(
            crawler.clone(),
            self.progress.clone(),
            ctx.clone(),
            stop_rx,
        ));

        let run = crawler.start(ctx).await;

        let _ = stop_tx.send(());
        let _ = monitor.await;

        let discovered = crawler.discovered_urls();
        match run {
            Ok(()) => {
                info!(session_id, discovered = discovered.len(), "Crawl finished");
                (discovered, None)
            }
            Err(e) => (discovered, Some(e.context("crawler execution"))),
        }
    }

    /// Stop and fully drain the crawler, then drop the singleton. The next
    /// `get_or_create` starts from scratch.
    pub async fn shutdown(&self) {
        let mut guard = self.instance.lock().await;
        if let Some(crawler) = guard.take() {
            crawler.stop().await;
            crawler.ensure_full_shutdown().await;
            info!("Crawler shut down");
        }
    }

    /// Whether a crawler instance currently exists.
    pub async fn is_active(&self) -> bool {
        self.instance.lock().await.is_some()
    }
}

async fn monitor_discovery(
    crawler: Arc<dyn Crawler>,
    progress: Arc<ProgressTracker>,
    ctx: CancelToken,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let count = crawler.discovered_urls().len();
                progress.scan().update_workflow(
                    count as u64,
                    0,
                    "crawl",
                    &format!("{count} URLs discovered"),
                );
            }
            _ = &mut stop_rx => break,
        }
        if ctx.is_cancelled() {
            warn!("Discovery monitor stopping: scan cancelled");
            break;
        }
    }
}
