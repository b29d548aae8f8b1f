//! Probe manager — keeps one probe runner alive across batches and
//! recreates it only when the config changes materially (threads, timeout,
//! rate limit, retries, redirect policy) or the root target moves.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use monsterinc_common::config::ProbeConfig;
use monsterinc_common::types::ProbeResult;

use crate::cancel::CancelToken;
use crate::traits::{ProbeRunner, ProbeRunnerFactory};

struct ProbeSingleton {
    runner: Arc<dyn ProbeRunner>,
    config: ProbeConfig,
    root_target: String,
}

pub struct ProbeManager {
    factory: ProbeRunnerFactory,
    instance: Mutex<Option<ProbeSingleton>>,
}

impl ProbeManager {
    pub fn new(factory: ProbeRunnerFactory) -> Self {
        Self {
            factory,
            instance: Mutex::new(None),
        }
    }

    /// Reuse the existing runner when config and root target still match;
    /// otherwise build a fresh one and swap it in.
    pub async fn get_or_create(
        &self,
        config: &ProbeConfig,
        root_target: &str,
    ) -> Result<Arc<dyn ProbeRunner>> {
        let mut guard = self.instance.lock().await;
        if let Some(singleton) = guard.as_ref() {
            if !singleton.config.materially_differs(config) && singleton.root_target == root_target
            {
                return Ok(singleton.runner.clone());
            }
            debug!(root_target, "Probe runner config changed materially, recreating");
        }

        let runner = (self.factory)(config, root_target).context("constructing probe runner")?;
        *guard = Some(ProbeSingleton {
            runner: runner.clone(),
            config: config.clone(),
            root_target: root_target.to_string(),
        });
        info!(
            threads = config.threads,
            timeout_secs = config.timeout_secs,
            root_target,
            "Probe runner created"
        );
        Ok(runner)
    }

    /// Probe one batch of URLs. Each result is attributed to its originating
    /// seed through `root_lookup`, falling back to the batch root target.
    /// Partial results are returned alongside the failure, if any.
    pub async fn execute_batch(
        &self,
        ctx: &CancelToken,
        config: &ProbeConfig,
        root_target: &str,
        urls: &[String],
        root_lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync),
        session_id: &str,
    ) -> (Vec<ProbeResult>, Option<anyhow::Error>) {
        if urls.is_empty() {
            return (Vec::new(), None);
        }
        let runner = match self.get_or_create(config, root_target).await {
            Ok(r) => r,
            Err(e) => return (Vec::new(), Some(e)),
        };
        if let Err(e) = ctx.ensure_active() {
            return (Vec::new(), Some(e));
        }

        let run = runner.run(ctx, urls).await;

        let mut results = runner.results();
        for result in &mut results {
            if let Some(root) = root_lookup(&result.input_url) {
                result.root_target = root;
            } else if result.root_target.is_empty() {
                result.root_target = root_target.to_string();
            }
        }

        match run {
            Ok(()) => {
                info!(session_id, probed = results.len(), "Probing finished");
                (results, None)
            }
            Err(e) => (results, Some(e.context("probe execution"))),
        }
    }

    /// Drop the singleton; the next batch builds a fresh runner.
    pub async fn shutdown(&self) {
        self.instance.lock().await.take();
    }
}
