//! Diff/store processor — groups a batch of probe results by hostname,
//! runs the URL differ per group, writes the assigned statuses back into
//! the caller's vector, and persists the annotated probes. Group failures
//! are soft; cancellation is hard.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use monsterinc_common::types::{ProbeResult, UrlDiffResult, UrlStatus};
use monsterinc_common::MonsterIncError;

use crate::cancel::CancelToken;
use crate::traits::{ProbeWriter, UrlDiffer};

/// Bucket for probes whose input URL does not parse to a hostname.
const UNKNOWN_HOST: &str = "unknown";

#[derive(Default)]
pub struct DiffStoreOutcome {
    /// Per-hostname diff results for every group that completed.
    pub diffs: HashMap<String, UrlDiffResult>,
    /// Annotated probes across all completed groups.
    pub all_probes: Vec<ProbeResult>,
}

pub struct DiffStoreProcessor {
    differ: Arc<dyn UrlDiffer>,
    writer: Option<Arc<dyn ProbeWriter>>,
}

impl DiffStoreProcessor {
    pub fn new(differ: Arc<dyn UrlDiffer>, writer: Option<Arc<dyn ProbeWriter>>) -> Self {
        Self { differ, writer }
    }

    /// Diff and persist one batch. Statuses are written into `probes` in
    /// place; the returned outcome aggregates the annotated copies. On
    /// cancellation the accumulated output is returned with the failure.
    pub async fn process(
        &self,
        ctx: &CancelToken,
        probes: &mut [ProbeResult],
        session_id: &str,
    ) -> (DiffStoreOutcome, Option<anyhow::Error>) {
        let mut outcome = DiffStoreOutcome::default();
        if probes.is_empty() {
            return (outcome, None);
        }

        // Group original indices by hostname so statuses land back at the
        // right positions.
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, probe) in probes.iter().enumerate() {
            groups.entry(hostname_of(&probe.input_url)).or_default().push(index);
        }
        debug!(session_id, hosts = groups.len(), "Diffing probe results");

        for (hostname, indices) in groups {
            if let Err(e) = ctx.ensure_active() {
                return (outcome, Some(e));
            }

            let group: Vec<ProbeResult> = indices.iter().map(|&i| probes[i].clone()).collect();
            let diff = match self.differ.differentiate(&group, &hostname, session_id).await {
                Ok(d) => d,
                Err(e) => {
                    if MonsterIncError::is_cancellation(&e) {
                        return (outcome, Some(e));
                    }
                    warn!(hostname, error = %e, "Diff failed for host, skipping group");
                    continue;
                }
            };

            // Write statuses back by effective URL.
            let status_by_url: HashMap<&str, UrlStatus> = diff
                .results
                .iter()
                .filter_map(|r| r.url_status.map(|s| (r.effective_url.as_str(), s)))
                .collect();
            for &index in &indices {
                if let Some(status) = status_by_url.get(probes[index].effective_url.as_str()) {
                    probes[index].url_status = Some(*status);
                }
            }

            if let Err(e) = ctx.ensure_active() {
                return (outcome, Some(e));
            }
            if let Some(writer) = &self.writer {
                if !diff.results.is_empty() {
                    if let Err(e) = writer.write(ctx, &diff.results, session_id, &hostname).await {
                        if MonsterIncError::is_cancellation(&e) {
                            return (outcome, Some(e));
                        }
                        warn!(hostname, error = %e, "Persist failed for host, skipping group");
                        continue;
                    }
                }
            }

            outcome.all_probes.extend(diff.results.iter().cloned());
            outcome.diffs.insert(hostname, diff);
        }

        (outcome, None)
    }
}

fn hostname_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
