use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use monsterinc_common::{MonsterIncConfig, MonsterIncError};
use monsterinc_scan::cancel::CancelToken;
use monsterinc_scan::preprocess::{PreprocessOptions, UrlPreprocessor};
use monsterinc_scan::sources;

/// Validate scan targets and preview the URL admission pipeline
/// (normalization, deduplication, pattern capping) without touching the
/// network. Full scans are run by embedding `ScanOrchestrator` with real
/// crawler, probe, differ, and writer collaborators.
#[derive(Parser, Debug)]
#[command(name = "monsterinc-scan", version)]
struct Args {
    /// File with one target URL per line (`#` comments allowed).
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Inline target URL; repeatable. Ignored when --targets-file is set.
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Session identifier; generated when omitted.
    #[arg(long)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("monsterinc_scan=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let session_id = args
        .session_id
        .unwrap_or_else(|| format!("scan-{}", uuid::Uuid::new_v4()));

    let Some(source) = sources::resolve(args.targets_file, args.urls, None) else {
        anyhow::bail!("no targets given: pass --targets-file or --url");
    };

    let config = MonsterIncConfig::default();
    config.log_summary();

    let targets = sources::load_targets(&source)?;
    if targets.is_empty() {
        return Err(MonsterIncError::NoTargets.into());
    }
    info!(session_id, targets = targets.len(), "Previewing URL admission pipeline");

    let preprocessor = UrlPreprocessor::new(
        config.crawler.url_normalization.clone(),
        config.crawler.auto_calibrate.clone(),
        PreprocessOptions::default(),
    );
    let (admitted, stats) = preprocessor.process(&CancelToken::new(), &targets).await;

    for url in &admitted {
        println!("{url}");
    }
    info!(%stats, "Admission preview complete");

    Ok(())
}
