//! Target sources — where seed URLs come from. A text file (one URL per
//! line, `#` comments and blanks skipped) or an in-memory list; the
//! command-line file wins over an inline list, which wins over a config
//! file path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use monsterinc_common::MonsterIncError;

#[derive(Debug, Clone)]
pub enum TargetSource {
    File(PathBuf),
    List(Vec<String>),
}

impl TargetSource {
    /// Human-readable description used in summaries and reports.
    pub fn describe(&self) -> String {
        match self {
            TargetSource::File(path) => path.display().to_string(),
            TargetSource::List(targets) => format!("inline list ({} URLs)", targets.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TargetSource::File(path) => path.as_os_str().is_empty(),
            TargetSource::List(targets) => targets.is_empty(),
        }
    }
}

/// Pick the effective source: CLI file > inline list > config file path.
pub fn resolve(
    cli_file: Option<PathBuf>,
    inline: Vec<String>,
    config_file: Option<PathBuf>,
) -> Option<TargetSource> {
    if let Some(path) = cli_file {
        return Some(TargetSource::File(path));
    }
    if !inline.is_empty() {
        return Some(TargetSource::List(inline));
    }
    config_file.map(TargetSource::File)
}

/// Load and validate targets. Invalid URLs are logged and dropped; an
/// unreadable file is an error.
pub fn load_targets(source: &TargetSource) -> Result<Vec<String>> {
    let raw: Vec<String> = match source {
        TargetSource::File(path) => read_target_file(path)?,
        TargetSource::List(targets) => targets.clone(),
    };

    let mut valid = Vec::with_capacity(raw.len());
    for target in raw {
        if is_valid_target(&target) {
            valid.push(target);
        } else {
            warn!(target, "Dropping invalid target URL");
        }
    }
    info!(source = source.describe(), targets = valid.len(), "Targets loaded");
    Ok(valid)
}

fn read_target_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MonsterIncError::Config(format!("cannot read targets file: {e}")))
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// A target is usable if it parses as an absolute URL with a host, with or
/// without an explicit scheme.
fn is_valid_target(target: &str) -> bool {
    if target.contains(char::is_whitespace) {
        return false;
    }
    match Url::parse(target) {
        Ok(url) => url.host_str().is_some(),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{target}"))
            .map(|u| u.host_str().is_some())
            .unwrap_or(false),
        Err(_) => false,
    }
}
