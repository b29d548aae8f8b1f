//! Line-oriented target file store behind the bot's CRUD commands. One URL
//! per line; all edits rewrite the file atomically enough for a single-bot
//! process (read, mutate, write).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use monsterinc_common::MonsterIncError;

/// Entries shown per `list` page.
pub const PAGE_SIZE: usize = 10;

pub struct TargetFile {
    path: PathBuf,
}

/// One page of a listing.
#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    /// `(1-based line number, url)` pairs.
    pub entries: Vec<(usize, String)>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

impl TargetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a URL. Fails when it is already present.
    pub fn add(&self, url: &str) -> Result<usize> {
        let url = validate(url)?;
        let mut lines = self.read_lines()?;
        if let Some(existing) = position_of(&lines, &url) {
            anyhow::bail!("URL already exists at line {existing}");
        }
        lines.push(url.clone());
        self.write_lines(&lines)?;
        info!(path = %self.path.display(), url, line = lines.len(), "Target added");
        Ok(lines.len())
    }

    /// One page of the file, 1-based. Page 0 is treated as page 1.
    pub fn list_page(&self, page: usize) -> Result<Page> {
        let lines = self.read_lines()?;
        let total = lines.len();
        let total_pages = total.div_ceil(PAGE_SIZE).max(1);
        let page = page.clamp(1, total_pages);

        let start = (page - 1) * PAGE_SIZE;
        let entries = lines
            .into_iter()
            .enumerate()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|(i, url)| (i + 1, url))
            .collect();

        Ok(Page {
            entries,
            page,
            total_pages,
            total,
        })
    }

    /// Remove the URL at a 1-based line; returns what was removed.
    pub fn remove(&self, line: usize) -> Result<String> {
        let mut lines = self.read_lines()?;
        if line == 0 || line > lines.len() {
            anyhow::bail!("line {line} is out of range (file has {} URLs)", lines.len());
        }
        let removed = lines.remove(line - 1);
        self.write_lines(&lines)?;
        info!(path = %self.path.display(), url = removed, line, "Target removed");
        Ok(removed)
    }

    /// Replace the URL at a 1-based line; fails when the new URL already
    /// exists elsewhere in the file. Returns the replaced URL.
    pub fn update(&self, line: usize, url: &str) -> Result<String> {
        let url = validate(url)?;
        let mut lines = self.read_lines()?;
        if line == 0 || line > lines.len() {
            anyhow::bail!("line {line} is out of range (file has {} URLs)", lines.len());
        }
        if let Some(existing) = position_of(&lines, &url) {
            if existing != line {
                anyhow::bail!("URL already exists at line {existing}");
            }
        }
        let old = std::mem::replace(&mut lines[line - 1], url.clone());
        self.write_lines(&lines)?;
        info!(path = %self.path.display(), old, new = url, line, "Target updated");
        Ok(old)
    }

    /// All URLs in file order. A missing file reads as empty.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

fn position_of(lines: &[String], url: &str) -> Option<usize> {
    lines.iter().position(|l| l == url).map(|i| i + 1)
}

fn validate(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(MonsterIncError::Validation(format!("not a valid URL: {url:?}")).into());
    }
    let parseable = match Url::parse(trimmed) {
        Ok(u) => u.host_str().is_some(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}")).map(|u| u.host_str().is_some()).unwrap_or(false)
        }
        Err(_) => false,
    };
    if !parseable {
        return Err(MonsterIncError::Validation(format!("not a valid URL: {url:?}")).into());
    }
    Ok(trimmed.to_string())
}
