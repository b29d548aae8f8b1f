//! Slash-command parsing and dispatch. Pure string-in/string-out so any
//! chat transport can sit in front; errors become user-facing replies
//! instead of propagating.

use anyhow::Result;
use tracing::info;

use crate::status;
use crate::targets::TargetFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    AddUrl { url: String },
    AddJsHtml { url: String },
    ListUrls { page: usize },
    ListJsHtml { page: usize },
    RemoveUrl { line: usize },
    RemoveJsHtml { line: usize },
    UpdateUrl { line: usize, url: String },
    UpdateJsHtml { line: usize, url: String },
    ScanOnetime,
    Status,
}

impl BotCommand {
    /// Parse `command arg arg` input, e.g. `update-url 2 https://a.com`.
    pub fn parse(input: &str) -> Result<BotCommand> {
        let mut parts = input.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let one_url = |args: &[&str]| -> Result<String> {
            match args {
                [url] => Ok(url.to_string()),
                _ => anyhow::bail!("usage: {name} <url>"),
            }
        };
        let one_line = |args: &[&str]| -> Result<usize> {
            match args {
                [line] => line.parse().map_err(|_| anyhow::anyhow!("line must be a number")),
                _ => anyhow::bail!("usage: {name} <line>"),
            }
        };
        let line_and_url = |args: &[&str]| -> Result<(usize, String)> {
            match args {
                [line, url] => {
                    let line = line.parse().map_err(|_| anyhow::anyhow!("line must be a number"))?;
                    Ok((line, url.to_string()))
                }
                _ => anyhow::bail!("usage: {name} <line> <url>"),
            }
        };
        let page = |args: &[&str]| -> Result<usize> {
            match args {
                [] => Ok(1),
                [page] => page.parse().map_err(|_| anyhow::anyhow!("page must be a number")),
                _ => anyhow::bail!("usage: {name} [page]"),
            }
        };

        match name {
            "add-url" => Ok(BotCommand::AddUrl { url: one_url(&args)? }),
            "add-js-html" => Ok(BotCommand::AddJsHtml { url: one_url(&args)? }),
            "list-urls" => Ok(BotCommand::ListUrls { page: page(&args)? }),
            "list-js-html" => Ok(BotCommand::ListJsHtml { page: page(&args)? }),
            "remove-url" => Ok(BotCommand::RemoveUrl { line: one_line(&args)? }),
            "remove-js-html" => Ok(BotCommand::RemoveJsHtml { line: one_line(&args)? }),
            "update-url" => {
                let (line, url) = line_and_url(&args)?;
                Ok(BotCommand::UpdateUrl { line, url })
            }
            "update-js-html" => {
                let (line, url) = line_and_url(&args)?;
                Ok(BotCommand::UpdateJsHtml { line, url })
            }
            "scan-onetime" => Ok(BotCommand::ScanOnetime),
            "status" => Ok(BotCommand::Status),
            other => anyhow::bail!("unknown command: {other}"),
        }
    }
}

/// Handles parsed commands against the two target files. `scan-onetime`
/// fires the injected trigger; the scan itself runs elsewhere.
pub struct CommandHandler {
    urls: TargetFile,
    js_html: TargetFile,
    scanner_pattern: String,
    scan_trigger: Option<Box<dyn Fn() + Send + Sync>>,
}

impl CommandHandler {
    pub fn new(urls: TargetFile, js_html: TargetFile, scanner_pattern: &str) -> Self {
        Self {
            urls,
            js_html,
            scanner_pattern: scanner_pattern.to_string(),
            scan_trigger: None,
        }
    }

    /// Install the background-scan trigger used by `scan-onetime`.
    pub fn with_scan_trigger(mut self, trigger: Box<dyn Fn() + Send + Sync>) -> Self {
        self.scan_trigger = Some(trigger);
        self
    }

    /// Execute one command and render the reply. Failures become replies,
    /// never panics or propagated errors.
    pub fn handle(&self, command: BotCommand) -> String {
        match self.dispatch(command) {
            Ok(reply) => reply,
            Err(e) => format!("error: {e}"),
        }
    }

    fn dispatch(&self, command: BotCommand) -> Result<String> {
        match command {
            BotCommand::AddUrl { url } => {
                let line = self.urls.add(&url)?;
                Ok(format!("added {url} at line {line}"))
            }
            BotCommand::AddJsHtml { url } => {
                let line = self.js_html.add(&url)?;
                Ok(format!("added {url} at line {line}"))
            }
            BotCommand::ListUrls { page } => Ok(render_page(&self.urls, page)?),
            BotCommand::ListJsHtml { page } => Ok(render_page(&self.js_html, page)?),
            BotCommand::RemoveUrl { line } => {
                let removed = self.urls.remove(line)?;
                Ok(format!("removed {removed}"))
            }
            BotCommand::RemoveJsHtml { line } => {
                let removed = self.js_html.remove(line)?;
                Ok(format!("removed {removed}"))
            }
            BotCommand::UpdateUrl { line, url } => {
                let old = self.urls.update(line, &url)?;
                Ok(format!("replaced {old} with {url}"))
            }
            BotCommand::UpdateJsHtml { line, url } => {
                let old = self.js_html.update(line, &url)?;
                Ok(format!("replaced {old} with {url}"))
            }
            BotCommand::ScanOnetime => {
                let Some(trigger) = &self.scan_trigger else {
                    anyhow::bail!("one-time scans are not wired up");
                };
                trigger();
                info!("One-time scan triggered");
                Ok("one-time scan started in the background".to_string())
            }
            BotCommand::Status => {
                let status = status::scanner_status(&self.scanner_pattern)?;
                Ok(status.to_string())
            }
        }
    }
}

fn render_page(file: &TargetFile, page: usize) -> Result<String> {
    let page = file.list_page(page)?;
    if page.total == 0 {
        return Ok("no URLs configured".to_string());
    }
    let mut out = format!("page {}/{} ({} URLs)\n", page.page, page.total_pages, page.total);
    for (line, url) in &page.entries {
        out.push_str(&format!("{line:>3}. {url}\n"));
    }
    Ok(out)
}
