//! Scanner process status for the bot's `status` command: pid lookup via
//! `pgrep -f`, with uptime and memory read from /proc where available.

use std::process::Command;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub memory_mb: Option<u64>,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.running {
            return write!(f, "scanner is not running");
        }
        write!(f, "scanner is running")?;
        if let Some(pid) = self.pid {
            write!(f, " (pid {pid})")?;
        }
        if let Some(uptime) = self.uptime_secs {
            write!(f, ", up {}m", uptime / 60)?;
        }
        if let Some(mem) = self.memory_mb {
            write!(f, ", {mem} MB")?;
        }
        Ok(())
    }
}

/// Look the scanner process up by command-line pattern. `pgrep` exiting
/// with code 1 means "no such process" and is not an error.
pub fn scanner_status(pattern: &str) -> Result<ProcessStatus> {
    let output = Command::new("pgrep")
        .arg("-f")
        .arg(pattern)
        .output()
        .context("running pgrep")?;

    match output.status.code() {
        Some(0) => {}
        Some(1) => return Ok(ProcessStatus::default()),
        code => anyhow::bail!("pgrep failed with status {code:?}"),
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pid: u32 = stdout
        .lines()
        .next()
        .and_then(|l| l.trim().parse().ok())
        .context("parsing pgrep output")?;

    Ok(ProcessStatus {
        running: true,
        pid: Some(pid),
        uptime_secs: process_uptime_secs(pid),
        memory_mb: process_memory_mb(pid),
    })
}

/// Seconds since the process started, from /proc/<pid>/stat field 22
/// (starttime, in clock ticks) against /proc/uptime.
fn process_uptime_secs(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Field 2 (comm) may contain spaces; skip past the closing paren.
    let after_comm = stat.rsplit_once(')')?.1;
    let start_ticks: u64 = after_comm.split_whitespace().nth(19)?.parse().ok()?;

    let uptime = std::fs::read_to_string("/proc/uptime").ok()?;
    let system_uptime: f64 = uptime.split_whitespace().next()?.parse().ok()?;

    let ticks_per_sec = 100.0; // _SC_CLK_TCK on every mainstream Linux
    let started = start_ticks as f64 / ticks_per_sec;
    Some((system_uptime - started).max(0.0) as u64)
}

fn process_memory_mb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}
