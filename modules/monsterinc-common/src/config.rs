use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration, grouped by subsystem. All groups have usable
/// defaults so a partial config file (or none at all) still scans.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonsterIncConfig {
    pub scan_batch: ScanBatchConfig,
    pub crawler: CrawlerConfig,
    pub probe: ProbeConfig,
    pub reporter: ReporterConfig,
    pub resource_limiter: ResourceLimiterConfig,
    pub progress_display: ProgressDisplayConfig,
}

impl MonsterIncConfig {
    /// Log the effective limits that govern a scan run.
    pub fn log_summary(&self) {
        tracing::info!(
            batch_size = self.scan_batch.batch_size,
            threshold_size = self.scan_batch.threshold_size,
            crawler_concurrency = self.crawler.max_concurrent_requests,
            probe_threads = self.probe.threads,
            auto_calibrate = self.crawler.auto_calibrate.enabled,
            "Effective scan configuration"
        );
    }
}

// --- Scan batching ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanBatchConfig {
    /// Targets per batch once batching engages.
    pub batch_size: usize,
    /// Batches in flight at once. Kept at 1 unless memory allows more.
    pub max_concurrent_batch: usize,
    pub batch_timeout_minutes: u64,
    /// Target counts at or below this run as a single batch.
    pub threshold_size: usize,
}

impl Default for ScanBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent_batch: 1,
            batch_timeout_minutes: 30,
            threshold_size: 100,
        }
    }
}

// --- Crawler ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
    pub max_depth: u32,
    pub user_agent: String,
    pub insecure_skip_tls_verify: bool,
    pub seed_urls: Vec<String>,
    pub scope: CrawlerScopeConfig,
    /// Add each seed's hostname to the allowed scope automatically.
    pub auto_add_seed_hostnames: bool,
    pub url_normalization: UrlNormalizationConfig,
    pub auto_calibrate: AutoCalibrateConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 20,
            request_timeout_secs: 30,
            max_depth: 2,
            user_agent: "monsterinc/0.1".to_string(),
            insecure_skip_tls_verify: false,
            seed_urls: Vec::new(),
            scope: CrawlerScopeConfig::default(),
            auto_add_seed_hostnames: true,
            url_normalization: UrlNormalizationConfig::default(),
            auto_calibrate: AutoCalibrateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrawlerScopeConfig {
    pub allowed_hostnames: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlNormalizationConfig {
    pub strip_fragments: bool,
    pub strip_tracking_params: bool,
    /// Query keys to delete on top of the built-in tracking set.
    pub custom_strip_params: Vec<String>,
    /// Scheme applied to inputs that arrive without one.
    pub default_scheme: String,
}

impl Default for UrlNormalizationConfig {
    fn default() -> Self {
        Self {
            strip_fragments: true,
            strip_tracking_params: true,
            custom_strip_params: Vec::new(),
            default_scheme: "https".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoCalibrateConfig {
    pub enabled: bool,
    /// Admission cap per URL fingerprint.
    pub max_similar_urls: usize,
    /// Query keys dropped entirely when fingerprinting.
    pub ignore_parameters: Vec<String>,
    pub auto_detect_locales: bool,
    pub custom_locale_codes: Vec<String>,
    pub enable_skip_logging: bool,
    /// Reset fingerprint counts between batches. Off by default: counts
    /// persist for the whole orchestrator run and reset between runs.
    pub reset_between_batches: bool,
}

impl Default for AutoCalibrateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_similar_urls: 30,
            ignore_parameters: Vec::new(),
            auto_detect_locales: true,
            custom_locale_codes: Vec::new(),
            enable_skip_logging: false,
            reset_between_batches: false,
        }
    }
}

// --- Probe runner ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub threads: usize,
    pub timeout_secs: u64,
    /// Requests per second. 0 = unlimited.
    pub rate_limit: u32,
    pub retries: u32,
    pub follow_redirects: bool,
    pub custom_headers: HashMap<String, String>,
    pub proxy: Option<String>,
    pub extract_title: bool,
    pub extract_headers: bool,
    pub extract_tech: bool,
    pub extract_body: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            threads: 50,
            timeout_secs: 10,
            rate_limit: 0,
            retries: 1,
            follow_redirects: true,
            custom_headers: HashMap::new(),
            proxy: None,
            extract_title: true,
            extract_headers: true,
            extract_tech: true,
            extract_body: false,
        }
    }
}

impl ProbeConfig {
    /// Whether a config change is material enough to force a new runner.
    /// Cosmetic fields (extract flags, headers) reuse the existing one.
    pub fn materially_differs(&self, other: &ProbeConfig) -> bool {
        self.threads != other.threads
            || self.timeout_secs != other.timeout_secs
            || self.rate_limit != other.rate_limit
            || self.retries != other.retries
            || self.follow_redirects != other.follow_redirects
    }
}

// --- Reporter ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub output_dir: PathBuf,
    /// Render a report even when there are zero probe results.
    pub generate_empty_report: bool,
    pub max_probe_results_per_report_file: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            generate_empty_report: false,
            max_probe_results_per_report_file: 1000,
        }
    }
}

// --- Resource limiter ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceLimiterConfig {
    pub max_memory_mb: u64,
    /// Advisory cap on spawned worker tasks.
    pub max_tasks: usize,
    pub check_interval_secs: u64,
    /// Fraction of `max_memory_mb` at which warnings start.
    pub memory_threshold: f64,
    pub cpu_threshold: f64,
    /// Always false at the scan-core layer; the process entry owns shutdown.
    pub enable_auto_shutdown: bool,
}

impl Default for ResourceLimiterConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_tasks: 0,
            check_interval_secs: 30,
            memory_threshold: 0.8,
            cpu_threshold: 0.9,
            enable_auto_shutdown: false,
        }
    }
}

// --- Progress display ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressDisplayConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ProgressDisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3,
        }
    }
}
