use crate::models::RenderMode;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Output shape handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Aligned text table.
    Table,
    /// JSON sequence of records.
    Sequence,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Upstream base URL; all fetch targets must be same-origin with it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing entry points, relative to `base_url` (pagination included).
    #[serde(default)]
    pub entry_paths: Vec<String>,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Cap on concurrent in-flight HTTP fetches.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Separate, smaller cap for browser-mode fetches; rendering sessions
    /// are much heavier than plain requests.
    #[serde(default = "default_browser_concurrency")]
    pub browser_concurrency: usize,

    /// Render mode for page types without a fixed requirement.
    #[serde(default = "default_render_mode")]
    pub render_mode_default: RenderMode,

    /// Total fetch attempts per target, first try included.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: usize,

    /// Minimum spacing between request starts to the same host.
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Browser page-load wait ceiling in seconds.
    #[serde(default = "default_browser_timeout")]
    pub browser_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub browser_headless: bool,

    /// Skip image loading in the browser session.
    #[serde(default = "default_true")]
    pub browser_disable_images: bool,

    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
}

fn default_base_url() -> String {
    "https://www.vlr.gg".to_string()
}
fn default_max_concurrency() -> usize {
    8
}
fn default_browser_concurrency() -> usize {
    2
}
fn default_render_mode() -> RenderMode {
    RenderMode::Http
}
fn default_retry_limit() -> usize {
    3
}
fn default_min_request_interval() -> u64 {
    800
}
fn default_request_timeout() -> u64 {
    30
}
fn default_retry_base_delay() -> u64 {
    500
}
fn default_retry_max_delay() -> u64 {
    8000
}
fn default_browser_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_output_format() -> OutputFormat {
    OutputFormat::Table
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            browser_concurrency: default_browser_concurrency(),
            render_mode_default: default_render_mode(),
            retry_limit: default_retry_limit(),
            min_request_interval_ms: default_min_request_interval(),
            request_timeout_secs: default_request_timeout(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            browser_timeout_secs: default_browser_timeout(),
            browser_headless: true,
            browser_disable_images: true,
            output_format: default_output_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            entry_paths: Vec::new(),
            run: RunConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("config.toml invalid, using defaults: {}", e),
                }
            }
        }
        Self::default()
    }
}

impl RunConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.run.retry_limit, 3);
        assert!(cfg.run.browser_concurrency <= cfg.run.max_concurrency);
        assert_eq!(cfg.run.render_mode_default, RenderMode::Http);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            base_url = "https://www.vlr.gg"
            entry_paths = ["/event/matches/2095/champions-tour-2024-americas-stage-2"]

            [run]
            max_concurrency = 4
            output_format = "sequence"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.run.max_concurrency, 4);
        assert_eq!(cfg.run.output_format, OutputFormat::Sequence);
        assert_eq!(cfg.run.retry_limit, 3);
        assert_eq!(cfg.entry_paths.len(), 1);
    }
}
