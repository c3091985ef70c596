//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.visiscan.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".visiscan.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Page fetcher settings.
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Analyzer settings.
    #[serde(default)]
    pub analyzers: AnalyzerConfig,

    /// AI-vision service settings.
    #[serde(default)]
    pub vision: VisionConfig,

    /// Scan history settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path for one-shot scans.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "visiscan_report.md".to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

/// Page fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Network timeout for the page request in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of redirects followed.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum accepted HTML body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// User-Agent header sent with page requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional render service returning a screenshot for `?url=<target>`.
    #[serde(default)]
    pub screenshot_url: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            user_agent: default_user_agent(),
            screenshot_url: None,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_user_agent() -> String {
    format!("visiscan/{}", env!("CARGO_PKG_VERSION"))
}

/// Analyzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Per-analyzer deadline in seconds.
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of heatmap zones reported.
    #[serde(default = "default_max_zones")]
    pub max_zones: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_analyzer_timeout(),
            max_zones: default_max_zones(),
        }
    }
}

fn default_analyzer_timeout() -> u64 {
    10
}

fn default_max_zones() -> usize {
    8
}

/// AI-vision settings. Without `ollama_url` the baseline analyzer is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Ollama API URL serving a vision-capable model.
    #[serde(default)]
    pub ollama_url: Option<String>,

    /// Vision model name.
    #[serde(default = "default_vision_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_vision_timeout")]
    pub timeout_seconds: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            ollama_url: None,
            model: default_vision_model(),
            temperature: default_temperature(),
            timeout_seconds: default_vision_timeout(),
        }
    }
}

fn default_vision_model() -> String {
    "llava:latest".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_vision_timeout() -> u64 {
    8
}

/// Scan history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file. History is memory-only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Time budget for persisting one report, in seconds.
    #[serde(default = "default_write_budget")]
    pub write_budget_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            write_budget_seconds: default_write_budget(),
        }
    }
}

fn default_write_budget() -> u64 {
    5
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Maximum number of recommendations in a report.
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_recommendations: default_max_recommendations(),
        }
    }
}

fn default_max_recommendations() -> usize {
    8
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(port) = args.port {
            let host = self
                .server
                .listen
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.listen = format!("{}:{}", host, port);
        }

        if let Some(timeout) = args.fetch_timeout {
            self.fetcher.timeout_seconds = timeout;
        }
        if let Some(timeout) = args.analyzer_timeout {
            self.analyzers.timeout_seconds = timeout;
        }
        if let Some(ref url) = args.screenshot_url {
            self.fetcher.screenshot_url = Some(url.clone());
        }

        if let Some(ref url) = args.vision_url {
            self.vision.ollama_url = Some(url.clone());
        }
        if let Some(ref model) = args.vision_model {
            self.vision.model = model.clone();
        }

        if let Some(ref path) = args.history {
            self.store.path = Some(path.clone());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetcher.timeout_seconds)
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzers.timeout_seconds)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision.timeout_seconds)
    }

    /// Time the vision analyzer may wait on its service. Capped at four fifths
    /// of the analyzer timeout so the baseline fallback still fits inside it.
    pub fn vision_budget(&self) -> Duration {
        self.vision_timeout().min(self.analyzer_timeout() * 4 / 5)
    }

    pub fn store_budget(&self) -> Duration {
        Duration::from_secs(self.store.write_budget_seconds)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
