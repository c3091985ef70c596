//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// VisiScan - visual health reports for web pages
///
/// Scores a page's visual clarity, accessibility, readability and focus,
/// builds an attention heatmap and suggests improvements. Runs as an HTTP
/// API by default, or scans a single URL with --url.
///
/// Examples:
///   visiscan
///   visiscan --port 8080 --history scans.json
///   visiscan --url https://example.com --format json --output report.json
///   visiscan --url https://example.com --vision-url http://localhost:11434
///   visiscan --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Scan this URL once and write a report instead of starting the server
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,

    /// Port for the HTTP API
    #[arg(short, long, env = "PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Output file path for a one-shot report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format for a one-shot report (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .visiscan.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file used to persist scan history between restarts
    #[arg(long, env = "VISISCAN_HISTORY", value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Page fetch timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// Per-analyzer timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub analyzer_timeout: Option<u64>,

    /// Render service used to capture screenshots (called with ?url=<target>)
    #[arg(long, env = "SCREENSHOT_URL", value_name = "URL")]
    pub screenshot_url: Option<String>,

    /// Ollama endpoint for the AI-vision analyzer
    ///
    /// When unset, a local baseline analysis is used instead.
    #[arg(long, env = "VISION_URL", value_name = "URL")]
    pub vision_url: Option<String>,

    /// Vision model name
    #[arg(long, env = "VISION_MODEL", value_name = "MODEL")]
    pub vision_model: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .visiscan.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        for (name, endpoint) in [
            ("Vision URL", &self.vision_url),
            ("Screenshot URL", &self.screenshot_url),
        ] {
            if let Some(endpoint) = endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(format!("{} must start with 'http://' or 'https://'", name));
                }
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.fetch_timeout == Some(0) || self.analyzer_timeout == Some(0) {
            return Err("Timeouts must be at least 1 second".to_string());
        }

        if self.port == Some(0) {
            return Err("Port must be between 1 and 65535".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            url: Some("https://example.com".to_string()),
            port: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            history: None,
            fetch_timeout: None,
            analyzer_timeout: None,
            screenshot_url: None,
            vision_url: None,
            vision_model: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_accepts_defaults() {
        assert!(make_args().validate().is_ok());

        let mut server = make_args();
        server.url = None;
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.url = Some("example.com".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.vision_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.analyzer_timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
