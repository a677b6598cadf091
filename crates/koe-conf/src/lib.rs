//! Configuration loading for koe.
//!
//! # Usage
//!
//! ```rust,no_run
//! use koe_conf::KoeConfig;
//!
//! let config = KoeConfig::load().expect("Failed to load config");
//! println!("listening on {}:{}", config.server.host, config.server.http_port);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/koe/config.toml` (system)
//! 2. `~/.config/koe/config.toml` (user)
//! 3. `./koe.toml` (local override, or the `--config` path instead)
//! 4. Environment variables (`KOE_*`, plus `PORT`, `RUST_LOG`,
//!    `LIBROSA_API_KEY`, `OTEL_EXPORTER_OTLP_ENDPOINT`)
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! http_port = 5000
//! api_key = "change-me"
//!
//! [paths]
//! artifact_dir = "~/.local/share/koe/artifacts"
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = "127.0.0.1:4317"
//!
//! [transcriber]
//! endpoint = "http://127.0.0.1:2000"
//! timeout_ms = 60000
//!
//! [analysis]
//! window_beats = 2.0
//! merge_repeats = true
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{
    AnalysisConfig, FetchConfig, PathsConfig, ServerConfig, TelemetryConfig, TranscriberConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete koe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoeConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub telemetry: TelemetryConfig,
    pub fetch: FetchConfig,
    pub transcriber: TranscriberConfig,
    pub analysis: AnalysisConfig,
}

impl KoeConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, reading `config_path` in place of `./koe.toml`.
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let files = discover_config_files_with_override(config_path);
        let mut config = Self::from_files(&files)?;
        sources.files = files;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Defaults overlaid with `files` in order. No environment overrides.
    pub fn from_files(files: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in files {
            loader::merge_tables(&mut merged, loader::load_from_file(path)?);
        }
        let origin = files
            .last()
            .map(PathBuf::as_path)
            .unwrap_or(Path::new("<defaults>"));
        loader::to_config(merged, origin)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> String {
        // Built by hand so unset options show up as comments
        let mut output = String::new();

        output.push_str("# koe configuration\n\n");

        output.push_str("[server]\n");
        output.push_str(&format!("host = \"{}\"\n", self.server.host));
        output.push_str(&format!("http_port = {}\n", self.server.http_port));
        match &self.server.api_key {
            Some(_) => output.push_str("api_key = \"<redacted>\"\n"),
            None => output.push_str("# api_key = \"\"\n"),
        }

        output.push_str("\n[paths]\n");
        output.push_str(&format!(
            "artifact_dir = \"{}\"\n",
            self.paths.artifact_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));
        push_optional(&mut output, "otlp_endpoint", self.telemetry.otlp_endpoint.as_deref());

        output.push_str("\n[fetch]\n");
        output.push_str(&format!("timeout_ms = {}\n", self.fetch.timeout_ms));
        output.push_str(&format!("max_bytes = {}\n", self.fetch.max_bytes));

        output.push_str("\n[transcriber]\n");
        push_optional(&mut output, "endpoint", self.transcriber.endpoint.as_deref());
        output.push_str(&format!("timeout_ms = {}\n", self.transcriber.timeout_ms));

        let analysis = &self.analysis;
        output.push_str("\n[analysis]\n");
        output.push_str(&format!("sample_rate = {}\n", analysis.sample_rate));
        output.push_str(&format!("window_seconds = {:?}\n", analysis.window_seconds));
        match analysis.window_beats {
            Some(beats) => output.push_str(&format!("window_beats = {:?}\n", beats)),
            None => output.push_str("# window_beats = 2.0\n"),
        }
        output.push_str(&format!("min_overlap = {:?}\n", analysis.min_overlap));
        output.push_str(&format!("melody_monophonic = {}\n", analysis.melody_monophonic));
        output.push_str(&format!("merge_repeats = {}\n", analysis.merge_repeats));
        output.push_str(&format!("chroma_threshold = {:?}\n", analysis.chroma_threshold));

        output
    }
}

fn push_optional(output: &mut String, key: &str, value: Option<&str>) {
    match value {
        Some(v) => output.push_str(&format!("{} = \"{}\"\n", key, v)),
        None => output.push_str(&format!("# {} = \"\"\n", key)),
    }
}
