//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP listener and request authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    /// Default: 0.0.0.0
    pub host: String,

    /// HTTP port.
    /// Default: 5000
    pub http_port: u16,

    /// Shared secret expected in the `X-API-Key` header.
    /// Protected routes answer 500 while this is unset.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 5000,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where generated MIDI files are kept.
    /// Default: ~/.local/share/koe/artifacts
    pub artifact_dir: PathBuf,
}

impl PathsConfig {
    fn default_artifact_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("koe/artifacts"))
            .unwrap_or_else(|| PathBuf::from(".koe/artifacts"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: Self::default_artifact_dir(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error, or an EnvFilter string).
    /// Default: info
    pub log_level: String,

    /// OTLP gRPC endpoint. Trace export is off while unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

/// Audio download limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Default: 30000
    pub timeout_ms: u64,

    /// Downloads larger than this are rejected.
    /// Default: 100 MiB
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Remote transcription backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Base URL; requests go to `{endpoint}/transcribe`.
    /// Unset means every run takes the fallback path.
    pub endpoint: Option<String>,

    /// Default: 60000
    pub timeout_ms: u64,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 60_000,
        }
    }
}

/// Chord analysis tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rate audio is resampled to before analysis.
    /// Default: 22050
    pub sample_rate: u32,

    /// Window width in seconds.
    /// Default: 1.0
    pub window_seconds: f64,

    /// Window width in beats. Takes precedence over `window_seconds` when set.
    pub window_beats: Option<f64>,

    /// Default: 0.5
    pub min_overlap: f64,

    /// Reduce the melody track to its top line.
    /// Default: true
    pub melody_monophonic: bool,

    /// Collapse consecutive identical chords.
    /// Default: false
    pub merge_repeats: bool,

    /// Relative chroma energy a pitch class needs in the fallback note source.
    /// Default: 0.6
    pub chroma_threshold: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            window_seconds: 1.0,
            window_beats: None,
            min_overlap: 0.5,
            melody_monophonic: true,
            merge_repeats: false,
            chroma_threshold: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.http_port, 5000);
        assert!(server.api_key.is_none());
    }

    #[test]
    fn test_paths_defaults() {
        let paths = PathsConfig::default();
        assert!(paths.artifact_dir.to_string_lossy().contains("koe"));
    }

    #[test]
    fn test_limits_defaults() {
        assert_eq!(FetchConfig::default().max_bytes, 104_857_600);
        assert_eq!(TranscriberConfig::default().timeout_ms, 60_000);
        let analysis = AnalysisConfig::default();
        assert_eq!(analysis.sample_rate, 22_050);
        assert!(analysis.window_beats.is_none());
        assert!(!analysis.merge_repeats);
    }
}
