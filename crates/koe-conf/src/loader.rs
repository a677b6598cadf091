//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, KoeConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local `./koe.toml`.
/// Returns paths in load order (system, user, local/cli). Only existing files
/// are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/koe/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("koe/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("koe.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read and validate one TOML file, returning its raw table for merging.
pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Surface type errors against the file that caused them, not the merged result.
    to_config(table.clone(), path)?;
    Ok(table)
}

/// Deserialize a (possibly merged) table, filling gaps with defaults.
pub(crate) fn to_config(table: toml::Table, origin: &Path) -> Result<KoeConfig, ConfigError> {
    let mut config: KoeConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    config.paths.artifact_dir = expand_path(&config.paths.artifact_dir.to_string_lossy());
    Ok(config)
}

/// Merge `overlay` into `base` key by key. Nested tables merge recursively,
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut KoeConfig, sources: &mut ConfigSources) {
    apply_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides read through `lookup`. Where a `KOE_*` variable and a
/// generic one name the same setting, the `KOE_*` variable wins.
pub fn apply_overrides_with<F>(config: &mut KoeConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("KOE_HTTP_HOST") {
        config.server.host = v;
        sources.env_overrides.push("KOE_HTTP_HOST".to_string());
    }
    for key in ["PORT", "KOE_HTTP_PORT"] {
        if let Some(port) = var(key).and_then(|v| v.parse().ok()) {
            config.server.http_port = port;
            sources.env_overrides.push(key.to_string());
        }
    }
    for key in ["LIBROSA_API_KEY", "KOE_API_KEY"] {
        if let Some(v) = var(key) {
            config.server.api_key = Some(v);
            sources.env_overrides.push(key.to_string());
        }
    }

    if let Some(v) = var("KOE_ARTIFACT_DIR") {
        config.paths.artifact_dir = expand_path(&v);
        sources.env_overrides.push("KOE_ARTIFACT_DIR".to_string());
    }

    if let Some(v) = var("KOE_TRANSCRIBER_URL") {
        config.transcriber.endpoint = Some(v);
        sources.env_overrides.push("KOE_TRANSCRIBER_URL".to_string());
    }
    if let Some(ms) = var("KOE_TRANSCRIBER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.transcriber.timeout_ms = ms;
        sources.env_overrides.push("KOE_TRANSCRIBER_TIMEOUT_MS".to_string());
    }

    for key in ["RUST_LOG", "KOE_LOG_LEVEL"] {
        if let Some(v) = var(key) {
            config.telemetry.log_level = v;
            sources.env_overrides.push(key.to_string());
        }
    }
    for key in ["OTEL_EXPORTER_OTLP_ENDPOINT", "KOE_OTLP_ENDPOINT"] {
        if let Some(v) = var(key) {
            config.telemetry.otlp_endpoint = Some(v);
            sources.env_overrides.push(key.to_string());
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        let (name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        match (env::var(name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let table = parse_toml("[server]\nhttp_port = 9000\n", Path::new("test.toml")).unwrap();
        let config = to_config(table, Path::new("test.toml")).unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.analysis.min_overlap, 0.5);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[server]
host = "127.0.0.1"
http_port = 8123
api_key = "sekrit"

[paths]
artifact_dir = "/data/koe"

[telemetry]
log_level = "debug"
otlp_endpoint = "127.0.0.1:4317"

[fetch]
timeout_ms = 5000
max_bytes = 1024

[transcriber]
endpoint = "http://gpu:2000"
timeout_ms = 15000

[analysis]
sample_rate = 44100
window_beats = 2.0
min_overlap = 0.25
melody_monophonic = false
merge_repeats = true
chroma_threshold = 0.5
"#;
        let table = parse_toml(toml, Path::new("test.toml")).unwrap();
        let config = to_config(table, Path::new("test.toml")).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.api_key.as_deref(), Some("sekrit"));
        assert_eq!(config.paths.artifact_dir, PathBuf::from("/data/koe"));
        assert_eq!(config.telemetry.otlp_endpoint.as_deref(), Some("127.0.0.1:4317"));
        assert_eq!(config.fetch.max_bytes, 1024);
        assert_eq!(config.transcriber.endpoint.as_deref(), Some("http://gpu:2000"));
        assert_eq!(config.analysis.sample_rate, 44100);
        assert_eq!(config.analysis.window_beats, Some(2.0));
        assert!(config.analysis.merge_repeats);
        assert!(!config.analysis.melody_monophonic);
    }

    #[test]
    fn test_type_error_names_the_file() {
        let err = parse_toml("[server]\nhttp_port = \"lots\"\n", Path::new("bad.toml")).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, PathBuf::from("bad.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base: toml::Table = "[server]\nhost = \"10.0.0.1\"\nhttp_port = 7000\n".parse().unwrap();
        let overlay: toml::Table = "[server]\nhttp_port = 7001\n[fetch]\ntimeout_ms = 1\n".parse().unwrap();
        merge_tables(&mut base, overlay);

        let config = to_config(base, Path::new("merged")).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.http_port, 7001);
        assert_eq!(config.fetch.timeout_ms, 1);
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("PORT", "8000"),
            ("KOE_HTTP_PORT", "8001"),
            ("LIBROSA_API_KEY", "legacy"),
            ("KOE_TRANSCRIBER_URL", "http://oracle:9000"),
            ("KOE_TRANSCRIBER_TIMEOUT_MS", "2500"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317"),
        ]);
        let mut config = KoeConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_with(&mut config, &mut sources, |k| env.get(k).cloned());

        assert_eq!(config.server.http_port, 8001);
        assert_eq!(config.server.api_key.as_deref(), Some("legacy"));
        assert_eq!(config.transcriber.endpoint.as_deref(), Some("http://oracle:9000"));
        assert_eq!(config.transcriber.timeout_ms, 2500);
        assert_eq!(config.telemetry.otlp_endpoint.as_deref(), Some("collector:4317"));
        assert_eq!(
            sources.env_overrides,
            vec![
                "PORT",
                "KOE_HTTP_PORT",
                "LIBROSA_API_KEY",
                "KOE_TRANSCRIBER_URL",
                "KOE_TRANSCRIBER_TIMEOUT_MS",
                "OTEL_EXPORTER_OTLP_ENDPOINT",
            ]
        );
    }

    #[test]
    fn test_blank_and_malformed_env_values_are_ignored() {
        let env = env_of(&[("KOE_API_KEY", "  "), ("KOE_HTTP_PORT", "eighty")]);
        let mut config = KoeConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_with(&mut config, &mut sources, |k| env.get(k).cloned());

        assert!(config.server.api_key.is_none());
        assert_eq!(config.server.http_port, 5000);
        assert!(sources.env_overrides.is_empty());
    }

    #[test]
    fn test_discover_cli_override_replaces_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "").unwrap();

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
        assert!(!files.contains(&PathBuf::from("koe.toml")));
    }
}
