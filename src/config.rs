//! Application configuration.
//!
//! The configuration is assembled from two JSON files under a config root:
//! `application.json` provides the `app` section and `env/<profile>.json`
//! the `env` section. The profile comes from the `ENV` variable and
//! defaults to `"default"`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Profile used when `ENV` is unset or empty.
pub const DEFAULT_PROFILE: &str = "default";

/// Config root used when `CONFIG_DIR` is unset.
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app: AppSection,
    pub env: EnvSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSection {
    pub name: String,
    #[serde(default)]
    pub author: String,
    /// Client types allowed to connect, keyed by type.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    "browser".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSection {
    #[serde(rename = "type")]
    pub env_type: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub websockets: WebSocketsConfig,
    #[serde(default)]
    pub assets_domain: String,
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketsConfig {
    pub path: String,
    /// Milliseconds.
    pub ping_interval: u64,
}

impl Default for WebSocketsConfig {
    fn default() -> Self {
        Self {
            path: "socket".to_string(),
            ping_interval: 5000,
        }
    }
}

/// Profile name from `ENV`.
pub fn profile_from_env() -> String {
    std::env::var("ENV")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Config root from `CONFIG_DIR`.
pub fn config_dir_from_env() -> PathBuf {
    std::env::var("CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Load `application.json` and `env/<profile>.json` from `dir`.
pub fn load(dir: &Path, profile: &str) -> Result<AppConfig, ConfigError> {
    let app_path = dir.join("application.json");
    let env_path = dir.join("env").join(format!("{profile}.json"));

    let app = read_json(&app_path)?;
    let env = read_json(&env_path)?;

    let merged = serde_json::json!({ "app": app, "env": env });
    serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
        path: env_path,
        source,
    })
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Emulated peer count from a launch URL's `emulate` query parameter.
///
/// Missing, non-numeric, or zero values give `1`.
pub fn emulated_peers(url: &reqwest::Url) -> usize {
    url.query_pairs()
        .find(|(key, _)| key == "emulate")
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .filter(|&count| count > 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, env_file: &str, env: &str) {
        std::fs::create_dir_all(dir.join("env")).unwrap();
        std::fs::write(
            dir.join("application.json"),
            r#"{ "name": "ensemble", "author": "unknown", "clients": { "player": { "target": "browser" } } }"#,
        )
        .unwrap();
        std::fs::write(dir.join("env").join(env_file), env).unwrap();
    }

    #[test]
    fn test_load_merges_app_and_env() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "default.json",
            r#"{ "type": "development", "port": 8000, "assetsDomain": "", "websockets": { "path": "socket", "pingInterval": 5000 } }"#,
        );

        let config = load(dir.path(), "default").unwrap();
        assert_eq!(config.app.name, "ensemble");
        assert_eq!(config.app.clients["player"].target, "browser");
        assert_eq!(config.env.env_type, "development");
        assert_eq!(config.env.websockets.ping_interval, 5000);
    }

    #[test]
    fn test_env_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "production.json", r#"{ "type": "production" }"#);

        let config = load(dir.path(), "production").unwrap();
        assert_eq!(config.env.port, 8000);
        assert_eq!(config.env.websockets, WebSocketsConfig::default());
        assert_eq!(config.env.assets_domain, "");
    }

    #[test]
    fn test_missing_profile_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "default.json", r#"{ "type": "development" }"#);
        let err = load(dir.path(), "staging").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("staging.json"));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "default.json", "{ not json");
        assert!(matches!(load(dir.path(), "default"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_emulated_peers_from_url() {
        let parse = |s: &str| emulated_peers(&reqwest::Url::parse(s).unwrap());
        assert_eq!(parse("http://127.0.0.1:8000/?emulate=3"), 3);
        assert_eq!(parse("http://127.0.0.1:8000/"), 1);
        assert_eq!(parse("http://127.0.0.1:8000/?emulate=0"), 1);
        assert_eq!(parse("http://127.0.0.1:8000/?emulate=abc"), 1);
    }
}
