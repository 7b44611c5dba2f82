//! Per-connection configuration negotiation.
//!
//! The coordinator runs the negotiation callback for every incoming
//! connection and returns the subset of its configuration a client needs.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, WebSocketsConfig};
use crate::plugins::PluginError;

/// What the coordinator knows about an incoming connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
}

/// Configuration handed to a client. Exactly these fields, nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NegotiatedConfig {
    pub client_type: String,
    pub app: NegotiatedApp,
    pub env: NegotiatedEnv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NegotiatedApp {
    pub name: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NegotiatedEnv {
    #[serde(rename = "type")]
    pub env_type: String,
    pub websockets: WebSocketsConfig,
    pub assets_domain: String,
}

/// `(client_type, config, connection) -> negotiated config`.
pub type NegotiationCallback = Arc<
    dyn Fn(&str, &AppConfig, &ConnectionMetadata) -> anyhow::Result<NegotiatedConfig> + Send + Sync,
>;

/// Callback that accepts the client types declared in `app.clients`.
pub fn default_negotiation() -> NegotiationCallback {
    Arc::new(|client_type: &str, config: &AppConfig, _connection: &ConnectionMetadata| {
        if !config.app.clients.contains_key(client_type) {
            anyhow::bail!("unknown client type '{client_type}'");
        }
        Ok(NegotiatedConfig {
            client_type: client_type.to_string(),
            app: NegotiatedApp {
                name: config.app.name.clone(),
                author: config.app.author.clone(),
            },
            env: NegotiatedEnv {
                env_type: config.env.env_type.clone(),
                websockets: config.env.websockets.clone(),
                assets_domain: config.env.assets_domain.clone(),
            },
        })
    })
}

/// Run the callback for one connection.
pub fn negotiate(
    callback: &NegotiationCallback,
    client_type: &str,
    config: &AppConfig,
    connection: &ConnectionMetadata,
) -> Result<NegotiatedConfig, PluginError> {
    callback(client_type, config, connection).map_err(|cause| {
        log::warn!(
            "[negotiation] Rejected '{}' from {:?}: {:#}",
            client_type,
            connection.remote_addr,
            cause
        );
        PluginError::negotiation(cause)
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use crate::config::{AppConfig, AppSection, ClientConfig, EnvSection, WebSocketsConfig};

    pub fn app_config() -> AppConfig {
        AppConfig {
            app: AppSection {
                name: "ensemble".to_string(),
                author: "unknown".to_string(),
                clients: BTreeMap::from([(
                    "player".to_string(),
                    ClientConfig {
                        target: "browser".to_string(),
                    },
                )]),
            },
            env: EnvSection {
                env_type: "development".to_string(),
                port: 0,
                websockets: WebSocketsConfig::default(),
                assets_domain: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn keys(value: &Value, prefix: &str, out: &mut Vec<String>) {
        if let Value::Object(map) = value {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match child {
                    Value::Object(_) if path != "env.websockets" => keys(child, &path, out),
                    _ => out.push(path),
                }
            }
        }
    }

    #[test]
    fn test_player_negotiation_has_exact_keys() {
        let config = fixtures::app_config();
        let negotiated = negotiate(
            &default_negotiation(),
            "player",
            &config,
            &ConnectionMetadata::default(),
        )
        .unwrap();

        let value = serde_json::to_value(&negotiated).unwrap();
        let mut found = Vec::new();
        keys(&value, "", &mut found);
        found.sort();
        assert_eq!(
            found,
            vec![
                "app.author",
                "app.name",
                "clientType",
                "env.assetsDomain",
                "env.type",
                "env.websockets",
            ]
        );
        assert_eq!(value["clientType"], "player");
        assert_eq!(value["env"]["websockets"]["pingInterval"], 5000);
    }

    #[test]
    fn test_unknown_client_type_is_negotiation_failure() {
        let err = negotiate(
            &default_negotiation(),
            "controller",
            &fixtures::app_config(),
            &ConnectionMetadata::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PluginError::NegotiationFailure(_)));
        assert!(err.to_string().contains("controller"));
    }

    #[test]
    fn test_negotiated_config_rejects_extra_fields() {
        let json = serde_json::json!({
            "clientType": "player",
            "app": { "name": "a", "author": "b" },
            "env": { "type": "development", "websockets": { "path": "socket", "pingInterval": 1 }, "assetsDomain": "" },
            "extra": true,
        });
        assert!(serde_json::from_value::<NegotiatedConfig>(json).is_err());
    }
}
