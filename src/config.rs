use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing mandatory environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    File {
        confirmed_path: PathBuf,
        pending_path: PathBuf,
    },
    MySql {
        database_url: String,
    },
    Memory,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub moderator_role: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub registry_url: String,
    pub registry_timeout: Duration,
    pub sync_interval: Duration,
    pub cycle_deadline: Duration,
    pub store: StoreBackend,
    pub listen_addr: SocketAddr,
    pub auth: AuthSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let secs = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(0) | Err(_) => Err(ConfigError::Invalid { key, value }),
                    Ok(n) => Ok(Duration::from_secs(n)),
                },
            }
        };

        let store = match get("STORE_BACKEND").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("file") => StoreBackend::File {
                confirmed_path: get("WHITELISTED_PLAYERS_FILE")
                    .unwrap_or_else(|| "data/whitelisted.json".to_string())
                    .into(),
                pending_path: get("PENDING_PLAYERS_FILE")
                    .unwrap_or_else(|| "data/pending.json".to_string())
                    .into(),
            },
            Some("mysql") => StoreBackend::MySql {
                database_url: required("DATABASE_URL")?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let host = get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = get("SERVER_PORT").unwrap_or_else(|| "3000".to_string());
        let addr = format!("{}:{}", host, port);
        let listen_addr = SocketAddr::from_str(&addr).map_err(|_| ConfigError::Invalid {
            key: "SERVER_HOST/SERVER_PORT",
            value: addr.clone(),
        })?;

        let registry_url = required("WHITELIST_API_URL")?;
        if reqwest::Url::parse(&registry_url).is_err() {
            return Err(ConfigError::Invalid {
                key: "WHITELIST_API_URL",
                value: registry_url,
            });
        }

        Ok(Self {
            registry_url,
            registry_timeout: secs("REGISTRY_TIMEOUT_SECS", 10)?,
            sync_interval: secs("SYNC_INTERVAL_SECS", 300)?,
            cycle_deadline: secs("CYCLE_DEADLINE_SECS", 1800)?,
            store,
            listen_addr,
            auth: AuthSettings {
                jwt_secret: required("JWT_SECRET")?,
                moderator_role: get("MODERATOR_ROLE").unwrap_or_else(|| "moderator".to_string()),
            },
        })
    }
}
