use std::net::SocketAddr;

use thiserror::Error;

use crate::db::DbConfig;

/// Which store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// In-process maps; data is lost on restart.
    Memory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub store: StoreKind,
    pub database: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_addr = get("PLACEMENT_LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let listen_addr: SocketAddr = raw_addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                var: "PLACEMENT_LISTEN_ADDR",
                value: raw_addr.clone(),
                reason: e.to_string(),
            }
        })?;

        let log_level = get("PLACEMENT_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dev_mode = get("PLACEMENT_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let store = match get("PLACEMENT_STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PLACEMENT_STORE",
                    value: other.to_string(),
                    reason: "expected postgres or memory".to_string(),
                })
            }
        };

        let database = DbConfig::from_lookup(&get);

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            store,
            database,
        })
    }
}
