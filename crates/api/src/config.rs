//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use crudforge_observability::LogFormat;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub log_format: LogFormat,
    /// Only consulted when built with the `postgres` feature.
    pub database_url: Option<String>,
    dev_secret: bool,
}

impl ApiConfig {
    /// Reads `CRUDFORGE_BIND`, `JWT_SECRET`, `LOG_FORMAT` and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = non_empty("CRUDFORGE_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "CRUDFORGE_BIND",
                reason: e.to_string(),
            })?;

        let log_format = match non_empty("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::Invalid { var: "LOG_FORMAT", reason })?,
            None => LogFormat::default(),
        };

        let (jwt_secret, dev_secret) = match non_empty("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            log_format,
            database_url: non_empty("DATABASE_URL"),
            dev_secret,
        })
    }

    /// True when `JWT_SECRET` was absent and the insecure default is in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.dev_secret
    }
}
