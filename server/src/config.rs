//! Configuration management for the server.

use gitdoc_store::StoreConfig;
use std::env;

use crate::waitlist::{waitlist_schema, WAITLIST};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Endpoint notification emails are posted to
    pub smtp_endpoint: Option<String>,
    /// Sender address for notification emails
    pub smtp_from: Option<String>,
    /// Recipient of new-subscriber notifications
    pub admin_email: Option<String>,
    /// Bearer token required to list subscribers
    pub auth_secret: Option<String>,
    pub store: StoreConfig,
}

impl Config {
    /// Configuration with server defaults around a store configuration.
    ///
    /// The waitlist collection rules are added unless the store
    /// configuration already defines them.
    pub fn new(mut store: StoreConfig) -> Self {
        if store.schema.get_collection(WAITLIST).is_none() {
            store.schema.add_collection(WAITLIST, waitlist_schema());
        }
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            smtp_endpoint: None,
            smtp_from: None,
            admin_email: None,
            auth_secret: None,
            store,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(StoreConfig::from_env()?);

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidPort)?;
        }

        let optional = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        config.smtp_endpoint = optional("SMTP_ENDPOINT");
        config.smtp_from = optional("SMTP_FROM");
        config.admin_email = optional("ADMIN_EMAIL");
        config.auth_secret = optional("AUTH_SECRET");

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error(transparent)]
    Store(#[from] gitdoc_store::ConfigError),
}
