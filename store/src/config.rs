//! Store configuration.

use gitdoc_engine::Schema;
use std::env;
use std::fmt;
use std::time::Duration;

/// Default branch collections are read from and committed to.
pub const DEFAULT_BRANCH: &str = "main";

/// Default directory holding one `<collection>.json` file per collection.
pub const DEFAULT_BASE_PATH: &str = "db";

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default interval between poll ticks of a subscribed collection.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default fixed delay before retrying a conflicted write.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Default number of attempts for a write that keeps conflicting.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

/// Configuration for a [`DocStore`](crate::DocStore).
#[derive(Clone)]
pub struct StoreConfig {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Access token sent with every request
    pub token: String,
    pub branch: String,
    pub base_path: String,
    pub api_url: String,
    /// Insert rules per collection
    pub schema: Schema,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub max_write_attempts: u32,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("branch", &self.branch)
            .field("base_path", &self.base_path)
            .field("api_url", &self.api_url)
            .field("schema", &self.schema)
            .field("poll_interval", &self.poll_interval)
            .field("retry_delay", &self.retry_delay)
            .field("max_write_attempts", &self.max_write_attempts)
            .finish()
    }
}

impl StoreConfig {
    /// Create a configuration with defaults for everything but the
    /// repository identity and credential.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            branch: DEFAULT_BRANCH.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            schema: Schema::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the attempt ceiling for conflicted writes (at least one attempt).
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `GITHUB_OWNER`, `GITHUB_REPO` and `GITHUB_TOKEN` are required.
    /// `GITHUB_BRANCH`, `GITHUB_API_URL`, `GITDOC_BASE_PATH`,
    /// `GITDOC_POLL_INTERVAL_SECS` and `GITDOC_SCHEMA` (JSON) are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };

        let mut config = Self::new(
            require("GITHUB_OWNER")?,
            require("GITHUB_REPO")?,
            require("GITHUB_TOKEN")?,
        );

        if let Some(branch) = lookup("GITHUB_BRANCH") {
            config.branch = branch;
        }
        if let Some(api_url) = lookup("GITHUB_API_URL") {
            config.api_url = api_url;
        }
        if let Some(base_path) = lookup("GITDOC_BASE_PATH") {
            config.base_path = base_path;
        }
        if let Some(secs) = lookup("GITDOC_POLL_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("GITDOC_POLL_INTERVAL_SECS"))?;
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(schema) = lookup("GITDOC_SCHEMA") {
            config.schema = serde_json::from_str(&schema)
                .map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;
        }

        Ok(config)
    }

    /// Remote path of a collection's file.
    pub fn path_for(&self, collection: &str) -> String {
        collection_path(&self.base_path, collection)
    }

    /// Whether repository identity and credential are all present.
    pub fn is_complete(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty() && !self.token.is_empty()
    }
}

pub(crate) fn collection_path(base_path: &str, collection: &str) -> String {
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        format!("{}.json", collection)
    } else {
        format!("{}/{}.json", base, collection)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("invalid numeric value for {0}")]
    InvalidNumber(&'static str),

    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),
}
