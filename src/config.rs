//! Client Configuration
//!
//! Defaults, then an optional JSON file, then `RLZ_*` environment variables.
//! Later sources win.
//!
//! | Variable                 | Field                |
//! |--------------------------|----------------------|
//! | `RLZ_CONFIG`             | path of the JSON file |
//! | `RLZ_SERVER_URL`         | `server_url`         |
//! | `RLZ_STORE_DIR`          | `store_dir`          |
//! | `RLZ_LOCK_TIMEOUT_MS`    | `lock_timeout_ms`    |
//! | `RLZ_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
//! | `RLZ_RETRY_ATTEMPTS`     | `retry_attempts`     |
//! | `RLZ_OWNER`              | `owner`              |

use crate::access::DEFAULT_LOCK_TIMEOUT;
use crate::error::{Result, RlzError};
use crate::model::types::OwnerId;
use crate::ping::protocol::DEFAULT_FINANCIAL_SERVER;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "RLZ_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host of the financial server, without a path.
    pub server_url: String,
    /// Root of the file store and location of the lock file.
    pub store_dir: PathBuf,
    pub lock_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retry_attempts: usize,
    /// `"machine"`, a user name, or unset for the current user.
    pub owner: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_FINANCIAL_SERVER.to_string(),
            store_dir: PathBuf::from(".rlz"),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            request_timeout_ms: 5000,
            retry_attempts: 3,
            owner: None,
        }
    }
}

impl ClientConfig {
    /// Loads `path` (or `$RLZ_CONFIG`) when given, then applies the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RlzError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| RlzError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Applies `RLZ_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("RLZ_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(dir) = lookup("RLZ_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("RLZ_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = parse_var("RLZ_LOCK_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("RLZ_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_var("RLZ_REQUEST_TIMEOUT_MS", &ms)?;
        }
        if let Some(attempts) = lookup("RLZ_RETRY_ATTEMPTS") {
            self.retry_attempts = parse_var("RLZ_RETRY_ATTEMPTS", &attempts)?;
        }
        if let Some(owner) = lookup("RLZ_OWNER") {
            self.owner = Some(owner);
        }
        Ok(self)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn owner_id(&self) -> OwnerId {
        match self.owner.as_deref() {
            Some("machine") => OwnerId::machine(),
            Some(name) => OwnerId::user(name),
            None => OwnerId::current_user(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RlzError::Config(format!("{} has invalid value '{}'", name, value)))
}
