//! Configuration management
//!
//! Credentials come from the environment, tuning knobs from an optional TOML
//! file. Both are read once at startup; after that the controller only sees
//! an immutable [`AgentConfig`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_USERNAME: &str = "KMITL_USERNAME";
pub const ENV_PASSWORD: &str = "KMITL_PASSWORD";
pub const ENV_IP_ADDRESS: &str = "IP_ADDRESS";
pub const ENV_MAX_LOGIN_ATTEMPT: &str = "MAX_LOGIN_ATTEMPT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    MissingCredential(&'static str),

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Root of the TOML file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    /// Controller timing and login budget
    #[serde(default)]
    pub agent: AgentSection,

    /// Portal fallback values
    #[serde(default)]
    pub portal: PortalSection,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File the settings were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentSection {
    /// Seconds to wait between checks while connected
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Seconds to wait between login attempts while disconnected
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,

    /// Consecutive failed logins before restarting; non-positive is unlimited
    #[serde(default)]
    pub max_login_attempts: Option<i64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            retry_interval: default_retry_interval(),
            max_login_attempts: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalSection {
    /// Access point IP sent when discovery does not report one
    #[serde(default = "default_fallback_acip")]
    pub fallback_acip: String,
}

impl Default for PortalSection {
    fn default() -> Self {
        Self {
            fallback_acip: default_fallback_acip(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Honour HTTP_PROXY / HTTPS_PROXY from the environment
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            use_system_proxy: default_use_system_proxy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_check_interval() -> u64 {
    5 * 60
}

fn default_retry_interval() -> u64 {
    10
}

fn default_fallback_acip() -> String {
    "10.252.155.2".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_use_system_proxy() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FileConfig {
    /// Load the first config file found, or defaults if there is none.
    ///
    /// An explicit path must exist; the well-known locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::read(path);
        }

        let config_paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/kmitl-autologin/config.toml"),
            dirs::home_dir()
                .map(|h| h.join(".config/kmitl-autologin/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                return Self::read(path);
            }
        }

        Ok(Self::default())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }
}

/// Everything the controller and portal need for one run.
///
/// Built once per supervisory cycle. The fallback hardware identifier is
/// drawn when the record is built and stays fixed for its lifetime.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub username: String,
    pub password: String,
    /// Client address sent when discovery does not report one; may be empty
    pub ip_address: String,
    pub check_interval: Duration,
    pub retry_interval: Duration,
    /// `None` means unlimited
    pub max_login_attempts: Option<u32>,
    pub fallback_acip: String,
    pub fallback_umac: String,
}

impl AgentConfig {
    /// Build from the process environment and the file settings
    pub fn from_env(file: &FileConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), file)
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Fails before anything touches the network when either credential is
    /// missing or empty.
    pub fn from_lookup<F>(lookup: F, file: &FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(ENV_USERNAME)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential(ENV_USERNAME))?;
        let password = lookup(ENV_PASSWORD)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential(ENV_PASSWORD))?;

        let max_login_attempts = match lookup(ENV_MAX_LOGIN_ATTEMPT) {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) => login_budget(n),
                Err(_) => {
                    tracing::warn!(
                        "Ignoring {}='{}': not an integer, login attempts are unlimited",
                        ENV_MAX_LOGIN_ATTEMPT,
                        raw
                    );
                    None
                }
            },
            None => file.agent.max_login_attempts.and_then(login_budget),
        };

        Ok(Self {
            username,
            password,
            ip_address: lookup(ENV_IP_ADDRESS).unwrap_or_default(),
            check_interval: Duration::from_secs(file.agent.check_interval),
            retry_interval: Duration::from_secs(file.agent.retry_interval),
            max_login_attempts,
            fallback_acip: file.portal.fallback_acip.clone(),
            fallback_umac: random_umac(),
        })
    }

    /// Same settings with a freshly drawn fallback hardware identifier
    pub fn renewed(&self) -> Self {
        Self {
            fallback_umac: random_umac(),
            ..self.clone()
        }
    }
}

fn login_budget(n: i64) -> Option<u32> {
    if n > 0 {
        Some(u32::try_from(n).unwrap_or(u32::MAX))
    } else {
        None
    }
}

/// Six random bytes as twelve lowercase hex digits, no separators
pub fn random_umac() -> String {
    let bytes: [u8; 6] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
