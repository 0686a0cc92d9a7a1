use std::path::PathBuf;
use std::time::Duration;

struct ServerDefaults;

impl ServerDefaults {
    const HOST: &'static str = "127.0.0.1";
    const PORT: u16 = 3030;
    const DATA_DIR: &'static str = "./data";
    const MAX_BODY_MB: usize = 200;
    const REAP_INTERVAL_SECS: u64 = 60;
}

/// Server settings, read from `FERRY_*` environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the file-system blob store
    pub data_dir: PathBuf,
    /// Largest accepted request body
    pub max_body_mb: usize,
    /// Seconds between housekeeping passes, 0 turns the reaper off
    pub reap_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
            data_dir: PathBuf::from(ServerDefaults::DATA_DIR),
            max_body_mb: ServerDefaults::MAX_BODY_MB,
            reap_interval_secs: ServerDefaults::REAP_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_var_or("FERRY_HOST", ServerDefaults::HOST.to_string()),
            port: env_var_or("FERRY_PORT", ServerDefaults::PORT),
            data_dir: PathBuf::from(env_var_or(
                "FERRY_DATA_DIR",
                ServerDefaults::DATA_DIR.to_string(),
            )),
            max_body_mb: env_var_or("FERRY_MAX_BODY_MB", ServerDefaults::MAX_BODY_MB),
            reap_interval_secs: env_var_or(
                "FERRY_REAP_INTERVAL_SECS",
                ServerDefaults::REAP_INTERVAL_SECS,
            ),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_secs > 0).then(|| Duration::from_secs(self.reap_interval_secs))
    }
}

/// Parse an environment variable, falling back to `default` when it is unset or malformed
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Debug,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}
