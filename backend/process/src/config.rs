use std::{
    env,
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{info, warn};

use crate::{
    error::ConfigError,
    models::{DEFAULT_BASE_URL, SITE_ID},
};

const SECRETS_DIR: &str = "/run/secrets";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub feed_base_url: String,
    pub site_id: String,
    pub fetch_retries: u32,
    pub retry_delay_ms: u64,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(&Source {
            lookup: |key: &str| env::var(key).ok(),
            secrets_dir: PathBuf::from(SECRETS_DIR),
        })
    }

    fn from_source<F: Fn(&str) -> Option<String>>(source: &Source<F>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: source.read_secret("DATABASE_URL")?,
            feed_base_url: source.try_load("FEED_BASE_URL", DEFAULT_BASE_URL)?,
            site_id: source.try_load("FEED_SITE_ID", SITE_ID)?,
            fetch_retries: source.try_load("FETCH_RETRIES", "2")?,
            retry_delay_ms: source.try_load("RETRY_DELAY_MS", "500")?,
            max_connections: source.try_load("DB_MAX_CONNECTIONS", "5")?,
        })
    }
}

struct Source<F> {
    lookup: F,
    secrets_dir: PathBuf,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn try_load<T: FromStr>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T::Err: Display,
    {
        self.var(key)
            .unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
            .parse::<T>()
            .map_err(|e| {
                warn!("Invalid {key} value: {e}");

                ConfigError::Invalid {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    /// Docker secret first, then the environment.
    fn read_secret(&self, secret_name: &str) -> Result<String, ConfigError> {
        let path = self.secrets_dir.join(secret_name);

        match read_secret_file(&path) {
            Some(secret) => Ok(secret),
            None => self.var(secret_name).ok_or_else(|| {
                warn!("{secret_name} not found in {} or environment", path.display());
                ConfigError::Missing(secret_name.to_string())
            }),
        }
    }
}

fn read_secret_file(path: &Path) -> Option<String> {
    read_to_string(path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
}
