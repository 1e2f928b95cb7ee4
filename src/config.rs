use crate::poll::PollPolicy;
use anyhow::{Context, Result};
use keyring::Entry;
use std::time::Duration;

const KEYRING_SERVICE_PREFIX: &str = "kgchat_password";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_SECS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

/// Client settings, read from `KGCHAT_*` environment variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub idle_poll_interval: Option<Duration>,
    pub max_backoff: Duration,
    // None keeps requests open until the backend answers
    pub request_timeout: Option<Duration>,
    pub username: Option<String>,
    // 'env:MY_VAR' or 'keyring'
    pub password_ref: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            idle_poll_interval: None,
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            request_timeout: None,
            username: None,
            password_ref: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source; unset or blank
    /// variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |key: &str| -> Result<Option<Duration>> {
            match get(key) {
                Some(raw) => {
                    let value: u64 = raw
                        .parse()
                        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, raw))?;
                    if value == 0 {
                        return Err(anyhow::anyhow!("{} must be greater than zero", key));
                    }
                    Ok(Some(Duration::from_secs(value)))
                }
                None => Ok(None),
            }
        };

        let defaults = Self::default();
        let config = Self {
            base_url: get("KGCHAT_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            poll_interval: secs("KGCHAT_POLL_SECS")?.unwrap_or(defaults.poll_interval),
            idle_poll_interval: secs("KGCHAT_IDLE_POLL_SECS")?,
            max_backoff: secs("KGCHAT_POLL_MAX_BACKOFF_SECS")?.unwrap_or(defaults.max_backoff),
            request_timeout: secs("KGCHAT_REQUEST_TIMEOUT_SECS")?,
            username: get("KGCHAT_USERNAME"),
            password_ref: get("KGCHAT_PASSWORD_REF"),
        };
        log::debug!("Loaded client config for {}", config.base_url);
        Ok(config)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let policy = PollPolicy::fixed(self.poll_interval).with_max_backoff(self.max_backoff);
        match self.idle_poll_interval {
            Some(idle) => policy.with_idle_interval(idle),
            None => policy,
        }
    }

    /// Resolves the login password through `password_ref`: either an
    /// environment variable (`env:NAME`) or the OS keyring (`keyring`).
    /// Returns `None` when no username is configured.
    pub fn get_password(&self) -> Result<Option<String>> {
        let Some(username) = self.username.as_deref() else {
            return Ok(None);
        };
        match self.password_ref.as_deref() {
            Some(ref_str) if ref_str.starts_with("env:") => {
                let env_var_name = ref_str.trim_start_matches("env:");
                log::debug!("Retrieving password from environment variable: {}", env_var_name);
                std::env::var(env_var_name)
                    .map(Some)
                    .context(format!(
                        "Failed to get password from environment variable '{}'",
                        env_var_name
                    ))
            }
            Some("keyring") => {
                let entry = keyring_entry(&self.base_url, username)?;
                read_keyring(&entry, username).map(Some)
            }
            Some(other) => Err(anyhow::anyhow!("Unsupported password_ref format: {}", other)),
            None => Err(anyhow::anyhow!(
                "KGCHAT_PASSWORD_REF not set for user '{}'",
                username
            )),
        }
    }

    /// Stores the login password in the OS keyring for the configured user.
    pub fn set_password_in_keyring(&self, password: &str) -> Result<()> {
        let username = self
            .username
            .as_deref()
            .context("KGCHAT_USERNAME must be set to store a password")?;
        let entry = keyring_entry(&self.base_url, username)?;
        write_keyring(&entry, username, password)
    }
}

fn keyring_entry(base_url: &str, username: &str) -> Result<Entry> {
    let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, base_url);
    Entry::new(&service_name, username).context("Failed to create keyring entry")
}

fn read_keyring(entry: &Entry, username: &str) -> Result<String> {
    log::debug!("Retrieving password from keyring for user: {}", username);
    entry.get_password().context(format!(
        "Failed to get password from keyring for '{}'. Store it with --store-password first.",
        username
    ))
}

fn write_keyring(entry: &Entry, username: &str, password: &str) -> Result<()> {
    log::info!("Setting password in keyring for user: {}", username);
    entry
        .set_password(password)
        .context(format!("Failed to set password in keyring for '{}'", username))
}
