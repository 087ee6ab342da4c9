//! Startup configuration.
//!
//! The configuration is a single JSON document read once before any network
//! activity. Field names follow the long-standing file format (`url`, `nick`,
//! `last_seen_commit_sha`) so existing deployment files keep working.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Default farewell sent with `QUIT`.
pub const DEFAULT_FAREWELL: &str = "Bye-bye-bye-bye-bye-bye-bye!!";

/// Top-level configuration document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,
    pub repos: Vec<RepoConfig>,
    #[serde(default)]
    pub announce: AnnounceConfig,
}

/// What to do when the server reports our nickname as taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NickCollisionPolicy {
    /// Send `QUIT`, close the stream and fail the sign-in.
    Abort,
    /// Append `_` to the nickname and identify again.
    #[default]
    Rename,
}

/// Chat network endpoint and identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server host name or address.
    #[serde(rename = "url")]
    pub host: String,
    pub port: u16,
    pub channel: String,
    #[serde(rename = "nick")]
    pub nickname: String,
    #[serde(default)]
    pub nick_collision: NickCollisionPolicy,
    /// Identify right after the stream opens instead of waiting for the
    /// server's ident notice.
    #[serde(default)]
    pub eager_identify: bool,
    #[serde(default = "default_farewell")]
    pub farewell: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl IrcConfig {
    /// Minimal configuration with defaults for every optional field.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        channel: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        IrcConfig {
            host: host.into(),
            port,
            channel: channel.into(),
            nickname: nickname.into(),
            nick_collision: NickCollisionPolicy::default(),
            eager_identify: false,
            farewell: default_farewell(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// `host:port`, used in logs and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One watched repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Display name used in announcements.
    pub name: String,
    pub url: String,
    /// Baseline commit; full or abbreviated id.
    #[serde(default)]
    pub last_seen_commit_sha: Option<String>,
    /// Tracked branch; defaults to the remote's default branch.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Poll cadence and flood protection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    pub poll_interval_secs: u64,
    /// Batches strictly larger than this are rate-limited.
    pub rate_limit_threshold: usize,
    pub rate_limit_delay_ms: u64,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        AnnounceConfig {
            poll_interval_secs: 10,
            rate_limit_threshold: 5,
            rate_limit_delay_ms: 1000,
        }
    }
}

impl AnnounceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

fn default_farewell() -> String {
    DEFAULT_FAREWELL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an `anyhow::Error` when the file cannot be read, is not valid
    /// JSON for this schema, or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening config file {}", path.display()))?;
        let config: Config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration held in memory.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could only fail later, on the network.
    pub fn validate(&self) -> Result<()> {
        let irc = &self.irc;
        if irc.host.trim().is_empty() {
            bail!("irc.url must not be empty");
        }
        if irc.port == 0 {
            bail!("irc.port must be non-zero");
        }
        validate_token("irc.nick", &irc.nickname)?;
        validate_token("irc.channel", &irc.channel)?;
        if !irc.channel.starts_with('#') && !irc.channel.starts_with('&') {
            bail!("irc.channel '{}' must start with '#' or '&'", irc.channel);
        }

        if self.repos.is_empty() {
            bail!("at least one entry in repos is required");
        }
        let mut seen = HashSet::new();
        for repo in &self.repos {
            if repo.name.trim().is_empty() {
                bail!("repository names must not be empty");
            }
            if repo.url.trim().is_empty() {
                bail!("repository '{}' has an empty url", repo.name);
            }
            if !seen.insert(repo.name.as_str()) {
                bail!("duplicate repository name '{}'", repo.name);
            }
        }

        if self.announce.poll_interval_secs == 0 {
            bail!("announce.poll_interval_secs must be non-zero");
        }
        Ok(())
    }
}

fn validate_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{} must not be empty", field);
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("{} '{}' must not contain whitespace", field, value);
    }
    Ok(())
}
