use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use dirs::config_dir;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Cli;
use crate::extract::Cutoff;

pub const DEFAULT_FEED_URL: &str = "https://home.classdojo.com/api/storyFeed?includePrivate=true";
pub const DEFAULT_OUTPUT_ROOT: &str = "classdojo_output";

/// Environment variables holding the session credentials, in cookie order.
const CREDENTIAL_VARS: [&str; 3] = [
    "DOJO_LOG_SESSION_ID",
    "DOJO_LOGIN.SID",
    "DOJO_HOME_LOGIN.SID",
];

/// Shape of config.toml on disk
///
/// Example:
/// feed_url = "https://home.classdojo.com/api/storyFeed?includePrivate=true"
/// output_root = "/srv/backups/classdojo"
/// not_before = "2024-09-01"
/// request_timeout_secs = 120
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub feed_url: Option<String>,
    pub output_root: Option<String>,
    pub not_before: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Opaque session tokens copied from a logged-in browser.
#[derive(Clone)]
pub struct SessionCookies {
    pub log_session_id: String,
    pub login_sid: String,
    pub home_login_sid: String,
}

impl SessionCookies {
    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        format!(
            "dojo_log_session_id={}; dojo_login.sid={}; dojo_home_login.sid={}",
            self.log_session_id, self.login_sid, self.home_login_sid
        )
    }

    fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let [log_session_id, login_sid, home_login_sid] = CREDENTIAL_VARS.map(|var| {
            env(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("Missing session credential: set {} (env or .env)", var))
        });

        Ok(Self {
            log_session_id: log_session_id?,
            login_sid: login_sid?,
            home_login_sid: home_login_sid?,
        })
    }
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCookies(<redacted>)")
    }
}

/// Resolved config used by the app
#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub output_root: PathBuf,
    /// Reuse this directory instead of creating a fresh one under `output_root`.
    pub output_dir: Option<PathBuf>,
    pub cutoff: Cutoff,
    pub request_timeout: Option<Duration>,
}

/// Load config from ~/.config/dojo-sync/config.toml if it exists, then
/// layer the environment (and a local .env file) and the CLI flags on top.
pub fn load_config(cli: &Cli) -> Result<Config> {
    // A missing .env file is the normal case
    let _ = dotenvy::dotenv();

    let config_path = config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dojo-sync")
        .join("config.toml");

    let raw = read_raw_config(&config_path)?;
    Ok(resolve(cli, raw, &|key: &str| std::env::var(key).ok()))
}

/// Read the session credentials from the environment.
pub fn load_session_cookies() -> Result<SessionCookies> {
    SessionCookies::from_env(&|key: &str| std::env::var(key).ok())
}

fn read_raw_config(path: &Path) -> Result<Option<RawConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let raw = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(Some(raw))
}

/// Precedence: CLI flag, environment, config file, default.
fn resolve(cli: &Cli, raw: Option<RawConfig>, env: &impl Fn(&str) -> Option<String>) -> Config {
    let raw = raw.unwrap_or_default();

    let feed_url = cli
        .feed_url
        .clone()
        .or_else(|| env("DOJO_FEED_URL"))
        .or(raw.feed_url)
        .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());

    let output_root = cli
        .output_root
        .clone()
        .or_else(|| env("DOJO_OUTPUT_ROOT").map(PathBuf::from))
        .or(raw.output_root.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));

    let not_before = cli
        .not_before
        .clone()
        .or_else(|| env("NOT_BEFORE"))
        .or(raw.not_before)
        .filter(|day| !day.trim().is_empty());

    if let Some(day) = &not_before {
        if NaiveDate::parse_from_str(day, "%Y-%m-%d").is_err() {
            tracing::warn!(
                not_before = %day,
                "cutoff is not a YYYY-MM-DD date; it is still compared as plain text"
            );
        }
    }

    Config {
        feed_url,
        output_root,
        output_dir: cli.into.clone(),
        cutoff: Cutoff::new(not_before),
        request_timeout: raw.request_timeout_secs.map(Duration::from_secs),
    }
}
