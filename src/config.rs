//! Configuration management module
//!
//! Layering, lowest to highest: built-in defaults, an optional file
//! (`TRA_CONFIG`, else `tra-ticket.{toml,yaml,json}` in the working
//! directory), `TRA__SECTION__KEY` environment variables, then the flat
//! `DRIVER_*` / `LOG_LEVEL` variables.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use action_primitives::Pacing;
use cdp_adapter::{CdpConfig, WindowSize};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::TraResult;

pub const CONFIG_PATH_ENV: &str = "TRA_CONFIG";
const DEFAULT_CONFIG_STEM: &str = "tra-ticket";
const ENV_PREFIX: &str = "TRA";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: CdpConfig,
    pub pacing: Pacing,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: CdpConfig::default(),
            pacing: Pacing::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load using `TRA_CONFIG` (or the default file name) and the process environment.
    pub fn load() -> TraResult<Self> {
        let path = env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit file. A given path must exist; without one the
    /// default file name is optional.
    pub fn load_from(path: Option<&Path>) -> TraResult<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_STEM).required(false),
        };

        let mut cfg: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.apply_legacy_overrides(|key| env::var(key).ok());
        debug!(
            headless = cfg.browser.headless,
            window = %cfg.browser.window_size,
            wait_ms = cfg.browser.timeouts.wait_ms,
            "configuration loaded"
        );
        Ok(cfg)
    }

    /// Apply the flat `DRIVER_*` and `LOG_LEVEL` variables. Unparseable values are skipped.
    pub fn apply_legacy_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let browser = &mut self.browser;

        if let Some(raw) = lookup("DRIVER_HEADLESS") {
            browser.headless = parse_flag(&raw);
        }
        if let Some(raw) = non_empty(lookup("DRIVER_WINDOW_SIZE")) {
            match raw.parse::<WindowSize>() {
                Ok(size) => browser.window_size = size,
                Err(err) => warn!(%err, "ignoring DRIVER_WINDOW_SIZE"),
            }
        }
        if let Some(agent) = non_empty(lookup("DRIVER_USER_AGENT")) {
            browser.user_agent = Some(agent);
        }
        if let Some(dir) = non_empty(lookup("DRIVER_DOWNLOAD_DIR")) {
            browser.download_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = non_empty(lookup("DRIVER_PAGELOAD_TIMEOUT")).and_then(secs_to_ms) {
            browser.timeouts.page_load_ms = ms;
        }
        if let Some(ms) = non_empty(lookup("DRIVER_WAIT_TIMEOUT")).and_then(secs_to_ms) {
            browser.timeouts.wait_ms = ms;
        }
        if let Some(level) = non_empty(lookup("LOG_LEVEL")) {
            self.log_level = level.to_ascii_lowercase();
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

/// Whole seconds to milliseconds; non-numeric or overflowing values are skipped.
fn secs_to_ms(raw: String) -> Option<u64> {
    let Ok(secs) = raw.parse::<u64>() else {
        warn!(value = %raw, "ignoring non-numeric timeout override");
        return None;
    };
    let ms = secs.checked_mul(1_000);
    if ms.is_none() {
        warn!(value = %raw, "ignoring out-of-range timeout override");
    }
    ms
}

/// Site account used by the live workflows.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read `TR_USERNAME` and `TR_PASSWORD`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let username = non_empty(env::var("TR_USERNAME").ok())?;
        let password = env::var("TR_PASSWORD").ok().filter(|p| !p.is_empty())?;
        Some(Self { username, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
