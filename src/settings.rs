use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api/";
const DEFAULT_DATA_DIR: &str = ".visitgate";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub tick_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Popup closed-state polling; kept below one second.
    pub popup_poll_interval_ms: u64,
    pub cache_flush_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.into(),
            auth_token: None,
            tick_interval_ms: 1_000,
            heartbeat_interval_ms: 10_000,
            popup_poll_interval_ms: 500,
            cache_flush_interval_ms: 5_000,
            request_timeout_ms: 10_000,
            debug: false,
        }
    }
}

impl Settings {
    /// Reads `settings.json` from `data_dir` (defaults when missing or
    /// unparsable) and then applies `VISITGATE_*` environment overrides.
    ///
    /// Runs before logging is initialised, so a malformed file is reported
    /// back as a warning for the caller to log.
    pub fn load(data_dir: &Path) -> Result<(Self, Option<String>)> {
        let path = data_dir.join(SETTINGS_FILE);
        let mut warning = None;
        let mut settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warning = Some(format!(
                    "Ignoring malformed settings at {}: {err}",
                    path.display()
                ));
                Settings::default()
            })
        } else {
            Settings::default()
        };

        settings.apply_env();
        settings.validate()?;
        Ok((settings, warning))
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let path = data_dir.join(SETTINGS_FILE);
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(&path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VISITGATE_API_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(token) = std::env::var("VISITGATE_AUTH_TOKEN") {
            self.auth_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if env_flag("VISITGATE_DEBUG") {
            self.debug = true;
            self.heartbeat_interval_ms = 1_000;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("tickIntervalMs", self.tick_interval_ms),
            ("heartbeatIntervalMs", self.heartbeat_interval_ms),
            ("popupPollIntervalMs", self.popup_poll_interval_ms),
            ("cacheFlushIntervalMs", self.cache_flush_interval_ms),
            ("requestTimeoutMs", self.request_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.popup_poll_interval_ms >= 1_000 {
            bail!(
                "popupPollIntervalMs must be sub-second, got {}",
                self.popup_poll_interval_ms
            );
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn popup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.popup_poll_interval_ms)
    }

    pub fn cache_flush_interval(&self) -> Duration {
        Duration::from_millis(self.cache_flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `VISITGATE_DATA_DIR`, or `.visitgate` under the working directory.
pub fn data_dir() -> PathBuf {
    std::env::var("VISITGATE_DATA_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
