// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration file handling.
//!
//! The configuration lives at `~/.stockgate/config.json`. Every field has a
//! default, so a missing file or a file with only some keys is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::routes::{RouteTable, DASHBOARD_ROUTE, FORBIDDEN_ROUTE, LOGIN_ROUTE};
use crate::security::gate::GateConfig;
use crate::security::session_clock::{SessionClockConfig, SESSION_TIMEOUT, WARNING_WINDOW};
use crate::security::token_store::{FileTokenStore, TOKEN_KEY};

const CONFIG_DIR: &str = ".stockgate";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Inactivity before the session expires (default: 2700 = 45 minutes)
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Lead time of the expiry warning (default: 9)
    #[serde(default = "default_warning_window_secs")]
    pub warning_window_secs: u64,
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_forbidden_route")]
    pub forbidden_route: String,
    #[serde(default = "default_dashboard_route")]
    pub dashboard_route: String,
    /// Token file (default: ~/.stockgate/token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
    /// Treat tokens past their exp claim as absent (default: true)
    #[serde(default = "default_reject_expired_tokens")]
    pub reject_expired_tokens: bool,
    /// Log level when RUST_LOG is not set (default: "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Replaces the built-in route table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<RouteTable>,
}

fn default_session_timeout_secs() -> u64 {
    SESSION_TIMEOUT.as_secs()
}

fn default_warning_window_secs() -> u64 {
    WARNING_WINDOW.as_secs()
}

fn default_login_route() -> String {
    LOGIN_ROUTE.to_string()
}

fn default_forbidden_route() -> String {
    FORBIDDEN_ROUTE.to_string()
}

fn default_dashboard_route() -> String {
    DASHBOARD_ROUTE.to_string()
}

fn default_reject_expired_tokens() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            warning_window_secs: default_warning_window_secs(),
            login_route: default_login_route(),
            forbidden_route: default_forbidden_route(),
            dashboard_route: default_dashboard_route(),
            token_path: None,
            reject_expired_tokens: default_reject_expired_tokens(),
            log_level: default_log_level(),
            routes: None,
        }
    }
}

impl Config {
    pub fn clock_config(&self) -> SessionClockConfig {
        SessionClockConfig::custom(self.session_timeout_secs, self.warning_window_secs)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            login_route: self.login_route.clone(),
            forbidden_route: self.forbidden_route.clone(),
            dashboard_route: self.dashboard_route.clone(),
            clock: self.clock_config(),
            reject_expired_tokens: self.reject_expired_tokens,
        }
    }

    /// Configured routes, or the built-in table.
    pub fn route_table(&self) -> RouteTable {
        self.routes.clone().unwrap_or_default()
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join(TOKEN_KEY)),
        }
    }

    pub fn token_store(&self) -> Result<FileTokenStore> {
        Ok(FileTokenStore::new(self.token_path()?))
    }
}

/// `~/.stockgate`, not created.
pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(CONFIG_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Load from `path`, falling back to defaults when the file does not exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
