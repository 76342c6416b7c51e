// otactl - CLI for the HERE OTA Connect platform
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::endpoints::{DEFAULT_ACCOUNT_URL, DEFAULT_PLATFORM_URL};
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const PASSWORD_ENV: &str = "OTACTL_PASSWORD";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_url: Option<String>,
    pub account_url: Option<String>,
    pub environment: Option<String>,
    pub verify_tls: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error(
        "username and password are required; set them with `otactl configure --username <email>` and OTACTL_PASSWORD or --password"
    )]
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub account_url: String,
    pub environment: Option<String>,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".otactl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("OTACTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("otactl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// Merged files, then `OTACTL_PASSWORD`, then `overrides` (highest).
pub fn resolve(cwd: &Path, overrides: Config) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;
    if let Ok(password) = env::var(PASSWORD_ENV)
        && !password.is_empty()
    {
        merged.password = Some(password);
    }
    let merged = merge(merged, overrides);

    let username = merged
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::MissingCredentials)?;
    let password = merged
        .password
        .filter(|p| !p.is_empty())
        .ok_or(ConfigError::MissingCredentials)?;

    Ok(EffectiveConfig {
        username,
        password,
        base_url: merged
            .base_url
            .unwrap_or_else(|| DEFAULT_PLATFORM_URL.to_string()),
        account_url: merged
            .account_url
            .unwrap_or_else(|| DEFAULT_ACCOUNT_URL.to_string()),
        environment: merged.environment,
        verify_tls: merged.verify_tls.unwrap_or(true),
        timeout_secs: merged.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

/// Field-wise merge; values in `over` win.
fn merge(base: Config, over: Config) -> Config {
    Config {
        username: over.username.or(base.username),
        password: over.password.or(base.password),
        base_url: over.base_url.or(base.base_url),
        account_url: over.account_url.or(base.account_url),
        environment: over.environment.or(base.environment),
        verify_tls: over.verify_tls.or(base.verify_tls),
        timeout_secs: over.timeout_secs.or(base.timeout_secs),
    }
}
