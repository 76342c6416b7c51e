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

//! Authentication material for one signed-in user.
//!
//! A [`SessionContext`] only exists in its ready state: the handshake builds
//! it once every token is known, and environment switches replace the
//! environment-bound fields together through [`SessionContext::enter`].

use crate::error::{OtaError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An account partition and the backend namespace that scopes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub namespace: String,
}

/// Values issued alongside every environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentTokens {
    pub csrf_token: String,
    pub websocket_address: String,
}

/// Profile fields returned by the credential exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub firstname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lastname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
}

// Numbers are kept as text; any other non-string value reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    access_token: String,
    profile: UserProfile,
    tokens: EnvironmentTokens,
    environments: Vec<Environment>,
    current: String,
}

impl SessionContext {
    /// Builds a ready context. Fails if the access token is empty or the
    /// current environment is not one of `environments`.
    pub fn new(
        access_token: impl Into<String>,
        profile: UserProfile,
        tokens: EnvironmentTokens,
        environments: Vec<Environment>,
        current: impl Into<String>,
    ) -> Result<Self> {
        let access_token = access_token.into();
        let current = current.into();
        if access_token.is_empty() {
            return Err(OtaError::Authentication {
                username: profile.email.clone().unwrap_or_default(),
                reason: "invalid credentials or missing access token".into(),
            });
        }
        if !environments.iter().any(|env| env.name == current) {
            return Err(OtaError::InvalidEnvironment {
                name: current,
                choices: environments.iter().map(|env| env.name.clone()).collect(),
            });
        }
        Ok(Self {
            access_token,
            profile,
            tokens,
            environments,
            current,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn csrf_token(&self) -> &str {
        &self.tokens.csrf_token
    }

    pub fn websocket_address(&self) -> &str {
        &self.tokens.websocket_address
    }

    pub fn current_environment(&self) -> &str {
        &self.current
    }

    /// Environments in the order the platform listed them.
    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.iter().map(|env| env.name.clone()).collect()
    }

    /// Namespace for `name`, or `InvalidEnvironment` with the valid choices.
    pub fn namespace_of(&self, name: &str) -> Result<&str> {
        self.environments
            .iter()
            .find(|env| env.name == name)
            .map(|env| env.namespace.as_str())
            .ok_or_else(|| OtaError::InvalidEnvironment {
                name: name.to_string(),
                choices: self.environment_names(),
            })
    }

    /// Commits a successful switch: environment name and its tokens change together.
    pub(crate) fn enter(&mut self, name: &str, tokens: EnvironmentTokens) -> Result<()> {
        self.namespace_of(name)?;
        self.current = name.to_string();
        self.tokens = tokens;
        Ok(())
    }
}
