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

use crate::tokens::TokenKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OtaError>;

/// Every failure the session layer can report. None of these are retried.
#[derive(Debug, Error)]
pub enum OtaError {
    #[error("{kind} not found in response body (page layout may have changed)")]
    TokenNotFound { kind: TokenKind },

    #[error(
        "sign-in redirect chain had {actual} hop(s); expected at least {expected} to read the client id"
    )]
    RedirectChain { expected: usize, actual: usize },

    #[error("missing `{header}` header in sign-in redirect chain at {url}")]
    MissingHeader { header: &'static str, url: String },

    #[error("{kind} is not usable as a request header value")]
    InvalidToken { kind: TokenKind },

    #[error("unable to authenticate {username}: {reason}")]
    Authentication { username: String, reason: String },

    #[error("{name} is not a valid environment; choose from: {}", choices.join(", "))]
    InvalidEnvironment { name: String, choices: Vec<String> },

    #[error("unsuccessful response ({status}) changing to environment {name}")]
    EnvironmentChange { name: String, status: u16 },

    #[error("device {name} not found in {}", environments.join(", "))]
    DeviceNotFound {
        name: String,
        environments: Vec<String>,
    },

    #[error("device {device} exists in multiple environments: {}", environments.join(", "))]
    AmbiguousEnvironment {
        device: String,
        environments: Vec<String>,
    },

    #[error("no group matching {name} found in first {limit} groups")]
    GroupNotFound { name: String, limit: usize },

    #[error("no update found with name {name}")]
    CampaignNotFound { name: String },

    #[error("{cause}; could not return to environment {origin}, session left in {current}: {restore}")]
    EnvironmentRestore {
        #[source]
        cause: Box<OtaError>,
        origin: String,
        current: String,
        restore: Box<OtaError>,
    },

    #[error("selection of {name} aborted")]
    SelectionAborted { name: String },

    #[error("HTTP {status} at {url}\n\nResponse: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("unexpected response shape from {url}: {detail}")]
    Shape { url: String, detail: String },

    #[error("too many redirects starting at {url}")]
    TooManyRedirects { url: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl OtaError {
    pub(crate) fn unexpected_status(status: u16, url: impl Into<String>, body: &str) -> Self {
        let body = if body.len() > 200 {
            let cut = body
                .char_indices()
                .nth(200)
                .map(|(idx, _)| idx)
                .unwrap_or(body.len());
            format!("{}...", &body[..cut])
        } else {
            body.to_string()
        };
        OtaError::UnexpectedStatus {
            status,
            url: url.into(),
            body,
        }
    }

    /// True when the server rejected the session itself, so the caller should
    /// run the handshake again rather than resend the request.
    pub fn needs_reauthentication(&self) -> bool {
        matches!(
            self,
            OtaError::UnexpectedStatus {
                status: 401 | 403,
                ..
            }
        )
    }
}
