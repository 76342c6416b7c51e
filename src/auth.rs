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

//! Sign-in handshake.
//!
//! The steps run strictly in order and each consumes what the previous one
//! scraped:
//!
//! 1. `GET /` with `X-CSRF-Token: fetch`. The platform bounces through the
//!    identity service; hop [`CLIENT_ID_HOP`] carries the client id in its
//!    `Location`, the last hop carries `x-correlation-id`, and the landing
//!    page embeds the sign-in CSRF token.
//! 2. `POST` the credentials to the identity service. The body must contain
//!    a non-empty `accessToken`.
//! 3. `GET` the authorize URL with the client id and the `state` cookie. Only
//!    a 200 counts; its body yields the session CSRF token.
//! 4. The same body yields the websocket address.
//! 5. Load the environment list and the default environment.
//!
//! Nothing is handed back until all five succeed.

use crate::client::{Followed, Hop, HttpSession, ResponseData};
use crate::endpoints::Endpoints;
use crate::error::{OtaError, Result};
use crate::session::{Environment, EnvironmentTokens, SessionContext, UserProfile};
use crate::tokens;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Zero-based position of the sign-in redirect whose `Location` holds the
/// client id. Fixed by the identity service; a shorter chain is an error.
pub const CLIENT_ID_HOP: usize = 2;

const CORRELATION_HEADER: &str = "x-correlation-id";
const STATE_COOKIE: &str = "state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SignInPage {
    client_id: String,
    correlation_id: String,
    csrf_token: String,
}

#[derive(Debug, Deserialize)]
struct DefaultEnvironment {
    name: String,
}

/// Runs the full handshake on `http` and returns a ready context. On success
/// `http` is left sending the session CSRF token.
pub fn authenticate(
    http: &mut HttpSession,
    endpoints: &Endpoints,
    credentials: &Credentials,
) -> Result<SessionContext> {
    let landing = http.get_with_headers(endpoints.platform_root(), &[("X-CSRF-Token", "fetch")])?;
    let page = read_sign_in_page(&landing)?;
    debug!(client_id = %page.client_id, "read sign-in page");

    let (access_token, profile) = exchange_credentials(http, endpoints, credentials, &page)?;

    let state = http
        .cookie(&endpoints.platform_root(), STATE_COOKIE)
        .or_else(|| http.cookie(&endpoints.sign_in().ok()?, STATE_COOKIE))
        .ok_or_else(|| OtaError::Authentication {
            username: credentials.username.clone(),
            reason: "sign-in did not set a state cookie".into(),
        })?;

    let authorized = http
        .get(endpoints.authorize(&page.client_id, &state)?)?
        .response;
    if authorized.status != 200 {
        debug!(body = %authorized.body, "authorization rejected");
        return Err(OtaError::Authentication {
            username: credentials.username.clone(),
            reason: format!(
                "authorization returned HTTP {}: {}",
                authorized.status, authorized.body
            ),
        });
    }

    let tokens = read_environment_tokens(&authorized.body)?;
    http.set_csrf_token(&tokens.csrf_token, &endpoints.platform_root())?;
    info!(user = %credentials.username, "Authenticated");
    debug!(
        firstname = profile.firstname.as_deref().unwrap_or_default(),
        lastname = profile.lastname.as_deref().unwrap_or_default(),
        email = profile.email.as_deref().unwrap_or_default(),
        "signed-in user"
    );

    let environments = load_environments(http, endpoints)?;
    let default = fetch_json(http, endpoints.default_environment()?)?;
    let default: DefaultEnvironment =
        serde_json::from_value(default).map_err(|err| OtaError::Shape {
            url: endpoints.default_environment().map(|u| u.to_string()).unwrap_or_default(),
            detail: err.to_string(),
        })?;
    info!(environment = %default.name, "Current environment");

    SessionContext::new(access_token, profile, tokens, environments, default.name)
}

/// Session CSRF token and websocket address from an application index page.
pub fn read_environment_tokens(body: &str) -> Result<EnvironmentTokens> {
    Ok(EnvironmentTokens {
        csrf_token: tokens::csrf_form(body)?,
        websocket_address: tokens::websocket_address(body)?,
    })
}

fn read_sign_in_page(landing: &Followed) -> Result<SignInPage> {
    let hops = &landing.history;
    for (index, hop) in hops.iter().enumerate() {
        debug!(index, status = hop.status, url = %hop.url, "sign-in hop");
    }
    let client_hop = hops.get(CLIENT_ID_HOP).ok_or(OtaError::RedirectChain {
        expected: CLIENT_ID_HOP + 1,
        actual: hops.len(),
    })?;
    let location = client_hop
        .location()
        .ok_or_else(|| OtaError::MissingHeader {
            header: "location",
            url: client_hop.url.to_string(),
        })?;
    let client_id = tokens::client_id(location)?;

    let last_hop: Option<&Hop> = hops.last();
    let correlation_id = last_hop
        .and_then(|hop| hop.header(CORRELATION_HEADER))
        .or_else(|| landing.response.header(CORRELATION_HEADER))
        .map(str::to_string)
        .ok_or_else(|| OtaError::MissingHeader {
            header: CORRELATION_HEADER,
            url: last_hop
                .map(|hop| &hop.url)
                .unwrap_or(&landing.response.url)
                .to_string(),
        })?;

    let csrf_token = tokens::csrf_meta(&landing.response.body)?;

    Ok(SignInPage {
        client_id,
        correlation_id,
        csrf_token,
    })
}

fn exchange_credentials(
    http: &HttpSession,
    endpoints: &Endpoints,
    credentials: &Credentials,
    page: &SignInPage,
) -> Result<(String, UserProfile)> {
    let body = json!({
        "realm": "here",
        "email": credentials.username,
        "password": credentials.password,
        "rememberMe": true,
        "isConversionSignIn": false,
    });
    let headers = [
        ("x-client", page.client_id.as_str()),
        ("x-correlation-id", page.correlation_id.as_str()),
        ("x-csrf-token", page.csrf_token.as_str()),
        ("x-oidc", "true"),
        ("x-realm", "here"),
        ("x-sdk", "true"),
        ("x-uri", "null"),
    ];
    let response = http
        .post_json(endpoints.sign_in()?, &headers, Some(&body))?
        .response;

    let json = response.json.unwrap_or(Value::Null);
    let access_token = json
        .get("accessToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    let Some(access_token) = access_token else {
        debug!(status = response.status, body = %response.body, "credential exchange rejected");
        return Err(OtaError::Authentication {
            username: credentials.username.clone(),
            reason: "invalid credentials or missing access token".into(),
        });
    };
    let profile = match serde_json::from_value(json) {
        Ok(profile) => profile,
        Err(err) => {
            debug!(error = %err, "could not read user profile from sign-in response");
            UserProfile::default()
        }
    };
    Ok((access_token, profile))
}

fn load_environments(http: &HttpSession, endpoints: &Endpoints) -> Result<Vec<Environment>> {
    let url = endpoints.environments()?;
    let listing = fetch_json(http, url.clone())?;
    serde_json::from_value(listing).map_err(|err| OtaError::Shape {
        url: url.to_string(),
        detail: err.to_string(),
    })
}

fn fetch_json(http: &HttpSession, url: reqwest::Url) -> Result<Value> {
    let response: ResponseData = http.get(url)?.response.error_for_status()?;
    response.into_json()
}
