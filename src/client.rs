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

use crate::error::{OtaError, Result};
use crate::tokens::TokenKind;
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Origin;

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";
const MAX_REDIRECTS: usize = 10;
pub const CSRF_HEADER: &str = "Csrf-Token";

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
    pub json: Option<Value>,
}

impl ResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Non-2xx becomes `UnexpectedStatus` carrying the body for diagnostics.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(OtaError::unexpected_status(
                self.status,
                self.url.as_str(),
                &self.body,
            ))
        }
    }

    pub fn into_json(self) -> Result<Value> {
        match self.json {
            Some(json) => Ok(json),
            None => Ok(serde_json::from_str(&self.body)?),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One redirect response seen while following a request.
#[derive(Debug, Clone)]
pub struct Hop {
    pub status: u16,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Hop {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }
}

/// Terminal response plus every redirect that led to it, oldest first.
#[derive(Debug, Clone)]
pub struct Followed {
    pub history: Vec<Hop>,
    pub response: ResponseData,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub verify_tls: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Cookie-holding HTTP session that follows redirects itself so the sign-in
/// flow can inspect each hop.
#[derive(Debug, Clone)]
pub struct HttpSession {
    http: Client,
    jar: Arc<Jar>,
    csrf: Option<(HeaderValue, Origin)>,
}

impl HttpSession {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!settings.verify_tls)
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            jar,
            csrf: None,
        })
    }

    /// Installs the token sent as `Csrf-Token` on every later request to the
    /// origin of `scope`. Other hosts never see it.
    pub fn set_csrf_token(&mut self, token: &str, scope: &Url) -> Result<()> {
        let value = HeaderValue::from_str(token).map_err(|_| OtaError::InvalidToken {
            kind: TokenKind::CsrfForm,
        })?;
        self.csrf = Some((value, scope.origin()));
        Ok(())
    }

    /// Value of cookie `name` the jar would send to `url`.
    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let raw = header.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    pub fn get(&self, url: Url) -> Result<Followed> {
        self.send(Method::GET, url, &[], Option::<&Value>::None)
    }

    pub fn get_with_headers(&self, url: Url, headers: &[(&str, &str)]) -> Result<Followed> {
        self.send(Method::GET, url, headers, Option::<&Value>::None)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        headers: &[(&str, &str)],
        body: Option<&T>,
    ) -> Result<Followed> {
        self.send(Method::POST, url, headers, body)
    }

    pub fn delete(&self, url: Url) -> Result<Followed> {
        self.send(Method::DELETE, url, &[], Option::<&Value>::None)
    }

    pub fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        headers: &[(&str, &str)],
        body: Option<&T>,
    ) -> Result<Followed> {
        let start = url.to_string();
        let mut history = Vec::new();
        let mut method = method;
        let mut body = body;
        let mut url = url;

        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(USER_AGENT, HeaderValue::from_static(BROWSER_UA))
                .header(ACCEPT, HeaderValue::from_static("*/*"));
            if let Some((token, origin)) = &self.csrf
                && url.origin() == *origin
            {
                request = request.header(CSRF_HEADER, token.clone());
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(b) = body {
                request = request.json(b);
            }

            let response = request.send()?;
            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if status.is_redirection()
                && let Some(location) = location
            {
                if history.len() >= MAX_REDIRECTS {
                    return Err(OtaError::TooManyRedirects { url: start });
                }
                let next = url.join(&location)?;
                history.push(Hop {
                    status: status.as_u16(),
                    url: url.clone(),
                    headers: response.headers().clone(),
                });
                if !matches!(
                    status,
                    StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
                ) {
                    method = Method::GET;
                    body = None;
                }
                url = next;
                continue;
            }

            let headers = response.headers().clone();
            let text = response.text()?;
            let json = serde_json::from_str(&text).ok();
            return Ok(Followed {
                history,
                response: ResponseData {
                    status: status.as_u16(),
                    url,
                    headers,
                    body: text,
                    json,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn session() -> HttpSession {
        HttpSession::new(&HttpSettings::default()).unwrap()
    }

    #[test]
    fn follows_redirects_and_records_hops() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/start");
            then.status(302).header("Location", "/middle");
        });
        server.mock(|when, then| {
            when.method(GET).path("/middle");
            then.status(302)
                .header("Location", "/end")
                .header("x-correlation-id", "corr-1");
        });
        server.mock(|when, then| {
            when.method(GET).path("/end");
            then.status(200).body("done");
        });

        let url = Url::parse(&server.url("/start")).unwrap();
        let followed = session().get(url).unwrap();

        assert_eq!(followed.history.len(), 2);
        assert_eq!(followed.history[0].location(), Some("/middle"));
        assert_eq!(followed.history[1].header("x-correlation-id"), Some("corr-1"));
        assert_eq!(followed.response.status, 200);
        assert_eq!(followed.response.body, "done");
        assert_eq!(followed.response.url.path(), "/end");
    }

    #[test]
    fn sends_csrf_header_once_installed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/device_groups")
                .header("Csrf-Token", "tok-1")
                .json_body(json!({"name": "g"}));
            then.status(200).json_body(json!({"id": "g-1"}));
        });

        let mut http = session();
        let url = Url::parse(&server.url("/api/v1/device_groups")).unwrap();
        http.set_csrf_token("tok-1", &url).unwrap();
        let resp = http
            .post_json(url, &[], Some(&json!({"name": "g"})))
            .unwrap()
            .response;

        mock.assert();
        assert_eq!(resp.json.unwrap()["id"], "g-1");
    }

    #[test]
    fn csrf_header_stays_on_its_origin() {
        let platform = MockServer::start();
        let account = MockServer::start();
        platform.mock(|when, then| {
            when.method(GET).path("/go").header("Csrf-Token", "tok-1");
            then.status(302)
                .header("Location", account.url("/landing").as_str());
        });
        let leaked = account.mock(|when, then| {
            when.method(GET)
                .path("/landing")
                .header_exists("Csrf-Token");
            then.status(200);
        });

        let mut http = session();
        let root = Url::parse(&platform.base_url()).unwrap();
        http.set_csrf_token("tok-1", &root).unwrap();
        let followed = http.get(root.join("/go").unwrap()).unwrap();

        leaked.assert_hits(0);
        assert_eq!(followed.history.len(), 1);
        assert_eq!(followed.history[0].status, 302);
        assert_eq!(followed.response.url.path(), "/landing");
    }

    #[test]
    fn rejects_csrf_token_that_cannot_be_a_header() {
        let mut http = session();
        let url = Url::parse("https://ota.example.test/").unwrap();
        let err = http.set_csrf_token("line\nbreak", &url).unwrap_err();
        assert!(matches!(
            err,
            OtaError::InvalidToken {
                kind: TokenKind::CsrfForm
            }
        ));
    }

    #[test]
    fn keeps_cookies_across_requests() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/login");
            then.status(200).header("Set-Cookie", "state=st-42; Path=/");
        });

        let http = session();
        let url = Url::parse(&server.url("/login")).unwrap();
        http.get(url.clone()).unwrap();

        assert_eq!(http.cookie(&url, "state").as_deref(), Some("st-42"));
        assert_eq!(http.cookie(&url, "missing"), None);
    }

    #[test]
    fn error_for_status_keeps_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/broken");
            then.status(500).body("boom");
        });

        let url = Url::parse(&server.url("/broken")).unwrap();
        let err = session()
            .get(url)
            .unwrap()
            .response
            .error_for_status()
            .unwrap_err();
        match err {
            OtaError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn stops_after_too_many_redirects() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/loop");
            then.status(302).header("Location", "/loop");
        });

        let url = Url::parse(&server.url("/loop")).unwrap();
        let err = session().get(url).unwrap_err();
        assert!(matches!(err, OtaError::TooManyRedirects { .. }));
    }
}
