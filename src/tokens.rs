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

//! Extraction of the short-lived tokens embedded in sign-in pages.
//!
//! The platform does not hand these out through a JSON API; they live in
//! inline scripts, hidden form inputs and redirect URLs. Each pattern is a
//! separate parser so a layout change shows up as a named failure.

use crate::error::{OtaError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `csrf: "..."` inside the sign-in page script block.
    CsrfMeta,
    /// `<input id="csrf-token-val" value="...">` on the application index.
    CsrfForm,
    /// `client-id=...` query parameter of a sign-in redirect.
    ClientId,
    /// `<input id="ws-url" value="...">` on the application index.
    WebsocketAddress,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenKind::CsrfMeta => "sign-in CSRF token",
            TokenKind::CsrfForm => "session CSRF token",
            TokenKind::ClientId => "client id",
            TokenKind::WebsocketAddress => "websocket address",
        };
        f.write_str(label)
    }
}

static CSRF_META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"csrf:\s*['"]([^'"]+)['"],"#).expect("csrf meta pattern"));
static CSRF_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="csrf-token-val"\s+value="([^"]+)""#).expect("csrf form pattern")
});
static CLIENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"client-id=([^&#\s]+)").expect("client id pattern"));
static WEBSOCKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="ws-url"\s+value="([^"]+)""#).expect("ws url pattern"));

impl TokenKind {
    fn pattern(self) -> &'static Regex {
        match self {
            TokenKind::CsrfMeta => &CSRF_META_RE,
            TokenKind::CsrfForm => &CSRF_FORM_RE,
            TokenKind::ClientId => &CLIENT_ID_RE,
            TokenKind::WebsocketAddress => &WEBSOCKET_RE,
        }
    }

    /// First capture of this pattern in `text`. Empty values count as missing.
    pub fn extract(self, text: &str) -> Result<String> {
        self.pattern()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(OtaError::TokenNotFound { kind: self })
    }
}

pub fn csrf_meta(body: &str) -> Result<String> {
    TokenKind::CsrfMeta.extract(body)
}

pub fn csrf_form(body: &str) -> Result<String> {
    TokenKind::CsrfForm.extract(body)
}

pub fn client_id(location: &str) -> Result<String> {
    TokenKind::ClientId.extract(location)
}

pub fn websocket_address(body: &str) -> Result<String> {
    TokenKind::WebsocketAddress.extract(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_missing(result: Result<String>, expected: TokenKind) {
        match result {
            Err(OtaError::TokenNotFound { kind }) => assert_eq!(kind, expected),
            other => panic!("expected TokenNotFound({expected:?}), got {other:?}"),
        }
    }

    #[test]
    fn csrf_meta_reads_script_value() {
        let body = r#"<script>window.config = { env: "prod", csrf:  'abc-123', ws: true };</script>"#;
        assert_eq!(csrf_meta(body).unwrap(), "abc-123");

        let body = "<script>var cfg = {csrf:\"xyz\",};</script>";
        assert_eq!(csrf_meta(body).unwrap(), "xyz");
    }

    #[test]
    fn csrf_meta_missing_is_an_error() {
        assert_missing(csrf_meta("<html><body>nothing</body></html>"), TokenKind::CsrfMeta);
        assert_missing(csrf_meta(r#"csrf: "","#), TokenKind::CsrfMeta);
    }

    #[test]
    fn csrf_form_reads_hidden_input() {
        let body = r#"<input type="hidden" id="csrf-token-val" value="form-token-1"/>
                      <input type="hidden" id="ws-url" value="wss://events.example/ws"/>"#;
        assert_eq!(csrf_form(body).unwrap(), "form-token-1");
    }

    #[test]
    fn csrf_form_ignores_other_inputs() {
        let body = r#"<input type="hidden" id="ws-url" value="wss://events.example/ws"/>"#;
        assert_missing(csrf_form(body), TokenKind::CsrfForm);
    }

    #[test]
    fn client_id_reads_location_query() {
        let location =
            "https://account.example/authorize?response_type=code&client-id=Cl13nt&state=s";
        assert_eq!(client_id(location).unwrap(), "Cl13nt");
        assert_eq!(
            client_id("/sign-in?client-id=tail-value").unwrap(),
            "tail-value"
        );
    }

    #[test]
    fn client_id_missing_is_an_error() {
        assert_missing(
            client_id("https://account.example/authorize?client_id=underscore"),
            TokenKind::ClientId,
        );
    }

    #[test]
    fn websocket_address_reads_hidden_input() {
        let body = r#"<input type="hidden" id="csrf-token-val" value="t"/>
                      <input type="hidden" id="ws-url" value="wss://events.example/ws?ns=1"/>"#;
        assert_eq!(
            websocket_address(body).unwrap(),
            "wss://events.example/ws?ns=1"
        );
        assert_missing(websocket_address("<div></div>"), TokenKind::WebsocketAddress);
    }
}
