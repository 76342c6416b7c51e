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

use crate::auth::{self, Credentials};
use crate::client::{HttpSession, HttpSettings, ResponseData};
use crate::endpoints::Endpoints;
use crate::error::{OtaError, Result};
use crate::session::SessionContext;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const DEVICE_SEARCH_LIMIT: usize = 24;

/// Signed-in client for one user.
///
/// Every call that reads or changes the active environment takes `&mut self`,
/// so a switch and the queries that depend on it cannot interleave with
/// another caller. Share across threads only behind a mutex held for the
/// whole compound operation.
#[derive(Debug)]
pub struct OtaClient {
    pub(crate) http: HttpSession,
    pub(crate) endpoints: Endpoints,
    pub(crate) session: SessionContext,
}

impl OtaClient {
    /// Runs the sign-in handshake and returns a ready client.
    pub fn connect(
        endpoints: Endpoints,
        settings: &HttpSettings,
        credentials: &Credentials,
    ) -> Result<Self> {
        let mut http = HttpSession::new(settings)?;
        let session = auth::authenticate(&mut http, &endpoints, credentials)?;
        Self::from_session(http, endpoints, session)
    }

    /// Wraps an existing context without signing in again.
    pub fn from_session(
        mut http: HttpSession,
        endpoints: Endpoints,
        session: SessionContext,
    ) -> Result<Self> {
        http.set_csrf_token(session.csrf_token(), &endpoints.platform_root())?;
        Ok(Self {
            http,
            endpoints,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn current_environment(&self) -> &str {
        self.session.current_environment()
    }

    pub fn websocket_address(&self) -> &str {
        self.session.websocket_address()
    }

    /// Moves the session into environment `name`.
    ///
    /// Unknown names fail before any request. The switch is all-or-nothing:
    /// if the index page is not a 200 or lacks either token, the context keeps
    /// its previous environment and tokens.
    pub fn switch_environment(&mut self, name: &str) -> Result<()> {
        let namespace = self.session.namespace_of(name)?.to_string();
        let response = self
            .http
            .get(self.endpoints.environment_index(&namespace)?)?
            .response;
        if response.status != 200 {
            debug!(body = %response.body, "environment change rejected");
            return Err(OtaError::EnvironmentChange {
                name: name.to_string(),
                status: response.status,
            });
        }

        let tokens = auth::read_environment_tokens(&response.body)?;
        self.http
            .set_csrf_token(&tokens.csrf_token, &self.endpoints.platform_root())?;
        self.session.enter(name, tokens)?;
        info!(environment = name, "Switched environment");
        Ok(())
    }

    // Devices

    /// Raw search result for `name` in the current environment.
    pub fn device_info(&mut self, name: &str) -> Result<ResponseData> {
        self.get(self.endpoints.device_search(name, DEVICE_SEARCH_LIMIT)?)
    }

    /// Device records matching `name` in the current environment.
    pub fn search_devices(&mut self, name: &str) -> Result<Vec<Value>> {
        let url = self.endpoints.device_search(name, DEVICE_SEARCH_LIMIT)?;
        values(self.get(url)?)
    }

    pub fn device_uuid(&mut self, name: &str) -> Result<String> {
        let devices = self.search_devices(name)?;
        devices
            .first()
            .and_then(|device| device.get("uuid"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OtaError::DeviceNotFound {
                name: name.to_string(),
                environments: vec![self.session.current_environment().to_string()],
            })
    }

    /// Finds the one environment holding device `name` and leaves the session there.
    ///
    /// Every environment is searched in listing order. On any failure the
    /// session is switched back to where it started before the error is
    /// returned; if that switch fails too the error is
    /// [`OtaError::EnvironmentRestore`], naming where the session was left.
    pub fn resolve_unique_environment(&mut self, name: &str) -> Result<String> {
        let origin = self.session.current_environment().to_string();
        let outcome = self
            .scan_environments(name)
            .and_then(|found| self.settle(name, found));
        outcome.map_err(|err| self.restore_after(&origin, err))
    }

    fn scan_environments(&mut self, name: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for environment in self.session.environment_names() {
            self.switch_environment(&environment)?;
            if !self.search_devices(name)?.is_empty() {
                debug!(device = name, environment = %environment, "device found");
                found.push(environment);
            }
        }
        Ok(found)
    }

    fn settle(&mut self, name: &str, mut found: Vec<String>) -> Result<String> {
        match found.len() {
            1 => {
                let environment = found.remove(0);
                self.switch_environment(&environment)?;
                Ok(environment)
            }
            0 => Err(OtaError::DeviceNotFound {
                name: name.to_string(),
                environments: self.session.environment_names(),
            }),
            _ => Err(OtaError::AmbiguousEnvironment {
                device: name.to_string(),
                environments: found,
            }),
        }
    }

    fn restore_after(&mut self, origin: &str, cause: OtaError) -> OtaError {
        if self.session.current_environment() == origin {
            return cause;
        }
        match self.switch_environment(origin) {
            Ok(()) => cause,
            Err(restore) => {
                let current = self.session.current_environment().to_string();
                warn!(
                    environment = origin,
                    current = %current,
                    error = %restore,
                    "could not return to starting environment"
                );
                OtaError::EnvironmentRestore {
                    cause: Box::new(cause),
                    origin: origin.to_string(),
                    current,
                    restore: Box::new(restore),
                }
            }
        }
    }

    pub fn device_by_uuid(&mut self, uuid: &str) -> Result<ResponseData> {
        self.get(self.endpoints.device(uuid)?)
    }

    pub fn device_history(&mut self, name: &str, limit: usize) -> Result<ResponseData> {
        let uuid = self.device_uuid(name)?;
        self.get(self.endpoints.device_history(&uuid, limit)?)
    }

    pub fn device_assignments(&mut self, name: &str) -> Result<ResponseData> {
        let uuid = self.device_uuid(name)?;
        self.get(self.endpoints.assignments(&uuid)?)
    }

    pub fn device_events(&mut self, name: &str) -> Result<ResponseData> {
        let uuid = self.device_uuid(name)?;
        self.get(self.endpoints.device_events(&uuid)?)
    }

    pub fn device_network(&mut self, name: &str) -> Result<ResponseData> {
        let uuid = self.device_uuid(name)?;
        self.get(self.endpoints.device_network(&uuid)?)
    }

    pub fn device_last_update(&mut self, name: &str) -> Result<ResponseData> {
        let uuid = self.device_uuid(name)?;
        self.get(self.endpoints.device_last_update(&uuid)?)
    }

    // Groups

    pub fn groups(&mut self, limit: usize, offset: usize) -> Result<ResponseData> {
        self.get(self.endpoints.groups(limit, offset)?)
    }

    pub fn create_static_group(&mut self, name: &str) -> Result<ResponseData> {
        let body = serde_json::json!({
            "expression": null,
            "groupType": "static",
            "name": name,
        });
        self.post(self.endpoints.create_group()?, &[], Some(&body))
    }

    pub fn add_device_to_group_by_uuid(
        &mut self,
        group_id: &str,
        device_uuid: &str,
    ) -> Result<ResponseData> {
        self.post(
            self.endpoints.group_member(group_id, device_uuid)?,
            &[],
            Option::<&Value>::None,
        )
    }

    pub fn remove_device_from_group_by_uuid(
        &mut self,
        group_id: &str,
        device_uuid: &str,
    ) -> Result<ResponseData> {
        let url = self.endpoints.group_member(group_id, device_uuid)?;
        Ok(self.http.delete(url)?.response.error_for_status()?)
    }

    pub fn devices_in_group(&mut self, group_id: &str, limit: usize) -> Result<ResponseData> {
        self.get(self.endpoints.devices_in_group(group_id, limit)?)
    }

    // Campaigns and updates

    pub fn updates(&mut self, name_contains: &str, limit: usize) -> Result<ResponseData> {
        self.get(self.endpoints.updates(name_contains, limit)?)
    }

    pub fn campaign_info(&mut self, id: &str) -> Result<ResponseData> {
        self.get(self.endpoints.campaign(id)?)
    }

    /// Creates campaign `name` for `update_id` on `group_id` and launches it.
    pub fn launch_campaign(
        &mut self,
        name: &str,
        update_id: &str,
        group_id: &str,
    ) -> Result<ResponseData> {
        let origin = self.endpoints.platform_origin();
        let headers = [("Origin", origin.as_str())];
        let body = serde_json::json!({
            "name": name,
            "update": update_id,
            "groups": [group_id],
            "approvalNeeded": false,
        });
        let url = self.endpoints.campaigns()?;
        let created = self.post(url.clone(), &headers, Some(&body))?;
        let campaign_id = campaign_id(&created).ok_or_else(|| OtaError::Shape {
            url: url.to_string(),
            detail: "campaign creation did not return an id".into(),
        })?;
        info!(campaign = %campaign_id, "Created campaign");

        let launched = self.post(
            self.endpoints.launch_campaign(&campaign_id)?,
            &headers,
            Option::<&Value>::None,
        )?;
        debug!(body = %launched.body, "launch response");
        Ok(launched)
    }

    pub fn software_versions(&mut self) -> Result<ResponseData> {
        self.get(self.endpoints.software_versions()?)
    }

    /// Authenticated GET in the current environment; non-2xx is an error.
    pub fn get(&self, url: Url) -> Result<ResponseData> {
        self.http.get(url)?.response.error_for_status()
    }

    /// Authenticated POST in the current environment; non-2xx is an error.
    pub fn post<B: Serialize + ?Sized>(
        &self,
        url: Url,
        headers: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<ResponseData> {
        self.http
            .post_json(url, headers, body)?
            .response
            .error_for_status()
    }
}

/// `values` array of a paged listing.
pub(crate) fn values(response: ResponseData) -> Result<Vec<Value>> {
    let url = response.url.to_string();
    match response.into_json()? {
        Value::Object(mut map) => match map.remove("values") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(OtaError::Shape {
                url,
                detail: "missing `values` array".into(),
            }),
        },
        Value::Array(items) => Ok(items),
        _ => Err(OtaError::Shape {
            url,
            detail: "expected an object or array".into(),
        }),
    }
}

fn campaign_id(response: &ResponseData) -> Option<String> {
    match response.json.as_ref()? {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("uuid"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::tests::{credentials, mount_sign_in};
    use crate::session::{Environment, EnvironmentTokens, UserProfile};
    use httpmock::prelude::*;
    use serde_json::json;

    pub(crate) fn index_body(env: &str) -> String {
        format!(
            r#"<input type="hidden" id="csrf-token-val" value="csrf-{env}"/>
               <input type="hidden" id="ws-url" value="wss://events.example/{env}"/>"#
        )
    }

    /// Client already signed in to `environments`, currently in the first one.
    pub(crate) fn client_for(server: &MockServer, environments: &[(&str, &str)]) -> OtaClient {
        let first = environments[0].0;
        let session = SessionContext::new(
            "access",
            UserProfile::default(),
            EnvironmentTokens {
                csrf_token: format!("csrf-{first}"),
                websocket_address: format!("wss://events.example/{first}"),
            },
            environments
                .iter()
                .map(|(name, namespace)| Environment {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                })
                .collect(),
            first,
        )
        .unwrap();
        let endpoints = Endpoints::new(&server.base_url(), &server.base_url()).unwrap();
        let http = HttpSession::new(&HttpSettings::default()).unwrap();
        OtaClient::from_session(http, endpoints, session).unwrap()
    }

    pub(crate) fn mount_environment(server: &MockServer, env: &str, namespace: &str) {
        let body = index_body(env);
        server.mock(|when, then| {
            when.method(GET)
                .path(format!("/organizations/{namespace}/index"));
            then.status(200).body(body);
        });
    }

    fn mount_search(server: &MockServer, env: &str, device: &str, hits: Value) {
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/devices")
                .query_param("nameContains", device)
                .header("Csrf-Token", format!("csrf-{env}"));
            then.status(200).json_body(json!({ "values": hits }));
        });
    }

    #[test]
    fn connect_runs_handshake() {
        let server = MockServer::start();
        mount_sign_in(&server, json!({"accessToken": "access-1"}));
        let endpoints = Endpoints::new(&server.base_url(), &server.base_url()).unwrap();

        let client = OtaClient::connect(endpoints, &HttpSettings::default(), &credentials()).unwrap();
        assert_eq!(client.current_environment(), "dev");
        assert_eq!(client.websocket_address(), "wss://events.example/ws");
    }

    #[test]
    fn switch_to_unknown_environment_makes_no_request() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.path_contains("/");
            then.status(200);
        });
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        let err = client.switch_environment("qa").unwrap_err();
        match err {
            OtaError::InvalidEnvironment { choices, .. } => {
                assert_eq!(choices, vec!["dev", "prod"])
            }
            other => panic!("unexpected error {other:?}"),
        }
        any.assert_hits(0);
        assert_eq!(client.current_environment(), "dev");
    }

    #[test]
    fn switch_updates_environment_and_tokens() {
        let server = MockServer::start();
        mount_environment(&server, "prod", "ns2");
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        client.switch_environment("prod").unwrap();
        let session = client.session();
        assert_eq!(session.current_environment(), "prod");
        assert_eq!(session.csrf_token(), "csrf-prod");
        assert_eq!(session.websocket_address(), "wss://events.example/prod");
    }

    #[test]
    fn switch_is_deterministic_when_repeated() {
        let server = MockServer::start();
        mount_environment(&server, "prod", "ns2");
        let mut once = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);
        let mut twice = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        once.switch_environment("prod").unwrap();
        twice.switch_environment("prod").unwrap();
        twice.switch_environment("prod").unwrap();
        assert_eq!(once.session().csrf_token(), twice.session().csrf_token());
        assert_eq!(twice.current_environment(), "prod");
    }

    #[test]
    fn failed_switch_keeps_previous_environment() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/organizations/ns2/index");
            then.status(500).body(index_body("prod"));
        });
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        let err = client.switch_environment("prod").unwrap_err();
        assert!(matches!(err, OtaError::EnvironmentChange { status: 500, .. }));
        assert_eq!(client.current_environment(), "dev");
        assert_eq!(client.session().csrf_token(), "csrf-dev");
    }

    #[test]
    fn switch_without_tokens_keeps_previous_environment() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/organizations/ns2/index");
            then.status(200).body("<html>maintenance</html>");
        });
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        let err = client.switch_environment("prod").unwrap_err();
        assert!(matches!(err, OtaError::TokenNotFound { .. }));
        assert_eq!(client.current_environment(), "dev");
    }

    #[test]
    fn resolves_device_present_in_one_environment() {
        let server = MockServer::start();
        mount_environment(&server, "dev", "ns1");
        mount_environment(&server, "prod", "ns2");
        mount_search(&server, "dev", "car-42", json!([]));
        mount_search(&server, "prod", "car-42", json!([{"uuid": "u-42", "deviceName": "car-42"}]));
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        let env = client.resolve_unique_environment("car-42").unwrap();
        assert_eq!(env, "prod");
        assert_eq!(client.current_environment(), "prod");
        assert_eq!(client.device_uuid("car-42").unwrap(), "u-42");
    }

    #[test]
    fn resolves_device_among_three_environments() {
        let server = MockServer::start();
        let envs = [("dev", "ns1"), ("staging", "ns2"), ("prod", "ns3")];
        for (env, ns) in envs {
            mount_environment(&server, env, ns);
        }
        mount_search(&server, "dev", "car-7", json!([]));
        mount_search(&server, "staging", "car-7", json!([{"uuid": "u-7"}]));
        mount_search(&server, "prod", "car-7", json!([]));
        let mut client = client_for(&server, &envs);

        assert_eq!(client.resolve_unique_environment("car-7").unwrap(), "staging");
        assert_eq!(client.current_environment(), "staging");
        assert_eq!(client.session().csrf_token(), "csrf-staging");
    }

    #[test]
    fn missing_device_restores_starting_environment() {
        let server = MockServer::start();
        mount_environment(&server, "dev", "ns1");
        mount_environment(&server, "prod", "ns2");
        mount_search(&server, "dev", "ghost", json!([]));
        mount_search(&server, "prod", "ghost", json!([]));
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        let err = client.resolve_unique_environment("ghost").unwrap_err();
        assert!(matches!(err, OtaError::DeviceNotFound { .. }));
        assert_eq!(client.current_environment(), "dev");
        assert_eq!(client.session().csrf_token(), "csrf-dev");
    }

    // Index for `namespace` answers 200 to the `ok_from` token and 500 to the
    // `fail_from` token.
    fn mount_index_by_token(
        server: &MockServer,
        env: &str,
        namespace: &str,
        ok_from: &str,
        fail_from: &str,
    ) {
        for (token_env, status) in [(ok_from, 200), (fail_from, 500)] {
            let body = index_body(env);
            server.mock(|when, then| {
                when.method(GET)
                    .path(format!("/organizations/{namespace}/index"))
                    .header("Csrf-Token", format!("csrf-{token_env}"));
                then.status(status).body(body);
            });
        }
    }

    #[test]
    fn ambiguous_device_reports_failed_return() {
        let server = MockServer::start();
        mount_index_by_token(&server, "dev", "ns1", "dev", "prod");
        mount_environment(&server, "prod", "ns2");
        mount_search(&server, "dev", "twin", json!([{"uuid": "a"}]));
        mount_search(&server, "prod", "twin", json!([{"uuid": "b"}]));
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        match client.resolve_unique_environment("twin").unwrap_err() {
            OtaError::EnvironmentRestore {
                cause,
                origin,
                current,
                restore,
            } => {
                assert!(matches!(*cause, OtaError::AmbiguousEnvironment { .. }));
                assert_eq!(origin, "dev");
                assert_eq!(current, "prod");
                assert!(matches!(*restore, OtaError::EnvironmentChange { status: 500, .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(client.current_environment(), "prod");
    }

    #[test]
    fn unique_device_with_failing_final_switch_reports_failed_return() {
        let server = MockServer::start();
        mount_index_by_token(&server, "dev", "ns1", "dev", "prod");
        mount_environment(&server, "prod", "ns2");
        mount_search(&server, "dev", "car-1", json!([{"uuid": "u-1"}]));
        mount_search(&server, "prod", "car-1", json!([]));
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        match client.resolve_unique_environment("car-1").unwrap_err() {
            OtaError::EnvironmentRestore {
                cause,
                current,
                ..
            } => {
                assert!(matches!(*cause, OtaError::EnvironmentChange { status: 500, .. }));
                assert_eq!(current, "prod");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn failing_final_switch_returns_to_starting_environment() {
        let server = MockServer::start();
        let envs = [("dev", "ns1"), ("staging", "ns2"), ("prod", "ns3")];
        mount_environment(&server, "dev", "ns1");
        mount_index_by_token(&server, "staging", "ns2", "dev", "prod");
        mount_environment(&server, "prod", "ns3");
        mount_search(&server, "dev", "car-7", json!([]));
        mount_search(&server, "staging", "car-7", json!([{"uuid": "u-7"}]));
        mount_search(&server, "prod", "car-7", json!([]));
        let mut client = client_for(&server, &envs);

        let err = client.resolve_unique_environment("car-7").unwrap_err();
        assert!(matches!(err, OtaError::EnvironmentChange { status: 500, .. }));
        assert_eq!(client.current_environment(), "dev");
        assert_eq!(client.session().csrf_token(), "csrf-dev");
    }

    #[test]
    fn device_in_several_environments_is_ambiguous() {
        let server = MockServer::start();
        mount_environment(&server, "dev", "ns1");
        mount_environment(&server, "prod", "ns2");
        mount_search(&server, "dev", "twin", json!([{"uuid": "a"}]));
        mount_search(&server, "prod", "twin", json!([{"uuid": "b"}]));
        let mut client = client_for(&server, &[("dev", "ns1"), ("prod", "ns2")]);

        match client.resolve_unique_environment("twin").unwrap_err() {
            OtaError::AmbiguousEnvironment { environments, .. } => {
                assert_eq!(environments, vec!["dev", "prod"])
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(client.current_environment(), "dev");
    }

    #[test]
    fn device_uuid_missing_in_current_environment() {
        let server = MockServer::start();
        mount_search(&server, "dev", "nobody", json!([]));
        let mut client = client_for(&server, &[("dev", "ns1")]);

        match client.device_uuid("nobody").unwrap_err() {
            OtaError::DeviceNotFound { environments, .. } => assert_eq!(environments, vec!["dev"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn device_history_uses_resolved_uuid() {
        let server = MockServer::start();
        mount_search(&server, "dev", "car-1", json!([{"uuid": "u-1"}]));
        let history = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/devices/u-1/installation_history")
                .query_param("limit", "5")
                .header("Csrf-Token", "csrf-dev");
            then.status(200).json_body(json!({"values": [{"correlationId": "c-1"}]}));
        });
        let mut client = client_for(&server, &[("dev", "ns1")]);

        let resp = client.device_history("car-1", 5).unwrap();
        history.assert();
        assert_eq!(resp.json.unwrap()["values"][0]["correlationId"], "c-1");
    }

    #[test]
    fn non_success_status_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/user_repo/targets.json");
            then.status(403).body("forbidden");
        });
        let mut client = client_for(&server, &[("dev", "ns1")]);

        let err = client.software_versions().unwrap_err();
        assert!(err.needs_reauthentication());
    }

    #[test]
    fn creates_static_group() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/device_groups")
                .header("Csrf-Token", "csrf-dev")
                .json_body(json!({"expression": null, "groupType": "static", "name": "fleet-a"}));
            then.status(201).json_body(json!("g-1"));
        });
        let mut client = client_for(&server, &[("dev", "ns1")]);

        client.create_static_group("fleet-a").unwrap();
        create.assert();
    }

    #[test]
    fn removes_device_from_group() {
        let server = MockServer::start();
        let remove = server.mock(|when, then| {
            when.method(DELETE).path("/api/v1/device_groups/g-1/devices/u-1");
            then.status(200);
        });
        let mut client = client_for(&server, &[("dev", "ns1")]);

        client.remove_device_from_group_by_uuid("g-1", "u-1").unwrap();
        remove.assert();
    }

    #[test]
    fn launch_creates_then_launches() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/campaigns")
                .json_body(json!({
                    "name": "spring",
                    "update": "upd-1",
                    "groups": ["g-1"],
                    "approvalNeeded": false
                }));
            then.status(200).json_body(json!("camp-9"));
        });
        let launch = server.mock(|when, then| {
            when.method(POST).path("/api/v2/campaigns/camp-9/launch");
            then.status(200).body("");
        });
        let mut client = client_for(&server, &[("dev", "ns1")]);

        client.launch_campaign("spring", "upd-1", "g-1").unwrap();
        create.assert();
        launch.assert();
    }
}
