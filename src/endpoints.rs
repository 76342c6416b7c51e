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

use crate::error::Result;
use reqwest::Url;

pub const DEFAULT_PLATFORM_URL: &str = "https://connect.ota.here.com/";
pub const DEFAULT_ACCOUNT_URL: &str = "https://account.here.com/";

const ECU_EVENT_TYPES: &str =
    "EcuDownloadStarted,EcuDownloadCompleted,EcuInstallationStarted,EcuInstallationCompleted";

/// URL builder for the platform and the identity service it signs in through.
#[derive(Debug, Clone)]
pub struct Endpoints {
    platform: Url,
    account: Url,
}

impl Endpoints {
    pub fn new(platform: &str, account: &str) -> Result<Self> {
        Ok(Self {
            platform: with_trailing_slash(platform)?,
            account: with_trailing_slash(account)?,
        })
    }

    pub fn platform_root(&self) -> Url {
        self.platform.clone()
    }

    /// `scheme://host[:port]` of the platform, sent as `Origin` on campaign calls.
    pub fn platform_origin(&self) -> String {
        self.platform.origin().ascii_serialization()
    }

    pub fn sign_in(&self) -> Result<Url> {
        Ok(self
            .account
            .join("api/account/sign-in-with-password")?)
    }

    pub fn authorize(&self, client_id: &str, state: &str) -> Result<Url> {
        let redirect = self.platform.join("callback")?;
        let mut url = self.account.join("authorize")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("scope", "openid profile email")
            .append_pair("redirect_uri", redirect.as_str())
            .append_pair("state", state)
            .append_pair("prompt", "");
        Ok(url)
    }

    pub fn environments(&self) -> Result<Url> {
        Ok(self.platform.join("user/organizations")?)
    }

    pub fn default_environment(&self) -> Result<Url> {
        Ok(self.platform.join("user/organizations/default")?)
    }

    pub fn environment_index(&self, namespace: &str) -> Result<Url> {
        Ok(self
            .platform
            .join(&format!("organizations/{namespace}/index"))?)
    }

    pub fn device_search(&self, name: &str, limit: usize) -> Result<Url> {
        self.device_query(name, limit, None)
    }

    pub fn devices_in_group(&self, group_id: &str, limit: usize) -> Result<Url> {
        self.device_query("", limit, Some(group_id))
    }

    fn device_query(&self, name: &str, limit: usize, group_id: Option<&str>) -> Result<Url> {
        let mut url = self.platform.join("api/v1/devices")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("nameContains", name)
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", "0");
            if let Some(group) = group_id {
                pairs.append_pair("groupId", group);
            }
        }
        Ok(url)
    }

    pub fn device(&self, uuid: &str) -> Result<Url> {
        Ok(self.platform.join(&format!("api/v1/devices/{uuid}"))?)
    }

    pub fn device_history(&self, uuid: &str, limit: usize) -> Result<Url> {
        let mut url = self
            .platform
            .join(&format!("api/v1/devices/{uuid}/installation_history"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", "0");
        Ok(url)
    }

    pub fn device_events(&self, uuid: &str) -> Result<Url> {
        let mut url = self
            .platform
            .join(&format!("api/v1/devices/{uuid}/events"))?;
        url.query_pairs_mut()
            .append_pair("eventTypes", ECU_EVENT_TYPES);
        Ok(url)
    }

    pub fn device_network(&self, uuid: &str) -> Result<Url> {
        Ok(self
            .platform
            .join(&format!("api/v1/devices/{uuid}/system_info/network"))?)
    }

    pub fn device_last_update(&self, uuid: &str) -> Result<Url> {
        let mut url = self
            .platform
            .join(&format!("api/v1/admin/devices/{uuid}"))?;
        url.query_pairs_mut().append_pair("includeReplaced", "true");
        Ok(url)
    }

    pub fn assignments(&self, uuid: &str) -> Result<Url> {
        Ok(self.platform.join(&format!("api/v1/assignments/{uuid}"))?)
    }

    pub fn groups(&self, limit: usize, offset: usize) -> Result<Url> {
        let mut url = self.platform.join("api/v1/device_groups")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    pub fn create_group(&self) -> Result<Url> {
        Ok(self.platform.join("api/v1/device_groups")?)
    }

    pub fn group_member(&self, group_id: &str, device_uuid: &str) -> Result<Url> {
        Ok(self
            .platform
            .join(&format!("api/v1/device_groups/{group_id}/devices/{device_uuid}"))?)
    }

    pub fn updates(&self, name: &str, limit: usize) -> Result<Url> {
        let mut url = self.platform.join("api/v2/updates")?;
        url.query_pairs_mut()
            .append_pair("nameContains", name)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", "0")
            .append_pair("sortBy", "createdAt");
        Ok(url)
    }

    pub fn campaigns(&self) -> Result<Url> {
        Ok(self.platform.join("api/v2/campaigns")?)
    }

    pub fn campaign(&self, id: &str) -> Result<Url> {
        Ok(self.platform.join(&format!("api/v2/campaigns/{id}"))?)
    }

    pub fn launch_campaign(&self, id: &str) -> Result<Url> {
        Ok(self
            .platform
            .join(&format!("api/v2/campaigns/{id}/launch"))?)
    }

    pub fn software_versions(&self) -> Result<Url> {
        Ok(self.platform.join("api/v1/user_repo/targets.json")?)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            platform: Url::parse(DEFAULT_PLATFORM_URL).expect("default platform url"),
            account: Url::parse(DEFAULT_ACCOUNT_URL).expect("default account url"),
        }
    }
}

fn with_trailing_slash(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
