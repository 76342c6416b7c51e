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

//! Name lookups for groups and updates.
//!
//! Both scan a single page of results in the current environment and hand
//! every match to a caller-supplied decision hook; the first confirmed match
//! wins.

use crate::client::ResponseData;
use crate::error::{OtaError, Result};
use crate::ota::{OtaClient, values};
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_PAGE_LIMIT: usize = 1000;
const GROUP_MEMBER_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Reject,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Group,
    Update,
}

/// A name match offered to the decision hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMatch {
    /// Trimmed group name equals the query.
    Exact,
    /// Trimmed group name contains the query.
    Contains,
}

impl GroupMatch {
    fn matches(self, query: &str, candidate: &str) -> bool {
        match self {
            GroupMatch::Exact => candidate == query,
            GroupMatch::Contains => candidate.contains(query),
        }
    }
}

impl OtaClient {
    /// Group id for the first match of `name` the hook confirms.
    pub fn find_group<F>(
        &mut self,
        name: &str,
        mode: GroupMatch,
        limit: usize,
        decide: F,
    ) -> Result<String>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let groups = values(self.groups(limit, 0)?)?;
        let candidates = groups.iter().filter_map(|group| {
            let group_name = str_field(group, "groupName")?.trim();
            if !mode.matches(name, group_name) {
                return None;
            }
            Some(Candidate {
                kind: CandidateKind::Group,
                id: str_field(group, "id")?.to_string(),
                name: group_name.to_string(),
                description: None,
                created_at: str_field(group, "createdAt").map(str::to_string),
                updated_at: None,
            })
        });
        choose(name, candidates, decide)?.ok_or_else(|| OtaError::GroupNotFound {
            name: name.to_string(),
            limit,
        })
    }

    /// Substring match over the first page of groups.
    pub fn find_group_by_name<F>(&mut self, name: &str, decide: F) -> Result<String>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        self.find_group(name, GroupMatch::Contains, DEFAULT_PAGE_LIMIT, decide)
    }

    /// Exact match over the first page of groups.
    pub fn find_group_id_by_name<F>(&mut self, name: &str, decide: F) -> Result<String>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        self.find_group(name, GroupMatch::Exact, DEFAULT_PAGE_LIMIT, decide)
    }

    /// Update id whose name equals `name` and which the hook confirms.
    pub fn find_campaign_by_name<F>(&mut self, name: &str, decide: F) -> Result<String>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let updates = values(self.updates(name, DEFAULT_PAGE_LIMIT)?)?;
        let candidates = updates.iter().filter_map(|update| {
            let update_name = str_field(update, "name")?;
            if update_name != name {
                return None;
            }
            Some(Candidate {
                kind: CandidateKind::Update,
                id: str_field(update, "uuid")?.to_string(),
                name: update_name.to_string(),
                description: str_field(update, "description").map(str::to_string),
                created_at: str_field(update, "createdAt").map(str::to_string),
                updated_at: str_field(update, "updatedAt").map(str::to_string),
            })
        });
        choose(name, candidates, decide)?.ok_or_else(|| OtaError::CampaignNotFound {
            name: name.to_string(),
        })
    }

    pub fn add_device_to_group<F>(
        &mut self,
        group: &str,
        device: &str,
        decide: F,
    ) -> Result<ResponseData>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let group_id = self.find_group_by_name(group, decide)?;
        let device_uuid = self.device_uuid(device)?;
        self.add_device_to_group_by_uuid(&group_id, &device_uuid)
    }

    pub fn remove_device_from_group<F>(
        &mut self,
        group: &str,
        device: &str,
        decide: F,
    ) -> Result<ResponseData>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let group_id = self.find_group_by_name(group, decide)?;
        let device_uuid = self.device_uuid(device)?;
        self.remove_device_from_group_by_uuid(&group_id, &device_uuid)
    }

    pub fn device_names_in_group<F>(&mut self, group: &str, decide: F) -> Result<Vec<String>>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let group_id = self.find_group_by_name(group, decide)?;
        let devices = values(self.devices_in_group(&group_id, GROUP_MEMBER_LIMIT)?)?;
        Ok(devices
            .iter()
            .filter_map(|device| str_field(device, "deviceName"))
            .map(str::to_string)
            .collect())
    }

    /// Resolves group and update by name, then creates and launches the campaign.
    pub fn launch_campaign_on_group<F>(
        &mut self,
        campaign_name: &str,
        group: &str,
        update: &str,
        mut decide: F,
    ) -> Result<ResponseData>
    where
        F: FnMut(&Candidate) -> Decision,
    {
        let group_id = self.find_group_by_name(group, &mut decide)?;
        let update_id = self.find_campaign_by_name(update, &mut decide)?;
        self.launch_campaign(campaign_name, &update_id, &group_id)
    }
}

fn choose<I, F>(name: &str, candidates: I, mut decide: F) -> Result<Option<String>>
where
    I: IntoIterator<Item = Candidate>,
    F: FnMut(&Candidate) -> Decision,
{
    for candidate in candidates {
        info!(kind = ?candidate.kind, name = %candidate.name, "candidate");
        match decide(&candidate) {
            Decision::Confirm => return Ok(Some(candidate.id)),
            Decision::Reject => debug!(id = %candidate.id, "candidate rejected"),
            Decision::Abort => {
                return Err(OtaError::SelectionAborted {
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(None)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
