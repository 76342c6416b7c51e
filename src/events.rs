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

//! Messages pushed on the session websocket.

use crate::error::Result;
use serde::Deserialize;

const DEVICE_EVENT_MESSAGE: &str = "DeviceEventMessage";

/// ECU lifecycle event tied to a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub correlation_id: String,
    pub event_type: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    event: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    payload: Payload,
    event_type: EventType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    correlation_id: String,
}

#[derive(Deserialize)]
struct EventType {
    id: String,
}

/// `Some` for `DeviceEventMessage` frames, `None` for every other message type.
pub fn parse_device_event(message: &str) -> Result<Option<DeviceEvent>> {
    let envelope: Envelope = serde_json::from_str(message)?;
    if envelope.kind.as_deref() != Some(DEVICE_EVENT_MESSAGE) {
        return Ok(None);
    }
    let event: EventBody = serde_json::from_value(envelope.event)?;
    Ok(Some(DeviceEvent {
        correlation_id: event.payload.correlation_id,
        event_type: event.event_type.id,
    }))
}
