use crate::{DisplaySettings, EngineConfig, ErrorKind};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CURRENT_PROTOCOL_VERSION: u16 = 1;
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

fn current_version() -> u16 {
    CURRENT_PROTOCOL_VERSION
}

/// Text frame exchanged over the hub socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    #[serde(default = "current_version")]
    pub version: u16,
    #[serde(default)]
    pub timestamp: String,
    #[serde(flatten)]
    pub event: T,
}

impl<T> Envelope<T> {
    pub fn new(event: T) -> Self {
        Self {
            version: CURRENT_PROTOCOL_VERSION,
            timestamp: Utc::now().to_rfc3339(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    pub profile_name: String,
    pub settings: DisplaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnginesPayload {
    pub profile_name: String,
    pub engines: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRef {
    pub profile_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// Events a window sends to the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    DisplaySettingsUpdate(SettingsPayload),
    SearchEnginesUpdate(EnginesPayload),
    ProfileSwitch(ProfileRef),
    ProfilesChanged,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::DisplaySettingsUpdate(_) => "display-settings-update",
            ClientEvent::SearchEnginesUpdate(_) => "search-engines-update",
            ClientEvent::ProfileSwitch(_) => "profile-switch",
            ClientEvent::ProfilesChanged => "profiles-changed",
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        match self {
            ClientEvent::DisplaySettingsUpdate(payload) => Some(&payload.profile_name),
            ClientEvent::SearchEnginesUpdate(payload) => Some(&payload.profile_name),
            ClientEvent::ProfileSwitch(payload) => Some(&payload.profile_name),
            ClientEvent::ProfilesChanged => None,
        }
    }
}

/// Events the hub sends to windows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    DisplaySettingsChanged(SettingsPayload),
    SearchEnginesChanged(EnginesPayload),
    DisplaySettingsUpdateSuccess(ProfileRef),
    SearchEnginesUpdateSuccess(ProfileRef),
    ProfileSwitched(ProfileRef),
    ProfilesListChanged,
    Error(ErrorPayload),
}

/// Which registered connections receive a hub event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryScope {
    All,
    AllExceptSender,
    SenderOnly,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::DisplaySettingsChanged(_) => "display-settings-changed",
            ServerEvent::SearchEnginesChanged(_) => "search-engines-changed",
            ServerEvent::DisplaySettingsUpdateSuccess(_) => "display-settings-update-success",
            ServerEvent::SearchEnginesUpdateSuccess(_) => "search-engines-update-success",
            ServerEvent::ProfileSwitched(_) => "profile-switched",
            ServerEvent::ProfilesListChanged => "profiles-list-changed",
            ServerEvent::Error(_) => "error",
        }
    }

    /// Per-kind delivery rule: document relays skip the originator, acks and
    /// errors go back to it alone, list-level invalidations reach everyone.
    pub fn scope(&self) -> DeliveryScope {
        match self {
            ServerEvent::DisplaySettingsChanged(_) | ServerEvent::SearchEnginesChanged(_) => {
                DeliveryScope::AllExceptSender
            }
            ServerEvent::DisplaySettingsUpdateSuccess(_)
            | ServerEvent::SearchEnginesUpdateSuccess(_)
            | ServerEvent::Error(_) => DeliveryScope::SenderOnly,
            ServerEvent::ProfileSwitched(_) | ServerEvent::ProfilesListChanged => {
                DeliveryScope::All
            }
        }
    }

    pub fn error(message: impl Into<String>, error: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
            error: error.into(),
            kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
    #[error("event encode failed: {0}")]
    Encode(String),
    #[error("event decode failed: {0}")]
    Decode(String),
}

pub fn encode_event<T: Serialize>(event: T) -> Result<String, EventError> {
    serde_json::to_string(&Envelope::new(event)).map_err(|err| EventError::Encode(err.to_string()))
}

pub fn decode_event<T: DeserializeOwned>(raw: &[u8], max_bytes: usize) -> Result<T, EventError> {
    if raw.len() > max_bytes {
        return Err(EventError::Oversized {
            size: raw.len(),
            max: max_bytes,
        });
    }
    let envelope: Envelope<T> =
        serde_json::from_slice(raw).map_err(|err| EventError::Decode(err.to_string()))?;
    if envelope.version != CURRENT_PROTOCOL_VERSION {
        return Err(EventError::UnsupportedVersion(envelope.version));
    }
    Ok(envelope.event)
}
