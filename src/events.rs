//! Push-event envelope and the typed event vocabulary.
//!
//! DESIGN
//! ======
//! Every socket message is an envelope `{type, origin?, payload?}`. Known tags
//! decode into typed variants; anything else (including a known tag whose
//! payload no longer matches) is kept as [`EventKind::Unknown`] with the raw
//! payload so consumers can still see it. The two transport-status events
//! (`_disconnected`, `_reconnected`) are produced locally and are never
//! accepted from the wire.
//!
//! ERROR HANDLING
//! ==============
//! Only a message that is not JSON at all, or lacks a `type`, fails to decode.
//! Payload mismatches degrade to `Unknown` with a warning.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::ClientError;
use crate::models::{
    AuthPromptPayload, ErrorPayload, GuildFilters, PlayerPayload, SessionStatePayload, Sound, Status,
    VoiceJoinPayload, VolumePayload,
};

pub const TAG_AUTH: &str = "auth";
pub const TAG_AUTH_PROMPT: &str = "authpromp";
pub const TAG_AUTH_OK: &str = "authok";
pub const TAG_AUTH_REJECTED: &str = "authpromptfailed";
pub const TAG_SOUND_CREATED: &str = "soundcreated";
pub const TAG_SOUND_UPDATED: &str = "soundupdated";
pub const TAG_SOUND_DELETED: &str = "sounddeleted";
pub const TAG_VOLUME_UPDATED: &str = "volumeupdated";
pub const TAG_GUILD_FILTER_UPDATED: &str = "guildfilterupdated";
pub const TAG_PLAY_START: &str = "playstart";
pub const TAG_PLAY_END: &str = "playend";
pub const TAG_PLAY_STUCK: &str = "playstuck";
pub const TAG_PLAY_EXCEPTION: &str = "playexception";
pub const TAG_VOICE_JOIN: &str = "voicejoin";
pub const TAG_VOICE_LEAVE: &str = "voiceleave";
pub const TAG_VOICE_INIT: &str = "voiceinit";
pub const TAG_VOICE_DEINIT: &str = "voicedeinit";
pub const TAG_ERROR: &str = "error";
pub const TAG_DISCONNECTED: &str = "_disconnected";
pub const TAG_RECONNECTED: &str = "_reconnected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    AuthPrompt(AuthPromptPayload),
    AuthOk(SessionStatePayload),
    AuthRejected(Option<Status>),
    SoundCreated(Sound),
    SoundUpdated(Sound),
    SoundDeleted(Sound),
    VolumeUpdated(VolumePayload),
    GuildFilterUpdated(GuildFilters),
    PlayStart(PlayerPayload),
    PlayEnd(PlayerPayload),
    PlayStuck(PlayerPayload),
    PlayException(PlayerPayload),
    VoiceJoin(VoiceJoinPayload),
    VoiceLeave,
    VoiceInit(VoiceJoinPayload),
    VoiceDeinit,
    Error(ErrorPayload),
    /// Local: the socket dropped and a reconnect is scheduled.
    Disconnected,
    /// Local: the socket delivered its first message after a drop.
    Reconnected,
    Unknown { tag: String, payload: Option<Value> },
}

/// One inbound message as handed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Tag of the event this one answers, when the server sets it.
    pub origin: Option<String>,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

impl PushEvent {
    #[must_use]
    pub fn local(kind: EventKind) -> Self {
        Self { origin: None, kind }
    }

    /// Parse one raw socket message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] when the text is not a JSON envelope.
    pub fn decode(raw: &str) -> Result<Self, ClientError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(Self { origin: envelope.origin, kind: EventKind::from_wire(envelope.tag, envelope.payload) })
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        self.kind.tag()
    }

    /// Re-encode as a `{type, origin, payload}` JSON value.
    #[must_use]
    pub fn to_envelope(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), Value::String(self.tag().to_string()));
        if let Some(origin) = &self.origin {
            out.insert("origin".into(), Value::String(origin.clone()));
        }
        if let Some(payload) = self.kind.payload() {
            out.insert("payload".into(), payload);
        }
        Value::Object(out)
    }
}

impl EventKind {
    fn from_wire(tag: String, payload: Option<Value>) -> Self {
        let decoded = match tag.as_str() {
            TAG_AUTH_PROMPT => typed(payload.as_ref()).map(Self::AuthPrompt),
            TAG_AUTH_OK => typed(payload.as_ref()).map(Self::AuthOk),
            TAG_AUTH_REJECTED => match &payload {
                None | Some(Value::Null) => Ok(Self::AuthRejected(None)),
                Some(_) => typed(payload.as_ref()).map(|status| Self::AuthRejected(Some(status))),
            },
            TAG_SOUND_CREATED => typed(payload.as_ref()).map(Self::SoundCreated),
            TAG_SOUND_UPDATED => typed(payload.as_ref()).map(Self::SoundUpdated),
            TAG_SOUND_DELETED => typed(payload.as_ref()).map(Self::SoundDeleted),
            TAG_VOLUME_UPDATED => typed(payload.as_ref()).map(Self::VolumeUpdated),
            TAG_GUILD_FILTER_UPDATED => typed(payload.as_ref()).map(Self::GuildFilterUpdated),
            TAG_PLAY_START => typed(payload.as_ref()).map(Self::PlayStart),
            TAG_PLAY_END => typed(payload.as_ref()).map(Self::PlayEnd),
            TAG_PLAY_STUCK => typed(payload.as_ref()).map(Self::PlayStuck),
            TAG_PLAY_EXCEPTION => typed(payload.as_ref()).map(Self::PlayException),
            TAG_VOICE_JOIN => typed(payload.as_ref()).map(Self::VoiceJoin),
            TAG_VOICE_LEAVE => Ok(Self::VoiceLeave),
            TAG_VOICE_INIT => typed(payload.as_ref()).map(Self::VoiceInit),
            TAG_VOICE_DEINIT => Ok(Self::VoiceDeinit),
            TAG_ERROR => typed(payload.as_ref()).map(Self::Error),
            _ => return Self::Unknown { tag, payload },
        };

        decoded.unwrap_or_else(|e| {
            tracing::warn!(%tag, error = %e, "push payload did not match its tag; forwarding raw");
            Self::Unknown { tag, payload }
        })
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::AuthPrompt(_) => TAG_AUTH_PROMPT,
            Self::AuthOk(_) => TAG_AUTH_OK,
            Self::AuthRejected(_) => TAG_AUTH_REJECTED,
            Self::SoundCreated(_) => TAG_SOUND_CREATED,
            Self::SoundUpdated(_) => TAG_SOUND_UPDATED,
            Self::SoundDeleted(_) => TAG_SOUND_DELETED,
            Self::VolumeUpdated(_) => TAG_VOLUME_UPDATED,
            Self::GuildFilterUpdated(_) => TAG_GUILD_FILTER_UPDATED,
            Self::PlayStart(_) => TAG_PLAY_START,
            Self::PlayEnd(_) => TAG_PLAY_END,
            Self::PlayStuck(_) => TAG_PLAY_STUCK,
            Self::PlayException(_) => TAG_PLAY_EXCEPTION,
            Self::VoiceJoin(_) => TAG_VOICE_JOIN,
            Self::VoiceLeave => TAG_VOICE_LEAVE,
            Self::VoiceInit(_) => TAG_VOICE_INIT,
            Self::VoiceDeinit => TAG_VOICE_DEINIT,
            Self::Error(_) => TAG_ERROR,
            Self::Disconnected => TAG_DISCONNECTED,
            Self::Reconnected => TAG_RECONNECTED,
            Self::Unknown { tag, .. } => tag,
        }
    }

    fn payload(&self) -> Option<Value> {
        let value = match self {
            Self::AuthPrompt(p) => serde_json::to_value(p),
            Self::AuthOk(p) => serde_json::to_value(p),
            Self::AuthRejected(Some(p)) => serde_json::to_value(p),
            Self::SoundCreated(p) | Self::SoundUpdated(p) | Self::SoundDeleted(p) => serde_json::to_value(p),
            Self::VolumeUpdated(p) => serde_json::to_value(p),
            Self::GuildFilterUpdated(p) => serde_json::to_value(p),
            Self::PlayStart(p) | Self::PlayEnd(p) | Self::PlayStuck(p) | Self::PlayException(p) => {
                serde_json::to_value(p)
            }
            Self::VoiceJoin(p) | Self::VoiceInit(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
            Self::Unknown { payload, .. } => return payload.clone(),
            Self::AuthRejected(None) | Self::VoiceLeave | Self::VoiceDeinit | Self::Disconnected | Self::Reconnected => {
                return None;
            }
        };
        value.ok()
    }
}

/// A missing payload decodes like an empty object so all-default structs work.
fn typed<T: DeserializeOwned>(payload: Option<&Value>) -> Result<T, serde_json::Error> {
    let value = match payload {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(value) => value.clone(),
    };
    serde_json::from_value(value)
}

/// The outbound auth envelope sent right after the socket opens.
#[must_use]
pub fn auth_message(token: &str) -> String {
    json!({ "type": TAG_AUTH, "payload": { "token": token } }).to_string()
}

/// Any other outbound envelope.
#[must_use]
pub fn outbound_message(tag: &str, payload: Option<Value>) -> String {
    match payload {
        Some(payload) => json!({ "type": tag, "payload": payload }),
        None => json!({ "type": tag }),
    }
    .to_string()
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
