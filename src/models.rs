//! Wire DTOs shared by REST responses and push-event payloads.
//!
//! DESIGN
//! ======
//! Fields default generously: the server omits zero values and some payloads
//! (player events) are serialized from structs without field tags, so the
//! capitalized names are accepted as aliases.

use serde::{Deserialize, Serialize};

/// Generic `{status, message}` body used for errors and simple acks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildFilters {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    #[serde(default, alias = "ID")]
    pub id: String,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "IconUrl")]
    pub icon_url: String,
}

/// A sound as announced by `soundcreated` / `soundupdated` / `sounddeleted`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sound {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Guild audio settings delivered on voice join/init.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceJoinPayload {
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub filters: GuildFilters,
    #[serde(default)]
    pub guild: Option<Guild>,
}

/// Session snapshot carried by `authok`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatePayload {
    #[serde(flatten)]
    pub voice: VoiceJoinPayload,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePayload {
    #[serde(default)]
    pub volume: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPayload {
    #[serde(default, alias = "Ident")]
    pub ident: String,
    #[serde(default, alias = "GuildID")]
    pub guild_id: Option<String>,
    #[serde(default, alias = "UserID")]
    pub user_id: Option<String>,
}

/// Sent by the server right after the socket opens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPromptPayload {
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// OAuth providers the login redirect supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginProvider {
    Discord,
    Twitch,
}

impl LoginProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Twitch => "twitch",
        }
    }
}
