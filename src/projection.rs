//! Client-side session view folded from push events.
//!
//! DESIGN
//! ======
//! `SessionState::apply` is a pure fold: it never blocks and never talks to
//! the network. Sounds are keyed by `uid` and the last event for a uid wins,
//! so a create followed by an update in either order converges. After a
//! reconnect (and on every `authok`) the projection may have missed events;
//! `needs_resync` is raised so the owner can re-fetch authoritative state over
//! HTTP.
//!
//! `SessionProjection` is the shareable handle: it can be bound as the push
//! subscriber while other tasks read snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::events::{EventKind, PushEvent};
use crate::models::{Guild, GuildFilters, Sound};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// The push socket is down and events may be missing.
    pub ws_disconnected: bool,
    /// The server refused the socket's token.
    pub auth_rejected: bool,
    /// Bot is present in a voice channel of the guild.
    pub connected: bool,
    /// Bot is in the same voice channel as the user.
    pub joined: bool,
    pub is_admin: bool,
    pub volume: i64,
    pub filters: GuildFilters,
    pub guild: Option<Guild>,
    /// Ident of the sound currently playing.
    pub playing: Option<String>,
    pub sounds: BTreeMap<String, Sound>,
    /// Set on `_reconnected` and `authok`; cleared by [`SessionState::take_resync`].
    pub needs_resync: bool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the sound table from an HTTP listing, replacing what is there.
    pub fn load_sounds(&mut self, sounds: impl IntoIterator<Item = Sound>) {
        self.sounds = sounds.into_iter().map(|sound| (sound.uid.clone(), sound)).collect();
    }

    /// Returns `true` once per reconnect.
    pub fn take_resync(&mut self) -> bool {
        std::mem::take(&mut self.needs_resync)
    }

    pub fn apply(&mut self, event: &PushEvent) {
        match &event.kind {
            EventKind::Disconnected => self.ws_disconnected = true,
            EventKind::Reconnected => {
                self.ws_disconnected = false;
                self.needs_resync = true;
            }
            EventKind::AuthOk(snapshot) => {
                self.ws_disconnected = false;
                self.auth_rejected = false;
                self.connected = snapshot.connected;
                self.joined = snapshot.joined;
                self.is_admin = snapshot.is_admin;
                self.volume = snapshot.voice.volume;
                self.filters = snapshot.voice.filters.clone();
                self.guild = snapshot.voice.guild.clone();
                self.needs_resync = true;
            }
            EventKind::AuthRejected(_) => self.auth_rejected = true,
            EventKind::VoiceJoin(voice) => {
                self.joined = true;
                self.volume = voice.volume;
                self.filters = voice.filters.clone();
                self.guild = voice.guild.clone();
            }
            EventKind::VoiceLeave => self.joined = false,
            EventKind::VoiceInit(voice) => {
                self.connected = true;
                self.volume = voice.volume;
                self.filters = voice.filters.clone();
                self.guild = voice.guild.clone();
            }
            EventKind::VoiceDeinit => self.connected = false,
            EventKind::PlayStart(player) => self.playing = Some(player.ident.clone()),
            EventKind::PlayEnd(_) | EventKind::PlayException(_) => self.playing = None,
            EventKind::GuildFilterUpdated(filters) => self.filters = filters.clone(),
            EventKind::VolumeUpdated(volume) => self.volume = volume.volume,
            EventKind::SoundCreated(sound) | EventKind::SoundUpdated(sound) => {
                self.sounds.insert(sound.uid.clone(), sound.clone());
            }
            EventKind::SoundDeleted(sound) => {
                self.sounds.remove(&sound.uid);
            }
            EventKind::AuthPrompt(_) | EventKind::PlayStuck(_) | EventKind::Error(_) | EventKind::Unknown { .. } => {}
        }
    }
}

/// Thread-safe wrapper around a [`SessionState`].
#[derive(Debug, Clone, Default)]
pub struct SessionProjection {
    state: Arc<Mutex<SessionState>>,
}

impl SessionProjection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &PushEvent) {
        self.lock().apply(event);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn take_resync(&self) -> bool {
        self.lock().take_resync()
    }

    pub fn load_sounds(&self, sounds: impl IntoIterator<Item = Sound>) {
        self.lock().load_sounds(sounds);
    }

    /// A push handler that folds every event into this projection.
    #[must_use]
    pub fn subscriber(&self) -> impl Fn(&PushEvent) + Send + Sync + use<> {
        let projection = self.clone();
        move |event| projection.apply(event)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "projection_test.rs"]
mod tests;
