//! Player characters and their client sessions.
use super::Unit;
use crate::error::SessionError;
use crate::types::{EntityId, FactionGroup, Locale, MapId};
use std::sync::Arc;

/// Outbound side of a client connection.
///
/// Implementations must be thread-safe: sends happen from shard threads and
/// from global broadcasts alike.
pub trait Session: Send + Sync + std::fmt::Debug {
    /// Delivers an already serialized packet.
    fn send(&self, packet: &[u8]) -> Result<(), SessionError>;

    /// Disconnects the client.
    fn kick(&self, reason: &str);
}

/// Data needed to create a character.
#[derive(Debug, Clone)]
pub struct CharacterInfo {
    pub name: String,
    pub level: u8,
    pub max_health: u32,
    pub locale: Locale,
    pub faction: FactionGroup,
}

impl CharacterInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: 1,
            max_health: 100,
            locale: Locale::default(),
            faction: FactionGroup::default(),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_faction(mut self, faction: FactionGroup) -> Self {
        self.faction = faction;
        self
    }
}

/// Player-controlled state.
#[derive(Debug)]
pub struct Character {
    pub unit: Unit,
    pub(crate) locale: Locale,
    pub(crate) faction: FactionGroup,
    pub experience: u64,
    session: Arc<dyn Session>,
}

impl Character {
    pub(crate) fn new(info: &CharacterInfo, session: Arc<dyn Session>) -> Self {
        Self {
            unit: Unit::new(info.level, info.max_health),
            locale: info.locale,
            faction: info.faction,
            experience: 0,
            session,
        }
    }

    /// Indexed by the shard; change it through the shard context.
    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Indexed by the shard; change it through the shard context.
    pub fn faction(&self) -> FactionGroup {
        self.faction
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn send(&self, packet: &[u8]) -> Result<(), SessionError> {
        self.session.send(packet)
    }
}

/// Thread-safe reference to an online character.
///
/// Held by the shard's online list so broadcasts can reach players without
/// entering the shard context.
#[derive(Debug, Clone)]
pub struct CharacterHandle {
    pub id: EntityId,
    pub name: Arc<str>,
    pub map: MapId,
    pub locale: Locale,
    pub faction: FactionGroup,
    session: Arc<dyn Session>,
}

impl CharacterHandle {
    pub(crate) fn new(id: EntityId, name: Arc<str>, map: MapId, character: &Character) -> Self {
        Self {
            id,
            name,
            map,
            locale: character.locale,
            faction: character.faction,
            session: Arc::clone(&character.session),
        }
    }

    pub fn send(&self, packet: &[u8]) -> Result<(), SessionError> {
        self.session.send(packet)
    }

    pub fn kick(&self, reason: &str) {
        self.session.kick(reason)
    }
}
