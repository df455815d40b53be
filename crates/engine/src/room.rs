//! Interface to the authoritative room. The connection itself lives elsewhere; this
//! module only describes what the client observes and what it may send back.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Coordinates;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangedStat {
    pub current: i32,
    pub max: i32,
}

impl RangedStat {
    pub const fn new(current: i32, max: i32) -> Self {
        Self { current, max }
    }

    pub fn fraction(&self) -> f32 {
        if self.max <= 0 {
            return 0.0;
        }
        (self.current as f32 / self.max as f32).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStats {
    pub health: RangedStat,
    pub energy: RangedStat,
}

/// Server-owned description of one character. The client only mirrors it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRosterEntry {
    pub identity: String,
    pub display_name: String,
    pub character_class: String,
    #[serde(default)]
    pub stats: CharacterStats,
    pub position: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoomEvent {
    RosterAdded {
        entry: CharacterRosterEntry,
    },
    RosterChanged {
        entry: CharacterRosterEntry,
    },
    RosterRemoved {
        entry: CharacterRosterEntry,
    },
    #[serde(rename_all = "camelCase")]
    CharacterMoved {
        identity: String,
        ordered_tile_ids: Vec<String>,
    },
    BecomeZombie {
        identity: String,
    },
    Notification {
        text: String,
    },
    Left {
        code: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEventKind {
    RosterAdded,
    RosterChanged,
    RosterRemoved,
    CharacterMoved,
    BecomeZombie,
    Notification,
    Left,
}

impl RoomEvent {
    pub fn kind(&self) -> RoomEventKind {
        match self {
            Self::RosterAdded { .. } => RoomEventKind::RosterAdded,
            Self::RosterChanged { .. } => RoomEventKind::RosterChanged,
            Self::RosterRemoved { .. } => RoomEventKind::RosterRemoved,
            Self::CharacterMoved { .. } => RoomEventKind::CharacterMoved,
            Self::BecomeZombie { .. } => RoomEventKind::BecomeZombie,
            Self::Notification { .. } => RoomEventKind::Notification,
            Self::Left { .. } => RoomEventKind::Left,
        }
    }
}

impl RoomEventKind {
    /// Message type string used on the wire for typed room messages.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::RosterAdded => "rosterAdded",
            Self::RosterChanged => "rosterChanged",
            Self::RosterRemoved => "rosterRemoved",
            Self::CharacterMoved => "characterMoved",
            Self::BecomeZombie => "becomeZombie",
            Self::Notification => "notification",
            Self::Left => "left",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoomCommand {
    Move { destination: Coordinates },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Debug)]
pub struct RoomSubscription {
    pub id: SubscriptionId,
    pub events: Receiver<RoomEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room connection is closed")]
    Closed,
}

/// Outbound half of a room connection.
#[derive(Debug, Clone)]
pub struct RoomOutbox {
    commands: Sender<RoomCommand>,
}

impl RoomOutbox {
    pub fn new(commands: Sender<RoomCommand>) -> Self {
        Self { commands }
    }

    pub fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.commands.send(command).map_err(|_| RoomError::Closed)
    }
}

pub trait RoomSession {
    /// Registers interest in the given kinds; events arrive on the returned receiver.
    fn subscribe(&mut self, kinds: &[RoomEventKind]) -> RoomSubscription;
    /// Returns false when `id` was not subscribed.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
    fn outbox(&self) -> RoomOutbox;
}
