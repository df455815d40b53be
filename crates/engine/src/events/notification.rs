use crate::grid::Coordinates;
use crate::room::CharacterStats;
use crate::roster::MoveOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    RosterAdded,
    RosterRemoved,
    SelectionChanged,
    SelectionCleared,
    StatsChanged,
    CharacterPlaced,
    LoadStarted,
    Toast,
    TileClicked,
    MoveRequested,
}

/// Immutable payloads carried by the event bus, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A controller went live for a roster entry.
    RosterAdded {
        identity: String,
        display_name: String,
        character_class: String,
        position: Coordinates,
    },
    RosterRemoved {
        identity: String,
    },
    SelectionChanged {
        identity: String,
        is_player: bool,
        display_name: String,
        character_class: String,
        stats: CharacterStats,
        position: Coordinates,
        /// Portrait path from the character definition, when it has one.
        avatar: Option<String>,
    },
    SelectionCleared {
        previous: String,
    },
    StatsChanged {
        identity: String,
        display_name: String,
        stats: CharacterStats,
    },
    /// A move settled. Fired once per move, including superseded and failed ones.
    CharacterPlaced {
        identity: String,
        outcome: MoveOutcome,
    },
    LoadStarted {
        identity: String,
        character_class: String,
    },
    Toast {
        text: String,
    },
    TileClicked {
        coordinates: Coordinates,
    },
    MoveRequested {
        destination: Coordinates,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::RosterAdded { .. } => NotificationKind::RosterAdded,
            Self::RosterRemoved { .. } => NotificationKind::RosterRemoved,
            Self::SelectionChanged { .. } => NotificationKind::SelectionChanged,
            Self::SelectionCleared { .. } => NotificationKind::SelectionCleared,
            Self::StatsChanged { .. } => NotificationKind::StatsChanged,
            Self::CharacterPlaced { .. } => NotificationKind::CharacterPlaced,
            Self::LoadStarted { .. } => NotificationKind::LoadStarted,
            Self::Toast { .. } => NotificationKind::Toast,
            Self::TileClicked { .. } => NotificationKind::TileClicked,
            Self::MoveRequested { .. } => NotificationKind::MoveRequested,
        }
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Self::Toast { text: text.into() }
    }
}
