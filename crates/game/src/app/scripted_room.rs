use std::collections::{HashMap, VecDeque};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tileroom_engine::{
    Coordinates, GridBounds, RoomCommand, RoomEvent, RoomEventKind, RoomOutbox, RoomSession,
    RoomSubscription, SubscriptionId,
};
use tracing::{debug, info, warn};

use super::script::TimedRoomEvent;

struct Subscriber {
    id: SubscriptionId,
    kinds: Vec<RoomEventKind>,
    sender: Sender<RoomEvent>,
}

/// Stand-in for the authoritative server: replays timed room events from a script and
/// optionally answers move commands for one identity.
pub(crate) struct ScriptedRoom {
    pending: VecDeque<TimedRoomEvent>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    commands_tx: Sender<RoomCommand>,
    commands_rx: Receiver<RoomCommand>,
    echo_moves_for: Option<String>,
    positions: HashMap<String, Coordinates>,
    bounds: GridBounds,
    delivered: usize,
}

impl ScriptedRoom {
    /// `events` must already be ordered by time.
    pub fn new(events: Vec<TimedRoomEvent>, bounds: GridBounds) -> Self {
        let (commands_tx, commands_rx) = unbounded();
        Self {
            pending: events.into(),
            subscribers: Vec::new(),
            next_subscription: 1,
            commands_tx,
            commands_rx,
            echo_moves_for: None,
            positions: HashMap::new(),
            bounds,
            delivered: 0,
        }
    }

    pub fn with_move_echo(mut self, identity: impl Into<String>) -> Self {
        self.echo_moves_for = Some(identity.into());
        self
    }

    pub fn remaining_events(&self) -> usize {
        self.pending.len()
    }

    pub fn delivered_events(&self) -> usize {
        self.delivered
    }

    /// Emits every scripted event due at or before `clock`.
    pub fn advance_to(&mut self, clock: f32) {
        while self.pending.front().is_some_and(|next| next.at <= clock) {
            if let Some(next) = self.pending.pop_front() {
                self.deliver(next.event);
            }
        }
    }

    /// Handles commands clients sent since the last call.
    pub fn process_commands(&mut self) {
        let commands = self.commands_rx.try_iter().collect::<Vec<_>>();
        for command in commands {
            info!(command = ?command, "room_command_received");
            match command {
                RoomCommand::Move { destination } => self.echo_move(destination),
            }
        }
    }

    fn echo_move(&mut self, destination: Coordinates) {
        let Some(identity) = self.echo_moves_for.clone() else {
            return;
        };
        if !self.bounds.contains(destination) {
            warn!(
                identity = %identity,
                destination = %destination,
                "room_move_rejected_out_of_bounds"
            );
            return;
        }
        let Some(origin) = self.positions.get(&identity).copied() else {
            warn!(identity = %identity, "room_move_rejected_unknown_identity");
            return;
        };
        let mut ordered_tile_ids = straight_path(origin, destination)
            .into_iter()
            .map(Coordinates::tile_id)
            .collect::<Vec<_>>();
        // Paths go out destination first.
        ordered_tile_ids.reverse();
        self.deliver(RoomEvent::CharacterMoved {
            identity,
            ordered_tile_ids,
        });
    }

    fn deliver(&mut self, event: RoomEvent) {
        self.track_positions(&event);
        let kind = event.kind();
        let mut routed = 0usize;
        for subscriber in &self.subscribers {
            if subscriber.kinds.contains(&kind) && subscriber.sender.send(event.clone()).is_ok() {
                routed += 1;
            }
        }
        self.delivered += 1;
        if routed == 0 {
            debug!(kind = kind.wire_name(), "room_event_unrouted");
        }
    }

    fn track_positions(&mut self, event: &RoomEvent) {
        match event {
            RoomEvent::RosterAdded { entry } | RoomEvent::RosterChanged { entry } => {
                self.positions.insert(entry.identity.clone(), entry.position);
            }
            RoomEvent::RosterRemoved { entry } => {
                self.positions.remove(&entry.identity);
            }
            RoomEvent::CharacterMoved {
                identity,
                ordered_tile_ids,
            } => {
                if let Some(destination) = ordered_tile_ids
                    .first()
                    .and_then(|tile_id| Coordinates::from_tile_id(tile_id))
                {
                    self.positions.insert(identity.clone(), destination);
                }
            }
            _ => {}
        }
    }
}

impl RoomSession for ScriptedRoom {
    fn subscribe(&mut self, kinds: &[RoomEventKind]) -> RoomSubscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let (sender, events) = unbounded();
        self.subscribers.push(Subscriber {
            id,
            kinds: kinds.to_vec(),
            sender,
        });
        debug!(
            subscription = id.0,
            kinds = ?kinds.iter().map(|kind| kind.wire_name()).collect::<Vec<_>>(),
            "room_subscribed"
        );
        RoomSubscription { id, events }
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    fn outbox(&self) -> RoomOutbox {
        RoomOutbox::new(self.commands_tx.clone())
    }
}

/// Origin through destination, columns first.
fn straight_path(origin: Coordinates, destination: Coordinates) -> Vec<Coordinates> {
    let mut path = vec![origin];
    let mut current = origin;
    while current.col() != destination.col() {
        let step = (destination.col() - current.col()).signum();
        current = Coordinates::new(current.col() + step, current.row());
        path.push(current);
    }
    while current.row() != destination.row() {
        let step = (destination.row() - current.row()).signum();
        current = Coordinates::new(current.col(), current.row() + step);
        path.push(current);
    }
    path
}
